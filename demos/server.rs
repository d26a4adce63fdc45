//! Serve the SnailAPI demo routes.
//!
//! ```sh
//! SNAIL_SECRET=change-me RUST_LOG=snail_api=debug cargo run --example server
//! curl -i localhost:4221/about
//! curl -i -c jar -X POST localhost:4221/login
//! curl -i -b jar localhost:4221/profile
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::json;
use snail_api::{App, Auth, AuthConfig, Cookie, Error, Flow, Handler, ServerOptions, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADDR: &str = "127.0.0.1:4221";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snail_api=info,server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr: SocketAddr = std::env::var("SNAIL_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_owned())
        .parse()?;
    let secret = std::env::var("SNAIL_SECRET").unwrap_or_else(|_| {
        log::warn!("SNAIL_SECRET is not set, using an insecure development secret");
        "snail-dev-secret".to_owned()
    });

    async_global_executor::block_on(async {
        let store = Store::open("./db.json").await;
        let auth = Auth::new();
        auth.configure(AuthConfig::new(secret).issuer("snail-api"))?;

        let mut app = App::new();
        app.middleware(Handler::pass_through(|req, _res| {
            log::info!("middleware ran: {} {}", req.method(), req.path());
            Box::pin(futures_lite::future::ready(Flow::Continue))
        }));

        app.route(
            "/about",
            [Handler::terminal(|_req, res| {
                Box::pin(async move { res.send("Hello from SnailAPI!") })
            })],
        );
        app.route(
            "/text",
            [Handler::terminal(|_req, res| {
                Box::pin(async move { res.send_file("./demos/public/myfile.txt", "text/plain").await })
            })],
        );
        app.route(
            "/json",
            [Handler::terminal(|_req, res| {
                Box::pin(async move { res.json(&json!({"name": "Sathesh", "age": 26})) })
            })],
        );

        let signer = auth.clone();
        let users = store.clone();
        app.route(
            "/login",
            [Handler::terminal(move |_req, res| {
                let signer = signer.clone();
                let users = users.clone();
                Box::pin(async move {
                    let user = json!({"id": 99, "name": "MyDude"});
                    let claims = user
                        .as_object()
                        .cloned()
                        .ok_or_else(|| Error::middleware("user must be an object"))?;
                    let token = signer.sign(&claims)?;
                    users.set("99", user).await?;

                    res.add_cookie(
                        Cookie::new("token", token)
                            .http_only(true)
                            .path("/")
                            .max_age(Duration::from_secs(3600)),
                    )?;
                    res.json(&json!({"message": "Logged in"}))
                })
            })],
        );

        app.route(
            "/profile",
            [
                auth.protect("token"),
                Handler::terminal(|req, res| {
                    Box::pin(async move {
                        res.json(&json!({
                            "message": "Authenticated request!",
                            "user": req.identity(),
                        }))
                    })
                }),
            ],
        );

        log::info!("SnailAPI running on {}", addr);
        app.listen(addr, ServerOptions::default()).await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
