use std::{fs::File, path::PathBuf, time::Duration};

use serde_json::{json, Value};
use snail_api::{App, Auth, AuthConfig, Cookie, Handler};

pub const SECRET: &str = "snail-secret";

pub fn read_fixture(name: &str) -> Vec<u8> {
    use std::io::Read;

    let directory: PathBuf = env!("CARGO_MANIFEST_DIR").into();
    let path: PathBuf = format!("tests/fixtures/{}.txt", name).into();
    let mut file = File::open(directory.join(path)).expect("Reading fixture file didn't work");
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .expect("Couldn't read fixture files contents");

    let mut result = Vec::<u8>::new();
    for byte in contents {
        if byte == 0x0A {
            result.push(0x0D);
        }
        result.push(byte);
    }
    result
}

/// Split a raw response into its head and body.
pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no blank line");
    let head = String::from_utf8(raw[..end].to_vec()).unwrap();
    (head, raw[end + 4..].to_vec())
}

/// The JSON body of a raw response.
#[allow(dead_code)]
pub fn json_body(raw: &[u8]) -> Value {
    let (_, body) = split_response(raw);
    serde_json::from_slice(&body).unwrap()
}

/// All `Set-Cookie` values in a raw response head.
#[allow(dead_code)]
pub fn set_cookies(raw: &[u8]) -> Vec<String> {
    let (head, _) = split_response(raw);
    head.split("\r\n")
        .filter_map(|line| line.strip_prefix("Set-Cookie: "))
        .map(str::to_owned)
        .collect()
}

/// The login/profile app exercised by the end-to-end tests.
#[allow(dead_code)]
pub fn auth_app() -> (App, Auth) {
    let auth = Auth::with_config(AuthConfig::new(SECRET).issuer("snail-api"));
    let mut app = App::new();

    app.route(
        "/about",
        [Handler::terminal(|_req, res| {
            Box::pin(async move { res.send("Hello from SnailAPI!") })
        })],
    );

    let signer = auth.clone();
    app.route(
        "/login",
        [Handler::terminal(move |_req, res| {
            let token = json!({"id": 99, "name": "MyDude"})
                .as_object()
                .cloned()
                .ok_or_else(|| snail_api::Error::middleware("claims must be an object"))
                .and_then(|claims| signer.sign(&claims));
            Box::pin(async move {
                let cookie = Cookie::new("token", token?)
                    .http_only(true)
                    .path("/")
                    .max_age(Duration::from_secs(3600));
                res.add_cookie(cookie)?;
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

    (app, auth)
}
