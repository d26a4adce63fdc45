//! Cookie-carried token authentication.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_lite::future;

use crate::token::{self, SignOptions, VerifyOptions};
use crate::{Claims, Error, Flow, Handler, Request, Response, Result};

/// The cookie [`Auth::protect`] reads by default.
pub const DEFAULT_COOKIE: &str = "token";

/// Token lifetime used when none is configured.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(60 * 60);

/// Secret, issuer and lifetime used to sign and verify tokens.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    secret: String,
    issuer: Option<String>,
    expires_in: Duration,
}

impl AuthConfig {
    /// Create a config with no issuer and a one hour token lifetime.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: None,
            expires_in: DEFAULT_EXPIRES_IN,
        }
    }

    /// Set the `iss` claim written at signing and required at verification.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the token lifetime.
    pub fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = expires_in;
        self
    }

    /// The configured token lifetime.
    pub fn lifetime(&self) -> Duration {
        self.expires_in
    }
}

/// The auth gate.
///
/// Clones share one configuration, which can be set exactly once. Handlers
/// created by [`Auth::protect`] before that read it at request time.
#[derive(Debug, Clone, Default)]
pub struct Auth {
    config: Arc<OnceLock<AuthConfig>>,
}

impl Auth {
    /// Create an unconfigured gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gate that is already configured.
    pub fn with_config(config: AuthConfig) -> Self {
        let auth = Self::new();
        let _ = auth.config.set(config);
        auth
    }

    /// Set the configuration. Fails if it was already set.
    pub fn configure(&self, config: AuthConfig) -> Result<()> {
        self.config
            .set(config)
            .map_err(|_| Error::AuthAlreadyConfigured)
    }

    /// The configuration, if set.
    pub fn config(&self) -> Option<&AuthConfig> {
        self.config.get()
    }

    /// Sign `claims` into a token using the configured secret, issuer and
    /// lifetime.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let config = self.config().ok_or(Error::AuthNotConfigured)?;
        let opts = SignOptions {
            expires_in: Some(config.expires_in),
            issuer: config.issuer.clone(),
        };
        Ok(token::sign(claims, config.secret.as_bytes(), &opts)?)
    }

    /// Verify a token using the configured secret and issuer.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let config = self.config().ok_or(Error::AuthNotConfigured)?;
        let opts = VerifyOptions {
            issuer: config.issuer.clone(),
        };
        token::verify(token, config.secret.as_bytes(), &opts).map_err(Error::AuthInvalidToken)
    }

    /// A pass-through handler that admits requests carrying a valid token in
    /// the `cookie_name` cookie.
    ///
    /// On success the verified claims become [`Request::identity`] and the
    /// chain continues. A request that already carries different claims from
    /// an earlier gate fails instead. Otherwise a `401` with a JSON body is sent and the
    /// chain stops.
    pub fn protect(&self, cookie_name: impl Into<String>) -> Handler {
        let auth = self.clone();
        let cookie_name = cookie_name.into();
        Handler::pass_through(move |req, res| {
            let flow = auth.check(&cookie_name, req, res);
            Box::pin(future::ready(flow))
        })
    }

    fn check(&self, cookie_name: &str, req: &mut Request, res: &mut Response) -> Flow {
        let verified = match req.cookie(cookie_name) {
            _ if self.config().is_none() => Err(Error::AuthNotConfigured),
            None => Err(Error::AuthMissingToken),
            Some(token) => self.verify(token),
        };
        let claims = match verified {
            Ok(claims) => claims,
            Err(err) => return reject(res, err),
        };
        match req.identity() {
            Some(existing) if *existing != claims => {
                log::warn!("conflicting identities for {}", req.path());
                Flow::Fail(Error::middleware("request already carries a different identity"))
            }
            Some(_) => Flow::Continue,
            None => {
                log::trace!("authenticated request for {}", req.path());
                req.set_identity(claims);
                Flow::Continue
            }
        }
    }
}

fn reject(res: &mut Response, err: Error) -> Flow {
    log::debug!("rejecting request: {}", err);
    let sent = res
        .set_status(err.status())
        .and_then(|res| res.json(&err.body()));
    match sent {
        Ok(()) => Flow::Respond,
        Err(e) => Flow::Fail(e),
    }
}
