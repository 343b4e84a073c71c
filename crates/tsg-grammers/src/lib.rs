//! MTProto adapter (grammers).
//!
//! Implements the core auth port over a real user-account login. The
//! second-factor condition arrives as `SignInError::PasswordRequired`, a
//! typed variant, so no error-text matching is needed anywhere.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use grammers_client::types::{LoginToken, PasswordToken};
use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_session::Session;

use tsg_core::auth::{AuthClient, AuthConnection, AuthError, CodeOutcome, PendingCode};
use tsg_core::domain::SessionToken;

pub struct GrammersAuth;

impl GrammersAuth {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GrammersAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthClient for GrammersAuth {
    async fn connect(
        &self,
        app_id: i32,
        app_hash: &str,
    ) -> Result<Box<dyn AuthConnection>, AuthError> {
        let client = Client::connect(Config {
            // Fresh in-memory session per wizard; it becomes the string
            // session once sign-in completes.
            session: Session::new(),
            api_id: app_id,
            api_hash: app_hash.to_string(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| AuthError::Connect(e.to_string()))?;

        tracing::debug!(app_id, "mtproto connection established");
        Ok(Box::new(GrammersConnection {
            client: Some(client),
            login_token: None,
            password_token: None,
            pending: None,
        }))
    }
}

struct GrammersConnection {
    client: Option<Client>,
    login_token: Option<LoginToken>,
    password_token: Option<PasswordToken>,
    pending: Option<PendingCode>,
}

impl GrammersConnection {
    fn client(&self) -> Result<&Client, AuthError> {
        self.client
            .as_ref()
            .ok_or_else(|| AuthError::Connect("connection already closed".to_string()))
    }

    fn session_token(&self) -> Result<SessionToken, AuthError> {
        let client = self.client()?;
        Ok(SessionToken(BASE64.encode(client.session().save())))
    }
}

#[async_trait]
impl AuthConnection for GrammersConnection {
    async fn request_code(&mut self, phone: &str) -> Result<PendingCode, AuthError> {
        let token = self
            .client()?
            .request_login_code(phone)
            .await
            .map_err(|e| AuthError::CodeRequest(e.to_string()))?;
        self.login_token = Some(token);

        // grammers keeps the phone_code_hash inside the login token; hand the
        // wizard an opaque correlation value instead.
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pending = PendingCode(format!("{nonce:x}"));
        self.pending = Some(pending.clone());
        Ok(pending)
    }

    async fn submit_code(
        &mut self,
        _phone: &str,
        code: &str,
        pending: &PendingCode,
    ) -> Result<CodeOutcome, AuthError> {
        if self.pending.as_ref() != Some(pending) {
            return Err(AuthError::Rejected(
                "stale code token; request a new code".to_string(),
            ));
        }
        let Some(login_token) = self.login_token.as_ref() else {
            return Err(AuthError::Rejected("no code was requested".to_string()));
        };

        match self.client()?.sign_in(login_token, code).await {
            Ok(_user) => Ok(CodeOutcome::SignedIn(self.session_token()?)),
            Err(SignInError::PasswordRequired(token)) => {
                self.password_token = Some(token);
                Ok(CodeOutcome::SecondFactorRequired)
            }
            Err(e) => Err(AuthError::Rejected(e.to_string())),
        }
    }

    async fn submit_password(&mut self, password: &str) -> Result<SessionToken, AuthError> {
        let Some(token) = self.password_token.take() else {
            return Err(AuthError::Rejected(
                "no second factor was requested".to_string(),
            ));
        };

        match self.client()?.check_password(token, password).await {
            Ok(_user) => self.session_token(),
            Err(e) => Err(AuthError::Rejected(e.to_string())),
        }
    }

    async fn disconnect(&mut self) {
        // Dropping the client tears the transport down; taking it makes this
        // idempotent.
        if self.client.take().is_some() {
            tracing::debug!("mtproto connection released");
        }
    }
}
