//! Port for the remote account service that performs the login handshake.
//!
//! The wizard consumes these traits; the MTProto implementation lives in the
//! `tsg-grammers` adapter crate, and tests drive the wizard with fakes.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::SessionToken;

/// Closed taxonomy for remote-originating failures.
///
/// The wizard never inspects remote error text beyond carrying it as opaque
/// detail for the operator audit; classification happens in the adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Could not establish a connection with the supplied app credentials.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The one-time-code request was rejected (flood wait, bad number, ...).
    #[error("code request rejected: {0}")]
    CodeRequest(String),

    /// The code or the two-step password was rejected.
    #[error("sign-in rejected: {0}")]
    Rejected(String),

    /// The remote call did not complete within the configured bound.
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
}

/// Correlation value returned when a one-time code is requested. The remote
/// service requires it when the code is submitted later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCode(pub String);

/// Result of submitting a one-time code.
///
/// Second-factor detection is a typed variant here on purpose: matching the
/// remote service's human-readable error text would break the moment the
/// wording changes.
#[derive(Debug)]
pub enum CodeOutcome {
    SignedIn(SessionToken),
    SecondFactorRequired,
}

/// Entry point of the port: opens one connection per wizard.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn connect(
        &self,
        app_id: i32,
        app_hash: &str,
    ) -> Result<Box<dyn AuthConnection>, AuthError>;
}

/// A live connection to the remote account service.
///
/// Exclusively owned by one wizard session from the moment the phone is
/// accepted until the wizard terminates. `disconnect` is idempotent and safe
/// to call on an already-closed connection.
#[async_trait]
pub trait AuthConnection: Send + Sync {
    async fn request_code(&mut self, phone: &str) -> Result<PendingCode, AuthError>;

    async fn submit_code(
        &mut self,
        phone: &str,
        code: &str,
        pending: &PendingCode,
    ) -> Result<CodeOutcome, AuthError>;

    async fn submit_password(&mut self, password: &str) -> Result<SessionToken, AuthError>;

    async fn disconnect(&mut self);
}
