//! Per-user credential-exchange wizard.
//!
//! A small finite-state machine that collects app credentials across turns,
//! performs the remote login handshake at the single transition that needs
//! the network, and ends in exactly one of three terminal outcomes: a session
//! token, a user cancellation, or a classified failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};

use crate::auth::{AuthClient, AuthConnection, AuthError, CodeOutcome, PendingCode};
use crate::domain::{SessionToken, UserId};

/// State is a tagged enum so a field only exists in states where it is
/// valid: the compiler rules out reading the phone before it was collected
/// or touching a connection outside AwaitingCode/AwaitingSecondFactor.
enum Step {
    AwaitingAppId,
    AwaitingAppHash {
        app_id: i32,
    },
    AwaitingPhone {
        app_id: i32,
        app_hash: String,
    },
    AwaitingCode {
        phone: String,
        conn: Box<dyn AuthConnection>,
        pending: PendingCode,
    },
    AwaitingSecondFactor {
        conn: Box<dyn AuthConnection>,
    },
    Terminated,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::AwaitingAppId => "awaiting_app_id",
            Step::AwaitingAppHash { .. } => "awaiting_app_hash",
            Step::AwaitingPhone { .. } => "awaiting_phone",
            Step::AwaitingCode { .. } => "awaiting_code",
            Step::AwaitingSecondFactor { .. } => "awaiting_second_factor",
            Step::Terminated => "terminated",
        }
    }
}

/// Result of feeding one user turn into the wizard.
#[derive(Debug)]
pub enum WizardOutcome {
    /// Normal step completion; the text is the next prompt.
    Prompt(String),
    /// Terminal: handshake complete, token ready to hand out.
    Success(SessionToken),
    /// Terminal, user-initiated.
    Cancelled,
    /// Terminal: a remote failure, already classified.
    Failed(AuthError),
}

impl WizardOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WizardOutcome::Prompt(_))
    }
}

pub const PROMPT_APP_ID: &str =
    "Let's generate your string session!\nPlease enter your API_ID:";
pub const PROMPT_APP_HASH: &str = "Great! Now send your API_HASH:";
pub const PROMPT_PHONE: &str = "Now send your phone number (international format):";
pub const PROMPT_CODE: &str = "Enter the OTP you received:";
pub const PROMPT_PASSWORD: &str = "Enter your 2FA password:";
pub const REPROMPT_APP_ID: &str = "API_ID must be a number! Try again:";
pub const REPROMPT_APP_HASH: &str = "API_HASH can't be empty. Send it again:";
pub const REPROMPT_PHONE: &str =
    "That doesn't look like a phone number. Use international format (e.g. +15551234567):";

/// One user's in-flight login handshake.
pub struct WizardSession {
    user: UserId,
    step: Step,
    auth: Arc<dyn AuthClient>,
    remote_timeout: Duration,
    created_at: Instant,
    last_activity: Instant,
}

impl WizardSession {
    pub fn new(user: UserId, auth: Arc<dyn AuthClient>, remote_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            user,
            step: Step::AwaitingAppId,
            auth,
            remote_timeout,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    /// The prompt that opens the wizard.
    pub fn first_prompt(&self) -> &'static str {
        PROMPT_APP_ID
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.step, Step::Terminated)
    }

    /// Whether the current step will hit the network when advanced.
    pub fn next_advance_is_remote(&self) -> bool {
        matches!(
            self.step,
            Step::AwaitingPhone { .. } | Step::AwaitingCode { .. } | Step::AwaitingSecondFactor { .. }
        )
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Feed one turn of user text into the machine.
    ///
    /// Transitions are strictly forward except the single remote-driven
    /// branch AwaitingCode -> AwaitingSecondFactor. Local validation errors
    /// re-prompt and leave the state (and any stored fields) untouched.
    /// Remote failures terminate the wizard; the caller must start over to
    /// keep credentials fresh, since the remote service ties code validity
    /// to the connection that requested it.
    pub async fn advance(&mut self, input: &str) -> WizardOutcome {
        self.last_activity = Instant::now();
        let step = std::mem::replace(&mut self.step, Step::Terminated);

        let (next, outcome) = match step {
            Step::AwaitingAppId => match input.trim().parse::<i32>() {
                Ok(app_id) => (
                    Step::AwaitingAppHash { app_id },
                    WizardOutcome::Prompt(PROMPT_APP_HASH.to_string()),
                ),
                Err(_) => (
                    Step::AwaitingAppId,
                    WizardOutcome::Prompt(REPROMPT_APP_ID.to_string()),
                ),
            },

            Step::AwaitingAppHash { app_id } => {
                let hash = input.trim();
                if hash.is_empty() {
                    (
                        Step::AwaitingAppHash { app_id },
                        WizardOutcome::Prompt(REPROMPT_APP_HASH.to_string()),
                    )
                } else {
                    (
                        Step::AwaitingPhone {
                            app_id,
                            app_hash: hash.to_string(),
                        },
                        WizardOutcome::Prompt(PROMPT_PHONE.to_string()),
                    )
                }
            }

            Step::AwaitingPhone { app_id, app_hash } => {
                match normalize_phone(input) {
                    None => (
                        Step::AwaitingPhone { app_id, app_hash },
                        WizardOutcome::Prompt(REPROMPT_PHONE.to_string()),
                    ),
                    Some(phone) => {
                        // The one turn that opens the connection. Connect and
                        // the code request are both bounded; either failure is
                        // terminal so a retry always starts from fresh
                        // credentials.
                        match self.connect_and_request(app_id, &app_hash, &phone).await {
                            Ok((conn, pending)) => (
                                Step::AwaitingCode {
                                    phone,
                                    conn,
                                    pending,
                                },
                                WizardOutcome::Prompt(PROMPT_CODE.to_string()),
                            ),
                            Err(e) => (Step::Terminated, WizardOutcome::Failed(e)),
                        }
                    }
                }
            }

            Step::AwaitingCode {
                phone,
                mut conn,
                pending,
            } => {
                let code = input.trim();
                let res = self
                    .bounded(conn.submit_code(&phone, code, &pending))
                    .await;
                match res {
                    Ok(CodeOutcome::SignedIn(token)) => {
                        conn.disconnect().await;
                        (Step::Terminated, WizardOutcome::Success(token))
                    }
                    Ok(CodeOutcome::SecondFactorRequired) => (
                        Step::AwaitingSecondFactor { conn },
                        WizardOutcome::Prompt(PROMPT_PASSWORD.to_string()),
                    ),
                    Err(e) => {
                        conn.disconnect().await;
                        (Step::Terminated, WizardOutcome::Failed(e))
                    }
                }
            }

            Step::AwaitingSecondFactor { mut conn } => {
                let res = self.bounded(conn.submit_password(input)).await;
                conn.disconnect().await;
                match res {
                    Ok(token) => (Step::Terminated, WizardOutcome::Success(token)),
                    Err(e) => (Step::Terminated, WizardOutcome::Failed(e)),
                }
            }

            Step::Terminated => (Step::Terminated, WizardOutcome::Cancelled),
        };

        self.step = next;
        if outcome.is_terminal() {
            tracing::info!(
                user = self.user.0,
                outcome = outcome_label(&outcome),
                elapsed_secs = self.created_at.elapsed().as_secs(),
                "wizard finished"
            );
        } else {
            tracing::debug!(user = self.user.0, step = self.step.name(), "wizard advanced");
        }
        outcome
    }

    /// User-initiated cancel. Releases any live connection and terminates.
    /// Safe to call in any state, including after termination.
    pub async fn cancel(&mut self) -> WizardOutcome {
        let step = std::mem::replace(&mut self.step, Step::Terminated);
        match step {
            Step::AwaitingCode { mut conn, .. } | Step::AwaitingSecondFactor { mut conn } => {
                conn.disconnect().await;
            }
            _ => {}
        }
        tracing::info!(user = self.user.0, "wizard cancelled");
        WizardOutcome::Cancelled
    }

    async fn connect_and_request(
        &self,
        app_id: i32,
        app_hash: &str,
        phone: &str,
    ) -> Result<(Box<dyn AuthConnection>, PendingCode), AuthError> {
        let mut conn = self.bounded(self.auth.connect(app_id, app_hash)).await?;
        match self.bounded(conn.request_code(phone)).await {
            Ok(pending) => Ok((conn, pending)),
            Err(e) => {
                conn.disconnect().await;
                Err(e)
            }
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        match timeout(self.remote_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(AuthError::Timeout(self.remote_timeout)),
        }
    }
}

fn outcome_label(o: &WizardOutcome) -> &'static str {
    match o {
        WizardOutcome::Prompt(_) => "prompt",
        WizardOutcome::Success(_) => "success",
        WizardOutcome::Cancelled => "cancelled",
        WizardOutcome::Failed(_) => "failed",
    }
}

/// Accepts `+` followed by 7-15 digits; spaces and dashes are stripped.
fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = compact.strip_prefix('+')?;
    if digits.len() < 7 || digits.len() > 15 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(compact)
}
