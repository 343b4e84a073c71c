//! Orchestration between the wizard registry and the messaging front-end.
//!
//! The front-end handlers stay thin: they parse updates and call into this
//! service, which renders outcomes, rate-limits wizard starts, and invokes
//! the failure-audit hook exactly once per terminal failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::audit::FailureAudit;
use crate::auth::AuthClient;
use crate::config::Config;
use crate::domain::{ChatId, UserId};
use crate::limits::StartLimiter;
use crate::messaging::{escape_html, ChatAction, MessagingPort};
use crate::registry::WizardRegistry;
use crate::wizard::WizardOutcome;
use crate::Result;

const MSG_CANCELLED: &str = "Session generation cancelled";
const MSG_NOTHING_TO_CANCEL: &str = "No session generation in progress.";
const MSG_FAILED: &str = "\u{274c} An error occurred. Please try again with /genstring.";
const MSG_EXPIRED: &str =
    "Session generation timed out due to inactivity. Start again with /genstring.";

pub struct WizardService {
    registry: WizardRegistry,
    messenger: Arc<dyn MessagingPort>,
    audit: Arc<dyn FailureAudit>,
    starts: Mutex<StartLimiter>,
    idle_timeout: Duration,
}

impl WizardService {
    pub fn new(
        cfg: &Config,
        auth: Arc<dyn AuthClient>,
        messenger: Arc<dyn MessagingPort>,
        audit: Arc<dyn FailureAudit>,
    ) -> Self {
        Self {
            registry: WizardRegistry::new(auth, cfg.auth_timeout),
            messenger,
            audit,
            starts: Mutex::new(StartLimiter::new(
                cfg.wizard_starts_per_hour,
                Duration::from_secs(3600),
            )),
            idle_timeout: cfg.wizard_idle_timeout,
        }
    }

    /// `/genstring`: open (or restart) the wizard and send its first prompt.
    pub async fn start_wizard(&self, user: UserId, chat: ChatId) -> Result<()> {
        if let Some(wait) = self.starts.lock().await.check(user) {
            let mins = (wait.as_secs() / 60).max(1);
            let msg = format!(
                "Too many attempts. Try again in about {mins} minute{}.",
                if mins == 1 { "" } else { "s" }
            );
            return self.messenger.send_html(chat, &msg).await;
        }

        let prompt = self.registry.begin(user).await;
        self.messenger.send_html(chat, prompt).await
    }

    /// Plain text turn. Returns `false` when no wizard is live for `user`,
    /// so the front-end can show a hint instead.
    pub async fn handle_text(
        &self,
        user: UserId,
        chat: ChatId,
        username: Option<&str>,
        text: &str,
    ) -> Result<bool> {
        if self.registry.next_advance_is_remote(user).await {
            // The handshake round trip can take a few seconds.
            let _ = self
                .messenger
                .send_chat_action(chat, ChatAction::Typing)
                .await;
        }

        let Some(outcome) = self.registry.advance(user, text).await else {
            return Ok(false);
        };

        match outcome {
            WizardOutcome::Prompt(prompt) => {
                self.messenger.send_html(chat, &prompt).await?;
            }
            WizardOutcome::Success(token) => {
                let msg = format!(
                    "\u{2705} String session generated:\n<code>{}</code>\n\n\
                     Keep it secret! Anyone holding it can sign in without the code.",
                    escape_html(&token.0)
                );
                self.messenger.send_html(chat, &msg).await?;
            }
            WizardOutcome::Cancelled => {
                self.messenger.send_html(chat, MSG_CANCELLED).await?;
            }
            WizardOutcome::Failed(err) => {
                // Generic to the user, verbatim (with identity) to the
                // operator. Local validation never takes this path.
                self.messenger.send_html(chat, MSG_FAILED).await?;
                self.audit.failure(user, username, &err.to_string()).await;
            }
        }
        Ok(true)
    }

    /// `/cancel`: immediate even when a remote call is pending; the in-flight
    /// call is awaited before the connection handle is released.
    pub async fn cancel(&self, user: UserId, chat: ChatId) -> Result<()> {
        let msg = if self.registry.cancel(user).await {
            MSG_CANCELLED
        } else {
            MSG_NOTHING_TO_CANCEL
        };
        self.messenger.send_html(chat, msg).await
    }

    /// Periodic sweep; notifies each user whose idle wizard was dropped.
    pub async fn expire_idle(&self) {
        for user in self.registry.sweep_expired(self.idle_timeout).await {
            let _ = self.messenger.send_html(user.into(), MSG_EXPIRED).await;
        }
    }

    pub async fn active_wizards(&self) -> usize {
        self.registry.active_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::test_support::{CodeScript, FakeAuth, PasswordScript};
    use crate::wizard::{PROMPT_APP_ID, PROMPT_PASSWORD, REPROMPT_APP_ID};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeMessenger {
        sends: StdMutex<Vec<(ChatId, String)>>,
        actions: StdMutex<Vec<ChatId>>,
    }

    impl FakeMessenger {
        fn sent(&self) -> Vec<(ChatId, String)> {
            self.sends.lock().unwrap().clone()
        }

        fn last_text(&self) -> String {
            self.sends.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
            self.sends
                .lock()
                .unwrap()
                .push((chat_id, html.to_string()));
            Ok(())
        }

        async fn send_chat_action(&self, chat_id: ChatId, _action: ChatAction) -> Result<()> {
            self.actions.lock().unwrap().push(chat_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        calls: StdMutex<Vec<(UserId, Option<String>, String)>>,
    }

    impl RecordingAudit {
        fn calls(&self) -> Vec<(UserId, Option<String>, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FailureAudit for RecordingAudit {
        async fn failure(&self, user: UserId, username: Option<&str>, detail: &str) {
            self.calls.lock().unwrap().push((
                user,
                username.map(|s| s.to_string()),
                detail.to_string(),
            ));
        }
    }

    fn test_config() -> Config {
        Config {
            bot_token: "x".to_string(),
            operator: ChatId(999),
            auth_timeout: Duration::from_millis(200),
            wizard_idle_timeout: Duration::from_secs(900),
            wizard_starts_per_hour: 2,
            audit_log_path: "/tmp/tsg-service-test.log".into(),
        }
    }

    struct Harness {
        service: WizardService,
        messenger: Arc<FakeMessenger>,
        audit: Arc<RecordingAudit>,
        auth: Arc<FakeAuth>,
    }

    fn harness() -> Harness {
        let auth = Arc::new(FakeAuth::default());
        let messenger = Arc::new(FakeMessenger::default());
        let audit = Arc::new(RecordingAudit::default());
        let service = WizardService::new(
            &test_config(),
            auth.clone(),
            messenger.clone(),
            audit.clone(),
        );
        Harness {
            service,
            messenger,
            audit,
            auth,
        }
    }

    const USER: UserId = UserId(42);
    const CHAT: ChatId = ChatId(42);

    #[tokio::test]
    async fn full_run_sends_token_and_no_audit() {
        let h = harness();
        h.service.start_wizard(USER, CHAT).await.unwrap();
        assert_eq!(h.messenger.last_text(), PROMPT_APP_ID);

        for input in ["123456", "abcd", "+15551234567", "54321"] {
            assert!(h
                .service
                .handle_text(USER, CHAT, Some("alice"), input)
                .await
                .unwrap());
        }

        let last = h.messenger.last_text();
        assert!(last.contains("<code>1BVtsOGh2a</code>"), "{last}");
        assert!(h.audit.calls().is_empty());
        assert_eq!(h.service.active_wizards().await, 0);
    }

    #[tokio::test]
    async fn text_without_wizard_is_reported_inactive() {
        let h = harness();
        assert!(!h
            .service
            .handle_text(USER, CHAT, None, "hello")
            .await
            .unwrap());
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn failure_is_generic_to_user_and_audited_once_with_identity() {
        let h = harness();
        *h.auth.code_script.lock().unwrap() = CodeScript::NeedPassword;
        *h.auth.password_script.lock().unwrap() =
            PasswordScript::Reject("PASSWORD_HASH_INVALID".to_string());

        h.service.start_wizard(USER, CHAT).await.unwrap();
        for input in ["123456", "abcd", "+15551234567", "54321"] {
            h.service
                .handle_text(USER, CHAT, Some("alice"), input)
                .await
                .unwrap();
        }
        assert!(h.messenger.last_text().contains(PROMPT_PASSWORD));

        h.service
            .handle_text(USER, CHAT, Some("alice"), "hunter2")
            .await
            .unwrap();

        // The user sees nothing remote-specific.
        let last = h.messenger.last_text();
        assert!(last.contains("An error occurred"), "{last}");
        assert!(!last.contains("PASSWORD_HASH_INVALID"));

        let calls = h.audit.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, USER);
        assert_eq!(calls[0].1.as_deref(), Some("alice"));
        assert!(calls[0].2.contains("PASSWORD_HASH_INVALID"));
    }

    #[tokio::test]
    async fn validation_reprompts_never_reach_the_audit_channel() {
        let h = harness();
        h.service.start_wizard(USER, CHAT).await.unwrap();
        for _ in 0..3 {
            h.service.handle_text(USER, CHAT, None, "abc").await.unwrap();
            assert_eq!(h.messenger.last_text(), REPROMPT_APP_ID);
        }
        assert!(h.audit.calls().is_empty());
    }

    #[tokio::test]
    async fn timeout_failure_is_audited() {
        let h = harness();
        *h.auth.code_script.lock().unwrap() = CodeScript::Hang;

        h.service.start_wizard(USER, CHAT).await.unwrap();
        for input in ["123456", "abcd", "+15551234567", "54321"] {
            h.service.handle_text(USER, CHAT, None, input).await.unwrap();
        }

        assert!(h.messenger.last_text().contains("An error occurred"));
        let calls = h.audit.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].2.contains("timed out"));
    }

    #[tokio::test]
    async fn typing_action_only_for_remote_bound_steps() {
        let h = harness();
        h.service.start_wizard(USER, CHAT).await.unwrap();
        h.service.handle_text(USER, CHAT, None, "123456").await.unwrap();
        h.service.handle_text(USER, CHAT, None, "abcd").await.unwrap();
        assert!(h.messenger.actions.lock().unwrap().is_empty());

        h.service
            .handle_text(USER, CHAT, None, "+15551234567")
            .await
            .unwrap();
        assert_eq!(h.messenger.actions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_paths() {
        let h = harness();
        h.service.cancel(USER, CHAT).await.unwrap();
        assert_eq!(h.messenger.last_text(), MSG_NOTHING_TO_CANCEL);

        h.service.start_wizard(USER, CHAT).await.unwrap();
        h.service.cancel(USER, CHAT).await.unwrap();
        assert_eq!(h.messenger.last_text(), MSG_CANCELLED);
        assert_eq!(h.service.active_wizards().await, 0);
    }

    #[tokio::test]
    async fn start_limit_blocks_with_a_wait_hint() {
        let h = harness();
        h.service.start_wizard(USER, CHAT).await.unwrap();
        h.service.start_wizard(USER, CHAT).await.unwrap();
        h.service.start_wizard(USER, CHAT).await.unwrap();

        let last = h.messenger.last_text();
        assert!(last.contains("Too many attempts"), "{last}");
        // The blocked start did not replace or create a wizard prompt.
        assert_eq!(h.messenger.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_idle_notifies_the_user() {
        let h = harness();
        h.service.start_wizard(USER, CHAT).await.unwrap();

        tokio::time::advance(Duration::from_secs(901)).await;
        h.service.expire_idle().await;

        assert_eq!(h.messenger.last_text(), MSG_EXPIRED);
        assert_eq!(h.service.active_wizards().await, 0);
    }
}
