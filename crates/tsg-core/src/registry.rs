//! Owns at most one live wizard per user.
//!
//! The map mutex is held only for lookup/insert/remove; each session has its
//! own mutex, so advances for the same user are strictly serialized while
//! unrelated users never block on each other. Remote calls happen under the
//! single session lock only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::auth::AuthClient;
use crate::domain::UserId;
use crate::wizard::{WizardOutcome, WizardSession};

pub struct WizardRegistry {
    auth: Arc<dyn AuthClient>,
    remote_timeout: Duration,
    sessions: Mutex<HashMap<UserId, Arc<Mutex<WizardSession>>>>,
}

impl WizardRegistry {
    pub fn new(auth: Arc<dyn AuthClient>, remote_timeout: Duration) -> Self {
        Self {
            auth,
            remote_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a wizard for `user`, returning its opening prompt.
    ///
    /// If one is already live it is cancelled first (releasing any held
    /// connection) so a restart always begins from fresh credentials.
    pub async fn begin(&self, user: UserId) -> &'static str {
        let fresh = Arc::new(Mutex::new(WizardSession::new(
            user,
            self.auth.clone(),
            self.remote_timeout,
        )));
        let prompt = fresh.lock().await.first_prompt();

        let previous = self.sessions.lock().await.insert(user, fresh);
        if let Some(old) = previous {
            // Waits out any in-flight advance before the handle is released.
            old.lock().await.cancel().await;
            tracing::info!(user = user.0, "replaced live wizard");
        } else {
            tracing::info!(user = user.0, "wizard started");
        }
        prompt
    }

    /// Whether `user` currently has a live wizard.
    pub async fn is_active(&self, user: UserId) -> bool {
        self.sessions.lock().await.contains_key(&user)
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether `user`'s next turn will hit the network (used for the typing
    /// indicator; best-effort, may race with a concurrent turn).
    pub async fn next_advance_is_remote(&self, user: UserId) -> bool {
        let Some(session) = self.sessions.lock().await.get(&user).cloned() else {
            return false;
        };
        let is_remote = session.lock().await.next_advance_is_remote();
        is_remote
    }

    /// Feed one turn of text into `user`'s wizard.
    ///
    /// Returns `None` when no wizard is live. Terminal outcomes remove the
    /// session (its connection is already released by the wizard itself).
    pub async fn advance(&self, user: UserId, input: &str) -> Option<WizardOutcome> {
        let session = self.sessions.lock().await.get(&user).cloned()?;

        let outcome = session.lock().await.advance(input).await;
        if outcome.is_terminal() {
            self.remove_if_same(user, &session).await;
        }
        Some(outcome)
    }

    /// Cancel `user`'s wizard, if any. Awaits any in-flight advance, then
    /// releases the held connection before discarding the session.
    pub async fn cancel(&self, user: UserId) -> bool {
        let Some(session) = self.sessions.lock().await.remove(&user) else {
            return false;
        };
        session.lock().await.cancel().await;
        true
    }

    /// Remove wizards idle past `max_idle`, releasing their connections.
    /// Returns the affected users so the caller can notify them.
    pub async fn sweep_expired(&self, max_idle: Duration) -> Vec<UserId> {
        let now = Instant::now();
        let candidates: Vec<(UserId, Arc<Mutex<WizardSession>>)> = self
            .sessions
            .lock()
            .await
            .iter()
            .map(|(u, s)| (*u, s.clone()))
            .collect();

        let mut expired = Vec::new();
        for (user, session) in candidates {
            let mut guard = session.lock().await;
            if guard.idle_for(now) < max_idle {
                continue;
            }
            guard.cancel().await;
            drop(guard);
            if self.remove_if_same(user, &session).await {
                tracing::info!(user = user.0, "expired idle wizard");
                expired.push(user);
            }
        }
        expired
    }

    /// Remove `user`'s entry only if it still maps to `session`; a concurrent
    /// `begin` may already have replaced it.
    async fn remove_if_same(&self, user: UserId, session: &Arc<Mutex<WizardSession>>) -> bool {
        let mut map = self.sessions.lock().await;
        match map.get(&user) {
            Some(current) if Arc::ptr_eq(current, session) => {
                map.remove(&user);
                true
            }
            _ => false,
        }
    }
}
