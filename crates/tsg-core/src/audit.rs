//! Failure audit channel.
//!
//! Every remote-originating terminal failure is forwarded, with the user's
//! identity and the verbatim error detail, to the operator. The hook is a
//! trait so the core stays testable and the effect is explicit rather than
//! inline networking in the wizard.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{ChatId, UserId};
use crate::messaging::{escape_html, MessagingPort};
use crate::Result;

#[async_trait]
pub trait FailureAudit: Send + Sync {
    async fn failure(&self, user: UserId, username: Option<&str>, detail: &str);
}

#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    at: String,
    user_id: i64,
    username: Option<&'a str>,
    detail: &'a str,
}

/// Append-only JSON-lines failure log.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, user: UserId, username: Option<&str>, detail: &str) -> Result<()> {
        let record = AuditRecord {
            at: chrono::Utc::now().to_rfc3339(),
            user_id: user.0,
            username,
            detail,
        };
        let line = serde_json::to_string(&record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Production hook: DM the operator and append to the failure log.
pub struct OperatorAudit {
    messenger: Arc<dyn MessagingPort>,
    operator: ChatId,
    log: AuditLog,
}

impl OperatorAudit {
    pub fn new(messenger: Arc<dyn MessagingPort>, operator: ChatId, log: AuditLog) -> Self {
        Self {
            messenger,
            operator,
            log,
        }
    }
}

#[async_trait]
impl FailureAudit for OperatorAudit {
    async fn failure(&self, user: UserId, username: Option<&str>, detail: &str) {
        if let Err(e) = self.log.write(user, username, detail) {
            tracing::warn!(error = %e, "audit log append failed");
        }

        let who = match username {
            Some(name) => format!("@{} ({})", escape_html(name), user.0),
            None => user.0.to_string(),
        };
        let msg = format!(
            "Error occurred:\n<code>{}</code>\n\nUser: {who}",
            escape_html(detail)
        );
        if let Err(e) = self.messenger.send_html(self.operator, &msg).await {
            tracing::warn!(error = %e, "operator notification failed");
        }
    }
}
