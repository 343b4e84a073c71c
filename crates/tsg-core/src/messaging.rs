//! Port for the messaging front-end that delivers user text and renders
//! replies. Telegram is the first implementation; the shape stays small so a
//! future adapter fits behind the same interface.

use async_trait::async_trait;

use crate::{domain::ChatId, Result};

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    /// Best-effort; adapters without chat actions may no-op.
    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;
}

/// Escape user-derived text for HTML parse mode.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(escape_html("a<b>&c"), "a&lt;b&gt;&amp;c");
        assert_eq!(escape_html("plain"), "plain");
    }
}
