//! Telegram update handlers.
//!
//! Each handler is a thin adapter: it extracts ids and text from the update
//! and calls into the core wizard service, which owns all replies.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod commands;
mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(t) = msg.text() {
        if t.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
        return text::handle_text(msg, state).await;
    }

    // Media, stickers etc play no part in the login flow.
    Ok(())
}
