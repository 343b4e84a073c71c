use std::sync::Arc;

use teloxide::prelude::*;

use tsg_core::domain::{ChatId, UserId};

use crate::router::AppState;

pub async fn handle_text(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);
    let username = user.username.as_deref();

    match state.service.handle_text(user_id, chat_id, username, text).await {
        Ok(true) => {}
        Ok(false) => {
            let _ = state
                .messenger
                .send_html(chat_id, "Use /genstring to generate a string session.")
                .await;
        }
        Err(e) => {
            tracing::warn!(user = user_id.0, error = %e, "text turn failed");
        }
    }
    Ok(())
}
