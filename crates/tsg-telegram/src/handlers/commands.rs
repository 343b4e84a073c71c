use std::sync::Arc;

use teloxide::prelude::*;

use tsg_core::{
    domain::{ChatId, UserId},
    messaging::escape_html,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);
    let is_owner = user_id.0 == state.cfg.operator.0;

    let (cmd, _args) = parse_command(text);
    let result = match cmd.as_str() {
        "start" => {
            let name = escape_html(&user.full_name());
            let handle = user
                .username
                .as_deref()
                .map(|u| format!(" (@{})", escape_html(u)))
                .unwrap_or_default();
            let greeting = format!(
                "\u{1f44b} Hello {name}{handle}!\n\u{1f194} Your ID: {}\n\n\
                 Use /cmds to see available commands",
                user_id.0
            );
            state.messenger.send_html(chat_id, &greeting).await
        }

        "cmds" => {
            let mut lines = vec![
                "/start - Start the bot",
                "/cmds - Show this commands list",
                "/genstring - Generate a new string session",
                "/cancel - Cancel the current generation",
            ];
            if is_owner {
                lines.push("\n\u{1f451} Owner Commands:");
                lines.push("/stats - Bot statistics");
            }
            state.messenger.send_html(chat_id, &lines.join("\n")).await
        }

        "genstring" => state.service.start_wizard(user_id, chat_id).await,

        "cancel" => state.service.cancel(user_id, chat_id).await,

        "stats" => {
            if !is_owner {
                return Ok(());
            }
            let active = state.service.active_wizards().await;
            state
                .messenger
                .send_html(
                    chat_id,
                    &format!("\u{1f4ca} Active wizards: {active}"),
                )
                .await
        }

        _ => {
            state
                .messenger
                .send_html(chat_id, "Unknown command. Use /cmds to list commands.")
                .await
        }
    };

    if let Err(e) = result {
        tracing::warn!(user = user_id.0, command = %cmd, error = %e, "command failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/genstring@tsg_bot now"),
            ("genstring".to_string(), "now".to_string())
        );
        assert_eq!(parse_command("/CANCEL"), ("cancel".to_string(), String::new()));
        assert_eq!(
            parse_command("  /cmds  "),
            ("cmds".to_string(), String::new())
        );
    }
}
