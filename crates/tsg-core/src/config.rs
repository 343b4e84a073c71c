use std::{env, fs, path::Path, time::Duration};

use crate::{domain::ChatId, errors::Error, Result};

/// Typed process configuration, loaded once at startup and passed explicitly
/// to everything that needs it (no ambient global lookups, so sessions stay
/// testable with injected fakes).
#[derive(Clone, Debug)]
pub struct Config {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Operator chat receiving failure audits.
    pub operator: ChatId,

    /// Bound on each call into the remote account service.
    pub auth_timeout: Duration,
    /// Wizards idle longer than this are swept.
    pub wizard_idle_timeout: Duration,
    /// Wizard starts allowed per user per hour.
    pub wizard_starts_per_hour: u32,

    /// Append-only JSON-lines failure log.
    pub audit_log_path: std::path::PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let operator = env_i64("OWNER_ID").ok_or_else(|| {
            Error::Config("OWNER_ID environment variable is required".to_string())
        })?;

        let auth_timeout = Duration::from_millis(env_u64("AUTH_TIMEOUT_MS").unwrap_or(60_000));
        let wizard_idle_timeout =
            Duration::from_secs(env_u64("WIZARD_IDLE_TIMEOUT_SECS").unwrap_or(900));
        let wizard_starts_per_hour = env_u32("WIZARD_STARTS_PER_HOUR").unwrap_or(5);

        let audit_log_path = env_str("AUDIT_LOG_PATH")
            .unwrap_or_else(|| "/tmp/tsg-audit.log".to_string())
            .into();

        Ok(Self {
            bot_token,
            operator: ChatId(operator),
            auth_timeout,
            wizard_idle_timeout,
            wizard_starts_per_hour,
            audit_log_path,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_keeps_existing_env_and_strips_quotes() {
        let path = std::path::PathBuf::from(format!("/tmp/tsg-env-{}", std::process::id()));
        std::fs::write(
            &path,
            "# comment\nTSG_TEST_A=\"quoted\"\nTSG_TEST_B=plain\n\nTSG_TEST_EXISTING=new\n",
        )
        .unwrap();

        env::set_var("TSG_TEST_EXISTING", "old");
        load_dotenv_if_present(&path);

        assert_eq!(env::var("TSG_TEST_A").unwrap(), "quoted");
        assert_eq!(env::var("TSG_TEST_B").unwrap(), "plain");
        assert_eq!(env::var("TSG_TEST_EXISTING").unwrap(), "old");

        for k in ["TSG_TEST_A", "TSG_TEST_B", "TSG_TEST_EXISTING"] {
            env::remove_var(k);
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn numeric_env_helpers_reject_garbage() {
        env::set_var("TSG_TEST_NUM", " 42 ");
        assert_eq!(env_u64("TSG_TEST_NUM"), Some(42));
        assert_eq!(env_i64("TSG_TEST_NUM"), Some(42));
        env::set_var("TSG_TEST_NUM", "forty-two");
        assert_eq!(env_u64("TSG_TEST_NUM"), None);
        env::remove_var("TSG_TEST_NUM");
    }
}
