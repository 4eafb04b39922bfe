use std::{path::PathBuf, str::FromStr, time::Duration};

use teloxide::types::ChatId;

use crate::errors::{BotError, BotResult};
use crate::video::AudioMode;

const DEFAULT_DATABASE_URL: &str = "sqlite:archive_bot.db";
const DEFAULT_CONVERTED_DIR: &str = "converted";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_OBTAIN_TIMEOUT_SECS: u64 = 300;
const DEFAULT_API_URL: &str = "https://e621.net";
const DEFAULT_USER_AGENT: &str = "archive-inline-bot/0.1";

/// Runtime settings read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Chat that receives converted uploads
    pub upload_chat_id: ChatId,
    pub converted_dir: PathBuf,
    pub ffmpeg_path: String,
    pub transcode_mode: AudioMode,
    /// `None` when `OBTAIN_TIMEOUT_SECS=0`
    pub obtain_timeout: Option<Duration>,
    pub api_base_url: String,
    pub user_agent: String,
}

impl Config {
    pub fn from_env() -> BotResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BotResult<Self> {
        let var = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let upload_chat_id = lookup("UPLOAD_CHAT_ID")
            .ok_or_else(|| BotError::invalid_parameters("UPLOAD_CHAT_ID is not set"))?;
        let upload_chat_id = upload_chat_id.trim().parse::<i64>().map_err(|e| {
            BotError::invalid_parameters(format!("UPLOAD_CHAT_ID '{}': {}", upload_chat_id, e))
        })?;

        let transcode_mode = AudioMode::from_str(&var("TRANSCODE_MODE", "audio"))?;

        let timeout_raw = var("OBTAIN_TIMEOUT_SECS", &DEFAULT_OBTAIN_TIMEOUT_SECS.to_string());
        let timeout_secs = timeout_raw.trim().parse::<u64>().map_err(|e| {
            BotError::invalid_parameters(format!("OBTAIN_TIMEOUT_SECS '{}': {}", timeout_raw, e))
        })?;
        let obtain_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        Ok(Self {
            database_url: var("DATABASE_URL", DEFAULT_DATABASE_URL),
            upload_chat_id: ChatId(upload_chat_id),
            converted_dir: PathBuf::from(var("CONVERTED_DIR", DEFAULT_CONVERTED_DIR)),
            ffmpeg_path: var("FFMPEG_PATH", DEFAULT_FFMPEG),
            transcode_mode,
            obtain_timeout,
            api_base_url: var("ARCHIVE_API_URL", DEFAULT_API_URL),
            user_agent: var("ARCHIVE_USER_AGENT", DEFAULT_USER_AGENT),
        })
    }
}
