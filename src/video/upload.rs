use std::path::Path;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{InputFile, Message},
};
use tokio::fs;

use crate::errors::ConversionError;

/// Pushes a finished file to the chat platform and returns its remote handle
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, file_name: &str, path: &Path) -> Result<String, ConversionError>;
}

/// Uploads converted videos into a storage chat and keeps the file id
#[derive(Clone)]
pub struct TelegramUploader {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramUploader {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl Uploader for TelegramUploader {
    async fn upload(&self, file_name: &str, path: &Path) -> Result<String, ConversionError> {
        let bytes = fs::read(path).await?;
        log::debug!("Uploading {} ({} bytes) to {}", file_name, bytes.len(), self.chat_id);

        let message = self
            .bot
            .send_video(self.chat_id, InputFile::memory(bytes).file_name(file_name.to_owned()))
            .supports_streaming(true)
            .await
            .map_err(|e| ConversionError::upload_failed(e.to_string()))?;

        video_handle(&message)
    }
}

/// Extract the video file id, rejecting any other kind of message
fn video_handle(message: &Message) -> Result<String, ConversionError> {
    match message.video() {
        Some(video) => {
            let handle = video.file.id.to_string();
            if handle.is_empty() {
                Err(ConversionError::upload_failed("uploaded video has no file id"))
            } else {
                Ok(handle)
            }
        }
        None if message.document().is_some() => Err(ConversionError::upload_failed(
            "upload came back as a document instead of a video",
        )),
        None => Err(ConversionError::upload_failed("upload response carried no video")),
    }
}
