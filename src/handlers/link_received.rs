use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::InputFile,
};

use crate::{
    errors::{BotError, HandlerResult},
    queue::ConversionQueue,
    search::{MediaKind, Post, SearchClient},
    utils::parse_post_id,
};

pub async fn link_received(
    bot: Bot,
    msg: Message,
    search: Arc<SearchClient>,
    queue: Arc<ConversionQueue>,
) -> HandlerResult {
    let text = msg
        .text()
        .ok_or_else(|| BotError::general("Text should be here. It's invalid state"))?;

    let Some(post_id) = parse_post_id(text, search.base_url()) else {
        bot.send_message(msg.chat.id, "Send me a post link or id, or use me inline.")
            .await?;
        return Ok(());
    };

    let post = match search.post(post_id).await {
        Ok(post) => post,
        Err(e) => {
            log::warn!("Could not load post {}: {}", post_id, e);
            bot.send_message(msg.chat.id, "❌ Couldn't find that post.")
                .await?;
            return Ok(());
        }
    };

    send_post(&bot, &msg, &post, &queue).await
}

async fn send_post(
    bot: &Bot,
    msg: &Message,
    post: &Post,
    queue: &Arc<ConversionQueue>,
) -> HandlerResult {
    let Some(url) = post.file.url.as_deref() else {
        bot.send_message(msg.chat.id, "❌ This post's file is not available.")
            .await?;
        return Ok(());
    };

    match post.kind() {
        MediaKind::Image => {
            let url = reqwest::Url::parse(url).map_err(|e| BotError::parse_error(e.to_string()))?;
            bot.send_photo(msg.chat.id, InputFile::url(url)).await?;
        }
        MediaKind::Gif => {
            let url = reqwest::Url::parse(url).map_err(|e| BotError::parse_error(e.to_string()))?;
            bot.send_animation(msg.chat.id, InputFile::url(url)).await?;
        }
        MediaKind::Webm => send_converted(bot, msg, post, queue).await?,
        MediaKind::Other => {
            bot.send_message(
                msg.chat.id,
                format!("❌ .{} files are not supported.", post.file.ext),
            )
            .await?;
        }
    }

    Ok(())
}

async fn send_converted(
    bot: &Bot,
    msg: &Message,
    post: &Post,
    queue: &Arc<ConversionQueue>,
) -> HandlerResult {
    let Some(source) = post.source_media() else {
        return Ok(());
    };

    let pending = queue.pending_count();
    let status_text = if pending > 0 {
        format!("⏳ Converting video ({} ahead in queue)...", pending)
    } else {
        "⏳ Converting video...".to_string()
    };
    let status_msg = bot.send_message(msg.chat.id, status_text).await?;

    match queue.obtain(source).await {
        Some(handle) => {
            bot.send_video(msg.chat.id, InputFile::file_id(handle))
                .await?;
            let _ = bot.delete_message(msg.chat.id, status_msg.id).await;
        }
        None => {
            bot.edit_message_text(
                msg.chat.id,
                status_msg.id,
                "❌ This video is unavailable right now, try again later.",
            )
            .await?;
        }
    }

    Ok(())
}
