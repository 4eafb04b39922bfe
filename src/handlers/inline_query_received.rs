use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{
        InlineQuery, InlineQueryResult, InlineQueryResultCachedVideo, InlineQueryResultGif,
        InlineQueryResultPhoto,
    },
};

use crate::{
    errors::HandlerResult,
    queue::ConversionQueue,
    search::{MediaKind, PAGE_SIZE, Post, SearchClient},
    utils::{next_offset, page_from_offset},
};

/// How long Telegram may cache an inline answer, in seconds
const INLINE_CACHE_TIME: u32 = 30;

pub async fn inline_query_received(
    bot: Bot,
    query: InlineQuery,
    search: Arc<SearchClient>,
    queue: Arc<ConversionQueue>,
) -> HandlerResult {
    let page = page_from_offset(&query.offset);
    let tags = query.query.trim();

    let posts = match search.search(tags, page).await {
        Ok(posts) => posts,
        Err(e) => {
            log::warn!("Search for '{}' (page {}) failed: {}", tags, page, e);
            Vec::new()
        }
    };

    let mut results = Vec::with_capacity(posts.len());
    for post in &posts {
        if let Some(result) = inline_result(post, &queue).await {
            results.push(result);
        }
    }

    log::debug!(
        "Answering '{}' page {} with {} of {} posts",
        tags,
        page,
        results.len(),
        posts.len()
    );

    bot.answer_inline_query(query.id, results)
        .next_offset(next_offset(page, posts.len(), PAGE_SIZE))
        .cache_time(INLINE_CACHE_TIME)
        .await?;

    Ok(())
}

async fn inline_result(post: &Post, queue: &Arc<ConversionQueue>) -> Option<InlineQueryResult> {
    let id = post.id.to_string();
    let file_url = reqwest::Url::parse(post.file.url.as_deref()?).ok()?;
    let thumbnail_url = post
        .preview
        .url
        .as_deref()
        .and_then(|url| reqwest::Url::parse(url).ok())
        .unwrap_or_else(|| file_url.clone());

    match post.kind() {
        MediaKind::Image => Some(InlineQueryResult::Photo(InlineQueryResultPhoto::new(
            id,
            file_url,
            thumbnail_url,
        ))),
        MediaKind::Gif => Some(InlineQueryResult::Gif(InlineQueryResultGif::new(
            id,
            file_url,
            thumbnail_url,
        ))),
        MediaKind::Webm => match queue.check_cached(&post.file.md5).await {
            Some(handle) => Some(InlineQueryResult::CachedVideo(
                InlineQueryResultCachedVideo::new(id, handle, format!("#{}", post.id)),
            )),
            None => {
                if let Some(source) = post.source_media() {
                    queue.warm_up(source).await;
                }
                None
            }
        },
        MediaKind::Other => None,
    }
}
