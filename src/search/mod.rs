//! Client for the image archive's JSON search API.

use serde::Deserialize;

use crate::errors::BotResult;
use crate::queue::SourceMedia;

/// Results per page; also the inline answer limit
pub const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: u64,
    pub file: PostFile,
    pub preview: PreviewFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostFile {
    pub ext: String,
    pub md5: String,
    /// Absent for posts hidden from anonymous users
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewFile {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostsPage {
    posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct SinglePost {
    post: Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Gif,
    Webm,
    Other,
}

impl Post {
    pub fn kind(&self) -> MediaKind {
        match self.file.ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" => MediaKind::Image,
            "gif" => MediaKind::Gif,
            "webm" => MediaKind::Webm,
            _ => MediaKind::Other,
        }
    }

    /// Conversion source for this post, if its file is reachable
    pub fn source_media(&self) -> Option<SourceMedia> {
        let url = self.file.url.clone()?;
        Some(SourceMedia {
            content_hash: self.file.md5.clone(),
            url,
            display_name: self.id.to_string(),
        })
    }
}

/// Search API client
#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl SearchClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search posts by tag string; `page` is 1-based
    pub async fn search(&self, tags: &str, page: u32) -> BotResult<Vec<Post>> {
        let limit = PAGE_SIZE.to_string();
        let page = page.to_string();

        let response = self
            .client
            .get(format!("{}/posts.json", self.base_url))
            .query(&[("tags", tags), ("limit", limit.as_str()), ("page", page.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let page: PostsPage = response.json().await?;
        log::debug!("Search '{}' returned {} posts", tags, page.posts.len());
        Ok(page.posts)
    }

    pub async fn post(&self, id: u64) -> BotResult<Post> {
        let response = self
            .client
            .get(format!("{}/posts/{}.json", self.base_url, id))
            .send()
            .await?
            .error_for_status()?;

        let single: SinglePost = response.json().await?;
        Ok(single.post)
    }
}
