use async_trait::async_trait;
use reqwest::StatusCode;

use crate::errors::ConversionError;

/// Downloads the original bytes of a source post
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ConversionError>;
}

/// Plain HTTP GET against the source URL
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ConversionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ConversionError::fetch_failed(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ConversionError::fetch_failed(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ConversionError::fetch_failed(format!("reading {}: {}", url, e)))?;

        if body.is_empty() {
            return Err(ConversionError::fetch_failed(format!("GET {} returned empty body", url)));
        }

        log::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body.to_vec())
    }
}
