use std::{io::ErrorKind, path::Path};

use tokio::fs;

/// Extract a post id from `<base>/posts/<id>` links or a bare number
pub fn parse_post_id(text: &str, base_url: &str) -> Option<u64> {
    let text = text.trim();

    if let Ok(id) = text.parse::<u64>() {
        return Some(id);
    }

    let host = base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_lowercase();

    let rest = text
        .strip_prefix("https://")
        .or_else(|| text.strip_prefix("http://"))?;
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    let (link_host, path) = rest.split_once('/')?;
    if link_host.to_lowercase() != host {
        return None;
    }

    let id = path.strip_prefix("posts/")?;
    // Drop query strings and trailing path segments
    let id = id.split(['?', '/', '#']).next()?;
    id.parse().ok()
}

/// Parse an inline query offset into a 1-based page number
pub fn page_from_offset(offset: &str) -> u32 {
    offset.trim().parse::<u32>().ok().filter(|p| *p > 0).unwrap_or(1)
}

/// Offset for the next page, empty when there are no more results
pub fn next_offset(page: u32, returned: usize, page_size: usize) -> String {
    if returned >= page_size {
        (page + 1).to_string()
    } else {
        String::new()
    }
}

/// Remove every file in `dir`, creating it if missing
pub async fn clear_dir(dir: impl AsRef<Path>) -> std::io::Result<usize> {
    let dir = dir.as_ref();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(dir).await?;
            return Ok(0);
        }
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
