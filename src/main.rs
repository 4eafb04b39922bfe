mod commands;
mod config;
mod db;
mod errors;
mod handlers;
mod migrations;
mod queue;
mod schema;
mod search;
mod temp_file;
mod utils;
mod video;

use std::sync::Arc;

use teloxide::prelude::*;

use crate::{
    config::Config,
    db::CacheDb,
    errors::BotResult,
    migrations::run_migrations,
    queue::{ConversionQueue, QueueSettings},
    schema::schema,
    search::SearchClient,
    utils::clear_dir,
    video::{FfmpegTranscoder, HttpFetcher, TelegramUploader},
};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    pretty_env_logger::init();

    if let Err(e) = run().await {
        log::error!("Bot stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> BotResult<()> {
    log::info!("Starting archive inline bot...");

    let config = Config::from_env()?;

    let pool = Arc::new(db::connect(&config.database_url).await?);
    run_migrations(&pool).await?;
    let cache = CacheDb::new(pool);
    match cache.count().await {
        Ok(count) => log::info!("Conversion cache holds {} entries", count),
        Err(e) => log::warn!("Could not count cached conversions: {}", e),
    }

    // Leftovers from a crash mid-conversion
    let stale = clear_dir(&config.converted_dir).await?;
    if stale > 0 {
        log::info!("Removed {} stale files from {}", stale, config.converted_dir.display());
    }

    let bot = Bot::from_env();
    let http = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()?;

    let search = Arc::new(SearchClient::new(http.clone(), config.api_base_url.as_str()));

    let queue = ConversionQueue::start(
        cache,
        Arc::new(HttpFetcher::new(http)),
        Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.as_str())),
        Arc::new(TelegramUploader::new(bot.clone(), config.upload_chat_id)),
        QueueSettings {
            output_dir: config.converted_dir.clone(),
            mode: config.transcode_mode,
            obtain_timeout: config.obtain_timeout,
        },
    );
    log::info!("Conversion queue initialized");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![queue.clone(), search])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Waiting for {} queued conversions", queue.pending_count());
    queue.shutdown().await;
    clear_dir(&config.converted_dir).await?;
    Ok(())
}
