pub mod convert;
pub mod fetch;
pub mod upload;

pub use convert::{AudioMode, FfmpegTranscoder, Transcoder, output_path};
pub use fetch::{HttpFetcher, SourceFetcher};
pub use upload::{TelegramUploader, Uploader};
