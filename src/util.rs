use std::{path::PathBuf, sync::LazyLock};

use tokio::sync::Semaphore;

pub static PORT: LazyLock<u16> = LazyLock::new(|| {
  std::env::var("PORT")
    .ok()
    .and_then(|s| s.parse().ok())
    .unwrap_or(5001)
});

pub static DOWNLOAD_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
  std::env::var("DOWNLOAD_DIR")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("downloads"))
});

pub static YTDLP_BIN: LazyLock<String> = LazyLock::new(|| {
  std::env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string())
});

// ensure only a limited set of ytdlp processes at a time
pub static YTDLP_MUTEX: LazyLock<Semaphore> = LazyLock::new(|| {
  let concurrency = std::env::var("YTDLP_CONCURRENCY")
    .ok()
    .and_then(|s| s.parse::<usize>().ok())
    .unwrap_or(4);
  Semaphore::new(concurrency)
});
