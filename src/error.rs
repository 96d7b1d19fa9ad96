#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("io error: {0}")]
  IO(#[from] std::io::Error),

  #[error("invalid yt-dlp output: {0}")]
  Json(#[from] serde_json::Error),

  #[error("{0}")]
  Extraction(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
