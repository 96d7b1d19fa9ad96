use std::process::ExitStatus;

use serde::Deserialize;
use tokio::process::Command;

use crate::{
  download::MediaType,
  metadata::is_playlist,
  util::{DOWNLOAD_DIR, YTDLP_BIN, YTDLP_MUTEX},
  Error, Result,
};

// everything yt-dlp. requires the yt-dlp executable (and ffmpeg for
// merging/transcoding) to be in PATH.

/// Raw shape of `yt-dlp --dump-single-json --flat-playlist` output. Only the
/// fields we reshape are kept; `entries` may contain nulls for unavailable
/// videos.
#[derive(Debug, Deserialize)]
pub struct RawInfo {
  #[serde(rename = "_type", default)]
  pub kind: Option<String>,
  pub id: Option<String>,
  pub title: Option<String>,
  pub duration: Option<f64>,
  pub uploader: Option<String>,
  pub view_count: Option<u64>,
  #[serde(default)]
  pub entries: Vec<Option<RawEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct RawEntry {
  pub id: Option<String>,
  pub title: Option<String>,
  pub url: Option<String>,
  pub duration: Option<f64>,
}

/// Fetch video/playlist metadata without downloading any media.
pub async fn probe(url: &str) -> Result<RawInfo> {
  let _permit = YTDLP_MUTEX
    .acquire()
    .await
    .expect("semaphore is never closed");

  let output = Command::new(&*YTDLP_BIN)
    // don't fetch individual video pages for playlist entries
    .arg("--flat-playlist")
    // emit the output as a single json object instead of jsonl
    .arg("--dump-single-json")
    .arg("--no-warnings")
    .arg(url)
    .output()
    .await?;

  if !output.status.success() {
    return Err(Error::Extraction(last_error_line(
      &output.stderr,
      output.status,
    )));
  }

  Ok(serde_json::from_slice(&output.stdout)?)
}

// yt-dlp prefixes its fatal messages with "ERROR: " on stderr
fn last_error_line(stderr: &[u8], status: ExitStatus) -> String {
  String::from_utf8_lossy(stderr)
    .lines()
    .rev()
    .find_map(|line| line.strip_prefix("ERROR: "))
    .map(str::to_string)
    .unwrap_or_else(|| format!("yt-dlp exited with {status}"))
}

/// Per-chunk progress, rendered by yt-dlp itself as a machine-readable
/// `progress:{json}` line. The `j` conversion json-quotes strings and turns
/// missing fields into null, so each line parses as-is.
const DOWNLOAD_TEMPLATE: &str = concat!(
  "download:progress:{",
  "\"downloaded_bytes\":%(progress.downloaded_bytes)j,",
  "\"total_bytes\":%(progress.total_bytes)j,",
  "\"total_bytes_estimate\":%(progress.total_bytes_estimate)j,",
  "\"percent\":%(progress._percent_str)j,",
  "\"speed\":%(progress._speed_str)j,",
  "\"eta\":%(progress._eta_str)j}",
);

const POSTPROCESS_TEMPLATE: &str = "postprocess:postprocess";

/// Build the download command for one request. The child runs with the
/// download folder as its working directory, so the output template stays
/// relative.
pub fn download_command(
  url: &str,
  media_type: MediaType,
  playlist_indices: Option<&str>,
) -> Command {
  let mut cmd = Command::new(&*YTDLP_BIN);
  cmd
    .arg("--no-warnings")
    .arg("--newline")
    .arg("--restrict-filenames")
    .arg("-o")
    .arg("%(title)s.%(ext)s")
    .arg("--progress-template")
    .arg(DOWNLOAD_TEMPLATE)
    .arg("--progress-template")
    .arg(POSTPROCESS_TEMPLATE);

  match media_type {
    MediaType::Video => {
      cmd
        .arg("-f")
        .arg("bestvideo[height<=1080]+bestaudio")
        .arg("--merge-output-format")
        .arg("mp4")
        .arg("--recode-video")
        .arg("mp4");
    }
    MediaType::Audio => {
      cmd
        .arg("-f")
        .arg("bestaudio/best")
        .arg("-x")
        .arg("--audio-format")
        .arg("mp3")
        // best quality
        .arg("--audio-quality")
        .arg("0");
    }
  }

  match playlist_indices {
    Some(indices) => {
      cmd.arg("--playlist-items").arg(indices);
    }
    None if !is_playlist(url) => {
      cmd.arg("--no-playlist");
    }
    None => {}
  }

  cmd.current_dir(&*DOWNLOAD_DIR).arg(url);
  cmd
}
