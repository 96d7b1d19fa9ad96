use std::{convert::Infallible, process::Stdio};

use async_stream::stream;
use axum::{
  extract::Query,
  response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  process::Command,
};

use crate::{util, ytdlp};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
  Video,
  Audio,
}

impl MediaType {
  fn processing_message(self) -> &'static str {
    match self {
      MediaType::Video => "Finalizing download...",
      MediaType::Audio => "Converting to MP3...",
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct DownloadReq {
  url: String,
  media_type: MediaType,
  #[serde(default)]
  playlist_indices: Option<String>,
}

/// `GET /download`: run one yt-dlp process and relay its progress as
/// server-sent events. Each event is either a JSON envelope, the literal
/// `COMPLETE`, or `ERROR: <message>`.
pub async fn download(
  Query(req): Query<DownloadReq>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
  tracing::info!(
    url = %req.url,
    media_type = ?req.media_type,
    "starting download"
  );

  let cmd = ytdlp::download_command(
    &req.url,
    req.media_type,
    req.playlist_indices.as_deref(),
  );

  let events = event_stream(cmd, req.media_type)
    .map(|payload| Ok::<_, Infallible>(Event::default().data(payload)));

  Sse::new(events).keep_alive(KeepAlive::default())
}

/// Spawn the child and translate its line output into event payloads. The
/// stream always ends with a terminal `COMPLETE` or `ERROR: ...` payload; a
/// failure mid-playlist aborts the whole stream.
fn event_stream(
  mut cmd: Command,
  media_type: MediaType,
) -> impl Stream<Item = String> {
  stream! {
    let _permit = util::YTDLP_MUTEX
      .acquire()
      .await
      .expect("semaphore is never closed");

    if let Err(e) = std::fs::create_dir_all(&*util::DOWNLOAD_DIR) {
      yield format!("ERROR: {e}");
      return;
    }

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
      Ok(child) => child,
      Err(e) => {
        yield format!("ERROR: {e}");
        return;
      }
    };

    let stdout = child.stdout.take().expect("stdout not opened");
    let stderr = child.stderr.take().expect("stderr not opened");

    // drain stderr in the background, remembering the last fatal line
    let stderr_task = tokio::spawn(async move {
      let mut lines = BufReader::new(stderr).lines();
      let mut last_error = None;
      while let Ok(Some(line)) = lines.next_line().await {
        if let Some(msg) = line.strip_prefix("ERROR: ") {
          tracing::warn!("yt-dlp: {line}");
          last_error = Some(msg.to_string());
        }
      }
      last_error
    });

    let mut lines = BufReader::new(stdout).lines();
    // suppress repeated postprocess markers until the next download chunk
    let mut processing = false;

    while let Ok(Some(line)) = lines.next_line().await {
      match parse_line(&line) {
        Some(LineEvent::Progress(raw)) => {
          processing = false;
          if let Some(json) = encode(&reshape(raw)) {
            yield json;
          }
        }
        Some(LineEvent::Postprocess) if !processing => {
          processing = true;
          let event = ProgressEvent::Processing {
            message: media_type.processing_message(),
          };
          if let Some(json) = encode(&event) {
            yield json;
          }
        }
        Some(LineEvent::Postprocess) | None => {}
      }
    }

    let status = child.wait().await;
    let last_error = stderr_task.await.ok().flatten();

    match status {
      Ok(status) if status.success() => yield "COMPLETE".to_string(),
      Ok(status) => {
        let msg = last_error
          .unwrap_or_else(|| format!("yt-dlp exited with {status}"));
        yield format!("ERROR: {msg}");
      }
      Err(e) => yield format!("ERROR: {e}"),
    }
  }
}

/// The envelope sent to the browser, one JSON object per event.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ProgressEvent {
  Download {
    percentage: String,
    downloaded_bytes: Option<u64>,
    total_bytes: Option<u64>,
    speed: String,
    eta: String,
  },
  Processing {
    message: &'static str,
  },
}

/// One `progress:{json}` line, as rendered by the download template in
/// `ytdlp`. Byte counts come back as floats for some extractors.
#[derive(Debug, Deserialize)]
struct RawProgress {
  downloaded_bytes: Option<f64>,
  total_bytes: Option<f64>,
  total_bytes_estimate: Option<f64>,
  percent: Option<String>,
  speed: Option<String>,
  eta: Option<String>,
}

enum LineEvent {
  Progress(RawProgress),
  Postprocess,
}

fn parse_line(line: &str) -> Option<LineEvent> {
  if line.trim() == "postprocess" {
    return Some(LineEvent::Postprocess);
  }

  let json = line.strip_prefix("progress:")?;
  match serde_json::from_str(json) {
    Ok(raw) => Some(LineEvent::Progress(raw)),
    Err(e) => {
      tracing::debug!("unparsable progress line {line:?}: {e}");
      None
    }
  }
}

fn reshape(raw: RawProgress) -> ProgressEvent {
  let percentage = raw
    .percent
    .as_deref()
    .unwrap_or("0%")
    .trim()
    .trim_end_matches('%')
    .to_string();

  ProgressEvent::Download {
    percentage,
    downloaded_bytes: raw.downloaded_bytes.map(|b| b as u64),
    total_bytes: raw
      .total_bytes
      .or(raw.total_bytes_estimate)
      .map(|b| b as u64),
    speed: trim_or_na(raw.speed),
    eta: trim_or_na(raw.eta),
  }
}

fn trim_or_na(s: Option<String>) -> String {
  match s {
    Some(s) => s.trim().to_string(),
    None => "N/A".to_string(),
  }
}

fn encode(event: &ProgressEvent) -> Option<String> {
  match serde_json::to_string(event) {
    Ok(json) => Some(json),
    Err(e) => {
      tracing::error!("failed to encode progress event: {e}");
      None
    }
  }
}
