use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Form, Json,
};
use http_types::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ytdlp::{self, RawEntry, RawInfo};

#[derive(Debug, Deserialize)]
pub struct MetadataReq {
  #[serde(default)]
  url: String,
}

/// `POST /get_metadata`: resolve a pasted URL to a preview of what would be
/// downloaded. Extraction failures come back as an `{"error": ...}` body so
/// the page can render them inline.
pub async fn get_metadata(Form(req): Form<MetadataReq>) -> Response {
  if req.url.is_empty() {
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": "No URL provided" })),
    )
      .into_response();
  }

  tracing::info!(url = %req.url, "fetching metadata");

  match ytdlp::probe(&req.url).await {
    Ok(info) => Json(Metadata::from(info)).into_response(),
    Err(e) => {
      tracing::warn!(url = %req.url, "metadata extraction failed: {e}");
      Json(json!({ "error": format!("Failed to get metadata: {e}") }))
        .into_response()
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Metadata {
  Video {
    id: String,
    title: Option<String>,
    thumbnail: String,
    duration: Option<f64>,
    uploader: Option<String>,
    view_count: Option<u64>,
  },
  Playlist {
    title: Option<String>,
    entries: Vec<Entry>,
  },
}

#[derive(Debug, Serialize)]
pub struct Entry {
  id: String,
  title: Option<String>,
  url: Option<String>,
  thumbnail: String,
  duration: Option<f64>,
}

impl From<RawInfo> for Metadata {
  fn from(info: RawInfo) -> Self {
    if info.kind.as_deref() == Some("playlist") {
      let entries = info
        .entries
        .into_iter()
        .flatten()
        .filter_map(Entry::from_raw)
        .collect();

      Metadata::Playlist {
        title: info.title,
        entries,
      }
    } else {
      let id = info.id.unwrap_or_default();
      let thumbnail = format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg");

      Metadata::Video {
        id,
        title: info.title,
        thumbnail,
        duration: info.duration,
        uploader: info.uploader,
        view_count: info.view_count,
      }
    }
  }
}

impl Entry {
  // entries without an id aren't downloadable, drop them
  fn from_raw(e: RawEntry) -> Option<Self> {
    let id = e.id?;
    let thumbnail = format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg");

    Some(Entry {
      id,
      title: e.title,
      url: e.url,
      thumbnail,
      duration: e.duration,
    })
  }
}

/// A URL counts as a playlist when it carries a `list` query parameter or
/// mentions "playlist" in its path.
pub fn is_playlist(url: &str) -> bool {
  let Ok(url) = url.parse::<Url>() else {
    return false;
  };

  url.query_pairs().any(|(k, _)| k == "list")
    || url.path().contains("playlist")
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::body::HttpBody;
  use serde_json::{json, Value};

  #[test]
  fn list_parameter_means_playlist() {
    assert!(is_playlist(
      "https://www.youtube.com/watch?v=abc123&list=PL123"
    ));
    assert!(is_playlist("https://www.youtube.com/playlist?list=PL123"));
  }

  #[test]
  fn watch_url_is_not_a_playlist() {
    assert!(!is_playlist("https://www.youtube.com/watch?v=abc123"));
    assert!(!is_playlist("https://youtu.be/abc123"));
  }

  #[test]
  fn garbage_url_is_not_a_playlist() {
    assert!(!is_playlist("not a url"));
  }

  #[test]
  fn single_video_reshapes_to_video_envelope() {
    let raw: RawInfo = serde_json::from_value(json!({
      "id": "abc123",
      "title": "A Video",
      "duration": 212.0,
      "uploader": "someone",
      "view_count": 42,
    }))
    .unwrap();

    let meta = serde_json::to_value(Metadata::from(raw)).unwrap();
    assert_eq!(meta["type"], "video");
    assert_eq!(meta["title"], "A Video");
    assert_eq!(
      meta["thumbnail"],
      "https://i.ytimg.com/vi/abc123/hqdefault.jpg"
    );
    assert_eq!(meta["view_count"], 42);
  }

  #[test]
  fn playlist_reshapes_and_drops_idless_entries() {
    let raw: RawInfo = serde_json::from_value(json!({
      "_type": "playlist",
      "title": "Mix",
      "entries": [
        { "id": "one", "title": "First", "url": "https://youtu.be/one", "duration": 10.0 },
        { "title": "broken entry" },
        null,
        { "id": "two", "title": "Second", "url": "https://youtu.be/two", "duration": 20.0 },
      ],
    }))
    .unwrap();

    let meta = serde_json::to_value(Metadata::from(raw)).unwrap();
    assert_eq!(meta["type"], "playlist");

    let entries = meta["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "one");
    assert_eq!(
      entries[0]["thumbnail"],
      "https://i.ytimg.com/vi/one/mqdefault.jpg"
    );
    assert_eq!(entries[1]["id"], "two");
  }

  #[tokio::test]
  async fn missing_url_yields_400() {
    let resp = get_metadata(Form(MetadataReq { url: String::new() })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let mut body = resp.into_body();
    let bytes = body.data().await.unwrap().unwrap();
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["error"], "No URL provided");
  }
}
