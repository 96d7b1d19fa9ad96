use axum::{
  headers::ContentType,
  response::IntoResponse,
  routing::{get, post},
  Router, TypedHeader,
};

mod download;
mod error;
mod metadata;
mod util;
mod ytdlp;

pub use error::{Error, Result};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let app = Router::new()
    .route("/", get(homepage))
    .route("/health", get(health))
    .route("/get_metadata", post(metadata::get_metadata))
    .route("/download", get(download::download));

  std::fs::create_dir_all(&*util::DOWNLOAD_DIR)?;

  let addr = format!("127.0.0.1:{}", *util::PORT)
    .parse()
    .expect("PORT must be a valid port number");

  tracing::info!("listening on http://{addr}");

  axum::Server::bind(&addr)
    .serve(app.into_make_service())
    .await
    .expect("Failed to start server");

  Ok(())
}

pub const INDEX_HTML: &str = include_str!("../html/index.html");

async fn homepage() -> impl IntoResponse {
  (TypedHeader::<ContentType>(ContentType::html()), INDEX_HTML)
}

async fn health() -> impl IntoResponse {
  "ok".to_owned()
}
