//! In-process HTTP origin serving one byte buffer at every path.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

#[derive(Debug, Clone, Default)]
pub struct OriginOptions {
    /// Require these basic-auth credentials.
    pub auth: Option<(String, String)>,
    /// Answer ranged requests with the whole body and 200.
    pub ignore_ranges: bool,
}

pub struct Origin {
    pub addr: SocketAddr,
    /// `http://127.0.0.1:<port>/`
    pub base_url: String,
    pub hits: Arc<AtomicUsize>,
}

impl Origin {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

struct OriginState {
    body: Vec<u8>,
    expected_auth: Option<String>,
    ignore_ranges: bool,
    hits: Arc<AtomicUsize>,
}

/// Spawn an origin serving `body` on an ephemeral loopback port.
pub async fn serve(body: Vec<u8>, options: OriginOptions) -> Result<Origin> {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = Arc::new(OriginState {
        body,
        expected_auth: options
            .auth
            .map(|(user, pass)| format!("Basic {}", BASE64.encode(format!("{user}:{pass}")))),
        ignore_ranges: options.ignore_ranges,
        hits: hits.clone(),
    });

    let app = Router::new()
        .route("/{*path}", get(handle_get))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(Origin {
        addr,
        base_url: format!("http://{addr}/"),
        hits,
    })
}

async fn handle_get(State(state): State<Arc<OriginState>>, headers: HeaderMap) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    if let Some(expected) = &state.expected_auth {
        let given = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let len = state.body.len();
    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|r| parse_range(r, len));
    match range {
        Some((start, end)) if !state.ignore_ranges => (
            StatusCode::PARTIAL_CONTENT,
            [(CONTENT_RANGE, format!("bytes {start}-{end}/{len}"))],
            state.body[start..=end].to_vec(),
        )
            .into_response(),
        _ => (StatusCode::OK, state.body.clone()).into_response(),
    }
}

/// `bytes=<start>-<end>`, inclusive, clamped to the body.
fn parse_range(header: &str, len: usize) -> Option<(usize, usize)> {
    let (start, end) = header.strip_prefix("bytes=")?.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = end.trim().parse().ok()?;
    let end = end.min(len.checked_sub(1)?);
    (start <= end).then_some((start, end))
}
