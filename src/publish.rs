//! Read-only HTTP view of the navigation state for the display layer.
//!
//! `GET /state` returns one snapshot, `GET /ws` pushes a snapshot every
//! 500 ms until the client goes away.

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::nav_state::{current_timestamp, NavSnapshot, SharedNavState};

const PUSH_INTERVAL: Duration = Duration::from_millis(500);

pub fn router(state: SharedNavState) -> Router {
    Router::new()
        .route("/state", get(state_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: SharedNavState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding publish port {}", port))?;
    log::info!("[publish] serving navigation state at http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("publish server")
}

async fn state_handler(State(state): State<SharedNavState>) -> Json<NavSnapshot> {
    Json(state.snapshot(current_timestamp()))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedNavState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: SharedNavState) {
    loop {
        let snapshot = state.snapshot(current_timestamp());
        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("[publish] cannot encode snapshot: {}", e);
                break;
            }
        };
        if socket.send(Message::Text(json)).await.is_err() {
            // Client disconnected
            break;
        }
        sleep(PUSH_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav_state::NavState;
    use crate::types::Source;
    use std::future::IntoFuture;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_state_endpoint_returns_snapshot() {
        let state = NavState::shared(4.0);
        state.heading.store(271.5, Source::Network, current_timestamp());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(axum::serve(listener, router(state)).into_future());

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /state HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"heading_deg\":271.5"));
        assert!(response.contains("\"heading_source\":\"network\""));
        server.abort();
    }
}
