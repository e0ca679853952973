//! Status stream over a hand-rolled websocket upgrade.
//!
//! Upgrade requests are recognized on any path and never reach the HTTP
//! routes (nor their counters). An accepted connection gets one status message
//! right away and then whatever the broadcast loop queues for it.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use piforge_proto::{ServiceStatus, StatusPayload, msg::ServerMessage, ws};
use tracing::{debug, trace};

use crate::AppState;

pub mod broadcast;
mod connection;

/// Route upgrade requests to the handshake, everything else to the router.
pub async fn intercept_upgrade(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !is_upgrade_request(req.headers()) {
        return next.run(req).await;
    }

    match handshake(state, req) {
        Ok(resp) => resp,
        Err(rejection) => rejection.into_response(),
    }
}

fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && headers.contains_key(header::UPGRADE)
}

fn handshake(state: AppState, mut req: Request) -> Result<Response, HandshakeRejection> {
    let headers = req.headers();

    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(HandshakeRejection::UnsupportedUpgrade(upgrade.to_owned()));
    }

    let accept = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .map(|key| key.as_bytes())
        .filter(|key| !key.is_empty())
        .map(ws::accept_key)
        .ok_or(HandshakeRejection::MissingKey)?;

    let resp = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "Upgrade")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept)
        .body(Body::empty())?;

    let on_upgrade = hyper::upgrade::on(&mut req);
    let tracker = state.ws_graceful_shutdown.tracker.clone();
    tracker.spawn(connection::handle_upgrade(on_upgrade, state));

    trace!("websocket handshake accepted");
    Ok(resp)
}

/// Encode a fresh status message as a single text frame.
pub fn status_frame(identity: &ServiceStatus) -> serde_json::Result<Bytes> {
    let msg = ServerMessage::Status(StatusPayload::now(identity.clone()));
    let json = serde_json::to_string(&msg)?;

    Ok(ws::encode_text_frame(&json))
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeRejection {
    #[error("Unsupported upgrade: {0:?}")]
    UnsupportedUpgrade(String),
    #[error("Missing Sec-WebSocket-Key header")]
    MissingKey,
    #[error("Failed to build handshake response: {0}")]
    Response(#[from] axum::http::Error),
}

impl IntoResponse for HandshakeRejection {
    fn into_response(self) -> Response {
        debug!(reason = %self, "websocket upgrade rejected");
        let status = match self {
            HandshakeRejection::UnsupportedUpgrade(_) | HandshakeRejection::MissingKey => {
                StatusCode::BAD_REQUEST
            }
            HandshakeRejection::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, [(header::CONNECTION, "close")], self.to_string()).into_response()
    }
}
