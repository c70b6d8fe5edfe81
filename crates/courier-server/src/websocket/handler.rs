//! WebSocket message dispatch: extracts frame text and hands it to the
//! relay's session endpoint.

use std::sync::Arc;

use axum::extract::ws::Message;
use courier_relay::{ClientConnection, SessionEndpoint};
use tracing::{debug, info};

/// What the session loop should do with one WebSocket message.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    /// A protocol frame.
    Text(String),
    /// Ping or Pong: liveness only.
    Liveness,
    /// The peer is closing.
    Close,
    /// Nothing to apply.
    Ignored,
}

/// Classify a WebSocket message. UTF-8 binary frames are treated as text.
pub fn classify(msg: Message) -> Incoming {
    match msg {
        Message::Text(text) => Incoming::Text(text.to_string()),
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Incoming::Text(text),
            Err(_) => {
                info!(len = data.len(), "received non-UTF8 binary frame");
                Incoming::Ignored
            }
        },
        Message::Ping(_) | Message::Pong(_) => Incoming::Liveness,
        Message::Close(_) => Incoming::Close,
    }
}

/// Apply one protocol frame received on `conn`.
pub fn handle_message(endpoint: &SessionEndpoint, conn: &Arc<ClientConnection>, text: &str) {
    debug!(connection_id = %conn.id, len = text.len(), "inbound frame");
    endpoint.handle_text(conn, text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frames_pass_through() {
        let msg = Message::Text(String::from(r#"{"event":"agent_alive"}"#).into());
        assert_eq!(
            classify(msg),
            Incoming::Text(r#"{"event":"agent_alive"}"#.into())
        );
    }

    #[test]
    fn utf8_binary_is_text() {
        let msg = Message::Binary(b"{}".to_vec().into());
        assert_eq!(classify(msg), Incoming::Text("{}".into()));
    }

    #[test]
    fn invalid_binary_ignored() {
        let msg = Message::Binary(vec![0xff, 0xfe].into());
        assert_eq!(classify(msg), Incoming::Ignored);
    }

    #[test]
    fn control_frames() {
        assert_eq!(classify(Message::Ping(vec![].into())), Incoming::Liveness);
        assert_eq!(classify(Message::Pong(vec![].into())), Incoming::Liveness);
        assert_eq!(classify(Message::Close(None)), Incoming::Close);
    }
}
