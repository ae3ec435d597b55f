//! WebSocket push channel: inbound [`PushEvent`]s, outbound [`ControlEvent`]s.

use std::fmt;

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use shared::models::{ControlEvent, PushEvent, UserId};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as Frame};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derives the push endpoint from the HTTP base URL.
///
/// # Errors
/// Returns an error if `base` cannot be joined with the endpoint path.
pub fn push_url(base: &Url, user: UserId) -> ClientResult<Url> {
    let mut url = base.join("ws")?;
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) is always an accepted scheme change
    let _ = url.set_scheme(scheme);
    url.query_pairs_mut()
        .clear()
        .append_pair("userId", &user.to_string());
    Ok(url)
}

/// Opens the push channel for `user`.
///
/// # Errors
/// Returns an error if the handshake fails.
pub async fn connect(base: &Url, user: UserId) -> ClientResult<(PushSender, PushReceiver)> {
    let url = push_url(base, user)?;
    let (socket, _) = connect_async(url.as_str()).await?;
    info!(user_id = %user, "push channel connected");
    let (sink, stream) = socket.split();
    Ok((PushSender { sink }, PushReceiver { stream }))
}

/// Outbound half.
pub struct PushSender {
    sink: SplitSink<Socket, Frame>,
}

impl fmt::Debug for PushSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushSender").finish_non_exhaustive()
    }
}

impl PushSender {
    /// # Errors
    /// Returns an error if the frame cannot be written.
    pub async fn send(&mut self, control: ControlEvent) -> ClientResult<()> {
        let frame = serde_json::to_string(&control)?;
        self.sink.send(Frame::Text(frame.into())).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the close frame cannot be written.
    pub async fn close(mut self) -> ClientResult<()> {
        self.sink.close().await?;
        Ok(())
    }
}

/// Inbound half.
pub struct PushReceiver {
    stream: SplitStream<Socket>,
}

impl fmt::Debug for PushReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushReceiver").finish_non_exhaustive()
    }
}

impl PushReceiver {
    /// Next push event, or `None` once the server closes the channel.
    ///
    /// Malformed frames are logged and skipped.
    pub async fn next(&mut self) -> Option<ClientResult<PushEvent>> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Frame::Text(text)) => match serde_json::from_str::<PushEvent>(text.as_str()) {
                    Ok(event) => return Some(Ok(event)),
                    Err(err) => warn!(error = %err, "skipping malformed push event"),
                },
                Ok(Frame::Close(_)) => {
                    debug!("push channel closed by server");
                    return None;
                }
                Ok(_) => {}
                Err(err) => return Some(Err(ClientError::from(err))),
            }
        }
        None
    }
}
