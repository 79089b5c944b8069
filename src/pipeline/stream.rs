//! Streaming completion relay.
//!
//! Tokens are forwarded to the caller as they arrive while the full text is
//! accumulated. When the upstream stream ends cleanly, a single `FnOnce`
//! completion handler receives the whole answer and its payload is emitted
//! as the last event. Mid-stream failures and client disconnects skip the
//! handler entirely.

use std::future::Future;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::llm::TokenStream;

use super::types::FinalPayload;

/// Sent in place of the final payload when the upstream stream breaks.
pub const STREAM_INTERRUPTED_MESSAGE: &str =
    "The answer was interrupted before it finished. Please try again.";

/// One event on a turn's outbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Raw model text, in production order.
    Token(String),
    /// Enriched answer and follow-ups. Always the last event on success.
    Final(FinalPayload),
    /// The model stream failed mid-flight; no final payload follows.
    Failed(String),
}

/// Why a relay stopped before the upstream stream finished.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("upstream stream failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("client disconnected")]
    Disconnected,
}

/// Receiving end of a turn's event stream.
pub struct TurnStream {
    events: mpsc::Receiver<StreamEvent>,
}

impl TurnStream {
    /// Next event, or `None` once the stream is closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Drain every remaining event.
    pub async fn collect(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> ReceiverStream<StreamEvent> {
        ReceiverStream::new(self.events)
    }
}

/// Forward every token to `tx` and return the accumulated text once the
/// upstream stream ends.
pub async fn relay_tokens(
    mut tokens: TokenStream,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<String, RelayError> {
    let mut full_text = String::new();
    let mut count = 0usize;

    while let Some(item) = tokens.next().await {
        let token = item?;
        if token.is_empty() {
            continue;
        }
        full_text.push_str(&token);
        count += 1;
        tx.send(StreamEvent::Token(token))
            .await
            .map_err(|_| RelayError::Disconnected)?;
    }

    debug!(tokens = count, chars = full_text.len(), "Token stream drained");
    Ok(full_text)
}

/// Spawn the relay task and return the caller's end of the stream.
///
/// `on_complete` runs at most once, only after the upstream stream has ended
/// cleanly, and only while the caller is still listening. A caller that went
/// away before the end gets no enrichment at all.
pub fn spawn_relay<F, Fut>(tokens: TokenStream, buffer: usize, on_complete: F) -> TurnStream
where
    F: FnOnce(String) -> Fut + Send + 'static,
    Fut: Future<Output = FinalPayload> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::spawn(async move {
        match relay_tokens(tokens, &tx).await {
            Ok(_) if tx.is_closed() => {
                info!("Client disconnected before the answer finished, abandoning enrichment");
            }
            Ok(full_text) => {
                let payload = on_complete(full_text).await;
                if tx.send(StreamEvent::Final(payload)).await.is_err() {
                    debug!("Client went away before the final payload");
                }
            }
            Err(RelayError::Upstream(e)) => {
                warn!(error = %e, "Completion stream failed mid-flight, skipping enrichment");
                let _ = tx
                    .send(StreamEvent::Failed(STREAM_INTERRUPTED_MESSAGE.to_string()))
                    .await;
            }
            Err(RelayError::Disconnected) => {
                info!("Client disconnected mid-stream, abandoning enrichment");
            }
        }
    });

    TurnStream { events: rx }
}
