//! WebSocket support for live job progress.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use listgrab_core::ProgressEvent;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Interval between heartbeats sent to connected clients.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Frame pushed to progress sockets as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Progress of the running job, including its final event.
    JobProgress(ProgressEvent),
    /// Keeps idle connections open through proxies.
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::JobProgress(_) => "job_progress",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Fan-out point between the job controller and every open progress socket.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn broadcast(&self, msg: WsMessage) {
        // Err only means nobody is connected
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Forwards controller progress events to clients and emits heartbeats.
    /// Ends when the controller's event channel closes.
    pub fn forward(&self, mut events: broadcast::Receiver<ProgressEvent>) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    result = events.recv() => match result {
                        Ok(event) => broadcaster.broadcast(WsMessage::JobProgress(event)),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Progress forwarder lagged, skipped {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Progress channel closed");
                            break;
                        }
                    },
                    _ = heartbeat.tick() => {
                        broadcaster.broadcast(WsMessage::Heartbeat {
                            timestamp: Utc::now().timestamp(),
                        });
                    }
                }
            }
        })
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut stream) = socket.split();
    let updates = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("Progress client connected");

    let pusher = tokio::spawn(push_updates(sink, updates));

    // Inbound frames carry nothing but pings and the close handshake
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Progress socket read failed: {}", e);
                break;
            }
        }
    }

    pusher.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("Progress client disconnected");
}

async fn push_updates(
    mut sink: SplitSink<WebSocket, Message>,
    mut updates: broadcast::Receiver<WsMessage>,
) {
    loop {
        let msg = match updates.recv().await {
            Ok(msg) => msg,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                WS_LAG_EVENTS.inc();
                warn!("Progress client fell behind by {} messages", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                error!("Cannot encode {} message: {}", msg.kind(), e);
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            debug!("Progress client went away mid-send");
            return;
        }
        WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listgrab_core::JobStatus;

    #[test]
    fn test_progress_message_is_tagged() {
        let msg = WsMessage::JobProgress(
            ProgressEvent::new("job-1", JobStatus::Fetching, "Downloaded 1: Intro")
                .with_counts(1, Some(3)),
        );
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "job_progress");
        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["status"], "fetching");
        assert_eq!(json["current_index"], 1);
    }

    #[tokio::test]
    async fn test_forward_relays_progress_events() {
        let (events_tx, events_rx) = broadcast::channel(8);
        let broadcaster = WsBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let task = broadcaster.forward(events_rx);
        events_tx
            .send(ProgressEvent::new("job-1", JobStatus::Completed, "done"))
            .unwrap();

        match rx.recv().await.unwrap() {
            WsMessage::JobProgress(event) => assert_eq!(event.status, JobStatus::Completed),
            other => panic!("unexpected message: {:?}", other),
        }

        drop(events_tx);
        task.await.unwrap();
    }
}
