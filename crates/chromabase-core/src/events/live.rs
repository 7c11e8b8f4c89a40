//! Live stream broadcaster.
//!
//! Every connected subscriber gets every change event, whatever its
//! collection. Each subscriber owns a bounded channel; broadcasting never
//! waits on a subscriber. A subscriber whose channel is full or closed is
//! removed, so an open stream never silently skips an event: a lagging client
//! sees its stream end and has to reconnect.

use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::error::{ChromaError, ChromaResult, ErrorCode};
use crate::events::ChangeEvent;

/// Event name of the acknowledgment frame sent on subscribe.
pub const CONNECTED_EVENT: &str = "connected";

/// One frame on the live stream: an event name and its JSON data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFrame {
    event: &'static str,
    data: Arc<str>,
}

impl LiveFrame {
    /// The `connected` acknowledgment.
    pub fn connected() -> Self {
        Self {
            event: CONNECTED_EVENT,
            data: Arc::from(r#"{"status":"connected"}"#),
        }
    }

    /// Frame for a change event: named by its kind, data `{collection, data, timestamp}`.
    pub fn change(event: &ChangeEvent) -> ChromaResult<Self> {
        let data = serde_json::to_string(&event.stream_payload())?;
        Ok(Self {
            event: event.kind().as_str(),
            data: Arc::from(data),
        })
    }

    pub fn event(&self) -> &str {
        self.event
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

/// Lifecycle of a live subscriber. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Connecting,
    Open,
    Closed,
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the frame was queued for.
    pub delivered: usize,
    /// Subscribers disconnected because their buffer was full.
    pub lagged: usize,
    /// Subscribers found disconnected and removed.
    pub removed: usize,
}

struct Shared {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<LiveFrame>>>,
    next_id: AtomicU64,
    buffer: usize,
    shut_down: AtomicBool,
}

impl Shared {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, mpsc::Sender<LiveFrame>>> {
        // A poisoned lock still guards a valid map.
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, id: u64) -> bool {
        self.subscribers().remove(&id).is_some()
    }
}

/// Set of currently connected live subscribers.
#[derive(Clone)]
pub struct LiveBroadcaster {
    shared: Arc<Shared>,
}

impl LiveBroadcaster {
    /// Create a broadcaster; `buffer` is the per-subscriber frame capacity.
    pub fn new(buffer: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Open a new subscriber. Its first frame is the `connected` acknowledgment.
    pub fn subscribe(&self) -> ChromaResult<SubscriberHandle> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        if self.shared.shut_down.load(Ordering::Acquire) {
            return Err(ChromaError::Broadcast {
                subscriber_id: id,
                code: ErrorCode::LiveClosed,
            });
        }

        let (sender, receiver) = mpsc::channel(self.shared.buffer);
        let mut handle = SubscriberHandle {
            id,
            receiver,
            shared: self.shared.clone(),
            state: SubscriberState::Connecting,
        };

        sender
            .try_send(LiveFrame::connected())
            .map_err(|_| ChromaError::Broadcast {
                subscriber_id: id,
                code: ErrorCode::LiveClosed,
            })?;
        self.shared.subscribers().insert(id, sender);
        handle.state = SubscriberState::Open;

        debug!(subscriber_id = id, "Live subscriber connected");
        Ok(handle)
    }

    /// Close a subscriber. Returns false if it was already closed.
    pub fn unsubscribe(&self, mut handle: SubscriberHandle) -> bool {
        handle.close()
    }

    /// Push `event` to every open subscriber.
    pub fn broadcast(&self, event: &ChangeEvent) -> BroadcastReport {
        let frame = match LiveFrame::change(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event_id = %event.id(), error = %e, "Failed to encode live frame");
                return BroadcastReport::default();
            }
        };
        self.send_frame(frame)
    }

    fn send_frame(&self, frame: LiveFrame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut subscribers = self.shared.subscribers();

        subscribers.retain(|id, sender| match sender.try_send(frame.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.lagged += 1;
                warn!(subscriber_id = *id, "Live subscriber fell behind, disconnecting");
                false
            }
            Err(TrySendError::Closed(_)) => {
                report.removed += 1;
                let err = ChromaError::Broadcast {
                    subscriber_id: *id,
                    code: ErrorCode::LiveClosed,
                };
                debug!(error = %err, "Removing disconnected live subscriber");
                false
            }
        });

        report
    }

    /// Close every subscriber and refuse new ones. Returns how many were open.
    pub fn close_all(&self) -> usize {
        self.shared.shut_down.store(true, Ordering::Release);
        let mut subscribers = self.shared.subscribers();
        let count = subscribers.len();
        subscribers.clear();
        if count > 0 {
            debug!(count, "Closed all live subscribers");
        }
        count
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers().len()
    }
}

/// A connected live subscriber.
///
/// Yields frames via [`SubscriberHandle::recv`] or as a [`Stream`]. Dropping
/// the handle unsubscribes it.
pub struct SubscriberHandle {
    id: u64,
    receiver: mpsc::Receiver<LiveFrame>,
    shared: Arc<Shared>,
    state: SubscriberState,
}

impl SubscriberHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state. A subscriber the broadcaster dropped reads as `Closed`.
    pub fn state(&self) -> SubscriberState {
        match self.state {
            SubscriberState::Open if !self.shared.subscribers().contains_key(&self.id) => {
                SubscriberState::Closed
            }
            state => state,
        }
    }

    /// Next frame, or `None` once the subscriber is closed and drained.
    pub async fn recv(&mut self) -> Option<LiveFrame> {
        self.receiver.recv().await
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<LiveFrame> {
        self.receiver.try_recv().ok()
    }

    /// Leave the live stream. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        if self.state == SubscriberState::Closed {
            return false;
        }
        self.state = SubscriberState::Closed;
        self.receiver.close();
        let removed = self.shared.remove(self.id);
        if removed {
            debug!(subscriber_id = self.id, "Live subscriber disconnected");
        }
        removed
    }
}

impl Stream for SubscriberHandle {
    type Item = LiveFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Document;
    use futures::StreamExt;
    use serde_json::json;

    fn deliverable_update() -> ChangeEvent {
        let mut fields = Document::new();
        fields.insert("status".into(), json!("Completed"));
        ChangeEvent::updated("deliverables", "d1", fields)
    }

    #[tokio::test]
    async fn test_subscribe_sends_connected_first() {
        let broadcaster = LiveBroadcaster::new(8);
        let mut sub = broadcaster.subscribe().unwrap();
        assert_eq!(sub.state(), SubscriberState::Open);

        let frame = sub.recv().await.unwrap();
        assert_eq!(frame.event(), "connected");
        assert_eq!(frame.data(), r#"{"status":"connected"}"#);
    }

    #[tokio::test]
    async fn test_all_subscribers_get_identical_frame() {
        let broadcaster = LiveBroadcaster::new(8);
        let mut a = broadcaster.subscribe().unwrap();
        let mut b = broadcaster.subscribe().unwrap();
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        let report = broadcaster.broadcast(&deliverable_update());
        assert_eq!(report.delivered, 2);

        let fa = a.recv().await.unwrap();
        let fb = b.recv().await.unwrap();
        assert_eq!(fa, fb);
        assert_eq!(fa.event(), "updated");
        let data: serde_json::Value = serde_json::from_str(fa.data()).unwrap();
        assert_eq!(data["collection"], "deliverables");
        assert_eq!(data["data"]["status"], "Completed");

        // Joined after the broadcast: only the acknowledgment.
        let mut late = broadcaster.subscribe().unwrap();
        assert_eq!(late.recv().await.unwrap().event(), "connected");
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_handle_is_unsubscribed() {
        let broadcaster = LiveBroadcaster::new(8);
        let sub = broadcaster.subscribe().unwrap();
        assert_eq!(broadcaster.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.broadcast(&deliverable_update()).delivered, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_terminal() {
        let broadcaster = LiveBroadcaster::new(8);
        let mut sub = broadcaster.subscribe().unwrap();
        assert!(sub.close());
        assert_eq!(sub.state(), SubscriberState::Closed);
        assert!(!sub.close());

        let other = broadcaster.subscribe().unwrap();
        assert!(broadcaster.unsubscribe(other));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_disconnected() {
        let broadcaster = LiveBroadcaster::new(1);
        let mut slow = broadcaster.subscribe().unwrap();
        let mut fast = broadcaster.subscribe().unwrap();
        assert_eq!(fast.recv().await.unwrap().event(), "connected");

        // The slow buffer still holds the acknowledgment.
        let report = broadcaster.broadcast(&deliverable_update());
        assert_eq!(report.lagged, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(slow.state(), SubscriberState::Closed);
        assert_eq!(broadcaster.subscriber_count(), 1);

        // Queued frames drain, then the stream ends instead of skipping ahead.
        assert_eq!(slow.recv().await.unwrap().event(), "connected");
        assert!(slow.recv().await.is_none());

        assert_eq!(fast.recv().await.unwrap().event(), "updated");
        assert_eq!(broadcaster.broadcast(&deliverable_update()).delivered, 1);
        assert_eq!(fast.recv().await.unwrap().event(), "updated");
    }

    #[tokio::test]
    async fn test_close_all_ends_streams_and_refuses_new_subscribers() {
        let broadcaster = LiveBroadcaster::new(8);
        let sub = broadcaster.subscribe().unwrap();
        assert_eq!(broadcaster.close_all(), 1);
        assert_eq!(sub.state(), SubscriberState::Closed);

        let frames: Vec<LiveFrame> = sub.collect().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event(), "connected");

        let err = broadcaster.subscribe().err().unwrap();
        assert_eq!(err.code(), ErrorCode::LiveClosed);
    }
}
