//! Event bus — per-task publish/subscribe fan-out to client connections.
//!
//! Two maps guarded by separate short-hold locks: connection id → sink,
//! and task id → subscribed connection ids. Sends always happen outside
//! the locks. Publishing is best-effort and non-blocking: a sink whose
//! channel is full or closed is torn down and removed from every
//! subscription, never retried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An outbound client frame.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// ISO-8601 production timestamp.
    pub timestamp: String,
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, task_id: Option<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            task_id,
            timestamp: Utc::now().to_rfc3339(),
            data,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sinks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The sink failed; the bus will disconnect the owning connection.
#[derive(Debug)]
pub struct SinkClosed;

/// Where frames for one client connection go. `send` must not block:
/// the production impl pushes onto a bounded channel drained by the
/// socket writer task.
pub trait ClientSink: Send + Sync {
    fn send(&self, frame: &Frame) -> Result<(), SinkClosed>;
}

/// Production sink: serialized frames over an mpsc channel to the
/// connection's writer task.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: tokio::sync::mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl ClientSink for ChannelSink {
    fn send(&self, frame: &Frame) -> Result<(), SinkClosed> {
        let text = serde_json::to_string(frame).map_err(|_| SinkClosed)?;
        self.tx.try_send(text).map_err(|_| SinkClosed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventBus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct EventBus {
    /// connection id -> sink
    connections: Mutex<HashMap<String, Arc<dyn ClientSink>>>,
    /// task id -> subscribed connection ids
    task_subs: Mutex<HashMap<String, HashSet<String>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client connection.
    pub fn connect(&self, conn_id: &str, sink: Arc<dyn ClientSink>) {
        let mut connections = self.connections.lock();
        connections.insert(conn_id.to_string(), sink);
        tracing::debug!(conn_id, total = connections.len(), "connection added");
    }

    /// Remove a connection from the bus and from every subscription.
    pub fn disconnect(&self, conn_id: &str) {
        self.connections.lock().remove(conn_id);

        let mut subs = self.task_subs.lock();
        subs.retain(|_, conns| {
            conns.remove(conn_id);
            !conns.is_empty()
        });
        tracing::debug!(conn_id, "connection removed");
    }

    /// Subscribe a connection to a task's events. Idempotent.
    pub fn subscribe(&self, conn_id: &str, task_id: &str) {
        self.task_subs
            .lock()
            .entry(task_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    /// Send a frame to a single connection.
    pub fn send_to(&self, conn_id: &str, frame: &Frame) {
        let sink = self.connections.lock().get(conn_id).cloned();
        if let Some(sink) = sink {
            if sink.send(frame).is_err() {
                tracing::warn!(conn_id, "sink send failed; disconnecting");
                self.disconnect(conn_id);
            }
        }
    }

    /// Route a frame to every connection subscribed to its task.
    /// A send failure tears down that subscriber only.
    pub fn publish(&self, task_id: &str, frame: &Frame) {
        let targets: Vec<String> = self
            .task_subs
            .lock()
            .get(task_id)
            .map(|conns| conns.iter().cloned().collect())
            .unwrap_or_default();

        for conn_id in targets {
            self.send_to(&conn_id, frame);
        }
    }

    /// Drop every connection. Called after in-flight workers drained.
    pub fn close_all(&self) {
        let count = {
            let mut connections = self.connections.lock();
            let n = connections.len();
            connections.clear();
            n
        };
        self.task_subs.lock().clear();
        if count > 0 {
            tracing::info!(connections = count, "event bus closed all sinks");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Test sink that records frames and can be told to fail.
    struct RecordingSink {
        frames: Mutex<Vec<Frame>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn events(&self) -> Vec<String> {
            self.frames.lock().iter().map(|f| f.event.clone()).collect()
        }
    }

    impl ClientSink for RecordingSink {
        fn send(&self, frame: &Frame) -> Result<(), SinkClosed> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(SinkClosed);
            }
            self.frames.lock().push(frame.clone());
            Ok(())
        }
    }

    fn frame(event: &str, task_id: &str) -> Frame {
        Frame::new(event, Some(task_id.into()), serde_json::json!({}))
    }

    #[test]
    fn publish_reaches_only_subscribers_of_the_task() {
        let bus = EventBus::new();
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        bus.connect("a", a.clone());
        bus.connect("b", b.clone());
        bus.subscribe("a", "t1");
        bus.subscribe("b", "t2");

        bus.publish("t1", &frame("agent_result", "t1"));

        assert_eq!(a.events(), vec!["agent_result"]);
        assert!(b.events().is_empty());
    }

    #[test]
    fn subscribe_is_idempotent() {
        let bus = EventBus::new();
        let a = RecordingSink::new();
        bus.connect("a", a.clone());
        bus.subscribe("a", "t1");
        bus.subscribe("a", "t1");

        bus.publish("t1", &frame("x", "t1"));
        assert_eq!(a.events().len(), 1);
    }

    #[test]
    fn per_task_order_is_preserved_for_each_subscriber() {
        let bus = EventBus::new();
        let a = RecordingSink::new();
        bus.connect("a", a.clone());
        bus.subscribe("a", "t1");

        for event in ["agent_decision", "message_update", "agent_result", "task_result"] {
            bus.publish("t1", &frame(event, "t1"));
        }
        assert_eq!(
            a.events(),
            vec!["agent_decision", "message_update", "agent_result", "task_result"]
        );
    }

    #[test]
    fn failed_send_disconnects_the_sink_from_all_subscriptions() {
        let bus = EventBus::new();
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        bus.connect("a", a.clone());
        bus.connect("b", b.clone());
        bus.subscribe("a", "t1");
        bus.subscribe("a", "t2");
        bus.subscribe("b", "t1");

        a.fail.store(true, Ordering::Relaxed);
        bus.publish("t1", &frame("x", "t1"));

        // b still receives; a is gone entirely.
        assert_eq!(b.events(), vec!["x"]);
        assert_eq!(bus.connection_count(), 1);

        a.fail.store(false, Ordering::Relaxed);
        bus.publish("t2", &frame("y", "t2"));
        assert!(a.events().is_empty());
    }

    #[test]
    fn disconnect_removes_connection_and_subscriptions() {
        let bus = EventBus::new();
        let a = RecordingSink::new();
        bus.connect("a", a.clone());
        bus.subscribe("a", "t1");
        bus.disconnect("a");

        bus.publish("t1", &frame("x", "t1"));
        assert!(a.events().is_empty());
        assert_eq!(bus.connection_count(), 0);
    }

    #[test]
    fn send_to_targets_a_single_connection() {
        let bus = EventBus::new();
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        bus.connect("a", a.clone());
        bus.connect("b", b.clone());

        bus.send_to("a", &frame("user_task_submit", "t1"));
        assert_eq!(a.events(), vec!["user_task_submit"]);
        assert!(b.events().is_empty());
    }
}
