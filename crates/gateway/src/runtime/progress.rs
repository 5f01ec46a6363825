//! Progress Channel / pub-sub hub (§4.2), grounded on
//! `original_source/.../app/api/progress.py`'s per-session ring buffer and
//! replay-on-subscribe contract.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rsa_domain::progress::{ProgressEvent, ProgressStage};
use rsa_domain::trace::TraceEvent;
use tokio::sync::mpsc;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

struct ProgressSession {
    buffer: VecDeque<ProgressEvent>,
    buffer_cap: usize,
    subscribers: Vec<mpsc::Sender<ProgressEvent>>,
    last_activity: Instant,
}

impl ProgressSession {
    fn new(buffer_cap: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            buffer_cap,
            subscribers: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    fn push(&mut self, event: ProgressEvent) {
        if self.buffer.len() >= self.buffer_cap {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
        self.last_activity = Instant::now();
    }
}

/// Process-wide map of session id -> progress session state. Publishes
/// never block: a subscriber whose channel is full or closed is dropped
/// from the fan-out set on its next failed send.
pub struct ProgressHub {
    sessions: RwLock<HashMap<String, ProgressSession>>,
    buffer_cap: usize,
    replay_on_subscribe: usize,
}

impl ProgressHub {
    pub fn new(buffer_cap: usize, replay_on_subscribe: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            buffer_cap,
            replay_on_subscribe,
        }
    }

    /// Publish one event, buffering it and fanning it out to live
    /// subscribers. Non-blocking: a full subscriber channel is treated the
    /// same as a closed one and the subscriber is dropped.
    pub fn publish(&self, event: ProgressEvent) {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| ProgressSession::new(self.buffer_cap));
        session.push(event.clone());
        session.subscribers.retain(|tx| tx.try_send(event.clone()).is_ok());
    }

    /// Subscribe to a session's stream: immediately yields a synthetic
    /// `connected` event, then replays the last `replay_on_subscribe`
    /// buffered events, then attaches as a live subscriber.
    pub fn subscribe(&self, session_id: &str) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let _ = tx.try_send(ProgressEvent::connected(session_id));

        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| ProgressSession::new(self.buffer_cap));

        let replay_start = session.buffer.len().saturating_sub(self.replay_on_subscribe);
        let mut replayed = 0usize;
        for ev in session.buffer.iter().skip(replay_start) {
            if tx.try_send(ev.clone()).is_ok() {
                replayed += 1;
            }
        }
        session.subscribers.push(tx.clone());

        TraceEvent::ProgressSubscribed {
            session_id: session_id.to_string(),
            replayed,
        }
        .emit();

        rx
    }

    /// Publish the terminal `Aborted` event for a session (§4.1: the abort
    /// endpoint only sets the flag; the orchestrator itself emits this once
    /// it observes the flag and unwinds).
    pub fn abort(&self, session_id: &str) {
        self.publish(ProgressEvent::new(session_id, "aborted by user", ProgressStage::Aborted));
    }

    /// Emit a heartbeat to every session with at least one live subscriber
    /// that has been idle for at least `interval`. Intended to be driven by
    /// a periodic background task (§5: "a keepalive must appear at least
    /// every 30s").
    pub fn heartbeat_sweep(&self, interval: Duration) {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        for session in sessions.values_mut() {
            if session.subscribers.is_empty() {
                continue;
            }
            if now.duration_since(session.last_activity) < interval {
                continue;
            }
            let session_id = session
                .buffer
                .back()
                .map(|e| e.session_id.clone())
                .unwrap_or_default();
            let hb = ProgressEvent::heartbeat(session_id);
            session.subscribers.retain(|tx| tx.try_send(hb.clone()).is_ok());
            session.last_activity = now;
        }
    }

    /// Drop all buffered state for a session once it has no subscribers
    /// left — called opportunistically after a turn settles.
    pub fn release_if_idle(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if sessions.get(session_id).map(|s| s.subscribers.is_empty()).unwrap_or(false) {
            sessions.remove(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_connected_event_first() {
        let hub = ProgressHub::new(100, 10);
        let mut rx = hub.subscribe("s1");
        let first = rx.try_recv().unwrap();
        assert_eq!(first.stage, ProgressStage::Init);
        assert_eq!(first.message, "connected");
    }

    #[test]
    fn subscribe_replays_the_last_n_buffered_events() {
        let hub = ProgressHub::new(100, 2);
        for i in 0..5 {
            hub.publish(ProgressEvent::new("s1", format!("step {i}"), ProgressStage::Processing));
        }
        let mut rx = hub.subscribe("s1");
        let _connected = rx.try_recv().unwrap();
        let replayed_1 = rx.try_recv().unwrap();
        let replayed_2 = rx.try_recv().unwrap();
        assert_eq!(replayed_1.message, "step 3");
        assert_eq!(replayed_2.message, "step 4");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn buffer_is_capped() {
        let hub = ProgressHub::new(3, 10);
        for i in 0..10 {
            hub.publish(ProgressEvent::new("s1", format!("{i}"), ProgressStage::Processing));
        }
        let sessions = hub.sessions.read();
        assert_eq!(sessions.get("s1").unwrap().buffer.len(), 3);
    }

    #[test]
    fn live_subscriber_sees_published_events() {
        let hub = ProgressHub::new(100, 10);
        let mut rx = hub.subscribe("s1");
        let _connected = rx.try_recv().unwrap();
        hub.publish(ProgressEvent::new("s1", "working", ProgressStage::Processing));
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.message, "working");
    }
}
