//! Render job events for SSE broadcasting.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late-joining clients can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{JobId, StoryId};

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// What happened to a render job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    JobAdmitted {
        job_id: JobId,
        story_id: StoryId,
    },
    JobProgress {
        job_id: JobId,
        story_id: StoryId,
        progress: f64,
        stage: String,
    },
    JobCompleted {
        job_id: JobId,
        story_id: StoryId,
        video_url: String,
        duration: f64,
    },
    JobFailed {
        job_id: JobId,
        story_id: StoryId,
        error: String,
    },
    /// A processing job exceeded the staleness window and was failed.
    JobReclaimed {
        job_id: JobId,
        story_id: StoryId,
        age_secs: u64,
    },
}

impl EventPayload {
    pub fn job_id(&self) -> JobId {
        match self {
            EventPayload::JobAdmitted { job_id, .. }
            | EventPayload::JobProgress { job_id, .. }
            | EventPayload::JobCompleted { job_id, .. }
            | EventPayload::JobFailed { job_id, .. }
            | EventPayload::JobReclaimed { job_id, .. } => *job_id,
        }
    }

    pub fn story_id(&self) -> StoryId {
        match self {
            EventPayload::JobAdmitted { story_id, .. }
            | EventPayload::JobProgress { story_id, .. }
            | EventPayload::JobCompleted { story_id, .. }
            | EventPayload::JobFailed { story_id, .. }
            | EventPayload::JobReclaimed { story_id, .. } => *story_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted() -> EventPayload {
        EventPayload::JobAdmitted {
            job_id: JobId::new(),
            story_id: StoryId::new(),
        }
    }

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let job_id = JobId::new();
        let story_id = StoryId::new();
        bus.broadcast(EventPayload::JobFailed {
            job_id,
            story_id,
            error: "ffmpeg exited 1".into(),
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.payload.job_id(), job_id);
        assert_eq!(event.payload.story_id(), story_id);
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        for _ in 0..150 {
            bus.broadcast(admitted());
        }
        assert_eq!(bus.recent_events(200).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn recent_events_newest_first() {
        let bus = EventBus::new(16);
        for _ in 0..5 {
            bus.broadcast(admitted());
        }
        let last = JobId::new();
        bus.broadcast(EventPayload::JobReclaimed {
            job_id: last,
            story_id: StoryId::new(),
            age_secs: 180,
        });

        let recent = bus.recent_events(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].payload.job_id(), last);
    }

    #[test]
    fn payload_is_tagged_snake_case() {
        let json = serde_json::to_value(EventPayload::JobProgress {
            job_id: JobId::new(),
            story_id: StoryId::new(),
            progress: 42.0,
            stage: "clips".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "job_progress");
        assert_eq!(json["stage"], "clips");
    }

    #[test]
    fn default_event_bus() {
        let bus = EventBus::default();
        assert!(bus.recent_events(10).is_empty());
    }
}
