//! Mission events
//!
//! Services emit an event after each committed mutation. Listeners are
//! optional; emitting with nobody subscribed is a no-op.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Events emitted by the mission services
#[derive(Debug, Clone, PartialEq)]
pub enum MissionEvent {
    MissionsAssigned {
        user_id: i64,
        assignment_ids: Vec<i64>,
    },
    MissionCompleted {
        user_id: i64,
        assignment_id: i64,
        exp_gained: i64,
    },
    PlantLeveledUp {
        user_id: i64,
        level: i64,
    },
    TodayCleared {
        user_id: i64,
        removed: usize,
    },
    AssignmentsExpired {
        count: usize,
    },
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &MissionEvent);
}

/// Broadcast bus for mission events
pub struct EventBus {
    sender: broadcast::Sender<MissionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: MissionEvent) {
        trace!(event = ?event, "Emitting mission event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MissionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs every event
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &MissionEvent) {
        match event {
            MissionEvent::MissionsAssigned { user_id, assignment_ids } => {
                debug!(user_id, count = assignment_ids.len(), "Missions assigned");
            }
            MissionEvent::MissionCompleted { user_id, assignment_id, exp_gained } => {
                debug!(user_id, assignment_id, exp_gained, "Mission completed");
            }
            MissionEvent::PlantLeveledUp { user_id, level } => {
                info!(user_id, level, "Plant leveled up");
            }
            MissionEvent::TodayCleared { user_id, removed } => {
                debug!(user_id, removed, "Today's missions cleared");
            }
            MissionEvent::AssignmentsExpired { count } => {
                debug!(count, "Overdue assignments expired");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
