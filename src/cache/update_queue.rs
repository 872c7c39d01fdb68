//! Update queue - per-subject pending mutations awaiting delivery
//!
//! Every optimistic mutation leaves a [`PendingUpdate`] here. The sync loop
//! drains a subject's list, delivers it in order, and re-queues failures as
//! [`PendingUpdate::RetryAction`] with an incremented attempt counter.
//!
//! `drain` takes the whole list at once: anything enqueued while a drain is
//! being delivered waits for the next cycle. Undelivered updates go back with
//! `requeue_front`, ahead of anything enqueued in the meantime.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::models::{ActionRecord, SubjectId};

// =============================================================================
// Pending Update
// =============================================================================

/// What an update delivers to the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdatePayload {
    Action(ActionRecord),
    Achievement {
        achievement_id: String,
        bonus_points: u64,
    },
}

impl fmt::Display for UpdatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePayload::Action(record) => write!(f, "action:{}", record.id),
            UpdatePayload::Achievement { achievement_id, .. } => {
                write!(f, "achievement:{}", achievement_id)
            }
        }
    }
}

/// A mutation waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingUpdate {
    Action {
        record: ActionRecord,
    },
    Achievement {
        achievement_id: String,
        bonus_points: u64,
    },
    /// A failed update on its `attempt`-th delivery attempt
    RetryAction {
        payload: UpdatePayload,
        attempt: u8,
    },
}

impl PendingUpdate {
    pub fn action(record: ActionRecord) -> Self {
        Self::Action { record }
    }

    pub fn achievement(achievement_id: impl Into<String>, bonus_points: u64) -> Self {
        Self::Achievement {
            achievement_id: achievement_id.into(),
            bonus_points,
        }
    }

    /// Delivery attempt this update is on (fresh updates are on attempt 1)
    pub fn attempt(&self) -> u8 {
        match self {
            Self::RetryAction { attempt, .. } => *attempt,
            _ => 1,
        }
    }

    pub fn payload(&self) -> UpdatePayload {
        match self {
            Self::Action { record } => UpdatePayload::Action(record.clone()),
            Self::Achievement {
                achievement_id,
                bonus_points,
            } => UpdatePayload::Achievement {
                achievement_id: achievement_id.clone(),
                bonus_points: *bonus_points,
            },
            Self::RetryAction { payload, .. } => payload.clone(),
        }
    }

    /// The update for the next attempt after this one failed
    pub fn into_retry(self) -> Self {
        let attempt = self.attempt().saturating_add(1);
        Self::RetryAction {
            payload: self.payload(),
            attempt,
        }
    }
}

// =============================================================================
// Update Queue
// =============================================================================

/// Per-subject FIFO of pending updates.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    queues: DashMap<SubjectId, VecDeque<PendingUpdate>>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an update to the subject's list
    pub fn enqueue(&self, subject: &SubjectId, update: PendingUpdate) {
        self.queues.entry(subject.clone()).or_default().push_back(update);
    }

    /// Atomically remove and return everything queued for the subject, in
    /// enqueue order
    pub fn drain(&self, subject: &SubjectId) -> Vec<PendingUpdate> {
        match self.queues.remove(subject) {
            Some((_, queue)) => queue.into(),
            None => Vec::new(),
        }
    }

    /// Put undelivered updates back at the head of the subject's list,
    /// keeping their order
    pub fn requeue_front(&self, subject: &SubjectId, updates: Vec<PendingUpdate>) {
        if updates.is_empty() {
            return;
        }
        let mut queue = self.queues.entry(subject.clone()).or_default();
        for update in updates.into_iter().rev() {
            queue.push_front(update);
        }
    }

    /// Subjects that currently have at least one pending update
    pub fn subjects_with_pending(&self) -> Vec<SubjectId> {
        self.queues
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Pending updates for one subject
    pub fn len(&self, subject: &SubjectId) -> usize {
        self.queues.get(subject).map(|q| q.len()).unwrap_or(0)
    }

    /// Pending updates across all subjects
    pub fn pending_count(&self) -> usize {
        self.queues.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// Drop every pending update.
    ///
    /// Warning: undelivered updates are lost.
    pub fn clear(&self) {
        self.queues.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
