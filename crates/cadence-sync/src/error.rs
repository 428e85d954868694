//! Sync engine error types.

use cadence_core::{AttendeeStatus, InvalidRuleError};
use cadence_providers::{ProviderError, ProviderKind};
use chrono::NaiveDate;
use thiserror::Error;

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A failure of the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("store error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the reconciler, the RSVP state machine and the habit tracker.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or authentication failure talking to a provider.
    #[error("provider fetch failed: {0}")]
    ProviderFetch(#[from] ProviderError),

    /// Malformed recurrence input. Never retried.
    #[error(transparent)]
    InvalidRule(#[from] InvalidRuleError),

    /// The user has no attendee row for the event.
    #[error("user {user_id} is not an attendee of event {event_id}")]
    NotAnAttendee { event_id: String, user_id: String },

    /// The row changed or the event vanished between read and write.
    #[error("attendee row for user {user_id} on event {event_id} changed concurrently")]
    Conflict { event_id: String, user_id: String },

    #[error("cannot change response from {from} to {to}")]
    InvalidTransition {
        from: AttendeeStatus,
        to: AttendeeStatus,
    },

    #[error("{date} is not an occurrence of habit {habit_id}")]
    NotAnOccurrence { habit_id: String, date: NaiveDate },

    #[error("habit {habit_id} is deleted")]
    HabitDeleted { habit_id: String },

    #[error("connection {connection_id} is not active")]
    InactiveConnection { connection_id: String },

    #[error("no adapter registered for provider {provider}")]
    MissingAdapter { provider: ProviderKind },

    #[error("no event source for connection {connection_id}")]
    MissingSource { connection_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn not_an_attendee(event_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::NotAnAttendee {
            event_id: event_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn conflict(event_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::Conflict {
            event_id: event_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Returns true if the caller may retry the same operation.
    ///
    /// Conflicts are retryable after refetching the row; provider errors only
    /// when the provider classifies them as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::Store(_) => true,
            Self::ProviderFetch(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(SyncError::conflict("e", "u").is_retryable());
        assert!(!SyncError::not_an_attendee("e", "u").is_retryable());
        assert!(SyncError::from(ProviderError::network("timeout")).is_retryable());
        assert!(!SyncError::from(ProviderError::authentication("expired")).is_retryable());
        assert!(!SyncError::from(InvalidRuleError::IntervalTooSmall(0)).is_retryable());
        assert!(SyncError::from(StoreError::new("deadlock")).is_retryable());
    }

    #[test]
    fn messages() {
        assert_eq!(
            SyncError::not_an_attendee("evt-1", "u-9").to_string(),
            "user u-9 is not an attendee of event evt-1"
        );
        assert_eq!(
            SyncError::InvalidTransition {
                from: AttendeeStatus::Accepted,
                to: AttendeeStatus::Pending
            }
            .to_string(),
            "cannot change response from accepted to pending"
        );
    }
}
