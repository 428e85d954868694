//! Attendee responses.
//!
//! ```text
//!   pending --> accepted | declined | tentative
//!   accepted <-> declined <-> tentative      (never back to pending)
//! ```
//!
//! The write is one conditional update on `(event id, user id)`. Its row count
//! is the only success signal; a zero is explained afterwards by a read-only
//! lookup, never by reading before writing.

use std::sync::Arc;

use cadence_core::{Attendee, AttendeeStatus, Clock, SystemClock};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::store::{Attendance, AttendeeStore, AttendeeUpdate};

/// Applies attendee responses with optimistic concurrency.
pub struct RsvpService {
    store: Arc<dyn AttendeeStore>,
    clock: Arc<dyn Clock>,
}

impl RsvpService {
    pub fn new(store: Arc<dyn AttendeeStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Records `user_id`'s response to `event_id`.
    ///
    /// With `expected_version`, the update only applies if nobody changed the
    /// row since the caller read it.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidTransition`] when `status` is `pending`
    /// - [`SyncError::NotAnAttendee`] when the user has no row for the event
    /// - [`SyncError::Conflict`] when the event is gone or the row moved on
    pub async fn respond(
        &self,
        event_id: &str,
        user_id: &str,
        status: AttendeeStatus,
        expected_version: Option<u64>,
    ) -> SyncResult<Attendee> {
        if status == AttendeeStatus::Pending {
            return Err(self.reject_pending(event_id, user_id).await?);
        }

        let result = self
            .store
            .update_attendee_status(AttendeeUpdate {
                event_id: event_id.to_string(),
                user_id: user_id.to_string(),
                status,
                responded_at: self.clock.now(),
                expected_version,
            })
            .await?;

        if let (1, Some(row)) = (result.rows_affected, result.row) {
            info!(event_id, user_id, status = %row.status, version = row.version, "Attendee responded");
            return Ok(row);
        }

        let error = match self.store.attendance(event_id, user_id).await? {
            Attendance::NotInvited => SyncError::not_an_attendee(event_id, user_id),
            Attendance::EventMissing | Attendance::Present(_) => SyncError::conflict(event_id, user_id),
        };
        debug!(event_id, user_id, error = %error, "Attendee update matched no row");
        Err(error)
    }

    /// Builds the error for a request to go back to `pending`.
    async fn reject_pending(&self, event_id: &str, user_id: &str) -> SyncResult<SyncError> {
        Ok(match self.store.attendance(event_id, user_id).await? {
            Attendance::NotInvited => SyncError::not_an_attendee(event_id, user_id),
            Attendance::EventMissing => SyncError::conflict(event_id, user_id),
            Attendance::Present(row) => SyncError::InvalidTransition {
                from: row.status,
                to: AttendeeStatus::Pending,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use cadence_core::{FixedClock, ScheduledEvent};
    use chrono::{DateTime, TimeZone, Utc};

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, 0, 0).unwrap()
    }

    async fn setup() -> (Arc<MemoryStore>, RsvpService) {
        let store = Arc::new(MemoryStore::new());
        store
            .add_scheduled_event(ScheduledEvent::new("evt", "ws", "Planning", utc(10, 9), utc(10, 10)))
            .await;
        store.add_attendee(Attendee::invited("evt", "alice")).await;
        let service = RsvpService::new(store.clone()).with_clock(Arc::new(FixedClock::new(utc(1, 8))));
        (store, service)
    }

    #[tokio::test]
    async fn pending_to_accepted_and_change_of_mind() {
        let (_store, service) = setup().await;

        let accepted = service
            .respond("evt", "alice", AttendeeStatus::Accepted, None)
            .await
            .unwrap();
        assert_eq!(accepted.status, AttendeeStatus::Accepted);
        assert_eq!(accepted.responded_at, Some(utc(1, 8)));
        assert_eq!(accepted.version, 1);

        let declined = service
            .respond("evt", "alice", AttendeeStatus::Declined, Some(1))
            .await
            .unwrap();
        assert_eq!(declined.status, AttendeeStatus::Declined);
        assert_eq!(declined.version, 2);
    }

    #[tokio::test]
    async fn stranger_is_not_an_attendee_and_no_row_is_created() {
        let (store, service) = setup().await;

        let result = service.respond("evt", "mallory", AttendeeStatus::Accepted, None).await;
        assert!(matches!(result, Err(SyncError::NotAnAttendee { .. })));
        assert!(!result.unwrap_err().is_retryable());
        assert_eq!(store.attendance("evt", "mallory").await, Ok(Attendance::NotInvited));
    }

    #[tokio::test]
    async fn vanished_event_is_a_conflict() {
        let (store, service) = setup().await;
        store.delete_scheduled_event("evt", utc(1, 7)).await;

        let result = service.respond("evt", "alice", AttendeeStatus::Tentative, None).await;
        let error = result.unwrap_err();
        assert!(matches!(error, SyncError::Conflict { .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let (_store, service) = setup().await;
        service
            .respond("evt", "alice", AttendeeStatus::Accepted, Some(0))
            .await
            .unwrap();

        // A duplicate submission carrying the version it read first.
        let duplicate = service.respond("evt", "alice", AttendeeStatus::Declined, Some(0)).await;
        assert!(matches!(duplicate, Err(SyncError::Conflict { .. })));
    }

    #[tokio::test]
    async fn never_back_to_pending() {
        let (store, service) = setup().await;
        service
            .respond("evt", "alice", AttendeeStatus::Accepted, None)
            .await
            .unwrap();

        let result = service.respond("evt", "alice", AttendeeStatus::Pending, None).await;
        assert!(matches!(
            result,
            Err(SyncError::InvalidTransition {
                from: AttendeeStatus::Accepted,
                to: AttendeeStatus::Pending
            })
        ));
        match store.attendance("evt", "alice").await.unwrap() {
            Attendance::Present(row) => assert_eq!(row.status, AttendeeStatus::Accepted),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_duplicates_apply_once() {
        let (store, service) = setup().await;
        let service = Arc::new(service);

        let a = tokio::spawn({
            let service = service.clone();
            async move { service.respond("evt", "alice", AttendeeStatus::Accepted, Some(0)).await }
        });
        let b = tokio::spawn({
            let service = service.clone();
            async move { service.respond("evt", "alice", AttendeeStatus::Accepted, Some(0)).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(SyncError::Conflict { .. })))
                .count(),
            1
        );
        match store.attendance("evt", "alice").await.unwrap() {
            Attendance::Present(row) => assert_eq!(row.version, 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
