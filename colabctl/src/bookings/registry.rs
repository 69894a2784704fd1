//! In-memory booking registry.
//!
//! All bookings live in a single insertion-ordered vector behind an async
//! `RwLock`. Every mutation takes the write lock for the whole
//! check-then-write sequence, so two concurrent requests can never both pass
//! the overlap check for intersecting windows. Lookups and overlap checks are
//! linear scans.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{Booking, BookingError, BookingStatus, Result, TimeWindow};
use crate::config::BookingsConfig;
use crate::types::{BookingId, abbrev_uuid};

pub struct BookingRegistry {
    bookings: RwLock<Vec<Booking>>,
    max_gpus_per_booking: u32,
}

impl BookingRegistry {
    pub fn new(config: &BookingsConfig) -> Self {
        Self {
            bookings: RwLock::new(Vec::new()),
            max_gpus_per_booking: config.max_gpus_per_booking,
        }
    }

    /// Reserve `gpu_count` GPUs for `window`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] if the user id is blank or the GPU count is outside
    ///   `1..=max_gpus_per_booking`
    /// - [`BookingError::Conflict`] listing every live booking that intersects the window
    #[instrument(skip(self, window), fields(start = %window.start(), end = %window.end()))]
    pub async fn create(&self, user_id: &str, window: TimeWindow, gpu_count: i64) -> Result<Booking> {
        if user_id.trim().is_empty() {
            return Err(BookingError::Validation("userId is required".to_string()));
        }
        let gpu_count = self.validate_gpu_count(gpu_count)?;

        let mut bookings = self.bookings.write().await;

        let conflicts = find_conflicts(&bookings, &window, None);
        if !conflicts.is_empty() {
            debug!(conflicts = conflicts.len(), "Rejecting booking: time slot conflict");
            return Err(BookingError::Conflict(conflicts));
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            start_time: window.start(),
            end_time: window.end(),
            gpu_count,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
            updated_at: None,
            cancelled_at: None,
        };
        bookings.push(booking.clone());

        info!(booking_id = %abbrev_uuid(&booking.id), gpu_count, "Booking created");
        Ok(booking)
    }

    /// Move a booking to a new window. The booking's own current window is ignored by the
    /// overlap check.
    #[instrument(skip(self, window), fields(booking_id = %abbrev_uuid(&id)))]
    pub async fn reschedule(&self, id: BookingId, window: TimeWindow) -> Result<Booking> {
        let mut bookings = self.bookings.write().await;

        let index = bookings.iter().position(|b| b.id == id).ok_or(BookingError::NotFound(id))?;
        if !bookings[index].is_live() {
            return Err(BookingError::Validation(format!("Booking {id} is cancelled and cannot be rescheduled")));
        }

        let conflicts = find_conflicts(&bookings, &window, Some(id));
        if !conflicts.is_empty() {
            debug!(conflicts = conflicts.len(), "Rejecting reschedule: time slot conflict");
            return Err(BookingError::Conflict(conflicts));
        }

        let booking = &mut bookings[index];
        booking.start_time = window.start();
        booking.end_time = window.end();
        booking.updated_at = Some(Utc::now());

        info!("Booking rescheduled");
        Ok(booking.clone())
    }

    /// Mark a booking cancelled. Cancelling twice is allowed and re-stamps `cancelled_at`.
    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)))]
    pub async fn cancel(&self, id: BookingId) -> Result<Booking> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings.iter_mut().find(|b| b.id == id).ok_or(BookingError::NotFound(id))?;

        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(Utc::now());

        info!("Booking cancelled");
        Ok(booking.clone())
    }

    /// Fetch a booking regardless of status.
    #[cfg(test)]
    pub async fn get(&self, id: BookingId) -> Result<Booking> {
        let bookings = self.bookings.read().await;
        bookings.iter().find(|b| b.id == id).cloned().ok_or(BookingError::NotFound(id))
    }

    /// Live bookings owned by `user_id`, in insertion order.
    pub async fn list_by_user(&self, user_id: &str) -> Vec<Booking> {
        let bookings = self.bookings.read().await;
        bookings.iter().filter(|b| b.is_live() && b.user_id == user_id).cloned().collect()
    }

    /// Live bookings whose start lies within `[from, to]`, in insertion order.
    pub async fn list_in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Booking> {
        let bookings = self.bookings.read().await;
        bookings
            .iter()
            .filter(|b| b.is_live() && b.start_time >= from && b.start_time <= to)
            .cloned()
            .collect()
    }

    fn validate_gpu_count(&self, gpu_count: i64) -> Result<u32> {
        match u32::try_from(gpu_count) {
            Ok(count) if (1..=self.max_gpus_per_booking).contains(&count) => Ok(count),
            _ => Err(BookingError::Validation(format!(
                "gpuCount must be between 1 and {} (got {gpu_count})",
                self.max_gpus_per_booking
            ))),
        }
    }
}

/// Live bookings other than `exclude` whose window intersects `window`.
fn find_conflicts(bookings: &[Booking], window: &TimeWindow, exclude: Option<BookingId>) -> Vec<Booking> {
    bookings
        .iter()
        .filter(|b| b.is_live() && Some(b.id) != exclude && b.window().overlaps(window))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn registry() -> BookingRegistry {
        BookingRegistry::new(&BookingsConfig::default())
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()
    }

    /// Window of `len` hours starting `offset` hours after the base instant
    fn hours(offset: i64, len: i64) -> TimeWindow {
        let start = base() + Duration::hours(offset);
        TimeWindow::new(start, start + Duration::hours(len)).unwrap()
    }

    fn assert_live_bookings_disjoint(bookings: &[Booking]) {
        let live: Vec<_> = bookings.iter().filter(|b| b.is_live()).collect();
        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                assert!(!a.window().overlaps(&b.window()), "live bookings {} and {} overlap", a.id, b.id);
            }
        }
    }

    #[tokio::test]
    async fn test_create_booking_starts_pending() {
        let registry = registry();
        let booking = registry.create("alice", hours(24, 1), 1).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.user_id, "alice");
        assert_eq!(booking.gpu_count, 1);
        assert!(booking.updated_at.is_none());
        assert!(booking.cancelled_at.is_none());
        assert_eq!(registry.get(booking.id).await.unwrap(), booking);
    }

    #[tokio::test]
    async fn test_gpu_count_bounds() {
        let registry = registry();
        for bad in [0, -1, 5, i64::MAX] {
            let result = registry.create("alice", hours(0, 1), bad).await;
            assert!(matches!(result, Err(BookingError::Validation(_))), "gpu_count {bad} should be rejected");
        }
        for (i, good) in (1..=4).enumerate() {
            registry.create("alice", hours(i as i64 * 2, 1), good).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_blank_user_rejected() {
        let result = registry().create("  ", hours(0, 1), 1).await;
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_identical_window_conflicts_and_lists_conflicting_booking() {
        let registry = registry();
        let first = registry.create("user1", hours(24, 1), 1).await.unwrap();

        match registry.create("user2", hours(24, 1), 1).await {
            Err(BookingError::Conflict(conflicts)) => assert_eq!(conflicts, vec![first]),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_conflict_lists_every_intersecting_booking() {
        let registry = registry();
        let a = registry.create("u", hours(0, 2), 1).await.unwrap();
        let b = registry.create("u", hours(2, 2), 1).await.unwrap();
        registry.create("u", hours(10, 1), 1).await.unwrap();

        match registry.create("v", hours(1, 2), 1).await {
            Err(BookingError::Conflict(conflicts)) => assert_eq!(conflicts, vec![a, b]),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_touching_boundary_is_allowed() {
        let registry = registry();
        registry.create("u", hours(0, 1), 1).await.unwrap();
        registry.create("u", hours(1, 1), 1).await.unwrap();
        registry.create("u", hours(-1, 1), 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_booking_frees_its_slot() {
        let registry = registry();
        let first = registry.create("u", hours(0, 1), 1).await.unwrap();
        registry.cancel(first.id).await.unwrap();

        registry.create("v", hours(0, 1), 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_reschedule_onto_own_window_succeeds() {
        let registry = registry();
        let booking = registry.create("u", hours(0, 2), 1).await.unwrap();

        let moved = registry.reschedule(booking.id, hours(1, 2)).await.unwrap();
        assert_eq!(moved.start_time, hours(1, 2).start());
        assert_eq!(moved.end_time, hours(1, 2).end());
        assert!(moved.updated_at.is_some());
        assert_eq!(moved.created_at, booking.created_at);
    }

    #[tokio::test]
    async fn test_reschedule_onto_other_booking_rejected() {
        let registry = registry();
        let a = registry.create("u", hours(0, 1), 1).await.unwrap();
        let b = registry.create("u", hours(5, 1), 1).await.unwrap();

        match registry.reschedule(b.id, hours(0, 2)).await {
            Err(BookingError::Conflict(conflicts)) => assert_eq!(conflicts, vec![a]),
            other => panic!("expected conflict, got {other:?}"),
        }

        // Unchanged after the rejected reschedule
        assert_eq!(registry.get(b.id).await.unwrap().start_time, hours(5, 1).start());
    }

    #[tokio::test]
    async fn test_reschedule_unknown_and_cancelled() {
        let registry = registry();
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.reschedule(missing, hours(0, 1)).await,
            Err(BookingError::NotFound(id)) if id == missing
        ));

        let booking = registry.create("u", hours(0, 1), 1).await.unwrap();
        registry.cancel(booking.id).await.unwrap();
        assert!(matches!(
            registry.reschedule(booking.id, hours(3, 1)).await,
            Err(BookingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_hides_from_user_listing_but_keeps_record() {
        let registry = registry();
        let booking = registry.create("alice", hours(24, 1), 1).await.unwrap();
        assert_eq!(registry.list_by_user("alice").await.len(), 1);

        let cancelled = registry.cancel(booking.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        assert!(registry.list_by_user("alice").await.is_empty());
        let stored = registry.get(booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_allowed() {
        let registry = registry();
        let booking = registry.create("alice", hours(0, 1), 1).await.unwrap();
        let first = registry.cancel(booking.id).await.unwrap();
        let second = registry.cancel(booking.id).await.unwrap();

        assert_eq!(second.status, BookingStatus::Cancelled);
        assert!(second.cancelled_at >= first.cancelled_at);
    }

    #[tokio::test]
    async fn test_cancel_unknown() {
        assert!(matches!(registry().cancel(Uuid::new_v4()).await, Err(BookingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_user_keeps_insertion_order() {
        let registry = registry();
        let late = registry.create("alice", hours(10, 1), 1).await.unwrap();
        registry.create("bob", hours(5, 1), 1).await.unwrap();
        let early = registry.create("alice", hours(0, 1), 1).await.unwrap();

        let ids: Vec<_> = registry.list_by_user("alice").await.into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![late.id, early.id]);
    }

    #[tokio::test]
    async fn test_list_in_range_is_inclusive_and_skips_cancelled() {
        let registry = registry();
        let a = registry.create("u", hours(0, 1), 1).await.unwrap();
        let b = registry.create("u", hours(4, 1), 1).await.unwrap();
        let c = registry.create("u", hours(8, 1), 1).await.unwrap();
        registry.create("u", hours(20, 1), 1).await.unwrap();
        registry.cancel(b.id).await.unwrap();

        let found: Vec<_> = registry
            .list_in_range(base(), base() + Duration::hours(8))
            .await
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(found, vec![a.id, c.id]);
    }

    #[tokio::test]
    async fn test_live_bookings_stay_pairwise_disjoint() {
        let registry = registry();
        let mut created = Vec::new();

        // A deterministic mix of overlapping, touching and disjoint requests
        for step in 0..60i64 {
            let offset = (step * 7) % 23;
            let len = 1 + (step % 3);
            if let Ok(booking) = registry.create("u", hours(offset, len), 1).await {
                created.push(booking);
            }
            if step % 5 == 0 && !created.is_empty() {
                let victim = &created[(step as usize) % created.len()];
                registry.cancel(victim.id).await.unwrap();
            }
            if step % 4 == 0 && !created.is_empty() {
                let target = &created[created.len() - 1];
                let _ = registry.reschedule(target.id, hours((offset + 3) % 23, 1)).await;
            }
        }

        let mut all = Vec::new();
        for booking in &created {
            all.push(registry.get(booking.id).await.unwrap());
        }
        assert_live_bookings_disjoint(&all);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_for_same_window_admit_one() {
        let registry = std::sync::Arc::new(registry());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = std::sync::Arc::clone(&registry);
                tokio::spawn(async move { registry.create(&format!("user{i}"), hours(24, 2), 1).await })
            })
            .collect();

        let mut admitted = Vec::new();
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(booking) => admitted.push(booking),
                Err(BookingError::Conflict(existing)) => {
                    assert_eq!(existing.len(), 1);
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(admitted.len(), 1);
        assert_eq!(conflicts, 15);
        assert_eq!(registry.list_in_range(base(), base() + Duration::days(2)).await, admitted);
    }
}
