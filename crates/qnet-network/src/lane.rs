//! Transit lanes
//!
//! A lane is one direction of a channel: a FIFO of in-flight items guarded by
//! a mutex, plus a [`Notify`] that wakes the blocked receiver. The lane also
//! owns the timing state that keeps deliveries ordered: an item can never
//! depart before the previous one finished departing, and can never become
//! ready before the previous one.
//!
//! Each lane has exactly one producer and one consumer.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use qnet_core::SimTime;

/// An item travelling through a lane
#[derive(Debug, Clone)]
pub struct InFlight<T> {
    pub payload: T,
    /// Sender's clock when the item finished departing
    pub sent_at: SimTime,
    /// Earliest simulated time the receiver may hold the item
    pub ready_at: SimTime,
    /// Position in the lane, starting at 0
    pub sequence: u64,
}

/// Timing of one push
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Departure {
    pub departed_at: SimTime,
    pub completed_at: SimTime,
    pub ready_at: SimTime,
    pub sequence: u64,
}

/// Push/pop counts of a lane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LaneCounts {
    pub pushed: u64,
    pub popped: u64,
}

impl LaneCounts {
    pub fn in_flight(&self) -> u64 {
        self.pushed - self.popped
    }
}

#[derive(Debug)]
struct LaneState<T> {
    queue: VecDeque<InFlight<T>>,
    last_departure: SimTime,
    last_ready: SimTime,
    counts: LaneCounts,
}

#[derive(Debug)]
pub struct Lane<T> {
    state: Mutex<LaneState<T>>,
    notify: Notify,
}

impl<T> Default for Lane<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Lane<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LaneState {
                queue: VecDeque::new(),
                last_departure: 0.0,
                last_ready: 0.0,
                counts: LaneCounts::default(),
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue an item and wake the receiver
    ///
    /// `earliest` is the sender's clock. The item departs once both the
    /// sender and the lane are free, occupies the lane for `source_delay`, and
    /// becomes ready `transit_delay` after it finished departing (but never
    /// before the item ahead of it).
    pub fn push(
        &self,
        payload: T,
        earliest: SimTime,
        source_delay: SimTime,
        transit_delay: SimTime,
    ) -> Departure {
        let departure = {
            let mut state = self.state.lock();
            let departed_at = earliest.max(state.last_departure);
            let completed_at = departed_at + source_delay;
            let ready_at = state.last_ready.max(completed_at + transit_delay);
            assert!(
                ready_at >= departed_at && completed_at >= earliest,
                "lane timing went backwards: departed {departed_at}, ready {ready_at}"
            );

            let sequence = state.counts.pushed;
            state.counts.pushed += 1;
            state.last_departure = completed_at;
            state.last_ready = ready_at;
            state.queue.push_back(InFlight {
                payload,
                sent_at: completed_at,
                ready_at,
                sequence,
            });
            Departure {
                departed_at,
                completed_at,
                ready_at,
                sequence,
            }
        };
        self.notify.notify_one();
        departure
    }

    /// Dequeue the head item without waiting
    pub fn try_pop(&self) -> Option<InFlight<T>> {
        let mut state = self.state.lock();
        let item = state.queue.pop_front()?;
        state.counts.popped += 1;
        Some(item)
    }

    /// Wait for the head item and dequeue it
    ///
    /// Cancel-safe: an item is only removed by a poll that also returns it.
    pub async fn pop(&self) -> InFlight<T> {
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop() {
                return item;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> LaneCounts {
        self.state.lock().counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_pushes_are_serialized_on_the_lane() {
        let lane = Lane::new();
        let first = lane.push("a", 0.0, 2.0, 5.0);
        assert_eq!(first.completed_at, 2.0);
        assert_eq!(first.ready_at, 7.0);

        // sender clock says 1.0 but the lane is busy until 2.0
        let second = lane.push("b", 1.0, 2.0, 0.5);
        assert_eq!(second.departed_at, 2.0);
        assert_eq!(second.completed_at, 4.0);
        // a fast item cannot overtake the slow one ahead of it
        assert_eq!(second.ready_at, 7.0);
        assert_eq!(second.sequence, 1);
    }

    #[test]
    fn test_fifo_order() {
        let lane = Lane::new();
        for i in 0..5 {
            lane.push(i, i as f64, 0.0, 0.0);
        }
        let order: Vec<_> = std::iter::from_fn(|| lane.try_pop().map(|item| item.payload)).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(lane.counts(), LaneCounts { pushed: 5, popped: 5 });
    }

    #[test]
    fn test_pop_waits_for_push() {
        let lane = Lane::new();
        let mut pop = task::spawn(lane.pop());
        assert_pending!(pop.poll());

        lane.push(42u8, 0.0, 0.0, 1.0);
        assert!(pop.is_woken());
        let item = assert_ready!(pop.poll());
        assert_eq!(item.payload, 42);
        assert_eq!(item.ready_at, 1.0);
        assert!(lane.is_empty());
    }
}
