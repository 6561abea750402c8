//! Page transition coordinator
//!
//! Animates the move to an adjacent page. The fixed animation duration is
//! the synchronization barrier between visuals and audio: narration for the
//! destination page may only be requested after the transition completes.
//!
//! At most one transition may be in flight; a second attempt is rejected
//! immediately with `Error::TransitionBusy` and has no side effect.

use crate::error::{Error, Result};
use somnia_common::events::Direction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Coordinates page turn animations for one session
pub struct PageTransitionCoordinator {
    duration: Duration,
    in_flight: Arc<AtomicBool>,
}

impl PageTransitionCoordinator {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reserve the (single) transition slot.
    ///
    /// Fails with `TransitionBusy` if a transition is already in flight.
    /// The caller `run()`s the ticket to consume the animation time, then
    /// drops it once the completion bookkeeping (page index, state) is
    /// done; the slot is released only at drop, including when the running
    /// future is cancelled.
    pub fn try_begin(&self, direction: Direction) -> Result<TransitionTicket> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(Error::TransitionBusy);
        }
        Ok(TransitionTicket {
            in_flight: Arc::clone(&self.in_flight),
            duration: self.duration,
            direction,
        })
    }

    /// Whether a transition is currently in flight
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Exclusive hold on the transition slot
///
/// Holds the slot from reservation until drop, which bounds how far audio
/// and visuals can drift: the caller cannot resume narration before `run`
/// returns, and no other transition can start meanwhile.
pub struct TransitionTicket {
    in_flight: Arc<AtomicBool>,
    duration: Duration,
    direction: Direction,
}

impl TransitionTicket {
    /// Wait out the animation duration. The slot stays held until the
    /// ticket is dropped.
    pub async fn run(&self) {
        tokio::time::sleep(self.duration).await;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl Drop for TransitionTicket {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_second_transition_rejected_while_in_flight() {
        let coordinator = PageTransitionCoordinator::new(Duration::from_millis(50));

        let ticket = coordinator.try_begin(Direction::Next).unwrap();
        assert!(coordinator.is_in_flight());

        match coordinator.try_begin(Direction::Next) {
            Err(Error::TransitionBusy) => {}
            other => panic!("expected TransitionBusy, got {:?}", other.map(|_| ())),
        }

        ticket.run().await;
        assert!(coordinator.is_in_flight(), "slot held until the ticket drops");
        drop(ticket);
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn test_minimum_duration_enforced() {
        let duration = Duration::from_millis(40);
        let coordinator = PageTransitionCoordinator::new(duration);

        let started = Instant::now();
        coordinator.try_begin(Direction::Prev).unwrap().run().await;
        assert!(started.elapsed() >= duration);
    }

    #[tokio::test]
    async fn test_slot_released_on_cancellation() {
        let coordinator = PageTransitionCoordinator::new(Duration::from_secs(60));

        {
            let _ticket = coordinator.try_begin(Direction::Next).unwrap();
            assert!(coordinator.is_in_flight());
            // Ticket dropped without running: animation abandoned.
        }

        assert!(!coordinator.is_in_flight());
        assert!(coordinator.try_begin(Direction::Next).is_ok());
    }
}
