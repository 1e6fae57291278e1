//! In-flight record accounting for the consumer loop.

use metrics::gauge;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::metrics::{CONSUMER_GROUP_LABEL, LOGPIPE_IN_FLIGHT_RECORDS, STREAM_LABEL};

/// Tracks how many records are in flight and refuses reservations above a threshold.
///
/// A consumer reserves a whole batch before reading from the log and releases it once the batch
/// is persisted and acknowledged, or failed. The count is process-local and starts at zero.
#[derive(Debug, Clone)]
pub struct BackpressureGate {
    in_flight: Arc<AtomicUsize>,
    threshold: usize,
    stream: Arc<str>,
    group: Arc<str>,
}

impl BackpressureGate {
    /// Creates a gate allowing at most `threshold` records in flight.
    pub fn new(threshold: usize, stream: &str, group: &str) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            threshold,
            stream: Arc::from(stream),
            group: Arc::from(group),
        }
    }

    /// Reserves `n` records, unless that would bring the in-flight count above the threshold.
    ///
    /// The returned [`InFlightReservation`] releases the records when dropped.
    pub fn try_reserve(&self, n: usize) -> Option<InFlightReservation> {
        let reserved = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |in_flight| {
                let next = in_flight.checked_add(n)?;
                (next <= self.threshold).then_some(next)
            });

        match reserved {
            Ok(previous) => {
                self.emit_in_flight(previous + n);
                Some(InFlightReservation {
                    gate: self.clone(),
                    units: n,
                })
            }
            Err(_) => None,
        }
    }

    /// Releases `n` records, saturating at zero.
    pub fn release(&self, n: usize) {
        let previous = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |in_flight| {
                Some(in_flight.saturating_sub(n))
            })
            .unwrap_or_else(|current| current);

        self.emit_in_flight(previous.saturating_sub(n));
    }

    /// Returns the current number of in-flight records.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    fn emit_in_flight(&self, in_flight: usize) {
        gauge!(
            LOGPIPE_IN_FLIGHT_RECORDS,
            STREAM_LABEL => self.stream.to_string(),
            CONSUMER_GROUP_LABEL => self.group.to_string()
        )
        .set(in_flight as f64);
    }
}

/// RAII guard releasing its reserved records on drop.
#[derive(Debug)]
pub struct InFlightReservation {
    gate: BackpressureGate,
    units: usize,
}

impl InFlightReservation {
    /// Returns the number of reserved records.
    pub fn units(&self) -> usize {
        self.units
    }
}

impl Drop for InFlightReservation {
    fn drop(&mut self) {
        self.gate.release(self.units);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(threshold: usize) -> BackpressureGate {
        BackpressureGate::new(threshold, "logs:stream", "log-processors")
    }

    #[test]
    fn reservations_are_refused_above_threshold() {
        let gate = gate(150);

        let first = gate.try_reserve(50).unwrap();
        let second = gate.try_reserve(50).unwrap();
        let third = gate.try_reserve(50).unwrap();
        assert_eq!(gate.in_flight(), 150);

        assert!(gate.try_reserve(50).is_none());
        assert!(gate.try_reserve(1).is_none());
        assert_eq!(gate.in_flight(), 150);

        drop(second);
        assert_eq!(gate.in_flight(), 100);
        assert!(gate.try_reserve(50).is_some());

        drop(first);
        drop(third);
    }

    #[test]
    fn dropping_a_reservation_releases_exactly_once() {
        let gate = gate(10);

        let reservation = gate.try_reserve(7).unwrap();
        assert_eq!(reservation.units(), 7);
        drop(reservation);

        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn release_saturates_at_zero() {
        let gate = gate(10);

        gate.release(5);
        assert_eq!(gate.in_flight(), 0);

        let _reservation = gate.try_reserve(3).unwrap();
        gate.release(100);
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn in_flight_is_shared_between_clones() {
        let gate = gate(10);
        let clone = gate.clone();

        let _reservation = clone.try_reserve(10).unwrap();

        assert!(gate.try_reserve(1).is_none());
    }

    #[test]
    fn concurrent_reservations_never_exceed_threshold() {
        let gate = gate(100);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        if let Some(reservation) = gate.try_reserve(30) {
                            assert!(gate.in_flight() <= 100);
                            drop(reservation);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(gate.in_flight(), 0);
    }
}
