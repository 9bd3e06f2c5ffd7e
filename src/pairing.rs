use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::packet::DecodedSample;

/// Which wheel a sensor is mounted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Left and right frames combined into one motion sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PairedSample {
    pub left: DecodedSample,
    pub right: DecodedSample,
}

impl PairedSample {
    pub fn new(left: DecodedSample, right: DecodedSample) -> Self {
        Self { left, right }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    sample: DecodedSample,
    received_ms: i64,
}

/// Pairing counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingStats {
    pub pairs_emitted: u64,
    /// Pending samples replaced by a newer frame from the same side
    pub overwritten: u64,
    /// Pending samples dropped for exceeding the max pending age
    pub stale_discards: u64,
}

/// Holds at most one pending frame per side and emits a pair once both
/// sides have reported since the last emission.
#[derive(Debug, Clone)]
pub struct SamplePairer {
    left: Option<Pending>,
    right: Option<Pending>,
    max_pending_age_ms: Option<i64>,
    stats: PairingStats,
}

impl SamplePairer {
    /// `max_pending_age_ms = None` keeps a one-sided sample until it is overwritten
    pub fn new(max_pending_age_ms: Option<i64>) -> Self {
        Self {
            left: None,
            right: None,
            max_pending_age_ms,
            stats: PairingStats::default(),
        }
    }

    fn slot(&mut self, side: Side) -> &mut Option<Pending> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Store a decoded frame for `side`, returning a pair when both slots are full
    pub fn offer(&mut self, side: Side, sample: DecodedSample, now_ms: i64) -> Option<PairedSample> {
        if let Some(max_age) = self.max_pending_age_ms {
            let other = side.opposite();
            let age = self.slot(other).as_ref().map(|p| now_ms - p.received_ms);
            if let Some(age) = age {
                if age > max_age {
                    log::warn!(
                        "[pairing] discarding stale {} sample ({} ms old, limit {} ms)",
                        other,
                        age,
                        max_age
                    );
                    *self.slot(other) = None;
                    self.stats.stale_discards += 1;
                }
            }
        }

        let replaced = self.slot(side).replace(Pending {
            sample,
            received_ms: now_ms,
        });
        if replaced.is_some() {
            self.stats.overwritten += 1;
        }

        match (self.left, self.right) {
            (Some(left), Some(right)) => {
                self.left = None;
                self.right = None;
                self.stats.pairs_emitted += 1;
                Some(PairedSample::new(left.sample, right.sample))
            }
            _ => None,
        }
    }

    pub fn pending(&self, side: Side) -> Option<&DecodedSample> {
        match side {
            Side::Left => self.left.as_ref().map(|p| &p.sample),
            Side::Right => self.right.as_ref().map(|p| &p.sample),
        }
    }

    /// Drop both pending slots (called on stop and restart)
    pub fn clear(&mut self) {
        self.left = None;
        self.right = None;
    }

    pub fn stats(&self) -> PairingStats {
        self.stats
    }
}

impl Default for SamplePairer {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(gyro: f64) -> DecodedSample {
        DecodedSample::new([0.0; 4], [gyro; 4])
    }

    #[test]
    fn test_left_then_right_pairs_once() {
        let mut pairer = SamplePairer::default();

        assert!(pairer.offer(Side::Left, sample(1.0), 0).is_none());
        let pair = pairer.offer(Side::Right, sample(2.0), 1).unwrap();

        assert_eq!(pair.left, sample(1.0));
        assert_eq!(pair.right, sample(2.0));
        assert!(pairer.pending(Side::Left).is_none());
        assert!(pairer.pending(Side::Right).is_none());
        assert_eq!(pairer.stats().pairs_emitted, 1);
    }

    #[test]
    fn test_right_then_left_pairs_once() {
        let mut pairer = SamplePairer::default();

        assert!(pairer.offer(Side::Right, sample(2.0), 0).is_none());
        let pair = pairer.offer(Side::Left, sample(1.0), 0).unwrap();

        assert_eq!(pair.left, sample(1.0));
        assert_eq!(pair.right, sample(2.0));
    }

    #[test]
    fn test_second_left_overwrites_first() {
        let mut pairer = SamplePairer::default();

        assert!(pairer.offer(Side::Left, sample(1.0), 0).is_none());
        assert!(pairer.offer(Side::Left, sample(5.0), 1).is_none());
        let pair = pairer.offer(Side::Right, sample(2.0), 2).unwrap();

        assert_eq!(pair.left, sample(5.0));
        assert_eq!(pairer.stats().overwritten, 1);
    }

    #[test]
    fn test_pairing_consumes_both_slots() {
        let mut pairer = SamplePairer::default();

        pairer.offer(Side::Left, sample(1.0), 0);
        pairer.offer(Side::Right, sample(2.0), 0);
        // A fresh right alone must not pair with the consumed left
        assert!(pairer.offer(Side::Right, sample(3.0), 0).is_none());
    }

    #[test]
    fn test_stale_sample_discarded() {
        let mut pairer = SamplePairer::new(Some(100));

        pairer.offer(Side::Left, sample(1.0), 0);
        assert!(pairer.offer(Side::Right, sample(2.0), 250).is_none());

        assert!(pairer.pending(Side::Left).is_none());
        assert_eq!(pairer.pending(Side::Right), Some(&sample(2.0)));
        assert_eq!(pairer.stats().stale_discards, 1);

        let pair = pairer.offer(Side::Left, sample(4.0), 300).unwrap();
        assert_eq!(pair.left, sample(4.0));
        assert_eq!(pair.right, sample(2.0));
    }

    #[test]
    fn test_sample_within_age_pairs() {
        let mut pairer = SamplePairer::new(Some(100));

        pairer.offer(Side::Left, sample(1.0), 0);
        assert!(pairer.offer(Side::Right, sample(2.0), 100).is_some());
    }

    #[test]
    fn test_clear_drops_pending() {
        let mut pairer = SamplePairer::default();

        pairer.offer(Side::Left, sample(1.0), 0);
        pairer.clear();
        assert!(pairer.offer(Side::Right, sample(2.0), 0).is_none());
        assert_eq!(pairer.pending(Side::Right), Some(&sample(2.0)));
    }

    #[test]
    fn test_side_serde_names() {
        assert_eq!(serde_json::to_string(&Side::Left).unwrap(), "\"left\"");
        let side: Side = serde_json::from_str("\"right\"").unwrap();
        assert_eq!(side, Side::Right);
        assert_eq!(side.opposite(), Side::Left);
    }
}
