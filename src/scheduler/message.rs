//! Signal payloads and their merge rules

use serde::{Deserialize, Serialize};

/// Payload attached to a signal.
///
/// When a vertex is signaled again before it runs, the pending message and
/// the new one are merged into a single activation.
pub trait Message: Clone + Send + Sync + 'static {
    /// Fold `other` into `self`. Must be commutative and associative.
    fn merge(&mut self, other: Self);

    /// Larger runs first under the priority scheduler
    fn priority(&self) -> f64 {
        0.0
    }
}

impl Message for () {
    fn merge(&mut self, _other: Self) {}
}

/// Keeps the largest value; the value is also the priority
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MaxPriority(pub f64);

impl Message for MaxPriority {
    fn merge(&mut self, other: Self) {
        self.0 = self.0.max(other.0);
    }

    fn priority(&self) -> f64 {
        self.0
    }
}

/// Keeps the smallest value; smaller values run first
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinValue(pub f64);

impl Default for MinValue {
    fn default() -> Self {
        MinValue(f64::INFINITY)
    }
}

impl Message for MinValue {
    fn merge(&mut self, other: Self) {
        self.0 = self.0.min(other.0);
    }

    fn priority(&self) -> f64 {
        -self.0
    }
}

/// Accumulates values; larger magnitudes run first
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Summed(pub f64);

impl Message for Summed {
    fn merge(&mut self, other: Self) {
        self.0 += other.0;
    }

    fn priority(&self) -> f64 {
        self.0.abs()
    }
}

/// Last write wins
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Latest<T>(pub T);

impl<T: Clone + Send + Sync + 'static> Message for Latest<T> {
    fn merge(&mut self, other: Self) {
        *self = other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_rules() {
        let mut max = MaxPriority(1.0);
        max.merge(MaxPriority(3.0));
        max.merge(MaxPriority(2.0));
        assert_eq!(max, MaxPriority(3.0));
        assert_eq!(max.priority(), 3.0);

        let mut min = MinValue(5.0);
        min.merge(MinValue(2.0));
        min.merge(MinValue(4.0));
        assert_eq!(min, MinValue(2.0));
        assert!(MinValue(1.0).priority() > MinValue(2.0).priority());
        assert_eq!(MinValue::default().0, f64::INFINITY);

        let mut sum = Summed(1.5);
        sum.merge(Summed(-4.0));
        assert_eq!(sum, Summed(-2.5));
        assert_eq!(sum.priority(), 2.5);

        let mut latest = Latest("a");
        latest.merge(Latest("b"));
        assert_eq!(latest.0, "b");
        assert_eq!(latest.priority(), 0.0);
    }
}
