//! Fixed-capacity sample history
//!
//! Keeps the most recent `capacity` samples, dropping the oldest on overflow.

use std::collections::VecDeque;

#[derive(Clone, Debug)]
pub struct SampleRing {
    samples: VecDeque<u32>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: u32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sample
    pub fn last(&self) -> Option<u32> {
        self.samples.back().copied()
    }

    /// Rounded mean of the retained samples
    pub fn average(&self) -> Option<u32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().map(|&s| u64::from(s)).sum();
        Some((sum as f64 / self.samples.len() as f64).round() as u32)
    }

    pub fn min(&self) -> Option<u32> {
        self.samples.iter().copied().min()
    }

    pub fn max(&self) -> Option<u32> {
        self.samples.iter().copied().max()
    }

    /// True when every sample is greater than or equal to its predecessor
    pub fn is_non_decreasing(&self) -> bool {
        self.samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .all(|(prev, next)| next >= prev)
    }

    /// Difference between the newest and oldest sample, if it grew
    pub fn growth(&self) -> u32 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.saturating_sub(*first),
            _ => 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest_when_full() {
        let mut ring = SampleRing::new(3);
        for sample in [10, 20, 30, 40] {
            ring.push(sample);
        }
        assert_eq!(ring.to_vec(), vec![20, 30, 40]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_aggregates() {
        let mut ring = SampleRing::new(30);
        assert_eq!(ring.average(), None);

        for sample in [58, 60, 61] {
            ring.push(sample);
        }
        assert_eq!(ring.average(), Some(60));
        assert_eq!(ring.min(), Some(58));
        assert_eq!(ring.max(), Some(61));
        assert_eq!(ring.growth(), 3);
        assert!(ring.is_non_decreasing());
    }

    #[test]
    fn test_zero_capacity_holds_one_sample() {
        let mut ring = SampleRing::new(0);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.to_vec(), vec![2]);
    }
}
