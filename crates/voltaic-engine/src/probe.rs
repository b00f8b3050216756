//! Probe sample storage: fixed-capacity ring buffers of `(t, V)`.

/// Ring capacity per probe channel.
pub const MAX_HISTORY: usize = 32768;

/// Fixed-capacity circular buffer of timestamped voltage samples.
///
/// Appending past capacity overwrites the oldest sample; iteration is
/// always chronological.
#[derive(Debug, Clone)]
pub struct ProbeBuffer {
    samples: Vec<(f64, f64)>,
    /// Index of the oldest sample once the ring has wrapped.
    head: usize,
    capacity: usize,
}

impl Default for ProbeBuffer {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }
}

impl ProbeBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::new(),
            head: 0,
            capacity: capacity.max(1),
        }
    }

    /// Append a sample, overwriting the oldest once full.
    pub fn push(&mut self, t: f64, v: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push((t, v));
        } else {
            self.samples[self.head] = (t, v);
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.head = 0;
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<(f64, f64)> {
        if self.samples.is_empty() {
            None
        } else if self.samples.len() < self.capacity {
            self.samples.last().copied()
        } else {
            let idx = (self.head + self.capacity - 1) % self.capacity;
            Some(self.samples[idx])
        }
    }

    /// Chronological iterator over the stored samples.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let (older, newer) = if self.samples.len() < self.capacity {
            (&self.samples[..0], &self.samples[..])
        } else {
            (&self.samples[self.head..], &self.samples[..self.head])
        };
        older.iter().copied().chain(newer.iter().copied())
    }

    /// Voltage values only, chronological.
    pub fn voltages(&self) -> Vec<f64> {
        self.iter().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_then_wraps() {
        let mut buf = ProbeBuffer::with_capacity(4);
        for i in 0..6 {
            buf.push(i as f64, 10.0 * i as f64);
        }
        assert_eq!(buf.len(), 4);
        let times: Vec<f64> = buf.iter().map(|(t, _)| t).collect();
        // Oldest two samples were overwritten.
        assert_eq!(times, vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buf.latest(), Some((5.0, 50.0)));
    }

    #[test]
    fn chronological_before_wrap() {
        let mut buf = ProbeBuffer::with_capacity(8);
        for i in 0..3 {
            buf.push(i as f64, 0.0);
        }
        let times: Vec<f64> = buf.iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(buf.latest(), Some((2.0, 0.0)));
    }

    #[test]
    fn clear_resets() {
        let mut buf = ProbeBuffer::with_capacity(2);
        buf.push(0.0, 1.0);
        buf.push(1.0, 2.0);
        buf.push(2.0, 3.0);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.iter().count(), 0);
    }
}
