// Bounded sample buffer with a size-triggered window extraction
//
// Samples accumulate until the buffer holds `buffer_size` of them; the
// window is then the first `batch_size` samples and everything left over is
// discarded, so consecutive windows never overlap and nothing carries into
// the next fill. Discards are counted in the metrics.

use crate::session::types::EegSample;
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing buffer activity over a session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BufferMetrics {
    pub total_appended: u64,
    pub total_windows: u64,
    pub total_discarded: u64,
}

/// Bounded FIFO of samples owned by the ingestion task.
pub struct SampleBuffer {
    queue: ArrayQueue<EegSample>,
    batch_size: usize,

    total_appended: AtomicU64,
    total_windows: AtomicU64,
    total_discarded: AtomicU64,
}

impl SampleBuffer {
    /// Creates a buffer that fires once `buffer_size` samples are queued and
    /// extracts windows of `batch_size` samples.
    pub fn new(buffer_size: usize, batch_size: usize) -> Self {
        debug_assert!(batch_size <= buffer_size);
        Self {
            queue: ArrayQueue::new(buffer_size),
            batch_size,
            total_appended: AtomicU64::new(0),
            total_windows: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
        }
    }

    /// Appends a sample at the tail. The caller extracts a window as soon as
    /// `should_fire` reports true, so the queue cannot overflow in normal
    /// operation; a sample that arrives against a full queue is dropped and
    /// counted as discarded.
    pub fn append(&self, sample: EegSample) {
        match self.queue.push(sample) {
            Ok(()) => {
                self.total_appended.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.total_discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// True once enough samples have accumulated to form a window.
    pub fn should_fire(&self) -> bool {
        self.queue.is_full()
    }

    /// Takes the first `batch_size` samples as the window and discards the
    /// rest. The buffer is empty afterwards; returns the window and how many
    /// samples were thrown away.
    pub fn extract_window(&self) -> (Vec<EegSample>, u64) {
        let mut window = Vec::with_capacity(self.batch_size);
        while window.len() < self.batch_size {
            match self.queue.pop() {
                Some(sample) => window.push(sample),
                None => break,
            }
        }

        let mut discarded = 0u64;
        while self.queue.pop().is_some() {
            discarded += 1;
        }

        self.total_windows.fetch_add(1, Ordering::Relaxed);
        self.total_discarded.fetch_add(discarded, Ordering::Relaxed);
        (window, discarded)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn metrics(&self) -> BufferMetrics {
        BufferMetrics {
            total_appended: self.total_appended.load(Ordering::Relaxed),
            total_windows: self.total_windows.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(tag: f32) -> EegSample {
        EegSample {
            captured_at: Utc::now(),
            channels: vec![tag],
        }
    }

    #[test]
    fn does_not_fire_below_threshold() {
        let buffer = SampleBuffer::new(100, 30);
        for i in 0..99 {
            buffer.append(sample(i as f32));
            assert!(!buffer.should_fire());
        }
        assert_eq!(buffer.len(), 99);
    }

    #[test]
    fn fires_at_threshold_and_discards_excess() {
        let buffer = SampleBuffer::new(100, 30);
        for i in 0..100 {
            buffer.append(sample(i as f32));
        }
        assert!(buffer.should_fire());

        let (window, discarded) = buffer.extract_window();
        assert_eq!(window.len(), 30);
        assert_eq!(discarded, 70);
        assert!(buffer.is_empty());

        // The window is the first 30 samples in arrival order.
        for (i, s) in window.iter().enumerate() {
            assert_eq!(s.channels[0], i as f32);
        }

        let metrics = buffer.metrics();
        assert_eq!(metrics.total_appended, 100);
        assert_eq!(metrics.total_windows, 1);
        assert_eq!(metrics.total_discarded, 70);
    }

    #[test]
    fn next_fill_starts_from_empty() {
        let buffer = SampleBuffer::new(4, 2);
        for i in 0..4 {
            buffer.append(sample(i as f32));
        }
        buffer.extract_window();

        for i in 4..8 {
            buffer.append(sample(i as f32));
        }
        let (window, discarded) = buffer.extract_window();
        assert_eq!(discarded, 2);
        assert_eq!(window[0].channels[0], 4.0);
        assert_eq!(window[1].channels[0], 5.0);
    }
}
