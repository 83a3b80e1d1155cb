//! Bounded sample buffer between the playback worker and the device callback.
//!
//! Models the output line's internal buffer: the worker's blocking writes
//! provide the copy loop's backpressure, while the CPAL callback drains
//! without ever blocking. A `closed` flag stored under the same mutex keeps
//! shutdown deterministic.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Bounded thread-safe queue of interleaved `f32` samples.
///
/// Samples are stored interleaved:
/// `frame0[ch0], frame0[ch1], ..., frame1[ch0], ...`
/// The channel count is fixed for the lifetime of the buffer.
pub(crate) struct LineBuffer {
    channels: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
    max_samples: usize,
}

struct Inner {
    queue: VecDeque<f32>,
    closed: bool,
}

/// Buffer capacity in samples for a `(rate, channels, seconds)` target.
///
/// Non-finite or non-positive durations fall back to two seconds.
pub(crate) fn buffer_capacity_samples(rate_hz: u32, channels: usize, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl LineBuffer {
    pub(crate) fn new(channels: usize, max_samples: usize) -> Self {
        Self {
            channels,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            max_samples: max_samples.max(channels),
        }
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    /// Push interleaved samples, blocking while the buffer is full.
    ///
    /// If the buffer is closed while waiting, the remainder is dropped and
    /// the call returns early.
    pub(crate) fn push_blocking(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.queue.len() >= self.max_samples && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed {
                return;
            }
            while offset < samples.len() && g.queue.len() < self.max_samples {
                g.queue.push_back(samples[offset]);
                offset += 1;
            }
            drop(g);
            self.cv.notify_all();
        }
    }

    /// Pop up to `max_frames` whole frames without blocking.
    ///
    /// Returns `None` when no full frame is currently buffered.
    pub(crate) fn pop_chunk(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        let available_frames = g.queue.len() / self.channels;
        let take_samples = available_frames.min(max_frames) * self.channels;
        if take_samples == 0 {
            return None;
        }
        let mut out = Vec::with_capacity(take_samples);
        for _ in 0..take_samples {
            out.push(g.queue.pop_front().unwrap_or(0.0));
        }
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Mark the buffer finished and wake all waiters. Idempotent.
    ///
    /// Buffered samples remain poppable until drained.
    pub(crate) fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Discard buffered samples and close.
    pub(crate) fn clear_and_close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.queue.clear();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Block until the buffer is closed and fully drained.
    pub(crate) fn wait_drained(&self) {
        let mut g = self.inner.lock().unwrap();
        while !(g.closed && g.queue.is_empty()) {
            g = self.cv.wait(g).unwrap();
        }
    }

    #[cfg(test)]
    fn len_samples(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn buffer_capacity_samples_fallbacks() {
        assert_eq!(buffer_capacity_samples(48_000, 2, 2.0), 192_000);
        assert_eq!(buffer_capacity_samples(48_000, 2, -1.0), 192_000);
        assert_eq!(buffer_capacity_samples(48_000, 2, f32::NAN), 192_000);
        assert_eq!(buffer_capacity_samples(48_000, 2, f32::INFINITY), 192_000);
    }

    #[test]
    fn pop_chunk_empty_returns_none() {
        let q = LineBuffer::new(2, 16);
        assert!(q.pop_chunk(4).is_none());
    }

    #[test]
    fn pop_chunk_returns_whole_frames_only() {
        let q = LineBuffer::new(2, 64);
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = q.pop_chunk(8).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        // the odd trailing sample stays queued
        assert_eq!(q.len_samples(), 1);
    }

    #[test]
    fn pop_chunk_respects_frame_cap() {
        let q = LineBuffer::new(2, 64);
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = q.pop_chunk(2).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn push_blocking_applies_backpressure_until_popped() {
        let q = Arc::new(LineBuffer::new(2, 4));
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0]);

        let pusher = q.clone();
        let handle = thread::spawn(move || {
            // full; blocks until the consumer makes room
            pusher.push_blocking(&[5.0, 6.0]);
        });

        thread::sleep(std::time::Duration::from_millis(50));
        let out = q.pop_chunk(1).unwrap();
        assert_eq!(out, vec![1.0, 2.0]);
        handle.join().unwrap();
        assert_eq!(q.len_samples(), 4);
    }

    #[test]
    fn close_releases_blocked_pusher() {
        let q = Arc::new(LineBuffer::new(2, 2));
        q.push_blocking(&[1.0, 2.0]);

        let pusher = q.clone();
        let handle = thread::spawn(move || {
            pusher.push_blocking(&[3.0, 4.0]);
        });

        thread::sleep(std::time::Duration::from_millis(50));
        q.close();
        handle.join().unwrap();
        // the blocked remainder was dropped
        assert_eq!(q.len_samples(), 2);
    }

    #[test]
    fn wait_drained_returns_once_closed_and_empty() {
        let q = Arc::new(LineBuffer::new(2, 16));
        q.push_blocking(&[1.0, 2.0]);

        let consumer = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(50));
            let _ = consumer.pop_chunk(4);
            consumer.close();
        });

        q.wait_drained();
        handle.join().unwrap();
        assert_eq!(q.len_samples(), 0);
    }

    #[test]
    fn clear_and_close_discards_samples() {
        let q = LineBuffer::new(2, 16);
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0]);
        q.clear_and_close();
        assert_eq!(q.len_samples(), 0);
        assert!(q.pop_chunk(4).is_none());
    }
}
