//! Transport state shared between the caller thread and the playback worker.
//!
//! Status is the only state shared across the two threads: caller-issued
//! transitions (pause/resume/stop) and the worker's observations go through
//! one mutex, and a condvar wakes a paused worker immediately on
//! resume/stop instead of polling.

use std::sync::{Condvar, Mutex};

/// Transport status of the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Initial state after construction, before the first `play`.
    Unknown,
    /// A session is active and the copy loop is feeding the line.
    Playing,
    /// A session is active but the copy loop is parked.
    Paused,
    /// Terminal until the next `play` restarts the machine.
    Stopped,
}

/// Mutex-guarded status with a condvar for worker wake-ups.
#[derive(Debug)]
pub struct Transport {
    state: Mutex<Status>,
    cv: Condvar,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Status::Unknown),
            cv: Condvar::new(),
        }
    }

    /// Current status snapshot.
    pub fn current(&self) -> Status {
        *self.state.lock().unwrap()
    }

    /// Unconditional transition to `Playing` when a session starts.
    pub(crate) fn begin(&self) {
        let mut s = self.state.lock().unwrap();
        *s = Status::Playing;
        drop(s);
        self.cv.notify_all();
    }

    /// `Playing -> Paused`. Any other state is a no-op.
    ///
    /// Returns whether the transition happened.
    pub(crate) fn pause(&self) -> bool {
        self.transition(Status::Playing, Status::Paused)
    }

    /// `Paused -> Playing`. Any other state is a no-op.
    pub(crate) fn resume(&self) -> bool {
        self.transition(Status::Paused, Status::Playing)
    }

    /// `Playing|Paused -> Stopped`. Any other state is a no-op.
    ///
    /// Wakes a paused worker so it can observe the stop.
    pub(crate) fn request_stop(&self) -> bool {
        let mut s = self.state.lock().unwrap();
        let effective = matches!(*s, Status::Playing | Status::Paused);
        if effective {
            *s = Status::Stopped;
        }
        drop(s);
        if effective {
            self.cv.notify_all();
        }
        effective
    }

    /// Worker-side terminal transition once the session has torn down.
    pub(crate) fn finish(&self) {
        let mut s = self.state.lock().unwrap();
        *s = Status::Stopped;
        drop(s);
        self.cv.notify_all();
    }

    /// Block the worker while the status is `Paused`.
    ///
    /// Returns on the first transition away from `Paused` (resume or stop).
    pub(crate) fn wait_while_paused(&self) {
        let mut s = self.state.lock().unwrap();
        while *s == Status::Paused {
            s = self.cv.wait(s).unwrap();
        }
    }

    fn transition(&self, from: Status, to: Status) -> bool {
        let mut s = self.state.lock().unwrap();
        let effective = *s == from;
        if effective {
            *s = to;
        }
        drop(s);
        if effective {
            self.cv.notify_all();
        }
        effective
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
