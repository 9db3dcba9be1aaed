// Copyright 2024
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `TrajectoryQueue`: the bounded hand-off between
//! actor threads (producers) and the learner (consumer). Push blocks with
//! a 10s timeout so a stalled learner applies backpressure rather than
//! growing memory without bound; a full queue is logged and retried, not
//! treated as fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::trajectory::Trajectory;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of [`TrajectoryQueue::push`].
pub enum PushOutcome {
    Delivered,
    /// The queue stayed full for the whole timeout window; the caller is
    /// expected to log and retry.
    TimedOut(Trajectory),
    /// `block_new_values` was called; the trajectory is handed back
    /// unconsumed so the actor can drop it and exit.
    Closed(Trajectory),
}

/// Bounded, cancellable producer/consumer queue of finished self-play
/// trajectories.
pub struct TrajectoryQueue {
    tx: Sender<Trajectory>,
    rx: Receiver<Trajectory>,
    blocked: AtomicBool,
}

impl TrajectoryQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        TrajectoryQueue { tx, rx, blocked: AtomicBool::new(false) }
    }

    /// Blocks for up to 10 seconds trying to hand `trajectory` to the
    /// learner. Never panics on a full or closed queue -- the caller
    /// decides whether to retry.
    pub fn push(&self, trajectory: Trajectory) -> PushOutcome {
        if self.blocked.load(Ordering::Acquire) {
            return PushOutcome::Closed(trajectory);
        }

        match self.tx.send_timeout(trajectory, PUSH_TIMEOUT) {
            Ok(()) => PushOutcome::Delivered,
            Err(SendTimeoutError::Timeout(t)) => PushOutcome::TimedOut(t),
            Err(SendTimeoutError::Disconnected(t)) => PushOutcome::Closed(t),
        }
    }

    /// Non-blocking pop; used by the learner's drain loop, which should
    /// never wait indefinitely on an empty queue while the stop token is
    /// also being polled.
    pub fn try_pop(&self) -> Option<Trajectory> {
        self.rx.try_recv().ok()
    }

    /// Pops with a timeout so the learner can periodically re-check the
    /// stop token instead of blocking forever on an empty queue.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Trajectory> {
        match self.rx.recv_timeout(timeout) {
            Ok(t) => Some(t),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Closes the producer side for shutdown: no further `push`
    /// calls can succeed, but whatever is already queued remains drainable
    /// by the learner.
    pub fn block_new_values(&self) {
        self.blocked.store(true, Ordering::Release);
    }

    /// Drains and discards whatever is left in the queue (used once the
    /// learner has stopped consuming and the supervisor is tearing down).
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn sender(&self) -> Sender<Trajectory> {
        self.tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::Trajectory;

    #[test]
    fn push_then_pop_round_trips() {
        let queue = TrajectoryQueue::new(4);
        let t = Trajectory::new([1.0, -1.0]);

        assert!(matches!(queue.push(t), PushOutcome::Delivered));
        assert_eq!(queue.len(), 1);

        let popped = queue.try_pop();
        assert!(popped.is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_drains_everything() {
        let queue = TrajectoryQueue::new(4);
        for _ in 0..3 {
            queue.push(Trajectory::new([0.0, 0.0]));
        }
        assert_eq!(queue.len(), 3);

        queue.clear();
        assert!(queue.is_empty());
    }
}
