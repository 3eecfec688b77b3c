//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Engine-owned timer management.
//!
//! All protocol timers live in a single monotonic min-heap of deadlines.
//! The engine never reads the wall clock: the embedding process feeds the
//! elapsed time in through `sync` and drains due timers with `poll_due`.
//! Timer handles cancel their timer when dropped, scoping every timer to
//! its owning object.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::{Rc, Weak};
use std::time::Duration;

#[derive(Debug)]
pub struct TimerWheel<M> {
    now: Duration,
    heap: BinaryHeap<Reverse<(Duration, u64)>>,
    entries: HashMap<u64, TimerEntry<M>>,
    next_id: u64,
}

#[derive(Debug)]
struct TimerEntry<M> {
    deadline: Duration,
    delay: Duration,
    periodic: bool,
    msg: M,
}

// Shared handle to the timer wheel.
#[derive(Debug)]
pub struct TimerCtl<M>(Rc<RefCell<TimerWheel<M>>>);

// One-shot timer handle. Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimeoutTask<M> {
    id: u64,
    wheel: Weak<RefCell<TimerWheel<M>>>,
}

// Periodic timer handle. Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct IntervalTask<M> {
    id: u64,
    wheel: Weak<RefCell<TimerWheel<M>>>,
}

// ===== impl TimerWheel =====

impl<M> TimerWheel<M> {
    fn insert(&mut self, delay: Duration, periodic: bool, msg: M) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let deadline = self.now + delay;
        self.entries.insert(
            id,
            TimerEntry {
                deadline,
                delay,
                periodic,
                msg,
            },
        );
        self.heap.push(Reverse((deadline, id)));
        id
    }

    fn reschedule(&mut self, id: u64, delay: Option<Duration>) {
        let now = self.now;
        if let Some(entry) = self.entries.get_mut(&id) {
            if let Some(delay) = delay {
                entry.delay = delay;
            }
            entry.deadline = now + entry.delay;
            self.heap.push(Reverse((entry.deadline, id)));
        }
    }
}

// ===== impl TimerCtl =====

impl<M> TimerCtl<M>
where
    M: Clone,
{
    pub fn new() -> TimerCtl<M> {
        TimerCtl(Rc::new(RefCell::new(TimerWheel {
            now: Duration::ZERO,
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            next_id: 0,
        })))
    }

    // Advances the wheel's notion of the current time.
    pub fn sync(&self, now: Duration) {
        let mut wheel = self.0.borrow_mut();
        if now > wheel.now {
            wheel.now = now;
        }
    }

    pub fn now(&self) -> Duration {
        self.0.borrow().now
    }

    pub fn timeout(&self, delay: Duration, msg: M) -> TimeoutTask<M> {
        let id = self.0.borrow_mut().insert(delay, false, msg);
        TimeoutTask {
            id,
            wheel: Rc::downgrade(&self.0),
        }
    }

    pub fn interval(&self, period: Duration, msg: M) -> IntervalTask<M> {
        let id = self.0.borrow_mut().insert(period, true, msg);
        IntervalTask {
            id,
            wheel: Rc::downgrade(&self.0),
        }
    }

    // Pops the next due timer, if any. Periodic timers are rearmed.
    pub fn poll_due(&self) -> Option<M> {
        let mut wheel = self.0.borrow_mut();
        while let Some(Reverse((deadline, id))) = wheel.heap.peek().copied() {
            if deadline > wheel.now {
                return None;
            }
            wheel.heap.pop();

            // Skip heap entries whose timer was cancelled or rearmed.
            let Some(entry) = wheel.entries.get(&id) else {
                continue;
            };
            if entry.deadline != deadline {
                continue;
            }

            if entry.periodic {
                let msg = entry.msg.clone();
                wheel.reschedule(id, None);
                return Some(msg);
            } else {
                let entry = wheel.entries.remove(&id).unwrap();
                return Some(entry.msg);
            }
        }

        None
    }

    // Milliseconds until the next timer firing.
    pub fn timeout_ms(&self) -> Option<u64> {
        let wheel = self.0.borrow();
        wheel
            .heap
            .iter()
            .filter(|Reverse((deadline, id))| {
                wheel
                    .entries
                    .get(id)
                    .is_some_and(|entry| entry.deadline == *deadline)
            })
            .map(|Reverse((deadline, _))| *deadline)
            .min()
            .map(|deadline| {
                deadline.saturating_sub(wheel.now).as_millis() as u64
            })
    }
}

impl<M> Clone for TimerCtl<M> {
    fn clone(&self) -> TimerCtl<M> {
        TimerCtl(self.0.clone())
    }
}

impl<M> Default for TimerCtl<M>
where
    M: Clone,
{
    fn default() -> TimerCtl<M> {
        TimerCtl::new()
    }
}

// ===== impl TimeoutTask =====

impl<M> TimeoutTask<M> {
    // Rearms the timer; `None` reuses the original delay.
    pub fn reset(&mut self, delay: Option<Duration>) {
        if let Some(wheel) = self.wheel.upgrade() {
            wheel.borrow_mut().reschedule(self.id, delay);
        }
    }
}

impl<M> Drop for TimeoutTask<M> {
    fn drop(&mut self) {
        if let Some(wheel) = self.wheel.upgrade() {
            wheel.borrow_mut().entries.remove(&self.id);
        }
    }
}

// ===== impl IntervalTask =====

impl<M> IntervalTask<M> {
    pub fn reset(&mut self, period: Option<Duration>) {
        if let Some(wheel) = self.wheel.upgrade() {
            wheel.borrow_mut().reschedule(self.id, period);
        }
    }
}

impl<M> Drop for IntervalTask<M> {
    fn drop(&mut self) {
        if let Some(wheel) = self.wheel.upgrade() {
            wheel.borrow_mut().entries.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn fire_in_deadline_order() {
        let timers = TimerCtl::new();
        let _t1 = timers.timeout(3 * SEC, "three");
        let _t2 = timers.timeout(SEC, "one");
        let _t3 = timers.timeout(2 * SEC, "two");

        timers.sync(3 * SEC);
        assert_eq!(timers.poll_due(), Some("one"));
        assert_eq!(timers.poll_due(), Some("two"));
        assert_eq!(timers.poll_due(), Some("three"));
        assert_eq!(timers.poll_due(), None);
    }

    #[test]
    fn drop_cancels() {
        let timers = TimerCtl::new();
        let t1 = timers.timeout(SEC, "one");
        drop(t1);

        timers.sync(2 * SEC);
        assert_eq!(timers.poll_due(), None);
        assert_eq!(timers.timeout_ms(), None);
    }

    #[test]
    fn reset_postpones() {
        let timers = TimerCtl::new();
        let mut t1 = timers.timeout(2 * SEC, "one");

        timers.sync(SEC);
        t1.reset(None);
        timers.sync(2 * SEC);
        // The original deadline has passed but the reset moved it to t=3s.
        assert_eq!(timers.poll_due(), None);
        timers.sync(3 * SEC);
        assert_eq!(timers.poll_due(), Some("one"));
    }

    #[test]
    fn interval_rearms() {
        let timers = TimerCtl::new();
        let _t1 = timers.interval(SEC, "tick");

        timers.sync(SEC);
        assert_eq!(timers.poll_due(), Some("tick"));
        assert_eq!(timers.poll_due(), None);
        timers.sync(2 * SEC);
        assert_eq!(timers.poll_due(), Some("tick"));
    }

    #[test]
    fn timeout_ms_reports_earliest() {
        let timers = TimerCtl::new();
        let _t1 = timers.timeout(5 * SEC, "five");
        let _t2 = timers.timeout(2 * SEC, "two");
        assert_eq!(timers.timeout_ms(), Some(2000));
    }
}
