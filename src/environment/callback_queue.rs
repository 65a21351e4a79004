use super::scheduled_callback::ScheduledCallback;
use super::{Action, Priority};
use crate::SimTime;

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::Debug;

/// Priority queue of scheduled kernel callbacks.
///
/// Callbacks execute in ascending order of execution time, then ascending [`Priority`], with remaining ties broken by
/// the order in which they were pushed onto the queue. This composite key is the sole source of determinism in a
/// simulation.
///
/// The queue also owns the simulation clock. Popping a callback advances the clock to that callback's execution time,
/// and scheduling compares the requested time against the clock so that nothing can be placed in the past.
#[derive(Debug)]
pub(super) struct CallbackQueue<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    callbacks: BinaryHeap<Reverse<ScheduledCallback<Time, Value>>>,
    last_execution_time: Time,
    callbacks_added: usize,
}

impl<Time, Value> CallbackQueue<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Construct a new [`CallbackQueue`] with nothing scheduled and a clock initialized to the provided time.
    pub(super) fn new(start_time: Time) -> Self {
        Self {
            callbacks: BinaryHeap::default(),
            last_execution_time: start_time,
            callbacks_added: 0,
        }
    }

    /// Schedule the provided action at the specified time.
    ///
    /// # Errors
    ///
    /// If `time` is less than the current clock time, returns an [`Error::BackInTime`] to indicate the likely presence
    /// of a logical bug at the call site, with no modifications to the queue.
    ///
    /// [`Error::BackInTime`]: crate::Error::BackInTime
    pub(super) fn schedule(&mut self, action: Action<Time, Value>, time: Time, priority: Priority) -> crate::Result {
        if time < self.last_execution_time {
            return Err(crate::Error::BackInTime);
        }

        self.push(action, time, priority);
        Ok(())
    }

    /// Schedule the provided action to execute at the current sim time. Callbacks previously scheduled for "now" with
    /// the same priority will still execute before this one does.
    pub(super) fn schedule_now(&mut self, action: Action<Time, Value>, priority: Priority) {
        let time = self.last_execution_time.clone();
        self.push(action, time, priority);
    }

    /// Schedule the provided action after the specified delay, i.e. at `self.current_time().clone() + delay`.
    ///
    /// # Errors
    ///
    /// If the calculated execution time is less than the current clock time, returns an [`Error::BackInTime`] with no
    /// modifications to the queue. If the sum is not representable by `Time`, returns an [`Error::TimeOverflow`],
    /// likewise leaving the queue untouched.
    ///
    /// [`Error::BackInTime`]: crate::Error::BackInTime
    /// [`Error::TimeOverflow`]: crate::Error::TimeOverflow
    pub(super) fn schedule_with_delay(
        &mut self,
        action: Action<Time, Value>,
        delay: Time,
        priority: Priority,
    ) -> crate::Result {
        let time = self
            .last_execution_time
            .add_delay(&delay)
            .ok_or(crate::Error::TimeOverflow)?;
        self.schedule(action, time, priority)
    }

    fn push(&mut self, action: Action<Time, Value>, execution_time: Time, priority: Priority) {
        let count = self.increment_callback_count();
        self.callbacks.push(Reverse(ScheduledCallback {
            execution_time,
            priority,
            insertion_sequence: count,
            action,
        }));
    }

    /// Helper function to make sure incrementing the internal count of added callbacks occurs the same way for every
    /// scheduling path.
    fn increment_callback_count(&mut self) -> usize {
        let count = self.callbacks_added;
        self.callbacks_added += 1;
        count
    }

    /// Pop the next callback from the queue, updating the current clock time to match its execution time.
    pub(super) fn next(&mut self) -> Option<Action<Time, Value>> {
        if let Some(holder) = self.callbacks.pop() {
            self.last_execution_time = holder.0.execution_time;
            Some(holder.0.action)
        } else {
            None
        }
    }

    /// Get the execution time of the next callback without removing it.
    pub(super) fn peek_time(&self) -> Option<&Time> {
        self.callbacks.peek().map(|holder| &holder.0.execution_time)
    }

    /// Get a shared reference to the simulation's current clock time.
    pub(super) fn current_time(&self) -> &Time {
        &self.last_execution_time
    }

    pub(super) fn len(&self) -> usize {
        self.callbacks.len()
    }
}

impl<Time, Value> std::fmt::Display for CallbackQueue<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "CallbackQueue with {} scheduled callbacks at current time {:?}",
            self.callbacks.len(),
            self.last_execution_time
        )
    }
}
