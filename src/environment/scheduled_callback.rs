use super::{Action, Priority};
use crate::SimTime;
use std::cmp::Ordering;
use std::fmt::Debug;

/// Helper struct for the callback queue. Holds the kernel action alongside the data necessary to sort it within the
/// priority queue, namely the execution time, the priority and a record of the insertion sequence.
///
/// The implementation of [`Ord`] on this struct compares the execution time first, then the priority, and consults the
/// insertion sequence only to break the remaining ties. The insertion sequence is unique per queue, so no two holders
/// ever compare equal.
#[derive(Debug)]
pub(super) struct ScheduledCallback<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    pub execution_time: Time,
    pub priority: Priority,
    pub insertion_sequence: usize,
    pub action: Action<Time, Value>,
}

impl<Time, Value> ScheduledCallback<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn key(&self) -> (&Time, Priority, usize) {
        (&self.execution_time, self.priority, self.insertion_sequence)
    }
}

impl<Time, Value> PartialEq<Self> for ScheduledCallback<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<Time, Value> Eq for ScheduledCallback<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
}

impl<Time, Value> PartialOrd<Self> for ScheduledCallback<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Time, Value> Ord for ScheduledCallback<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
