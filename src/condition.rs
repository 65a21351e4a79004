use crate::event::{EventKind, Status, Subscriber};
use crate::{Environment, Error, EventId, Outcome, SimTime};

use std::fmt::Debug;

impl<Time, Value> Environment<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Create a kernel-owned event that triggers as soon as any one of `events` is processed successfully, carrying
    /// that event's value. If a child fails first, the condition fails with the same failure.
    ///
    /// A process that waits on `any_of(&[work, deadline])` gets a race between some work and a timeout. The losing
    /// child is unaffected and still triggers later.
    ///
    /// An empty set triggers immediately with no value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if any handle does not belong to this environment, without creating anything.
    pub fn any_of(&mut self, events: &[EventId]) -> crate::Result<EventId> {
        self.condition(events, events.len().min(1))
    }

    /// Create a kernel-owned event that triggers once every one of `events` has been processed successfully, carrying
    /// the value of the last one to complete. The first child failure fails the condition.
    ///
    /// An empty set triggers immediately with no value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if any handle does not belong to this environment, without creating anything.
    pub fn all_of(&mut self, events: &[EventId]) -> crate::Result<EventId> {
        self.condition(events, events.len())
    }

    fn condition(&mut self, events: &[EventId], remaining: usize) -> crate::Result<EventId> {
        if events.iter().any(|event| event.0 >= self.events.len()) {
            return Err(Error::InvalidHandle);
        }

        let condition = self.new_event(EventKind::Condition { remaining });
        if remaining == 0 {
            self.fix_outcome(condition, Ok(None))?;
            return Ok(condition);
        }

        for event in events {
            self.subscribe(*event, Subscriber::Condition(condition))?;
        }
        Ok(condition)
    }

    /// Count one processed child towards a condition. Children processed after the condition triggered are ignored.
    pub(crate) fn check_condition(&mut self, condition: EventId, outcome: Outcome<Value>) -> crate::Result {
        let slot = self.events.get_mut(condition.0).ok_or(Error::InvalidHandle)?;
        if !matches!(slot.status, Status::Pending) {
            return Ok(());
        }

        let satisfied = match (&mut slot.kind, &outcome) {
            (_, Err(_)) => true,
            (EventKind::Condition { remaining }, Ok(_)) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            },
            _ => return Err(Error::InvalidHandle),
        };

        if satisfied {
            log::trace!("[{:?}] condition {} satisfied", self.now(), condition);
            self.fix_outcome(condition, outcome)
        } else {
            Ok(())
        }
    }
}
