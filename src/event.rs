use crate::environment::Action;
use crate::{Environment, Error, Priority, ProcessHandle, ProcessState, Resource, SimTime};

use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Handle to an event owned by an [`Environment`].
///
/// Handles are cheap to copy and stay valid for the lifetime of the environment that issued them, including after the
/// event has been processed, so that its fixed outcome can still be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) usize);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "event #{}", self.0)
    }
}

/// Lifecycle of an event. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventState {
    /// Created, outcome not yet fixed.
    Pending,
    /// Outcome fixed and processing scheduled, but subscribers have not run yet.
    Triggered,
    /// Subscribers have run. Terminal.
    Processed,
}

/// Why an event failed.
///
/// Failures travel through the event graph exactly like success values: a process waiting on a failed event receives
/// the failure at its next resumption and may handle it or let it propagate, failing the process in turn.
#[derive(Debug, Clone)]
pub enum Failure<Value> {
    /// The process was interrupted, carrying the optional cause handed to [`ProcessHandle::interrupt()`].
    Interrupted(Option<Value>),
    /// Any other error, most commonly one raised by process logic.
    Error(Rc<dyn std::error::Error>),
}

impl<Value> Failure<Value> {
    /// Wrap a client error as a failure.
    pub fn error<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Failure::Error(Rc::new(error))
    }

    /// Whether this failure is an interrupt.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Failure::Interrupted(_))
    }
}

impl<Value> std::fmt::Display for Failure<Value>
where
    Value: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Interrupted(Some(cause)) => write!(f, "process interrupted: {:?}", cause),
            Self::Interrupted(None) => write!(f, "process interrupted"),
            Self::Error(e) => write!(f, "{}", e),
        }
    }
}

impl<Value> std::error::Error for Failure<Value>
where
    Value: Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Interrupted(_) => None,
            Self::Error(e) => Some(e.as_ref()),
        }
    }
}

// lets process logic use `?` on kernel calls
impl<Value> From<Error> for Failure<Value> {
    fn from(error: Error) -> Self {
        Failure::Error(Rc::new(error))
    }
}

/// The fixed result of a triggered event: an optional success value, or a failure.
pub type Outcome<Value> = std::result::Result<Option<Value>, Failure<Value>>;

pub(crate) enum Status<Value> {
    Pending,
    Triggered(Outcome<Value>),
    Processed(Outcome<Value>),
}

/// Who fixes an event's outcome. Only [`Plain`] events may be triggered by client code.
///
/// [`Plain`]: EventKind::Plain
#[derive(Debug, Clone, Copy)]
pub(crate) enum EventKind {
    Plain,
    Timeout,
    Process,
    Request {
        resource: Resource,
        owner: Option<ProcessHandle>,
    },
    Condition {
        remaining: usize,
    },
}

/// A client closure registered through [`Environment::add_callback()`].
pub(crate) type EventCallback<Time, Value> = Box<dyn FnOnce(&mut Environment<Time, Value>, Outcome<Value>) -> crate::Result>;

/// An interested party on an event's callback list.
pub(crate) enum Subscriber<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    Process(usize),
    Condition(EventId),
    Callback(EventCallback<Time, Value>),
}

impl<Time, Value> Debug for Subscriber<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Process(process) => write!(f, "Process(#{})", process),
            Self::Condition(event) => write!(f, "Condition({})", event),
            Self::Callback(_) => write!(f, "Callback"),
        }
    }
}

pub(crate) struct EventSlot<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    pub status: Status<Value>,
    pub kind: EventKind,
    pub callbacks: Vec<Subscriber<Time, Value>>,
    pub defused: bool,
}

impl<Time, Value> EventSlot<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn new(kind: EventKind) -> Self {
        Self {
            status: Status::Pending,
            kind,
            callbacks: Vec::new(),
            defused: false,
        }
    }

    pub fn state(&self) -> EventState {
        match self.status {
            Status::Pending => EventState::Pending,
            Status::Triggered(_) => EventState::Triggered,
            Status::Processed(_) => EventState::Processed,
        }
    }
}

impl<Time, Value> Debug for EventSlot<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("EventSlot")
            .field("state", &self.state())
            .field("kind", &self.kind)
            .field("callbacks", &self.callbacks)
            .field("defused", &self.defused)
            .finish()
    }
}

impl<Time, Value> Environment<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Create a pending event that client code triggers through [`succeed()`], [`fail()`] or [`trigger()`].
    ///
    /// [`succeed()`]: Environment::succeed
    /// [`fail()`]: Environment::fail
    /// [`trigger()`]: Environment::trigger
    pub fn event(&mut self) -> EventId {
        self.new_event(EventKind::Plain)
    }

    /// Create an event that the scheduler triggers, with no value, once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackInTime`] if `delay` is negative and [`Error::TimeOverflow`] if the deadline does not fit the
    /// clock type. Zero delays are legal and trigger at the current instant, after any work already scheduled for it.
    ///
    /// [`Error::BackInTime`]: crate::Error::BackInTime
    /// [`Error::TimeOverflow`]: crate::Error::TimeOverflow
    pub fn timeout(&mut self, delay: Time) -> crate::Result<EventId> {
        self.timeout_with(delay, None)
    }

    /// Create an event that the scheduler triggers with `value` once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackInTime`] if `delay` is negative and [`Error::TimeOverflow`] if the deadline does not fit the
    /// clock type.
    ///
    /// [`Error::BackInTime`]: crate::Error::BackInTime
    /// [`Error::TimeOverflow`]: crate::Error::TimeOverflow
    pub fn timeout_with(&mut self, delay: Time, value: Option<Value>) -> crate::Result<EventId> {
        // the slot is only allocated once the deadline has been accepted
        let event = EventId(self.events.len());
        self.schedule_with_delay(Action::Timeout { event, value }, delay, Priority::Normal)?;
        self.events.push(EventSlot::new(EventKind::Timeout));
        Ok(event)
    }

    /// Fix the outcome of a pending event and schedule its processing at the current time.
    ///
    /// # Errors
    ///
    /// * [`Error::KernelOwned`] if the event is a timeout, process, resource request or condition.
    /// * [`Error::AlreadyTriggered`] if the event's outcome is already fixed.
    /// * [`Error::InvalidHandle`] if the handle does not belong to this environment.
    pub fn trigger(&mut self, event: EventId, outcome: Outcome<Value>) -> crate::Result {
        let slot = self.events.get(event.0).ok_or(Error::InvalidHandle)?;
        if !matches!(slot.kind, EventKind::Plain) {
            return Err(Error::KernelOwned);
        }
        self.fix_outcome(event, outcome)
    }

    /// Trigger an event successfully with an optional value. See [`trigger()`].
    ///
    /// # Errors
    ///
    /// See [`trigger()`].
    ///
    /// [`trigger()`]: Environment::trigger
    pub fn succeed(&mut self, event: EventId, value: Option<Value>) -> crate::Result {
        self.trigger(event, Ok(value))
    }

    /// Trigger an event as failed. See [`trigger()`].
    ///
    /// # Errors
    ///
    /// See [`trigger()`].
    ///
    /// [`trigger()`]: Environment::trigger
    pub fn fail(&mut self, event: EventId, failure: Failure<Value>) -> crate::Result {
        self.trigger(event, Err(failure))
    }

    /// Register a closure to run with the event's outcome once the event is processed.
    ///
    /// Callbacks run in registration order and exactly once. If the event has already been processed, the callback is
    /// scheduled to run at the current time instead, so registration timing never causes a callback to be skipped.
    /// Registering a callback also counts as observing a failure, so a failed event with a callback never aborts the
    /// run.
    ///
    /// An error returned from the callback aborts the run that executes it, once the event's remaining subscribers have
    /// been notified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle does not belong to this environment.
    pub fn add_callback<F>(&mut self, event: EventId, callback: F) -> crate::Result
    where
        F: FnOnce(&mut Environment<Time, Value>, Outcome<Value>) -> crate::Result + 'static,
    {
        self.subscribe(event, Subscriber::Callback(Box::new(callback)))
    }

    /// Mark an event's failure as handled, so that processing it without subscribers does not abort the run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle does not belong to this environment.
    pub fn defuse(&mut self, event: impl Into<EventId>) -> crate::Result {
        let slot = self.events.get_mut(event.into().0).ok_or(Error::InvalidHandle)?;
        slot.defused = true;
        Ok(())
    }

    /// Current lifecycle state of an event, or `None` for a foreign handle.
    pub fn state(&self, event: impl Into<EventId>) -> Option<EventState> {
        self.events.get(event.into().0).map(EventSlot::state)
    }

    /// The fixed outcome of a triggered or processed event. `None` while the event is pending.
    pub fn outcome(&self, event: impl Into<EventId>) -> Option<&Outcome<Value>> {
        match &self.events.get(event.into().0)?.status {
            Status::Pending => None,
            Status::Triggered(outcome) | Status::Processed(outcome) => Some(outcome),
        }
    }

    /// The success value of a triggered or processed event, if it has one.
    pub fn value(&self, event: impl Into<EventId>) -> Option<&Value> {
        match self.outcome(event)? {
            Ok(value) => value.as_ref(),
            Err(_) => None,
        }
    }

    pub(crate) fn new_event(&mut self, kind: EventKind) -> EventId {
        let event = EventId(self.events.len());
        self.events.push(EventSlot::new(kind));
        event
    }

    /// Pending -> Triggered, regardless of who owns the event.
    pub(crate) fn fix_outcome(&mut self, event: EventId, outcome: Outcome<Value>) -> crate::Result {
        let slot = self.events.get_mut(event.0).ok_or(Error::InvalidHandle)?;
        if !matches!(slot.status, Status::Pending) {
            return Err(Error::AlreadyTriggered);
        }

        slot.status = Status::Triggered(outcome);
        self.schedule_now(Action::Process(event), Priority::Normal);
        Ok(())
    }

    /// Append a subscriber, or hand it the outcome at the current time if the event was already processed.
    pub(crate) fn subscribe(&mut self, event: EventId, subscriber: Subscriber<Time, Value>) -> crate::Result {
        let slot = self.events.get_mut(event.0).ok_or(Error::InvalidHandle)?;
        if let Status::Processed(_) = slot.status {
            self.schedule_now(Action::Notify { event, subscriber }, Priority::Normal);
        } else {
            slot.callbacks.push(subscriber);
        }
        Ok(())
    }

    /// Triggered -> Processed: run every subscriber in registration order.
    pub(crate) fn process_event(&mut self, event: EventId) -> crate::Result {
        let slot = self.events.get_mut(event.0).ok_or(Error::InvalidHandle)?;
        let outcome = match std::mem::replace(&mut slot.status, Status::Pending) {
            Status::Triggered(outcome) => outcome,
            status => {
                // processing is only ever scheduled by a trigger
                slot.status = status;
                return Ok(());
            },
        };

        slot.status = Status::Processed(outcome.clone());
        let callbacks = std::mem::take(&mut slot.callbacks);
        if let Err(failure) = &outcome {
            if callbacks.is_empty() && !slot.defused {
                log::warn!("[{:?}] {} failed with no observers: {}", self.now(), event, failure);
                return Err(Error::UnhandledFailure(Box::new(failure.clone())));
            }
        }

        // every subscriber runs even if an earlier one errors; the first error is reported
        let mut first_error = None;
        for subscriber in callbacks {
            if let Err(error) = self.notify(event, subscriber, outcome.clone()) {
                log::warn!("[{:?}] subscriber of {} returned an error: {}", self.now(), event, error);
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) fn processed_outcome(&self, event: EventId) -> crate::Result<Outcome<Value>> {
        match &self.events.get(event.0).ok_or(Error::InvalidHandle)?.status {
            Status::Processed(outcome) => Ok(outcome.clone()),
            _ => Err(Error::InvalidHandle),
        }
    }

    pub(crate) fn notify(
        &mut self,
        event: EventId,
        subscriber: Subscriber<Time, Value>,
        outcome: Outcome<Value>,
    ) -> crate::Result {
        match subscriber {
            Subscriber::Process(process) => {
                // an interrupted process has had its subscription revoked
                let waiting = self
                    .processes
                    .get(process)
                    .map_or(false, |slot| slot.state == ProcessState::Suspended(event));
                if waiting {
                    self.resume_process(process, Some(outcome))
                } else {
                    Ok(())
                }
            },
            Subscriber::Condition(condition) => self.check_condition(condition, outcome),
            Subscriber::Callback(callback) => callback(self, outcome),
        }
    }
}
