mod callback_queue;
mod scheduled_callback;

use crate::event::{EventSlot, Subscriber};
use crate::process::ProcessSlot;
use crate::resource::ResourceSlot;
use crate::{EventId, ProcessHandle, SimTime};
use callback_queue::CallbackQueue;

use std::fmt::{Debug, Formatter};

/// Tie-breaker for callbacks scheduled at the same simulated instant.
///
/// Lower priorities run first. Interrupt deliveries and process start-ups are [`Urgent`] so that they preempt ordinary
/// event processing at the same instant, which is always [`Normal`].
///
/// [`Urgent`]: Priority::Urgent
/// [`Normal`]: Priority::Normal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Runs ahead of every [`Normal`] callback at the same instant.
    ///
    /// [`Normal`]: Priority::Normal
    Urgent,
    /// The priority of ordinary event processing.
    Normal,
}

/// A client callback scheduled directly on the queue through [`Environment::schedule_callback()`].
pub(crate) type Callback<Time, Value> = Box<dyn FnOnce(&mut Environment<Time, Value>) -> crate::Result>;

/// Units of kernel work held in the callback queue.
pub(crate) enum Action<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Run the first step of a process.
    Start(usize),
    /// Trigger a timeout at its deadline.
    Timeout { event: EventId, value: Option<Value> },
    /// Run the subscribers of a triggered event and mark it processed.
    Process(EventId),
    /// Redirect the next resumption of a suspended process.
    Interrupt(usize),
    /// Hand an already processed event's outcome to a late subscriber.
    Notify { event: EventId, subscriber: Subscriber<Time, Value> },
    /// Run a client callback registered through [`Environment::schedule_callback()`].
    Call(Callback<Time, Value>),
}

impl<Time, Value> Debug for Action<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Start(process) => write!(f, "Start(process #{})", process),
            Self::Timeout { event, value } => write!(f, "Timeout({}, {:?})", event, value),
            Self::Process(event) => write!(f, "Process({})", event),
            Self::Interrupt(process) => write!(f, "Interrupt(process #{})", process),
            Self::Notify { event, subscriber } => write!(f, "Notify({}, {:?})", event, subscriber),
            Self::Call(_) => write!(f, "Call"),
        }
    }
}

/// Owns the virtual clock, the callback queue and every event, process and resource of one simulation run.
///
/// The environment is an explicit context object: process logic receives exclusive access to it at each resumption,
/// and nothing about the simulation lives in global state. Events, processes and resources are kept in arenas and
/// addressed by the small [`Copy`] handles ([`EventId`], [`ProcessHandle`], [`Resource`]) returned from construction,
/// which sidesteps ownership cycles between events and the processes waiting on them.
///
/// The expected workflow is:
///
/// 1. Create an environment with [`new()`], supplying the start time.
/// 2. Register at least one process with [`process()`], and any resources with [`resource()`].
/// 3. Call [`run()`] or [`run_until()`]. Handle any error it might return.
/// 4. Inspect the clock, event outcomes or client-side state to finish processing the results.
///
/// An environment is good for one replication; to start over, construct a fresh one.
///
/// Arena slots are never reclaimed. Every event, timeout, process and resource created during a run stays allocated
/// until the environment is dropped, so that its outcome remains queryable through its handle. Memory therefore grows
/// with the number of events created, not with the number pending. Long-running models should split their horizon
/// into several environments (one per replication or batch) rather than run a single unbounded one.
///
/// [`new()`]: Environment::new
/// [`process()`]: Environment::process
/// [`resource()`]: Environment::resource
/// [`run()`]: Environment::run
/// [`run_until()`]: Environment::run_until
/// [`Resource`]: crate::Resource
pub struct Environment<Time, Value = ()>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    queue: CallbackQueue<Time, Value>,
    pub(crate) events: Vec<EventSlot<Time, Value>>,
    pub(crate) processes: Vec<ProcessSlot<Time, Value>>,
    pub(crate) resources: Vec<ResourceSlot>,
    /// The process whose logic is currently executing, if any.
    pub(crate) active_process: Option<ProcessHandle>,
}

impl<Time, Value> Environment<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Initialize an environment with an empty callback queue and the clock set to the provided start time.
    pub fn new(start_time: Time) -> Self {
        Self {
            queue: CallbackQueue::new(start_time),
            events: Vec::new(),
            processes: Vec::new(),
            resources: Vec::new(),
            active_process: None,
        }
    }

    /// Get a shared reference to the current simulation time.
    pub fn now(&self) -> &Time {
        self.queue.current_time()
    }

    /// Get the time of the next scheduled callback, or `None` if nothing is scheduled.
    pub fn peek(&self) -> Option<&Time> {
        self.queue.peek_time()
    }

    /// Number of callbacks waiting in the queue.
    pub fn scheduled(&self) -> usize {
        self.queue.len()
    }

    /// The process whose logic is executing right now. Outside of a process step this is `None`.
    pub fn active_process(&self) -> Option<ProcessHandle> {
        self.active_process
    }

    /// Execute exactly one queued callback, advancing the clock to its scheduled time first.
    ///
    /// Returns `Ok(false)` without doing anything if the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnhandledFailure`] if the callback processed a failed event that nothing observes, and
    /// forwards any error returned by a client callback registered through [`add_callback()`] or
    /// [`schedule_callback()`].
    ///
    /// [`Error::UnhandledFailure`]: crate::Error::UnhandledFailure
    /// [`add_callback()`]: Environment::add_callback
    /// [`schedule_callback()`]: Environment::schedule_callback
    pub fn step(&mut self) -> crate::Result<bool> {
        match self.queue.next() {
            Some(action) => {
                log::trace!("[{:?}] dispatching {:?}", self.now(), action);
                self.dispatch(action)?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Execute callbacks from the queue, one at a time, until it empties out.
    ///
    /// Follows this loop:
    ///
    /// 1. Attempt to pop the next callback from the queue. If there isn't one, return `Ok(())`.
    /// 2. Advance the clock to its scheduled time and execute it.
    ///     1. If an error is returned, forward it as-is to the caller.
    ///     2. Otherwise, go back to step 1.
    ///
    /// A simulation whose processes loop forever never empties its queue; use [`run_until()`] for those.
    ///
    /// # Errors
    ///
    /// See [`step()`].
    ///
    /// [`run_until()`]: Environment::run_until
    /// [`step()`]: Environment::step
    pub fn run(&mut self) -> crate::Result {
        loop {
            if !self.step()? {
                return Ok(());
            }
        }
    }

    /// Execute callbacks whose scheduled time is strictly less than `until`.
    ///
    /// Callbacks scheduled at or after `until` remain queued, and the clock is never advanced to them, so after this
    /// method returns the clock shows the time of the last callback executed. A later call may resume the simulation
    /// from there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackInTime`] if `until` is earlier than the current time, otherwise see [`step()`].
    ///
    /// [`Error::BackInTime`]: crate::Error::BackInTime
    /// [`step()`]: Environment::step
    pub fn run_until(&mut self, until: Time) -> crate::Result {
        if until < *self.now() {
            return Err(crate::Error::BackInTime);
        }

        loop {
            match self.queue.peek_time() {
                Some(time) if *time < until => {},
                _ => return Ok(()),
            }
            self.step()?;
        }
    }

    /// Schedule a client callback to run after `delay` with the given priority. Callbacks scheduled for the same time
    /// and priority run in the order they were scheduled.
    ///
    /// # Errors
    ///
    /// If `delay` is negative, i.e. `now + delay < now`, returns an [`Error::BackInTime`] with no modifications to the
    /// queue. If `now + delay` does not fit the clock type, returns an [`Error::TimeOverflow`] instead.
    ///
    /// [`Error::BackInTime`]: crate::Error::BackInTime
    /// [`Error::TimeOverflow`]: crate::Error::TimeOverflow
    pub fn schedule_callback<F>(&mut self, delay: Time, priority: Priority, callback: F) -> crate::Result
    where
        F: FnOnce(&mut Environment<Time, Value>) -> crate::Result + 'static,
    {
        self.queue
            .schedule_with_delay(Action::Call(Box::new(callback)), delay, priority)
    }

    pub(crate) fn schedule_now(&mut self, action: Action<Time, Value>, priority: Priority) {
        self.queue.schedule_now(action, priority);
    }

    pub(crate) fn schedule_with_delay(
        &mut self,
        action: Action<Time, Value>,
        delay: Time,
        priority: Priority,
    ) -> crate::Result {
        self.queue.schedule_with_delay(action, delay, priority)
    }

    fn dispatch(&mut self, action: Action<Time, Value>) -> crate::Result {
        match action {
            Action::Start(process) => self.resume_process(process, None),
            Action::Timeout { event, value } => self.fix_outcome(event, Ok(value)),
            Action::Process(event) => self.process_event(event),
            Action::Interrupt(process) => self.deliver_interrupt(process),
            Action::Notify { event, subscriber } => {
                let outcome = self.processed_outcome(event)?;
                self.notify(event, subscriber, outcome)
            },
            Action::Call(callback) => callback(self),
        }
    }
}

impl<Time, Value> Default for Environment<Time, Value>
where
    Time: SimTime + Default,
    Value: Clone + Debug + 'static,
{
    fn default() -> Self {
        Self::new(Time::default())
    }
}

impl<Time, Value> Debug for Environment<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("queue", &self.queue)
            .field("events", &self.events)
            .field("processes", &self.processes)
            .field("resources", &self.resources)
            .field("active_process", &self.active_process)
            .finish()
    }
}

impl<Time, Value> std::fmt::Display for Environment<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Environment at time {:?}", self.now())
    }
}
