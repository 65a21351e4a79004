use crate::{Environment, EventId, Failure, Outcome, SimTime};
use std::fmt::Debug;

/// What a process does after a resumption: suspend on another event, or finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<Value> {
    /// Suspend until the given event is processed. A [`ProcessHandle`] may be passed through [`Transition::wait()`]
    /// to wait for another process to finish.
    ///
    /// [`ProcessHandle`]: crate::ProcessHandle
    Wait(EventId),
    /// Finish normally, triggering the process's own event with the optional return value.
    Finish(Option<Value>),
}

impl<Value> Transition<Value> {
    /// Suspend on anything that converts into an [`EventId`].
    pub fn wait(event: impl Into<EventId>) -> Self {
        Transition::Wait(event.into())
    }

    /// Finish without a return value.
    pub fn done() -> Self {
        Transition::Finish(None)
    }
}

/// The result of a single process step. An `Err` fails the process with the given [`Failure`].
pub type Resumption<Value> = std::result::Result<Transition<Value>, Failure<Value>>;

/// Sequential logic that the kernel drives one suspension point at a time.
///
/// A process is written as an explicit state machine: the kernel owns the loop, and each call to [`resume()`] runs
/// the logic from its previous suspension point to the next one. The environment passed in grants exclusive access
/// to the simulation for the duration of the step, so the logic may create timeouts, trigger events, spawn further
/// processes, request resources or interrupt other processes before deciding how to continue.
///
/// The `outcome` argument is `None` on the very first step. On every later step it carries the outcome of the event
/// named by the previous [`Transition::Wait`], or an `Err(`[`Failure::Interrupted`]`)` if another process interrupted
/// the wait. The logic may handle a failure and keep going, or propagate it (the `?` operator works on both the
/// outcome and on kernel errors) to fail the process.
///
/// An implementation is provided for closures with a matching signature; [`Environment::process_fn()`] helps the
/// compiler infer their argument types.
///
/// [`resume()`]: Process::resume
/// [`Environment::process_fn()`]: crate::Environment::process_fn
pub trait Process<Time, Value = ()>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Run the logic up to its next suspension point.
    ///
    /// # Errors
    ///
    /// Returning `Err` fails the process: its own event triggers with the failure, which then propagates to anything
    /// waiting on the process, or aborts the run if nothing is.
    fn resume(&mut self, env: &mut Environment<Time, Value>, outcome: Option<Outcome<Value>>) -> Resumption<Value>;
}

impl<Time, Value, Logic> Process<Time, Value> for Logic
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
    Logic: FnMut(&mut Environment<Time, Value>, Option<Outcome<Value>>) -> Resumption<Value>,
{
    fn resume(&mut self, env: &mut Environment<Time, Value>, outcome: Option<Outcome<Value>>) -> Resumption<Value> {
        self(env, outcome)
    }
}
