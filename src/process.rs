pub(crate) mod process_traits;

use crate::environment::Action;
use crate::event::{EventKind, Subscriber};
use crate::{Environment, Error, EventId, Failure, Outcome, Priority, SimTime};
use process_traits::{Process, Resumption, Transition};

use std::fmt::{Debug, Formatter};

/// Where a process is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Registered, first step scheduled but not yet run.
    NotStarted,
    /// Its logic is executing right now.
    Running,
    /// Waiting for the given event.
    Suspended(EventId),
    /// Was waiting for the given event; an interrupt is scheduled for delivery.
    Interrupted(EventId),
    /// Logic returned [`Transition::Finish`].
    Finished,
    /// Logic returned a failure.
    Failed,
}

/// Handle to a process owned by an [`Environment`].
///
/// A process is itself an event: its completion. The handle converts into that event's [`EventId`], so it can be
/// waited on, passed to [`Environment::any_of()`], or queried for the process's return value, wherever an event is
/// expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    index: usize,
    event: EventId,
}

impl ProcessHandle {
    /// The event that triggers when this process finishes or fails.
    pub fn event(self) -> EventId {
        self.event
    }

    /// Redirect the next resumption of this process so that it observes `Err(`[`Failure::Interrupted`]`(cause))`
    /// instead of the outcome of the event it is waiting on.
    ///
    /// Delivery is scheduled at the current time with [`Priority::Urgent`], ahead of any ordinary event processing at
    /// the same instant. At delivery the process stops waiting on its original event; that event still triggers and
    /// runs its other subscribers later, but no longer resumes this process.
    ///
    /// # Errors
    ///
    /// * [`Error::NotInterruptible`] if the process has no suspension point to redirect: it has not started, is the
    ///   process currently running (self-interrupt), or has already finished or failed.
    /// * [`Error::InterruptPending`] if an earlier interrupt has not been delivered yet. A process can only be
    ///   interrupted again once it is suspended again.
    /// * [`Error::InvalidHandle`] if the handle does not belong to this environment.
    pub fn interrupt<Time, Value>(self, env: &mut Environment<Time, Value>, cause: Option<Value>) -> crate::Result
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        let slot = env.processes.get_mut(self.index).ok_or(Error::InvalidHandle)?;
        match slot.state {
            ProcessState::Suspended(target) => {
                slot.state = ProcessState::Interrupted(target);
                slot.interrupt_cause = cause;
                env.schedule_now(Action::Interrupt(self.index), Priority::Urgent);
                log::debug!("[{:?}] interrupt scheduled for {} waiting on {}", env.now(), self, target);
                Ok(())
            },
            ProcessState::Interrupted(_) => Err(Error::InterruptPending),
            state => Err(Error::NotInterruptible(state)),
        }
    }
}

impl From<ProcessHandle> for EventId {
    fn from(handle: ProcessHandle) -> Self {
        handle.event
    }
}

impl std::fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "process #{}", self.index)
    }
}

pub(crate) struct ProcessSlot<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Taken out while the logic runs, and dropped for good once the process ends.
    logic: Option<Box<dyn Process<Time, Value>>>,
    event: EventId,
    pub state: ProcessState,
    interrupt_cause: Option<Value>,
}

impl<Time, Value> Debug for ProcessSlot<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("ProcessSlot")
            .field("event", &self.event)
            .field("state", &self.state)
            .field("interrupt_cause", &self.interrupt_cause)
            .finish()
    }
}

impl<Time, Value> Environment<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Register a process. Its first step is scheduled at the current time with [`Priority::Urgent`]; nothing runs
    /// synchronously.
    pub fn process<P>(&mut self, logic: P) -> ProcessHandle
    where
        P: Process<Time, Value> + 'static,
    {
        let index = self.processes.len();
        let event = self.new_event(EventKind::Process);
        self.processes.push(ProcessSlot {
            logic: Some(Box::new(logic)),
            event,
            state: ProcessState::NotStarted,
            interrupt_cause: None,
        });
        self.schedule_now(Action::Start(index), Priority::Urgent);

        let handle = ProcessHandle { index, event };
        log::debug!("[{:?}] registered {}", self.now(), handle);
        handle
    }

    /// Register a closure as a process. Equivalent to [`process()`], with a signature that lets the compiler infer
    /// the closure's argument types.
    ///
    /// [`process()`]: Environment::process
    pub fn process_fn<F>(&mut self, logic: F) -> ProcessHandle
    where
        F: FnMut(&mut Environment<Time, Value>, Option<Outcome<Value>>) -> Resumption<Value> + 'static,
    {
        self.process(logic)
    }

    /// Current lifecycle state of a process, or `None` for a foreign handle.
    pub fn process_state(&self, process: ProcessHandle) -> Option<ProcessState> {
        self.processes.get(process.index).map(|slot| slot.state)
    }

    /// Drive one step of a process's logic and act on the transition it returns.
    pub(crate) fn resume_process(&mut self, index: usize, outcome: Option<Outcome<Value>>) -> crate::Result {
        let slot = self.processes.get_mut(index).ok_or(Error::InvalidHandle)?;
        let mut logic = match slot.logic.take() {
            Some(logic) => logic,
            None => return Ok(()),
        };
        slot.state = ProcessState::Running;
        let handle = ProcessHandle { index, event: slot.event };

        let previous = self.active_process.replace(handle);
        let resumption = logic.resume(self, outcome);
        self.active_process = previous;

        let resumption = match resumption {
            // a process cannot await its own completion
            Ok(Transition::Wait(target)) if target.0 >= self.events.len() || target == handle.event => {
                Err(Failure::from(Error::InvalidHandle))
            },
            other => other,
        };

        let slot = self.processes.get_mut(index).ok_or(Error::InvalidHandle)?;
        match resumption {
            Ok(Transition::Wait(target)) => {
                slot.logic = Some(logic);
                slot.state = ProcessState::Suspended(target);
                self.subscribe(target, Subscriber::Process(index))
            },
            Ok(Transition::Finish(value)) => {
                slot.state = ProcessState::Finished;
                log::debug!("[{:?}] {} finished", self.now(), handle);
                self.fix_outcome(handle.event, Ok(value))
            },
            Err(failure) => {
                slot.state = ProcessState::Failed;
                log::debug!("[{:?}] {} failed: {}", self.now(), handle, failure);
                self.fix_outcome(handle.event, Err(failure))
            },
        }
    }

    /// Revoke the interrupted process's subscription and resume it with the interrupt.
    pub(crate) fn deliver_interrupt(&mut self, index: usize) -> crate::Result {
        let slot = self.processes.get_mut(index).ok_or(Error::InvalidHandle)?;
        let target = match slot.state {
            ProcessState::Interrupted(target) => target,
            _ => return Ok(()),
        };
        let cause = slot.interrupt_cause.take();

        if let Some(event) = self.events.get_mut(target.0) {
            let position = event
                .callbacks
                .iter()
                .position(|subscriber| matches!(subscriber, Subscriber::Process(waiting) if *waiting == index));
            if let Some(position) = position {
                event.callbacks.remove(position);
            }
        }

        log::debug!("[{:?}] delivering interrupt to process #{}", self.now(), index);
        self.resume_process(index, Some(Err(Failure::Interrupted(cause))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventState;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(i64, String)>>>;

    /// Waits on a timeout of `duration`, records what it observed, then optionally waits `follow_up` more.
    struct Sleeper {
        log: Log,
        duration: i64,
        follow_up: Option<i64>,
        steps: u32,
    }

    impl Sleeper {
        fn new(log: &Log, duration: i64, follow_up: Option<i64>) -> Self {
            Self {
                log: Rc::clone(log),
                duration,
                follow_up,
                steps: 0,
            }
        }
    }

    impl Process<i64, u32> for Sleeper {
        fn resume(&mut self, env: &mut Environment<i64, u32>, outcome: Option<Outcome<u32>>) -> Resumption<u32> {
            self.steps += 1;
            let observed = match &outcome {
                None => "start".to_string(),
                Some(Ok(_)) => "timeout".to_string(),
                Some(Err(failure)) => failure.to_string(),
            };
            self.log.borrow_mut().push((*env.now(), observed));

            match (self.steps, outcome) {
                (1, _) => Ok(Transition::wait(env.timeout(self.duration)?)),
                (2, Some(Err(failure))) if !failure.is_interrupt() => Err(failure),
                (2, _) => match self.follow_up {
                    Some(delay) => Ok(Transition::wait(env.timeout(delay)?)),
                    None => Ok(Transition::Finish(Some(self.steps))),
                },
                _ => Ok(Transition::Finish(Some(self.steps))),
            }
        }
    }

    fn interrupter(target: ProcessHandle, at: i64, cause: u32) -> impl Process<i64, u32> {
        let mut started = false;
        move |env: &mut Environment<i64, u32>, _outcome: Option<Outcome<u32>>| -> Resumption<u32> {
            if started {
                target.interrupt(env, Some(cause))?;
                return Ok(Transition::done());
            }
            started = true;
            Ok(Transition::wait(env.timeout(at)?))
        }
    }

    #[test]
    fn process_start_is_deferred() {
        let log = Log::default();
        let mut env: Environment<i64, u32> = Environment::new(0);
        let process = env.process(Sleeper::new(&log, 2, None));

        assert!(log.borrow().is_empty(), "nothing should run at registration");
        assert_eq!(Some(ProcessState::NotStarted), env.process_state(process));
        env.run().unwrap();

        assert_eq!(Some(ProcessState::Finished), env.process_state(process));
        assert_eq!(Some(&2), env.value(process), "return value should be the process event's value");
        assert_eq!(2, *env.now());
    }

    #[test]
    fn waiter_observes_child_completion() {
        let mut env: Environment<i64, u32> = Environment::new(0);
        let observed = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&observed);
        env.process_fn(move |env, outcome| match outcome {
            None => {
                let child = env.process_fn(|env, outcome| match outcome {
                    None => Ok(Transition::wait(env.timeout_with(4, Some(11))?)),
                    Some(outcome) => Ok(Transition::Finish(outcome?)),
                });
                Ok(Transition::wait(child))
            },
            Some(outcome) => {
                *sink.borrow_mut() = Some((*env.now(), outcome?));
                Ok(Transition::done())
            },
        });
        env.run().unwrap();

        assert_eq!(Some((4, Some(11))), *observed.borrow());
    }

    #[test]
    fn failure_propagates_to_waiter_and_then_aborts() {
        let mut env: Environment<i64, u32> = Environment::new(0);
        let parent = env.process_fn(|env, outcome| match outcome {
            None => {
                let child = env.process_fn(|_, _| Err(Failure::from(Error::NotGranted)));
                Ok(Transition::wait(child))
            },
            Some(outcome) => outcome.map(Transition::Finish),
        });

        let error = env.run().unwrap_err();
        assert!(matches!(error, Error::UnhandledFailure(_)));
        assert_eq!("unhandled failure: request does not hold a resource slot", error.to_string());
        assert_eq!(Some(ProcessState::Failed), env.process_state(parent));
    }

    #[test]
    fn interrupt_preempts_wait_and_process_continues() {
        let log = Log::default();
        let mut env: Environment<i64, u32> = Environment::new(0);
        let sleeper = env.process(Sleeper::new(&log, 5, Some(2)));
        env.process(interrupter(sleeper, 3, 9));
        env.run().unwrap();

        assert_eq!(
            vec![
                (0, "start".to_string()),
                (3, "process interrupted: 9".to_string()),
                (5, "timeout".to_string()),
            ],
            *log.borrow()
        );
        assert_eq!(Some(ProcessState::Finished), env.process_state(sleeper));
        assert_eq!(5, *env.now(), "abandoned timeout still fires at 5");
    }

    #[test]
    fn interrupt_wins_against_same_instant_trigger() {
        let log = Log::default();
        let mut env: Environment<i64, u32> = Environment::new(0);
        let sleeper = env.process(Sleeper::new(&log, 3, None));
        env.step().unwrap();
        // runs at 3 after the timeout has triggered but before it is processed
        env.schedule_callback(3, Priority::Normal, move |env| sleeper.interrupt(env, Some(1)))
            .unwrap();
        env.run().unwrap();

        assert_eq!((3, "process interrupted: 1".to_string()), log.borrow()[1]);
        assert_eq!(2, log.borrow().len(), "revoked subscription must not resume the process again");
    }

    #[test]
    fn unhandled_interrupt_fails_the_process() {
        let mut env: Environment<i64, u32> = Environment::new(0);
        let victim = env.process_fn(|env, outcome| match outcome {
            None => Ok(Transition::wait(env.timeout(10)?)),
            Some(outcome) => outcome.map(Transition::Finish),
        });
        env.defuse(victim).unwrap();
        env.process(interrupter(victim, 1, 4));
        env.run().unwrap();

        assert_eq!(Some(ProcessState::Failed), env.process_state(victim));
        assert!(matches!(env.outcome(victim), Some(Err(Failure::Interrupted(Some(4))))));
    }

    #[test]
    fn interrupt_rejections() {
        let log = Log::default();
        let mut env: Environment<i64, u32> = Environment::new(0);
        let sleeper = env.process(Sleeper::new(&log, 5, None));
        assert_eq!(
            Err(Error::NotInterruptible(ProcessState::NotStarted)),
            sleeper.interrupt(&mut env, None)
        );

        env.step().unwrap();
        assert!(matches!(env.process_state(sleeper), Some(ProcessState::Suspended(_))));
        env.defuse(sleeper).unwrap();
        sleeper.interrupt(&mut env, Some(1)).unwrap();
        assert_eq!(Err(Error::InterruptPending), sleeper.interrupt(&mut env, Some(2)));

        env.run().unwrap();
        assert_eq!(
            Err(Error::NotInterruptible(ProcessState::Finished)),
            sleeper.interrupt(&mut env, None)
        );
        assert_eq!((0, "process interrupted: 1".to_string()), log.borrow()[1], "first interrupt wins");
    }

    #[test]
    fn self_interrupt_is_rejected() {
        let mut env: Environment<i64, u32> = Environment::new(0);
        let rejected = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&rejected);
        env.process_fn(move |env, _| {
            if let Some(me) = env.active_process() {
                *sink.borrow_mut() = Some(me.interrupt(env, None));
            }
            Ok(Transition::done())
        });
        env.run().unwrap();

        assert_eq!(Some(Err(Error::NotInterruptible(ProcessState::Running))), *rejected.borrow());
        assert!(env.active_process().is_none());
    }

    #[test]
    fn waiting_on_processed_event_resumes_later() {
        let mut env: Environment<i64, u32> = Environment::new(0);
        let done = env.timeout_with(1, Some(3)).unwrap();
        env.run().unwrap();
        assert_eq!(Some(EventState::Processed), env.state(done));

        let process = env.process_fn(move |_, outcome| match outcome {
            None => Ok(Transition::wait(done)),
            Some(outcome) => Ok(Transition::Finish(outcome?)),
        });
        env.run().unwrap();
        assert_eq!(Some(&3), env.value(process));
    }

    #[test]
    fn waiting_on_foreign_handle_fails_the_process() {
        let mut env: Environment<i64, u32> = Environment::new(0);
        let process = env.process_fn(|_, _| Ok(Transition::Wait(EventId(99))));
        env.defuse(process).unwrap();
        env.run().unwrap();

        assert_eq!(Some(ProcessState::Failed), env.process_state(process));
    }

    #[test]
    fn waiting_on_own_completion_fails_the_process() {
        let mut env: Environment<i64, u32> = Environment::new(0);
        let process = env.process_fn(|env, _| match env.active_process() {
            Some(me) => Ok(Transition::wait(me)),
            None => Ok(Transition::done()),
        });
        env.defuse(process).unwrap();
        env.run().unwrap();

        assert_eq!(Some(ProcessState::Failed), env.process_state(process), "self-wait should fail, not hang");
        assert!(
            matches!(env.outcome(process), Some(Err(Failure::Error(_)))),
            "self-wait should fail with an error outcome"
        );
    }
}
