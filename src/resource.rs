mod scoped;

pub use scoped::Scoped;

use crate::event::EventKind;
use crate::{Environment, Error, EventId, ProcessHandle, SimTime};

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};

/// Handle to a shared resource with a fixed number of slots, owned by an [`Environment`].
///
/// Users ask for a slot with [`request()`], which returns a kernel-owned event. The event triggers as soon as a slot
/// is free; while every slot is taken, requests wait in a strict FIFO queue. A granted request holds its slot until it
/// is handed back with [`release()`], at which point the head of the queue is granted at the same simulated instant.
///
/// Forgetting to release leaks the slot for the rest of the run. Process logic that holds a slot across suspension
/// points should prefer [`scoped()`], which releases on every exit path including interrupts.
///
/// [`request()`]: Resource::request
/// [`release()`]: Resource::release
/// [`scoped()`]: Resource::scoped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resource {
    index: usize,
}

impl Resource {
    /// Ask for a slot. The returned event triggers, with no value, once the slot is granted.
    ///
    /// If a slot is free the request is granted immediately, i.e. its event is triggered before this method returns
    /// and processed later at the current time. Otherwise it joins the back of the queue. When called from process
    /// logic, the running process is recorded as the request's [`owner()`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the resource does not belong to this environment.
    ///
    /// [`owner()`]: Resource::owner
    pub fn request<Time, Value>(self, env: &mut Environment<Time, Value>) -> crate::Result<EventId>
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        env.resources.get(self.index).ok_or(Error::InvalidHandle)?;
        let owner = env.active_process;
        let request = env.new_event(EventKind::Request { resource: self, owner });

        let slot = env.resources.get_mut(self.index).ok_or(Error::InvalidHandle)?;
        if slot.users.len() < slot.capacity {
            slot.users.push(request);
            log::debug!("[{:?}] {} granted {} immediately", env.now(), self, request);
            env.fix_outcome(request, Ok(None))?;
        } else {
            slot.queue.push_back(request);
            let ahead = slot.queue.len() - 1;
            log::debug!("[{:?}] {} queued {} behind {} others", env.now(), self, request, ahead);
        }
        Ok(request)
    }

    /// Hand back the slot held by a granted request, then grant queued requests in FIFO order while slots are free.
    ///
    /// # Errors
    ///
    /// * [`Error::NotGranted`] if the request is not currently holding a slot of this resource: it is still queued,
    ///   was already released, or belongs to another resource.
    /// * [`Error::InvalidHandle`] if the resource does not belong to this environment.
    pub fn release<Time, Value>(self, env: &mut Environment<Time, Value>, request: EventId) -> crate::Result
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        let slot = env.resources.get_mut(self.index).ok_or(Error::InvalidHandle)?;
        let position = slot.users.iter().position(|user| *user == request).ok_or(Error::NotGranted)?;
        slot.users.remove(position);

        let mut granted = Vec::new();
        while slot.users.len() < slot.capacity {
            match slot.queue.pop_front() {
                Some(next) => {
                    slot.users.push(next);
                    granted.push(next);
                },
                None => break,
            }
        }

        log::debug!("[{:?}] {} released by {}", env.now(), self, request);
        for next in granted {
            log::debug!("[{:?}] {} granted {} from the queue", env.now(), self, next);
            env.fix_outcome(next, Ok(None))?;
        }
        Ok(())
    }

    /// Withdraw a request that is still waiting in the queue. Its event stays pending forever.
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyTriggered`] if the request has already been granted; use [`release()`] instead.
    /// * [`Error::InvalidHandle`] if the request is neither queued on nor holding a slot of this resource.
    ///
    /// [`release()`]: Resource::release
    pub fn cancel<Time, Value>(self, env: &mut Environment<Time, Value>, request: EventId) -> crate::Result
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        let slot = env.resources.get_mut(self.index).ok_or(Error::InvalidHandle)?;
        if let Some(position) = slot.queue.iter().position(|queued| *queued == request) {
            slot.queue.remove(position);
            log::debug!("[{:?}] {} withdrew {}", env.now(), self, request);
            Ok(())
        } else if slot.users.contains(&request) {
            Err(Error::AlreadyTriggered)
        } else {
            Err(Error::InvalidHandle)
        }
    }

    /// Wrap `body` in a process that acquires a slot of this resource before running it and releases the slot on
    /// every exit path. See [`Scoped`].
    pub fn scoped<P>(self, body: P) -> Scoped<P> {
        Scoped::new(self, body)
    }

    /// Total number of slots, or `None` for a foreign handle.
    pub fn capacity<Time, Value>(self, env: &Environment<Time, Value>) -> Option<usize>
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        env.resources.get(self.index).map(|slot| slot.capacity)
    }

    /// Number of slots currently held by granted requests.
    pub fn count<Time, Value>(self, env: &Environment<Time, Value>) -> Option<usize>
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        env.resources.get(self.index).map(|slot| slot.users.len())
    }

    /// Number of requests waiting for a slot.
    pub fn queue_len<Time, Value>(self, env: &Environment<Time, Value>) -> Option<usize>
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        env.resources.get(self.index).map(|slot| slot.queue.len())
    }

    /// The process that made a request of this resource, if it was made from process logic.
    pub fn owner<Time, Value>(self, env: &Environment<Time, Value>, request: EventId) -> Option<ProcessHandle>
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        match env.events.get(request.0)?.kind {
            EventKind::Request { resource, owner } if resource == self => owner,
            _ => None,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "resource #{}", self.index)
    }
}

pub(crate) struct ResourceSlot {
    capacity: usize,
    /// Granted requests, in grant order.
    users: Vec<EventId>,
    queue: VecDeque<EventId>,
}

impl Debug for ResourceSlot {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("ResourceSlot")
            .field("capacity", &self.capacity)
            .field("users", &self.users)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl<Time, Value> Environment<Time, Value>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
{
    /// Create a resource with `capacity` slots, all free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero.
    pub fn resource(&mut self, capacity: usize) -> crate::Result<Resource> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }

        let resource = Resource {
            index: self.resources.len(),
        };
        self.resources.push(ResourceSlot {
            capacity,
            users: Vec::new(),
            queue: VecDeque::new(),
        });
        log::debug!("[{:?}] created {} with {} slots", self.now(), resource, capacity);
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventState, Failure, Outcome, ProcessState, Resumption, Transition};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(i64, &'static str)>>>;

    /// Body that records when it gets the slot, then holds it for `duration`.
    fn hold(log: &Log, label: &'static str, duration: i64) -> impl crate::Process<i64, u32> {
        let log = Rc::clone(log);
        move |env: &mut Environment<i64, u32>, outcome: Option<Outcome<u32>>| -> Resumption<u32> {
            match outcome {
                None => {
                    log.borrow_mut().push((*env.now(), label));
                    Ok(Transition::wait(env.timeout(duration)?))
                },
                Some(outcome) => Ok(Transition::Finish(outcome?)),
            }
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut env: Environment<i64> = Environment::new(0);
        assert_eq!(Err(Error::ZeroCapacity), env.resource(0));
        assert_eq!(Err(Error::InvalidHandle), Resource { index: 0 }.request(&mut env));
        assert_eq!(None, Resource { index: 0 }.capacity(&env));
    }

    #[test]
    fn requests_are_granted_in_fifo_order() {
        let log = Log::default();
        let mut env: Environment<i64, u32> = Environment::new(0);
        let resource = env.resource(2).unwrap();
        for label in ["a", "b", "c", "d"] {
            env.process(resource.scoped(hold(&log, label, 5)));
        }

        env.run_until(1).unwrap();
        assert_eq!(Some(2), resource.count(&env));
        assert_eq!(Some(2), resource.queue_len(&env));

        env.run().unwrap();
        assert_eq!(vec![(0, "a"), (0, "b"), (5, "c"), (5, "d")], *log.borrow());
        assert_eq!(Some(0), resource.count(&env), "every slot should be released");
        assert_eq!(10, *env.now());
    }

    #[test]
    fn release_requires_a_granted_request() {
        let mut env: Environment<i64> = Environment::new(0);
        let resource = env.resource(1).unwrap();
        let first = resource.request(&mut env).unwrap();
        let second = resource.request(&mut env).unwrap();
        assert_eq!(Some(EventState::Triggered), env.state(first));
        assert_eq!(Some(EventState::Pending), env.state(second));

        assert_eq!(Err(Error::NotGranted), resource.release(&mut env, second));
        resource.release(&mut env, first).unwrap();
        assert_eq!(Err(Error::NotGranted), resource.release(&mut env, first), "double release");
        assert_eq!(Some(EventState::Triggered), env.state(second), "queue head granted on release");
        assert_eq!(Err(Error::KernelOwned), env.succeed(second, None));
        assert_eq!(None, resource.owner(&env, second), "requested outside of any process");
    }

    #[test]
    fn cancel_withdraws_only_queued_requests() {
        let mut env: Environment<i64> = Environment::new(0);
        let resource = env.resource(1).unwrap();
        let held = resource.request(&mut env).unwrap();
        let skipped = resource.request(&mut env).unwrap();
        let next = resource.request(&mut env).unwrap();

        resource.cancel(&mut env, skipped).unwrap();
        assert_eq!(Some(1), resource.queue_len(&env));
        assert_eq!(Err(Error::AlreadyTriggered), resource.cancel(&mut env, held));
        assert_eq!(Err(Error::InvalidHandle), resource.cancel(&mut env, skipped));

        resource.release(&mut env, held).unwrap();
        env.run().unwrap();
        assert_eq!(Some(EventState::Processed), env.state(next));
        assert_eq!(Some(EventState::Pending), env.state(skipped));
    }

    #[test]
    fn requests_record_the_requesting_process() {
        let mut env: Environment<i64> = Environment::new(0);
        let resource = env.resource(1).unwrap();
        let request = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&request);
        let process = env.process_fn(move |env, outcome| match outcome {
            None => {
                let granted = resource.request(env)?;
                *sink.borrow_mut() = Some(granted);
                Ok(Transition::wait(granted))
            },
            Some(_) => Ok(Transition::done()),
        });
        env.run().unwrap();

        let request = request.borrow().unwrap();
        assert_eq!(Some(process), resource.owner(&env, request));
        assert_eq!(Some(1), resource.count(&env), "plain requests are not released automatically");
    }

    #[test]
    fn scoped_releases_when_body_fails() {
        let log = Log::default();
        let mut env: Environment<i64, u32> = Environment::new(0);
        let resource = env.resource(1).unwrap();
        let failing = env.process(resource.scoped(
            |env: &mut Environment<i64, u32>, outcome: Option<Outcome<u32>>| -> Resumption<u32> {
                match outcome {
                    None => Ok(Transition::wait(env.timeout(2)?)),
                    Some(_) => Err(Failure::from(Error::NotGranted)),
                }
            },
        ));
        env.defuse(failing).unwrap();
        env.process(resource.scoped(hold(&log, "next", 1)));
        env.run().unwrap();

        assert_eq!(Some(ProcessState::Failed), env.process_state(failing));
        assert_eq!(vec![(2, "next")], *log.borrow());
        assert_eq!(Some(0), resource.count(&env));
    }

    #[test]
    fn scoped_withdraws_when_interrupted_in_queue() {
        let log = Log::default();
        let mut env: Environment<i64, u32> = Environment::new(0);
        let resource = env.resource(1).unwrap();
        env.process(resource.scoped(hold(&log, "holder", 10)));
        let waiter = env.process(resource.scoped(hold(&log, "waiter", 1)));
        env.defuse(waiter).unwrap();
        env.schedule_callback(3, crate::Priority::Normal, move |env| waiter.interrupt(env, Some(0)))
            .unwrap();

        env.run_until(4).unwrap();
        assert_eq!(Some(ProcessState::Failed), env.process_state(waiter));
        assert_eq!(Some(0), resource.queue_len(&env), "interrupted request should leave the queue");

        env.run().unwrap();
        assert_eq!(vec![(0, "holder")], *log.borrow());
        assert_eq!(Some(0), resource.count(&env));
    }

    #[test]
    fn scoped_releases_when_interrupted_while_holding() {
        let log = Log::default();
        let mut env: Environment<i64, u32> = Environment::new(0);
        let resource = env.resource(1).unwrap();
        let holder = env.process(resource.scoped(hold(&log, "holder", 10)));
        env.defuse(holder).unwrap();
        env.process(resource.scoped(hold(&log, "waiter", 1)));
        env.schedule_callback(3, crate::Priority::Normal, move |env| holder.interrupt(env, Some(0)))
            .unwrap();
        env.run().unwrap();

        assert!(matches!(env.outcome(holder), Some(Err(Failure::Interrupted(Some(0))))));
        assert_eq!(vec![(0, "holder"), (3, "waiter")], *log.borrow());
        assert_eq!(Some(0), resource.count(&env));
        assert_eq!(10, *env.now(), "abandoned timeout still fires");
    }
}
