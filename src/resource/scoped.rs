use crate::{Environment, EventId, EventState, Outcome, Process, Resource, Resumption, SimTime, Transition};
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Queued(EventId),
    Holding(EventId),
    Released,
}

/// A process that holds one slot of a [`Resource`] for the duration of an inner process.
///
/// On its first step a [`Scoped`] requests a slot and waits for the grant. Once granted, it drives `body` exactly as
/// the environment would drive a process of its own: `body` sees `None` on its first step and the outcome of each
/// awaited event afterwards, including interrupts aimed at the scoped process. When `body` finishes or fails, the
/// slot is released and the scoped process ends with the same result.
///
/// An interrupt that arrives while the request is still queued withdraws the request (or releases the slot, if the
/// grant was already under way) and fails the scoped process with the interrupt; `body` never runs in that case.
///
/// Construct one with [`Resource::scoped()`].
#[derive(Debug)]
pub struct Scoped<P> {
    resource: Resource,
    body: P,
    phase: Phase,
}

impl<P> Scoped<P> {
    pub(super) fn new(resource: Resource, body: P) -> Self {
        Self {
            resource,
            body,
            phase: Phase::Idle,
        }
    }

    /// The resource this process acquires.
    pub fn resource(&self) -> Resource {
        self.resource
    }

    fn drive<Time, Value>(
        &mut self,
        env: &mut Environment<Time, Value>,
        outcome: Option<Outcome<Value>>,
    ) -> Resumption<Value>
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
        P: Process<Time, Value>,
    {
        match self.body.resume(env, outcome) {
            Ok(Transition::Wait(event)) => Ok(Transition::Wait(event)),
            ended => {
                if let Phase::Holding(request) = self.phase {
                    self.phase = Phase::Released;
                    self.resource.release(env, request)?;
                }
                ended
            },
        }
    }

    fn withdraw<Time, Value>(&mut self, env: &mut Environment<Time, Value>, request: EventId) -> crate::Result
    where
        Time: SimTime,
        Value: Clone + Debug + 'static,
    {
        self.phase = Phase::Released;
        match env.state(request) {
            Some(EventState::Pending) => self.resource.cancel(env, request),
            _ => self.resource.release(env, request),
        }
    }
}

impl<Time, Value, P> Process<Time, Value> for Scoped<P>
where
    Time: SimTime,
    Value: Clone + Debug + 'static,
    P: Process<Time, Value>,
{
    fn resume(&mut self, env: &mut Environment<Time, Value>, outcome: Option<Outcome<Value>>) -> Resumption<Value> {
        match (self.phase, outcome) {
            (Phase::Idle, _) => {
                let request = self.resource.request(env)?;
                self.phase = Phase::Queued(request);
                Ok(Transition::Wait(request))
            },
            (Phase::Queued(request), Some(Err(failure))) => {
                self.withdraw(env, request)?;
                Err(failure)
            },
            (Phase::Queued(request), _) => {
                self.phase = Phase::Holding(request);
                self.drive(env, None)
            },
            (Phase::Holding(_), outcome) => self.drive(env, outcome),
            (Phase::Released, _) => Ok(Transition::done()),
        }
    }
}
