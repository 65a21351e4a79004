//! # Overview
//!
//! simproc is a process-oriented discrete-event simulation kernel. A simulation is a set of processes, each a piece of
//! sequential logic that suspends on events and is resumed when those events happen, sharing a virtual clock that jumps
//! from one scheduled instant to the next:
//!
//! * The [`Environment`] owns the clock, a single callback queue and every event, process and resource. It is passed
//!   explicitly to each process step, granting exclusive access to the simulation without interior mutability or
//!   global state.
//! * An event ([`EventId`]) has its outcome fixed exactly once and then notifies its subscribers in registration order.
//!   Timeouts are events that the scheduler triggers after a delay; conditions built with [`Environment::any_of()`] and
//!   [`Environment::all_of()`] trigger when some or all of their children do.
//! * A [`Process`] is driven one suspension point at a time through [`Process::resume()`], returning a [`Transition`]
//!   that either waits on an event or finishes. Each process is itself an event, triggered when it finishes, so other
//!   processes may wait for it. A waiting process can be interrupted, which redirects its next resumption ahead of any
//!   other work scheduled for the same instant.
//! * A [`Resource`] grants a fixed number of slots in strict FIFO order. [`Resource::scoped()`] wraps a process so that
//!   its slot is released on every exit path.
//!
//! Ordering is fully deterministic: callbacks run in ascending order of time, then [`Priority`], then insertion
//! sequence. Parameterizing over the [`SimTime`] trait gives full control over the clock's representation.
//!
//! Errors come in two flavors. Protocol violations such as triggering an event twice are returned as [`Error`] at the
//! call site. Failures of simulated work travel through the event graph as [`Failure`] values, where process logic may
//! handle them; a failure that nothing observes aborts the run with [`Error::UnhandledFailure`].
//!
//! The kernel logs through the [`log`] facade: one `trace` record per dispatched callback and `debug` records for
//! process, interrupt and resource lifecycle. Install any `log` implementation to see them.
//!
//! # Features
//!
//! simproc offers one feature, `ordered-float`, which provides the option to add a dependency on the [`ordered-float`]
//! crate so that its [`OrderedFloat`] and [`NotNan`] structs may be used as [`SimTime`]. By default, this feature is
//! disabled to avoid a potentially unnecessary dependency.
//!
//! [`log`]: https://docs.rs/log/0.4
//! [`ordered-float`]: https://docs.rs/ordered-float/4
//! [`OrderedFloat`]: https://docs.rs/ordered-float/4/ordered_float/struct.OrderedFloat.html
//! [`NotNan`]: https://docs.rs/ordered-float/4/ordered_float/struct.NotNan.html

mod condition;
mod environment;
mod error;
mod event;
mod generic_parameters;
mod process;
mod resource;

pub use environment::{Environment, Priority};
pub use error::{Error, Result};
pub use event::{EventId, EventState, Failure, Outcome};
pub use generic_parameters::SimTime;
pub use process::process_traits::{Process, Resumption, Transition};
pub use process::{ProcessHandle, ProcessState};
pub use resource::{Resource, Scoped};
