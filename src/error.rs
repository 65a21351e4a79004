use crate::process::ProcessState;

/// Protocol violations and aborted runs reported by the kernel.
///
/// Most variants are returned directly to the call site that broke the contract of an [`Environment`] method, e.g.
/// triggering an event twice or interrupting a process that is not waiting on anything. They indicate a logical bug in
/// client code rather than a condition of the simulated system, and leave the environment unchanged.
///
/// The [`UnhandledFailure`] variant is different: it originates from [`Environment::run()`] (or its siblings) when an
/// event fails and nothing in the simulation is subscribed to observe that failure. Invoking
/// [`std::error::Error::source()`] on this variant will acquire a shared reference to the wrapped [`Failure`], which
/// may be downcast to recover the original cause.
///
/// [`Environment`]: crate::Environment
/// [`Environment::run()`]: crate::Environment::run
/// [`Failure`]: crate::Failure
/// [`UnhandledFailure`]: Error::UnhandledFailure
#[derive(Debug)]
pub enum Error {
    /// A callback would have been scheduled for a time that has already passed, either through a negative delay or a
    /// run horizon earlier than the current clock.
    BackInTime,
    /// A delay added to the current time exceeded the range of the clock type.
    TimeOverflow,
    /// An event was triggered after its outcome had already been fixed.
    AlreadyTriggered,
    /// An event owned by the kernel (timeout, process completion, resource request or condition) was triggered by
    /// client code.
    KernelOwned,
    /// An interrupt targeted a process that has no suspension point to redirect. The process state at the time of the
    /// call is attached.
    NotInterruptible(ProcessState),
    /// An interrupt targeted a process that already has an undelivered interrupt.
    InterruptPending,
    /// A resource release was attempted for a request that does not currently hold a slot.
    NotGranted,
    /// A resource was constructed with no slots.
    ZeroCapacity,
    /// A handle did not refer to anything owned by this environment.
    InvalidHandle,
    /// An event failed with no subscribers to observe the failure. Call [`source()`] or unpack this value to inspect
    /// the [`Failure`].
    ///
    /// [`source()`]: #method.source
    /// [`Failure`]: crate::Failure
    UnhandledFailure(Box<dyn std::error::Error + 'static>),
}

/// Variants compare by kind, except that [`Error::NotInterruptible`] also compares the attached state and
/// [`Error::UnhandledFailure`] compares the address of the boxed source. Two boxed sources of a zero-sized type share
/// one address and therefore compare equal.
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::NotInterruptible(s1), Error::NotInterruptible(s2)) => s1 == s2,
            (Error::UnhandledFailure(e1), Error::UnhandledFailure(e2)) => {
                let e1: *const dyn std::error::Error = e1.as_ref();
                let e2: *const dyn std::error::Error = e2.as_ref();
                std::ptr::eq(e1, e2)
            },
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Eq for Error {}

impl std::fmt::Display for Error {
    #[allow(clippy::uninlined_format_args)] // compatibility with older Rust versions
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let descriptor = match self {
            Self::BackInTime => "callback execution time is less than current simulation time".into(),
            Self::TimeOverflow => "callback execution time overflows the clock type".into(),
            Self::AlreadyTriggered => "event has already been triggered".into(),
            Self::KernelOwned => "event is owned by the kernel and cannot be triggered manually".into(),
            Self::NotInterruptible(state) => format!("process cannot be interrupted while {:?}", state),
            Self::InterruptPending => "process already has an interrupt awaiting delivery".into(),
            Self::NotGranted => "request does not hold a resource slot".into(),
            Self::ZeroCapacity => "resource capacity must be at least one".into(),
            Self::InvalidHandle => "handle does not belong to this environment".into(),
            Self::UnhandledFailure(e) => format!("unhandled failure: {}", e),
        };
        write!(f, "{}", descriptor)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnhandledFailure(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// [`std::result::Result`]`<T, `[`simproc::Error`]`>`, with `T` defaulting to `()`.
///
/// A type alias that simplifies the signatures of various functions in simproc.
///
/// [`simproc::Error`]: Error
pub type Result<T = ()> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Cause(u8);

    impl std::fmt::Display for Cause {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "cause #{}", self.0)
        }
    }

    impl std::error::Error for Cause {}

    #[test]
    fn unit_variants_compare_by_kind() {
        assert_eq!(Error::BackInTime, Error::BackInTime);
        assert_ne!(Error::BackInTime, Error::AlreadyTriggered);
        assert_eq!(
            Error::NotInterruptible(ProcessState::Finished),
            Error::NotInterruptible(ProcessState::Finished)
        );
        assert_ne!(
            Error::NotInterruptible(ProcessState::Finished),
            Error::NotInterruptible(ProcessState::NotStarted)
        );
    }

    #[test]
    fn unhandled_failure_exposes_source() {
        let error = Error::UnhandledFailure(Box::new(Cause(1)));
        assert_eq!("unhandled failure: cause #1", error.to_string());
        assert!(error.source().is_some(), "wrapped failure should be reachable");
        assert_ne!(error, Error::UnhandledFailure(Box::new(Cause(1))), "distinct boxes should not compare equal");
        assert!(Error::ZeroCapacity.source().is_none());
    }
}
