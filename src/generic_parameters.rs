use std::fmt::Debug;
use std::ops::Add;

/// The generic type used for a simulation's clock.
///
/// Kept generic to support as many variations of clock as possible. This trait is a superset of [`Ord`], [`Debug`],
/// [`Clone`] and [`Add`], plus an overridable checked addition used to compute deadlines.
///
/// [`Ord`] sequences scheduled callbacks: a callback at time A runs before one at time B whenever
/// `A.cmp(&B) == std::cmp::Ordering::Less`. Ties are broken first by [`Priority`], then by the order in which the
/// callbacks were enqueued, so that equal-time work is always dispatched deterministically.
///
/// [`Add`] computes deadlines as `now + delay`. A delay is "negative" when that sum compares less than `now`; the
/// environment rejects such delays with [`Error::BackInTime`]. Unsigned types therefore cannot express an invalid
/// delay at all, while signed and floating-point clocks are checked at runtime.
///
/// Deadlines go through [`SimTime::add_delay()`], which returns [`None`] when `now + delay` cannot be represented. The
/// environment reports that case as [`Error::TimeOverflow`] instead of panicking. The default implementation uses
/// [`Add`] and never fails; the integer implementations use `checked_add`.
///
/// Implementations are provided for integral builtin types, but not for floating-point builtin types as the latter do
/// not implement [`Ord`]. If you wish to use either [`f32`] or [`f64`] as your [`SimTime`], either enable the
/// `ordered-float` feature (and so add a dependency on the [`ordered-float`] crate) to gain access to an implementation
/// on the [`OrderedFloat`] and [`NotNan`] structs, or create your own wrapper that guarantees full ordering.
///
/// [`Priority`]: crate::Priority
/// [`Error::BackInTime`]: crate::Error::BackInTime
/// [`Error::TimeOverflow`]: crate::Error::TimeOverflow
/// [`ordered-float`]: https://docs.rs/ordered-float/4
/// [`OrderedFloat`]: https://docs.rs/ordered-float/4/ordered_float/struct.OrderedFloat.html
/// [`NotNan`]: https://docs.rs/ordered-float/4/ordered_float/struct.NotNan.html
pub trait SimTime: Ord + Debug + Clone + Add<Output = Self> {
    /// Compute `self + delay`, or [`None`] if the sum is not representable.
    fn add_delay(&self, delay: &Self) -> Option<Self> {
        Some(self.clone() + delay.clone())
    }
}

macro_rules! checked_sim_time {
    ($($int:ty),*) => {
        $(
            impl SimTime for $int {
                fn add_delay(&self, delay: &Self) -> Option<Self> {
                    self.checked_add(*delay)
                }
            }
        )*
    };
}

checked_sim_time!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

#[cfg(feature = "ordered-float")]
impl<Float> SimTime for ordered_float::OrderedFloat<Float>
where
    Float: ordered_float::FloatCore + Debug,
    ordered_float::OrderedFloat<Float>: Add<Output = ordered_float::OrderedFloat<Float>>,
{
}

#[cfg(feature = "ordered-float")]
impl<Float> SimTime for ordered_float::NotNan<Float>
where
    Float: ordered_float::FloatCore + Debug,
    ordered_float::NotNan<Float>: Add<Output = ordered_float::NotNan<Float>>,
{
}
