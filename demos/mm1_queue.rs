//! An M/M/1 queue that prints arrival and service logs
//! to stdout. Arrival times are distributed with a mean
//! spacing of thirty minutes, and services times with a mean
//! spacing of twenty minutes.
//!
//! The simulation runs for nine hours before terminating,
//! and so could represent a small, service-oriented
//! business's typical workday.
//!
//! A single arrivals process spawns one customer process
//! per arrival. Each customer is wrapped in a scoped hold
//! on the counter, a resource with one slot: it waits in
//! line until the counter is free, is served, and hands
//! the counter to the next customer in line on its way out.

use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use rand_pcg::Pcg64;
use simproc::*;
use std::cmp::Ordering;
use std::ops::Add;

/// Wrap f64 with a new type so we can implement
/// the Ord trait.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
struct Time(f64);

impl Eq for Time {}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap()
    }
}

impl SimTime for Time {}

impl Add for Time {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

/// A customer at the counter. Only runs once the
/// counter has been granted.
struct Customer {
    id: usize,
    service_length: f64,
}

impl Process<Time> for Customer {
    fn resume(&mut self, env: &mut Environment<Time>, outcome: Option<Outcome<()>>) -> Resumption<()> {
        match outcome {
            None => {
                println!("Customer {} reached the counter at time {:.3}.", self.id, env.now().0);
                Ok(Transition::wait(env.timeout(Time(self.service_length))?))
            },
            Some(outcome) => {
                outcome?;
                println!("Completed service for customer {} at time {:.3}.", self.id, env.now().0);
                Ok(Transition::done())
            },
        }
    }
}

/// Draws arrival and service times and spawns
/// customers at the counter.
struct Arrivals {
    counter: Resource,
    arrival_distr: Exp<f64>,
    service_distr: Exp<f64>,
    arrived: usize,
    rng: Pcg64,
}

impl Process<Time> for Arrivals {
    /// On every wakeup after the first, a customer arrives
    /// and gets in line for the counter.
    ///
    /// Regardless, wait for the next arrival.
    fn resume(&mut self, env: &mut Environment<Time>, outcome: Option<Outcome<()>>) -> Resumption<()> {
        if outcome.is_some() {
            let in_line = self.counter.queue_len(env).unwrap_or(0);
            println!(
                "Handling customer {} arrival at time {:.3}, {} others waiting in line.",
                self.arrived,
                env.now().0,
                in_line,
            );

            let customer = Customer {
                id: self.arrived,
                service_length: self.service_distr.sample(&mut self.rng),
            };
            self.arrived += 1;
            env.process(self.counter.scoped(customer));
        }

        let next_arrival_delay = self.arrival_distr.sample(&mut self.rng);
        Ok(Transition::wait(env.timeout(Time(next_arrival_delay))?))
    }
}

/// Open the store from 8-5, i.e. for 540 minutes, with
/// customers arriving every thirty minutes on average. Logs
/// print to stdout as the simulation runs.
fn main() -> Result {
    let mut env: Environment<Time> = Environment::new(Time(0.0));
    let counter = env.resource(1)?;
    env.process(Arrivals {
        counter,
        arrival_distr: Exp::new(1.0 / 30.0).unwrap(),
        service_distr: Exp::new(1.0 / 20.0).unwrap(),
        arrived: 0,
        rng: Pcg64::from_rng(&mut rand::rng()),
    });
    env.run_until(Time(540.0))?;

    println!(
        "Closing at time 540.000 with {} customers still in line.",
        counter.queue_len(&env).unwrap_or(0)
    );
    Ok(())
}
