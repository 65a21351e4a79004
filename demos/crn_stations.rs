//! This example demonstrates the use of a variance reduction
//! technique from the statistical field of design of experiments,
//! taking advantage of simproc's ability to keep every piece of a
//! replication inside one environment. The simulation here will
//! compare a charging site with a single fast charger (6 cars per
//! unit of time) against sites with two chargers at rate 3 each and
//! three chargers at rate 2 each, with cars arriving at rate 4.
//!
//! Common Random Numbers, or CRN, is a variance-reduction technique
//! that sacrifices the statistical independence of select repetitions
//! across different courses of action, in a controlled manner, for the
//! sake of decreasing the variance of output statistics. Simulation code
//! must prepare for this use case by ensuring that each draw from the
//! generator is used for the same purpose in every rep that reuses the
//! starting seed.
//!
//! Here, that means each car draws a uniform random number from [0, 1)
//! when it arrives, for later calculation of its charging time, rather
//! than waiting until it reaches a charger. The same cars then visit each
//! site configuration, one configuration per thread.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use rand_pcg::Pcg64;
use simproc::*;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::ops::Add;
use std::rc::Rc;
use std::thread;

/// Wrap f64 in a struct to implement Ord and SimTime
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
struct F64Time(f64);

impl Eq for F64Time {}

impl Ord for F64Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap()
    }
}

impl Add for F64Time {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        F64Time(self.0 + rhs.0)
    }
}

impl SimTime for F64Time {}

/// Output stats for one site configuration
#[derive(Debug, Default)]
struct Stats {
    cars_charged: usize,
    total_time_waiting: f64,
}

/// A car plugged into a charger
struct Charge {
    arrival_time: F64Time,
    charge_time_random_draw: f64,
    charge_rate: f64,
    stats: Rc<RefCell<Stats>>,
}

impl Process<F64Time> for Charge {
    fn resume(&mut self, env: &mut Environment<F64Time>, outcome: Option<Outcome<()>>) -> Resumption<()> {
        match outcome {
            None => {
                self.stats.borrow_mut().total_time_waiting += env.now().0 - self.arrival_time.0;
                let charge_delay = self.charge_time_random_draw.ln() / -self.charge_rate;
                Ok(Transition::wait(env.timeout(F64Time(charge_delay))?))
            },
            Some(outcome) => {
                outcome?;
                self.stats.borrow_mut().cars_charged += 1;
                Ok(Transition::done())
            },
        }
    }
}

/// Cars pull into the site
struct Arrivals {
    chargers: Resource,
    charge_rate: f64,
    arrival_distr: Exp<f64>,
    rng: Pcg64,
    stats: Rc<RefCell<Stats>>,
}

impl Process<F64Time> for Arrivals {
    fn resume(&mut self, env: &mut Environment<F64Time>, outcome: Option<Outcome<()>>) -> Resumption<()> {
        if outcome.is_some() {
            let charge = Charge {
                arrival_time: *env.now(),
                charge_time_random_draw: self.rng.random(),
                charge_rate: self.charge_rate,
                stats: Rc::clone(&self.stats),
            };
            env.process(self.chargers.scoped(charge));
        }

        let arrival_delay = self.arrival_distr.sample(&mut self.rng);
        Ok(Transition::wait(env.timeout(F64Time(arrival_delay))?))
    }
}

fn run_sim(seed: u64, num_chargers: usize, charge_rate: f64) -> Result<(usize, f64)> {
    let stats = Rc::new(RefCell::new(Stats::default()));
    let mut env: Environment<F64Time> = Environment::new(F64Time(0.0));
    let chargers = env.resource(num_chargers)?;
    env.process(Arrivals {
        chargers,
        charge_rate,
        arrival_distr: Exp::new(4.0).unwrap(),
        rng: Pcg64::seed_from_u64(seed),
        stats: Rc::clone(&stats),
    });
    env.run_until(F64Time(540.0))?;

    let stats = stats.borrow();
    Ok((stats.cars_charged, stats.total_time_waiting))
}

fn main() {
    let seed: u64 = rand::random();
    let one = thread::spawn(move || run_sim(seed, 1, 6.0).map_err(|e| e.to_string()));
    let two = thread::spawn(move || run_sim(seed, 2, 3.0).map_err(|e| e.to_string()));
    let three = thread::spawn(move || run_sim(seed, 3, 2.0).map_err(|e| e.to_string()));

    let one_results = one
        .join()
        .expect("thread should return normally")
        .expect("simulation should complete normally");
    let two_results = two
        .join()
        .expect("thread should return normally")
        .expect("simulation should complete normally");
    let three_results = three
        .join()
        .expect("thread should return normally")
        .expect("simulation should complete normally");

    println!("Comparing charging sites using the seed {seed}:");
    println!(
        "1 charger with rate 6.0 charged {} cars with {} total time waiting",
        one_results.0, one_results.1
    );
    println!(
        "2 chargers with rate 3.0 charged {} cars with {} total time waiting",
        two_results.0, two_results.1
    );
    println!(
        "3 chargers with rate 2.0 charged {} cars with {} total time waiting",
        three_results.0, three_results.1
    );
}
