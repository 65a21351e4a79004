mod util;

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use rand_pcg::Pcg64;
use simproc::*;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::ops::Add;
use std::rc::Rc;

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

/// Output stats shared by every process in one replication
#[derive(Debug, Default)]
struct Stats {
    customers_served: usize,
    total_time_in_queue: f64,
    grant_order: Vec<usize>, // customer ids in the order they reached a server
}

type Shared<T> = Rc<RefCell<T>>;

/// Body of a customer's visit, run while holding a server
struct Service {
    id: usize,
    arrival_time: F64Time,
    service_time: f64,
    stats: Shared<Stats>,
}

impl Process<F64Time, ()> for Service {
    fn resume(&mut self, env: &mut Environment<F64Time>, outcome: Option<Outcome<()>>) -> Resumption<()> {
        let mut stats = self.stats.borrow_mut();
        match outcome {
            None => {
                // at the counter
                stats.total_time_in_queue += env.now().0 - self.arrival_time.0;
                stats.grant_order.push(self.id);
                Ok(Transition::wait(env.timeout(F64Time(self.service_time))?))
            },
            Some(outcome) => {
                outcome?;
                stats.customers_served += 1;
                Ok(Transition::done())
            },
        }
    }
}

/// Generates customers with exponential interarrival and service times
struct Arrivals {
    servers: Resource,
    service_rate: f64,
    arrival_distr: Exp<f64>,
    rng: Pcg64,
    arrived: usize,
    stats: Shared<Stats>,
}

impl Process<F64Time, ()> for Arrivals {
    fn resume(&mut self, env: &mut Environment<F64Time>, outcome: Option<Outcome<()>>) -> Resumption<()> {
        if outcome.is_some() {
            let service = Service {
                id: self.arrived,
                arrival_time: *env.now(),
                service_time: self.rng.random::<f64>().ln() / -self.service_rate,
                stats: Rc::clone(&self.stats),
            };
            self.arrived += 1;
            env.process(self.servers.scoped(service));
        }

        let arrival_delay = self.arrival_distr.sample(&mut self.rng);
        Ok(Transition::wait(env.timeout(F64Time(arrival_delay))?))
    }
}

fn run_sim(seed: u64, num_servers: usize, service_rate: f64) -> (usize, f64, Vec<usize>) {
    let stats = Shared::<Stats>::default();
    let mut env: Environment<F64Time> = Environment::new(F64Time(0.0));
    let servers = env.resource(num_servers).expect("server count should be positive");
    env.process(Arrivals {
        servers,
        service_rate,
        arrival_distr: Exp::new(4.0).unwrap(),
        rng: Pcg64::seed_from_u64(seed),
        arrived: 0,
        stats: Rc::clone(&stats),
    });

    env.run_until(F64Time(540.0)).expect("simulation should run without errors");

    assert!(env.now().0 < 540.0, "clock should stop short of the horizon");
    assert!(servers.count(&env) <= Some(num_servers), "servers should never be oversubscribed");
    if servers.queue_len(&env) > Some(0) {
        assert_eq!(Some(num_servers), servers.count(&env), "customers queued while a server idles");
    }

    let stats = stats.borrow();
    (stats.customers_served, stats.total_time_in_queue, stats.grant_order.clone())
}

fn check_replication(seed: u64, num_servers: usize, service_rate: f64) {
    let (customers_served, time_in_queue, grant_order) = run_sim(seed, num_servers, service_rate);

    // about 2160 arrivals are expected at rate 4 over 540 time units
    assert!(
        (1800..2500).contains(&customers_served),
        "unexpected number of customers made it through the system: {}",
        customers_served
    );
    let mean_wait = time_in_queue / grant_order.len() as f64;
    assert!(
        (0.05..1.0).contains(&mean_wait),
        "unexpected mean time in queue: {}",
        mean_wait
    );
    assert!(
        grant_order.windows(2).all(|pair| pair[0] < pair[1]),
        "servers should be granted first come, first served"
    );

    let (repeat_served, repeat_time_in_queue, _) = run_sim(seed, num_servers, service_rate);
    assert_eq!(customers_served, repeat_served, "replication should be reproducible");
    assert_floats_near_equal!(time_in_queue, repeat_time_in_queue, "replication should be reproducible");
}

#[test]
fn single_server_meets_expectation() {
    check_replication(11434450237083315284, 1, 6.0);
}

#[test]
fn double_server_meets_expectations() {
    check_replication(7082446179938253086, 2, 3.0);
}

#[test]
fn triple_server_meets_expectation() {
    check_replication(13009076887838060007, 3, 2.0);
}
