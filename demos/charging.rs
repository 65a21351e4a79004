//! An electric car that alternates between parking to charge
//! and driving, printing each change of activity to stdout.
//!
//! Charging takes five time units and is modeled as its own
//! process, which the car waits on. Each trip takes two time
//! units.
//!
//! A driver grows impatient and interrupts the car three time
//! units into its first charge. The interrupt preempts the car's
//! wait on the charging process: the car observes the interrupt,
//! hopes its battery is full enough and drives off at once. The
//! abandoned charging process still runs to completion at time
//! five, unobserved.
//!
//! The simulation stops at time fifteen.

use simproc::*;

#[derive(Debug, Clone, Copy)]
enum Activity {
    Charging,
    Driving,
}

struct Car {
    activity: Activity,
}

impl Car {
    fn charge(&mut self, env: &mut Environment<u32>) -> Resumption<()> {
        println!("Start parking and charging at {}", env.now());
        self.activity = Activity::Charging;
        let charger = env.process_fn(|env, outcome| match outcome {
            None => Ok(Transition::wait(env.timeout(5)?)),
            Some(outcome) => Ok(Transition::Finish(outcome?)),
        });
        Ok(Transition::wait(charger))
    }

    fn drive(&mut self, env: &mut Environment<u32>) -> Resumption<()> {
        println!("Start driving at {}", env.now());
        self.activity = Activity::Driving;
        Ok(Transition::wait(env.timeout(2)?))
    }
}

impl Process<u32> for Car {
    fn resume(&mut self, env: &mut Environment<u32>, outcome: Option<Outcome<()>>) -> Resumption<()> {
        match outcome {
            None => self.charge(env),
            Some(Err(failure)) if failure.is_interrupt() => {
                println!("Was interrupted. Hope, the battery is full enough ...");
                self.drive(env)
            },
            Some(Err(failure)) => Err(failure),
            Some(Ok(_)) => match self.activity {
                Activity::Charging => self.drive(env),
                Activity::Driving => self.charge(env),
            },
        }
    }
}

fn main() -> Result {
    let mut env: Environment<u32> = Environment::new(0);
    let car = env.process(Car {
        activity: Activity::Charging,
    });
    env.process_fn(move |env, outcome| match outcome {
        None => Ok(Transition::wait(env.timeout(3)?)),
        Some(_) => {
            car.interrupt(env, None)?;
            Ok(Transition::done())
        },
    });
    env.run_until(15)
}
