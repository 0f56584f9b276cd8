//! Counters for benchmarking various parts of the joint solver.

use std::fmt::{Display, Formatter, Result};

pub use self::solver_counters::SolverCounters;
pub use self::timer::Timer;

mod solver_counters;
mod timer;

/// Aggregation of all the performance counters tracked by the physics pipeline.
#[derive(Clone, Copy)]
pub struct Counters {
    /// Whether this counter is enabled or not.
    pub enabled: bool,
    /// Timer for a whole timestep.
    pub step_time: Timer,
    /// Time spent for the computation of islands and body activation/deactivation (sleeping).
    pub island_construction_time: Timer,
    /// Counters of the constraints resolution stage.
    pub solver: SolverCounters,
}

impl Counters {
    /// Create a new set of counters initialized to zero.
    pub fn new(enabled: bool) -> Self {
        Counters {
            enabled,
            step_time: Timer::new(),
            island_construction_time: Timer::new(),
            solver: SolverCounters::new(),
        }
    }

    /// Enable all the counters.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Return `true` if the counters are enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Disable all the counters.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Notify that the time-step has started.
    pub fn step_started(&mut self) {
        if self.enabled {
            self.step_time.start();
        }
    }

    /// Notify that the time-step has finished.
    pub fn step_completed(&mut self) {
        if self.enabled {
            self.step_time.pause();
        }
    }

    /// Total time spent for one timestep, in milliseconds.
    pub fn step_time(&self) -> f64 {
        self.step_time.time()
    }

    /// Resets all the counters and timers.
    pub fn reset(&mut self) {
        self.step_time.reset();
        self.island_construction_time.reset();
        self.solver.reset();
    }
}

impl Display for Counters {
    fn fmt(&self, f: &mut Formatter) -> Result {
        writeln!(f, "Total timestep time: {}", self.step_time)?;
        writeln!(
            f,
            "Island construction time: {}",
            self.island_construction_time
        )?;
        self.solver.fmt(f)
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new(false)
    }
}
