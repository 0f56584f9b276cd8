use crate::counters::Timer;
use std::fmt::{Display, Formatter, Result};

/// Performance counters related to constraints resolution.
#[derive(Default, Clone, Copy)]
pub struct SolverCounters {
    /// Number of islands solved during the last step.
    pub nislands: usize,
    /// Number of joints solved during the last step.
    pub njoints: usize,
    /// Number of islands that exhausted their position iterations without converging.
    pub nunconverged_islands: usize,
    /// Number of joints removed because their break force was exceeded.
    pub nbroken_joints: usize,
    /// Total time spent solving every island (velocity and position).
    pub solver_time: Timer,
}

impl SolverCounters {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        SolverCounters {
            nislands: 0,
            njoints: 0,
            nunconverged_islands: 0,
            nbroken_joints: 0,
            solver_time: Timer::new(),
        }
    }

    /// Reset all the counters to zero.
    pub fn reset(&mut self) {
        self.nislands = 0;
        self.njoints = 0;
        self.nunconverged_islands = 0;
        self.nbroken_joints = 0;
        self.solver_time.reset();
    }
}

impl Display for SolverCounters {
    fn fmt(&self, f: &mut Formatter) -> Result {
        writeln!(f, "Number of islands: {}", self.nislands)?;
        writeln!(f, "Number of joints: {}", self.njoints)?;
        writeln!(
            f,
            "Unconverged islands: {}",
            self.nunconverged_islands
        )?;
        writeln!(f, "Broken joints: {}", self.nbroken_joints)?;
        writeln!(f, "Solver time: {}", self.solver_time)
    }
}
