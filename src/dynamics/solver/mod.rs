//! Per-island constraint resolution.

pub(crate) use self::island_solver::IslandSolver;
pub use self::solver_body::{JointBodies, SolverBody, SolverBodyId, SolverBodySet};

mod island_solver;
mod solver_body;
