use super::{JointBodies, SolverBody, SolverBodyId, SolverBodySet};
use crate::dynamics::{
    Island, IntegrationParameters, Joint, JointConstraint, RigidBodySet, TimeStep,
};
use crate::math::{Real, Vector};

/// Solves the joints of one island.
///
/// The bodies of the island are copied in by [`IslandSolver::init`], simulated by
/// [`IslandSolver::solve`] without access to the `RigidBodySet` (so that islands may be solved
/// concurrently), and copied back by [`IslandSolver::write_back`].
pub(crate) struct IslandSolver {
    bodies: SolverBodySet,
    converged: bool,
}

impl Default for IslandSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IslandSolver {
    pub fn new() -> Self {
        Self {
            bodies: SolverBodySet::new(),
            converged: true,
        }
    }

    /// Did the last position correction reach the tolerances of every joint?
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Copies the bodies of `island` and integrates their velocities.
    pub fn init(
        &mut self,
        island: &Island,
        gravity: &Vector<Real>,
        params: &IntegrationParameters,
        bodies: &RigidBodySet,
    ) {
        self.bodies.clear();
        let dt = params.dt;

        for handle in &island.bodies {
            let Some(rb) = bodies.get(*handle) else {
                continue;
            };

            let mut body = SolverBody::from_rigid_body(rb);

            if rb.is_static() {
                body.linvel = Vector::zeros();
                body.angvel = 0.0;
            } else if rb.is_dynamic() {
                body.linvel += (gravity * rb.gravity_scale + rb.force * body.inv_mass) * dt;
                body.angvel += rb.torque * body.inv_inertia * dt;

                body.linvel *= na::clamp(1.0 - dt * rb.linear_damping, 0.0, 1.0);
                body.angvel *= na::clamp(1.0 - dt * rb.angular_damping, 0.0, 1.0);
            }

            let _ = self.bodies.insert(*handle, body);
        }
    }

    /// Runs the velocity iterations, integrates the positions, and runs the position
    /// iterations.
    ///
    /// `joints` are the joints of the island, solved in this order. Joints attaching a body
    /// to itself are ignored.
    pub fn solve(
        &mut self,
        step: &TimeStep,
        params: &IntegrationParameters,
        joints: &mut [&mut Joint],
    ) {
        for joint in joints.iter_mut() {
            if let Some(ids) = self.body_ids(joint) {
                let mut bodies = JointBodies::new(&mut self.bodies, ids);
                joint.params.init_velocity_constraints(step, params, &mut bodies);
            }
        }

        for _ in 0..step.velocity_iterations {
            for joint in joints.iter_mut() {
                if let Some(ids) = self.body_ids(joint) {
                    let mut bodies = JointBodies::new(&mut self.bodies, ids);
                    joint.params.solve_velocity_constraints(step, &mut bodies);
                }
            }
        }

        self.integrate_positions(step, params);

        self.converged = joints.is_empty();
        for _ in 0..step.position_iterations {
            let mut joints_ok = true;

            for joint in joints.iter_mut() {
                if let Some(ids) = self.body_ids(joint) {
                    let mut bodies = JointBodies::new(&mut self.bodies, ids);
                    let joint_ok = joint.params.solve_position_constraints(params, &mut bodies);
                    joints_ok = joints_ok && joint_ok;
                }
            }

            if joints_ok {
                self.converged = true;
                break;
            }
        }
    }

    /// Updates the sleep timers, and copies the new poses and velocities back to the
    /// non-static bodies.
    ///
    /// The whole island falls asleep once every one of its bodies remained still for
    /// `params.time_to_sleep`.
    pub fn write_back(&self, params: &IntegrationParameters, bodies: &mut RigidBodySet) {
        let linear_tolerance_sqr = params.linear_sleep_tolerance * params.linear_sleep_tolerance;
        let angular_tolerance_sqr =
            params.angular_sleep_tolerance * params.angular_sleep_tolerance;
        let mut min_sleep_time = Real::MAX;

        for (handle, body) in self.bodies.iter() {
            let Some(rb) = bodies.get_mut(handle) else {
                continue;
            };

            if rb.is_static() {
                continue;
            }

            body.write_back(rb);

            let activation = rb.activation_mut();
            if !activation.can_sleep
                || body.angvel * body.angvel > angular_tolerance_sqr
                || body.linvel.norm_squared() > linear_tolerance_sqr
            {
                activation.time_since_can_sleep = 0.0;
                min_sleep_time = 0.0;
            } else {
                activation.time_since_can_sleep += params.dt;
                min_sleep_time = min_sleep_time.min(activation.time_since_can_sleep);
            }
        }

        if min_sleep_time >= params.time_to_sleep {
            for handle in &self.bodies.handles {
                if let Some(rb) = bodies.get_mut(*handle) {
                    if !rb.is_static() {
                        rb.sleep();
                    }
                }
            }
        }
    }

    // `None` if both sides of the joint are the same body.
    fn body_ids(&self, joint: &Joint) -> Option<[SolverBodyId; 2]> {
        let id1 = self.bodies.id(joint.body1());
        let id2 = self.bodies.id(Some(joint.body2()));
        (id1 != id2).then_some([id1, id2])
    }

    fn integrate_positions(&mut self, step: &TimeStep, params: &IntegrationParameters) {
        for body in &mut self.bodies.bodies {
            let translation = body.linvel * step.dt;
            if translation.norm_squared() > params.max_translation * params.max_translation {
                body.linvel *= params.max_translation / translation.norm();
            }

            let rotation = body.angvel * step.dt;
            if rotation * rotation > params.max_rotation * params.max_rotation {
                body.angvel *= params.max_rotation / rotation.abs();
            }

            body.center += body.linvel * step.dt;
            body.angle += body.angvel * step.dt;
        }
    }
}
