//! Physics pipeline structures.

use crate::counters::Counters;
use crate::data::HashMap;
use crate::dynamics::solver::IslandSolver;
use crate::dynamics::{
    IntegrationParameters, IslandManager, Joint, JointHandle, JointSet, RigidBodySet, TimeStep,
};
use crate::math::{Real, Vector};
use crate::pipeline::{EventHandler, JointEvent};

/// The physics pipeline, responsible for stepping the whole physics simulation.
///
/// This structure only contains temporary data buffers and the length of the previous step.
/// It can be dropped and replaced by a fresh copy at any time, at the cost of the warm-starting
/// impulses being applied unscaled at the next step. For performance reasons it is recommended
/// to reuse the same physics pipeline instance to benefit from the cached data.
///
/// Each step solves the joints with a sequential-impulse velocity solver, integrates the
/// positions, and then removes the remaining joint errors with a position solver.
// NOTE: this contains only workspace data, so there is no point in making this serializable.
pub struct PhysicsPipeline {
    /// Counters used for benchmarking only.
    pub counters: Counters,
    islands: IslandManager,
    solvers: Vec<IslandSolver>,
    island_of_joint: HashMap<JointHandle, usize>,
    prev_inv_dt: Real,
}

impl Default for PhysicsPipeline {
    fn default() -> Self {
        PhysicsPipeline::new()
    }
}

#[allow(dead_code)]
fn check_pipeline_send_sync() {
    fn do_test<T: Sync>() {}
    do_test::<PhysicsPipeline>();
}

impl PhysicsPipeline {
    /// Initializes a new physics pipeline.
    pub fn new() -> PhysicsPipeline {
        PhysicsPipeline {
            counters: Counters::new(false),
            islands: IslandManager::new(),
            solvers: Vec::new(),
            island_of_joint: HashMap::default(),
            prev_inv_dt: 0.0,
        }
    }

    /// The islands solved during the last step.
    pub fn islands(&self) -> &IslandManager {
        &self.islands
    }

    fn wake_up_modified_joints(&mut self, bodies: &mut RigidBodySet, joints: &mut JointSet) {
        for handle in joints.take_modified() {
            if let Some(joint) = joints.get(handle) {
                for body in joint.attached_bodies() {
                    bodies.wake_up(body, true);
                }
            }
        }
    }

    fn solve_islands(
        &mut self,
        step: &TimeStep,
        gravity: &Vector<Real>,
        params: &IntegrationParameters,
        bodies: &mut RigidBodySet,
        joints: &mut JointSet,
    ) {
        let num_islands = self.islands.num_islands();
        self.solvers.resize_with(num_islands, IslandSolver::new);
        self.island_of_joint.clear();

        for (island_id, (solver, island)) in self
            .solvers
            .iter_mut()
            .zip(self.islands.islands())
            .enumerate()
        {
            solver.init(island, gravity, params, bodies);

            for handle in island.joints() {
                let _ = self.island_of_joint.insert(*handle, island_id);
            }

            self.counters.solver.njoints += island.joints().len();
        }
        self.counters.solver.nislands = num_islands;

        // Iterating through the set keeps the joints of each island in the set order.
        let mut island_joints: Vec<Vec<&mut Joint>> = (0..num_islands).map(|_| vec![]).collect();
        for (handle, joint) in joints.iter_mut() {
            if let Some(island_id) = self.island_of_joint.get(&handle) {
                island_joints[*island_id].push(joint);
            }
        }

        self.counters.solver.solver_time.resume();
        {
            #[cfg(feature = "parallel")]
            use rayon::prelude::*;

            par_iter_mut!(self.solvers)
                .zip(par_iter_mut!(island_joints))
                .for_each(|(solver, joints)| solver.solve(step, params, joints));
        }
        self.counters.solver.solver_time.pause();

        for (island_id, solver) in self.solvers.iter().enumerate() {
            solver.write_back(params, bodies);

            if !solver.converged() {
                log::trace!(
                    "Island {} did not converge after {} position iterations.",
                    island_id,
                    step.position_iterations
                );
                self.counters.solver.nunconverged_islands += 1;
            }
        }
    }

    fn remove_broken_joints(
        &mut self,
        inv_dt: Real,
        bodies: &mut RigidBodySet,
        joints: &mut JointSet,
        events: &dyn EventHandler,
    ) {
        let broken: Vec<_> = joints
            .iter()
            .filter(|(handle, _)| self.island_of_joint.contains_key(handle))
            .filter(|(_, joint)| {
                joint
                    .break_force
                    .map_or(false, |max| joint.reaction_force(inv_dt).norm() > max)
            })
            .map(|(handle, _)| handle)
            .collect();

        for handle in broken {
            if joints.remove(handle, bodies, true).is_some() {
                log::debug!("Joint {:?} exceeded its break force and was removed.", handle);
                self.counters.solver.nbroken_joints += 1;
                events.handle_joint_event(JointEvent::Broken(handle));
            }
        }
    }

    /// Executes one timestep of the physics simulation.
    ///
    /// Bodies attached to joints modified since the last step are woken up first. Nothing else
    /// happens if `params.dt` is zero.
    pub fn step(
        &mut self,
        gravity: &Vector<Real>,
        params: &IntegrationParameters,
        bodies: &mut RigidBodySet,
        joints: &mut JointSet,
        events: &dyn EventHandler,
    ) {
        self.counters.reset();
        self.counters.step_started();

        self.wake_up_modified_joints(bodies, joints);

        if params.dt == 0.0 {
            self.counters.step_completed();
            return;
        }

        let step = TimeStep::new(params, self.prev_inv_dt);

        self.counters.island_construction_time.resume();
        self.islands.update(bodies, joints);
        self.counters.island_construction_time.pause();

        self.solve_islands(&step, gravity, params, bodies, joints);
        self.remove_broken_joints(step.inv_dt, bodies, joints, events);

        for (_, rb) in bodies.iter_mut() {
            rb.reset_forces();
        }

        self.prev_inv_dt = step.inv_dt;
        self.counters.step_completed();
    }
}

#[cfg(test)]
mod test {
    use crate::dynamics::{
        IntegrationParameters, Joint, JointSet, RevoluteJoint, RigidBodyBuilder, RigidBodySet,
        WeldJoint,
    };
    use crate::math::{Point, Vector};
    use crate::pipeline::{ChannelEventCollector, JointEvent, PhysicsPipeline};
    use approx::assert_relative_eq;

    #[test]
    fn pendulum_keeps_its_pivot() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let ground = bodies.insert(RigidBodyBuilder::new_static());
        let bob = bodies.insert(RigidBodyBuilder::new_dynamic().translation(1.0, 0.0));
        let pivot = RevoluteJoint::new(Point::origin(), Point::new(-1.0, 0.0));
        let _ = joints.insert(Joint::new(ground, bob, pivot), &mut bodies).unwrap();

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        let mut lowest: f32 = 0.0;
        for _ in 0..120 {
            pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &());
            let pivot = bodies[bob].world_point(&Point::new(-1.0, 0.0));
            assert!(pivot.coords.norm() < 2.0 * params.linear_slop);
            assert_relative_eq!(bodies[bob].center_of_mass().coords.norm(), 1.0, epsilon = 1.0e-2);
            lowest = lowest.min(bodies[bob].center_of_mass().y);
        }

        // The pendulum swung through its lowest point.
        assert!(lowest < -0.95);
    }

    #[test]
    fn resting_island_falls_asleep_and_wakes_up_when_modified() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let ground = bodies.insert(RigidBodyBuilder::new_static());
        let body = bodies.insert(RigidBodyBuilder::new_dynamic().translation(0.0, -1.0));
        let weld = WeldJoint::new(Point::new(0.0, -1.0), Point::origin());
        let handle = joints.insert(Joint::new(ground, body, weld), &mut bodies).unwrap();

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        for _ in 0..60 {
            pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &());
        }

        assert!(bodies[body].is_sleeping());
        pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &());
        assert_eq!(pipeline.islands().num_islands(), 0);

        let _ = joints.get_mut(handle).unwrap();
        pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &());
        assert_eq!(pipeline.islands().num_islands(), 1);
        assert!(!bodies[body].is_sleeping());
    }

    #[test]
    fn overloaded_joint_breaks() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let ground = bodies.insert(RigidBodyBuilder::new_static());
        let light = bodies.insert(RigidBodyBuilder::new_dynamic().translation(0.0, -1.0));
        let heavy = bodies.insert(
            RigidBodyBuilder::new_dynamic()
                .translation(3.0, -1.0)
                .mass(10.0),
        );
        let weld = WeldJoint::new(Point::new(0.0, -1.0), Point::origin());
        let holds = joints
            .insert(Joint::new(ground, light, weld).break_force(20.0), &mut bodies)
            .unwrap();
        let weld = WeldJoint::new(Point::new(3.0, -1.0), Point::origin());
        let breaks = joints
            .insert(Joint::new(ground, heavy, weld).break_force(20.0), &mut bodies)
            .unwrap();

        let (sender, receiver) = std::sync::mpsc::channel();
        let events = ChannelEventCollector::new(sender);
        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        pipeline.counters.enable();
        pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &events);

        assert_eq!(receiver.try_recv(), Ok(JointEvent::Broken(breaks)));
        assert!(receiver.try_recv().is_err());
        assert!(joints.contains(holds));
        assert!(!joints.contains(breaks));
        assert_eq!(pipeline.counters.solver.nislands, 2);
        assert_eq!(pipeline.counters.solver.njoints, 2);
        assert_eq!(pipeline.counters.solver.nbroken_joints, 1);
    }

    #[test]
    fn joint_attaching_a_body_to_itself_has_no_effect() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let body = bodies.insert(RigidBodyBuilder::new_dynamic().can_sleep(false));
        let revolute = RevoluteJoint::new(Point::origin(), Point::new(1.0, 0.0));
        let _ = joints.insert(Joint::new(body, body, revolute), &mut bodies).unwrap();

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        pipeline.counters.enable();
        for _ in 0..10 {
            pipeline.step(&Vector::zeros(), &params, &mut bodies, &mut joints, &());
            assert_eq!(pipeline.counters.solver.nunconverged_islands, 0);
        }

        assert_eq!(*bodies[body].center_of_mass(), Point::origin());
        assert_eq!(*bodies[body].linvel(), Vector::zeros());
        assert_eq!(bodies[body].angle(), 0.0);
    }

    #[test]
    fn zero_timestep_does_nothing() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let body = bodies.insert(RigidBodyBuilder::new_dynamic().linvel(1.0, 0.0));

        let mut params = IntegrationParameters::default();
        params.dt = 0.0;
        let mut pipeline = PhysicsPipeline::new();
        pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &());

        assert_eq!(*bodies[body].center_of_mass(), Point::origin());
        assert_eq!(*bodies[body].linvel(), Vector::new(1.0, 0.0));
    }
}
