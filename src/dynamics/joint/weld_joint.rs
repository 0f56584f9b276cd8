use crate::dynamics::joint::joint::local_point;
use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{IntegrationParameters, JointConstraint, RigidBody, TimeStep};
use crate::math::{Matrix3, Point, Real, Vector};
use crate::utils::{self, WCross, WSolve, WSolve3};
use na::Vector3;

/// A joint removing every relative degree of freedom between two bodies.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WeldJoint {
    local_anchor1: Point<Real>,
    local_anchor2: Point<Real>,
    reference_angle: Real,

    impulse: Vector3<Real>,

    r1: Vector<Real>,
    r2: Vector<Real>,
    k: Matrix3<Real>,
}

impl WeldJoint {
    /// Creates a weld joint from its anchors, expressed in the local frame of each body.
    pub fn new(local_anchor1: Point<Real>, local_anchor2: Point<Real>) -> Self {
        Self {
            local_anchor1,
            local_anchor2,
            reference_angle: 0.0,
            impulse: Vector3::zeros(),
            r1: Vector::zeros(),
            r2: Vector::zeros(),
            k: Matrix3::zeros(),
        }
    }

    /// Creates a weld joint locking the current relative pose of the bodies around a
    /// world-space anchor.
    pub fn from_world(body1: Option<&RigidBody>, body2: &RigidBody, anchor: Point<Real>) -> Self {
        let mut result = Self::new(local_point(body1, &anchor), body2.local_point(&anchor));
        result.reference_angle = body2.angle() - body1.map(|b| b.angle()).unwrap_or(0.0);
        result
    }

    /// The anchor attached to the first body, in its local frame.
    pub fn local_anchor1(&self) -> Point<Real> {
        self.local_anchor1
    }

    /// The anchor attached to the second body, in its local frame.
    pub fn local_anchor2(&self) -> Point<Real> {
        self.local_anchor2
    }

    /// The relative angle maintained between both bodies.
    pub fn reference_angle(&self) -> Real {
        self.reference_angle
    }

    /// Sets the relative angle maintained between both bodies.
    pub fn set_reference_angle(&mut self, angle: Real) -> &mut Self {
        self.reference_angle = angle;
        self
    }

    fn apply(&self, b1: &mut SolverBody, b2: &mut SolverBody, impulse: Vector3<Real>) {
        let p = impulse.xy();
        b1.linvel -= p * b1.inv_mass;
        b1.angvel -= b1.inv_inertia * (self.r1.gcross(p) + impulse.z);
        b2.linvel += p * b2.inv_mass;
        b2.angvel += b2.inv_inertia * (self.r2.gcross(p) + impulse.z);
    }
}

// Bodies that cannot rotate only have their anchors welded together.
fn solve(k: &Matrix3<Real>, rhs: Vector3<Real>) -> Vector3<Real> {
    if k.m33 == 0.0 {
        let point = k.solve2(rhs.xy());
        Vector3::new(point.x, point.y, 0.0)
    } else {
        k.solve3(rhs)
    }
}

impl JointConstraint for WeldJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        _params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) {
        let (mut b1, mut b2) = bodies.pair();
        self.r1 = b1.arm(&self.local_anchor1);
        self.r2 = b2.arm(&self.local_anchor2);
        self.k = utils::point_angle_mass_matrix(
            b1.inv_mass,
            b1.inv_inertia,
            self.r1,
            b2.inv_mass,
            b2.inv_inertia,
            self.r2,
        );

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            self.apply(&mut b1, &mut b2, self.impulse);
        } else {
            self.impulse = Vector3::zeros();
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_velocity_constraints(&mut self, _step: &TimeStep, bodies: &mut JointBodies) {
        let (mut b1, mut b2) = bodies.pair();
        let cdot1 = b2.velocity_at(&self.r2) - b1.velocity_at(&self.r1);
        let cdot2 = b2.angvel - b1.angvel;
        let impulse = solve(&self.k, -Vector3::new(cdot1.x, cdot1.y, cdot2));
        self.impulse += impulse;
        self.apply(&mut b1, &mut b2, impulse);
        bodies.set_pair(&b1, &b2);
    }

    fn solve_position_constraints(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) -> bool {
        let (mut b1, mut b2) = bodies.pair();
        let (m1, m2, i1, i2) = (b1.inv_mass, b2.inv_mass, b1.inv_inertia, b2.inv_inertia);
        let r1 = b1.arm(&self.local_anchor1);
        let r2 = b2.arm(&self.local_anchor2);

        let mut c1 = b2.center + r2 - b1.center - r1;
        let c2 = b2.angle - b1.angle - self.reference_angle;
        let linear_error = c1.norm();
        let angular_error = c2.abs();

        let allowed_stretch = 10.0 * params.linear_slop;
        if linear_error > allowed_stretch {
            // Large detachment: first move the centers as if the bodies were particles.
            let impulse = -c1 * utils::inv(m1 + m2);
            let beta = 0.5;
            b1.center -= impulse * (beta * m1);
            b2.center += impulse * (beta * m2);
            c1 = b2.center + r2 - b1.center - r1;
        }

        let k = utils::point_angle_mass_matrix(m1, i1, r1, m2, i2, r2);
        let impulse = solve(&k, -Vector3::new(c1.x, c1.y, c2));
        let p = impulse.xy();

        b1.center -= p * m1;
        b1.angle -= i1 * (r1.gcross(p) + impulse.z);
        b2.center += p * m2;
        b2.angle += i2 * (r2.gcross(p) + impulse.z);
        bodies.set_pair(&b1, &b2);

        linear_error <= params.linear_slop && angular_error <= params.angular_slop
    }

    fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
        self.impulse.xy() * inv_dt
    }

    fn reaction_torque(&self, inv_dt: Real) -> Real {
        inv_dt * self.impulse.z
    }
}

#[cfg(test)]
mod test {
    use super::WeldJoint;
    use crate::dynamics::joint::test_utils::{body, timestep, Pair};
    use crate::dynamics::{
        IntegrationParameters, Joint, JointConstraint, JointSet, RigidBodyBuilder, RigidBodySet,
    };
    use crate::math::{Point, Vector};
    use crate::pipeline::PhysicsPipeline;
    use approx::assert_relative_eq;

    #[test]
    fn relative_velocity_vanishes() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = WeldJoint::new(Point::new(0.5, 0.0), Point::new(-0.5, 0.0));
        let mut b2 = body(1.0, 0.0, 0.0, 1.0, 3.0);
        b2.linvel = Vector::new(1.0, -2.0);
        b2.angvel = 4.0;
        let mut pair = Pair::new(body(0.0, 0.0, 0.0, 2.0, 1.0), b2);

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        joint.solve_velocity_constraints(&step, &mut pair.bodies());

        let (b1, b2) = pair.get();
        assert_relative_eq!(b1.angvel, b2.angvel, epsilon = 1.0e-4);
        assert_relative_eq!(
            b1.velocity_at(&joint.r1),
            b2.velocity_at(&joint.r2),
            epsilon = 1.0e-4
        );
    }

    #[test]
    fn cantilever_holds_its_relative_pose() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let ground = bodies.insert(RigidBodyBuilder::new_static());
        let beam = bodies.insert(RigidBodyBuilder::new_dynamic().translation(1.0, 0.0));
        let weld = WeldJoint::from_world(Some(&bodies[ground]), &bodies[beam], Point::origin());
        let handle = joints.insert(Joint::new(ground, beam, weld), &mut bodies).unwrap();

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        for _ in 0..120 {
            pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &());
        }

        let rb = &bodies[beam];
        assert_relative_eq!(rb.angle(), 0.0, epsilon = 2.0 * params.angular_slop);
        assert_relative_eq!(
            *rb.center_of_mass(),
            Point::new(1.0, 0.0),
            epsilon = 2.0 * params.linear_slop
        );
        // The weld carries the weight of the beam and its moment.
        assert_relative_eq!(
            joints[handle].reaction_force(params.inv_dt()),
            Vector::new(0.0, 10.0),
            epsilon = 1.0e-2
        );
        assert_relative_eq!(
            joints[handle].reaction_torque(params.inv_dt()),
            10.0,
            epsilon = 1.0e-2
        );
    }
}
