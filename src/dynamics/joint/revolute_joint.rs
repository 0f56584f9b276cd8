use crate::dynamics::joint::joint::{check_limits, local_point};
use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{
    IntegrationParameters, JointConstraint, JointError, JointLimitState, RigidBody, TimeStep,
};
use crate::math::{Matrix3, Point, Real, Vector};
use crate::utils::{self, WCross, WSolve, WSolve3};
use na::Vector3;

/// A joint that pins an anchor of both bodies together, leaving only their relative
/// rotation free.
///
/// The relative angle can be limited to `[lower, upper]` and driven by a motor.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct RevoluteJoint {
    local_anchor1: Point<Real>,
    local_anchor2: Point<Real>,
    reference_angle: Real,

    // Accumulated impulses: the point constraint in `xy`, the limit in `z`.
    impulse: Vector3<Real>,
    motor_impulse: Real,

    limit_enabled: bool,
    lower_angle: Real,
    upper_angle: Real,
    limit_state: JointLimitState,

    motor_enabled: bool,
    motor_speed: Real,
    max_motor_torque: Real,

    r1: Vector<Real>,
    r2: Vector<Real>,
    k: Matrix3<Real>,
    motor_mass: Real,
    fixed_rotation: bool,
}

impl RevoluteJoint {
    /// Creates a revolute joint from its anchors, expressed in the local frame of each body.
    pub fn new(local_anchor1: Point<Real>, local_anchor2: Point<Real>) -> Self {
        Self {
            local_anchor1,
            local_anchor2,
            reference_angle: 0.0,
            impulse: Vector3::zeros(),
            motor_impulse: 0.0,
            limit_enabled: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            limit_state: JointLimitState::Inactive,
            motor_enabled: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            r1: Vector::zeros(),
            r2: Vector::zeros(),
            k: Matrix3::zeros(),
            motor_mass: 0.0,
            fixed_rotation: false,
        }
    }

    /// Creates a revolute joint around a world-space anchor, using the current pose of the
    /// bodies. The current relative angle becomes the zero of [`Self::joint_angle`].
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

    /// The relative angle of the bodies for which [`Self::joint_angle`] is zero.
    pub fn reference_angle(&self) -> Real {
        self.reference_angle
    }

    /// Sets the relative angle of the bodies for which [`Self::joint_angle`] is zero.
    pub fn set_reference_angle(&mut self, angle: Real) -> &mut Self {
        self.reference_angle = angle;
        self
    }

    /// Is the angular limit enabled?
    pub fn is_limit_enabled(&self) -> bool {
        self.limit_enabled
    }

    /// Enables or disables the angular limit.
    pub fn enable_limit(&mut self, enabled: bool) -> &mut Self {
        self.limit_enabled = enabled;
        self
    }

    /// The lower angular limit.
    pub fn lower_limit(&self) -> Real {
        self.lower_angle
    }

    /// The upper angular limit.
    pub fn upper_limit(&self) -> Real {
        self.upper_angle
    }

    /// Sets the angular limits, in radians.
    pub fn set_limits(&mut self, lower: Real, upper: Real) -> Result<&mut Self, JointError> {
        check_limits(lower, upper)?;
        self.lower_angle = lower;
        self.upper_angle = upper;
        Ok(self)
    }

    /// The limit boundary enforced during the last step.
    pub fn limit_state(&self) -> JointLimitState {
        self.limit_state
    }

    /// Is the motor enabled?
    pub fn is_motor_enabled(&self) -> bool {
        self.motor_enabled
    }

    /// Enables or disables the motor.
    pub fn enable_motor(&mut self, enabled: bool) -> &mut Self {
        self.motor_enabled = enabled;
        self
    }

    /// The target angular speed of the motor.
    pub fn motor_speed(&self) -> Real {
        self.motor_speed
    }

    /// Sets the target angular speed of the motor.
    pub fn set_motor_speed(&mut self, speed: Real) -> &mut Self {
        self.motor_speed = speed;
        self
    }

    /// The maximum torque the motor can apply.
    pub fn max_motor_torque(&self) -> Real {
        self.max_motor_torque
    }

    /// Sets the maximum torque the motor can apply.
    pub fn set_max_motor_torque(&mut self, torque: Real) -> &mut Self {
        self.max_motor_torque = torque;
        self
    }

    /// The torque applied by the motor during the last step.
    pub fn motor_torque(&self, inv_dt: Real) -> Real {
        inv_dt * self.motor_impulse
    }

    /// The current angle of the second body relative to the first one, minus the reference
    /// angle.
    pub fn joint_angle(&self, body1: &SolverBody, body2: &SolverBody) -> Real {
        body2.angle - body1.angle - self.reference_angle
    }

    /// The current rate of change of [`Self::joint_angle`].
    pub fn joint_speed(&self, body1: &SolverBody, body2: &SolverBody) -> Real {
        body2.angvel - body1.angvel
    }

    fn apply(&self, b1: &mut SolverBody, b2: &mut SolverBody, p: Vector<Real>, angular: Real) {
        b1.linvel -= p * b1.inv_mass;
        b1.angvel -= b1.inv_inertia * (self.r1.gcross(p) + angular);
        b2.linvel += p * b2.inv_mass;
        b2.angvel += b2.inv_inertia * (self.r2.gcross(p) + angular);
    }

    fn point_velocity(&self, b1: &SolverBody, b2: &SolverBody) -> Vector<Real> {
        b2.velocity_at(&self.r2) - b1.velocity_at(&self.r1)
    }
}

impl JointConstraint for RevoluteJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        params: &IntegrationParameters,
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

        let angular_mass = b1.inv_inertia + b2.inv_inertia;
        self.motor_mass = utils::inv(angular_mass);
        self.fixed_rotation = angular_mass == 0.0;

        if !self.motor_enabled || self.fixed_rotation {
            self.motor_impulse = 0.0;
        }

        self.limit_state.update(
            self.limit_enabled && !self.fixed_rotation,
            self.joint_angle(&b1, &b2),
            self.lower_angle,
            self.upper_angle,
            params.angular_slop,
            &mut self.impulse.z,
        );

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            self.motor_impulse *= step.dt_ratio;
            let p = self.impulse.xy();
            self.apply(&mut b1, &mut b2, p, self.motor_impulse + self.impulse.z);
        } else {
            self.impulse = Vector3::zeros();
            self.motor_impulse = 0.0;
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_velocity_constraints(&mut self, step: &TimeStep, bodies: &mut JointBodies) {
        let (mut b1, mut b2) = bodies.pair();

        if self.motor_enabled
            && self.limit_state != JointLimitState::Equal
            && !self.fixed_rotation
        {
            let cdot = b2.angvel - b1.angvel;
            let impulse = self.motor_mass * (self.motor_speed - cdot);
            let old_impulse = self.motor_impulse;
            let max_impulse = step.dt * self.max_motor_torque;
            self.motor_impulse = na::clamp(old_impulse + impulse, -max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;
            self.apply(&mut b1, &mut b2, Vector::zeros(), impulse);
        }

        if self.limit_enabled
            && self.limit_state != JointLimitState::Inactive
            && !self.fixed_rotation
        {
            let cdot1 = self.point_velocity(&b1, &b2);
            let cdot2 = b2.angvel - b1.angvel;
            let mut impulse = -self.k.solve3(Vector3::new(cdot1.x, cdot1.y, cdot2));

            let new_impulse = self.impulse.z + impulse.z;
            let violated = match self.limit_state {
                JointLimitState::AtLower => new_impulse < 0.0,
                JointLimitState::AtUpper => new_impulse > 0.0,
                _ => false,
            };

            if violated {
                // Remove the limit impulse and solve the point constraint alone.
                let rhs = -cdot1 + Vector::new(self.k.m13, self.k.m23) * self.impulse.z;
                let reduced = self.k.solve2(rhs);
                impulse = Vector3::new(reduced.x, reduced.y, -self.impulse.z);
                self.impulse.x += reduced.x;
                self.impulse.y += reduced.y;
                self.impulse.z = 0.0;
            } else {
                self.impulse += impulse;
            }

            self.apply(&mut b1, &mut b2, impulse.xy(), impulse.z);
        } else {
            let cdot = self.point_velocity(&b1, &b2);
            let impulse = self.k.solve2(-cdot);
            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;
            self.apply(&mut b1, &mut b2, impulse, 0.0);
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_position_constraints(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) -> bool {
        let (mut b1, mut b2) = bodies.pair();
        let (m1, m2, i1, i2) = (b1.inv_mass, b2.inv_mass, b1.inv_inertia, b2.inv_inertia);
        let mut angular_error = 0.0;
        let fixed_rotation = i1 + i2 == 0.0;

        if self.limit_enabled && self.limit_state != JointLimitState::Inactive && !fixed_rotation
        {
            let angle = self.joint_angle(&b1, &b2);
            let max_correction = params.max_angular_correction;
            let c = match self.limit_state {
                JointLimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    na::clamp(c + params.angular_slop, -max_correction, 0.0)
                }
                JointLimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    na::clamp(c - params.angular_slop, 0.0, max_correction)
                }
                _ => {
                    let c = na::clamp(angle - self.lower_angle, -max_correction, max_correction);
                    angular_error = c.abs();
                    c
                }
            };

            let limit_impulse = -utils::inv(i1 + i2) * c;
            b1.angle -= i1 * limit_impulse;
            b2.angle += i2 * limit_impulse;
        }

        let r1 = b1.arm(&self.local_anchor1);
        let r2 = b2.arm(&self.local_anchor2);
        let mut c = b2.center + r2 - b1.center - r1;
        let linear_error = c.norm();

        let allowed_stretch = 10.0 * params.linear_slop;
        if c.norm_squared() > allowed_stretch * allowed_stretch {
            // Large detachment: first move the centers as if the bodies were particles.
            let impulse = -c * utils::inv(m1 + m2);
            let beta = 0.5;
            b1.center -= impulse * (beta * m1);
            b2.center += impulse * (beta * m2);
            c = b2.center + r2 - b1.center - r1;
        }

        let k = utils::point_mass_matrix(m1, i1, r1, m2, i2, r2);
        let impulse = k.solve2(-c);
        b1.apply_position_impulse(-impulse, &r1);
        b2.apply_position_impulse(impulse, &r2);
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
    use super::RevoluteJoint;
    use crate::dynamics::joint::test_utils::{body, timestep, Pair};
    use crate::dynamics::{IntegrationParameters, JointConstraint, JointLimitState};
    use crate::math::{Point, Real, Vector};
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    #[test]
    fn anchors_move_together() {
        let mut rng = Pcg32::seed_from_u64(4);
        let params = IntegrationParameters::default();
        let step = timestep(&params);

        for _ in 0..50 {
            let mut joint = RevoluteJoint::new(
                Point::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)),
                Point::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)),
            );
            let mut b1 = body(0.0, 0.0, rng.gen_range(-1.0..1.0), 1.0, 0.5);
            let mut b2 = body(1.0, 1.0, rng.gen_range(-1.0..1.0), 2.0, 1.5);
            b1.linvel = Vector::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0));
            b2.angvel = rng.gen_range(-3.0..3.0);
            let mut pair = Pair::new(b1, b2);

            joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
            joint.solve_velocity_constraints(&step, &mut pair.bodies());

            let (b1, b2) = pair.get();
            assert_relative_eq!(
                joint.point_velocity(&b1, &b2),
                Vector::zeros(),
                epsilon = 1.0e-4
            );
        }
    }

    #[test]
    fn angular_limit_impulse_has_the_sign_of_the_active_bound() {
        let mut rng = Pcg32::seed_from_u64(5);
        let params = IntegrationParameters::default();
        let step = timestep(&params);

        for i in 0..100 {
            let mut joint = RevoluteJoint::new(Point::new(0.5, 0.0), Point::new(-0.5, 0.0));
            let mut b2 = body(1.0, 0.0, rng.gen_range(-1.0..1.0), 1.0, 1.0);
            b2.angvel = rng.gen_range(-10.0..10.0);
            b2.linvel = Vector::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0));
            let mut pair = Pair::new(body(0.0, 0.0, 0.0, 1.0, 1.0), b2);

            if i % 2 == 0 {
                joint.set_limits(b2.angle, b2.angle + 1.0).unwrap();
            } else {
                joint.set_limits(b2.angle - 1.0, b2.angle).unwrap();
            }
            joint.enable_limit(true);

            joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
            for _ in 0..params.velocity_iterations {
                joint.solve_velocity_constraints(&step, &mut pair.bodies());
                match joint.limit_state() {
                    JointLimitState::AtLower => assert!(joint.impulse.z >= 0.0),
                    JointLimitState::AtUpper => assert!(joint.impulse.z <= 0.0),
                    state => panic!("unexpected limit state {:?}", state),
                }
            }
        }
    }

    #[test]
    fn motor_torque_is_clamped() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = RevoluteJoint::new(Point::origin(), Point::origin());
        joint
            .enable_motor(true)
            .set_motor_speed(100.0)
            .set_max_motor_torque(6.0);
        let mut pair = Pair::fixed(body(0.0, 0.0, 0.0, 1.0, 1.0));

        for _ in 0..5 {
            joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
            for _ in 0..params.velocity_iterations {
                joint.solve_velocity_constraints(&step, &mut pair.bodies());
            }
            assert_relative_eq!(joint.motor_torque(step.inv_dt), 6.0, epsilon = 1.0e-3);
        }

        // Each step adds at most `dt * max_torque / inertia` to the angular velocity.
        let (_, b2) = pair.get();
        assert_relative_eq!(b2.angvel, 5.0 * step.dt * 6.0, epsilon = 1.0e-4);
    }

    #[test]
    fn large_detachment_is_corrected() {
        let params = IntegrationParameters::default();
        let mut joint = RevoluteJoint::new(Point::new(0.0, 2.0), Point::new(-0.5, 0.0));
        let mut pair = Pair::fixed(body(3.0, -1.0, 0.7, 1.0, 2.0));

        let mut converged = false;
        for _ in 0..20 {
            if joint.solve_position_constraints(&params, &mut pair.bodies()) {
                converged = true;
                break;
            }
        }

        let (b1, b2) = pair.get();
        assert!(converged);
        assert_relative_eq!(
            b1.world_point(&joint.local_anchor1()),
            b2.world_point(&joint.local_anchor2()),
            epsilon = params.linear_slop
        );
    }

    #[test]
    fn bodies_without_rotational_inertia_ignore_motor_and_limit() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = RevoluteJoint::new(Point::origin(), Point::origin());
        joint
            .enable_motor(true)
            .set_motor_speed(1.0)
            .set_max_motor_torque(Real::MAX)
            .enable_limit(true)
            .set_limits(0.0, 0.0)
            .unwrap();
        let mut pair = Pair::new(body(0.0, 0.0, 0.0, 1.0, 0.0), body(0.0, 0.0, 1.0, 1.0, 0.0));

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        joint.solve_velocity_constraints(&step, &mut pair.bodies());
        assert!(joint.solve_position_constraints(&params, &mut pair.bodies()));

        let (b1, b2) = pair.get();
        assert_eq!(joint.limit_state(), JointLimitState::Inactive);
        assert_eq!(joint.motor_impulse, 0.0);
        assert_eq!(b1.angvel, 0.0);
        assert_eq!(b2.angvel, 0.0);
        assert_eq!(b2.angle, 1.0);
    }
}
