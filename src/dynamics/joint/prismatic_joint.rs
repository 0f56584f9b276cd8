use crate::dynamics::joint::joint::{check_limits, linear_limit_error, local_point, local_vector};
use crate::dynamics::joint::line_joint::AxisJacobians;
use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{
    IntegrationParameters, JointConstraint, JointError, JointLimitState, RigidBody, TimeStep,
};
use crate::math::{Matrix2, Matrix3, Point, Real, Vector};
use crate::utils::{self, WCross, WSolve, WSolve3};
use na::Vector3;

/// A joint that lets its second body translate along an axis attached to the first body, but
/// prevents any relative rotation.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct PrismaticJoint {
    local_anchor1: Point<Real>,
    local_anchor2: Point<Real>,
    local_axis1: Vector<Real>,
    local_perp1: Vector<Real>,
    reference_angle: Real,

    // Accumulated impulses: perpendicular, angular, and limit.
    impulse: Vector3<Real>,
    motor_impulse: Real,

    limit_enabled: bool,
    lower_translation: Real,
    upper_translation: Real,
    limit_state: JointLimitState,

    motor_enabled: bool,
    motor_speed: Real,
    max_motor_force: Real,

    axis: Vector<Real>,
    perp: Vector<Real>,
    s1: Real,
    s2: Real,
    a1: Real,
    a2: Real,
    k: Matrix3<Real>,
    motor_mass: Real,
}

impl PrismaticJoint {
    /// Creates a prismatic joint from its anchors and axis, expressed in the local frame of
    /// each body.
    ///
    /// The reference angle is zero: the joint keeps both bodies at the same orientation.
    pub fn new(
        local_anchor1: Point<Real>,
        local_anchor2: Point<Real>,
        local_axis1: Vector<Real>,
    ) -> Self {
        let local_axis1 = local_axis1
            .try_normalize(crate::math::DEFAULT_EPSILON)
            .unwrap_or_else(Vector::x);

        Self {
            local_anchor1,
            local_anchor2,
            local_axis1,
            local_perp1: (1.0 as Real).gcross(local_axis1),
            reference_angle: 0.0,
            impulse: Vector3::zeros(),
            motor_impulse: 0.0,
            limit_enabled: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            limit_state: JointLimitState::Inactive,
            motor_enabled: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            axis: Vector::zeros(),
            perp: Vector::zeros(),
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            k: Matrix3::zeros(),
            motor_mass: 0.0,
        }
    }

    /// Creates a prismatic joint from a world-space anchor and axis, keeping the current
    /// relative orientation of the bodies.
    pub fn from_world(
        body1: Option<&RigidBody>,
        body2: &RigidBody,
        anchor: Point<Real>,
        axis: Vector<Real>,
    ) -> Self {
        let mut result = Self::new(
            local_point(body1, &anchor),
            body2.local_point(&anchor),
            local_vector(body1, &axis),
        );
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

    /// The unit axis of translation, in the local frame of the first body.
    pub fn local_axis1(&self) -> Vector<Real> {
        self.local_axis1
    }

    /// The angle of the second body relative to the first one, maintained by this joint.
    pub fn reference_angle(&self) -> Real {
        self.reference_angle
    }

    /// Sets the angle maintained between both bodies.
    pub fn set_reference_angle(&mut self, angle: Real) -> &mut Self {
        self.reference_angle = angle;
        self
    }

    /// Is the translation limit enabled?
    pub fn is_limit_enabled(&self) -> bool {
        self.limit_enabled
    }

    /// Enables or disables the translation limit.
    pub fn enable_limit(&mut self, enabled: bool) -> &mut Self {
        self.limit_enabled = enabled;
        self
    }

    /// The lower translation limit.
    pub fn lower_limit(&self) -> Real {
        self.lower_translation
    }

    /// The upper translation limit.
    pub fn upper_limit(&self) -> Real {
        self.upper_translation
    }

    /// Sets the translation limits.
    pub fn set_limits(&mut self, lower: Real, upper: Real) -> Result<&mut Self, JointError> {
        check_limits(lower, upper)?;
        self.lower_translation = lower;
        self.upper_translation = upper;
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

    /// The target translation speed of the motor.
    pub fn motor_speed(&self) -> Real {
        self.motor_speed
    }

    /// Sets the target translation speed of the motor.
    pub fn set_motor_speed(&mut self, speed: Real) -> &mut Self {
        self.motor_speed = speed;
        self
    }

    /// The maximum force the motor can apply.
    pub fn max_motor_force(&self) -> Real {
        self.max_motor_force
    }

    /// Sets the maximum force the motor can apply.
    pub fn set_max_motor_force(&mut self, force: Real) -> &mut Self {
        self.max_motor_force = force;
        self
    }

    /// The force applied by the motor during the last step.
    pub fn motor_force(&self, inv_dt: Real) -> Real {
        inv_dt * self.motor_impulse
    }

    /// The current translation of the second anchor along the axis.
    pub fn joint_translation(&self, body1: &SolverBody, body2: &SolverBody) -> Real {
        self.jacobians(body1, body2).translation()
    }

    /// The current rate of change of [`Self::joint_translation`].
    pub fn joint_speed(&self, body1: &SolverBody, body2: &SolverBody) -> Real {
        let j = self.jacobians(body1, body2);
        j.d.dot(&body1.angvel.gcross(j.axis))
            + j.axis.dot(&(body2.velocity_at(&j.r2) - body1.velocity_at(&j.r1)))
    }

    fn jacobians(&self, b1: &SolverBody, b2: &SolverBody) -> AxisJacobians {
        AxisJacobians::new(
            b1,
            b2,
            &self.local_anchor1,
            &self.local_anchor2,
            &self.local_axis1,
            &self.local_perp1,
        )
    }

    fn apply(&self, b1: &mut SolverBody, b2: &mut SolverBody, impulse: Vector3<Real>) {
        let p = self.perp * impulse.x + self.axis * impulse.z;
        let l1 = impulse.x * self.s1 + impulse.y + impulse.z * self.a1;
        let l2 = impulse.x * self.s2 + impulse.y + impulse.z * self.a2;

        b1.linvel -= p * b1.inv_mass;
        b1.angvel -= b1.inv_inertia * l1;
        b2.linvel += p * b2.inv_mass;
        b2.angvel += b2.inv_inertia * l2;
    }
}

fn mass_matrix(im1: Real, im2: Real, ii1: Real, ii2: Real, j: &AxisJacobians) -> Matrix3<Real> {
    let k11 = im1 + im2 + ii1 * j.s1 * j.s1 + ii2 * j.s2 * j.s2;
    let k12 = ii1 * j.s1 + ii2 * j.s2;
    let k13 = ii1 * j.s1 * j.a1 + ii2 * j.s2 * j.a2;
    let mut k22 = ii1 + ii2;
    if k22 == 0.0 {
        // Both bodies have their rotations locked.
        k22 = 1.0;
    }
    let k23 = ii1 * j.a1 + ii2 * j.a2;
    let k33 = im1 + im2 + ii1 * j.a1 * j.a1 + ii2 * j.a2 * j.a2;

    Matrix3::new(k11, k12, k13, k12, k22, k23, k13, k23, k33)
}

impl JointConstraint for PrismaticJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) {
        let (mut b1, mut b2) = bodies.pair();
        let j = self.jacobians(&b1, &b2);
        let (im1, im2, ii1, ii2) = (b1.inv_mass, b2.inv_mass, b1.inv_inertia, b2.inv_inertia);

        self.axis = j.axis;
        self.perp = j.perp;
        self.a1 = j.a1;
        self.a2 = j.a2;
        self.s1 = j.s1;
        self.s2 = j.s2;
        self.motor_mass = utils::inv(im1 + im2 + ii1 * j.a1 * j.a1 + ii2 * j.a2 * j.a2);
        self.k = mass_matrix(im1, im2, ii1, ii2, &j);

        self.limit_state.update(
            self.limit_enabled,
            j.translation(),
            self.lower_translation,
            self.upper_translation,
            params.linear_slop,
            &mut self.impulse.z,
        );

        if !self.motor_enabled {
            self.motor_impulse = 0.0;
        }

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            self.motor_impulse *= step.dt_ratio;
            let total = self.impulse + Vector3::z() * self.motor_impulse;
            self.apply(&mut b1, &mut b2, total);
        } else {
            self.impulse = Vector3::zeros();
            self.motor_impulse = 0.0;
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_velocity_constraints(&mut self, step: &TimeStep, bodies: &mut JointBodies) {
        let (mut b1, mut b2) = bodies.pair();

        if self.motor_enabled && self.limit_state != JointLimitState::Equal {
            let cdot = self.axis.dot(&(b2.linvel - b1.linvel)) + self.a2 * b2.angvel
                - self.a1 * b1.angvel;
            let impulse = self.motor_mass * (self.motor_speed - cdot);
            let old_impulse = self.motor_impulse;
            let max_impulse = step.dt * self.max_motor_force;
            self.motor_impulse = na::clamp(old_impulse + impulse, -max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;
            self.apply(&mut b1, &mut b2, Vector3::z() * impulse);
        }

        let cdot1 = Vector::new(
            self.perp.dot(&(b2.linvel - b1.linvel)) + self.s2 * b2.angvel - self.s1 * b1.angvel,
            b2.angvel - b1.angvel,
        );

        if self.limit_enabled && self.limit_state != JointLimitState::Inactive {
            let cdot2 = self.axis.dot(&(b2.linvel - b1.linvel)) + self.a2 * b2.angvel
                - self.a1 * b1.angvel;
            let cdot = Vector3::new(cdot1.x, cdot1.y, cdot2);

            let f1 = self.impulse;
            self.impulse += self.k.solve3(-cdot);
            self.impulse.z = self.limit_state.clamp_impulse(self.impulse.z);

            // Re-solve the two other rows given the clamped limit impulse:
            // f2(1:2) = invK(1:2,1:2) * (-cdot(1:2) - K(1:2,3) * (f2(3) - f1(3))) + f1(1:2)
            let b = -cdot1 - Vector::new(self.k.m13, self.k.m23) * (self.impulse.z - f1.z);
            let f2r = self.k.solve2(b) + f1.xy();
            self.impulse.x = f2r.x;
            self.impulse.y = f2r.y;

            let df = self.impulse - f1;
            self.apply(&mut b1, &mut b2, df);
        } else {
            let df = self.k.solve2(-cdot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;
            self.apply(&mut b1, &mut b2, Vector3::new(df.x, df.y, 0.0));
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_position_constraints(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) -> bool {
        let (mut b1, mut b2) = bodies.pair();
        let j = self.jacobians(&b1, &b2);
        let (im1, im2, ii1, ii2) = (b1.inv_mass, b2.inv_mass, b1.inv_inertia, b2.inv_inertia);

        let mut linear_error = 0.0;
        let mut limit_error = None;

        if self.limit_enabled {
            if let Some((c2, error)) = linear_limit_error(
                j.translation(),
                self.lower_translation,
                self.upper_translation,
                params,
            ) {
                limit_error = Some(c2);
                linear_error = error;
            }
        }

        let c1 = Vector::new(
            j.perp.dot(&j.d),
            b2.angle - b1.angle - self.reference_angle,
        );
        linear_error = Real::max(linear_error, c1.x.abs());
        let angular_error = c1.y.abs();

        let k = mass_matrix(im1, im2, ii1, ii2, &j);
        let impulse = match limit_error {
            Some(c2) => k.solve3(-Vector3::new(c1.x, c1.y, c2)),
            None => {
                let k2: Matrix2<Real> = k.fixed_view::<2, 2>(0, 0).into_owned();
                let impulse1 = k2.solve2(-c1);
                Vector3::new(impulse1.x, impulse1.y, 0.0)
            }
        };

        let p = j.perp * impulse.x + j.axis * impulse.z;
        let l1 = impulse.x * j.s1 + impulse.y + impulse.z * j.a1;
        let l2 = impulse.x * j.s2 + impulse.y + impulse.z * j.a2;

        b1.center -= p * im1;
        b1.angle -= ii1 * l1;
        b2.center += p * im2;
        b2.angle += ii2 * l2;
        bodies.set_pair(&b1, &b2);

        linear_error <= params.linear_slop && angular_error <= params.angular_slop
    }

    fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
        (self.perp * self.impulse.x + self.axis * (self.motor_impulse + self.impulse.z)) * inv_dt
    }

    fn reaction_torque(&self, inv_dt: Real) -> Real {
        inv_dt * self.impulse.y
    }
}

#[cfg(test)]
mod test {
    use super::PrismaticJoint;
    use crate::dynamics::joint::test_utils::{body, timestep, Pair};
    use crate::dynamics::{IntegrationParameters, JointConstraint, JointLimitState};
    use crate::math::{Point, Vector};
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    #[test]
    fn relative_rotation_and_perpendicular_velocity_vanish() {
        let mut rng = Pcg32::seed_from_u64(3);
        let params = IntegrationParameters::default();
        let step = timestep(&params);

        for _ in 0..50 {
            let mut joint = PrismaticJoint::new(
                Point::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)),
                Point::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)),
                Vector::new(rng.gen_range(0.1..1.0), rng.gen_range(-1.0..1.0)),
            );
            let mut b1 = body(0.0, 0.0, rng.gen_range(-1.0..1.0), 1.0, 1.0);
            let mut b2 = body(1.0, 0.5, rng.gen_range(-1.0..1.0), 0.5, 2.0);
            b1.angvel = rng.gen_range(-3.0..3.0);
            b2.linvel = Vector::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0));
            let mut pair = Pair::new(b1, b2);

            joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
            joint.solve_velocity_constraints(&step, &mut pair.bodies());

            let (b1, b2) = pair.get();
            assert_relative_eq!(b2.angvel, b1.angvel, epsilon = 1.0e-4);
            let perp_vel = joint.perp.dot(&(b2.linvel - b1.linvel)) + joint.s2 * b2.angvel
                - joint.s1 * b1.angvel;
            assert_relative_eq!(perp_vel, 0.0, epsilon = 1.0e-4);
            assert_eq!(joint.limit_state(), JointLimitState::Inactive);
        }
    }

    #[test]
    fn motor_reaches_its_target_speed() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = PrismaticJoint::new(Point::origin(), Point::origin(), Vector::y());
        joint
            .enable_motor(true)
            .set_motor_speed(2.0)
            .set_max_motor_force(1000.0);
        let mut pair = Pair::fixed(body(0.0, 0.0, 0.0, 1.0, 1.0));

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        joint.solve_velocity_constraints(&step, &mut pair.bodies());

        let (b1, b2) = pair.get();
        assert_relative_eq!(joint.joint_speed(&b1, &b2), 2.0, epsilon = 1.0e-5);
        assert_relative_eq!(joint.motor_force(step.inv_dt), 2.0 * step.inv_dt, epsilon = 1.0e-3);
        assert_relative_eq!(
            joint.reaction_force(step.inv_dt),
            Vector::new(0.0, 2.0 * step.inv_dt),
            epsilon = 1.0e-3
        );
    }

    #[test]
    fn position_correction_restores_the_reference_angle() {
        let params = IntegrationParameters::default();
        let mut joint = PrismaticJoint::new(Point::origin(), Point::origin(), Vector::x());
        joint.set_reference_angle(0.25);
        let mut pair = Pair::fixed(body(0.5, 0.1, 0.0, 1.0, 1.0));

        let mut converged = false;
        for _ in 0..10 {
            if joint.solve_position_constraints(&params, &mut pair.bodies()) {
                converged = true;
                break;
            }
        }

        let (_, b2) = pair.get();
        assert!(converged);
        assert_relative_eq!(b2.angle, 0.25, epsilon = params.angular_slop);
        assert_relative_eq!(b2.center.y, 0.0, epsilon = params.linear_slop);
        // The translation along the axis is free.
        assert_relative_eq!(b2.center.x, 0.5, epsilon = params.linear_slop);
    }

    #[test]
    fn locked_limit_disables_the_motor() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = PrismaticJoint::new(Point::origin(), Point::origin(), Vector::x());
        joint
            .enable_limit(true)
            .set_limits(0.0, 0.0)
            .unwrap()
            .enable_motor(true)
            .set_motor_speed(5.0)
            .set_max_motor_force(100.0);
        let mut pair = Pair::fixed(body(0.0, 0.0, 0.0, 1.0, 1.0));

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        for _ in 0..params.velocity_iterations {
            joint.solve_velocity_constraints(&step, &mut pair.bodies());
        }

        let (_, b2) = pair.get();
        assert_eq!(joint.limit_state(), JointLimitState::Equal);
        assert_eq!(joint.motor_impulse, 0.0);
        assert_relative_eq!(b2.linvel, Vector::zeros(), epsilon = 1.0e-6);
    }
}
