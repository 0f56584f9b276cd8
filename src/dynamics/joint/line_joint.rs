use crate::dynamics::joint::joint::{check_limits, linear_limit_error, local_point, local_vector};
use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{
    IntegrationParameters, JointConstraint, JointError, JointLimitState, RigidBody, TimeStep,
};
use crate::math::{Matrix2, Point, Real, Vector};
use crate::utils::{self, WCross, WSolve};

/// A joint that lets its second body translate along an axis attached to the first body, and
/// rotate freely.
///
/// The translation along the axis can be limited to `[lower, upper]` and driven by a motor.
/// The motor and limit act on the same degree of freedom: when both bounds coincide the
/// motor is ignored.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct LineJoint {
    local_anchor1: Point<Real>,
    local_anchor2: Point<Real>,
    local_axis1: Vector<Real>,
    local_perp1: Vector<Real>,

    // Accumulated impulses: `x` along the perpendicular axis, `y` for the limit.
    impulse: Vector<Real>,
    motor_impulse: Real,

    limit_enabled: bool,
    lower_translation: Real,
    upper_translation: Real,
    limit_state: JointLimitState,

    motor_enabled: bool,
    motor_speed: Real,
    max_motor_force: Real,

    // Recomputed by each `init_velocity_constraints`.
    axis: Vector<Real>,
    perp: Vector<Real>,
    s1: Real,
    s2: Real,
    a1: Real,
    a2: Real,
    k: Matrix2<Real>,
    motor_mass: Real,
}

/// The Jacobians of a line or prismatic joint for the current pose of its bodies.
pub(crate) struct AxisJacobians {
    pub r1: Vector<Real>,
    pub r2: Vector<Real>,
    pub d: Vector<Real>,
    pub axis: Vector<Real>,
    pub perp: Vector<Real>,
    pub a1: Real,
    pub a2: Real,
    pub s1: Real,
    pub s2: Real,
}

impl AxisJacobians {
    pub fn new(
        b1: &SolverBody,
        b2: &SolverBody,
        local_anchor1: &Point<Real>,
        local_anchor2: &Point<Real>,
        local_axis1: &Vector<Real>,
        local_perp1: &Vector<Real>,
    ) -> Self {
        let r1 = b1.arm(local_anchor1);
        let r2 = b2.arm(local_anchor2);
        let d = b2.center + r2 - b1.center - r1;
        let axis = b1.world_vector(local_axis1);
        let perp = b1.world_vector(local_perp1);

        Self {
            r1,
            r2,
            d,
            axis,
            perp,
            a1: (d + r1).gcross(axis),
            a2: r2.gcross(axis),
            s1: (d + r1).gcross(perp),
            s2: r2.gcross(perp),
        }
    }

    /// The position of the second anchor along the axis.
    pub fn translation(&self) -> Real {
        self.axis.dot(&self.d)
    }
}

impl LineJoint {
    /// Creates a line joint from its anchors and axis, expressed in the local frame of each
    /// body.
    ///
    /// The axis is normalized. For a joint attached to a fixed anchor, the first anchor and
    /// the axis are in world-space.
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
            impulse: Vector::zeros(),
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
            k: Matrix2::zeros(),
            motor_mass: 0.0,
        }
    }

    /// Creates a line joint from a world-space anchor and axis, using the current pose of the
    /// bodies.
    ///
    /// `body1` is `None` when the joint is attached to a fixed anchor.
    pub fn from_world(
        body1: Option<&RigidBody>,
        body2: &RigidBody,
        anchor: Point<Real>,
        axis: Vector<Real>,
    ) -> Self {
        Self::new(
            local_point(body1, &anchor),
            body2.local_point(&anchor),
            local_vector(body1, &axis),
        )
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

    // Applies a perpendicular impulse `perp_impulse` and an axial impulse `axial_impulse`.
    fn apply(
        &self,
        b1: &mut SolverBody,
        b2: &mut SolverBody,
        perp_impulse: Real,
        axial_impulse: Real,
    ) {
        let p = self.perp * perp_impulse + self.axis * axial_impulse;
        let l1 = perp_impulse * self.s1 + axial_impulse * self.a1;
        let l2 = perp_impulse * self.s2 + axial_impulse * self.a2;

        b1.linvel -= p * b1.inv_mass;
        b1.angvel -= b1.inv_inertia * l1;
        b2.linvel += p * b2.inv_mass;
        b2.angvel += b2.inv_inertia * l2;
    }

    fn axial_velocity(&self, b1: &SolverBody, b2: &SolverBody) -> Real {
        self.axis.dot(&(b2.linvel - b1.linvel)) + self.a2 * b2.angvel - self.a1 * b1.angvel
    }

    fn perp_velocity(&self, b1: &SolverBody, b2: &SolverBody) -> Real {
        self.perp.dot(&(b2.linvel - b1.linvel)) + self.s2 * b2.angvel - self.s1 * b1.angvel
    }
}

impl JointConstraint for LineJoint {
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

        let k11 = im1 + im2 + ii1 * j.s1 * j.s1 + ii2 * j.s2 * j.s2;
        let k12 = ii1 * j.s1 * j.a1 + ii2 * j.s2 * j.a2;
        let k22 = im1 + im2 + ii1 * j.a1 * j.a1 + ii2 * j.a2 * j.a2;
        self.k = Matrix2::new(k11, k12, k12, k22);

        self.limit_state.update(
            self.limit_enabled,
            j.translation(),
            self.lower_translation,
            self.upper_translation,
            params.linear_slop,
            &mut self.impulse.y,
        );

        if !self.motor_enabled {
            self.motor_impulse = 0.0;
        }

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            self.motor_impulse *= step.dt_ratio;
            self.apply(
                &mut b1,
                &mut b2,
                self.impulse.x,
                self.motor_impulse + self.impulse.y,
            );
        } else {
            self.impulse = Vector::zeros();
            self.motor_impulse = 0.0;
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_velocity_constraints(&mut self, step: &TimeStep, bodies: &mut JointBodies) {
        let (mut b1, mut b2) = bodies.pair();

        if self.motor_enabled && self.limit_state != JointLimitState::Equal {
            let cdot = self.axial_velocity(&b1, &b2);
            let impulse = self.motor_mass * (self.motor_speed - cdot);
            let old_impulse = self.motor_impulse;
            let max_impulse = step.dt * self.max_motor_force;
            self.motor_impulse = na::clamp(old_impulse + impulse, -max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;
            self.apply(&mut b1, &mut b2, 0.0, impulse);
        }

        let cdot1 = self.perp_velocity(&b1, &b2);

        if self.limit_enabled && self.limit_state != JointLimitState::Inactive {
            let cdot2 = self.axial_velocity(&b1, &b2);
            let cdot = Vector::new(cdot1, cdot2);

            let f1 = self.impulse;
            self.impulse += self.k.solve2(-cdot);
            self.impulse.y = self.limit_state.clamp_impulse(self.impulse.y);

            // Re-solve the perpendicular component given the clamped limit impulse:
            // f2.x = (-cdot1 - k12 * (f2.y - f1.y)) / k11 + f1.x
            let b = -cdot1 - (self.impulse.y - f1.y) * self.k.m12;
            self.impulse.x = if self.k.m11 != 0.0 {
                b / self.k.m11 + f1.x
            } else {
                f1.x
            };

            let df = self.impulse - f1;
            self.apply(&mut b1, &mut b2, df.x, df.y);
        } else {
            let df = if self.k.m11 != 0.0 {
                -cdot1 / self.k.m11
            } else {
                0.0
            };
            self.impulse.x += df;
            self.apply(&mut b1, &mut b2, df, 0.0);
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

        let c1 = j.perp.dot(&j.d);
        linear_error = Real::max(linear_error, c1.abs());
        // The rotation is free.
        let angular_error = 0.0;

        let k11 = im1 + im2 + ii1 * j.s1 * j.s1 + ii2 * j.s2 * j.s2;
        let impulse = match limit_error {
            Some(c2) => {
                let k12 = ii1 * j.s1 * j.a1 + ii2 * j.s2 * j.a2;
                let k22 = im1 + im2 + ii1 * j.a1 * j.a1 + ii2 * j.a2 * j.a2;
                Matrix2::new(k11, k12, k12, k22).solve2(-Vector::new(c1, c2))
            }
            None => {
                let impulse1 = if k11 != 0.0 { -c1 / k11 } else { 0.0 };
                Vector::new(impulse1, 0.0)
            }
        };

        let p = j.perp * impulse.x + j.axis * impulse.y;
        let l1 = impulse.x * j.s1 + impulse.y * j.a1;
        let l2 = impulse.x * j.s2 + impulse.y * j.a2;

        b1.center -= p * im1;
        b1.angle -= ii1 * l1;
        b2.center += p * im2;
        b2.angle += ii2 * l2;
        bodies.set_pair(&b1, &b2);

        linear_error <= params.linear_slop && angular_error <= params.angular_slop
    }

    fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
        (self.perp * self.impulse.x + self.axis * (self.motor_impulse + self.impulse.y)) * inv_dt
    }

    fn reaction_torque(&self, _inv_dt: Real) -> Real {
        0.0
    }
}
