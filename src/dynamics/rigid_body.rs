use crate::dynamics::{RigidBodyActivation, RigidBodyType};
use crate::math::{AngVector, Isometry, Point, Real, Rotation, Vector};
use crate::utils::{self, WCross};
use num::Zero;

#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
/// A rigid body.
///
/// The pose of a body is tracked through its center of mass: `center` is the world-space
/// center of mass and `angle` its orientation. The angle is never wrapped so the relative
/// angle of two bodies stays continuous across full turns.
///
/// To create a new rigid-body, use the `RigidBodyBuilder` structure.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) center: Point<Real>,
    pub(crate) angle: Real,
    pub(crate) local_com: Point<Real>,
    pub(crate) linvel: Vector<Real>,
    pub(crate) angvel: AngVector<Real>,
    pub(crate) mass: Real,
    pub(crate) inertia: Real,
    pub(crate) inv_mass: Real,
    pub(crate) inv_inertia: Real,
    pub(crate) force: Vector<Real>,
    pub(crate) torque: Real,
    pub(crate) linear_damping: Real,
    pub(crate) angular_damping: Real,
    pub(crate) gravity_scale: Real,
    pub(crate) rb_type: RigidBodyType,
    pub(crate) activation: RigidBodyActivation,
    /// User-defined data associated to this rigid-body.
    pub user_data: u128,
}

impl RigidBody {
    /// The status of this rigid-body.
    pub fn body_type(&self) -> RigidBodyType {
        self.rb_type
    }

    /// Sets the status of this rigid-body.
    ///
    /// Static and kinematic bodies have an infinite mass, and static bodies have no velocity.
    pub fn set_body_type(&mut self, rb_type: RigidBodyType) {
        if rb_type != self.rb_type {
            self.rb_type = rb_type;
            if rb_type.is_static() {
                self.linvel = Vector::zeros();
                self.angvel = 0.0;
            }
            self.update_inv_mass_properties();
            self.reset_forces();
            self.wake_up(true);
        }
    }

    /// Is this body dynamic?
    pub fn is_dynamic(&self) -> bool {
        self.rb_type.is_dynamic()
    }

    /// Is this body kinematic?
    pub fn is_kinematic(&self) -> bool {
        self.rb_type.is_kinematic()
    }

    /// Is this body static?
    pub fn is_static(&self) -> bool {
        self.rb_type.is_static()
    }

    /// The mass of this rigid body.
    ///
    /// This is zero for static and kinematic bodies.
    pub fn mass(&self) -> Real {
        if self.is_dynamic() {
            self.mass
        } else {
            0.0
        }
    }

    /// The inverse mass of this rigid body, zero for static and kinematic bodies.
    pub fn inv_mass(&self) -> Real {
        self.inv_mass
    }

    /// The rotational inertia of this body, about its center of mass.
    pub fn inertia(&self) -> Real {
        self.inertia
    }

    /// The inverse rotational inertia of this body, zero if its rotations are locked.
    pub fn inv_inertia(&self) -> Real {
        self.inv_inertia
    }

    /// Sets the mass, the rotational inertia (about the center of mass), and the local center
    /// of mass of this body.
    ///
    /// A dynamic body with a non-positive mass is given a unit mass instead.
    pub fn set_mass_properties(
        &mut self,
        mass: Real,
        inertia: Real,
        local_com: Point<Real>,
        wake_up: bool,
    ) {
        let pos = self.position();
        self.mass = mass;
        self.inertia = inertia;
        self.local_com = local_com;
        // The origin of the body stays where it is, its center of mass moves.
        self.center = pos * local_com;
        self.update_inv_mass_properties();

        if wake_up {
            self.wake_up(true);
        }
    }

    fn update_inv_mass_properties(&mut self) {
        if !self.is_dynamic() {
            self.inv_mass = 0.0;
            self.inv_inertia = 0.0;
            return;
        }

        if self.mass <= 0.0 {
            self.mass = 1.0;
        }
        self.inv_mass = 1.0 / self.mass;
        self.inv_inertia = utils::inv(self.inertia.max(0.0));
    }

    /// The world-space position of this rigid-body's origin.
    #[inline]
    pub fn position(&self) -> Isometry<Real> {
        let rot = Rotation::new(self.angle);
        Isometry::from_parts((self.center - rot * self.local_com).into(), rot)
    }

    /// Teleports this body so that its origin is at `pos`.
    ///
    /// If `wake_up` is `true` then the rigid-body will be woken up if it was
    /// put to sleep because it did not move for a while.
    pub fn set_position(&mut self, pos: Isometry<Real>, wake_up: bool) {
        self.angle = pos.rotation.angle();
        self.center = pos * self.local_com;

        if wake_up {
            self.wake_up(true)
        }
    }

    /// The world-space center of mass of this body.
    #[inline]
    pub fn center_of_mass(&self) -> &Point<Real> {
        &self.center
    }

    /// The center of mass of this body, expressed in its local frame.
    #[inline]
    pub fn local_center_of_mass(&self) -> &Point<Real> {
        &self.local_com
    }

    /// The rotation angle of this body.
    ///
    /// This is not restricted to `[-π, π]`: it accumulates every turn the body made.
    #[inline]
    pub fn angle(&self) -> Real {
        self.angle
    }

    /// Transforms a point expressed in the local-space of this body to world-space.
    pub fn world_point(&self, local_point: &Point<Real>) -> Point<Real> {
        self.position() * local_point
    }

    /// Transforms a point expressed in world-space to the local-space of this body.
    pub fn local_point(&self, world_point: &Point<Real>) -> Point<Real> {
        self.position().inverse_transform_point(world_point)
    }

    /// Transforms a vector expressed in the local-space of this body to world-space.
    pub fn world_vector(&self, local_vector: &Vector<Real>) -> Vector<Real> {
        Rotation::new(self.angle) * local_vector
    }

    /// Transforms a vector expressed in world-space to the local-space of this body.
    pub fn local_vector(&self, world_vector: &Vector<Real>) -> Vector<Real> {
        Rotation::new(self.angle).inverse_transform_vector(world_vector)
    }

    /// The linear velocity of this rigid-body's center of mass.
    pub fn linvel(&self) -> &Vector<Real> {
        &self.linvel
    }

    /// The angular velocity of this rigid-body.
    pub fn angvel(&self) -> Real {
        self.angvel
    }

    /// Sets the linear velocity of this rigid-body.
    ///
    /// This does nothing on static bodies.
    pub fn set_linvel(&mut self, linvel: Vector<Real>, wake_up: bool) {
        if self.is_static() {
            return;
        }

        self.linvel = linvel;

        if wake_up && !linvel.is_zero() {
            self.wake_up(true)
        }
    }

    /// Sets the angular velocity of this rigid-body.
    ///
    /// This does nothing on static bodies.
    pub fn set_angvel(&mut self, angvel: Real, wake_up: bool) {
        if self.is_static() {
            return;
        }

        self.angvel = angvel;

        if wake_up && angvel != 0.0 {
            self.wake_up(true)
        }
    }

    /// The velocity of the given world-space point on this rigid-body.
    pub fn velocity_at_point(&self, point: &Point<Real>) -> Vector<Real> {
        self.linvel + self.angvel.gcross(point - self.center)
    }

    /// The kinetic energy of this body.
    pub fn kinetic_energy(&self) -> Real {
        0.5 * (self.mass() * self.linvel.norm_squared() + self.inertia * self.angvel * self.angvel)
    }

    #[inline]
    /// The linear damping coefficient of this body.
    pub fn linear_damping(&self) -> Real {
        self.linear_damping
    }

    #[inline]
    /// Sets the linear damping coefficient of this body.
    pub fn set_linear_damping(&mut self, damping: Real) {
        self.linear_damping = damping;
    }

    #[inline]
    /// The angular damping coefficient of this body.
    pub fn angular_damping(&self) -> Real {
        self.angular_damping
    }

    #[inline]
    /// Sets the angular damping coefficient of this body.
    pub fn set_angular_damping(&mut self, damping: Real) {
        self.angular_damping = damping
    }

    /// The scale factor applied to the gravity affecting this rigid-body.
    pub fn gravity_scale(&self) -> Real {
        self.gravity_scale
    }

    /// Sets the gravity scale facter for this rigid-body.
    pub fn set_gravity_scale(&mut self, scale: Real, wake_up: bool) {
        if wake_up && self.gravity_scale != scale {
            self.wake_up(true);
        }

        self.gravity_scale = scale;
    }

    /// The activation status of this rigid-body.
    pub fn activation(&self) -> &RigidBodyActivation {
        &self.activation
    }

    /// Mutable reference to the activation status of this rigid-body.
    pub fn activation_mut(&mut self) -> &mut RigidBodyActivation {
        &mut self.activation
    }

    /// Put this rigid body to sleep.
    ///
    /// A sleeping body no longer moves and is no longer simulated by the physics engine unless
    /// it is waken up.
    pub fn sleep(&mut self) {
        self.activation.sleep();
        self.linvel = Vector::zeros();
        self.angvel = 0.0;
        self.reset_forces();
    }

    /// Wakes up this rigid body if it is sleeping.
    ///
    /// If `strong` is `true` then the sleep timer is reset as well, ensuring the body
    /// remains awake for at least `time_to_sleep` seconds.
    pub fn wake_up(&mut self, strong: bool) {
        if self.is_static() {
            return;
        }

        self.activation.sleeping = false;

        if strong {
            self.activation.time_since_can_sleep = 0.0;
        }
    }

    /// Is this rigid body sleeping?
    pub fn is_sleeping(&self) -> bool {
        self.activation.sleeping
    }

    /// Is the velocity of this body not zero?
    pub fn is_moving(&self) -> bool {
        !self.linvel.is_zero() || !self.angvel.is_zero()
    }
}

/// ## Applying forces and torques
impl RigidBody {
    /// Resets to zero all the constant (linear) forces manually applied to this rigid-body.
    pub fn reset_forces(&mut self) {
        self.force = Vector::zeros();
        self.torque = 0.0;
    }

    /// The accumulated force that will be applied at the next step.
    pub fn user_force(&self) -> Vector<Real> {
        self.force
    }

    /// The accumulated torque that will be applied at the next step.
    pub fn user_torque(&self) -> Real {
        self.torque
    }

    /// Applies a force at the center-of-mass of this rigid-body.
    /// The force will be applied in the next simulation step.
    /// This does nothing on non-dynamic bodies.
    pub fn apply_force(&mut self, force: Vector<Real>, wake_up: bool) {
        if self.is_dynamic() {
            self.force += force;

            if wake_up {
                self.wake_up(true);
            }
        }
    }

    /// Applies a torque at the center-of-mass of this rigid-body.
    /// The torque will be applied in the next simulation step.
    /// This does nothing on non-dynamic bodies.
    pub fn apply_torque(&mut self, torque: Real, wake_up: bool) {
        if self.is_dynamic() {
            self.torque += torque;

            if wake_up {
                self.wake_up(true);
            }
        }
    }

    /// Applies a force at the given world-space point of this rigid-body.
    /// The force will be applied in the next simulation step.
    /// This does nothing on non-dynamic bodies.
    pub fn apply_force_at_point(&mut self, force: Vector<Real>, point: Point<Real>, wake_up: bool) {
        if self.is_dynamic() {
            self.force += force;
            self.torque += (point - self.center).gcross(force);

            if wake_up {
                self.wake_up(true);
            }
        }
    }

    /// Applies an impulse at the center-of-mass of this rigid-body.
    /// The impulse is applied right away, changing the linear velocity.
    /// This does nothing on non-dynamic bodies.
    pub fn apply_impulse(&mut self, impulse: Vector<Real>, wake_up: bool) {
        if self.is_dynamic() {
            self.linvel += impulse * self.inv_mass;

            if wake_up {
                self.wake_up(true);
            }
        }
    }

    /// Applies an angular impulse at the center-of-mass of this rigid-body.
    /// The impulse is applied right away, changing the angular velocity.
    /// This does nothing on non-dynamic bodies.
    pub fn apply_torque_impulse(&mut self, torque_impulse: Real, wake_up: bool) {
        if self.is_dynamic() {
            self.angvel += self.inv_inertia * torque_impulse;

            if wake_up {
                self.wake_up(true);
            }
        }
    }

    /// Applies an impulse at the given world-space point of this rigid-body.
    /// The impulse is applied right away, changing the linear and/or angular velocities.
    /// This does nothing on non-dynamic bodies.
    pub fn apply_impulse_at_point(
        &mut self,
        impulse: Vector<Real>,
        point: Point<Real>,
        wake_up: bool,
    ) {
        let torque_impulse = (point - self.center).gcross(impulse);
        self.apply_impulse(impulse, wake_up);
        self.apply_torque_impulse(torque_impulse, wake_up);
    }
}

/// A builder for rigid-bodies.
#[derive(Clone, Debug, PartialEq)]
#[must_use = "Builder functions return the updated builder"]
pub struct RigidBodyBuilder {
    position: Isometry<Real>,
    linvel: Vector<Real>,
    angvel: AngVector<Real>,
    gravity_scale: Real,
    linear_damping: Real,
    angular_damping: Real,
    rb_type: RigidBodyType,
    mass: Real,
    inertia: Real,
    local_com: Point<Real>,
    rotations_locked: bool,
    can_sleep: bool,
    sleeping: bool,
    user_data: u128,
}

impl RigidBodyBuilder {
    /// Initialize a new builder for a rigid body which is either static, dynamic, or kinematic.
    pub fn new(rb_type: RigidBodyType) -> Self {
        Self {
            position: Isometry::identity(),
            linvel: Vector::zeros(),
            angvel: na::zero(),
            gravity_scale: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            rb_type,
            mass: 1.0,
            inertia: 1.0,
            local_com: Point::origin(),
            rotations_locked: false,
            can_sleep: true,
            sleeping: false,
            user_data: 0,
        }
    }

    /// Initializes the builder of a new static rigid body.
    pub fn new_static() -> Self {
        Self::new(RigidBodyType::Static)
    }

    /// Initializes the builder of a new kinematic rigid body.
    pub fn new_kinematic() -> Self {
        Self::new(RigidBodyType::Kinematic)
    }

    /// Initializes the builder of a new dynamic rigid body.
    pub fn new_dynamic() -> Self {
        Self::new(RigidBodyType::Dynamic)
    }

    /// Sets the scale applied to the gravity force affecting the rigid-body to be created.
    pub fn gravity_scale(mut self, x: Real) -> Self {
        self.gravity_scale = x;
        self
    }

    /// Sets the initial translation of the rigid-body to be created.
    pub fn translation(mut self, x: Real, y: Real) -> Self {
        self.position.translation.x = x;
        self.position.translation.y = y;
        self
    }

    /// Sets the initial orientation of the rigid-body to be created.
    pub fn rotation(mut self, angle: AngVector<Real>) -> Self {
        self.position.rotation = Rotation::new(angle);
        self
    }

    /// Sets the initial position (translation and orientation) of the rigid-body to be created.
    pub fn position(mut self, pos: Isometry<Real>) -> Self {
        self.position = pos;
        self
    }

    /// An arbitrary user-defined 128-bit integer associated to the rigid-bodies built by this builder.
    pub fn user_data(mut self, data: u128) -> Self {
        self.user_data = data;
        self
    }

    /// Sets the mass of the rigid-body being built (default: `1.0`).
    pub fn mass(mut self, mass: Real) -> Self {
        self.mass = mass;
        self
    }

    /// Sets the rotational inertia, about the center of mass, of the rigid-body being built
    /// (default: `1.0`).
    pub fn principal_inertia(mut self, inertia: Real) -> Self {
        self.inertia = inertia;
        self
    }

    /// Sets the center of mass of the rigid-body being built, in its local frame.
    pub fn local_center_of_mass(mut self, local_com: Point<Real>) -> Self {
        self.local_com = local_com;
        self
    }

    /// Prevents this rigid-body from rotating because of forces and joints.
    pub fn lock_rotations(mut self) -> Self {
        self.rotations_locked = true;
        self
    }

    /// Sets the damping factor for the linear part of the rigid-body motion.
    ///
    /// The higher the linear damping factor is, the more quickly the rigid-body
    /// will slow-down its translational movement.
    pub fn linear_damping(mut self, factor: Real) -> Self {
        self.linear_damping = factor;
        self
    }

    /// Sets the damping factor for the angular part of the rigid-body motion.
    ///
    /// The higher the angular damping factor is, the more quickly the rigid-body
    /// will slow-down its rotational movement.
    pub fn angular_damping(mut self, factor: Real) -> Self {
        self.angular_damping = factor;
        self
    }

    /// Sets the initial linear velocity of the rigid-body to be created.
    pub fn linvel(mut self, x: Real, y: Real) -> Self {
        self.linvel = Vector::new(x, y);
        self
    }

    /// Sets the initial angular velocity of the rigid-body to be created.
    pub fn angvel(mut self, angvel: AngVector<Real>) -> Self {
        self.angvel = angvel;
        self
    }

    /// Sets whether or not the rigid-body to be created can sleep if it reaches a dynamic equilibrium.
    pub fn can_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }

    /// Sets whether or not the rigid-body is to be created asleep.
    pub fn sleeping(mut self, sleeping: bool) -> Self {
        self.sleeping = sleeping;
        self
    }

    /// Build a new rigid-body with the parameters configured with this builder.
    pub fn build(&self) -> RigidBody {
        let mut activation = if self.can_sleep {
            RigidBodyActivation::active()
        } else {
            RigidBodyActivation::cannot_sleep()
        };
        activation.sleeping = self.sleeping && self.can_sleep && !self.rb_type.is_static();

        let (linvel, angvel) = if self.rb_type.is_static() {
            (Vector::zeros(), 0.0)
        } else {
            (self.linvel, self.angvel)
        };

        let mut rb = RigidBody {
            center: self.position * self.local_com,
            angle: self.position.rotation.angle(),
            local_com: self.local_com,
            linvel,
            angvel,
            mass: self.mass,
            inertia: if self.rotations_locked {
                0.0
            } else {
                self.inertia
            },
            inv_mass: 0.0,
            inv_inertia: 0.0,
            force: Vector::zeros(),
            torque: 0.0,
            linear_damping: self.linear_damping,
            angular_damping: self.angular_damping,
            gravity_scale: self.gravity_scale,
            rb_type: self.rb_type,
            activation,
            user_data: self.user_data,
        };
        rb.update_inv_mass_properties();
        rb
    }
}

impl From<RigidBodyBuilder> for RigidBody {
    fn from(val: RigidBodyBuilder) -> RigidBody {
        val.build()
    }
}

#[cfg(test)]
mod test {
    use super::RigidBodyBuilder;
    use crate::math::{Isometry, Point, Real, Vector};
    use approx::assert_relative_eq;

    #[test]
    fn pose_is_tracked_through_the_center_of_mass() {
        let mut rb = RigidBodyBuilder::new_dynamic()
            .translation(1.0, 2.0)
            .rotation(0.5)
            .local_center_of_mass(Point::new(1.0, 0.0))
            .build();

        let expected = Isometry::new(Vector::new(1.0, 2.0), 0.5);
        assert_relative_eq!(rb.position(), expected, epsilon = 1.0e-6);
        assert_relative_eq!(
            *rb.center_of_mass(),
            expected * Point::new(1.0, 0.0),
            epsilon = 1.0e-6
        );

        let target = Isometry::new(Vector::new(-3.0, 0.5), -1.0);
        rb.set_position(target, false);
        assert_relative_eq!(rb.position(), target, epsilon = 1.0e-5);
        let p = Point::new(0.3, -0.7);
        assert_relative_eq!(rb.local_point(&rb.world_point(&p)), p, epsilon = 1.0e-5);
    }

    #[test]
    fn non_dynamic_bodies_have_infinite_mass() {
        let rb = RigidBodyBuilder::new_static().mass(3.0).build();
        assert_eq!(rb.inv_mass(), 0.0);
        assert_eq!(rb.inv_inertia(), 0.0);
        assert_eq!(rb.mass(), 0.0);

        let mut rb = RigidBodyBuilder::new_dynamic().mass(0.0).lock_rotations().build();
        assert_eq!(rb.inv_mass(), 1.0);
        assert_eq!(rb.inv_inertia(), 0.0);

        rb.set_body_type(crate::dynamics::RigidBodyType::Kinematic);
        assert_eq!(rb.inv_mass(), 0.0);
    }

    #[test]
    fn impulses_change_velocities() {
        let mut rb = RigidBodyBuilder::new_dynamic()
            .mass(2.0)
            .principal_inertia(0.5)
            .build();
        rb.apply_impulse_at_point(Vector::new(0.0, 2.0), Point::new(1.0, 0.0), true);
        assert_relative_eq!(*rb.linvel(), Vector::new(0.0, 1.0));
        assert_relative_eq!(rb.angvel(), 4.0 as Real);
        assert_relative_eq!(
            rb.velocity_at_point(&Point::new(1.0, 0.0)),
            Vector::new(0.0, 5.0)
        );

        rb.sleep();
        assert!(rb.is_sleeping());
        assert!(!rb.is_moving());
    }
}
