use crate::data::HashMap;
use crate::dynamics::{RigidBody, RigidBodyHandle};
use crate::math::{Isometry, Point, Real, Rotation, Vector};
use crate::utils::WCross;

/// The state of a body, as seen by the joints of the island being solved.
///
/// Joints read the pose and velocities of their bodies through this structure and write back
/// new velocities (during velocity iterations) or a corrected pose (during position iterations).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SolverBody {
    /// The world-space center of mass.
    pub center: Point<Real>,
    /// The rotation angle, never wrapped.
    pub angle: Real,
    /// The center of mass in the local frame of the body.
    pub local_com: Point<Real>,
    /// The linear velocity of the center of mass.
    pub linvel: Vector<Real>,
    /// The angular velocity.
    pub angvel: Real,
    /// The inverse mass, zero for non-dynamic bodies.
    pub inv_mass: Real,
    /// The inverse rotational inertia, zero for non-dynamic bodies.
    pub inv_inertia: Real,
}

impl Default for SolverBody {
    fn default() -> Self {
        Self::ground()
    }
}

impl SolverBody {
    /// The world frame: an immovable body located at the origin.
    ///
    /// This is the first body of joints attached to a fixed anchor, so their first anchor and
    /// axis are directly expressed in world-space.
    pub fn ground() -> Self {
        Self {
            center: Point::origin(),
            angle: 0.0,
            local_com: Point::origin(),
            linvel: Vector::zeros(),
            angvel: 0.0,
            inv_mass: 0.0,
            inv_inertia: 0.0,
        }
    }

    /// A body with its center of mass at its origin.
    pub fn new(center: Point<Real>, angle: Real, inv_mass: Real, inv_inertia: Real) -> Self {
        Self {
            center,
            angle,
            inv_mass,
            inv_inertia,
            ..Self::ground()
        }
    }

    /// The state of a rigid-body at the beginning of a step.
    pub fn from_rigid_body(rb: &RigidBody) -> Self {
        Self {
            center: rb.center,
            angle: rb.angle,
            local_com: rb.local_com,
            linvel: rb.linvel,
            angvel: rb.angvel,
            inv_mass: rb.inv_mass,
            inv_inertia: rb.inv_inertia,
        }
    }

    /// Copies the pose and velocities back into the rigid-body this was created from.
    pub fn write_back(&self, rb: &mut RigidBody) {
        rb.center = self.center;
        rb.angle = self.angle;
        rb.linvel = self.linvel;
        rb.angvel = self.angvel;
    }

    /// The orientation of this body.
    #[inline]
    pub fn rotation(&self) -> Rotation<Real> {
        Rotation::new(self.angle)
    }

    /// The world-space position of this body's origin.
    #[inline]
    pub fn position(&self) -> Isometry<Real> {
        let rot = self.rotation();
        Isometry::from_parts((self.center - rot * self.local_com).into(), rot)
    }

    /// The lever arm from the center of mass to a point given in the local frame of this body.
    #[inline]
    pub fn arm(&self, local_anchor: &Point<Real>) -> Vector<Real> {
        self.rotation() * (local_anchor - self.local_com)
    }

    /// The world-space position of a point given in the local frame of this body.
    #[inline]
    pub fn world_point(&self, local_point: &Point<Real>) -> Point<Real> {
        self.center + self.arm(local_point)
    }

    /// The world-space direction of a vector given in the local frame of this body.
    #[inline]
    pub fn world_vector(&self, local_vector: &Vector<Real>) -> Vector<Real> {
        self.rotation() * local_vector
    }

    /// The velocity of the point at the end of the lever arm `arm`.
    #[inline]
    pub fn velocity_at(&self, arm: &Vector<Real>) -> Vector<Real> {
        self.linvel + self.angvel.gcross(*arm)
    }

    /// Applies the impulse `impulse` at the end of the lever arm `arm`.
    #[inline]
    pub fn apply_impulse(&mut self, impulse: Vector<Real>, arm: &Vector<Real>) {
        self.linvel += impulse * self.inv_mass;
        self.angvel += self.inv_inertia * arm.gcross(impulse);
    }

    /// Displaces this body by the position impulse `impulse` applied at the end of `arm`.
    #[inline]
    pub fn apply_position_impulse(&mut self, impulse: Vector<Real>, arm: &Vector<Real>) {
        self.center += impulse * self.inv_mass;
        self.angle += self.inv_inertia * arm.gcross(impulse);
    }
}

/// The identifier of a body inside of a [`SolverBodySet`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SolverBodyId {
    /// The world frame, see [`SolverBody::ground`].
    Ground,
    /// The i-th body of the set.
    Index(usize),
}

/// The bodies of one island, copied out of the `RigidBodySet` for the duration of a step.
#[derive(Clone, Debug, Default)]
pub struct SolverBodySet {
    pub(crate) bodies: Vec<SolverBody>,
    pub(crate) handles: Vec<RigidBodyHandle>,
    offsets: HashMap<RigidBodyHandle, usize>,
}

impl SolverBodySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every body from this set.
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.handles.clear();
        self.offsets.clear();
    }

    /// The number of bodies in this set.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Is this set empty?
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Adds a body to this set, unless a body with the same handle is already there.
    pub fn insert(&mut self, handle: RigidBodyHandle, body: SolverBody) -> SolverBodyId {
        if let Some(id) = self.offsets.get(&handle) {
            return SolverBodyId::Index(*id);
        }

        let id = self.bodies.len();
        self.bodies.push(body);
        self.handles.push(handle);
        let _ = self.offsets.insert(handle, id);
        SolverBodyId::Index(id)
    }

    /// The identifier of the body with the given handle, or `None` for the world frame.
    ///
    /// A handle that is not part of this set maps to the world frame.
    pub fn id(&self, handle: Option<RigidBodyHandle>) -> SolverBodyId {
        match handle.and_then(|h| self.offsets.get(&h)) {
            Some(id) => SolverBodyId::Index(*id),
            None => {
                if let Some(handle) = handle {
                    log::warn!("Body {:?} is not part of the island being solved.", handle);
                }
                SolverBodyId::Ground
            }
        }
    }

    /// The current state of the given body.
    #[inline]
    pub fn get(&self, id: SolverBodyId) -> SolverBody {
        match id {
            SolverBodyId::Ground => SolverBody::ground(),
            SolverBodyId::Index(i) => self.bodies[i],
        }
    }

    /// Overwrites the state of the given body.
    ///
    /// Writes to the world frame are ignored.
    #[inline]
    pub fn set(&mut self, id: SolverBodyId, body: &SolverBody) {
        if let SolverBodyId::Index(i) = id {
            self.bodies[i] = *body;
        }
    }

    /// Iterates through the handles and states of every body of this set.
    pub fn iter(&self) -> impl Iterator<Item = (RigidBodyHandle, &SolverBody)> {
        self.handles.iter().copied().zip(self.bodies.iter())
    }
}

/// The two bodies a joint acts on, within the set of bodies of its island.
///
/// Joints copy their bodies out with [`JointBodies::pair`], update the copies, and store them
/// back with [`JointBodies::set_pair`]. When both sides refer to the same body, the second one
/// is written last and wins.
pub struct JointBodies<'a> {
    set: &'a mut SolverBodySet,
    ids: [SolverBodyId; 2],
}

impl<'a> JointBodies<'a> {
    /// The pair of bodies `ids` of `set`.
    pub fn new(set: &'a mut SolverBodySet, ids: [SolverBodyId; 2]) -> Self {
        Self { set, ids }
    }

    /// The identifiers of both bodies.
    pub fn ids(&self) -> [SolverBodyId; 2] {
        self.ids
    }

    /// Copies of both bodies.
    #[inline]
    pub fn pair(&self) -> (SolverBody, SolverBody) {
        (self.set.get(self.ids[0]), self.set.get(self.ids[1]))
    }

    /// Stores both bodies back into the set.
    #[inline]
    pub fn set_pair(&mut self, body1: &SolverBody, body2: &SolverBody) {
        self.set.set(self.ids[0], body1);
        self.set.set(self.ids[1], body2);
    }

    /// A copy of another body of the island, e.g., the static ground of a joint coupled by a gear.
    ///
    /// `None` is the world frame.
    pub fn other(&self, handle: Option<RigidBodyHandle>) -> SolverBody {
        self.set.get(self.set.id(handle))
    }
}

#[cfg(test)]
mod test {
    use super::{JointBodies, SolverBody, SolverBodyId, SolverBodySet};
    use crate::dynamics::{RigidBodyBuilder, RigidBodyHandle};
    use crate::math::{Point, Vector};
    use approx::assert_relative_eq;

    #[test]
    fn ground_is_immovable() {
        let mut set = SolverBodySet::new();
        let h = RigidBodyHandle::from_raw_parts(0, 0);
        let id = set.insert(h, SolverBody::new(Point::new(1.0, 2.0), 0.0, 1.0, 1.0));
        assert_eq!(set.insert(h, SolverBody::ground()), id);

        let mut bodies = JointBodies::new(&mut set, [SolverBodyId::Ground, id]);
        let (mut b1, mut b2) = bodies.pair();
        b1.linvel = Vector::new(1.0, 0.0);
        b2.linvel = Vector::new(0.0, 1.0);
        bodies.set_pair(&b1, &b2);

        assert_eq!(set.get(SolverBodyId::Ground), SolverBody::ground());
        assert_eq!(set.get(id).linvel, Vector::new(0.0, 1.0));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn arms_account_for_the_center_of_mass() {
        let rb = RigidBodyBuilder::new_dynamic()
            .translation(1.0, 0.0)
            .rotation(std::f32::consts::FRAC_PI_2)
            .local_center_of_mass(Point::new(1.0, 0.0))
            .build();
        let body = SolverBody::from_rigid_body(&rb);

        // The local point (2, 0) lies one unit past the center of mass along the body's x axis.
        assert_relative_eq!(
            body.arm(&Point::new(2.0, 0.0)),
            Vector::new(0.0, 1.0),
            epsilon = 1.0e-6
        );
        assert_relative_eq!(
            body.world_point(&Point::new(2.0, 0.0)),
            rb.world_point(&Point::new(2.0, 0.0)),
            epsilon = 1.0e-6
        );
        assert_relative_eq!(body.position(), rb.position(), epsilon = 1.0e-6);
    }
}
