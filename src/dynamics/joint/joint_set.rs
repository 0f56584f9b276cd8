use super::Joint;
use crate::data::arena::Arena;
use crate::dynamics::{JointError, JointParams, RigidBodyHandle, RigidBodySet};
use std::ops::{Index, IndexMut};

/// The unique identifier of a joint added to the joint set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct JointHandle(pub(crate) crate::data::arena::Index);

impl JointHandle {
    /// Converts this handle into its (index, generation) components.
    pub fn into_raw_parts(self) -> (u32, u32) {
        self.0.into_raw_parts()
    }

    /// Reconstructs an handle from its (index, generation) components.
    pub fn from_raw_parts(id: u32, generation: u32) -> Self {
        Self(crate::data::arena::Index::from_raw_parts(id, generation))
    }

    /// An always-invalid joint handle.
    pub fn invalid() -> Self {
        Self(crate::data::arena::Index::invalid())
    }
}

#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Clone, Default, Debug)]
/// A set of joints that can be handled by a physics pipeline.
pub struct JointSet {
    joints: Arena<Joint>,
    // Joints accessed mutably since the last step, whose bodies must be woken up.
    modified_joints: Vec<JointHandle>,
}

impl JointSet {
    /// Creates a new empty set of joints.
    pub fn new() -> Self {
        Self {
            joints: Arena::new(),
            modified_joints: vec![],
        }
    }

    /// The number of joints on this set.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// `true` if there are no joints in this set.
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Is the given joint handle valid?
    pub fn contains(&self, handle: JointHandle) -> bool {
        self.joints.contains(handle.0)
    }

    /// Gets the joint with the given handle.
    pub fn get(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle.0)
    }

    /// Gets a mutable reference to the joint with the given handle.
    ///
    /// The bodies attached to this joint will be woken up at the beginning of the next step.
    pub fn get_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        let joint = self.joints.get_mut(handle.0)?;
        if !self.modified_joints.contains(&handle) {
            self.modified_joints.push(handle);
        }
        Some(joint)
    }

    /// Iterates through all the joints on this set.
    pub fn iter(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter().map(|(h, j)| (JointHandle(h), j))
    }

    /// Iterates mutably through all the joints on this set.
    ///
    /// Unlike [`Self::get_mut`], this does not wake up the attached bodies.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (JointHandle, &mut Joint)> {
        self.joints.iter_mut().map(|(h, j)| (JointHandle(h), j))
    }

    pub(crate) fn take_modified(&mut self) -> Vec<JointHandle> {
        std::mem::take(&mut self.modified_joints)
    }

    /// Inserts a new joint into this set and retrieve its handle.
    ///
    /// Every body the joint is attached to must be part of `bodies`, and is woken up. A mouse
    /// joint must be attached to a fixed anchor, and the grounds of the joints coupled by a
    /// gear must be static.
    pub fn insert(
        &mut self,
        joint: impl Into<Joint>,
        bodies: &mut RigidBodySet,
    ) -> Result<JointHandle, JointError> {
        let joint = joint.into();

        for handle in joint.attached_bodies() {
            if !bodies.contains(handle) {
                return Err(JointError::InvalidBody(handle));
            }
        }

        match &joint.params {
            JointParams::MouseJoint(_) if !joint.attachment.is_fixed_anchor() => {
                return Err(JointError::FixedAnchorRequired);
            }
            JointParams::GearJoint(gear) => {
                for ground in gear.grounds().into_iter().flatten() {
                    if !bodies[ground].is_static() {
                        return Err(JointError::DynamicGearGround);
                    }
                }
            }
            _ => {}
        }

        for handle in joint.attached_bodies() {
            bodies.wake_up(handle, true);
        }

        let handle = JointHandle(self.joints.insert(joint));
        self.joints[handle.0].handle = handle;
        log::debug!("Inserted joint {:?}.", handle);
        Ok(handle)
    }

    /// Removes a joint from this set.
    ///
    /// If `wake_up` is set to `true`, then the bodies attached to this joint will be
    /// automatically woken up.
    pub fn remove(
        &mut self,
        handle: JointHandle,
        bodies: &mut RigidBodySet,
        wake_up: bool,
    ) -> Option<Joint> {
        let joint = self.joints.remove(handle.0)?;
        self.modified_joints.retain(|h| *h != handle);

        if wake_up {
            for body in joint.attached_bodies() {
                bodies.wake_up(body, true);
            }
        }

        Some(joint)
    }

    /// Removes every joint attached to the given rigid-body, waking up their other bodies.
    pub(crate) fn remove_joints_attached_to_rigid_body(
        &mut self,
        handle: RigidBodyHandle,
        bodies: &mut RigidBodySet,
    ) -> Vec<Joint> {
        let to_remove: Vec<_> = self
            .iter()
            .filter(|(_, joint)| joint.attached_bodies().contains(&handle))
            .map(|(h, _)| h)
            .collect();

        to_remove
            .into_iter()
            .filter_map(|h| self.remove(h, bodies, true))
            .collect()
    }
}

impl Index<JointHandle> for JointSet {
    type Output = Joint;

    fn index(&self, index: JointHandle) -> &Joint {
        &self.joints[index.0]
    }
}

impl IndexMut<JointHandle> for JointSet {
    fn index_mut(&mut self, index: JointHandle) -> &mut Joint {
        if !self.modified_joints.contains(&index) {
            self.modified_joints.push(index);
        }
        &mut self.joints[index.0]
    }
}

#[cfg(test)]
mod test {
    use crate::dynamics::{
        Joint, JointError, JointSet, MouseJoint, RevoluteJoint, RigidBodyBuilder, RigidBodySet,
    };
    use crate::math::{Point, Vector};

    #[test]
    fn insert_validates_bodies() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let b1 = bodies.insert(RigidBodyBuilder::new_dynamic());
        let b2 = bodies.insert(RigidBodyBuilder::new_dynamic());
        let removed = bodies.insert(RigidBodyBuilder::new_dynamic());
        let _ = bodies.remove(removed, &mut joints);

        let revolute = RevoluteJoint::new(Point::origin(), Point::origin());
        assert_eq!(
            joints.insert(Joint::new(b1, removed, revolute), &mut bodies),
            Err(JointError::InvalidBody(removed))
        );
        assert!(joints.is_empty());

        let handle = joints.insert(Joint::new(b1, b2, revolute), &mut bodies).unwrap();
        assert_eq!(joints[handle].handle(), handle);
        assert_eq!(joints.len(), 1);

        let mouse = MouseJoint::new(Point::origin(), Point::origin());
        assert_eq!(
            joints.insert(Joint::new(b1, b2, mouse), &mut bodies),
            Err(JointError::FixedAnchorRequired)
        );
        assert!(joints.insert(Joint::fixed(b2, mouse), &mut bodies).is_ok());
    }

    #[test]
    fn removing_a_body_removes_its_joints_and_wakes_the_others() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let b1 = bodies.insert(RigidBodyBuilder::new_dynamic());
        let b2 = bodies.insert(RigidBodyBuilder::new_dynamic());
        let b3 = bodies.insert(RigidBodyBuilder::new_dynamic());
        let revolute = RevoluteJoint::new(Point::origin(), Point::origin());
        let j12 = joints.insert(Joint::new(b1, b2, revolute), &mut bodies).unwrap();
        let j23 = joints.insert(Joint::new(b2, b3, revolute), &mut bodies).unwrap();
        let j3 = joints.insert(Joint::fixed(b3, revolute), &mut bodies).unwrap();

        bodies[b1].sleep();
        bodies[b3].sleep();
        let _ = bodies.remove(b2, &mut joints);

        assert!(!joints.contains(j12));
        assert!(!joints.contains(j23));
        assert!(joints.contains(j3));
        assert!(!bodies[b1].is_sleeping());
        assert!(!bodies[b3].is_sleeping());
    }

    #[test]
    fn mutable_access_marks_the_joint_as_modified() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let b1 = bodies.insert(RigidBodyBuilder::new_dynamic().linvel(1.0, 0.0));
        let handle = joints
            .insert(
                Joint::fixed(b1, RevoluteJoint::new(Point::origin(), Point::origin())),
                &mut bodies,
            )
            .unwrap();
        assert!(joints.take_modified().is_empty());

        let _ = joints.get_mut(handle);
        joints[handle].user_data = 42;
        assert_eq!(joints.take_modified(), vec![handle]);
        assert!(joints.take_modified().is_empty());
        assert_eq!(joints[handle].reaction_force(60.0), Vector::zeros());
    }
}
