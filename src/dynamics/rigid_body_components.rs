use crate::math::Real;

/// The unique handle of a rigid body added to a `RigidBodySet`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct RigidBodyHandle(pub crate::data::arena::Index);

impl RigidBodyHandle {
    /// Converts this handle into its (index, generation) components.
    pub fn into_raw_parts(self) -> (u32, u32) {
        self.0.into_raw_parts()
    }

    /// Reconstructs an handle from its (index, generation) components.
    pub fn from_raw_parts(id: u32, generation: u32) -> Self {
        Self(crate::data::arena::Index::from_raw_parts(id, generation))
    }

    /// An always-invalid rigid-body handle.
    pub fn invalid() -> Self {
        Self(crate::data::arena::Index::invalid())
    }
}

/// The type of a body, governing the way it is affected by external forces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum RigidBodyType {
    /// A `RigidBodyType::Dynamic` body can be affected by all external forces and joints.
    Dynamic,
    /// A `RigidBodyType::Static` body cannot be affected by external forces and never moves.
    Static,
    /// A `RigidBodyType::Kinematic` body cannot be affected by any external forces or joints
    /// but moves with the velocity set by the user.
    Kinematic,
}

impl RigidBodyType {
    /// Is this rigid-body static (i.e. cannot move)?
    pub fn is_static(self) -> bool {
        self == RigidBodyType::Static
    }

    /// Is this rigid-body dynamic (i.e. can move and be affected by forces)?
    pub fn is_dynamic(self) -> bool {
        self == RigidBodyType::Dynamic
    }

    /// Is this rigid-body kinematic (i.e. moves only with its user-defined velocity)?
    pub fn is_kinematic(self) -> bool {
        self == RigidBodyType::Kinematic
    }
}

/// The activation (sleep) state of a rigid body.
///
/// Whole islands fall asleep together: every body of an island must have stayed below the
/// sleep tolerances of the [`IntegrationParameters`](crate::dynamics::IntegrationParameters)
/// for `time_to_sleep` seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct RigidBodyActivation {
    /// How long this body has been below the sleep tolerances.
    pub time_since_can_sleep: Real,
    /// Is this body currently sleeping?
    pub sleeping: bool,
    /// Can this body (and hence its island) ever fall asleep?
    pub can_sleep: bool,
}

impl Default for RigidBodyActivation {
    fn default() -> Self {
        Self::active()
    }
}

impl RigidBodyActivation {
    /// An awake activation state.
    pub fn active() -> Self {
        RigidBodyActivation {
            time_since_can_sleep: 0.0,
            sleeping: false,
            can_sleep: true,
        }
    }

    /// A sleeping activation state.
    pub fn inactive() -> Self {
        RigidBodyActivation {
            sleeping: true,
            ..Self::active()
        }
    }

    /// An activation state that never falls asleep.
    pub fn cannot_sleep() -> Self {
        RigidBodyActivation {
            can_sleep: false,
            ..Self::active()
        }
    }

    /// Returns `true` if the body is not asleep.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.sleeping
    }

    /// Wakes up this rigid-body and resets its sleep timer.
    #[inline]
    pub fn wake_up(&mut self) {
        self.sleeping = false;
        self.time_since_can_sleep = 0.0;
    }

    /// Put this rigid-body to sleep.
    #[inline]
    pub fn sleep(&mut self) {
        self.sleeping = true;
        self.time_since_can_sleep = 0.0;
    }
}
