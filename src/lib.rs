//! # joint2d
//!
//! `joint2d` is the constraint-solving core of a 2-dimensional rigid-body physics engine.
//! It implements the classic sequential-impulse joint solver: every joint builds its
//! Jacobians once per step, is warm-started with the impulses it accumulated during the
//! previous step, is solved iteratively at the velocity level, and finally has its residual
//! geometric error removed by a position-correction pass.
//!
//! Bodies are stored in a [`RigidBodySet`](dynamics::RigidBodySet), joints in a
//! [`JointSet`](dynamics::JointSet), and the [`PhysicsPipeline`](pipeline::PhysicsPipeline)
//! advances the whole simulation by one timestep. Collision detection is not part of this
//! crate.

#![deny(bare_trait_objects)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::module_inception)]

pub extern crate nalgebra as na;
#[cfg(feature = "serde-serialize")]
#[macro_use]
extern crate serde;
extern crate num_traits as num;

#[cfg(feature = "parallel")]
pub use rayon;

macro_rules! par_iter_mut {
    ($t: expr) => {{
        #[cfg(not(feature = "parallel"))]
        let it = $t.iter_mut();

        #[cfg(feature = "parallel")]
        let it = $t.par_iter_mut();
        it
    }};
}

pub(crate) const INVALID_U32: u32 = u32::MAX;

/// The string version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod counters;
pub mod data;
pub mod dynamics;
pub mod pipeline;
pub mod utils;

/// Elementary mathematical entities (vectors, matrices, isometries, etc).
pub mod math {
    /// The scalar type used throughout this crate.
    pub type Real = f32;

    /// The default tolerance used for geometric operations.
    pub const DEFAULT_EPSILON: Real = Real::EPSILON;

    /// The dimension of the space.
    pub const DIM: usize = 2;

    /// The vector type.
    pub type Vector<N> = na::Vector2<N>;

    /// The point type.
    pub type Point<N> = na::Point2<N>;

    /// The rotation type.
    pub type Rotation<N> = na::UnitComplex<N>;

    /// The translation type.
    pub type Translation<N> = na::Translation2<N>;

    /// The transformation matrix type (rotation followed by a translation).
    pub type Isometry<N> = na::Isometry2<N>;

    /// The angular vector type. In 2D this is just a scalar.
    pub type AngVector<N> = N;

    /// The angular inertia of a rigid body. In 2D this is just a scalar.
    pub type AngularInertia<N> = N;

    /// A 2x2 matrix, used for the effective mass of two coupled degrees of freedom.
    pub type Matrix2<N> = na::Matrix2<N>;

    /// A 3x3 matrix, used for the effective mass of three coupled degrees of freedom.
    pub type Matrix3<N> = na::Matrix3<N>;
}

/// Prelude containing the common types defined by this crate.
pub mod prelude {
    pub use crate::dynamics::*;
    pub use crate::math::*;
    pub use crate::pipeline::*;
    pub use na::{point, vector};
}
