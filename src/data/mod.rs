//! Data structures with deterministic iteration order.

pub use self::arena::{Arena, Index};
pub(crate) use rustc_hash::FxHashMap as HashMap;
pub(crate) use rustc_hash::FxHashSet as HashSet;

pub mod arena;
