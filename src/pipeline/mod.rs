//! Structure for combining the various physics components to perform an actual simulation.

pub use event_handler::{ChannelEventCollector, EventHandler, JointEvent};
pub use physics_pipeline::PhysicsPipeline;

mod event_handler;
mod physics_pipeline;
