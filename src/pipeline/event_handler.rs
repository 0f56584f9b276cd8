use crate::dynamics::JointHandle;
use std::sync::mpsc::Sender;

/// Events occurring to joints during a step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum JointEvent {
    /// The reaction force of this joint exceeded its break force.
    ///
    /// The joint has already been removed from its `JointSet` when this event is emitted.
    Broken(JointHandle),
}

impl JointEvent {
    /// The joint this event occurred to.
    pub fn joint(self) -> JointHandle {
        match self {
            JointEvent::Broken(handle) => handle,
        }
    }
}

/// Trait implemented by structures responsible for handling events generated by the physics
/// pipeline.
pub trait EventHandler: Send + Sync {
    /// Handle a joint event.
    ///
    /// Called once per event, at the end of the step that generated it.
    fn handle_joint_event(&self, event: JointEvent);
}

impl EventHandler for () {
    fn handle_joint_event(&self, _event: JointEvent) {}
}

/// A joint event handler that collects events into a `std::sync::mpsc` channel.
pub struct ChannelEventCollector {
    joint_event_sender: Sender<JointEvent>,
}

impl ChannelEventCollector {
    /// Initialize a new joint event handler from a channel sender.
    pub fn new(joint_event_sender: Sender<JointEvent>) -> Self {
        Self { joint_event_sender }
    }
}

impl EventHandler for ChannelEventCollector {
    fn handle_joint_event(&self, event: JointEvent) {
        let _ = self.joint_event_sender.send(event);
    }
}
