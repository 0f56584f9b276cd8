use crate::data::{HashMap, HashSet};
use crate::dynamics::{JointHandle, JointSet, RigidBodyHandle, RigidBodySet};

/// A set of bodies connected by joints, solved together.
///
/// Static bodies may belong to several islands at once: they join the islands of the bodies
/// they are jointed to, but never connect these islands together.
#[derive(Clone, Debug, Default)]
pub struct Island {
    pub(crate) bodies: Vec<RigidBodyHandle>,
    pub(crate) joints: Vec<JointHandle>,
}

impl Island {
    /// The bodies of this island, in traversal order.
    pub fn bodies(&self) -> &[RigidBodyHandle] {
        &self.bodies
    }

    /// The joints of this island, in the iteration order of the `JointSet`.
    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }
}

/// Structure responsible for partitioning the awake bodies into independent islands.
#[derive(Clone, Debug, Default)]
pub struct IslandManager {
    islands: Vec<Island>,
    // Workspace.
    adjacency: HashMap<RigidBodyHandle, Vec<JointHandle>>,
    visited_bodies: HashSet<RigidBodyHandle>,
    visited_joints: HashSet<JointHandle>,
    island_statics: HashSet<RigidBodyHandle>,
    stack: Vec<RigidBodyHandle>,
}

impl IslandManager {
    /// Creates a new empty island manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// The islands computed by the last call to [`Self::update`].
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// The number of islands computed by the last call to [`Self::update`].
    pub fn num_islands(&self) -> usize {
        self.islands.len()
    }

    /// Recomputes the islands from the current bodies and joints.
    ///
    /// Islands are grown depth-first from every awake non-static body, in the iteration
    /// order of `bodies`. A sleeping body reached through a joint is woken up and joins the
    /// island. Joints attached to a body missing from `bodies` are ignored.
    pub fn update(&mut self, bodies: &mut RigidBodySet, joints: &JointSet) {
        self.islands.clear();
        self.adjacency.clear();
        self.visited_bodies.clear();
        self.visited_joints.clear();

        for (handle, joint) in joints.iter() {
            let attached = joint.attached_bodies();

            if let Some(missing) = attached.iter().find(|h| !bodies.contains(**h)) {
                log::warn!(
                    "Joint {:?} is attached to the missing body {:?} and will be ignored.",
                    handle,
                    missing
                );
                continue;
            }

            for body in attached {
                self.adjacency.entry(body).or_default().push(handle);
            }
        }

        let seeds: Vec<_> = bodies
            .iter()
            .filter(|(_, rb)| !rb.is_static() && !rb.is_sleeping())
            .map(|(h, _)| h)
            .collect();

        for seed in seeds {
            if !self.visited_bodies.insert(seed) {
                continue;
            }

            let mut island = Island::default();
            self.island_statics.clear();
            self.stack.clear();
            self.stack.push(seed);

            while let Some(handle) = self.stack.pop() {
                island.bodies.push(handle);

                let rb = &mut bodies[handle];
                if rb.is_static() {
                    // Don’t propagate islands through static bodies.
                    continue;
                }
                rb.wake_up(false);

                let Some(edges) = self.adjacency.get(&handle) else {
                    continue;
                };

                for joint_handle in edges {
                    if !self.visited_joints.insert(*joint_handle) {
                        continue;
                    }

                    island.joints.push(*joint_handle);

                    for other in joints[*joint_handle].attached_bodies() {
                        let newly_visited = if bodies[other].is_static() {
                            self.island_statics.insert(other)
                        } else {
                            self.visited_bodies.insert(other)
                        };

                        if newly_visited {
                            self.stack.push(other);
                        }
                    }
                }
            }

            island.joints.sort_unstable();
            self.islands.push(island);
        }
    }
}
