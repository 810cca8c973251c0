//! A graph of named frames, each placed relative to a parent, rooted at an implicit world frame.
//!
//! Frames are registered as `(name, parent, local transform)` triples and can be registered in
//! any order; a parent only has to exist by the time a query walks through it. Resolution walks
//! the parent chain iteratively on every call (nothing is cached), so re-registering a frame is
//! immediately visible to every frame below it.
//!
//! Frame names are opaque keys. In particular, a `/` in a name carries no meaning here; nesting
//! is expressed only through parent links.
//!
//! ```
//! use workcell_frames::{FrameGraph, RigidTransform, Vector3};
//!
//! let mut graph = FrameGraph::new();
//! graph.register("robot_1", "world", RigidTransform::identity())?;
//! graph.register("robot_1/tool0", "robot_1", RigidTransform::from_translation(Vector3::new(0., 0., 50.)))?;
//! graph.register("part", "robot_1/tool0", RigidTransform::from_translation(Vector3::new(0., 0., 200.)))?;
//!
//! let part_in_world = graph.resolve_to_world("part")?;
//! assert_eq!(part_in_world[(2, 3)], 250.);
//! # Ok::<(), workcell_frames::FrameError>(())
//! ```

use crate::error::{FrameError, Result};
use crate::transform::{invert, RigidTransform};
use crate::Matrix4;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Name of the root frame unless configured otherwise.
pub const WORLD_FRAME: &str = "world";

/// The default bound on the number of parent links a resolution may follow.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Tunables for a [`FrameGraph`].
///
/// Every field has a default, so a partial configuration deserializes fine.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FrameGraphConfig {
    /// The implicit root frame. It has no parent, an identity pose, and cannot be registered.
    pub world_frame: String,

    /// Maximum number of parent links followed before resolution gives up with
    /// [`FrameError::DepthExceeded`].
    pub max_depth: usize,
}

impl Default for FrameGraphConfig {
    fn default() -> Self {
        Self {
            world_frame: WORLD_FRAME.to_owned(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A registered frame.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    name: String,
    parent: String,
    local: RigidTransform,
}

impl Frame {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// The pose of this frame in its parent. Always has a quaternion rotation.
    #[must_use]
    pub fn local(&self) -> &RigidTransform {
        &self.local
    }
}

/// Named frames rooted at the world frame.
///
/// A deserialized graph goes through [`FrameGraph::register`] frame by frame, so it is held to the
/// same rules as one built in code.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "FrameGraphRecord"))]
pub struct FrameGraph {
    config: FrameGraphConfig,
    frames: BTreeMap<String, Frame>,
}

/// The serialized shape of a [`FrameGraph`], before its frames have been validated.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct FrameGraphRecord {
    #[serde(default)]
    config: FrameGraphConfig,
    #[serde(default)]
    frames: BTreeMap<String, Frame>,
}

#[cfg(feature = "serde")]
impl TryFrom<FrameGraphRecord> for FrameGraph {
    type Error = FrameError;

    fn try_from(record: FrameGraphRecord) -> Result<Self> {
        let mut graph = Self::with_config(record.config);
        for (name, frame) in record.frames {
            graph.register(name, frame.parent, frame.local)?;
        }
        Ok(graph)
    }
}

impl FrameGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: FrameGraphConfig) -> Self {
        Self {
            config,
            frames: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FrameGraphConfig {
        &self.config
    }

    #[must_use]
    pub fn world_frame(&self) -> &str {
        &self.config.world_frame
    }

    /// Inserts or replaces the frame `name`, placed at `transform` within `parent`.
    ///
    /// Returns the frame previously registered under `name`, if any. The parent does not need to
    /// be registered yet.
    ///
    /// The transform is stored in canonical form, so a rotation matrix of the wrong shape is
    /// rejected here with [`FrameError::Shape`], and one that is not a proper rotation with
    /// [`FrameError::ImproperRotation`]. Registering the world frame fails with
    /// [`FrameError::ReservedFrame`].
    pub fn register(
        &mut self,
        name: impl Into<String>,
        parent: impl Into<String>,
        transform: RigidTransform,
    ) -> Result<Option<Frame>> {
        let name = name.into();
        if name == self.config.world_frame {
            return Err(FrameError::ReservedFrame { name });
        }

        let frame = Frame {
            name: name.clone(),
            parent: parent.into(),
            local: transform.canonical()?,
        };
        debug!(frame = %frame.name, parent = %frame.parent, local = %frame.local, "registering frame");

        Ok(self.frames.insert(name, frame))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Frame> {
        self.frames.get(name)
    }

    /// True if `name` is registered or is the world frame.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        name == self.config.world_frame || self.frames.contains_key(name)
    }

    /// Number of registered frames, not counting the world frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterates over the registered frames in name order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values()
    }

    /// Returns the frames on the path from `name` up to (but excluding) the world frame, starting
    /// with `name` itself. The world frame's chain is empty.
    ///
    /// # Errors
    ///
    /// - [`FrameError::FrameNotFound`] if `name` or any ancestor is not registered;
    /// - [`FrameError::Cycle`] if the parent links loop;
    /// - [`FrameError::DepthExceeded`] if more than `max_depth` links would have to be followed.
    pub fn chain_to_world<'a>(&'a self, name: &'a str) -> Result<Vec<&'a Frame>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = name;

        while current != self.config.world_frame {
            let frame = self
                .frames
                .get(current)
                .ok_or_else(|| FrameError::FrameNotFound {
                    name: current.to_owned(),
                })?;
            if !visited.insert(current) {
                return Err(FrameError::Cycle {
                    frame: name.to_owned(),
                    revisited: current.to_owned(),
                });
            }
            if chain.len() == self.config.max_depth {
                return Err(FrameError::DepthExceeded {
                    frame: name.to_owned(),
                    max_depth: self.config.max_depth,
                });
            }
            chain.push(frame);
            current = &frame.parent;
        }

        Ok(chain)
    }

    /// Returns the homogeneous matrix mapping points in `name` into the world frame.
    ///
    /// The world frame resolves to the identity. Otherwise this is the product of the local
    /// transforms along [`FrameGraph::chain_to_world`], outermost first.
    pub fn resolve_to_world(&self, name: &str) -> Result<Matrix4> {
        let chain = self.chain_to_world(name)?;

        let mut pose = Matrix4::identity();
        for frame in chain.iter().rev() {
            pose *= frame.local.to_matrix()?;
        }

        trace!(frame = name, depth = chain.len(), "resolved frame to world");
        Ok(pose)
    }

    /// Returns the homogeneous matrix mapping points in `from` into `to`.
    ///
    /// This is `inverse(W(to)) · W(from)` where `W` is [`FrameGraph::resolve_to_world`]. A frame
    /// resolved against itself gives exactly the identity, as long as the frame resolves at all.
    pub fn resolve_between(&self, from: &str, to: &str) -> Result<Matrix4> {
        let from_in_world = self.resolve_to_world(from)?;
        if from == to {
            return Ok(Matrix4::identity());
        }
        let to_in_world = self.resolve_to_world(to)?;

        Ok(invert(&to_in_world)? * from_in_world)
    }

    /// Like [`FrameGraph::resolve_to_world`], but as a [`RigidTransform`].
    pub fn transform_to_world(&self, name: &str) -> Result<RigidTransform> {
        self.resolve_to_world(name)
            .map(|matrix| RigidTransform::from_matrix(&matrix))
    }

    /// Like [`FrameGraph::resolve_between`], but as a [`RigidTransform`].
    pub fn transform_between(&self, from: &str, to: &str) -> Result<RigidTransform> {
        self.resolve_between(from, to)
            .map(|matrix| RigidTransform::from_matrix(&matrix))
    }
}
