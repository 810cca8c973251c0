//! This library keeps track of where things are in a robot workcell: robots, the tools on their
//! flanges, the parts those tools hold, fixtures, and so on. Every one of them lives in a named
//! coordinate frame that is placed relative to some parent frame, and ultimately relative to an
//! implicit world frame.
//!
//! The core is small:
//!
//! - the [`rotation`] module converts between the orientation representations that show up in
//!   recorded data (quaternions, 3×3 and 4×4 matrices, and ZYX Euler angles);
//! - a [`RigidTransform`] places a child frame in its parent; and
//! - a [`FrameGraph`] holds named frames and resolves any frame relative to the world, or relative
//!   to any other frame, by walking parent links.
//!
//! On top of that sit plain records describing a cell and what happened in it: a [`RobotScene`]
//! (whose records and sub-frames produce a frame graph), [`RobotFrame`]s of robot states and scene
//! changes, and a [`DataBag`] bundling a scene with its frames.
//!
//! # Examples
//!
//! A robot with a welding torch on its flange, holding a part, and a second robot two meters
//! further along. Where is the part, as seen from the second robot?
//!
//! ```
//! use workcell_frames::{ObjectInfo, Pose, RigidTransform, RobotInfo, RobotScene, Vector3};
//!
//! let offset = |x, y, z| RigidTransform::from_translation(Vector3::new(x, y, z));
//!
//! let mut scene = RobotScene::new("scene_001", "dual robot welding");
//! scene.add_robot(
//!     RobotInfo::new("robot_1", "abb_irb6700_150_320")
//!         .with_frame("tool0", Pose::new(offset(0., 0., 50.), "robot_1")),
//! );
//! scene.add_robot(
//!     RobotInfo::new("robot_2", "abb_irb6700_150_320")
//!         .with_pose(Pose::in_world(offset(2000., 0., 0.))),
//! );
//! // sub-frames are addressed as "owner/sub"
//! scene.add_object(
//!     ObjectInfo::new("tool_head_001", "welding_torch")
//!         .with_pose(Pose::new(offset(0., 0., 150.), "robot_1/tool0")),
//! );
//! scene.add_object(
//!     ObjectInfo::new("workpiece_001", "welding_part")
//!         .with_pose(Pose::new(offset(0., 0., 200.), "tool_head_001")),
//! );
//!
//! let graph = scene.frame_graph()?;
//! let part_in_world = graph.resolve_to_world("workpiece_001")?;
//! assert_eq!(part_in_world[(2, 3)], 400.);
//!
//! let part_seen_from_robot_2 = graph.transform_between("workpiece_001", "robot_2")?;
//! assert!((part_seen_from_robot_2.translation - Vector3::new(-2000., 0., 400.)).norm() < 1e-9);
//! # Ok::<(), workcell_frames::FrameError>(())
//! ```
//!
//! # Features
//!
//! - `serde` (default): `Serialize`/`Deserialize` for all records. Quaternions are written as
//!   `[x, y, z, w]` and homogeneous matrices inside records as lists of rows.
//! - `approx` (default): `AbsDiffEq`/`RelativeEq` for quaternions, Euler angles and transforms.

mod util;

pub mod databag;
pub mod error;
pub mod frame_graph;
pub mod recording;
pub mod rotation;
pub mod scene;
pub mod transform;

pub type Vector3 = nalgebra::Vector3<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
pub type Matrix4 = nalgebra::Matrix4<f64>;
pub(crate) type UnitQuaternion = nalgebra::UnitQuaternion<f64>;

pub use databag::DataBag;
pub use error::{FrameError, SceneError};
pub use frame_graph::{Frame, FrameGraph, FrameGraphConfig};
pub use recording::{ObjectAction, RobotFrame, RobotFrameSequence, RobotState, Trajectory};
pub use rotation::{EulerAngles, Quaternion, RotationMatrix};
pub use scene::{ObjectInfo, Pose, RobotInfo, RobotScene, SceneRecord};
pub use transform::{RigidTransform, Rotation};
