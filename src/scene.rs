//! Robots and objects placed in a workcell, and the frame graph they imply.
//!
//! Every record has a [`Pose`] relative to some frame (by default the world) and may carry named
//! sub-frames such as a robot's `tool0`. A sub-frame `sub` of record `owner` is registered in the
//! graph as [`scoped_frame_name(owner, sub)`](scoped_frame_name), ie, `"owner/sub"`, so other
//! records can be attached to it by that name.

use crate::error::{Result, SceneError};
use crate::frame_graph::{FrameGraph, FrameGraphConfig, WORLD_FRAME};
use crate::recording::{Action, Metadata, ObjectAction};
use crate::transform::RigidTransform;
use crate::Matrix4;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub(crate) fn default_version() -> String {
    "1.0.0".to_owned()
}

fn default_world_frame() -> String {
    WORLD_FRAME.to_owned()
}

/// Returns the graph name of the sub-frame `sub` belonging to `owner`.
///
/// ```
/// assert_eq!(workcell_frames::scene::scoped_frame_name("robot_1", "tool0"), "robot_1/tool0");
/// ```
#[must_use]
pub fn scoped_frame_name(owner: &str, sub: &str) -> String {
    format!("{owner}/{sub}")
}

/// A transform together with the frame it is expressed in.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Pose {
    pub transform: RigidTransform,
    pub frame_id: String,
}

impl Pose {
    pub fn new(transform: RigidTransform, frame_id: impl Into<String>) -> Self {
        Self {
            transform,
            frame_id: frame_id.into(),
        }
    }

    #[must_use]
    pub fn in_world(transform: RigidTransform) -> Self {
        Self::new(transform, WORLD_FRAME)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::in_world(RigidTransform::identity())
    }
}

/// Fields shared by robots and objects.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaseObjectInfo {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub pose: Pose,
    /// Named sub-frames, keyed by their unscoped name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub frames: BTreeMap<String, Pose>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub movable: bool,
}

impl BaseObjectInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            pose: Pose::default(),
            frames: BTreeMap::new(),
            movable: false,
        }
    }
}

/// Common access to the [`BaseObjectInfo`] of robots and objects.
pub trait SceneRecord {
    fn base(&self) -> &BaseObjectInfo;
    fn base_mut(&mut self) -> &mut BaseObjectInfo;

    fn name(&self) -> &str {
        &self.base().name
    }

    fn pose(&self) -> &Pose {
        &self.base().pose
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RobotInfo {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub base: BaseObjectInfo,
    #[cfg_attr(feature = "serde", serde(default))]
    pub robot_type: String,
}

impl RobotInfo {
    pub fn new(name: impl Into<String>, robot_type: impl Into<String>) -> Self {
        Self {
            base: BaseObjectInfo::new(name),
            robot_type: robot_type.into(),
        }
    }
}

/// Anything in the cell that is not a robot: workpieces, fixtures, tool heads.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectInfo {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub base: BaseObjectInfo,
    #[cfg_attr(feature = "serde", serde(default))]
    pub object_type: String,
}

impl ObjectInfo {
    pub fn new(name: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            base: BaseObjectInfo::new(name),
            object_type: object_type.into(),
        }
    }
}

macro_rules! scene_record {
    ($record:ty) => {
        impl SceneRecord for $record {
            fn base(&self) -> &BaseObjectInfo {
                &self.base
            }

            fn base_mut(&mut self) -> &mut BaseObjectInfo {
                &mut self.base
            }
        }

        impl $record {
            #[must_use]
            pub fn with_pose(mut self, pose: Pose) -> Self {
                self.base.pose = pose;
                self
            }

            /// Adds (or replaces) the sub-frame `name`.
            #[must_use]
            pub fn with_frame(mut self, name: impl Into<String>, pose: Pose) -> Self {
                self.base.frames.insert(name.into(), pose);
                self
            }

            #[must_use]
            pub fn with_description(mut self, description: impl Into<String>) -> Self {
                self.base.description = description.into();
                self
            }

            #[must_use]
            pub fn movable(mut self, movable: bool) -> Self {
                self.base.movable = movable;
                self
            }
        }
    };
}

scene_record!(RobotInfo);
scene_record!(ObjectInfo);

/// The static layout of a workcell.
///
/// Robots and objects share one namespace: adding a robot evicts an object of the same name and
/// vice versa, since both would otherwise claim the same frame.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RobotScene {
    #[cfg_attr(feature = "serde", serde(default))]
    pub scene_id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub scene_name: String,
    #[cfg_attr(feature = "serde", serde(default = "default_world_frame"))]
    pub world_frame: String,
    #[cfg_attr(feature = "serde", serde(default))]
    robots: BTreeMap<String, RobotInfo>,
    #[cfg_attr(feature = "serde", serde(default))]
    objects: BTreeMap<String, ObjectInfo>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub created_at: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub updated_at: String,
    #[cfg_attr(feature = "serde", serde(default = "default_version"))]
    pub version: String,
}

impl Default for RobotScene {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl RobotScene {
    pub fn new(scene_id: impl Into<String>, scene_name: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            scene_name: scene_name.into(),
            world_frame: default_world_frame(),
            robots: BTreeMap::new(),
            objects: BTreeMap::new(),
            created_at: String::new(),
            updated_at: String::new(),
            version: default_version(),
        }
    }

    /// Inserts `robot`, returning the robot it replaced (if any).
    pub fn add_robot(&mut self, robot: RobotInfo) -> Option<RobotInfo> {
        let name = robot.name().to_owned();
        if self.objects.remove(&name).is_some() {
            warn!(%name, "robot replaces an object of the same name");
        }
        debug!(%name, frame_id = %robot.pose().frame_id, "adding robot");
        self.robots.insert(name, robot)
    }

    /// Inserts `object`, returning the object it replaced (if any).
    pub fn add_object(&mut self, object: ObjectInfo) -> Option<ObjectInfo> {
        let name = object.name().to_owned();
        if self.robots.remove(&name).is_some() {
            warn!(%name, "object replaces a robot of the same name");
        }
        debug!(%name, frame_id = %object.pose().frame_id, "adding object");
        self.objects.insert(name, object)
    }

    #[must_use]
    pub fn robot(&self, name: &str) -> Option<&RobotInfo> {
        self.robots.get(name)
    }

    #[must_use]
    pub fn object(&self, name: &str) -> Option<&ObjectInfo> {
        self.objects.get(name)
    }

    pub fn robots(&self) -> impl Iterator<Item = &RobotInfo> {
        self.robots.values()
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.objects.values()
    }

    /// The robot or object called `name`.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<&BaseObjectInfo> {
        self.robot(name)
            .map(SceneRecord::base)
            .or_else(|| self.object(name).map(SceneRecord::base))
    }

    fn record_mut(&mut self, name: &str) -> Option<&mut BaseObjectInfo> {
        match self.robots.get_mut(name) {
            Some(robot) => Some(robot.base_mut()),
            None => self.objects.get_mut(name).map(SceneRecord::base_mut),
        }
    }

    /// All robots followed by all objects.
    pub fn records(&self) -> impl Iterator<Item = &BaseObjectInfo> {
        self.robots
            .values()
            .map(SceneRecord::base)
            .chain(self.objects.values().map(SceneRecord::base))
    }

    /// Removes the robot or object called `name`, returning whether there was one.
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.robots.remove(name).is_some() || self.objects.remove(name).is_some();
        if removed {
            debug!(%name, "removed record");
        }
        removed
    }

    /// Builds a frame graph holding every record and every record's sub-frames.
    ///
    /// The graph is a snapshot: later changes to the scene are not reflected in it.
    pub fn frame_graph(&self) -> Result<FrameGraph> {
        let mut graph = FrameGraph::with_config(FrameGraphConfig {
            world_frame: self.world_frame.clone(),
            ..FrameGraphConfig::default()
        });

        for record in self.records() {
            graph.register(
                &record.name,
                &record.pose.frame_id,
                record.pose.transform.clone(),
            )?;
            for (sub, pose) in &record.frames {
                graph.register(
                    scoped_frame_name(&record.name, sub),
                    &pose.frame_id,
                    pose.transform.clone(),
                )?;
            }
        }

        Ok(graph)
    }

    /// Convenience for resolving a single frame; see [`FrameGraph::resolve_to_world`].
    pub fn resolve_to_world(&self, name: &str) -> Result<Matrix4> {
        self.frame_graph()?.resolve_to_world(name)
    }

    /// Convenience for resolving a single pair of frames; see [`FrameGraph::resolve_between`].
    pub fn resolve_between(&self, from: &str, to: &str) -> Result<Matrix4> {
        self.frame_graph()?.resolve_between(from, to)
    }

    /// Applies a recorded change to the scene.
    ///
    /// - `move` replaces the pose of a record, or of a sub-frame named `"owner/sub"`;
    /// - `add` inserts the robot or object carried in the metadata (renamed to the action's name
    ///   and placed at the action's pose), or a bare object if there is no such metadata;
    /// - `remove` deletes a record.
    ///
    /// Moving or removing something the scene does not have fails with
    /// [`SceneError::UnknownRecord`], and leaves the scene untouched.
    pub fn apply_action(&mut self, action: &ObjectAction) -> Result<(), SceneError> {
        let name = action.name.as_str();
        debug!(%name, action = action.action.kind(), "applying action");

        match &action.action {
            Action::Move { transform } => {
                let pose = self
                    .pose_mut(name)
                    .ok_or_else(|| SceneError::UnknownRecord {
                        name: name.to_owned(),
                    })?;
                *pose = transform.clone();
            }
            Action::Add {
                transform,
                metadata,
            } => match metadata {
                Some(Metadata::Robot(robot)) => {
                    let mut robot = robot.clone();
                    robot.base.name = name.to_owned();
                    self.add_robot(robot.with_pose(transform.clone()));
                }
                Some(Metadata::Object(object)) => {
                    let mut object = object.clone();
                    object.base.name = name.to_owned();
                    self.add_object(object.with_pose(transform.clone()));
                }
                Some(Metadata::Opaque(_)) | None => {
                    self.add_object(ObjectInfo::new(name, "").with_pose(transform.clone()));
                }
            },
            Action::Remove => {
                if !self.remove(name) {
                    return Err(SceneError::UnknownRecord {
                        name: name.to_owned(),
                    });
                }
            }
        }

        Ok(())
    }

    /// The pose of the record `name`, or of the sub-frame `name` written as `"owner/sub"`.
    fn pose_mut(&mut self, name: &str) -> Option<&mut Pose> {
        if self.record(name).is_some() {
            return self.record_mut(name).map(|record| &mut record.pose);
        }
        let (owner, sub) = name.split_once('/')?;
        self.record_mut(owner)?.frames.get_mut(sub)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::Vector3;
    use approx::assert_abs_diff_eq;
    use rstest::{fixture, rstest};

    pub(crate) fn offset(x: f64, y: f64, z: f64) -> RigidTransform {
        RigidTransform::from_translation(Vector3::new(x, y, z))
    }

    fn translation_of(matrix: &Matrix4) -> Vector3 {
        matrix.fixed_view::<3, 1>(0, 3).clone_owned()
    }

    /// Two welding robots; a torch on the first robot's flange holds a part.
    #[fixture]
    pub(crate) fn welding_scene() -> RobotScene {
        let mut scene = RobotScene::new("scene_001", "dual robot welding");
        scene.add_robot(
            RobotInfo::new("robot_1", "abb_irb6700_150_320")
                .with_pose(Pose::in_world(offset(0., 0., 0.)))
                .with_frame("tcp", Pose::new(offset(0., 0., 100.), "robot_1"))
                .with_frame("tool0", Pose::new(offset(0., 0., 50.), "robot_1"))
                .movable(true),
        );
        scene.add_robot(
            RobotInfo::new("robot_2", "abb_irb6700_150_320")
                .with_pose(Pose::in_world(offset(2000., 0., 0.)))
                .movable(true),
        );
        scene.add_object(
            ObjectInfo::new("tool_head_001", "welding_torch")
                .with_pose(Pose::new(offset(0., 0., 150.), "robot_1/tool0"))
                .with_description("welding torch")
                .movable(true),
        );
        scene.add_object(
            ObjectInfo::new("workpiece_001", "welding_part")
                .with_pose(Pose::new(offset(0., 0., 200.), "tool_head_001"))
                .with_description("part to be welded"),
        );
        scene
    }

    #[rstest]
    #[case("robot_1", Vector3::new(0., 0., 0.))]
    #[case("robot_2", Vector3::new(2000., 0., 0.))]
    #[case("robot_1/tcp", Vector3::new(0., 0., 100.))]
    #[case("robot_1/tool0", Vector3::new(0., 0., 50.))]
    #[case("tool_head_001", Vector3::new(0., 0., 200.))]
    #[case("workpiece_001", Vector3::new(0., 0., 400.))]
    fn welding_scene_resolves(
        welding_scene: RobotScene,
        #[case] frame: &str,
        #[case] expected: Vector3,
    ) {
        let pose = welding_scene.resolve_to_world(frame).unwrap();
        assert_abs_diff_eq!(translation_of(&pose), expected);
    }

    #[rstest]
    fn workpiece_relative_to_second_robot(welding_scene: RobotScene) {
        let pose = welding_scene
            .resolve_between("workpiece_001", "robot_2")
            .unwrap();
        assert_abs_diff_eq!(translation_of(&pose), Vector3::new(-2000., 0., 400.));
    }

    #[rstest]
    fn graph_has_one_frame_per_record_and_sub_frame(welding_scene: RobotScene) {
        let graph = welding_scene.frame_graph().unwrap();
        assert_eq!(graph.len(), 6);
        assert_eq!(graph.get("robot_1/tool0").unwrap().parent(), "robot_1");
    }

    #[rstest]
    fn robots_and_objects_share_names(mut welding_scene: RobotScene) {
        welding_scene.add_robot(RobotInfo::new("tool_head_001", "positioner"));
        assert!(welding_scene.object("tool_head_001").is_none());
        assert!(welding_scene.robot("tool_head_001").is_some());

        // the new record sits at the world origin, and the workpiece follows it
        assert_abs_diff_eq!(
            translation_of(&welding_scene.resolve_to_world("workpiece_001").unwrap()),
            Vector3::new(0., 0., 200.)
        );
    }

    #[rstest]
    fn moving_a_sub_frame_moves_everything_attached(mut welding_scene: RobotScene) {
        welding_scene
            .apply_action(&ObjectAction::move_to(
                "robot_1/tool0",
                Pose::new(offset(0., 0., 80.), "robot_1"),
            ))
            .unwrap();
        assert_abs_diff_eq!(
            translation_of(&welding_scene.resolve_to_world("workpiece_001").unwrap()),
            Vector3::new(0., 0., 430.)
        );
    }

    #[rstest]
    fn moving_a_record_can_reparent_it(mut welding_scene: RobotScene) {
        welding_scene
            .apply_action(&ObjectAction::move_to(
                "workpiece_001",
                Pose::new(offset(10., 0., 0.), "robot_2"),
            ))
            .unwrap();
        assert_abs_diff_eq!(
            translation_of(&welding_scene.resolve_to_world("workpiece_001").unwrap()),
            Vector3::new(2010., 0., 0.)
        );
    }

    #[rstest]
    fn add_uses_the_action_name_and_pose(mut welding_scene: RobotScene) {
        let metadata = ObjectInfo::new("ignored", "welding_part").movable(true);
        welding_scene
            .apply_action(&ObjectAction::add(
                "new_workpiece_002",
                Pose::in_world(offset(100., 100., 0.)),
                Some(Metadata::Object(metadata)),
            ))
            .unwrap();

        let added = welding_scene.object("new_workpiece_002").unwrap();
        assert_eq!(added.name(), "new_workpiece_002");
        assert_eq!(added.object_type, "welding_part");
        assert!(added.base.movable);
        assert_abs_diff_eq!(
            translation_of(&welding_scene.resolve_to_world("new_workpiece_002").unwrap()),
            Vector3::new(100., 100., 0.)
        );
    }

    #[rstest]
    fn add_without_metadata_is_a_bare_object(mut welding_scene: RobotScene) {
        welding_scene
            .apply_action(&ObjectAction::add(
                "marker",
                Pose::new(offset(1., 2., 3.), "robot_2"),
                None,
            ))
            .unwrap();
        assert_eq!(welding_scene.object("marker").unwrap().object_type, "");
    }

    #[rstest]
    fn remove_detaches_dependents(mut welding_scene: RobotScene) {
        welding_scene
            .apply_action(&ObjectAction::remove("tool_head_001"))
            .unwrap();
        assert!(welding_scene.record("tool_head_001").is_none());
        assert_eq!(
            welding_scene.resolve_to_world("workpiece_001"),
            Err(FrameError::FrameNotFound {
                name: "tool_head_001".into()
            })
        );
    }

    #[rstest]
    #[case(ObjectAction::remove("old_workpiece_003"))]
    #[case(ObjectAction::move_to("ghost", Pose::default()))]
    #[case(ObjectAction::move_to("robot_1/flange", Pose::default()))]
    #[case(ObjectAction::move_to("ghost/tool0", Pose::default()))]
    fn unknown_records_are_rejected(mut welding_scene: RobotScene, #[case] action: ObjectAction) {
        let before = welding_scene.clone();
        assert_eq!(
            welding_scene.apply_action(&action),
            Err(SceneError::UnknownRecord {
                name: action.name.clone()
            })
        );
        assert_eq!(welding_scene, before);
    }

    #[test]
    fn scene_with_custom_world_frame() {
        let mut scene = RobotScene::new("s", "custom world");
        scene.world_frame = "cell".into();
        scene.add_robot(RobotInfo::new("r", "").with_pose(Pose::new(offset(1., 0., 0.), "cell")));
        assert_abs_diff_eq!(
            translation_of(&scene.resolve_to_world("r").unwrap()),
            Vector3::new(1., 0., 0.)
        );
        assert!(scene.resolve_to_world("world").is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn records_deserialize_with_defaults() {
        let yaml = r#"
scene_id: scene_001
robots:
  robot_1:
    name: robot_1
    robot_type: abb_irb6700_150_320
    frames:
      tool0:
        transform:
          translation: [0, 0, 50]
        frame_id: robot_1
objects:
  part:
    name: part
    pose:
      transform:
        translation: [0, 0, 10]
        rotation: [[1, 0, 0], [0, 1, 0], [0, 0, 1]]
      frame_id: robot_1/tool0
"#;
        let scene: RobotScene = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scene.world_frame, "world");
        assert_eq!(scene.version, "1.0.0");
        assert_eq!(scene.robot("robot_1").unwrap().pose(), &Pose::default());
        assert_abs_diff_eq!(
            translation_of(&scene.resolve_to_world("part").unwrap()),
            Vector3::new(0., 0., 60.)
        );
    }
}
