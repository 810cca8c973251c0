//! Time-stamped recordings of what happened in a cell.
//!
//! A [`RobotFrame`] is one snapshot: robot states, planned trajectories, and the
//! [`ObjectAction`]s that changed the scene at that instant. Frames are collected in a
//! [`RobotFrameSequence`].

use crate::error::{Result, SceneError};
use crate::frame_graph::FrameGraph;
use crate::scene::{ObjectInfo, Pose, RobotInfo, RobotScene};
use crate::Matrix4;
use std::collections::BTreeMap;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The state of one robot at one instant.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RobotState {
    pub robot_id: String,
    pub joints: Vec<f64>,
    pub joint_velocities: Vec<f64>,
    pub joint_accelerations: Vec<f64>,
    /// Homogeneous pose of the tool center point, stored as rows.
    #[cfg_attr(
        feature = "serde",
        serde(
            with = "crate::util::row_major::option",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub tcp_pose: Option<Matrix4>,
    /// `[vx, vy, vz, wx, wy, wz]`
    pub tcp_velocity: Vec<f64>,
    pub is_moving: bool,
    pub error_code: i32,
    pub timestamp: f64,
}

impl RobotState {
    pub fn new(robot_id: impl Into<String>) -> Self {
        Self {
            robot_id: robot_id.into(),
            ..Self::default()
        }
    }
}

/// A planned path for one robot.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Trajectory {
    pub robot_id: String,
    /// Homogeneous poses expressed in `frame_id`, stored as rows.
    #[cfg_attr(feature = "serde", serde(with = "crate::util::row_major::vec"))]
    pub waypoints: Vec<Matrix4>,
    pub joint_trajectory: Vec<Vec<f64>>,
    pub velocities: Vec<Vec<f64>>,
    pub accelerations: Vec<Vec<f64>>,
    pub timestamps: Vec<f64>,
    /// Frame the waypoints are expressed in. Empty means the world frame.
    pub frame_id: String,
}

impl Trajectory {
    pub fn new(robot_id: impl Into<String>, frame_id: impl Into<String>) -> Self {
        Self {
            robot_id: robot_id.into(),
            frame_id: frame_id.into(),
            ..Self::default()
        }
    }

    pub fn push_waypoint(&mut self, pose: Matrix4, timestamp: f64) {
        self.waypoints.push(pose);
        self.timestamps.push(timestamp);
    }

    /// Re-expresses every waypoint in the frame `target`.
    pub fn waypoints_in(&self, graph: &FrameGraph, target: &str) -> Result<Vec<Matrix4>> {
        let source = if self.frame_id.is_empty() {
            graph.world_frame()
        } else {
            self.frame_id.as_str()
        };
        let source_in_target = graph.resolve_between(source, target)?;
        Ok(self
            .waypoints
            .iter()
            .map(|waypoint| source_in_target * waypoint)
            .collect())
    }
}

/// Extra data carried by an `add` action.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", content = "data", rename_all = "snake_case")
)]
pub enum Metadata {
    Object(ObjectInfo),
    Robot(RobotInfo),
    /// Anything else, kept verbatim and ignored by the scene.
    Opaque(BTreeMap<String, String>),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "action", rename_all = "snake_case"))]
pub enum Action {
    /// Give an existing record or sub-frame a new pose.
    Move {
        #[cfg_attr(feature = "serde", serde(default))]
        transform: Pose,
    },
    /// Put a new record into the scene.
    Add {
        #[cfg_attr(feature = "serde", serde(default))]
        transform: Pose,
        #[cfg_attr(
            feature = "serde",
            serde(default, skip_serializing_if = "Option::is_none")
        )]
        metadata: Option<Metadata>,
    },
    Remove,
}

impl Action {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Add { .. } => "add",
            Self::Remove => "remove",
        }
    }
}

/// A change to the record (or `"owner/sub"` sub-frame) called `name`.
///
/// See [`RobotScene::apply_action`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectAction {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub action: Action,
}

impl ObjectAction {
    pub fn move_to(name: impl Into<String>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            action: Action::Move { transform: pose },
        }
    }

    pub fn add(name: impl Into<String>, pose: Pose, metadata: Option<Metadata>) -> Self {
        Self {
            name: name.into(),
            action: Action::Add {
                transform: pose,
                metadata,
            },
        }
    }

    pub fn remove(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: Action::Remove,
        }
    }
}

/// Free-form values attached to a frame.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", content = "value", rename_all = "snake_case")
)]
pub enum CustomData {
    Flag(bool),
    Number(f64),
    Text(String),
    Numbers(Vec<f64>),
    Bytes(Vec<u8>),
}

/// One recorded instant.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RobotFrame {
    /// Position in its sequence. See [`RobotFrameSequence::add_frame`].
    pub seq: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub frame_id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub robot_states: BTreeMap<String, RobotState>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub trajectories: BTreeMap<String, Trajectory>,
    /// Applied in order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub object_actions: Vec<ObjectAction>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub custom_data: BTreeMap<String, CustomData>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub scene_id: String,
}

impl RobotFrame {
    #[must_use]
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            timestamp: 0.,
            frame_id: String::new(),
            robot_states: BTreeMap::new(),
            trajectories: BTreeMap::new(),
            object_actions: Vec::new(),
            custom_data: BTreeMap::new(),
            scene_id: String::new(),
        }
    }

    /// Records `state` under its robot id, replacing any earlier state of that robot.
    pub fn add_robot_state(&mut self, state: RobotState) {
        self.robot_states.insert(state.robot_id.clone(), state);
    }

    pub fn add_trajectory(&mut self, trajectory: Trajectory) {
        self.trajectories
            .insert(trajectory.robot_id.clone(), trajectory);
    }

    /// Applies the frame's actions to `scene` in order.
    ///
    /// Stops at the first action that fails; earlier actions stay applied.
    pub fn apply_to(&self, scene: &mut RobotScene) -> Result<(), SceneError> {
        debug!(
            seq = self.seq,
            actions = self.object_actions.len(),
            "applying frame"
        );
        for action in &self.object_actions {
            scene.apply_action(action)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RobotFrameSequence {
    pub sequence_id: String,
    pub scene_id: String,
    frames: Vec<RobotFrame>,
}

impl RobotFrameSequence {
    pub fn new(sequence_id: impl Into<String>, scene_id: impl Into<String>) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            scene_id: scene_id.into(),
            frames: Vec::new(),
        }
    }

    /// Appends `frame`.
    ///
    /// A frame with `seq == 0` added to a non-empty sequence is taken to have no sequence number
    /// and gets the current length of the sequence instead. Other numbers are kept as given.
    pub fn add_frame(&mut self, mut frame: RobotFrame) {
        if frame.seq == 0 && !self.frames.is_empty() {
            frame.seq = self.frames.len() as u64;
        }
        self.frames.push(frame);
    }

    #[must_use]
    pub fn frames(&self) -> &[RobotFrame] {
        &self.frames
    }

    /// The first frame numbered `seq`.
    #[must_use]
    pub fn frame_by_seq(&self, seq: u64) -> Option<&RobotFrame> {
        self.frames.iter().find(|frame| frame.seq == seq)
    }

    /// Frames that carry a state for `robot_id`.
    pub fn frames_by_robot<'a>(
        &'a self,
        robot_id: &'a str,
    ) -> impl Iterator<Item = &'a RobotFrame> + 'a {
        self.frames
            .iter()
            .filter(move |frame| frame.robot_states.contains_key(robot_id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scene::tests::{offset, welding_scene};
    use crate::Vector3;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    /// A frame that moves the whole torch assembly, adds a part, and records robot 1.
    pub(crate) fn welding_frame(seq: u64) -> RobotFrame {
        let mut frame = RobotFrame::new(seq);
        frame.timestamp = 1_234_567_890.;
        frame.frame_id = "frame_001".into();

        let mut state = RobotState::new("robot_1");
        state.joints = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        state.tcp_pose = Some(Matrix4::new_translation(&Vector3::new(100., 200., 300.)));
        frame.add_robot_state(state);

        let mut trajectory = Trajectory::new("robot_1", "world");
        trajectory.push_waypoint(
            Matrix4::new_translation(&Vector3::new(100., 200., 300.)),
            1_234_567_890.,
        );
        trajectory.push_waypoint(
            Matrix4::new_translation(&Vector3::new(150., 250., 350.)),
            1_234_567_900.,
        );
        frame.add_trajectory(trajectory);

        frame.object_actions = vec![
            ObjectAction::move_to("robot_1/tool0", Pose::new(offset(0., 0., 60.), "robot_1")),
            ObjectAction::add(
                "new_workpiece_002",
                Pose::in_world(offset(100., 100., 0.)),
                Some(Metadata::Object(
                    ObjectInfo::new("new_workpiece_002", "welding_part").movable(true),
                )),
            ),
        ];
        frame
            .custom_data
            .insert("weld_current".into(), CustomData::Number(180.));
        frame
    }

    #[rstest]
    fn applying_a_frame_updates_the_scene(mut welding_scene: RobotScene) {
        welding_frame(1).apply_to(&mut welding_scene).unwrap();

        assert_abs_diff_eq!(
            welding_scene
                .frame_graph()
                .unwrap()
                .transform_to_world("workpiece_001")
                .unwrap()
                .translation,
            Vector3::new(0., 0., 410.)
        );
        assert!(welding_scene.object("new_workpiece_002").is_some());
    }

    #[rstest]
    fn a_failing_action_stops_the_frame(mut welding_scene: RobotScene) {
        let mut frame = RobotFrame::new(1);
        frame.object_actions = vec![
            ObjectAction::remove("workpiece_001"),
            ObjectAction::remove("old_workpiece_003"),
            ObjectAction::remove("tool_head_001"),
        ];

        assert_eq!(
            frame.apply_to(&mut welding_scene),
            Err(SceneError::UnknownRecord {
                name: "old_workpiece_003".into()
            })
        );
        assert!(welding_scene.record("workpiece_001").is_none());
        assert!(welding_scene.record("tool_head_001").is_some());
    }

    #[rstest]
    fn waypoints_can_be_expressed_in_another_frame(welding_scene: RobotScene) {
        let graph = welding_scene.frame_graph().unwrap();
        let frame = welding_frame(1);
        let waypoints = frame.trajectories["robot_1"]
            .waypoints_in(&graph, "robot_2")
            .unwrap();

        assert_eq!(waypoints.len(), 2);
        assert_abs_diff_eq!(
            waypoints[1].fixed_view::<3, 1>(0, 3).clone_owned(),
            Vector3::new(-1850., 250., 350.)
        );

        let unknown = Trajectory::new("robot_1", "nowhere");
        assert!(unknown.waypoints_in(&graph, "robot_2").is_err());
    }

    #[test]
    fn unnumbered_frames_get_the_next_sequence_number() {
        let mut sequence = RobotFrameSequence::new("seq_001", "scene_001");
        for _ in 0..3 {
            sequence.add_frame(welding_frame(0));
        }
        sequence.add_frame(welding_frame(10));

        let numbers: Vec<_> = sequence.frames().iter().map(|frame| frame.seq).collect();
        assert_eq!(numbers, [0, 1, 2, 10]);
        assert_eq!(sequence.frame_by_seq(2).unwrap().seq, 2);
        assert!(sequence.frame_by_seq(3).is_none());
    }

    #[test]
    fn frame_by_seq_returns_the_first_match() {
        let mut sequence = RobotFrameSequence::default();
        let mut first = welding_frame(5);
        first.frame_id = "first".into();
        let mut second = welding_frame(5);
        second.frame_id = "second".into();
        sequence.add_frame(first);
        sequence.add_frame(second);

        assert_eq!(sequence.frame_by_seq(5).unwrap().frame_id, "first");
    }

    #[test]
    fn frames_by_robot_filters_on_states() {
        let mut sequence = RobotFrameSequence::default();
        sequence.add_frame(welding_frame(0));
        sequence.add_frame(RobotFrame::new(0));
        let mut robot_2 = RobotFrame::new(0);
        robot_2.add_robot_state(RobotState::new("robot_2"));
        sequence.add_frame(robot_2);

        let seqs = |robot: &str| {
            sequence
                .frames_by_robot(robot)
                .map(|frame| frame.seq)
                .collect::<Vec<_>>()
        };
        assert_eq!(seqs("robot_1"), [0]);
        assert_eq!(seqs("robot_2"), [2]);
        assert!(seqs("robot_3").is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn actions_serialize_flat() {
        let action = ObjectAction::move_to("tool_head_001", Pose::default());
        insta::assert_snapshot!(serde_yaml::to_string(&action).unwrap(), @r"
        name: tool_head_001
        action: move
        transform:
          transform:
            translation:
            - 0.0
            - 0.0
            - 0.0
            rotation:
            - 0.0
            - 0.0
            - 0.0
            - 1.0
          frame_id: world
        ");

        let remove: ObjectAction =
            serde_yaml::from_str("name: old_workpiece_003\naction: remove").unwrap();
        assert_eq!(remove, ObjectAction::remove("old_workpiece_003"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn tagged_payloads_roundtrip() {
        let frame = welding_frame(3);
        let yaml = serde_yaml::to_string(&frame).unwrap();
        let back: RobotFrame = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, frame);

        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            value["custom_data"]["weld_current"]["type"],
            serde_yaml::Value::from("number")
        );
        assert_eq!(
            value["object_actions"][1]["metadata"]["kind"],
            serde_yaml::Value::from("object")
        );
        assert_eq!(
            value["robot_states"]["robot_1"]["tcp_pose"][1][3],
            serde_yaml::Value::from(200.)
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn opaque_metadata_is_kept() {
        let yaml = r"
name: fixture_7
action: add
metadata:
  kind: opaque
  data:
    supplier: acme
";
        let action: ObjectAction = serde_yaml::from_str(yaml).unwrap();
        let Action::Add {
            metadata: Some(Metadata::Opaque(data)),
            ..
        } = &action.action
        else {
            panic!("expected opaque add, got {action:?}");
        };
        assert_eq!(data["supplier"], "acme");
    }
}
