//! A scene bundled with the frames recorded in it.

use crate::error::SceneError;
use crate::recording::{RobotFrame, RobotFrameSequence};
use crate::scene::{default_version, RobotScene};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataBag {
    pub scene: RobotScene,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    frames: Option<RobotFrameSequence>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bag_id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bag_name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub created_at: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub updated_at: String,
    #[cfg_attr(feature = "serde", serde(default = "default_version"))]
    pub version: String,
}

impl DataBag {
    pub fn new(bag_id: impl Into<String>, scene: RobotScene) -> Self {
        Self {
            scene,
            frames: None,
            bag_id: bag_id.into(),
            bag_name: String::new(),
            description: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
            version: default_version(),
        }
    }

    /// Appends a frame recorded in this bag's scene.
    ///
    /// A frame with an empty `scene_id` is taken to belong to this scene and is stamped with its
    /// id; any other id must match the scene's, or [`SceneError::SceneMismatch`] is returned. The
    /// frame sequence (`"{bag_id}_sequence"`) is created on first use, and sequence numbers are
    /// assigned as in [`RobotFrameSequence::add_frame`].
    pub fn add_frame(&mut self, mut frame: RobotFrame) -> Result<(), SceneError> {
        if !frame.scene_id.is_empty() && frame.scene_id != self.scene.scene_id {
            return Err(SceneError::SceneMismatch {
                expected: self.scene.scene_id.clone(),
                found: frame.scene_id,
            });
        }
        frame.scene_id.clone_from(&self.scene.scene_id);

        let scene_id = &self.scene.scene_id;
        let bag_id = &self.bag_id;
        let sequence = self.frames.get_or_insert_with(|| {
            debug!(%bag_id, %scene_id, "starting frame sequence");
            RobotFrameSequence::new(format!("{bag_id}_sequence"), scene_id.clone())
        });
        sequence.add_frame(frame);
        Ok(())
    }

    /// The frame sequence, if any frame has been added.
    #[must_use]
    pub fn sequence(&self) -> Option<&RobotFrameSequence> {
        self.frames.as_ref()
    }

    #[must_use]
    pub fn frames(&self) -> &[RobotFrame] {
        match &self.frames {
            Some(sequence) => sequence.frames(),
            None => &[],
        }
    }

    #[must_use]
    pub fn frame_by_seq(&self, seq: u64) -> Option<&RobotFrame> {
        self.frames.as_ref()?.frame_by_seq(seq)
    }

    pub fn frames_by_robot<'a>(
        &'a self,
        robot_id: &'a str,
    ) -> impl Iterator<Item = &'a RobotFrame> + 'a {
        self.frames
            .iter()
            .flat_map(move |sequence| sequence.frames_by_robot(robot_id))
    }

    /// Returns the scene as it stands after applying the actions of every frame, in order.
    pub fn replay(&self) -> Result<RobotScene, SceneError> {
        let mut scene = self.scene.clone();
        for frame in self.frames() {
            frame.apply_to(&mut scene)?;
        }
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::tests::welding_frame;
    use crate::recording::{ObjectAction, RobotState};
    use crate::scene::tests::welding_scene;
    use crate::Vector3;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    fn frames_are_stamped_and_sequenced(welding_scene: RobotScene) {
        let mut bag = DataBag::new("bag_001", welding_scene);
        assert!(bag.frames().is_empty());
        assert!(bag.frame_by_seq(0).is_none());

        bag.add_frame(welding_frame(0)).unwrap();
        let mut foreign = welding_frame(0);
        foreign.scene_id = "scene_001".into();
        bag.add_frame(foreign).unwrap();

        let sequence = bag.sequence().unwrap();
        assert_eq!(sequence.sequence_id, "bag_001_sequence");
        assert_eq!(sequence.scene_id, "scene_001");
        assert!(bag.frames().iter().all(|frame| frame.scene_id == "scene_001"));
        assert_eq!(bag.frame_by_seq(1).unwrap().seq, 1);
        assert_eq!(bag.frames_by_robot("robot_1").count(), 2);
        assert_eq!(bag.frames_by_robot("robot_2").count(), 0);
    }

    #[rstest]
    fn frames_from_other_scenes_are_rejected(welding_scene: RobotScene) {
        let mut bag = DataBag::new("bag_001", welding_scene);
        let mut frame = welding_frame(0);
        frame.scene_id = "scene_002".into();

        assert_eq!(
            bag.add_frame(frame),
            Err(SceneError::SceneMismatch {
                expected: "scene_001".into(),
                found: "scene_002".into()
            })
        );
        assert!(bag.sequence().is_none());
    }

    #[rstest]
    fn replay_applies_every_frame(welding_scene: RobotScene) {
        let mut bag = DataBag::new("bag_001", welding_scene);
        bag.add_frame(welding_frame(0)).unwrap();

        let mut removal = RobotFrame::new(0);
        removal.add_robot_state(RobotState::new("robot_2"));
        removal
            .object_actions
            .push(ObjectAction::remove("new_workpiece_002"));
        bag.add_frame(removal).unwrap();

        let scene = bag.replay().unwrap();
        assert!(scene.object("new_workpiece_002").is_none());
        assert_abs_diff_eq!(
            scene
                .frame_graph()
                .unwrap()
                .transform_to_world("workpiece_001")
                .unwrap()
                .translation,
            Vector3::new(0., 0., 410.)
        );

        // the stored scene itself is untouched
        assert!(bag.scene.object("new_workpiece_002").is_none());
        assert_abs_diff_eq!(
            bag.scene
                .frame_graph()
                .unwrap()
                .transform_to_world("workpiece_001")
                .unwrap()
                .translation,
            Vector3::new(0., 0., 400.)
        );
    }

    #[cfg(feature = "serde")]
    #[rstest]
    fn roundtrips_through_yaml(welding_scene: RobotScene) {
        let mut bag = DataBag::new("bag_001", welding_scene);
        bag.bag_name = "dual robot welding, day 1".into();
        bag.add_frame(welding_frame(0)).unwrap();

        let yaml = serde_yaml::to_string(&bag).unwrap();
        let back: DataBag = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, bag);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn minimal_bag_uses_defaults() {
        let bag: DataBag = serde_yaml::from_str("scene: {scene_id: s}").unwrap();
        assert_eq!(bag.version, "1.0.0");
        assert_eq!(bag.scene.world_frame, "world");
        assert!(bag.frames().is_empty());
    }
}
