//! Builds a two-robot welding cell, replays one recorded frame against it, and prints the
//! resulting data bag.
//!
//! ```bash
//! cargo run --example welding_cell
//! RUST_LOG=workcell_frames=debug cargo run --example welding_cell
//! ```

use std::error::Error;
use tracing::{info, Level};
use workcell_frames::recording::{CustomData, Metadata};
use workcell_frames::{
    DataBag, FrameError, ObjectAction, ObjectInfo, Pose, Quaternion, RigidTransform, RobotFrame,
    RobotInfo, RobotScene, RobotState, Trajectory, Vector3,
};

fn init_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .with_target(true)
        .init();
}

fn offset(x: f64, y: f64, z: f64) -> RigidTransform {
    RigidTransform::from_translation(Vector3::new(x, y, z))
}

fn scene() -> RobotScene {
    let mut scene = RobotScene::new("scene_001", "dual robot welding");
    scene.add_robot(
        RobotInfo::new("robot_1", "abb_irb6700_150_320")
            .with_frame("tcp", Pose::new(offset(0., 0., 100.), "robot_1"))
            .with_frame("tool0", Pose::new(offset(0., 0., 50.), "robot_1"))
            .movable(true),
    );
    scene.add_robot(
        RobotInfo::new("robot_2", "abb_irb6700_150_320")
            // 2m along x, facing back towards robot_1
            .with_pose(Pose::in_world(RigidTransform::new(
                Vector3::new(2000., 0., 0.),
                Quaternion::new(0., 0., 1., 0.),
            )))
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

fn frame() -> Result<RobotFrame, FrameError> {
    let mut frame = RobotFrame::new(1);
    frame.timestamp = 1_234_567_890.;
    frame.frame_id = "frame_001".into();

    let mut state = RobotState::new("robot_1");
    state.joints = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
    state.tcp_pose = Some(offset(100., 200., 300.).to_matrix()?);
    state.timestamp = frame.timestamp;
    frame.add_robot_state(state);

    let mut trajectory = Trajectory::new("robot_1", "world");
    for (i, waypoint) in [offset(100., 200., 300.), offset(150., 250., 350.)]
        .iter()
        .enumerate()
    {
        trajectory.push_waypoint(waypoint.to_matrix()?, frame.timestamp + i as f64 * 10.);
    }
    frame.add_trajectory(trajectory);

    frame.object_actions = vec![
        ObjectAction::move_to("robot_1/tool0", Pose::new(offset(0., 0., 60.), "robot_1")),
        ObjectAction::add(
            "new_workpiece_002",
            Pose::in_world(offset(100., 100., 0.)),
            Some(Metadata::Object(
                ObjectInfo::new("new_workpiece_002", "welding_part")
                    .with_description("newly placed part")
                    .movable(true),
            )),
        ),
    ];
    frame
        .custom_data
        .insert("weld_current".into(), CustomData::Number(180.));
    Ok(frame)
}

fn log_poses(scene: &RobotScene) -> Result<(), Box<dyn Error>> {
    let graph = scene.frame_graph()?;
    for name in ["robot_1/tool0", "tool_head_001", "workpiece_001"] {
        info!(
            frame = name,
            in_world = %graph.transform_to_world(name)?,
            in_robot_2 = %graph.transform_between(name, "robot_2")?,
            "resolved"
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logger();

    let mut bag = DataBag::new("bag_001", scene());
    bag.bag_name = "welding run".into();
    info!(scene = %bag.scene.scene_name, "before replay");
    log_poses(&bag.scene)?;

    bag.add_frame(frame()?)?;
    let replayed = bag.replay()?;
    info!(frames = bag.frames().len(), "after replay");
    log_poses(&replayed)?;

    println!("{}", serde_yaml::to_string(&bag)?);
    Ok(())
}
