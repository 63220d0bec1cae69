//! Skeletons and meshes shared by the unit tests.

use crate::mesh::{Influence, Mesh, ShapeChannel, SkinBinding};
use crate::skeleton::{JointRecord, Skeleton};
use crate::skinning::Trs;
use cgmath::{vec3, Deg, Matrix4, Point3, Quaternion, Rotation3};

fn at(name: &str, parent: Option<&str>, x: f64, y: f64, z: f64) -> JointRecord {
    JointRecord {
        name: name.to_string(),
        parent: parent.map(|s| s.to_string()),
        world: Matrix4::from_translation(vec3(x, y, z)),
    }
}

/// `root` at the origin with `child` on top of it; the child's pose turns
/// it 90 degrees about X.
pub fn two_joint_chain() -> Skeleton {
    let mut skel = Skeleton::build(vec![
        at("root", None, 0.0, 0.0, 0.0),
        at("child", Some("root"), 0.0, 0.0, 0.0),
    ])
    .unwrap();
    let mut poses = skel.poses();
    poses[1].rotation = Quaternion::from_angle_x(Deg(90.0));
    skel.commit_poses(poses, false).unwrap();
    skel
}

/// Joint families of the generic rig that `humanoid` uses.
pub static HUMANOID_JOINTS: &[(&str, Option<&str>, [f64; 3])] = &[
    ("cf_N_height", None, [0.0, 0.0, 0.0]),
    ("cf_J_Hips", Some("cf_N_height"), [0.0, 1.0, 0.0]),
    ("cf_J_Kosi01", Some("cf_J_Hips"), [0.0, 0.95, 0.0]),
    ("cf_J_Kosi01_s", Some("cf_J_Kosi01"), [0.0, 0.95, 0.0]),
    ("cf_J_LegUp00_L", Some("cf_J_Kosi01"), [0.1, 0.9, 0.0]),
    ("cf_J_LegLow01_L", Some("cf_J_LegUp00_L"), [0.1, 0.5, 0.0]),
    ("cf_J_Foot01_L", Some("cf_J_LegLow01_L"), [0.1, 0.1, 0.0]),
    ("cf_J_LegUp00_R", Some("cf_J_Kosi01"), [-0.1, 0.9, 0.0]),
    ("cf_J_LegLow01_R", Some("cf_J_LegUp00_R"), [-0.1, 0.5, 0.0]),
    ("cf_J_Foot01_R", Some("cf_J_LegLow01_R"), [-0.1, 0.1, 0.0]),
    ("cf_J_Spine01", Some("cf_J_Hips"), [0.0, 1.1, 0.0]),
    ("cf_J_Spine02", Some("cf_J_Spine01"), [0.0, 1.25, 0.0]),
    ("cf_J_Neck", Some("cf_J_Spine02"), [0.0, 1.45, 0.0]),
    ("cf_J_Head", Some("cf_J_Neck"), [0.0, 1.55, 0.0]),
    ("cf_J_Head_s", Some("cf_J_Head"), [0.0, 1.55, 0.0]),
    ("cf_J_ArmUp00_L", Some("cf_J_Spine02"), [0.2, 1.4, 0.0]),
    ("cf_J_ArmLow01_L", Some("cf_J_ArmUp00_L"), [0.45, 1.4, 0.0]),
    ("cf_J_Hand_L", Some("cf_J_ArmLow01_L"), [0.7, 1.4, 0.0]),
    ("cf_J_Hand_s_L", Some("cf_J_Hand_L"), [0.7, 1.4, 0.0]),
    ("cf_J_ArmUp00_R", Some("cf_J_Spine02"), [-0.2, 1.4, 0.0]),
    ("cf_J_ArmLow01_R", Some("cf_J_ArmUp00_R"), [-0.45, 1.4, 0.0]),
    ("cf_J_Hand_R", Some("cf_J_ArmLow01_R"), [-0.7, 1.4, 0.0]),
    ("cf_J_Hand_s_R", Some("cf_J_Hand_R"), [-0.7, 1.4, 0.0]),
];

/// A small humanoid. Its baseline carries some body-shape customization
/// (bigger head and hands, wider shoulders) and its pose adds FK bends on
/// top of that.
pub fn humanoid() -> Skeleton {
    let records = HUMANOID_JOINTS
        .iter()
        .map(|&(name, parent, p)| at(name, parent, p[0], p[1], p[2]))
        .collect();
    let mut skel = Skeleton::build(records).unwrap();

    let mut baseline = vec![Trs::identity(); skel.len()];
    let id = |name: &str| skel.find(name).unwrap();
    baseline[id("cf_J_Head_s")].scale = vec3(1.1, 1.15, 1.1);
    baseline[id("cf_J_Hand_s_L")].scale = vec3(1.2, 1.1, 1.0);
    baseline[id("cf_J_Hand_s_R")].scale = vec3(1.2, 1.1, 1.0);
    baseline[id("cf_J_ArmUp00_L")].translation = vec3(0.02, 0.0, 0.0);
    baseline[id("cf_J_ArmUp00_R")].translation = vec3(-0.02, 0.0, 0.0);
    baseline[id("cf_J_Kosi01_s")].scale = vec3(1.05, 1.0, 1.1);

    let mut poses = baseline.clone();
    poses[id("cf_J_Spine01")].rotation = Quaternion::from_angle_x(Deg(20.0));
    poses[id("cf_J_ArmUp00_L")].rotation = Quaternion::from_angle_z(Deg(-40.0));
    poses[id("cf_J_ArmLow01_R")].rotation = Quaternion::from_angle_y(Deg(35.0));
    poses[id("cf_J_LegUp00_L")].rotation = Quaternion::from_angle_x(Deg(-25.0));
    poses[id("cf_J_Head")].rotation =
        Quaternion::from_angle_y(Deg(10.0)) * Quaternion::from_angle_x(Deg(5.0));

    skel.commit_poses(baseline, true).unwrap();
    skel.commit_poses(poses, false).unwrap();
    skel
}

/// A mesh of a few vertices around each arm and leg joint of `humanoid`,
/// each bound to its joint and the joint's parent.
pub fn humanoid_mesh(skel: &Skeleton) -> Mesh {
    let mut positions = vec![];
    let mut bindings = vec![];
    for j in skel.joints() {
        let parent = match j.parent {
            Some(p) => skel.joint(p).name.clone(),
            None => continue,
        };
        let c = j.rest_world.w;
        for &(dx, dy, dz) in &[(0.03, 0.0, 0.0), (0.0, -0.04, 0.02), (-0.02, 0.01, -0.03)] {
            positions.push(Point3::new(c.x + dx, c.y + dy, c.z + dz));
            bindings.push(SkinBinding::new(vec![
                Influence::new(&j.name, 0.7),
                Influence::new(&parent, 0.3),
            ]));
        }
    }
    let count = positions.len();
    let bumped = positions.iter().map(|p| Point3::new(p.x * 1.01, p.y, p.z)).collect();
    let mut mesh = Mesh::new("body", positions, bindings);
    mesh.channels.push(ShapeChannel::new("wide", bumped));
    assert_eq!(mesh.len(), count);
    mesh
}
