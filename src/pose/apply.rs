//! Loading poses onto a skeleton.
//!
//! For every DOF the mode includes, the joint takes the file's value, or its
//! baseline value when the file says nothing about that group. So loading a
//! pose-only file brings FK controls the file does not mention back to the
//! baseline and never touches body shape, and loading a shape-only file does
//! the reverse. Constrained DOFs are put back to the baseline (the rig's own
//! constraints own them), except in raw mode. Locked DOFs are never touched.
//! Lines for joints the skeleton does not have are kept on the skeleton, so
//! writing a pose file back out still carries them.
//!
//! All new poses are computed first and committed together.

use super::{PoseFile, PoseMode, PoseOverride};
use crate::errors::Result;
use crate::skeleton::Skeleton;
use crate::skinning::trs::canonical;
use crate::skinning::Trs;
use crate::taxonomy::{Dof, DofClass, DofGroup, Taxonomy, ALL_DOFS};
use cgmath::{InnerSpace, One, Quaternion, Vector3};
use std::collections::HashMap;

/// The values a file gives for one joint; `None` for groups it skips.
#[derive(Default)]
struct JointOverrides {
    offset: Option<Vector3<f64>>,
    rotation: Option<Quaternion<f64>>,
    scale: Option<Vector3<f64>>,
}

impl JointOverrides {
    fn set(&mut self, o: &PoseOverride) {
        match o.group {
            DofGroup::Offset => self.offset = o.vector(),
            DofGroup::Rotation => self.rotation = o.rotation(),
            DofGroup::Scale => self.scale = o.vector(),
        }
    }

    /// True if the file moves `dof` away from its default.
    fn moves(&self, dof: Dof) -> bool {
        let id = Trs::identity();
        let moved = match dof.group() {
            DofGroup::Offset => self.offset.map(|v| v[dof.axis()] != id.translation[dof.axis()]),
            DofGroup::Rotation => self.rotation.map(|q| q != id.rotation),
            DofGroup::Scale => self.scale.map(|v| v[dof.axis()] != id.scale[dof.axis()]),
        };
        moved.unwrap_or(false)
    }

    /// `base` with every given group replaced.
    fn over(&self, base: &Trs) -> Trs {
        Trs {
            translation: self.offset.unwrap_or(base.translation),
            rotation: self.rotation.unwrap_or(base.rotation),
            scale: self.scale.unwrap_or(base.scale),
        }
    }
}

pub struct ApplyReport {
    /// Joints that had at least one override.
    pub joints: usize,
    pub unused: usize,
}

pub fn apply(file: &PoseFile, skel: &mut Skeleton, tax: &Taxonomy, mode: PoseMode) -> Result<ApplyReport> {
    let mut by_joint: HashMap<&str, JointOverrides> = HashMap::new();
    for o in &file.overrides {
        by_joint.entry(o.joint.as_str()).or_insert_with(JointOverrides::default).set(o);
    }

    let mut poses = Vec::with_capacity(skel.len());
    for j in skel.joints() {
        let classes = tax.classes(&j.name);
        let source = match by_joint.get(j.name.as_str()) {
            Some(ovr) => ovr.over(&j.baseline),
            None => j.baseline,
        };
        let mut pose = j.pose;
        for &dof in ALL_DOFS.iter() {
            let class = classes.get(dof);
            if mode.includes(class) {
                pose.set_dof_from(&source, dof);
            } else if class == DofClass::Constrained && mode != PoseMode::Raw {
                pose.set_dof_from(&j.baseline, dof);
            }
        }
        poses.push(pose);
    }

    let joints = by_joint.keys().filter(|name| skel.find(name).is_some()).count();
    skel.commit_poses(poses, mode.includes_shape())?;
    skel.keep_unused_pose_lines(file.unused.iter().cloned());
    info!("applied {} pose to {} joints", mode, joints);
    Ok(ApplyReport { joints, unused: file.unused.len() })
}

/// Raises a rotation to a real power (scales its angle).
fn quat_pow(q: Quaternion<f64>, z: f64) -> Quaternion<f64> {
    let q = canonical(q.normalize());
    let len = q.v.magnitude();
    if len < 1e-12 {
        return Quaternion::new(1.0, 0.0, 0.0, 0.0);
    }
    let half = len.atan2(q.s) * z;
    Quaternion::from_sv(half.cos(), q.v / len * half.sin())
}

/// A shape change added on top of scaled customization, weighted by
/// `factor`. Only DOFs that `scale_shape` scales take it.
pub struct RigDelta<'a> {
    pub file: &'a PoseFile,
    pub factor: f64,
}

/// Scaled delta scales never go below this.
const MIN_DELTA_SCALE: f64 = 0.01;

/// Scales each joint's body-shape customization by `z`, starting from its
/// baseline: 0 gives the generic body, 1 the baseline, 2 twice the
/// baseline's deviation. FK rotations and locked DOFs keep their current
/// values.
///
/// With a `delta`, each scaled DOF the delta file mentions also moves by
/// the delta's deviation from identity times `delta.factor`.
pub fn scale_shape(skel: &mut Skeleton, tax: &Taxonomy, z: f64, delta: Option<&RigDelta>) -> Result<()> {
    let mut deltas: HashMap<&str, JointOverrides> = HashMap::new();
    if let Some(delta) = delta {
        for o in &delta.file.overrides {
            deltas.entry(o.joint.as_str()).or_insert_with(JointOverrides::default).set(o);
        }
    }
    let delta_z = delta.map(|d| d.factor).unwrap_or(0.0);

    let mut poses = Vec::with_capacity(skel.len());
    for j in skel.joints() {
        let classes = tax.classes(&j.name);
        let b = &j.baseline;
        let d = deltas.get(j.name.as_str());
        let mut pose = j.pose;
        for &dof in ALL_DOFS.iter() {
            let scaled = match classes.get(dof) {
                DofClass::Shape | DofClass::Noise | DofClass::Unknown | DofClass::Constrained => true,
                DofClass::Pose | DofClass::Locked => false,
            };
            if !scaled {
                if d.map(|d| d.moves(dof)).unwrap_or(false) && delta_z != 0.0 {
                    debug!("{}: ignoring rig delta for {} {}", j.name, dof.group().name(), dof.axis());
                }
                continue;
            }
            let i = dof.axis();
            match dof.group() {
                DofGroup::Offset => {
                    pose.translation[i] = b.translation[i] * z;
                    if let Some(off) = d.and_then(|d| d.offset) {
                        pose.translation[i] += off[i] * delta_z;
                    }
                }
                DofGroup::Scale => {
                    let s = b.scale[i];
                    pose.scale[i] = s.signum() * s.abs().powf(z);
                    if let Some(scale) = d.and_then(|d| d.scale) {
                        pose.scale[i] += (scale[i] - 1.0) * delta_z;
                        if pose.scale[i] < MIN_DELTA_SCALE {
                            pose.scale[i] = MIN_DELTA_SCALE;
                        }
                    }
                }
                DofGroup::Rotation => {
                    let mut q = quat_pow(b.rotation, z);
                    if let Some(r) = d.and_then(|d| d.rotation) {
                        q = q + (r - Quaternion::one()) * delta_z;
                        q = if q.magnitude2() > 1e-12 { canonical(q.normalize()) } else { Quaternion::one() };
                    }
                    pose.rotation = q;
                }
            }
        }
        poses.push(pose);
    }
    skel.commit_poses(poses, false)?;
    match delta {
        Some(delta) => info!("scaled body shape by {} plus a rig delta by {}", z, delta.factor),
        None => info!("scaled body shape by {}", z),
    }
    Ok(())
}

#[cfg(test)]
fn assert_trs_close(a: &Trs, b: &Trs, eps: f64) {
    use crate::taxonomy::ALL_GROUPS;

    for &g in ALL_GROUPS.iter() {
        let (x, y) = (a.group_values(g), b.group_values(g));
        let d = if g == DofGroup::Rotation {
            1.0 - x.iter().zip(&y).map(|(p, q)| p * q).sum::<f64>().abs()
        } else {
            x.iter().zip(&y).map(|(p, q)| (p - q).abs()).fold(0.0, f64::max)
        };
        assert!(d < eps, "{:?} != {:?}", a, b);
    }
}

#[test]
fn test_pose_round_trip() {
    use crate::fixtures;
    use crate::pose::{read, write};

    let tax = Taxonomy::builtin();
    let original = fixtures::humanoid();
    let text = write(&original, &tax, PoseMode::Pose).to_text();

    // Start from a skeleton with no FK pose but different shape values.
    let mut skel = original.clone();
    let mut poses: Vec<Trs> = skel.joints().iter().map(|j| j.baseline).collect();
    let hand = skel.find("cf_J_Hand_s_L").unwrap();
    poses[hand].scale.x = 0.8;
    skel.commit_poses(poses.clone(), false).unwrap();
    let baselines: Vec<Trs> = skel.joints().iter().map(|j| j.baseline).collect();

    let file = read(&text, &skel).unwrap();
    apply(&file, &mut skel, &tax, PoseMode::Pose).unwrap();

    for (id, (j, orig)) in skel.joints().iter().zip(original.joints()).enumerate() {
        let classes = tax.classes(&j.name);
        for &dof in ALL_DOFS.iter() {
            match classes.get(dof) {
                DofClass::Pose => {
                    let mut a = Trs::identity();
                    let mut b = Trs::identity();
                    a.set_dof_from(&j.pose, dof);
                    b.set_dof_from(&orig.pose, dof);
                    assert_trs_close(&a, &b, 1e-4);
                }
                _ => {
                    let mut a = Trs::identity();
                    let mut b = Trs::identity();
                    a.set_dof_from(&j.pose, dof);
                    b.set_dof_from(&poses[id], dof);
                    assert_trs_close(&a, &b, 1e-12);
                }
            }
        }
        assert_eq!(j.baseline, baselines[id]);
    }
}

#[test]
fn test_apply_resets_unmentioned_to_baseline() {
    use crate::fixtures;

    let tax = Taxonomy::builtin();
    let mut skel = fixtures::humanoid();
    let spine = skel.find("cf_J_Spine01").unwrap();
    assert_ne!(skel.joint(spine).pose, skel.joint(spine).baseline);

    // An empty pose file puts every FK control back to the baseline.
    let report = apply(&PoseFile::default(), &mut skel, &tax, PoseMode::Pose).unwrap();
    assert_eq!(report.joints, 0);
    for j in skel.joints() {
        assert_eq!(j.pose, j.baseline);
    }
}

#[test]
fn test_apply_shape_updates_baseline() {
    use crate::fixtures;
    use crate::pose::read;

    let tax = Taxonomy::builtin();
    let mut skel = fixtures::humanoid();
    let file = read("cf_J_Head_s scale 2 2 2\ncf_J_Head rotation 1 0 0 0\n", &skel).unwrap();
    apply(&file, &mut skel, &tax, PoseMode::Shape).unwrap();
    let head_s = skel.joint(skel.find("cf_J_Head_s").unwrap());
    assert_eq!(head_s.pose.scale, cgmath::vec3(2.0, 2.0, 2.0));
    assert_eq!(head_s.baseline, head_s.pose);
    // Shape mode ignores FK rotations.
    let head = skel.joint(skel.find("cf_J_Head").unwrap());
    assert!(head.pose.group_differs(&Trs::identity(), DofGroup::Rotation));
    // Shape joints not in the file went back to the baseline, which for the
    // hand is the fixture's customization.
    let hand = skel.joint(skel.find("cf_J_Hand_s_L").unwrap());
    assert_eq!(hand.pose.scale, cgmath::vec3(1.2, 1.1, 1.0));
}

#[test]
fn test_apply_locked_and_constrained() {
    use crate::pose::read;
    use crate::skeleton::JointRecord;
    use cgmath::{vec3, Matrix4, SquareMatrix};

    let tax = Taxonomy::builtin();
    let mut skel = Skeleton::build(vec![
        JointRecord { name: "cf_J_Hips".into(), parent: None, world: Matrix4::identity() },
        JointRecord { name: "cf_J_ArmUp00_L".into(), parent: Some("cf_J_Hips".into()), world: Matrix4::identity() },
    ])
    .unwrap();
    let mut poses = skel.poses();
    // ArmUp00 is "sxcfscc": offset y locked, offset z constrained.
    poses[1].translation = vec3(0.0, 0.5, 0.5);
    skel.commit_poses(poses, false).unwrap();

    let file = read("cf_J_ArmUp00_L offset 0.1 0.2 0.3\n", &skel).unwrap();
    apply(&file, &mut skel, &tax, PoseMode::Shape).unwrap();
    let t = skel.joint(1).pose.translation;
    assert_eq!(t, vec3(0.1, 0.5, 0.0));

    // Raw loads everything.
    apply(&file, &mut skel, &tax, PoseMode::Raw).unwrap();
    assert_eq!(skel.joint(1).pose.translation, vec3(0.1, 0.2, 0.3));
}

#[test]
fn test_scale_shape() {
    use crate::fixtures;

    let tax = Taxonomy::builtin();
    let mut skel = fixtures::humanoid();
    let hand = skel.find("cf_J_Hand_s_L").unwrap();
    let arm = skel.find("cf_J_ArmUp00_L").unwrap();
    let arm_rotation = skel.joint(arm).pose.rotation;

    scale_shape(&mut skel, &tax, 0.0, None).unwrap();
    assert_eq!(skel.joint(hand).pose.scale, cgmath::vec3(1.0, 1.0, 1.0));
    assert_eq!(skel.joint(arm).pose.translation.x, 0.0);
    // FK rotation kept.
    assert_eq!(skel.joint(arm).pose.rotation, arm_rotation);

    scale_shape(&mut skel, &tax, 2.0, None).unwrap();
    let s = skel.joint(hand).pose.scale;
    assert!((s.x - 1.44).abs() < 1e-12 && (s.y - 1.21).abs() < 1e-12);
    assert!((skel.joint(arm).pose.translation.x - 0.04).abs() < 1e-12);

    // Baseline is left alone.
    assert_eq!(skel.joint(hand).baseline.scale, cgmath::vec3(1.2, 1.1, 1.0));
}

#[test]
fn test_scale_shape_with_rig_delta() {
    use crate::fixtures;
    use crate::pose::read;

    let tax = Taxonomy::builtin();
    let mut skel = fixtures::humanoid();
    let hand = skel.find("cf_J_Hand_s_L").unwrap();
    let arm = skel.find("cf_J_ArmUp00_L").unwrap();
    let arm_rotation = skel.joint(arm).pose.rotation;
    let arm_y = skel.joint(arm).pose.translation.y;

    // ArmUp00 rotation is FK and offset y is locked, so those ignore the delta.
    let file = read(
        "cf_J_Hand_s_L scale 1.5 0.5 1\n\
         cf_J_ArmUp00_L offset 0.1 0.3 0\n\
         cf_J_ArmUp00_L rotation 0 90 0\n",
        &skel,
    )
    .unwrap();
    let delta = RigDelta { file: &file, factor: 0.5 };
    scale_shape(&mut skel, &tax, 1.0, Some(&delta)).unwrap();
    let s = skel.joint(hand).pose.scale;
    assert!((s.x - 1.45).abs() < 1e-12);
    assert!((s.y - 0.85).abs() < 1e-12);
    assert!((s.z - 1.0).abs() < 1e-12);
    let t = skel.joint(arm).pose.translation;
    assert!((t.x - 0.07).abs() < 1e-12);
    assert_eq!(t.y, arm_y);
    assert_eq!(skel.joint(arm).pose.rotation, arm_rotation);

    // A large shrinking delta stops at the minimum scale.
    let file = read("cf_J_Hand_s_L scale 0 0 0\n", &skel).unwrap();
    scale_shape(&mut skel, &tax, 1.0, Some(&RigDelta { file: &file, factor: 10.0 })).unwrap();
    assert_eq!(skel.joint(hand).pose.scale, cgmath::vec3(MIN_DELTA_SCALE, MIN_DELTA_SCALE, MIN_DELTA_SCALE));
}

#[test]
fn test_quat_pow() {
    use cgmath::{Deg, Rotation3};

    let q = Quaternion::from_angle_y(Deg(60.0));
    let h = quat_pow(q, 0.5);
    let e = Quaternion::from_angle_y(Deg(30.0));
    assert!((h.s - e.s).abs() < 1e-12 && (h.v.y - e.v.y).abs() < 1e-12);
    assert_eq!(quat_pow(q, 0.0), Quaternion::new(1.0, 0.0, 0.0, 0.0));
}
