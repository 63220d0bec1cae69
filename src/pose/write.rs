use super::{PoseFile, PoseMode, PoseOverride};
use crate::skeleton::Skeleton;
use crate::skinning::Trs;
use crate::taxonomy::{DofGroup, Taxonomy, ALL_DOFS, ALL_GROUPS};

/// Collects the overrides of `skel` that `mode` covers, parents before
/// children.
///
/// A group is written if its value is not the identity or not the baseline
/// (so loading it puts back exactly this value) and the mode includes at
/// least one of its DOFs.
pub fn write(skel: &Skeleton, tax: &Taxonomy, mode: PoseMode) -> PoseFile {
    let identity = Trs::identity();
    let mut file = PoseFile::default();
    for j in skel.joints() {
        let classes = tax.classes(&j.name);
        for &group in ALL_GROUPS.iter() {
            if !group.dofs().iter().any(|&dof| mode.includes(classes.get(dof))) {
                continue;
            }
            if !j.pose.group_differs(&identity, group) && !j.pose.group_differs(&j.baseline, group) {
                continue;
            }
            file.overrides.push(PoseOverride {
                joint: j.name.clone(),
                group,
                values: j.pose.group_values(group),
            });
        }
    }
    for line in skel.unused_pose_lines() {
        let mut tokens = line.split_whitespace();
        let classes = tax.classes(tokens.next().unwrap_or(""));
        let dofs = match tokens.next().and_then(DofGroup::from_name) {
            Some(group) => group.dofs(),
            None => &ALL_DOFS[..],
        };
        if dofs.iter().any(|&dof| mode.includes(classes.get(dof))) {
            file.unused.push(line.clone());
        }
    }
    debug!("wrote {} {} overrides", file.overrides.len(), mode);
    file
}

#[test]
fn test_write_filters_by_mode() {
    use crate::fixtures;

    let skel = fixtures::humanoid();
    let tax = Taxonomy::builtin();

    let pose = write(&skel, &tax, PoseMode::Pose);
    let has = |f: &PoseFile, joint: &str, group: DofGroup| {
        f.overrides.iter().any(|o| o.joint == joint && o.group == group)
    };
    assert!(has(&pose, "cf_J_Spine01", DofGroup::Rotation));
    assert!(has(&pose, "cf_J_ArmUp00_L", DofGroup::Rotation));
    assert!(!has(&pose, "cf_J_Hand_s_L", DofGroup::Scale));
    assert!(!has(&pose, "cf_J_ArmUp00_L", DofGroup::Offset));
    // Untouched joints are not written at all.
    assert!(!pose.overrides.iter().any(|o| o.joint == "cf_J_Foot01_L"));

    let shape = write(&skel, &tax, PoseMode::Shape);
    assert!(has(&shape, "cf_J_Hand_s_L", DofGroup::Scale));
    assert!(has(&shape, "cf_J_ArmUp00_L", DofGroup::Offset));
    assert!(!has(&shape, "cf_J_Spine01", DofGroup::Rotation));

    let all = write(&skel, &tax, PoseMode::All);
    assert_eq!(all.overrides.len(), pose.overrides.len() + shape.overrides.len());
}

#[test]
fn test_write_reset_to_identity() {
    use crate::fixtures;

    // A shape joint put back to identity still differs from its baseline.
    let mut skel = fixtures::humanoid();
    let id = skel.find("cf_J_Hand_s_L").unwrap();
    let mut poses = skel.poses();
    poses[id] = Trs::identity();
    skel.commit_poses(poses, false).unwrap();
    let shape = write(&skel, &Taxonomy::builtin(), PoseMode::Shape);
    let o = shape
        .overrides
        .iter()
        .find(|o| o.joint == "cf_J_Hand_s_L" && o.group == DofGroup::Scale)
        .unwrap();
    assert_eq!(o.values, vec![1.0, 1.0, 1.0]);
}

#[test]
fn test_write_keeps_unused_lines() {
    use crate::fixtures;

    let mut skel = fixtures::humanoid();
    skel.keep_unused_pose_lines(vec!["cf_J_Tail01 scale 2 2 2".to_string(), "cf_J_Tail02 null".to_string()]);
    let tax = Taxonomy::builtin();
    let all = write(&skel, &tax, PoseMode::All);
    assert_eq!(all.unused, skel.unused_pose_lines());
    assert!(all.to_text().ends_with("cf_J_Tail01 scale 2 2 2\ncf_J_Tail02 null\n"));
    // Joints the taxonomy does not know are body shape, not FK pose.
    assert!(write(&skel, &tax, PoseMode::Pose).unused.is_empty());
}
