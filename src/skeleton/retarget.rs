//! Moving a dumped character onto the generic rig.
//!
//! The dump gives every joint's world matrix as the author left it: the
//! generic rest pose, customized by body-shape edits and posed. We want the
//! generic rig's rest pose instead, with all the author's changes expressed
//! as per-joint pose overrides. So the rest matrices are swapped for the
//! default rig's and then each joint gets the local override that puts it
//! back where the dump had it.
//!
//! Going top-down, with P[j] the already-fixed posed world of j's parent,
//! the override is
//!
//!     pose = (P[parent] L)^{-1} D
//!
//! where L is the new local bind and D the dumped world matrix. Overrides
//! are decomposed to TRS and snapped, and children are matched against the
//! parent's posed world *after* snapping, so rounding never accumulates
//! down the chain.

use super::rigfile::RigFile;
use super::Skeleton;
use crate::errors::Result;
use crate::skinning::Trs;
use crate::taxonomy::{self, Finding, Taxonomy};
use crate::util::matrix;
use cgmath::Matrix4;

pub struct RetargetReport {
    /// Joints whose rest matrix came from the default rig.
    pub rebound: usize,
    /// Joints that kept the dump's matrix as their rest.
    pub kept: usize,
    pub findings: Vec<Finding>,
}

/// Replaces the rest matrix of every joint the rig knows.
pub fn rebind(skel: &mut Skeleton, rig: &RigFile) -> Result<(usize, usize)> {
    let mut rebound = 0;
    let worlds: Vec<Matrix4<f64>> = skel
        .joints()
        .iter()
        .map(|j| match rig.get(&j.name) {
            Some(m) => {
                rebound += 1;
                *m
            }
            None => j.rest_world,
        })
        .collect();
    skel.set_rest_worlds(&worlds)?;
    Ok((rebound, skel.len() - rebound))
}

/// Pose overrides that put every joint at the given world matrix.
pub fn match_world(skel: &Skeleton, targets: &[Matrix4<f64>]) -> Vec<Trs> {
    let mut posed: Vec<Matrix4<f64>> = Vec::with_capacity(skel.len());
    let mut poses = Vec::with_capacity(skel.len());
    for (id, j) in skel.joints().iter().enumerate() {
        let frame = match j.parent {
            Some(p) => posed[p] * j.local_bind,
            None => j.local_bind,
        };
        let local = matrix::invert_or_bump(&frame) * targets[id];
        let pose = Trs::from_matrix(&local).snapped();
        posed.push(frame * pose.to_matrix());
        poses.push(pose);
    }
    poses
}

/// Rebinds to `rig` and poses the skeleton back into the dump's shape. The
/// resulting poses are also the baseline. With no rig the dump's pose is
/// the rest pose.
pub fn retarget(skel: &mut Skeleton, rig: Option<&RigFile>, tax: &Taxonomy) -> Result<RetargetReport> {
    let rig = match rig {
        Some(rig) => rig,
        None => {
            info!("no default rig; using the dump as the rest pose");
            let n = skel.len();
            skel.reset_poses();
            skel.commit_baselines(vec![Trs::identity(); n])?;
            return Ok(RetargetReport { rebound: 0, kept: n, findings: vec![] });
        }
    };

    let dumped: Vec<Matrix4<f64>> = skel.joints().iter().map(|j| j.rest_world).collect();
    let (rebound, kept) = rebind(skel, rig)?;
    if kept != 0 {
        debug!("{} joints not in the default rig keep their dumped rest", kept);
    }
    let poses = match_world(skel, &dumped);
    skel.commit_poses(poses, true)?;
    let findings = taxonomy::audit(skel, tax);
    info!(
        "retargeted {} joints ({} from the default rig), {} taxonomy findings",
        skel.len(),
        rebound,
        findings.len(),
    );
    Ok(RetargetReport { rebound, kept, findings })
}

#[test]
fn test_retarget_reproduces_dump() {
    use crate::fixtures;
    use crate::skinning::world_transforms;

    // Use the posed humanoid as the "dump" and its rest as the default rig.
    let posed = fixtures::humanoid();
    let rig = {
        let mut r = RigFile::new();
        for j in posed.joints() {
            r.insert(&j.name, j.rest_world);
        }
        r
    };
    let mut skel = Skeleton::build(
        posed
            .records()
            .into_iter()
            .zip(world_transforms(&posed))
            .map(|(mut r, w)| {
                r.world = w;
                r
            })
            .collect(),
    )
    .unwrap();
    let dumped: Vec<Matrix4<f64>> = skel.joints().iter().map(|j| j.rest_world).collect();

    let report = retarget(&mut skel, Some(&rig), &Taxonomy::builtin()).unwrap();
    assert_eq!(report.rebound, skel.len());
    assert_eq!(report.kept, 0);

    let now = world_transforms(&skel);
    for (a, b) in now.iter().zip(&dumped) {
        for c in 0..4 {
            for r in 0..4 {
                assert!((a[c][r] - b[c][r]).abs() < 1e-3);
            }
        }
    }
    for (j, orig) in skel.joints().iter().zip(posed.joints()) {
        assert_eq!(j.baseline, j.pose);
        assert!(!j.pose.group_differs(&orig.pose, crate::taxonomy::DofGroup::Rotation));
        assert!(!j.pose.group_differs(&orig.pose, crate::taxonomy::DofGroup::Scale));
    }
}

#[test]
fn test_retarget_fallback() {
    use crate::fixtures;

    let mut skel = fixtures::two_joint_chain();
    let report = retarget(&mut skel, None, &Taxonomy::builtin()).unwrap();
    assert_eq!(report.rebound, 0);
    for j in skel.joints() {
        assert_eq!(j.pose, Trs::identity());
        assert_eq!(j.baseline, Trs::identity());
    }
}
