//! Copying FK rotations from left joints to right joints.
//!
//! A hand-written FK pose usually gives only the left side. Every left
//! rotation (a `_L` joint whose rotation is an FK control) is copied to its
//! `_R` twin unless the file already says something about the twin's
//! rotation. Left and right joints have mirrored local frames, so copying the
//! values as they are gives the mirror image. With `Mirror::Flip` the y and z
//! angles are negated as well, which turns a mirrored motion into the same
//! motion on both sides.

use super::{PoseFile, PoseOverride};
use crate::errors::{Error, Result};
use crate::skeleton::Skeleton;
use crate::taxonomy::{Dof, DofClass, DofGroup, Taxonomy};
use std::collections::HashSet;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mirror {
    Same,
    Flip,
}

impl FromStr for Mirror {
    type Err = Error;

    fn from_str(s: &str) -> Result<Mirror> {
        Ok(match s {
            "same" => Mirror::Same,
            "flip" => Mirror::Flip,
            _ => bail!("unknown mirror mode {:?} (expected same or flip)", s),
        })
    }
}

fn right_twin(name: &str) -> Option<String> {
    if name.ends_with('L') {
        Some(format!("{}R", &name[..name.len() - 1]))
    } else {
        None
    }
}

/// Negating the y and z angles is conjugation by a half turn about x: it
/// keeps the Euler x angle and the quaternion's w and x.
fn flip(values: &[f64]) -> Vec<f64> {
    match *values {
        [x, y, z] => vec![x, -y, -z],
        [w, x, y, z] => vec![w, x, -y, -z],
        _ => values.to_vec(),
    }
}

/// Adds the right-side rotations the file leaves out. Returns how many were
/// added.
pub fn mirror_left_to_right(file: &mut PoseFile, skel: &Skeleton, tax: &Taxonomy, mode: Mirror) -> usize {
    let given: HashSet<&str> = file
        .overrides
        .iter()
        .filter(|o| o.group == DofGroup::Rotation)
        .map(|o| o.joint.as_str())
        .collect();

    let mut added = vec![];
    for o in &file.overrides {
        if o.group != DofGroup::Rotation || tax.classify(&o.joint, Dof::Rotation) != DofClass::Pose {
            continue;
        }
        let twin = match right_twin(&o.joint) {
            Some(twin) => twin,
            None => continue,
        };
        if given.contains(twin.as_str()) || skel.find(&twin).is_none() {
            continue;
        }
        let values = match mode {
            Mirror::Same => o.values.clone(),
            Mirror::Flip => flip(&o.values),
        };
        added.push(PoseOverride { joint: twin, group: DofGroup::Rotation, values });
    }

    let n = added.len();
    file.overrides.extend(added);
    if n != 0 {
        debug!("mirrored {} FK rotations from left to right", n);
    }
    n
}

#[test]
fn test_mirror_left_to_right() {
    use crate::fixtures;
    use crate::pose::read;

    let skel = fixtures::humanoid();
    let tax = Taxonomy::builtin();
    let text = "\
cf_J_ArmUp00_L rotation 10 20 30
cf_J_Hand_L rotation 0.9 0.1 0.2 0.3
cf_J_Hand_R rotation 1 0 0 0
cf_J_Hand_s_L scale 2 2 2
";
    let mut file = read(text, &skel).unwrap();
    assert_eq!(mirror_left_to_right(&mut file, &skel, &tax, Mirror::Same), 1);
    let arm_r = file.overrides.last().unwrap();
    assert_eq!(arm_r.joint, "cf_J_ArmUp00_R");
    assert_eq!(arm_r.values, vec![10.0, 20.0, 30.0]);
    // The file's own right hand wins.
    assert_eq!(file.overrides.iter().filter(|o| o.joint == "cf_J_Hand_R").count(), 1);

    let mut file = read(text, &skel).unwrap();
    mirror_left_to_right(&mut file, &skel, &tax, Mirror::Flip);
    assert_eq!(file.overrides.last().unwrap().values, vec![10.0, -20.0, -30.0]);
}

#[test]
fn test_flip_is_half_turn_conjugation() {
    use crate::pose::euler_yzx;
    use cgmath::{Deg, InnerSpace, Quaternion, Rotation3};

    let q = euler_yzx(10.0, 20.0, 30.0);
    let half = Quaternion::from_angle_x(Deg(180.0));
    let expected = half * q * half.conjugate();
    let f = flip(&[q.s, q.v.x, q.v.y, q.v.z]);
    let got = Quaternion::new(f[0], f[1], f[2], f[3]);
    assert!((got - expected).magnitude() < 1e-12);
    let e = euler_yzx(10.0, -20.0, -30.0);
    assert!((got - e).magnitude() < 1e-12);
}
