use super::{PoseFile, PoseOverride};
use crate::errors::{ErrorKind, Result};
use crate::skeleton::dump::{self, DumpOptions};
use crate::skeleton::Skeleton;
use crate::skinning::Trs;
use crate::taxonomy::{DofGroup, ALL_GROUPS};
use crate::util::matrix;
use cgmath::Matrix4;
use std::collections::HashMap;

/// Parses a pose file for `skel`. Skeleton dumps are accepted too and read
/// as the pose they show.
pub fn read(text: &str, skel: &Skeleton) -> Result<PoseFile> {
    if dump::is_dump(text) {
        return read_dump(text, skel);
    }

    let mut file = PoseFile::default();
    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let overrides = parse_line(line, n + 1)?;
        if skel.find(&overrides[0].joint).is_some() {
            file.overrides.extend(overrides);
        } else {
            file.unused.push(line.to_string());
        }
    }
    if !file.unused.is_empty() {
        info!("pose file: kept {} lines for joints not in the skeleton", file.unused.len());
    }
    Ok(file)
}

fn bad_line(line: usize, reason: String) -> crate::errors::Error {
    ErrorKind::BadPoseLine(line, reason).into()
}

fn parse_line(line: &str, n: usize) -> Result<Vec<PoseOverride>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(bad_line(n, "expected a joint name and a group".to_string()));
    }
    let joint = tokens[0].to_string();

    if tokens[1] == "null" {
        if tokens.len() != 2 {
            return Err(bad_line(n, "nothing may follow null".to_string()));
        }
        let id = Trs::identity();
        return Ok(ALL_GROUPS
            .iter()
            .map(|&group| PoseOverride { joint: joint.clone(), group, values: id.group_values(group) })
            .collect());
    }

    let group = match DofGroup::from_name(tokens[1]) {
        Some(g) => g,
        None => return Err(bad_line(n, format!("unknown group {:?}", tokens[1]))),
    };
    let mut values = Vec::with_capacity(4);
    for tok in &tokens[2..] {
        match tok.parse::<f64>() {
            Ok(x) if x.is_finite() => values.push(x),
            _ => return Err(bad_line(n, format!("bad number {:?}", tok))),
        }
    }
    let ok = match group {
        DofGroup::Rotation => values.len() == 3 || values.len() == 4,
        _ => values.len() == 3,
    };
    if !ok {
        return Err(bad_line(n, format!("wrong number of values for {}", group.name())));
    }
    let o = PoseOverride { joint, group, values };
    if group == DofGroup::Rotation && o.rotation().is_none() {
        return Err(bad_line(n, "zero quaternion".to_string()));
    }
    Ok(vec![o])
}

/// Each joint's pose is its local matrix in the dump relative to its local
/// bind.
fn read_dump(text: &str, skel: &Skeleton) -> Result<PoseFile> {
    let dump = dump::parse(text.as_bytes(), &DumpOptions::default())?;
    let worlds: HashMap<&str, &Matrix4<f64>> =
        dump.joints.iter().map(|j| (j.name.as_str(), &j.world)).collect();

    let mut file = PoseFile::default();
    let mut missing = 0;
    for j in &dump.joints {
        let id = match skel.find(&j.name) {
            Some(id) => id,
            None => {
                missing += 1;
                continue;
            }
        };
        let local = match j.parent.as_ref().and_then(|p| worlds.get(p.as_str())) {
            Some(parent) => matrix::invert_or_bump(parent) * j.world,
            None => j.world,
        };
        let basis = matrix::invert_or_bump(&skel.joint(id).local_bind) * local;
        let trs = Trs::from_matrix(&basis).snapped();
        for &group in ALL_GROUPS.iter() {
            file.overrides.push(PoseOverride {
                joint: j.name.clone(),
                group,
                values: trs.group_values(group),
            });
        }
    }
    if missing != 0 {
        debug!("pose dump: {} joints not in the skeleton", missing);
    }
    Ok(file)
}

#[test]
fn test_read_lines() {
    use crate::fixtures;

    let skel = fixtures::humanoid();
    let text = "\
# comment

cf_J_Hand_L rotation 1 0 0 0
cf_J_Hand_L offset 0.1 0 0
cf_J_Neck rotation 0 90 0
cf_J_Tail01 scale 2 2 2
cf_J_Head null
";
    let file = read(text, &skel).unwrap();
    assert_eq!(file.overrides.len(), 6);
    assert_eq!(file.overrides[2].values.len(), 3);
    assert_eq!(file.overrides[3].joint, "cf_J_Head");
    assert_eq!(file.overrides[5].values, vec![1.0, 1.0, 1.0]);
    assert_eq!(file.unused, vec!["cf_J_Tail01 scale 2 2 2".to_string()]);
    assert!(file.to_text().ends_with("cf_J_Tail01 scale 2 2 2\n"));
}

#[test]
fn test_read_bad_lines() {
    use crate::fixtures;

    let skel = fixtures::humanoid();
    for (text, line) in &[
        ("cf_J_Hand_L\n", 1),
        ("\ncf_J_Hand_L twist 1 2 3\n", 2),
        ("cf_J_Hand_L scale 1 2\n", 1),
        ("cf_J_Hand_L rotation 1 2 3 4 5\n", 1),
        ("cf_J_Hand_L offset 1 x 3\n", 1),
        ("cf_J_Hand_L rotation 0 0 0 0\n", 1),
        ("cf_J_Hand_L null 1\n", 1),
    ] {
        match read(text, &skel) {
            Err(crate::errors::Error(ErrorKind::BadPoseLine(n, _), _)) => assert_eq!(n, *line),
            r => panic!("{:?}: unexpected {:?}", text, r.map(|_| ())),
        }
    }
}

#[test]
fn test_read_dump_as_pose() {
    use crate::skeleton::JointRecord;
    use cgmath::{vec3, Deg, InnerSpace, Quaternion, Rotation3};

    let skel = Skeleton::build(vec![
        JointRecord {
            name: "cf_J_Root".to_string(),
            parent: None,
            world: Matrix4::from_translation(vec3(0.0, 0.0, 0.0)),
        },
        JointRecord {
            name: "cf_J_Hips".to_string(),
            parent: Some("cf_J_Root".to_string()),
            world: Matrix4::from_translation(vec3(0.0, 1.0, 0.0)),
        },
    ])
    .unwrap();

    // Hips is turned 90 degrees about z and raised by one.
    let text = "\
cf_J_Root--UnityEngine.GameObject
@parent<Transform> = Scene
@localToWorldMatrix<Matrix4x4> = 1 0 0 0
0 1 0 0
0 0 1 0
0 0 0 1
cf_J_Hips--UnityEngine.GameObject
@parent<Transform> = cf_J_Root
@localToWorldMatrix<Matrix4x4> = 0 -1 0 0
1 0 0 2
0 0 1 0
0 0 0 1
";
    let file = read(text, &skel).unwrap();
    let hips: Vec<&PoseOverride> = file.overrides.iter().filter(|o| o.joint == "cf_J_Hips").collect();
    assert_eq!(hips.len(), 3);
    let offset = hips[0].vector().unwrap();
    assert!((offset - vec3(0.0, 1.0, 0.0)).magnitude() < 1e-9);
    // Mirroring x turns a +90 z rotation into -90.
    let q = hips[1].rotation().unwrap();
    let expected = Quaternion::from_angle_z(Deg(-90.0));
    assert!((q.s - expected.s).abs() < 1e-4 && (q.v.z - expected.v.z).abs() < 1e-4);
}
