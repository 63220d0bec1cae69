//! Saving a retargeted skeleton between runs.
//!
//! The state is a JSON document:
//!
//!     {
//!       "hash": "<hex content hash of the dump>" or null,
//!       "joints": [
//!         {
//!           "name": "cf_J_Hips",
//!           "parent": "cf_N_height" or null,
//!           "rest": [16 numbers, row-major],
//!           "pose": { "offset": [x, y, z], "rotation": [w, x, y, z], "scale": [x, y, z] },
//!           "baseline": { same as pose }
//!         },
//!         ...
//!       ],
//!       "unused_pose_lines": ["cf_J_Tail01 scale 2 2 2", ...]    (optional)
//!     }

use super::{JointRecord, Skeleton};
use crate::cache::ContentHash;
use crate::errors::{ErrorKind, Result};
use crate::skinning::Trs;
use crate::taxonomy::{DofGroup, ALL_GROUPS};
use crate::util::matrix;
use cgmath::{vec3, InnerSpace, Quaternion};
use json::JsonValue;
use std::fs;
use std::path::Path;

pub struct State {
    pub hash: Option<ContentHash>,
    pub skeleton: Skeleton,
}

impl State {
    pub fn to_json(&self) -> Result<JsonValue> {
        let mut joints = JsonValue::new_array();
        for (id, j) in self.skeleton.joints().iter().enumerate() {
            let mut o = JsonValue::new_object();
            o["name"] = j.name.as_str().into();
            o["parent"] = self.skeleton.parent_name(id).into();
            o["rest"] = matrix::to_flat_rows(&j.rest_world).to_vec().into();
            o["pose"] = trs_to_json(&j.pose);
            o["baseline"] = trs_to_json(&j.baseline);
            joints.push(o)?;
        }
        let mut state = JsonValue::new_object();
        state["hash"] = self.hash.map(|h| h.to_hex()).into();
        state["joints"] = joints;
        state["unused_pose_lines"] = self.skeleton.unused_pose_lines().to_vec().into();
        Ok(state)
    }

    pub fn from_json(v: &JsonValue) -> Result<State> {
        let hash = match v["hash"].as_str() {
            Some(s) => match ContentHash::from_hex(s) {
                Some(h) => Some(h),
                None => bail!(ErrorKind::BadState(format!("bad hash {:?}", s))),
            },
            None => None,
        };
        if !v["joints"].is_array() {
            bail!(ErrorKind::BadState("missing joint list".to_string()));
        }

        let mut records = vec![];
        let mut poses = vec![];
        for j in v["joints"].members() {
            let name = match j["name"].as_str() {
                Some(s) => s.to_string(),
                None => bail!(ErrorKind::BadState("joint without a name".to_string())),
            };
            let rest = floats(&j["rest"], 16, &name)?;
            let world = match matrix::from_flat_rows(&rest) {
                Some(m) => m,
                None => bail!(ErrorKind::BadState(format!("{}: bad rest matrix", name))),
            };
            let pose = trs_from_json(&j["pose"], &name)?;
            let baseline = trs_from_json(&j["baseline"], &name)?;
            poses.push((name.clone(), pose, baseline));
            records.push(JointRecord {
                name,
                parent: j["parent"].as_str().map(|s| s.to_string()),
                world,
            });
        }

        let mut skeleton = Skeleton::build(records)?;
        // The arena may order joints differently from the file.
        let mut pose_buf = vec![Trs::identity(); skeleton.len()];
        let mut baseline_buf = vec![Trs::identity(); skeleton.len()];
        for (name, pose, baseline) in poses {
            if let Some(id) = skeleton.find(&name) {
                pose_buf[id] = pose;
                baseline_buf[id] = baseline;
            }
        }
        skeleton.commit_poses(pose_buf, false)?;
        skeleton.commit_baselines(baseline_buf)?;

        let mut unused = vec![];
        for line in v["unused_pose_lines"].members() {
            match line.as_str() {
                Some(line) => unused.push(line.to_string()),
                None => bail!(ErrorKind::BadState(format!("bad pose line {}", line.dump()))),
            }
        }
        skeleton.keep_unused_pose_lines(unused);

        Ok(State { hash, skeleton })
    }

    pub fn read(path: &Path) -> Result<State> {
        let text = fs::read_to_string(path)?;
        State::from_json(&json::parse(&text)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?.pretty(2))?;
        Ok(())
    }
}

fn trs_to_json(trs: &Trs) -> JsonValue {
    let mut o = JsonValue::new_object();
    for &group in ALL_GROUPS.iter() {
        o[group.name()] = trs.group_values(group).into();
    }
    o
}

fn trs_from_json(v: &JsonValue, joint: &str) -> Result<Trs> {
    let t = floats(&v[DofGroup::Offset.name()], 3, joint)?;
    let r = floats(&v[DofGroup::Rotation.name()], 4, joint)?;
    let s = floats(&v[DofGroup::Scale.name()], 3, joint)?;
    let rotation = Quaternion::new(r[0], r[1], r[2], r[3]);
    let len2 = rotation.magnitude2();
    if !len2.is_finite() || len2 == 0.0 {
        bail!(ErrorKind::BadState(format!("{}: rotation is not a usable quaternion", joint)));
    }
    Ok(Trs {
        translation: vec3(t[0], t[1], t[2]),
        rotation: rotation.normalize(),
        scale: vec3(s[0], s[1], s[2]),
    })
}

fn floats(v: &JsonValue, n: usize, joint: &str) -> Result<Vec<f64>> {
    let xs: Option<Vec<f64>> = v.members().map(|x| x.as_f64()).collect();
    match xs {
        Some(ref xs) if xs.len() == n => Ok(xs.clone()),
        _ => bail!(ErrorKind::BadState(format!("{}: expected {} numbers", joint, n))),
    }
}

#[test]
fn test_state_round_trip() {
    use crate::fixtures;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skeleton.json");
    let state = State {
        hash: Some(ContentHash::of(b"dump")),
        skeleton: fixtures::humanoid(),
    };
    state.write(&path).unwrap();
    let back = State::read(&path).unwrap();
    assert_eq!(back.hash, state.hash);
    assert_eq!(back.skeleton.len(), state.skeleton.len());
    for (a, b) in back.skeleton.joints().iter().zip(state.skeleton.joints()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.parent, b.parent);
        for &group in ALL_GROUPS.iter() {
            for (x, y) in a.pose.group_values(group).iter().zip(b.pose.group_values(group)) {
                assert!((x - y).abs() < 1e-12);
            }
            for (x, y) in a.baseline.group_values(group).iter().zip(b.baseline.group_values(group)) {
                assert!((x - y).abs() < 1e-12);
            }
        }
        let (ra, rb) = (matrix::to_flat_rows(&a.rest_world), matrix::to_flat_rows(&b.rest_world));
        assert!(ra.iter().zip(rb.iter()).all(|(x, y)| (x - y).abs() < 1e-12));
    }
}

#[test]
fn test_state_errors() {
    let bad = json::parse(r#"{"hash": null, "joints": [{"name": "a", "rest": [1, 2]}]}"#).unwrap();
    match State::from_json(&bad) {
        Err(crate::errors::Error(ErrorKind::BadState(_), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
    let bad = json::parse(r#"{"hash": "nothex"}"#).unwrap();
    assert!(State::from_json(&bad).is_err());

    let zero = r#"{"hash": null, "joints": [{"name": "a", "parent": null,
        "rest": [1, 0, 0, 0,  0, 1, 0, 0,  0, 0, 1, 0,  0, 0, 0, 1],
        "pose": {"offset": [0, 0, 0], "rotation": [0, 0, 0, 0], "scale": [1, 1, 1]},
        "baseline": {"offset": [0, 0, 0], "rotation": [1, 0, 0, 0], "scale": [1, 1, 1]}}]}"#;
    match State::from_json(&json::parse(zero).unwrap()) {
        Err(crate::errors::Error(ErrorKind::BadState(ref why), _)) => assert!(why.starts_with("a:")),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
}

#[test]
fn test_state_keeps_unused_pose_lines() {
    use crate::fixtures;

    let mut skeleton = fixtures::humanoid();
    skeleton.keep_unused_pose_lines(vec!["cf_J_Tail01 scale 2 2 2".to_string()]);
    let state = State { hash: None, skeleton };
    let back = State::from_json(&state.to_json().unwrap()).unwrap();
    assert_eq!(back.skeleton.unused_pose_lines(), &["cf_J_Tail01 scale 2 2 2".to_string()]);
}
