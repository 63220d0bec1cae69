//! Character files: the meshes of one character as JSON.
//!
//!     {
//!       "meshes": [
//!         {
//!           "name": "body",
//!           "object_matrix": [16 numbers, row-major],     (optional)
//!           "positions": [[x, y, z], ...],
//!           "bindings": [[["cf_J_Hips", 0.75], ["cf_J_Kosi01", 0.25]], ...],
//!           "channels": [{ "name": "smile", "positions": [[x, y, z], ...] }]
//!         }
//!       ]
//!     }
//!
//! There is one binding per position. Every channel has exactly as many
//! positions as its mesh.

use crate::errors::{ErrorKind, Result};
use crate::mesh::{Influence, Mesh, ShapeChannel, SkinBinding};
use crate::solve::DET_EPSILON;
use crate::util::matrix;
use cgmath::{Point3, SquareMatrix};
use json::JsonValue;
use std::fs;
use std::path::Path;

pub fn parse(text: &str) -> Result<Vec<Mesh>> {
    from_json(&json::parse(text)?)
}

pub fn read(path: &Path) -> Result<Vec<Mesh>> {
    let meshes = parse(&fs::read_to_string(path)?)?;
    let verts: usize = meshes.iter().map(|m| m.len()).sum();
    info!("read {} meshes ({} vertices) from {}", meshes.len(), verts, path.display());
    Ok(meshes)
}

pub fn write(path: &Path, meshes: &[Mesh]) -> Result<()> {
    fs::write(path, to_json(meshes)?.pretty(1))?;
    Ok(())
}

pub fn from_json(v: &JsonValue) -> Result<Vec<Mesh>> {
    if !v["meshes"].is_array() {
        bail!(ErrorKind::BadCharacter("missing mesh list".to_string()));
    }
    v["meshes"].members().map(mesh_from_json).collect()
}

fn mesh_from_json(v: &JsonValue) -> Result<Mesh> {
    let name = match v["name"].as_str() {
        Some(s) => s.to_string(),
        None => bail!(ErrorKind::BadCharacter("mesh without a name".to_string())),
    };
    let positions = points(&v["positions"], &name)?;

    let mut bindings = Vec::with_capacity(positions.len());
    for b in v["bindings"].members() {
        let mut influences = vec![];
        for inf in b.members() {
            match (inf[0].as_str(), inf[1].as_f64()) {
                (Some(joint), Some(weight)) => influences.push(Influence::new(joint, weight)),
                _ => bail!(ErrorKind::BadCharacter(format!("{}: bad influence {}", name, inf.dump()))),
            }
        }
        bindings.push(SkinBinding::new(influences));
    }
    if bindings.len() != positions.len() {
        bail!(ErrorKind::TopologyMismatch(name, positions.len(), bindings.len()));
    }

    let mut mesh = Mesh::new(&name, positions, bindings);

    if !v["object_matrix"].is_null() {
        let vals: Option<Vec<f64>> = v["object_matrix"].members().map(|x| x.as_f64()).collect();
        let m = match vals.as_ref().and_then(|vals| matrix::from_flat_rows(vals)) {
            Some(m) => m,
            None => bail!(ErrorKind::BadCharacter(format!("{}: bad object matrix", name))),
        };
        if !(m.determinant().abs() > DET_EPSILON) {
            bail!(ErrorKind::BadCharacter(format!("{}: object matrix is singular", name)));
        }
        mesh.object_matrix = Some(m);
    }

    for ch in v["channels"].members() {
        let ch_name = match ch["name"].as_str() {
            Some(s) => s,
            None => bail!(ErrorKind::BadCharacter(format!("{}: channel without a name", name))),
        };
        let full = format!("{}/{}", name, ch_name);
        let positions = points(&ch["positions"], &full)?;
        if positions.len() != mesh.len() {
            bail!(ErrorKind::TopologyMismatch(full, mesh.len(), positions.len()));
        }
        mesh.channels.push(ShapeChannel::new(ch_name, positions));
    }

    Ok(mesh)
}

fn points(v: &JsonValue, what: &str) -> Result<Vec<Point3<f64>>> {
    let mut out = Vec::with_capacity(v.len());
    for p in v.members() {
        match (p.len(), p[0].as_f64(), p[1].as_f64(), p[2].as_f64()) {
            (3, Some(x), Some(y), Some(z)) => out.push(Point3::new(x, y, z)),
            _ => bail!(ErrorKind::BadCharacter(format!("{}: bad position {}", what, p.dump()))),
        }
    }
    Ok(out)
}

fn points_to_json(ps: &[Point3<f64>]) -> Result<JsonValue> {
    let mut arr = JsonValue::new_array();
    for p in ps {
        arr.push(vec![p.x, p.y, p.z])?;
    }
    Ok(arr)
}

pub fn to_json(meshes: &[Mesh]) -> Result<JsonValue> {
    let mut arr = JsonValue::new_array();
    for mesh in meshes {
        let mut o = JsonValue::new_object();
        o["name"] = mesh.name.as_str().into();
        if let Some(ref m) = mesh.object_matrix {
            o["object_matrix"] = matrix::to_flat_rows(m).to_vec().into();
        }
        o["positions"] = points_to_json(&mesh.positions)?;

        let mut bindings = JsonValue::new_array();
        for b in &mesh.bindings {
            let mut infs = JsonValue::new_array();
            for inf in b.influences.iter() {
                let mut pair = JsonValue::new_array();
                pair.push(inf.joint.as_str())?;
                pair.push(inf.weight)?;
                infs.push(pair)?;
            }
            bindings.push(infs)?;
        }
        o["bindings"] = bindings;

        let mut channels = JsonValue::new_array();
        for ch in &mesh.channels {
            let mut c = JsonValue::new_object();
            c["name"] = ch.name.as_str().into();
            c["positions"] = points_to_json(&ch.positions)?;
            channels.push(c)?;
        }
        o["channels"] = channels;

        arr.push(o)?;
    }
    let mut doc = JsonValue::new_object();
    doc["meshes"] = arr;
    Ok(doc)
}

#[test]
fn test_character_round_trip() {
    let text = r#"{
        "meshes": [{
            "name": "body",
            "object_matrix": [1, 0, 0, 0,  0, 1, 0, 0.5,  0, 0, 1, 0,  0, 0, 0, 1],
            "positions": [[0, 1, 0], [0.5, 0.25, -1]],
            "bindings": [[["root", 1]], [["root", 0.5], ["child", 0.5]]],
            "channels": [{"name": "wide", "positions": [[0, 1.5, 0], [0.5, 0.25, -1]]}]
        }]
    }"#;
    let meshes = parse(text).unwrap();
    assert_eq!(meshes.len(), 1);
    let m = &meshes[0];
    assert_eq!(m.len(), 2);
    assert_eq!(m.bindings[1].influences.len(), 2);
    assert_eq!(m.bindings[1].influences[1].joint, "child");
    assert_eq!(m.object_matrix.unwrap().w.y, 0.5);
    assert_eq!(m.channels[0].positions[0], Point3::new(0.0, 1.5, 0.0));

    let again = from_json(&to_json(&meshes).unwrap()).unwrap();
    assert_eq!(again[0].positions, m.positions);
    assert_eq!(again[0].bindings, m.bindings);
    assert_eq!(again[0].channels[0].name, "wide");
}

#[test]
fn test_character_errors() {
    assert!(parse("{}").is_err());
    let mismatch = r#"{"meshes": [{"name": "a", "positions": [[0, 0, 0]], "bindings": []}]}"#;
    match parse(mismatch) {
        Err(crate::errors::Error(ErrorKind::TopologyMismatch(_, 1, 0), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
    let bad_channel = r#"{"meshes": [{"name": "a", "positions": [[0, 0, 0]], "bindings": [[["r", 1]]],
        "channels": [{"name": "c", "positions": []}]}]}"#;
    match parse(bad_channel) {
        Err(crate::errors::Error(ErrorKind::TopologyMismatch(ref n, 1, 0), _)) if n == "a/c" => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
    let flat = r#"{"meshes": [{"name": "a", "positions": [[0, 0, 0]], "bindings": [[["r", 1]]],
        "object_matrix": [1, 0, 0, 0,  0, 0, 0, 0,  0, 0, 1, 0,  0, 0, 0, 1]}]}"#;
    match parse(flat) {
        Err(crate::errors::Error(ErrorKind::BadCharacter(ref why), _)) => assert!(why.contains("singular")),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
    let bad_point = r#"{"meshes": [{"name": "a", "positions": [[0, 0]], "bindings": [[]]}]}"#;
    assert!(parse(bad_point).is_err());
}
