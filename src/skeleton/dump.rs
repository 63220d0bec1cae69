//! Reading skeleton dumps.
//!
//! A dump is a text listing of a scene's transform hierarchy. Each object
//! starts with a `NAME--UnityEngine.GameObject` line and is followed by
//! property lines; the two we use are
//!
//!     @parent<Transform> = PARENT
//!     @localToWorldMatrix<Matrix4x4> = m00 m01 m02 m03
//!     m10 m11 m12 m13
//!     m20 m21 m22 m23
//!     m30 m31 m32 m33
//!
//! (The matrix rows are the last four tokens of each of the four lines.)
//! Everything else is ignored, including `@worldToLocalMatrix`.
//!
//! The dump's coordinates are left-handed and not centered on the rig, so
//! every matrix is moved so the first root sits at the origin, then mirrored
//! in x. Rows whose basis part is all zero (objects scaled to nothing) get a
//! tiny diagonal entry so the matrix stays invertible.

use super::JointRecord;
use crate::cache::ContentHash;
use crate::errors::{ErrorKind, Result};
use crate::util::matrix;
use cgmath::Matrix4;
use std::collections::HashSet;

const OBJECT_SUFFIX: &str = "--UnityEngine.GameObject";
const ROOT_NAME: &str = "cf_J_Root";
const ROOT_OBJECT: &str = "cf_J_Root--UnityEngine.GameObject";
const BOM: char = '\u{feff}';
const PARENT_TAG: &str = "@parent<Transform>";
const MATRIX_TAG: &str = "@localToWorldMatrix<Matrix4x4>";

/// Replacement for a collapsed basis row's diagonal entry.
const COLLAPSED_DIAGONAL: f64 = 0.001;

#[derive(Clone, Debug)]
pub struct DumpOptions {
    /// Objects whose names start with one of these are joints.
    pub prefixes: Vec<String>,
}

impl Default for DumpOptions {
    fn default() -> DumpOptions {
        DumpOptions {
            prefixes: vec!["cf_".to_string(), "cm_".to_string(), "p_c".to_string()],
        }
    }
}

impl DumpOptions {
    fn accepts(&self, name: &str) -> bool {
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

pub struct Dump {
    /// In file order. Only the first has no parent.
    pub joints: Vec<JointRecord>,
    pub hash: ContentHash,
}

/// True if `text` looks like a dump rather than a pose file.
pub fn is_dump(text: &str) -> bool {
    text.trim_start_matches(BOM).lines().next().map(|l| l.contains("UnityEngine")).unwrap_or(false)
}

pub fn parse(bytes: &[u8], options: &DumpOptions) -> Result<Dump> {
    let hash = ContentHash::of(bytes);
    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => bail!(ErrorKind::BadDump(0, format!("not UTF-8: {}", e))),
    };
    let mut lines: Vec<&str> = text.trim_start_matches(BOM).lines().map(|l| l.trim()).collect();
    // Exporters decorate the first object's line; it is always the root.
    if let Some(first) = lines.first_mut() {
        if first.contains(ROOT_NAME) {
            *first = ROOT_OBJECT;
        }
    }

    let mut raw: Vec<(String, Option<String>, [[f64; 4]; 4])> = vec![];
    let mut name: Option<&str> = None;
    let mut parent: Option<String> = None;
    let mut objects = 0;
    let mut n = 0;
    while n < lines.len() {
        let line = lines[n];
        if line.ends_with(OBJECT_SUFFIX) {
            name = Some(&line[..line.len() - OBJECT_SUFFIX.len()]);
            parent = None;
            objects += 1;
        } else if line.starts_with(PARENT_TAG) {
            parent = line.split_whitespace().nth(2).map(|s| s.to_string());
        } else if line.starts_with(MATRIX_TAG) {
            let cur = match name {
                Some(cur) => cur,
                None => bail!(ErrorKind::BadDump(n + 1, "matrix outside of any object".to_string())),
            };
            if options.accepts(cur) {
                let rows = read_rows(&lines, n)?;
                raw.push((cur.to_string(), parent.clone(), rows));
            }
            n += 4;
            continue;
        }
        n += 1;
    }
    if objects == 0 {
        bail!(ErrorKind::BadDump(1, "no GameObject records".to_string()));
    }

    // The first record without a kept parent anchors the rig.
    let kept: HashSet<&str> = raw.iter().map(|r| r.0.as_str()).collect();
    let is_root = |p: &Option<String>| p.as_ref().map(|p| !kept.contains(p.as_str())).unwrap_or(true);
    let origin = match raw.iter().find(|r| is_root(&r.1)) {
        Some(r) => [r.2[0][3], r.2[1][3], r.2[2][3]],
        None => [0.0; 3],
    };
    let root_name = raw.iter().find(|r| is_root(&r.1)).map(|r| r.0.clone());

    let mut joints = Vec::with_capacity(raw.len());
    for (name, parent, rows) in raw.iter() {
        let parent = if is_root(parent) {
            if Some(name) == root_name.as_ref() {
                None
            } else {
                debug!("{}: parent not in the rig; attaching it to {:?}", name, root_name);
                root_name.clone()
            }
        } else {
            parent.clone()
        };
        joints.push(JointRecord {
            name: name.clone(),
            parent,
            world: convert(*rows, origin),
        });
    }
    info!("read {} joints from dump (of {} objects)", joints.len(), objects);

    Ok(Dump { joints, hash })
}

fn read_rows(lines: &[&str], start: usize) -> Result<[[f64; 4]; 4]> {
    let mut rows = [[0.0; 4]; 4];
    for k in 0..4 {
        let line_no = start + k + 1;
        let line = match lines.get(start + k) {
            Some(l) => l,
            None => bail!(ErrorKind::BadDump(line_no, "matrix cut short".to_string())),
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            bail!(ErrorKind::BadDump(line_no, "expected four matrix entries".to_string()));
        }
        for (c, tok) in tokens[tokens.len() - 4..].iter().enumerate() {
            rows[k][c] = match tok.parse::<f64>() {
                Ok(x) => x,
                Err(_) => bail!(ErrorKind::BadDump(line_no, format!("bad number {:?}", tok))),
            };
        }
    }
    Ok(rows)
}

/// Recenters on `origin`, mirrors x and repairs collapsed rows.
fn convert(mut m: [[f64; 4]; 4], origin: [f64; 3]) -> Matrix4<f64> {
    for i in 0..3 {
        m[i][3] -= origin[i];
    }
    // Conjugate by diag(-1, 1, 1, 1).
    m[0][1] = -m[0][1];
    m[0][2] = -m[0][2];
    m[0][3] = -m[0][3];
    m[1][0] = -m[1][0];
    m[2][0] = -m[2][0];
    m[3][0] = -m[3][0];
    for i in 0..3 {
        if m[i][0] == 0.0 && m[i][1] == 0.0 && m[i][2] == 0.0 {
            m[i][i] = COLLAPSED_DIAGONAL;
        }
    }
    matrix::from_rows(&m)
}

#[cfg(test)]
pub static TEST_DUMP: &str = "\
cf_J_Root--UnityEngine.GameObject
@parent<Transform> = BodyTop
@localToWorldMatrix<Matrix4x4> = 1 0 0 10
0 1 0 0
0 0 1 5
0 0 0 1
@worldToLocalMatrix<Matrix4x4> = 1 0 0 -10
0 1 0 0
0 0 1 -5
0 0 0 1
Lamp--UnityEngine.GameObject
@parent<Transform> = BodyTop
@localToWorldMatrix<Matrix4x4> = 1 0 0 0
0 1 0 0
0 0 1 0
0 0 0 1
cf_J_Hips--UnityEngine.GameObject
@parent<Transform> = cf_J_Root
@localToWorldMatrix<Matrix4x4> = 0 -1 0 11
1 0 0 1
0 0 1 5
0 0 0 1
p_cf_head_bone--UnityEngine.GameObject
@parent<Transform> = Lamp
@localToWorldMatrix<Matrix4x4> = 0 0 0 10
0 1 0 2
0 0 1 5
0 0 0 1
";

#[test]
fn test_parse_dump() {
    let dump = parse(TEST_DUMP.as_bytes(), &DumpOptions::default()).unwrap();
    let names: Vec<&str> = dump.joints.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["cf_J_Root", "cf_J_Hips", "p_cf_head_bone"]);
    assert_eq!(dump.joints[0].parent, None);
    assert_eq!(dump.joints[1].parent.as_ref().map(|s| s.as_str()), Some("cf_J_Root"));
    // Parent was filtered out.
    assert_eq!(dump.joints[2].parent.as_ref().map(|s| s.as_str()), Some("cf_J_Root"));

    // Recentred.
    let root = matrix::to_rows(&dump.joints[0].world);
    assert_eq!([root[0][3], root[1][3], root[2][3]], [0.0, 0.0, 0.0]);

    // Hips: translated by (1, 1, 0) then mirrored in x, rotation mirrored too.
    let hips = matrix::to_rows(&dump.joints[1].world);
    assert_eq!(hips[0], [0.0, 1.0, 0.0, -1.0]);
    assert_eq!(hips[1], [-1.0, 0.0, 0.0, 1.0]);

    // Collapsed first row repaired.
    let head = matrix::to_rows(&dump.joints[2].world);
    assert_eq!(head[0][0], COLLAPSED_DIAGONAL);

    assert_eq!(dump.hash, ContentHash::of(TEST_DUMP.as_bytes()));
}

#[test]
fn test_parse_dump_first_line() {
    let with_bom = format!("{}{}", BOM, TEST_DUMP);
    assert!(is_dump(&with_bom));
    let decorated = TEST_DUMP.replacen("cf_J_Root--UnityEngine.GameObject", "cf_J_Root--UnityEngine.GameObject (1)", 1);
    for text in &[with_bom, decorated] {
        let dump = parse(text.as_bytes(), &DumpOptions::default()).unwrap();
        let names: Vec<&str> = dump.joints.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["cf_J_Root", "cf_J_Hips", "p_cf_head_bone"]);
        assert_eq!(dump.joints[0].parent, None);
        let root = matrix::to_rows(&dump.joints[0].world);
        assert_eq!([root[0][3], root[1][3], root[2][3]], [0.0, 0.0, 0.0]);
        // The hash is still over the bytes as given.
        assert_eq!(dump.hash, ContentHash::of(text.as_bytes()));
    }
}

#[test]
fn test_parse_dump_errors() {
    let opts = DumpOptions::default();
    assert!(parse(b"", &opts).is_err());
    assert!(parse(b"just some text\n", &opts).is_err());
    let cut = "cf_J_Root--UnityEngine.GameObject\n@localToWorldMatrix<Matrix4x4> = 1 0 0 0\n0 1 0 0\n";
    match parse(cut.as_bytes(), &opts) {
        Err(crate::errors::Error(ErrorKind::BadDump(4, _), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
    let bad = "cf_J_Root--UnityEngine.GameObject\n@localToWorldMatrix<Matrix4x4> = 1 0 0 x\n0 1 0 0\n0 0 1 0\n0 0 0 1\n";
    match parse(bad.as_bytes(), &opts) {
        Err(crate::errors::Error(ErrorKind::BadDump(2, _), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
}

#[test]
fn test_is_dump() {
    assert!(is_dump(TEST_DUMP));
    assert!(!is_dump("cf_J_Hips rotation 1 0 0 0\n"));
}
