//! Default-rig files.
//!
//! One joint per line: the name, then the 16 entries of its rest
//! local-to-world matrix in row-major order.

use super::Skeleton;
use crate::errors::{ErrorKind, Result};
use crate::skinning::world_transforms;
use crate::util::matrix;
use cgmath::Matrix4;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct RigFile {
    joints: Vec<(String, Matrix4<f64>)>,
    index: HashMap<String, usize>,
}

impl RigFile {
    pub fn new() -> RigFile {
        RigFile::default()
    }

    pub fn parse(text: &str) -> Result<RigFile> {
        let mut rig = RigFile::new();
        for (n, line) in text.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens.len() != 17 {
                bail!(ErrorKind::BadRigFile(
                    n + 1,
                    format!("expected a name and 16 numbers, found {} tokens", tokens.len()),
                ));
            }
            let mut vals = Vec::with_capacity(16);
            for tok in &tokens[1..] {
                match tok.parse::<f64>() {
                    Ok(x) => vals.push(x),
                    Err(_) => bail!(ErrorKind::BadRigFile(n + 1, format!("bad number {:?}", tok))),
                }
            }
            let m = match matrix::from_flat_rows(&vals) {
                Some(m) => m,
                None => bail!(ErrorKind::BadRigFile(n + 1, "bad matrix".to_string())),
            };
            rig.insert(tokens[0], m);
        }
        Ok(rig)
    }

    pub fn read(path: &Path) -> Result<RigFile> {
        let text = fs::read_to_string(path)?;
        let rig = RigFile::parse(&text)?;
        info!("read default rig with {} joints from {}", rig.len(), path.display());
        Ok(rig)
    }

    /// The posed world matrices of a skeleton, as a new default rig.
    pub fn from_skeleton_posed(skel: &Skeleton) -> RigFile {
        let mut rig = RigFile::new();
        for (j, world) in skel.joints().iter().zip(world_transforms(skel)) {
            rig.insert(&j.name, world);
        }
        rig
    }

    /// Adds a joint, replacing any earlier entry of the same name.
    pub fn insert(&mut self, name: &str, m: Matrix4<f64>) {
        match self.index.get(name) {
            Some(&i) => self.joints[i].1 = m,
            None => {
                self.index.insert(name.to_string(), self.joints.len());
                self.joints.push((name.to_string(), m));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Matrix4<f64>> {
        self.index.get(name).map(|&i| &self.joints[i].1)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn to_text(&self) -> Result<String> {
        let mut s = String::new();
        for (name, m) in &self.joints {
            write!(s, "{}", name)?;
            for row in matrix::to_rows(m).iter() {
                write!(s, " ")?;
                for x in row.iter() {
                    write!(s, " {:.6}", x)?;
                }
            }
            writeln!(s)?;
        }
        Ok(s)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_text()?)?;
        Ok(())
    }
}

#[test]
fn test_rig_file_round_trip() {
    use cgmath::vec3;

    let text = "a 1 0 0 0  0 1 0 2  0 0 1 0  0 0 0 1\n\nb 2 0 0 1 0 2 0 0 0 0 2 0 0 0 0 1\n";
    let rig = RigFile::parse(text).unwrap();
    assert_eq!(rig.len(), 2);
    assert_eq!(rig.get("a").unwrap().w.truncate(), vec3(0.0, 2.0, 0.0));
    assert_eq!(rig.get("b").unwrap().x.x, 2.0);
    assert!(rig.get("c").is_none());

    let back = RigFile::parse(&rig.to_text().unwrap()).unwrap();
    assert_eq!(back.get("b"), rig.get("b"));
    assert!(rig.to_text().unwrap().starts_with("a  1.000000 0.000000"));
}

#[test]
fn test_rig_file_errors() {
    match RigFile::parse("a 1 2 3\n") {
        Err(crate::errors::Error(ErrorKind::BadRigFile(1, _), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
    let bad = "a 1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1\nb 1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 one\n";
    match RigFile::parse(bad) {
        Err(crate::errors::Error(ErrorKind::BadRigFile(2, _), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
}

#[test]
fn test_rig_from_posed_skeleton() {
    use crate::fixtures;

    let skel = fixtures::two_joint_chain();
    let rig = RigFile::from_skeleton_posed(&skel);
    let child = rig.get("child").unwrap();
    // Posed child is turned 90 degrees about x: y axis goes to z.
    assert!((child.y.z - 1.0).abs() < 1e-12);
}
