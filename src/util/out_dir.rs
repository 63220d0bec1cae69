use crate::errors::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory for putting output files in. Will be created lazily when the first
/// file path is asked for.
pub struct OutDir {
    path: PathBuf,
    created: bool,
}

impl OutDir {
    pub fn new(path: PathBuf) -> OutDir {
        OutDir { path, created: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `filename` inside the directory, creating the directory if
    /// needed.
    pub fn file(&mut self, filename: &str) -> Result<PathBuf> {
        if !self.created {
            match fs::create_dir_all(&self.path) {
                Ok(()) => (),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => (),
                Err(e) => Err(e)?,
            }
            self.created = true;
        }
        Ok(self.path.join(filename))
    }
}

#[test]
fn test_out_dir_created_lazily() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("out").join("nested");
    let mut out = OutDir::new(path.clone());
    assert!(!path.exists());

    let a = out.file("a.txt").unwrap();
    assert!(path.is_dir());
    assert_eq!(a, path.join("a.txt"));
    fs::write(&a, b"hi").unwrap();
    // Second file reuses the directory.
    out.file("b.txt").unwrap();
    assert_eq!(out.path(), path.as_path());
}
