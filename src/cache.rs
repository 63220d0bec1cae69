//! Persistent map from deformed vertex positions to solved rest positions.
//!
//! The file is
//!
//!     [16 bytes] content hash of what the solve was for: the skeleton dump,
//!                the retargeted skeleton and the solver settings
//!     repeated:
//!       [3 x i32 LE] deformed position, quantized
//!       [3 x i32 LE] rest position, quantized
//!
//! Positions are quantized to a grid of 1/QUANT_SCALE with round-to-nearest,
//! so equal floats always make equal keys. Entries are written in sorted key
//! order.
//!
//! A file whose hash is not the current one is a miss and is overwritten
//! on the next save. So is a truncated or otherwise damaged file.

use crate::errors::Result;
use crate::solve::{Solution, VertexStatus};
use cgmath::Point3;
use fs2::FileExt;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const QUANT_SCALE: f64 = 100000.0;

const HASH_LEN: usize = 16;
const ENTRY_LEN: usize = 24;

pub type QVec3 = [i32; 3];

/// Truncated BLAKE3 hash of a skeleton dump's raw bytes, or of a cache key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; HASH_LEN]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> ContentHash {
        let full = blake3::hash(bytes);
        let mut h = [0; HASH_LEN];
        h.copy_from_slice(&full.as_bytes()[..HASH_LEN]);
        ContentHash(h)
    }

    /// Hashes several byte strings as one. Each is prefixed with its length
    /// so different splits of the same bytes hash differently.
    pub fn of_parts(parts: &[&[u8]]) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        let mut h = [0; HASH_LEN];
        h.copy_from_slice(&hasher.finalize().as_bytes()[..HASH_LEN]);
        ContentHash(h)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(s: &str) -> Option<ContentHash> {
        if s.len() != 2 * HASH_LEN || !s.is_ascii() {
            return None;
        }
        let mut h = [0; HASH_LEN];
        for i in 0..HASH_LEN {
            h[i] = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).ok()?;
        }
        Some(ContentHash(h))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn quantize(p: Point3<f64>) -> Option<QVec3> {
    let mut q = [0; 3];
    for i in 0..3 {
        let x = (p[i] * QUANT_SCALE).round();
        if !x.is_finite() || x < i32::min_value() as f64 || x > i32::max_value() as f64 {
            return None;
        }
        q[i] = x as i32;
    }
    Some(q)
}

pub fn dequantize(q: QVec3) -> Point3<f64> {
    Point3::new(
        q[0] as f64 / QUANT_SCALE,
        q[1] as f64 / QUANT_SCALE,
        q[2] as f64 / QUANT_SCALE,
    )
}

/// Moves a point onto the cache grid. Points that cannot be quantized are
/// returned unchanged.
pub fn snap(p: Point3<f64>) -> Point3<f64> {
    quantize(p).map(dequantize).unwrap_or(p)
}

pub struct SolutionCache {
    hash: ContentHash,
    entries: BTreeMap<QVec3, QVec3>,
    /// Keys seen with two different rest positions.
    ambiguous: HashSet<QVec3>,
    pub hits: usize,
    pub misses: usize,
}

impl SolutionCache {
    pub fn new(hash: ContentHash) -> SolutionCache {
        SolutionCache {
            hash,
            entries: BTreeMap::new(),
            ambiguous: HashSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads the cache at `path`. `Ok(None)` when there is no usable cache
    /// for `hash` there.
    pub fn load(path: &Path, hash: ContentHash) -> Result<Option<SolutionCache>> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no solution cache at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(SolutionCache::from_bytes(&bytes, hash))
    }

    pub fn from_bytes(bytes: &[u8], hash: ContentHash) -> Option<SolutionCache> {
        if bytes.len() < HASH_LEN || (bytes.len() - HASH_LEN) % ENTRY_LEN != 0 {
            warn!("solution cache is damaged ({} bytes); ignoring it", bytes.len());
            return None;
        }
        if bytes[..HASH_LEN] != hash.0 {
            info!("solution cache is for a different skeleton; ignoring it");
            return None;
        }
        let mut cache = SolutionCache::new(hash);
        for entry in bytes[HASH_LEN..].chunks(ENTRY_LEN) {
            let mut v = [0i32; 6];
            for (k, word) in entry.chunks(4).enumerate() {
                v[k] = i32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            }
            cache.insert_quantized([v[0], v[1], v[2]], [v[3], v[4], v[5]]);
        }
        info!("loaded {} cached vertex solutions", cache.len());
        Some(cache)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HASH_LEN + ENTRY_LEN * self.entries.len());
        out.extend_from_slice(&self.hash.0);
        for (k, v) in &self.entries {
            for x in k.iter().chain(v.iter()) {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        out
    }

    /// Looks up the rest position for a deformed position, counting the
    /// result as a hit or a miss.
    pub fn lookup_or_mark(&mut self, deformed: Point3<f64>) -> Option<Point3<f64>> {
        let found = quantize(deformed).and_then(|k| self.entries.get(&k)).cloned();
        match found {
            Some(v) => {
                self.hits += 1;
                Some(dequantize(v))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, deformed: Point3<f64>, rest: Point3<f64>) {
        if let (Some(k), Some(v)) = (quantize(deformed), quantize(rest)) {
            self.insert_quantized(k, v);
        }
    }

    fn insert_quantized(&mut self, k: QVec3, v: QVec3) {
        if self.ambiguous.contains(&k) {
            return;
        }
        match self.entries.get(&k) {
            Some(&old) if old != v => {
                debug!("cache key {:?} maps to both {:?} and {:?}; dropping it", k, old, v);
                self.entries.remove(&k);
                self.ambiguous.insert(k);
            }
            Some(_) => (),
            None => {
                self.entries.insert(k, v);
            }
        }
    }

    /// Records every solved vertex of a solution.
    pub fn insert_solution(&mut self, deformed: &[Point3<f64>], solution: &Solution) {
        for (i, &d) in deformed.iter().enumerate() {
            if solution.status[i] != VertexStatus::Unsolved {
                self.insert(d, solution.rest[i]);
            }
        }
    }

    /// Replaces the file at `path`. The old file stays intact until the new
    /// one is completely written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.to_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        info!("saved {} vertex solutions to {}", self.len(), path.display());
        Ok(())
    }
}

/// Exclusive lock on a cache file, held from load until save.
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    pub fn lock_path(cache_path: &Path) -> PathBuf {
        let mut s = cache_path.as_os_str().to_owned();
        s.push(".lock");
        PathBuf::from(s)
    }

    /// Blocks until no other process holds the lock.
    pub fn acquire(cache_path: &Path) -> Result<CacheLock> {
        let path = CacheLock::lock_path(cache_path);
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        file.lock_exclusive()?;
        debug!("locked {}", path.display());
        Ok(CacheLock { file, path })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

#[test]
fn test_quantize_rounds_to_nearest() {
    assert_eq!(quantize(Point3::new(0.000014, -0.000016, 1.0)), Some([1, -2, 100000]));
    assert_eq!(quantize(Point3::new(std::f64::NAN, 0.0, 0.0)), None);
    assert_eq!(quantize(Point3::new(1e20, 0.0, 0.0)), None);
    let p = snap(Point3::new(0.123456789, 0.0, 0.0));
    assert_eq!(snap(p), p);
}

#[test]
fn test_content_hash() {
    let a = ContentHash::of(b"cf_J_Root--UnityEngine.GameObject");
    let b = ContentHash::of(b"cf_J_Root--UnityEngine.GameObjecT");
    assert_ne!(a, b);
    assert_eq!(ContentHash::from_hex(&a.to_hex()), Some(a));
    assert_eq!(ContentHash::from_hex("zz"), None);

    let ab = ContentHash::of_parts(&[&b"ab"[..], &b"c"[..]]);
    let a_bc = ContentHash::of_parts(&[&b"a"[..], &b"bc"[..]]);
    assert_ne!(ab, a_bc);
    assert_eq!(ab, ContentHash::of_parts(&[&b"ab"[..], &b"c"[..]]));
}

#[test]
fn test_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solve.cache");
    let hash = ContentHash::of(b"dump");

    assert!(SolutionCache::load(&path, hash).unwrap().is_none());

    let mut cache = SolutionCache::new(hash);
    cache.insert(Point3::new(1.0, 2.0, 3.0), Point3::new(0.5, 0.25, -1.0));
    cache.insert(Point3::new(-1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0));
    cache.save(&path).unwrap();
    assert_eq!(fs::read(&path).unwrap().len(), 16 + 2 * 24);

    let mut loaded = SolutionCache::load(&path, hash).unwrap().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.to_bytes(), cache.to_bytes());
    assert_eq!(loaded.lookup_or_mark(Point3::new(1.0, 2.0, 3.0)), Some(Point3::new(0.5, 0.25, -1.0)));
    assert_eq!(loaded.lookup_or_mark(Point3::new(1.0, 2.0, 3.1)), None);
    assert_eq!((loaded.hits, loaded.misses), (1, 1));

    // A different dump never reuses it.
    assert!(SolutionCache::load(&path, ContentHash::of(b"dumq")).unwrap().is_none());

    // Nothing but the cache itself is left in the directory.
    let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(names.len(), 1);
}

#[test]
fn test_damaged_file_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solve.cache");
    let hash = ContentHash::of(b"dump");
    let mut cache = SolutionCache::new(hash);
    cache.insert(Point3::new(1.0, 2.0, 3.0), Point3::new(0.5, 0.25, -1.0));
    let mut bytes = cache.to_bytes();
    bytes.pop();
    fs::write(&path, &bytes).unwrap();
    assert!(SolutionCache::load(&path, hash).unwrap().is_none());
    fs::write(&path, b"short").unwrap();
    assert!(SolutionCache::load(&path, hash).unwrap().is_none());
}

#[test]
fn test_ambiguous_keys_dropped() {
    let mut cache = SolutionCache::new(ContentHash::of(b""));
    let d = Point3::new(1.0, 1.0, 1.0);
    cache.insert(d, Point3::new(0.0, 0.0, 0.0));
    cache.insert(d, Point3::new(0.0, 0.0, 0.0));
    assert_eq!(cache.len(), 1);
    cache.insert(d, Point3::new(0.0, 1.0, 0.0));
    assert!(cache.is_empty());
    // Stays dropped.
    cache.insert(d, Point3::new(0.0, 0.0, 0.0));
    assert_eq!(cache.lookup_or_mark(d), None);
}

#[test]
fn test_unsolved_not_stored() {
    let mut cache = SolutionCache::new(ContentHash::of(b""));
    let deformed = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
    let solution = Solution {
        rest: deformed.clone(),
        status: vec![VertexStatus::Exact, VertexStatus::Unsolved],
    };
    cache.insert_solution(&deformed, &solution);
    assert_eq!(cache.len(), 1);
    assert!(cache.lookup_or_mark(deformed[1]).is_none());
}

#[test]
fn test_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solve.cache");
    {
        let _lock = CacheLock::acquire(&path).unwrap();
        assert!(CacheLock::lock_path(&path).exists());
        let other = OpenOptions::new().write(true).open(CacheLock::lock_path(&path)).unwrap();
        assert!(other.try_lock_exclusive().is_err());
    }
    let _again = CacheLock::acquire(&path).unwrap();
}
