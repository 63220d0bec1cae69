//! Putting a whole character through the pipeline.
//!
//! 1. `import`: read the dump, build the skeleton, retarget it onto the
//!    default rig so the author's customizations become pose overrides.
//! 2. `solve_character`: find rest positions for every mesh and shape
//!    channel, going through the solution cache when there is one.
//! 3. `write_pose`/`apply_pose`: move poses in and out of the retargeted
//!    skeleton.
//!
//! Solved rest positions are snapped onto the cache's grid before they are
//! handed back, so a warm run returns exactly what the cold run did.

use crate::cache::{self, CacheLock, ContentHash, SolutionCache};
use crate::errors::Result;
use crate::mesh::Mesh;
use crate::pose::{self, apply::ApplyReport, Mirror, PoseMode};
use crate::skeleton::dump::{self, DumpOptions};
use crate::skeleton::retarget::{self, RetargetReport};
use crate::skeleton::rigfile::RigFile;
use crate::skeleton::Skeleton;
use crate::solve::{self, Solution, SolveMethod, Solver, SolverOptions, VertexStatus};
use crate::taxonomy::{Taxonomy, ALL_GROUPS};
use crate::util::matrix;
use cgmath::Point3;
use std::path::PathBuf;

#[derive(Clone, Debug, Default)]
pub struct ReshapeOptions {
    pub solver: SolverOptions,
    pub dump: DumpOptions,
    /// Where the solution cache lives; no caching if `None`.
    pub cache_path: Option<PathBuf>,
}

pub struct Import {
    pub skeleton: Skeleton,
    pub hash: ContentHash,
    pub retarget: RetargetReport,
}

/// Builds the retargeted skeleton for a dump. Nothing is returned unless
/// the whole dump was understood.
pub fn import(dump_bytes: &[u8], rig: Option<&RigFile>, tax: &Taxonomy, options: &DumpOptions) -> Result<Import> {
    let dump = dump::parse(dump_bytes, options)?;
    let mut skeleton = Skeleton::build(dump.joints)?;
    let retarget = retarget::retarget(&mut skeleton, rig, tax)?;
    Ok(Import { skeleton, hash: dump.hash, retarget })
}

#[derive(Clone, Debug, Default)]
pub struct SolveReport {
    /// Vertices (over all meshes and channels) that got a rest position.
    pub resolved_count: usize,
    /// How many of those are approximations.
    pub approximated_count: usize,
    /// Unsolved vertex indices, per mesh and per `mesh/channel`.
    pub unsolved: Vec<(String, Vec<usize>)>,
    /// True if everything came from the cache.
    pub from_cache: bool,
}

impl SolveReport {
    pub fn unsolved_count(&self) -> usize {
        self.unsolved.iter().map(|(_, v)| v.len()).sum()
    }

    fn add(&mut self, what: String, s: &Solution) {
        self.resolved_count += s.resolved_count();
        self.approximated_count += s.count(VertexStatus::Approximated);
        self.unsolved.push((what, s.unsolved()));
    }
}

/// The key a solve is cached under. Rest positions depend on more than the
/// dump: the default rig changes the rest matrices, and the pose and solver
/// settings change the answer for hard vertices. All of them go in.
pub fn cache_key(dump: ContentHash, skeleton: &Skeleton, solver: &SolverOptions) -> ContentHash {
    let mut joints = vec![];
    for j in skeleton.joints() {
        joints.extend_from_slice(j.name.as_bytes());
        joints.push(0);
        let mut values = matrix::to_flat_rows(&j.rest_world).to_vec();
        for &group in ALL_GROUPS.iter() {
            values.extend(j.pose.group_values(group));
        }
        for x in values {
            joints.extend_from_slice(&x.to_bits().to_le_bytes());
        }
    }

    let mut settings = vec![match solver.method {
        SolveMethod::ClosedForm => 0u8,
        SolveMethod::Iterative => 1,
    }];
    settings.extend_from_slice(&solver.tolerance.to_bits().to_le_bytes());
    settings.extend_from_slice(&(solver.max_passes as u64).to_le_bytes());
    settings.extend_from_slice(&(solver.channel_max_passes as u64).to_le_bytes());

    ContentHash::of_parts(&[&dump.0[..], &joints, &settings])
}

/// Replaces the deformed positions of every mesh and shape channel with
/// rest positions for `skeleton`'s current pose. `hash` is the dump's
/// content hash.
pub fn solve_character(
    skeleton: &Skeleton,
    meshes: &mut [Mesh],
    hash: ContentHash,
    options: &ReshapeOptions,
) -> Result<SolveReport> {
    for mesh in meshes.iter() {
        solve::check_topology(mesh)?;
    }

    let path = match options.cache_path {
        Some(ref p) => p,
        None => return solve_cold(skeleton, meshes, options, None),
    };
    let key = cache_key(hash, skeleton, &options.solver);
    let _lock = CacheLock::acquire(path)?;
    if let Some(mut cache) = SolutionCache::load(path, key)? {
        if let Some(report) = solve_warm(meshes, &mut cache) {
            info!("all {} vertices found in the solution cache", report.resolved_count);
            return Ok(report);
        }
        info!(
            "solution cache covers only part of the character ({} hits, {} misses); solving",
            cache.hits, cache.misses,
        );
    }
    let mut fresh = SolutionCache::new(key);
    let report = solve_cold(skeleton, meshes, options, Some(&mut fresh))?;
    fresh.save(path)?;
    Ok(report)
}

/// Looks every vertex up. Only if all of them hit are the meshes changed.
fn solve_warm(meshes: &mut [Mesh], cache: &mut SolutionCache) -> Option<SolveReport> {
    let mut found: Vec<(Vec<Point3<f64>>, Vec<Vec<Point3<f64>>>)> = Vec::with_capacity(meshes.len());
    for mesh in meshes.iter() {
        let base = lookup_all(cache, &mesh.positions)?;
        let mut channels = Vec::with_capacity(mesh.channels.len());
        for ch in &mesh.channels {
            channels.push(lookup_all(cache, &ch.positions)?);
        }
        found.push((base, channels));
    }

    let mut report = SolveReport { from_cache: true, ..SolveReport::default() };
    for (mesh, (base, channels)) in meshes.iter_mut().zip(found) {
        report.resolved_count += base.len();
        report.unsolved.push((mesh.name.clone(), vec![]));
        mesh.positions = base;
        for (ch, rest) in mesh.channels.iter_mut().zip(channels) {
            report.resolved_count += rest.len();
            report.unsolved.push((format!("{}/{}", mesh.name, ch.name), vec![]));
            ch.positions = rest;
        }
    }
    Some(report)
}

fn lookup_all(cache: &mut SolutionCache, deformed: &[Point3<f64>]) -> Option<Vec<Point3<f64>>> {
    deformed.iter().map(|&p| cache.lookup_or_mark(p)).collect()
}

fn solve_cold(
    skeleton: &Skeleton,
    meshes: &mut [Mesh],
    options: &ReshapeOptions,
    mut cache: Option<&mut SolutionCache>,
) -> Result<SolveReport> {
    let solver = Solver::new(skeleton, options.solver);
    let mut report = SolveReport::default();
    for mesh in meshes.iter_mut() {
        let mut solution = solver.solve_mesh(mesh)?;
        snap_solved(&mut solution.base);
        for s in &mut solution.channels {
            snap_solved(s);
        }

        if let Some(ref mut cache) = cache {
            cache.insert_solution(&mesh.positions, &solution.base);
            for (ch, s) in mesh.channels.iter().zip(&solution.channels) {
                cache.insert_solution(&ch.positions, s);
            }
        }

        report.add(mesh.name.clone(), &solution.base);
        for (ch, s) in mesh.channels.iter().zip(&solution.channels) {
            report.add(format!("{}/{}", mesh.name, ch.name), s);
        }

        mesh.positions = solution.base.rest;
        for (ch, s) in mesh.channels.iter_mut().zip(solution.channels) {
            ch.positions = s.rest;
        }
    }
    let unsolved = report.unsolved_count();
    if unsolved != 0 {
        warn!("{} vertices could not be solved and keep their deformed positions", unsolved);
    }
    Ok(report)
}

fn snap_solved(s: &mut Solution) {
    for (p, st) in s.rest.iter_mut().zip(&s.status) {
        if st.is_solved() {
            *p = cache::snap(*p);
        }
    }
}

/// The skeleton's current overrides as pose-file text.
pub fn write_pose(skeleton: &Skeleton, tax: &Taxonomy, mode: PoseMode) -> String {
    pose::write(skeleton, tax, mode).to_text()
}

/// Loads pose-file text onto the skeleton.
pub fn apply_pose(skeleton: &mut Skeleton, tax: &Taxonomy, text: &str, mode: PoseMode) -> Result<ApplyReport> {
    apply_pose_mirrored(skeleton, tax, text, mode, None)
}

/// Like `apply_pose`, first copying left FK rotations to the right side
/// when `mirror` is given.
pub fn apply_pose_mirrored(
    skeleton: &mut Skeleton,
    tax: &Taxonomy,
    text: &str,
    mode: PoseMode,
    mirror: Option<Mirror>,
) -> Result<ApplyReport> {
    let mut file = pose::read(text, skeleton)?;
    if let Some(mirror) = mirror {
        pose::mirror_left_to_right(&mut file, skeleton, tax, mirror);
    }
    pose::apply(&file, skeleton, tax, mode)
}

#[cfg(test)]
fn deformed_humanoid() -> (Skeleton, Mesh, Mesh) {
    use crate::fixtures;
    use crate::skinning::{deform, SkinMatrices};

    let skel = fixtures::humanoid();
    let rest = fixtures::humanoid_mesh(&skel);
    let skin = SkinMatrices::new(&skel);
    let frame = rest.frame();
    let mut mesh = rest.clone();
    let go = |ps: &[Point3<f64>]| -> Vec<Point3<f64>> {
        ps.iter()
            .zip(&rest.bindings)
            .map(|(&p, b)| deform(b, &skel, &skin, &frame, p).unwrap())
            .collect()
    };
    mesh.positions = go(&rest.positions);
    for (ch, r) in mesh.channels.iter_mut().zip(&rest.channels) {
        ch.positions = go(&r.positions);
    }
    (skel, mesh, rest)
}

#[test]
fn test_solve_character_cache_idempotent() {
    let (skel, deformed, rest) = deformed_humanoid();
    let dir = tempfile::tempdir().unwrap();
    let options = ReshapeOptions {
        cache_path: Some(dir.path().join("body.cache")),
        ..ReshapeOptions::default()
    };
    let hash = ContentHash::of(b"dump one");

    let mut cold = vec![deformed.clone()];
    let r1 = solve_character(&skel, &mut cold, hash, &options).unwrap();
    assert!(!r1.from_cache);
    assert_eq!(r1.unsolved_count(), 0);
    for (a, b) in cold[0].positions.iter().zip(&rest.positions) {
        assert!((a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5 && (a.z - b.z).abs() < 1e-5);
    }

    let mut warm = vec![deformed.clone()];
    let r2 = solve_character(&skel, &mut warm, hash, &options).unwrap();
    assert!(r2.from_cache);
    assert_eq!(r2.resolved_count, r1.resolved_count);
    assert_eq!(warm[0].positions, cold[0].positions);
    assert_eq!(warm[0].channels[0].positions, cold[0].channels[0].positions);

    // No cache at all gives the same answer too.
    let mut uncached = vec![deformed];
    solve_character(&skel, &mut uncached, hash, &ReshapeOptions::default()).unwrap();
    assert_eq!(uncached[0].positions, cold[0].positions);
}

#[test]
fn test_solve_character_hash_invalidates() {
    let (skel, deformed, _) = deformed_humanoid();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("body.cache");
    let options = ReshapeOptions { cache_path: Some(path.clone()), ..ReshapeOptions::default() };

    let mut bytes = b"cf_J_Root--UnityEngine.GameObject".to_vec();
    let first = ContentHash::of(&bytes);
    solve_character(&skel, &mut vec![deformed.clone()], first, &options).unwrap();

    bytes[0] ^= 1;
    let second = ContentHash::of(&bytes);
    assert_ne!(first, second);
    let r = solve_character(&skel, &mut vec![deformed], second, &options).unwrap();
    assert!(!r.from_cache);
    // The cache now belongs to the new dump.
    let key = |h| cache_key(h, &skel, &options.solver);
    assert!(SolutionCache::load(&path, key(first)).unwrap().is_none());
    assert!(SolutionCache::load(&path, key(second)).unwrap().is_some());
}

#[test]
fn test_solve_character_rig_and_solver_invalidate() {
    use cgmath::vec3;

    let (skel, deformed, _) = deformed_humanoid();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("body.cache");
    let options = ReshapeOptions { cache_path: Some(path.clone()), ..ReshapeOptions::default() };
    let hash = ContentHash::of(b"same dump");
    solve_character(&skel, &mut vec![deformed.clone()], hash, &options).unwrap();
    assert!(solve_character(&skel, &mut vec![deformed.clone()], hash, &options).unwrap().from_cache);

    // Same dump on another default rig: the rest matrices moved.
    let mut rebound = skel.clone();
    let worlds: Vec<_> = rebound
        .joints()
        .iter()
        .map(|j| cgmath::Matrix4::from_translation(vec3(0.0, 0.1, 0.0)) * j.rest_world)
        .collect();
    rebound.set_rest_worlds(&worlds).unwrap();
    let r = solve_character(&rebound, &mut vec![deformed.clone()], hash, &options).unwrap();
    assert!(!r.from_cache);
    assert!(SolutionCache::load(&path, cache_key(hash, &skel, &options.solver)).unwrap().is_none());

    // Same skeleton, other solver settings.
    let mut iterative = options.clone();
    iterative.solver.method = SolveMethod::Iterative;
    assert_ne!(cache_key(hash, &rebound, &iterative.solver), cache_key(hash, &rebound, &options.solver));
    let r = solve_character(&rebound, &mut vec![deformed.clone()], hash, &iterative).unwrap();
    assert!(!r.from_cache);
    let mut passes = SolverOptions::default();
    passes.max_passes += 1;
    assert_ne!(cache_key(hash, &rebound, &passes), cache_key(hash, &rebound, &SolverOptions::default()));
}

#[test]
fn test_solve_character_reports_unsolved() {
    use crate::mesh::{Influence, SkinBinding};

    let (skel, mut deformed, _) = deformed_humanoid();
    deformed.channels.clear();
    let lonely = Mesh::new(
        "lonely",
        vec![Point3::new(1.0, 2.0, 3.0)],
        vec![SkinBinding::new(vec![
            Influence::new("cf_J_Hips", 0.5),
            Influence::new("cf_J_Head", -0.5),
        ])],
    );
    let input = vec![deformed, lonely];
    let mut meshes = input.clone();
    let dir = tempfile::tempdir().unwrap();
    let options = ReshapeOptions {
        cache_path: Some(dir.path().join("c")),
        ..ReshapeOptions::default()
    };
    let r = solve_character(&skel, &mut meshes, ContentHash::of(b"x"), &options).unwrap();
    assert_eq!(r.unsolved, vec![("body".to_string(), vec![]), ("lonely".to_string(), vec![0])]);
    assert_eq!(meshes[1].positions[0], Point3::new(1.0, 2.0, 3.0));

    // A character with an unsolved vertex never takes the warm path.
    let mut meshes = input;
    let r = solve_character(&skel, &mut meshes, ContentHash::of(b"x"), &options).unwrap();
    assert!(!r.from_cache);
}

#[test]
fn test_import_and_pose_round_trip() {
    use crate::skeleton::dump::TEST_DUMP;

    let tax = Taxonomy::builtin();
    let import = import(TEST_DUMP.as_bytes(), None, &tax, &DumpOptions::default()).unwrap();
    assert_eq!(import.skeleton.len(), 3);
    assert_eq!(import.hash, ContentHash::of(TEST_DUMP.as_bytes()));

    let mut skel = import.skeleton;
    apply_pose(&mut skel, &tax, "cf_J_Hips rotation 0 0 45\n", PoseMode::Pose).unwrap();
    let text = write_pose(&skel, &tax, PoseMode::Pose);
    assert!(text.starts_with("cf_J_Hips rotation 0.9239 0.0000 0.0000 0.3827"));
}

#[test]
fn test_pose_lines_for_missing_joints_survive() {
    use crate::skeleton::dump::TEST_DUMP;
    use crate::skeleton::state::State;

    let tax = Taxonomy::builtin();
    let mut skel = import(TEST_DUMP.as_bytes(), None, &tax, &DumpOptions::default()).unwrap().skeleton;
    let text = "cf_J_Hips rotation 0 0 45\ncf_J_Tail01 scale 2 2 2\n";
    let report = apply_pose(&mut skel, &tax, text, PoseMode::All).unwrap();
    assert_eq!(report.unused, 1);

    let written = write_pose(&skel, &tax, PoseMode::All);
    assert!(written.contains("cf_J_Hips rotation 0.9239 0.0000 0.0000 0.3827\n"));
    assert!(written.ends_with("cf_J_Tail01 scale 2 2 2\n"));

    // They also outlive a trip through the state file, and loading the
    // written text again does not duplicate them.
    let state = State { hash: None, skeleton: skel };
    let mut back = State::from_json(&state.to_json().unwrap()).unwrap().skeleton;
    apply_pose(&mut back, &tax, &written, PoseMode::All).unwrap();
    assert_eq!(write_pose(&back, &tax, PoseMode::All), written);
}

#[test]
fn test_apply_pose_mirrored() {
    use crate::fixtures;

    let tax = Taxonomy::builtin();
    let mut skel = fixtures::humanoid();
    let text = "cf_J_Hand_L rotation 0 0 40\n";
    apply_pose_mirrored(&mut skel, &tax, text, PoseMode::Pose, Some(Mirror::Same)).unwrap();
    let left = skel.joint(skel.find("cf_J_Hand_L").unwrap()).pose.rotation;
    let right = skel.joint(skel.find("cf_J_Hand_R").unwrap()).pose.rotation;
    assert_eq!(left, right);

    apply_pose(&mut skel, &tax, text, PoseMode::Pose).unwrap();
    let right = skel.joint(skel.find("cf_J_Hand_R").unwrap());
    assert_eq!(right.pose.rotation, right.baseline.rotation);
}

#[test]
fn test_import_rejects_bad_dump() {
    let tax = Taxonomy::builtin();
    assert!(import(b"nothing here", None, &tax, &DumpOptions::default()).is_err());
}
