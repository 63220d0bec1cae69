//! Inverse skinning.
//!
//! Skinning moves a rest vertex v to A v, where A is the vertex's effective
//! transform (see `skinning`). For a fixed skeleton pose A is a plain affine
//! matrix, so given the deformed position d the rest position is just
//!
//!     v = A^{-1} d
//!
//! whenever A is invertible. That is the whole algorithm for almost every
//! vertex. The rest of this module deals with the vertices where it fails:
//!
//! * A can be singular, eg. when every joint influencing the vertex has been
//!   scaled flat along some axis.
//! * The vertex can have no usable influences: none of its joints are in the
//!   skeleton, or its weights cancel out.
//!
//! Solving runs in phases, each one only reading what earlier phases wrote.
//!
//!   1. Closed form for every vertex whose A is invertible. These vertices
//!      are `Exact`.
//!   2. Every other vertex gets a seed: from the base channel if this is a
//!      shape channel and the base solved that vertex, otherwise from the
//!      nearest exact vertex (see `seed`). Vertices with no seed at all are
//!      `Unsolved` and keep their deformed position.
//!   3. Seeded vertices that have a (singular) A are refined by the
//!      iterative search (see `iterate`). If it converges the vertex is
//!      `Iterated`, otherwise it keeps its best guess and is `Approximated`,
//!      as are seeded vertices with no A.
//!
//! No phase ever writes a non-finite value.

pub mod iterate;
pub mod seed;

use self::seed::BaseDifferential;
use crate::errors::{ErrorKind, Result};
use crate::mesh::Mesh;
use crate::skeleton::Skeleton;
use crate::skinning::{effective_vertex_transform, SkinMatrices};
use cgmath::{Matrix4, Point3, SquareMatrix};

/// Effective transforms with |det| at or below this are treated as singular.
pub const DET_EPSILON: f64 = 1e-12;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolveMethod {
    /// Matrix inversion, with the iterative search only as a fallback.
    ClosedForm,
    /// The iterative search for every vertex.
    Iterative,
}

#[derive(Copy, Clone, Debug)]
pub struct SolverOptions {
    pub method: SolveMethod,
    /// Residual below which the iterative search stops.
    pub tolerance: f64,
    /// Pass limit of the iterative search on base meshes.
    pub max_passes: usize,
    /// Pass limit of the iterative search on shape channels.
    pub channel_max_passes: usize,
}

impl Default for SolverOptions {
    fn default() -> SolverOptions {
        SolverOptions {
            method: SolveMethod::ClosedForm,
            tolerance: 1e-4,
            max_passes: 40,
            channel_max_passes: 20,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VertexStatus {
    Exact,
    Cached,
    Iterated,
    Approximated,
    Unsolved,
}

impl VertexStatus {
    /// True if the vertex has a rest position (possibly approximate).
    pub fn is_solved(self) -> bool {
        self != VertexStatus::Unsolved
    }
}

/// Rest positions for one mesh or shape channel.
#[derive(Clone, Debug)]
pub struct Solution {
    pub rest: Vec<Point3<f64>>,
    pub status: Vec<VertexStatus>,
}

impl Solution {
    pub fn unsolved(&self) -> Vec<usize> {
        (0..self.status.len()).filter(|&i| !self.status[i].is_solved()).collect()
    }

    pub fn count(&self, status: VertexStatus) -> usize {
        self.status.iter().filter(|&&s| s == status).count()
    }

    pub fn resolved_count(&self) -> usize {
        self.status.iter().filter(|s| s.is_solved()).count()
    }
}

/// Solutions for a mesh's base positions and each of its shape channels.
#[derive(Clone, Debug)]
pub struct MeshSolution {
    pub base: Solution,
    pub channels: Vec<Solution>,
}

pub struct Solver<'a> {
    skeleton: &'a Skeleton,
    skin: SkinMatrices,
    options: SolverOptions,
}

impl<'a> Solver<'a> {
    /// Snapshots the skeleton's current pose.
    pub fn new(skeleton: &'a Skeleton, options: SolverOptions) -> Solver<'a> {
        Solver {
            skeleton,
            skin: SkinMatrices::new(skeleton),
            options,
        }
    }

    /// Normalized effective transform of every vertex, in mesh space.
    /// `None` for vertices with no usable influences.
    pub fn vertex_transforms(&self, mesh: &Mesh) -> Vec<Option<Matrix4<f64>>> {
        let frame = mesh.frame();
        mesh.bindings
            .iter()
            .map(|b| {
                let eff = effective_vertex_transform(b, self.skeleton, &self.skin);
                if eff.missing != 0 {
                    trace!("{} influence(s) name joints not in the skeleton", eff.missing);
                }
                eff.normalized().map(|a| frame.wrap(&a))
            })
            .collect()
    }

    /// Solves a mesh and all its shape channels.
    pub fn solve_mesh(&self, mesh: &Mesh) -> Result<MeshSolution> {
        check_topology(mesh)?;

        let transforms = self.vertex_transforms(mesh);
        let base = self.solve(&transforms, &mesh.positions, None, self.options.max_passes);
        log_solution(&mesh.name, &base);

        let mut channels = Vec::with_capacity(mesh.channels.len());
        {
            let differential = BaseDifferential::new(&base.rest, &mesh.positions, &base.status);
            for ch in &mesh.channels {
                let s = self.solve(
                    &transforms,
                    &ch.positions,
                    Some(&differential),
                    self.options.channel_max_passes,
                );
                log_solution(&format!("{}/{}", mesh.name, ch.name), &s);
                channels.push(s);
            }
        }

        Ok(MeshSolution { base, channels })
    }

    /// Solves one set of deformed positions.
    pub fn solve(
        &self,
        transforms: &[Option<Matrix4<f64>>],
        deformed: &[Point3<f64>],
        base: Option<&BaseDifferential>,
        max_passes: usize,
    ) -> Solution {
        match self.options.method {
            SolveMethod::ClosedForm => {
                solve_closed_form(transforms, deformed, base, self.options.tolerance, max_passes)
            }
            SolveMethod::Iterative => {
                iterate::solve_iteratively(transforms, deformed, self.options.tolerance, max_passes)
            }
        }
    }
}

/// Every binding list and shape channel must have one entry per vertex.
pub fn check_topology(mesh: &Mesh) -> Result<()> {
    if mesh.bindings.len() != mesh.len() {
        bail!(ErrorKind::TopologyMismatch(mesh.name.clone(), mesh.len(), mesh.bindings.len()));
    }
    for ch in &mesh.channels {
        if ch.positions.len() != mesh.len() {
            bail!(ErrorKind::TopologyMismatch(
                format!("{}/{}", mesh.name, ch.name),
                mesh.len(),
                ch.positions.len(),
            ));
        }
    }
    Ok(())
}

fn invert_vertex(a: &Matrix4<f64>, d: Point3<f64>) -> Option<Point3<f64>> {
    if a.determinant().abs() <= DET_EPSILON {
        return None;
    }
    let inv = a.invert()?;
    let p = crate::util::matrix::apply(&inv, d);
    if p.x.is_finite() && p.y.is_finite() && p.z.is_finite() {
        Some(p)
    } else {
        None
    }
}

pub fn solve_closed_form(
    transforms: &[Option<Matrix4<f64>>],
    deformed: &[Point3<f64>],
    base: Option<&BaseDifferential>,
    tolerance: f64,
    max_passes: usize,
) -> Solution {
    let n = deformed.len();
    let mut rest = deformed.to_vec();
    let mut status = vec![VertexStatus::Unsolved; n];

    // Phase 1
    let mut pending = vec![];
    for i in 0..n {
        match transforms[i].as_ref().and_then(|a| invert_vertex(a, deformed[i])) {
            Some(p) => {
                rest[i] = p;
                status[i] = VertexStatus::Exact;
            }
            None => pending.push(i),
        }
    }
    if pending.is_empty() {
        return Solution { rest, status };
    }

    // Phase 2
    let anchors: Vec<usize> = (0..n).filter(|&i| status[i] == VertexStatus::Exact).collect();
    let seeds: Vec<(usize, Option<Point3<f64>>)> = pending
        .iter()
        .map(|&i| {
            let s = base
                .and_then(|b| b.seed(i, deformed[i]))
                .or_else(|| seed::from_neighbour(i, deformed, &rest, &anchors));
            (i, s)
        })
        .collect();

    // Phase 3
    for (i, s) in seeds {
        let guess = match s {
            Some(g) => g,
            None => continue,
        };
        match transforms[i] {
            Some(ref a) => {
                let r = iterate::refine(a, deformed[i], guess, tolerance, max_passes);
                rest[i] = r.position;
                status[i] = if r.converged {
                    VertexStatus::Iterated
                } else {
                    VertexStatus::Approximated
                };
            }
            None => {
                rest[i] = guess;
                status[i] = VertexStatus::Approximated;
            }
        }
    }

    Solution { rest, status }
}

fn log_solution(what: &str, s: &Solution) {
    let exact = s.count(VertexStatus::Exact);
    let iterated = s.count(VertexStatus::Iterated);
    let approx = s.count(VertexStatus::Approximated);
    let unsolved = s.count(VertexStatus::Unsolved);
    info!("{}: {} vertices, {} exact, {} iterated", what, s.rest.len(), exact, iterated);
    if approx != 0 {
        warn!("{}: {} vertices approximated from neighbours", what, approx);
    }
    if unsolved != 0 {
        warn!("{}: {} vertices could not be solved", what, unsolved);
    }
}

#[cfg(test)]
fn deform_all(skel: &Skeleton, mesh: &Mesh, rest: &[Point3<f64>]) -> Vec<Point3<f64>> {
    use crate::skinning::deform;
    let skin = SkinMatrices::new(skel);
    let frame = mesh.frame();
    mesh.bindings
        .iter()
        .zip(rest)
        .map(|(b, &p)| deform(b, skel, &skin, &frame, p).unwrap_or(p))
        .collect()
}

#[test]
fn test_rotated_child_scenario() {
    use crate::fixtures;
    use crate::mesh::SkinBinding;

    let skel = fixtures::two_joint_chain();
    let rest = vec![Point3::new(0.0, 1.0, 0.0)];
    let mut mesh = Mesh::new("m", rest.clone(), vec![SkinBinding::single("child")]);
    mesh.positions = deform_all(&skel, &mesh, &rest);
    assert!((mesh.positions[0].z - 1.0).abs() < 1e-12);
    assert!(mesh.positions[0].y.abs() < 1e-12);

    let solver = Solver::new(&skel, SolverOptions::default());
    let s = solver.solve_mesh(&mesh).unwrap().base;
    assert_eq!(s.status, vec![VertexStatus::Exact]);
    assert!((s.rest[0].x - 0.0).abs() < 1e-12);
    assert!((s.rest[0].y - 1.0).abs() < 1e-12);
    assert!((s.rest[0].z - 0.0).abs() < 1e-12);
}

#[test]
fn test_exact_round_trip_humanoid() {
    use crate::fixtures;

    let skel = fixtures::humanoid();
    let rest_mesh = fixtures::humanoid_mesh(&skel);
    let mut mesh = rest_mesh.clone();
    mesh.positions = deform_all(&skel, &mesh, &rest_mesh.positions);
    for (ch, rest_ch) in mesh.channels.iter_mut().zip(&rest_mesh.channels) {
        ch.positions = deform_all(&skel, &rest_mesh, &rest_ch.positions);
    }

    let solver = Solver::new(&skel, SolverOptions::default());
    let sol = solver.solve_mesh(&mesh).unwrap();
    assert_eq!(sol.base.count(VertexStatus::Exact), mesh.len());
    for (a, b) in sol.base.rest.iter().zip(&rest_mesh.positions) {
        assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9 && (a.z - b.z).abs() < 1e-9);
    }
    for (a, b) in sol.channels[0].rest.iter().zip(&rest_mesh.channels[0].positions) {
        assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9 && (a.z - b.z).abs() < 1e-9);
    }
}

#[test]
fn test_mesh_frame_round_trip() {
    use crate::fixtures;
    use cgmath::{vec3, Deg, Rotation3, Quaternion};

    let skel = fixtures::humanoid();
    let mut rest_mesh = fixtures::humanoid_mesh(&skel);
    rest_mesh.object_matrix = Some(
        Matrix4::from_translation(vec3(0.0, 0.5, 0.0)) * Matrix4::from(Quaternion::from_angle_y(Deg(90.0))),
    );
    let mut mesh = rest_mesh.clone();
    mesh.positions = deform_all(&skel, &mesh, &rest_mesh.positions);

    let solver = Solver::new(&skel, SolverOptions::default());
    let s = solver.solve_mesh(&mesh).unwrap().base;
    for (a, b) in s.rest.iter().zip(&rest_mesh.positions) {
        assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9 && (a.z - b.z).abs() < 1e-9);
    }
}

#[test]
fn test_cancelling_weights_unsolved() {
    use crate::fixtures;
    use crate::mesh::{Influence, SkinBinding};

    let skel = fixtures::two_joint_chain();
    let binding = SkinBinding::new(vec![Influence::new("root", 1.0), Influence::new("child", -1.0)]);
    let mesh = Mesh::new("m", vec![Point3::new(0.5, 0.5, 0.5)], vec![binding]);
    let s = Solver::new(&skel, SolverOptions::default()).solve_mesh(&mesh).unwrap().base;
    assert_eq!(s.unsolved(), vec![0]);
    assert_eq!(s.rest[0], Point3::new(0.5, 0.5, 0.5));
    assert!(s.rest.iter().all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite()));
}

#[test]
fn test_unbound_vertex_approximated_from_neighbour() {
    use crate::fixtures;
    use crate::mesh::SkinBinding;

    let skel = fixtures::two_joint_chain();
    let rest = vec![Point3::new(0.0, 1.0, 0.0), Point3::new(0.0, 1.1, 0.0)];
    let mut mesh = Mesh::new(
        "m",
        rest.clone(),
        vec![SkinBinding::single("child"), SkinBinding::single("child")],
    );
    mesh.positions = deform_all(&skel, &mesh, &rest);
    // The second vertex names a joint the skeleton lacks.
    mesh.bindings[1] = SkinBinding::single("missing");

    let s = Solver::new(&skel, SolverOptions::default()).solve_mesh(&mesh).unwrap().base;
    assert_eq!(s.status, vec![VertexStatus::Exact, VertexStatus::Approximated]);
    assert!(s.unsolved().is_empty());
    // Neighbour's rest plus the deformed offset (0, 0, 0.1).
    assert!((s.rest[1].y - 1.0).abs() < 1e-9);
    assert!((s.rest[1].z - 0.1).abs() < 1e-9);
}

#[test]
fn test_flattened_joint_iterated() {
    use crate::mesh::SkinBinding;
    use crate::skeleton::JointRecord;

    let mut skel = Skeleton::build(vec![
        JointRecord { name: "a".into(), parent: None, world: Matrix4::identity() },
        JointRecord { name: "b".into(), parent: Some("a".into()), world: Matrix4::identity() },
    ])
    .unwrap();
    let mut poses = skel.poses();
    poses[1].scale.y = 0.0;
    skel.commit_poses(poses, false).unwrap();

    let mesh = Mesh::new(
        "m",
        vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 1.0)],
        vec![SkinBinding::single("a"), SkinBinding::single("b")],
    );
    let s = Solver::new(&skel, SolverOptions::default()).solve_mesh(&mesh).unwrap().base;
    assert_eq!(s.status, vec![VertexStatus::Exact, VertexStatus::Iterated]);
    assert!((s.rest[1].x - 1.0).abs() < 1e-4);
    assert!((s.rest[1].z - 1.0).abs() < 1e-4);
}

#[test]
fn test_iterative_method_matches_closed_form() {
    use crate::fixtures;

    let skel = fixtures::two_joint_chain();
    let rest = vec![Point3::new(0.0, 1.0, 0.0), Point3::new(0.2, 0.5, -0.1)];
    let mut mesh = Mesh::new(
        "m",
        rest.clone(),
        vec![crate::mesh::SkinBinding::single("child"), crate::mesh::SkinBinding::single("root")],
    );
    mesh.positions = deform_all(&skel, &mesh, &rest);
    let options = SolverOptions { method: SolveMethod::Iterative, ..SolverOptions::default() };
    let s = Solver::new(&skel, options).solve_mesh(&mesh).unwrap().base;
    assert_eq!(s.count(VertexStatus::Iterated), 2);
    for (a, b) in s.rest.iter().zip(&rest) {
        assert!((a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4 && (a.z - b.z).abs() < 1e-4);
    }
}

#[test]
fn test_topology_mismatch() {
    use crate::fixtures;
    use crate::mesh::{ShapeChannel, SkinBinding};

    let skel = fixtures::two_joint_chain();
    let mut mesh = Mesh::new("m", vec![Point3::new(0.0, 0.0, 0.0)], vec![SkinBinding::single("root")]);
    mesh.channels.push(ShapeChannel::new("bad", vec![]));
    let solver = Solver::new(&skel, SolverOptions::default());
    match solver.solve_mesh(&mesh) {
        Err(crate::errors::Error(ErrorKind::TopologyMismatch(_, 1, 0), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
}
