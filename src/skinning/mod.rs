//! Forward skinning math.
//!
//! Each joint j has a rest (bind) local-to-world matrix B[j] and, once posed,
//! a posed local-to-world matrix W[j], computed down the tree as
//!
//!     W[j] = W[parent j] L[j] P[j]
//!
//! where L[j] = B[parent j]^{-1} B[j] is the joint's local bind transform and
//! P[j] is its pose override (identity at rest). A vertex with influences
//! (w_i, j_i) and rest position v deforms to
//!
//!     v' = (∑_i w_i W[j_i] B[j_i]^{-1}) v / ∑_i w_i
//!        = A v
//!
//! For a fixed pose A is one affine matrix per vertex, the vertex's
//! *effective transform*. Everything the solver does starts from A.

pub mod trs;

pub use self::trs::Trs;

use crate::mesh::SkinBinding;
use crate::skeleton::{JointId, Skeleton};
use crate::util::matrix;
use cgmath::{Matrix4, Point3, SquareMatrix, Zero};

/// Weight sums smaller than this count as zero.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Posed local-to-world matrix of one joint, walking up the parent chain.
pub fn world_transform(skeleton: &Skeleton, joint: JointId) -> Matrix4<f64> {
    let j = skeleton.joint(joint);
    let local = j.local_bind * j.pose.to_matrix();
    match j.parent {
        Some(parent) => world_transform(skeleton, parent) * local,
        None => local,
    }
}

/// Posed local-to-world matrices of every joint, in one top-down pass.
pub fn world_transforms(skeleton: &Skeleton) -> Vec<Matrix4<f64>> {
    let mut world: Vec<Matrix4<f64>> = Vec::with_capacity(skeleton.len());
    for j in skeleton.joints() {
        let local = j.local_bind * j.pose.to_matrix();
        let w = match j.parent {
            Some(parent) => world[parent] * local,
            None => local,
        };
        world.push(w);
    }
    world
}

/// Per-joint skinning matrices W[j] B[j]^{-1}, computed once per solve pass.
pub struct SkinMatrices {
    matrices: Vec<Matrix4<f64>>,
}

impl SkinMatrices {
    pub fn new(skeleton: &Skeleton) -> SkinMatrices {
        let matrices = world_transforms(skeleton)
            .into_iter()
            .zip(skeleton.joints())
            .map(|(w, j)| w * j.inverse_bind)
            .collect();
        SkinMatrices { matrices }
    }

    pub fn get(&self, joint: JointId) -> &Matrix4<f64> {
        &self.matrices[joint]
    }
}

/// The (unnormalized) weighted sum of skinning matrices for one vertex.
#[derive(Copy, Clone, Debug)]
pub struct EffectiveTransform {
    /// ∑ w_i W[j_i] B[j_i]^{-1}, or the identity when nothing resolved.
    pub matrix: Matrix4<f64>,
    pub total_weight: f64,
    /// Influences naming joints the skeleton has.
    pub resolved: usize,
    /// Influences naming joints the skeleton lacks.
    pub missing: usize,
}

impl EffectiveTransform {
    /// False if no influence resolved or the weights cancel out.
    pub fn is_solvable(&self) -> bool {
        self.resolved > 0 && self.total_weight.abs() > WEIGHT_EPSILON
    }

    /// The matrix divided by the total weight.
    pub fn normalized(&self) -> Option<Matrix4<f64>> {
        if self.is_solvable() {
            Some(self.matrix / self.total_weight)
        } else {
            None
        }
    }
}

pub fn effective_vertex_transform(
    binding: &SkinBinding,
    skeleton: &Skeleton,
    skin: &SkinMatrices,
) -> EffectiveTransform {
    let mut matrix = Matrix4::zero();
    let mut total_weight = 0.0;
    let mut resolved = 0;
    let mut missing = 0;
    for influence in binding.influences.iter() {
        match skeleton.find(&influence.joint) {
            Some(id) => {
                matrix += skin.get(id) * influence.weight;
                total_weight += influence.weight;
                resolved += 1;
            }
            None => missing += 1,
        }
    }
    let mut eff = EffectiveTransform { matrix, total_weight, resolved, missing };
    if !eff.is_solvable() {
        eff.matrix = Matrix4::identity();
    }
    eff
}

/// Adapter for meshes whose local frame is not the skeleton's object frame.
#[derive(Copy, Clone, Debug)]
pub struct MeshFrame {
    to_object: Matrix4<f64>,
    from_object: Matrix4<f64>,
}

impl MeshFrame {
    pub fn identity() -> MeshFrame {
        MeshFrame {
            to_object: Matrix4::identity(),
            from_object: Matrix4::identity(),
        }
    }

    /// `to_object` maps mesh-local coordinates into the skeleton's object
    /// space. Returns `None` if it is singular.
    pub fn new(to_object: Matrix4<f64>) -> Option<MeshFrame> {
        let from_object = to_object.invert()?;
        Some(MeshFrame { to_object, from_object })
    }

    pub fn to_object(&self) -> &Matrix4<f64> {
        &self.to_object
    }

    /// Re-expresses an object-space transform in mesh-local space.
    pub fn wrap(&self, a: &Matrix4<f64>) -> Matrix4<f64> {
        self.from_object * a * self.to_object
    }
}

/// Forward-skins one rest position into mesh space. `None` for unsolvable
/// bindings.
pub fn deform(
    binding: &SkinBinding,
    skeleton: &Skeleton,
    skin: &SkinMatrices,
    frame: &MeshFrame,
    rest: Point3<f64>,
) -> Option<Point3<f64>> {
    let a = effective_vertex_transform(binding, skeleton, skin).normalized()?;
    Some(matrix::apply(&frame.wrap(&a), rest))
}

#[test]
fn test_two_joint_chain_deforms() {
    use crate::fixtures;

    let skel = fixtures::two_joint_chain();
    let skin = SkinMatrices::new(&skel);
    let binding = SkinBinding::single("child");
    let p = deform(&binding, &skel, &skin, &MeshFrame::identity(), Point3::new(0.0, 1.0, 0.0))
        .unwrap();
    assert!((p.x - 0.0).abs() < 1e-12);
    assert!((p.y - 0.0).abs() < 1e-12);
    assert!((p.z - 1.0).abs() < 1e-12);
}

#[test]
fn test_world_transform_matches_batch() {
    use crate::fixtures;

    let skel = fixtures::humanoid();
    let batch = world_transforms(&skel);
    for id in 0..skel.len() {
        let single = world_transform(&skel, id);
        for c in 0..4 {
            for r in 0..4 {
                assert!((single[c][r] - batch[id][c][r]).abs() < 1e-12);
            }
        }
    }
}

#[test]
fn test_rest_pose_skins_to_identity() {
    use crate::fixtures;

    let mut skel = fixtures::humanoid();
    skel.reset_poses();
    let skin = SkinMatrices::new(&skel);
    for id in 0..skel.len() {
        let m = skin.get(id);
        let p = matrix::apply(m, Point3::new(0.3, -1.0, 2.0));
        assert!((p.x - 0.3).abs() < 1e-9 && (p.y + 1.0).abs() < 1e-9 && (p.z - 2.0).abs() < 1e-9);
    }
}

#[test]
fn test_effective_transform_weights() {
    use crate::fixtures;
    use crate::mesh::Influence;

    let skel = fixtures::two_joint_chain();
    let skin = SkinMatrices::new(&skel);

    // Unnormalized weights still normalize to an affine matrix.
    let binding = SkinBinding::new(vec![Influence::new("root", 2.0), Influence::new("child", 2.0)]);
    let eff = effective_vertex_transform(&binding, &skel, &skin);
    assert_eq!(eff.resolved, 2);
    assert!((eff.total_weight - 4.0).abs() < 1e-12);
    let a = eff.normalized().unwrap();
    assert!((a.w.w - 1.0).abs() < 1e-12);

    // Cancelling weights.
    let binding = SkinBinding::new(vec![Influence::new("root", 0.5), Influence::new("child", -0.5)]);
    let eff = effective_vertex_transform(&binding, &skel, &skin);
    assert!(!eff.is_solvable());
    assert_eq!(eff.matrix, Matrix4::identity());
    assert!(eff.normalized().is_none());

    // Only missing joints.
    let binding = SkinBinding::new(vec![Influence::new("nope", 1.0)]);
    let eff = effective_vertex_transform(&binding, &skel, &skin);
    assert_eq!(eff.missing, 1);
    assert!(!eff.is_solvable());
}

#[test]
fn test_mesh_frame_wrap() {
    use cgmath::vec3;

    let frame = MeshFrame::new(Matrix4::from_translation(vec3(0.0, 0.0, 5.0))).unwrap();
    let a = Matrix4::from_nonuniform_scale(2.0, 2.0, 2.0);
    let m = frame.wrap(&a);
    // Mesh point at the origin is object point (0,0,5), which scales to
    // (0,0,10), which is mesh point (0,0,5).
    let p = matrix::apply(&m, Point3::new(0.0, 0.0, 0.0));
    assert!((p.z - 5.0).abs() < 1e-12);
    assert!(MeshFrame::new(Matrix4::zero()).is_none());
}
