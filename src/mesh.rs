//! Skinned meshes as handed to the solver.

use crate::skinning::MeshFrame;
use cgmath::{Matrix4, Point3};
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq)]
pub struct Influence {
    pub joint: String,
    pub weight: f64,
}

impl Influence {
    pub fn new(joint: &str, weight: f64) -> Influence {
        Influence { joint: joint.to_string(), weight }
    }
}

/// The joints influencing one vertex. Weights need not sum to one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinBinding {
    pub influences: SmallVec<[Influence; 4]>,
}

impl SkinBinding {
    pub fn new(influences: Vec<Influence>) -> SkinBinding {
        SkinBinding { influences: SmallVec::from_vec(influences) }
    }

    pub fn single(joint: &str) -> SkinBinding {
        SkinBinding::new(vec![Influence::new(joint, 1.0)])
    }
}

/// A named alternate set of positions (a blend-shape target) sharing the
/// base mesh's topology and skin binding.
#[derive(Clone, Debug)]
pub struct ShapeChannel {
    pub name: String,
    pub positions: Vec<Point3<f64>>,
}

impl ShapeChannel {
    pub fn new(name: &str, positions: Vec<Point3<f64>>) -> ShapeChannel {
        ShapeChannel { name: name.to_string(), positions }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    /// Deformed positions on input; rest positions once solved.
    pub positions: Vec<Point3<f64>>,
    pub bindings: Vec<SkinBinding>,
    pub channels: Vec<ShapeChannel>,
    /// Mesh-local to skeleton object space, if they differ.
    pub object_matrix: Option<Matrix4<f64>>,
}

impl Mesh {
    pub fn new(name: &str, positions: Vec<Point3<f64>>, bindings: Vec<SkinBinding>) -> Mesh {
        Mesh {
            name: name.to_string(),
            positions,
            bindings,
            channels: vec![],
            object_matrix: None,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn frame(&self) -> MeshFrame {
        match self.object_matrix {
            None => MeshFrame::identity(),
            Some(m) => MeshFrame::new(m).unwrap_or_else(|| {
                warn!("mesh {}: object matrix is singular; ignoring it", self.name);
                MeshFrame::identity()
            }),
        }
    }
}
