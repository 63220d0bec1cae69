//! Starting guesses for vertices the closed form could not solve.
//!
//! Two sources, tried in order:
//!
//! * For a shape channel, the base channel. If the base solved vertex i, the
//!   channel's rest position is guessed as the base rest position moved by
//!   the difference between the two deformed positions, with the difference
//!   rescaled per axis by how much the base channel shrank or grew going
//!   from deformed to rest space.
//!
//! * The nearest vertex (in deformed space) that was solved exactly. Skinning
//!   is locally close to a translation, so vertex i gets that neighbour's
//!   rest position plus the deformed-space offset between the two.

use super::VertexStatus;
use cgmath::{ElementWise, InnerSpace, Point3, Vector3};

/// Extents below this are treated as flat and not rescaled.
const FLAT_EXTENT: f64 = 1e-9;

/// Axis-aligned bounding box.
#[derive(Copy, Clone, Debug)]
pub struct Bounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds {
    pub fn of<'a, I>(points: I) -> Option<Bounds>
    where
        I: IntoIterator<Item = &'a Point3<f64>>,
    {
        let mut it = points.into_iter();
        let first = *it.next()?;
        let mut b = Bounds { min: first, max: first };
        for p in it {
            for i in 0..3 {
                b.min[i] = b.min[i].min(p[i]);
                b.max[i] = b.max[i].max(p[i]);
            }
        }
        Some(b)
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }
}

/// Per-axis ratio of the rest-space extent to the deformed-space extent,
/// measured over the vertices that have a rest position.
pub fn bbox_scale(
    rest: &[Point3<f64>],
    deformed: &[Point3<f64>],
    status: &[VertexStatus],
) -> Vector3<f64> {
    let solved = || (0..rest.len()).filter(|&i| status[i].is_solved());
    let r = Bounds::of(solved().map(|i| &rest[i]));
    let d = Bounds::of(solved().map(|i| &deformed[i]));
    let (r, d) = match (r, d) {
        (Some(r), Some(d)) => (r.extent(), d.extent()),
        _ => return Vector3::new(1.0, 1.0, 1.0),
    };
    let mut scale = Vector3::new(1.0, 1.0, 1.0);
    for i in 0..3 {
        if d[i] > FLAT_EXTENT && r[i] > FLAT_EXTENT {
            scale[i] = r[i] / d[i];
        }
    }
    scale
}

/// Seeds shape-channel vertices from the solved base channel.
pub struct BaseDifferential<'a> {
    rest: &'a [Point3<f64>],
    deformed: &'a [Point3<f64>],
    status: &'a [VertexStatus],
    scale: Vector3<f64>,
}

impl<'a> BaseDifferential<'a> {
    pub fn new(
        rest: &'a [Point3<f64>],
        deformed: &'a [Point3<f64>],
        status: &'a [VertexStatus],
    ) -> BaseDifferential<'a> {
        let scale = bbox_scale(rest, deformed, status);
        BaseDifferential { rest, deformed, status, scale }
    }

    pub fn seed(&self, i: usize, channel_deformed: Point3<f64>) -> Option<Point3<f64>> {
        if i >= self.rest.len() || !self.status[i].is_solved() {
            return None;
        }
        let delta = (channel_deformed - self.deformed[i]).mul_element_wise(self.scale);
        Some(self.rest[i] + delta)
    }
}

/// Index of the anchor closest to `p` in deformed space.
pub fn nearest(p: Point3<f64>, deformed: &[Point3<f64>], anchors: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &j in anchors {
        let d2 = (deformed[j] - p).magnitude2();
        match best {
            Some((_, b)) if b <= d2 => (),
            _ => best = Some((j, d2)),
        }
    }
    best.map(|(j, _)| j)
}

/// Seeds vertex `i` from its nearest anchor.
pub fn from_neighbour(
    i: usize,
    deformed: &[Point3<f64>],
    rest: &[Point3<f64>],
    anchors: &[usize],
) -> Option<Point3<f64>> {
    let j = nearest(deformed[i], deformed, anchors)?;
    Some(rest[j] + (deformed[i] - deformed[j]))
}

#[test]
fn test_nearest_neighbour_seed() {
    let deformed = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(10.0, 0.0, 0.0),
        Point3::new(9.0, 1.0, 0.0),
    ];
    let rest = vec![
        Point3::new(0.0, 5.0, 0.0),
        Point3::new(10.0, 5.0, 0.0),
        Point3::new(0.0, 0.0, 0.0),
    ];
    assert_eq!(nearest(deformed[2], &deformed, &[0, 1]), Some(1));
    let s = from_neighbour(2, &deformed, &rest, &[0, 1]).unwrap();
    assert_eq!(s, Point3::new(9.0, 6.0, 0.0));
    assert_eq!(from_neighbour(2, &deformed, &rest, &[]), None);
}

#[test]
fn test_base_differential() {
    use super::VertexStatus::*;

    // The base channel's rest space is the deformed space scaled by 2 in x.
    let base_deformed = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0)];
    let base_rest = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 0.0)];
    let status = vec![Exact, Exact];
    let base = BaseDifferential::new(&base_rest, &base_deformed, &status);
    let s = base.seed(1, Point3::new(1.5, 1.0, 0.0)).unwrap();
    assert!((s.x - 3.0).abs() < 1e-12);
    assert!((s.y - 1.0).abs() < 1e-12);
    // Flat z axis is not rescaled.
    let s = base.seed(0, Point3::new(0.0, 0.0, 0.25)).unwrap();
    assert!((s.z - 0.25).abs() < 1e-12);

    let status = vec![Exact, Unsolved];
    let base = BaseDifferential::new(&base_rest, &base_deformed, &status);
    assert!(base.seed(1, Point3::new(1.5, 1.0, 0.0)).is_none());
}
