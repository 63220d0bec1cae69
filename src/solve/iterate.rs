//! Iterative inverse skinning.
//!
//! Before it was clear that the per-vertex problem is linear, rest positions
//! were found by search: start from a guess x, skin it, compare with the
//! deformed position d and move x to shrink the residual r = d - A x. Moves
//! go along L^T r (L the linear part of A), which is the steepest descent
//! direction of |r|^2. The step doubles after every improvement and halves
//! after every regression; when consecutive residuals point in opposite
//! directions the search is overshooting and the step is cut further.
//!
//! The closed form supersedes this whenever A is invertible. It is still
//! useful when A is singular but the deformed point lies in its image (a
//! joint scaled flat, say), where it finds some preimage, and as a
//! diagnostic mode.

use super::{seed, Solution, VertexStatus};
use crate::util::matrix;
use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Point3};

#[derive(Copy, Clone, Debug)]
pub struct Refined {
    pub position: Point3<f64>,
    pub residual: f64,
    pub converged: bool,
    pub passes: usize,
}

fn linear_part(a: &Matrix4<f64>) -> Matrix3<f64> {
    Matrix3::from_cols(a.x.truncate(), a.y.truncate(), a.z.truncate())
}

/// Searches for x with A x = `deformed`, starting from `guess`.
pub fn refine(
    a: &Matrix4<f64>,
    deformed: Point3<f64>,
    guess: Point3<f64>,
    tolerance: f64,
    max_passes: usize,
) -> Refined {
    let lt = linear_part(a).transpose();
    let residual_at = |x: Point3<f64>| deformed - matrix::apply(a, x);

    let mut x = guess;
    let mut r = residual_at(x);
    let mut err = r.magnitude();
    if !err.is_finite() {
        return Refined { position: guess, residual: err, converged: false, passes: 0 };
    }
    let mut step = 1.0;
    let mut osc = 0u32;
    let mut passes = 0;
    while passes < max_passes && err >= tolerance {
        passes += 1;
        let dir = lt * r;
        if dir.magnitude2() == 0.0 {
            // Residual is orthogonal to the image of A; no move helps.
            break;
        }
        let candidate = x + dir * step;
        let r2 = residual_at(candidate);
        let err2 = r2.magnitude();
        if err2.is_finite() && err2 < err {
            if r.dot(r2) < 0.0 {
                osc += 1;
                step /= 1.0 + osc as f64;
            } else {
                step *= 2.0;
            }
            x = candidate;
            r = r2;
            err = err2;
        } else {
            step *= 0.5;
        }
        trace!("pass {}: residual {:e}, step {:e}", passes, err, step);
    }

    Refined { position: x, residual: err, converged: err < tolerance, passes }
}

/// The whole-mesh iterative method: every vertex is searched for starting
/// from its deformed position; then, once all of them are done, the ones
/// that did not converge are restarted from the nearest converged vertex.
pub fn solve_iteratively(
    transforms: &[Option<Matrix4<f64>>],
    deformed: &[Point3<f64>],
    tolerance: f64,
    max_passes: usize,
) -> Solution {
    let n = deformed.len();
    let mut rest = deformed.to_vec();
    let mut status = vec![VertexStatus::Unsolved; n];

    // First attempt
    let mut pending = vec![];
    for i in 0..n {
        match transforms[i] {
            Some(ref a) => {
                let r = refine(a, deformed[i], deformed[i], tolerance, max_passes);
                if r.converged {
                    rest[i] = r.position;
                    status[i] = VertexStatus::Iterated;
                } else {
                    pending.push(i);
                }
            }
            None => pending.push(i),
        }
    }

    // Second attempt; reads only results of the first.
    let anchors: Vec<usize> = (0..n).filter(|&i| status[i] == VertexStatus::Iterated).collect();
    let mut second = Vec::with_capacity(pending.len());
    for &i in &pending {
        let guess = match seed::from_neighbour(i, deformed, &rest, &anchors) {
            Some(g) => g,
            None => {
                second.push((i, deformed[i], VertexStatus::Unsolved));
                continue;
            }
        };
        let result = match transforms[i] {
            Some(ref a) => {
                let r = refine(a, deformed[i], guess, tolerance, max_passes);
                let st = if r.converged { VertexStatus::Iterated } else { VertexStatus::Approximated };
                (i, r.position, st)
            }
            None => (i, guess, VertexStatus::Approximated),
        };
        second.push(result);
    }
    for (i, p, st) in second {
        rest[i] = p;
        status[i] = st;
    }

    Solution { rest, status }
}

#[test]
fn test_refine_rotation_converges() {
    use cgmath::{Deg, Rotation3, Quaternion};

    let a = Matrix4::from(Quaternion::from_angle_x(Deg(90.0)));
    let r = refine(&a, Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.0, 1.0), 1e-4, 40);
    assert!(r.converged);
    assert!((r.position - Point3::new(0.0, 1.0, 0.0)).magnitude() < 1e-4);
}

#[test]
fn test_refine_scaled() {
    // The first steps overshoot and get halved.
    let a = Matrix4::from_scale(2.0);
    let r = refine(&a, Point3::new(3.0, 1.0, 2.0), Point3::new(0.0, 0.0, 0.0), 1e-4, 40);
    assert!(r.converged, "{:?}", r);
    assert!(r.passes > 1);
    assert!((r.position - Point3::new(1.5, 0.5, 1.0)).magnitude() < 1e-3);
}

#[test]
fn test_refine_singular() {
    // y collapsed; only points with y = 0 are reachable.
    let a = Matrix4::from_nonuniform_scale(1.0, 0.0, 1.0);
    let r = refine(&a, Point3::new(1.0, 0.0, 1.0), Point3::new(0.0, 5.0, 0.0), 1e-4, 40);
    assert!(r.converged);
    assert!((r.position.x - 1.0).abs() < 1e-4);
    assert!((r.position.y - 5.0).abs() < 1e-12);

    let r = refine(&a, Point3::new(1.0, 1.0, 1.0), Point3::new(0.0, 0.0, 0.0), 1e-4, 40);
    assert!(!r.converged);
    assert!(r.passes <= 40);
    assert!(r.position.x.is_finite());
}

#[test]
fn test_solve_iteratively_two_attempts() {
    let transforms = vec![
        Some(Matrix4::from_scale(2.0)),
        Some(Matrix4::from_scale(2.0)),
        None,
    ];
    let deformed = vec![
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(4.0, 2.0, 0.0),
        Point3::new(4.1, 2.0, 0.0),
    ];
    let s = solve_iteratively(&transforms, &deformed, 1e-4, 40);
    assert_eq!(s.status[0], VertexStatus::Iterated);
    assert_eq!(s.status[1], VertexStatus::Iterated);
    assert_eq!(s.status[2], VertexStatus::Approximated);
    assert!((s.rest[1] - Point3::new(2.0, 1.0, 0.0)).magnitude() < 1e-3);
    // Seeded from vertex 1.
    assert!((s.rest[2] - Point3::new(2.1, 1.0, 0.0)).magnitude() < 1e-3);
}
