//! Small helpers for 4x4 affine matrices.
//!
//! File formats in this crate write matrices row by row (the way the dump
//! and rig files store them) while cgmath stores them column by column, so
//! every conversion goes through `from_rows`/`to_rows`.

use cgmath::{Matrix4, Point3, SquareMatrix};

pub fn from_rows(r: &[[f64; 4]; 4]) -> Matrix4<f64> {
    Matrix4::new(
        r[0][0], r[1][0], r[2][0], r[3][0],
        r[0][1], r[1][1], r[2][1], r[3][1],
        r[0][2], r[1][2], r[2][2], r[3][2],
        r[0][3], r[1][3], r[2][3], r[3][3],
    )
}

pub fn to_rows(m: &Matrix4<f64>) -> [[f64; 4]; 4] {
    let mut r = [[0.0; 4]; 4];
    for row in 0..4 {
        for col in 0..4 {
            r[row][col] = m[col][row];
        }
    }
    r
}

/// Row-major flat list of the 16 entries.
pub fn to_flat_rows(m: &Matrix4<f64>) -> [f64; 16] {
    let r = to_rows(m);
    let mut out = [0.0; 16];
    for row in 0..4 {
        out[row * 4..row * 4 + 4].copy_from_slice(&r[row]);
    }
    out
}

pub fn from_flat_rows(v: &[f64]) -> Option<Matrix4<f64>> {
    if v.len() != 16 {
        return None;
    }
    let mut r = [[0.0; 4]; 4];
    for row in 0..4 {
        r[row].copy_from_slice(&v[row * 4..row * 4 + 4]);
    }
    Some(from_rows(&r))
}

/// Applies an affine matrix to a point. The bottom row is ignored (no
/// perspective divide).
pub fn apply(m: &Matrix4<f64>, p: Point3<f64>) -> Point3<f64> {
    let v = m * p.to_homogeneous();
    Point3::new(v.x, v.y, v.z)
}

/// Bumps the basis diagonal of a singular matrix until it can be inverted.
///
/// Dumped joints are sometimes scaled to zero to hide part of a mesh; such a
/// joint ends up tiny instead of flat.
pub fn make_invertible(m: &Matrix4<f64>) -> Matrix4<f64> {
    if m.is_invertible() {
        return *m;
    }

    for &epsilon in &[0.000001, 0.00001, 0.0001, 0.001f64] {
        let mut m2 = *m;
        m2.x.x += epsilon;
        m2.y.y += epsilon;
        m2.z.z += epsilon;
        if m2.is_invertible() {
            return m2;
        }
    }

    warn!("found singular bind matrix; proceeding with the identity");
    debug!("namely, the matrix {:#?}", m);
    Matrix4::identity()
}

/// Inverse of a matrix, going through `make_invertible` first.
pub fn invert_or_bump(m: &Matrix4<f64>) -> Matrix4<f64> {
    make_invertible(m).invert().unwrap_or_else(Matrix4::identity)
}

#[test]
fn test_rows_round_trip() {
    let rows = [
        [1.0, 2.0, 3.0, 4.0],
        [5.0, 6.0, 7.0, 8.0],
        [9.0, 10.0, 11.0, 12.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let m = from_rows(&rows);
    // Translation lives in the last column.
    assert_eq!(m.w.x, 4.0);
    assert_eq!(m.w.y, 8.0);
    assert_eq!(to_rows(&m), rows);
    assert_eq!(from_flat_rows(&to_flat_rows(&m)), Some(m));
    assert_eq!(from_flat_rows(&[1.0; 15]), None);
}

#[test]
fn test_make_invertible() {
    use cgmath::Zero;

    // A joint scaled to nothing gets a tiny scale instead.
    let flat = Matrix4::<f64>::from_scale(0.0);
    let m = make_invertible(&flat);
    assert!(m.is_invertible());
    assert!(m.x.x > 0.0 && m.x.x < 0.01);
    assert_eq!(m.w.w, 1.0);

    // Not even affine; gives up.
    let zero = Matrix4::<f64>::zero();
    assert_eq!(make_invertible(&zero), Matrix4::identity());

    let id = Matrix4::<f64>::identity();
    assert_eq!(make_invertible(&id), id);
}
