//! Translation/rotation/scale decomposition of joint-local transforms.

use crate::taxonomy::{Dof, DofGroup};
use cgmath::{vec3, InnerSpace, Matrix3, Matrix4, One, Quaternion, SquareMatrix, Vector3};

/// Values closer than this to their default are snapped to it.
pub const SNAP: f64 = 1e-4;

/// Scale factors closer to zero than this are bumped away from it so the
/// transform stays invertible.
const SMALL_SCALE: f64 = 0.000_002;

/// A decomposed local transform, composed as `T * R * S`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Trs {
    pub translation: Vector3<f64>,
    pub rotation: Quaternion<f64>,
    pub scale: Vector3<f64>,
}

impl Trs {
    pub fn identity() -> Trs {
        Trs {
            translation: vec3(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: vec3(1.0, 1.0, 1.0),
        }
    }

    /// Decomposes an affine matrix. Shear is dropped; a negative determinant
    /// is folded into the x scale.
    pub fn from_matrix(m: &Matrix4<f64>) -> Trs {
        let translation = m.w.truncate();

        let axes = [vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0), vec3(0.0, 0.0, 1.0)];
        let mut cols = [m.x.truncate(), m.y.truncate(), m.z.truncate()];
        let mut scale = vec3(cols[0].magnitude(), cols[1].magnitude(), cols[2].magnitude());
        if Matrix3::from_cols(cols[0], cols[1], cols[2]).determinant() < 0.0 {
            scale.x = -scale.x;
        }
        for i in 0..3 {
            if scale[i].abs() < SMALL_SCALE {
                // A collapsed axis carries no rotation information.
                cols[i] = axes[i];
                scale[i] = if scale[i] < 0.0 { -SMALL_SCALE } else { SMALL_SCALE };
            } else {
                cols[i] /= scale[i];
            }
        }

        let basis = Matrix3::from_cols(cols[0], cols[1], cols[2]);
        let q = Quaternion::from(basis);
        let rotation = if q.magnitude2().is_finite() && q.magnitude2() > 0.0 {
            canonical(q.normalize())
        } else {
            Quaternion::one()
        };

        Trs { translation, rotation, scale }
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        Matrix4::from(self)
    }

    /// Snaps values within `SNAP` of their defaults onto the defaults, so that
    /// floating-point noise reads as "unchanged".
    pub fn snapped(mut self) -> Trs {
        for i in 0..3 {
            if self.translation[i].abs() < SNAP {
                self.translation[i] = 0.0;
            }
            if (self.scale[i] - 1.0).abs() < SNAP {
                self.scale[i] = 1.0;
            }
            if self.rotation.v[i].abs() < SNAP {
                self.rotation.v[i] = 0.0;
            }
        }
        if (self.rotation.s - 1.0).abs() < SNAP {
            self.rotation.s = 1.0;
        }
        let len = self.rotation.magnitude();
        self.rotation = if len.is_finite() && len > 0.0 {
            self.rotation / len
        } else {
            Quaternion::one()
        };
        self
    }

    /// Scalar value of one DOF. The rotation DOF is measured by the size of
    /// the quaternion's vector part.
    pub fn dof(&self, dof: Dof) -> f64 {
        match dof.group() {
            DofGroup::Offset => self.translation[dof.axis()],
            DofGroup::Scale => self.scale[dof.axis()],
            DofGroup::Rotation => {
                let v = self.rotation.v;
                v.x.abs() + v.y.abs() + v.z.abs()
            }
        }
    }

    /// Copies one DOF from `other`.
    pub fn set_dof_from(&mut self, other: &Trs, dof: Dof) {
        match dof.group() {
            DofGroup::Offset => self.translation[dof.axis()] = other.translation[dof.axis()],
            DofGroup::Scale => self.scale[dof.axis()] = other.scale[dof.axis()],
            DofGroup::Rotation => self.rotation = other.rotation,
        }
    }

    /// The numbers a pose file stores for a group. Rotations are `w x y z`.
    pub fn group_values(&self, group: DofGroup) -> Vec<f64> {
        match group {
            DofGroup::Offset => vec![self.translation.x, self.translation.y, self.translation.z],
            DofGroup::Rotation => {
                let q = self.rotation;
                vec![q.s, q.v.x, q.v.y, q.v.z]
            }
            DofGroup::Scale => vec![self.scale.x, self.scale.y, self.scale.z],
        }
    }

    /// True if the group differs from `other` by more than `SNAP` anywhere.
    pub fn group_differs(&self, other: &Trs, group: DofGroup) -> bool {
        let a = self.group_values(group);
        let b = other.group_values(group);
        if group == DofGroup::Rotation {
            // q and -q are the same rotation.
            let d = a.iter().zip(&b).map(|(x, y)| x * y).sum::<f64>().abs();
            return (1.0 - d) > SNAP * SNAP;
        }
        a.iter().zip(&b).any(|(x, y)| (x - y).abs() >= SNAP)
    }
}

/// Picks the representative with a non-negative real part.
pub fn canonical(q: Quaternion<f64>) -> Quaternion<f64> {
    if q.s < 0.0 {
        -q
    } else {
        q
    }
}

impl<'a> std::convert::From<&'a Trs> for Matrix4<f64> {
    fn from(trs: &'a Trs) -> Matrix4<f64> {
        let s = trs.scale;
        let mut m = Matrix4::from_nonuniform_scale(s.x, s.y, s.z);
        m = Matrix4::from(trs.rotation) * m;
        m = Matrix4::from_translation(trs.translation) * m;
        m
    }
}

#[cfg(test)]
fn assert_close(a: &Matrix4<f64>, b: &Matrix4<f64>) {
    for c in 0..4 {
        for r in 0..4 {
            assert!((a[c][r] - b[c][r]).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }
}

#[test]
fn test_decompose_recompose() {
    use cgmath::{Deg, Rotation3};

    let trs = Trs {
        translation: vec3(1.0, -2.0, 0.5),
        rotation: Quaternion::from_angle_y(Deg(30.0)) * Quaternion::from_angle_x(Deg(-70.0)),
        scale: vec3(1.5, 0.25, 2.0),
    };
    let m = trs.to_matrix();
    let back = Trs::from_matrix(&m);
    assert_close(&back.to_matrix(), &m);
    assert!((back.scale - trs.scale).magnitude() < 1e-9);
    assert!((back.translation - trs.translation).magnitude() < 1e-9);
}

#[test]
fn test_decompose_mirrored() {
    let m = Matrix4::from_nonuniform_scale(-1.0, 1.0, 1.0);
    let trs = Trs::from_matrix(&m);
    assert!((trs.scale.x + 1.0).abs() < 1e-12);
    assert_close(&trs.to_matrix(), &m);
}

#[test]
fn test_decompose_collapsed_axis() {
    let m = Matrix4::from_nonuniform_scale(1.0, 0.0, 1.0);
    let trs = Trs::from_matrix(&m);
    assert!(trs.scale.y > 0.0 && trs.scale.y < 1e-5);
    assert!(trs.to_matrix().is_invertible());
    assert_eq!(trs.rotation, Quaternion::one());
}

#[test]
fn test_snap() {
    let mut trs = Trs::identity();
    trs.translation = vec3(0.00004, 0.3, -0.00009);
    trs.scale = vec3(1.00002, 0.9, 1.0);
    trs.rotation = Quaternion::new(0.99996, 0.00001, 0.0, 0.0);
    let s = trs.snapped();
    assert_eq!(s.translation, vec3(0.0, 0.3, 0.0));
    assert_eq!(s.scale, vec3(1.0, 0.9, 1.0));
    assert_eq!(s.rotation, Quaternion::one());
}

#[test]
fn test_snap_keeps_rotation_unit() {
    // Dropping the small x component leaves a unit quaternion.
    let h = 0.5f64.sqrt();
    let mut trs = Trs::identity();
    trs.rotation = Quaternion::new(h, 0.00009, h, 0.0).normalize();
    let mut s = trs.snapped();
    assert_eq!(s.rotation.v.x, 0.0);
    assert!((s.rotation.magnitude() - 1.0).abs() < 1e-12);

    // Snapping again changes nothing more.
    for _ in 0..100 {
        s = s.snapped();
    }
    assert!((s.rotation.magnitude() - 1.0).abs() < 1e-12);
    assert!((s.rotation.s - h).abs() < 1e-9 && (s.rotation.v.y - h).abs() < 1e-9);
}

#[test]
fn test_group_differs() {
    let a = Trs::identity();
    let mut b = a;
    b.rotation = -b.rotation;
    assert!(!a.group_differs(&b, DofGroup::Rotation));
    b.scale.z = 1.1;
    assert!(a.group_differs(&b, DofGroup::Scale));
    assert!(!a.group_differs(&b, DofGroup::Offset));
}
