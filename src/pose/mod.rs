//! Pose files.
//!
//! A pose file is UTF-8 text with one override per line:
//!
//!     cf_J_ArmUp00_L rotation 0.9397 0.0000 0.0000 -0.3420
//!     cf_J_Hand_s_L scale 1.2000 1.1000 1.0000
//!     cf_J_Neck null
//!
//! The group is `offset`, `rotation` or `scale`. Rotations are either four
//! quaternion components `w x y z` or three Euler angles in degrees, applied
//! Y first, then Z, then X. `null` resets all three groups of a joint. Blank
//! lines and lines starting with `#` are skipped.
//!
//! What gets written and what gets loaded is filtered per DOF through the
//! taxonomy by a `PoseMode`, so a file can carry just the FK pose, just the
//! body shape, or both.

pub mod apply;
pub mod mirror;
pub mod read;
pub mod write;

pub use self::apply::{apply, scale_shape, RigDelta};
pub use self::mirror::{mirror_left_to_right, Mirror};
pub use self::read::read;
pub use self::write::write;

use crate::errors::Error;
use crate::skinning::trs::canonical;
use crate::taxonomy::{DofClass, DofGroup};
use cgmath::{vec3, Deg, InnerSpace, Quaternion, Rotation3, Vector3};
use std::fmt::{self, Write};
use std::str::FromStr;

/// Decimal places written for each value.
pub const DECIMALS: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoseMode {
    /// FK controls only.
    Pose,
    /// Body shape: shape, noise and unknown DOFs.
    Shape,
    /// Both of the above.
    All,
    /// Every DOF, whatever its class. Constrained DOFs are not reset.
    Raw,
}

impl PoseMode {
    pub fn includes(self, class: DofClass) -> bool {
        use crate::taxonomy::DofClass::*;
        match self {
            PoseMode::Pose => class == Pose,
            PoseMode::Shape => class == Shape || class == Noise || class == Unknown,
            PoseMode::All => class == Pose || class == Shape || class == Noise || class == Unknown,
            PoseMode::Raw => true,
        }
    }

    /// True if loading in this mode replaces body shape.
    pub fn includes_shape(self) -> bool {
        self != PoseMode::Pose
    }
}

impl FromStr for PoseMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<PoseMode, Error> {
        Ok(match s {
            "pose" => PoseMode::Pose,
            "shape" => PoseMode::Shape,
            "all" => PoseMode::All,
            "raw" => PoseMode::Raw,
            _ => bail!("unknown pose mode {:?} (expected pose, shape, all or raw)", s),
        })
    }
}

impl fmt::Display for PoseMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            PoseMode::Pose => "pose",
            PoseMode::Shape => "shape",
            PoseMode::All => "all",
            PoseMode::Raw => "raw",
        })
    }
}

/// One group of one joint.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseOverride {
    pub joint: String,
    pub group: DofGroup,
    pub values: Vec<f64>,
}

impl PoseOverride {
    /// Offset or scale values.
    pub fn vector(&self) -> Option<Vector3<f64>> {
        match self.values[..] {
            [x, y, z] if self.group != DofGroup::Rotation => Some(vec3(x, y, z)),
            _ => None,
        }
    }

    /// Rotation values, telling quaternions and Euler angles apart by their
    /// number.
    pub fn rotation(&self) -> Option<Quaternion<f64>> {
        if self.group != DofGroup::Rotation {
            return None;
        }
        let q = match self.values[..] {
            [w, x, y, z] => Quaternion::new(w, x, y, z),
            [x, y, z] => euler_yzx(x, y, z),
            _ => return None,
        };
        if q.magnitude2() == 0.0 || !q.magnitude2().is_finite() {
            return None;
        }
        Some(canonical(q.normalize()))
    }
}

/// Euler angles in degrees, applied Y, Z, X.
pub fn euler_yzx(x: f64, y: f64, z: f64) -> Quaternion<f64> {
    Quaternion::from_angle_x(Deg(x)) * Quaternion::from_angle_z(Deg(z)) * Quaternion::from_angle_y(Deg(y))
}

/// Rounds to `DECIMALS` places, without negative zeros.
pub fn round_value(x: f64) -> f64 {
    let scale = 10f64.powi(DECIMALS as i32);
    let r = (x * scale).round() / scale;
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

/// The contents of a pose file.
#[derive(Clone, Debug, Default)]
pub struct PoseFile {
    pub overrides: Vec<PoseOverride>,
    /// Lines about joints the skeleton does not have, kept verbatim.
    pub unused: Vec<String>,
}

impl PoseFile {
    pub fn to_text(&self) -> String {
        let mut s = String::new();
        for o in &self.overrides {
            let _ = write!(s, "{} {}", o.joint, o.group.name());
            for &v in &o.values {
                let _ = write!(s, " {:.*}", DECIMALS, round_value(v));
            }
            s.push('\n');
        }
        for line in &self.unused {
            s.push_str(line);
            s.push('\n');
        }
        s
    }
}

#[test]
fn test_euler_order() {
    use cgmath::Rotation;

    // Y 90 takes +x to -z, then X 90 takes -z to +y.
    let q = euler_yzx(90.0, 90.0, 0.0);
    let v = q.rotate_vector(vec3(1.0, 0.0, 0.0));
    assert!((v - vec3(0.0, 1.0, 0.0)).magnitude() < 1e-12);
}

#[test]
fn test_override_values() {
    let o = PoseOverride {
        joint: "j".to_string(),
        group: DofGroup::Rotation,
        values: vec![-2.0, 0.0, 0.0, 0.0],
    };
    // Normalized and canonical.
    assert_eq!(o.rotation(), Some(Quaternion::new(1.0, 0.0, 0.0, 0.0)));
    assert_eq!(o.vector(), None);

    let o = PoseOverride { values: vec![0.0, 0.0, 0.0, 0.0], ..o };
    assert_eq!(o.rotation(), None);

    let o = PoseOverride {
        joint: "j".to_string(),
        group: DofGroup::Scale,
        values: vec![1.0, 2.0, 3.0],
    };
    assert_eq!(o.vector(), Some(vec3(1.0, 2.0, 3.0)));
}

#[test]
fn test_pose_mode() {
    assert_eq!("shape".parse::<PoseMode>().unwrap(), PoseMode::Shape);
    assert!("everything".parse::<PoseMode>().is_err());
    assert!(PoseMode::Pose.includes(DofClass::Pose));
    assert!(!PoseMode::Pose.includes(DofClass::Shape));
    assert!(PoseMode::Shape.includes(DofClass::Unknown));
    assert!(!PoseMode::All.includes(DofClass::Locked));
    assert!(!PoseMode::All.includes(DofClass::Constrained));
    assert!(PoseMode::Raw.includes(DofClass::Constrained));
}

#[test]
fn test_to_text() {
    let file = PoseFile {
        overrides: vec![PoseOverride {
            joint: "cf_J_Hand_L".to_string(),
            group: DofGroup::Offset,
            values: vec![0.123456, -0.00001, 2.0],
        }],
        unused: vec!["cf_J_Tail rotation 1 0 0 0".to_string()],
    };
    assert_eq!(
        file.to_text(),
        "cf_J_Hand_L offset 0.1235 0.0000 2.0000\ncf_J_Tail rotation 1 0 0 0\n"
    );
}
