//! Semantic classes for every joint degree of freedom.
//!
//! A joint's local transform has seven DOFs: three offsets, one rotation and
//! three scales. Looking at the raw matrix there is no way to tell which of
//! them the author changed to pose the character and which ones encode the
//! character's body shape; a forearm scale and a forearm bend are both just
//! numbers. The taxonomy is a table, keyed by joint family, that answers
//! this question for the generic rig. It is what lets the pose codec save
//! "pose only" or "shape only" files and what flags DOFs holding values they
//! should not.
//!
//! A joint family is the joint name with a trailing side marker (`L`/`R`)
//! removed, so `cf_J_Hand_L` and `cf_J_Hand_R` share the `cf_J_Hand_` entry.
//! Joints the table does not know are `Unknown` on every DOF.

pub mod table;

use crate::errors::Result;
use std::collections::HashMap;
use std::fmt;

/// Deviation above which a locked, constrained or noise DOF is reported.
pub const LOCKED_TOLERANCE: f64 = 0.01;
/// Deviation above which an unknown DOF is flagged for attention.
pub const UNKNOWN_TOLERANCE: f64 = 1e-4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dof {
    OffsetX,
    OffsetY,
    OffsetZ,
    Rotation,
    ScaleX,
    ScaleY,
    ScaleZ,
}

pub static ALL_DOFS: [Dof; 7] = [
    Dof::OffsetX,
    Dof::OffsetY,
    Dof::OffsetZ,
    Dof::Rotation,
    Dof::ScaleX,
    Dof::ScaleY,
    Dof::ScaleZ,
];

impl Dof {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn group(self) -> DofGroup {
        match self {
            Dof::OffsetX | Dof::OffsetY | Dof::OffsetZ => DofGroup::Offset,
            Dof::Rotation => DofGroup::Rotation,
            Dof::ScaleX | Dof::ScaleY | Dof::ScaleZ => DofGroup::Scale,
        }
    }

    /// Component index inside its group's vector (0 for the rotation).
    pub fn axis(self) -> usize {
        match self {
            Dof::OffsetX | Dof::ScaleX | Dof::Rotation => 0,
            Dof::OffsetY | Dof::ScaleY => 1,
            Dof::OffsetZ | Dof::ScaleZ => 2,
        }
    }
}

impl fmt::Display for Dof {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            Dof::OffsetX => "offset x",
            Dof::OffsetY => "offset y",
            Dof::OffsetZ => "offset z",
            Dof::Rotation => "rotation",
            Dof::ScaleX => "scale x",
            Dof::ScaleY => "scale y",
            Dof::ScaleZ => "scale z",
        };
        f.write_str(s)
    }
}

/// The three groups a pose file addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DofGroup {
    Offset,
    Rotation,
    Scale,
}

pub static ALL_GROUPS: [DofGroup; 3] = [DofGroup::Offset, DofGroup::Rotation, DofGroup::Scale];

impl DofGroup {
    pub fn dofs(self) -> &'static [Dof] {
        match self {
            DofGroup::Offset => &ALL_DOFS[0..3],
            DofGroup::Rotation => &ALL_DOFS[3..4],
            DofGroup::Scale => &ALL_DOFS[4..7],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DofGroup::Offset => "offset",
            DofGroup::Rotation => "rotation",
            DofGroup::Scale => "scale",
        }
    }

    pub fn from_name(s: &str) -> Option<DofGroup> {
        match s {
            "offset" => Some(DofGroup::Offset),
            "rotation" => Some(DofGroup::Rotation),
            "scale" => Some(DofGroup::Scale),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DofClass {
    /// Stays at its default; any deviation is a violation.
    Locked,
    /// Driven by the rig's own constraints. Reset to the baseline before a
    /// pose is loaded, never written directly.
    Constrained,
    /// Intrinsic body shape.
    Shape,
    /// Animatable FK control.
    Pose,
    /// Carries small export noise; large values are suspicious.
    Noise,
    /// Not classified.
    Unknown,
}

impl DofClass {
    fn from_code(c: char) -> Option<DofClass> {
        Some(match c {
            'x' => DofClass::Locked,
            'c' => DofClass::Constrained,
            's' | 'S' => DofClass::Shape,
            'f' => DofClass::Pose,
            'i' => DofClass::Noise,
            'u' | '?' => DofClass::Unknown,
            _ => return None,
        })
    }
}

/// The classes of a joint's seven DOFs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DofClasses(pub [DofClass; 7]);

impl DofClasses {
    pub fn unknown() -> DofClasses {
        DofClasses([DofClass::Unknown; 7])
    }

    /// Parses a table code (see `table`).
    pub fn parse(code: &str) -> Option<DofClasses> {
        let expanded = match code {
            "f" => "xxxfxxx",
            "c" => "xxxcxxx",
            "?" => "???????",
            s => s,
        };
        let chars: Vec<char> = expanded.chars().collect();
        if chars.len() != 7 {
            return None;
        }
        let mut classes = [DofClass::Unknown; 7];
        for (i, &c) in chars.iter().enumerate() {
            classes[i] = DofClass::from_code(c)?;
        }
        Some(DofClasses(classes))
    }

    pub fn get(&self, dof: Dof) -> DofClass {
        self.0[dof.index()]
    }

    pub fn is_all_unknown(&self) -> bool {
        self.0.iter().all(|&c| c == DofClass::Unknown)
    }
}

/// Result of checking one observed DOF value against its class.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Validation {
    Ok,
    /// A locked or constrained DOF moved.
    Violation { class: DofClass, delta: f64 },
    /// A noise DOF holds a large value.
    Suspicious { delta: f64 },
    /// An unclassified DOF holds a nontrivial value.
    Unrecognized { delta: f64 },
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        *self == Validation::Ok
    }
}

/// Keyed map from joint family to DOF classes.
pub struct Taxonomy {
    families: HashMap<String, DofClasses>,
    untracked: Vec<String>,
}

impl Taxonomy {
    pub fn empty() -> Taxonomy {
        Taxonomy {
            families: HashMap::new(),
            untracked: vec![],
        }
    }

    /// The table for the generic humanoid rig.
    pub fn builtin() -> Taxonomy {
        let mut tax = Taxonomy::empty();
        for &(family, code) in table::FAMILIES {
            if let Err(e) = tax.insert(family, code) {
                error!("{}", e);
            }
        }
        tax.untracked = table::UNTRACKED_PREFIXES.iter().map(|s| s.to_string()).collect();
        tax
    }

    pub fn insert(&mut self, family: &str, code: &str) -> Result<()> {
        let classes = match DofClasses::parse(code) {
            Some(c) => c,
            None => bail!("illegal class code {:?} for joint family {}", code, family),
        };
        self.families.insert(family.to_string(), classes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_untracked(&self, joint_name: &str) -> bool {
        self.untracked.iter().any(|p| joint_name.starts_with(p.as_str()))
    }

    fn lookup(&self, joint_name: &str) -> Option<&DofClasses> {
        if self.is_untracked(joint_name) {
            return None;
        }
        self.families
            .get(joint_name)
            .or_else(|| self.families.get(strip_side(joint_name)?))
    }

    /// True if the joint is in the table.
    pub fn is_known(&self, joint_name: &str) -> bool {
        self.lookup(joint_name).is_some()
    }

    pub fn classes(&self, joint_name: &str) -> DofClasses {
        self.lookup(joint_name).cloned().unwrap_or_else(DofClasses::unknown)
    }

    pub fn classify(&self, joint_name: &str, dof: Dof) -> DofClass {
        self.classes(joint_name).get(dof)
    }

    /// Compares `observed - baseline` against the tolerance of the DOF's
    /// class. Never fails; callers log whatever comes back.
    pub fn validate(&self, joint_name: &str, dof: Dof, observed: f64, baseline: f64) -> Validation {
        if self.is_untracked(joint_name) {
            return Validation::Ok;
        }
        let delta = observed - baseline;
        match self.classify(joint_name, dof) {
            class @ DofClass::Locked | class @ DofClass::Constrained => {
                if delta.abs() > LOCKED_TOLERANCE {
                    Validation::Violation { class, delta }
                } else {
                    Validation::Ok
                }
            }
            DofClass::Noise => {
                if delta.abs() > LOCKED_TOLERANCE {
                    Validation::Suspicious { delta }
                } else {
                    Validation::Ok
                }
            }
            DofClass::Unknown => {
                if delta.abs() > UNKNOWN_TOLERANCE {
                    Validation::Unrecognized { delta }
                } else {
                    Validation::Ok
                }
            }
            DofClass::Shape | DofClass::Pose => Validation::Ok,
        }
    }
}

/// Removes a trailing `L`/`R` side marker.
fn strip_side(joint_name: &str) -> Option<&str> {
    if joint_name.len() > 1 && (joint_name.ends_with('L') || joint_name.ends_with('R')) {
        Some(&joint_name[..joint_name.len() - 1])
    } else {
        None
    }
}

/// One non-ok validation result on a skeleton joint.
#[derive(Clone, Debug)]
pub struct Finding {
    pub joint: String,
    pub dof: Dof,
    pub observed: f64,
    pub result: Validation,
}

/// Validates every DOF of every joint's pose override against the identity
/// and logs the findings.
pub fn audit(skeleton: &crate::skeleton::Skeleton, tax: &Taxonomy) -> Vec<Finding> {
    use crate::skinning::Trs;

    let identity = Trs::identity();
    let mut findings = vec![];
    for joint in skeleton.joints() {
        for &dof in ALL_DOFS.iter() {
            let observed = joint.pose.dof(dof);
            let result = tax.validate(&joint.name, dof, observed, identity.dof(dof));
            if result.is_ok() {
                continue;
            }
            match result {
                Validation::Violation { class, delta } => warn!(
                    "{} {}: {:?} DOF holds {:.4} (off by {:.4}); left as is",
                    joint.name, dof, class, observed, delta,
                ),
                Validation::Suspicious { delta } => warn!(
                    "{} {}: unusually large noise value {:.4}", joint.name, dof, delta,
                ),
                Validation::Unrecognized { delta } => info!(
                    "{} {}: unclassified DOF set to {:.4}", joint.name, dof, delta,
                ),
                Validation::Ok => (),
            }
            findings.push(Finding {
                joint: joint.name.clone(),
                dof,
                observed,
                result,
            });
        }
    }
    findings
}

#[test]
fn test_builtin_table_parses() {
    let tax = Taxonomy::builtin();
    assert_eq!(tax.len(), table::FAMILIES.len());
}

#[test]
fn test_classify_strips_side() {
    let tax = Taxonomy::builtin();
    assert_eq!(tax.classify("cf_J_Hand_L", Dof::Rotation), DofClass::Pose);
    assert_eq!(tax.classify("cf_J_Hand_R", Dof::OffsetX), DofClass::Locked);
    assert_eq!(tax.classify("cf_J_ArmUp00_R", Dof::OffsetX), DofClass::Shape);
    assert_eq!(tax.classify("cf_J_ArmUp00_R", Dof::OffsetZ), DofClass::Constrained);
    assert_eq!(tax.classify("cf_J_ArmUp00_R", Dof::ScaleY), DofClass::Constrained);
    // Exact names win over side stripping.
    assert_eq!(tax.classify("cf_J_Hips", Dof::Rotation), DofClass::Pose);
    // 'S' is internal shape.
    assert_eq!(tax.classify("cf_J_LegUp01_L", Dof::Rotation), DofClass::Shape);
    assert_eq!(tax.classify("cf_J_Mune00_L", Dof::OffsetY), DofClass::Noise);
}

#[test]
fn test_unknown_joints() {
    let tax = Taxonomy::builtin();
    assert!(!tax.is_known("some_hair_joint"));
    assert!(tax.classes("some_hair_joint").is_all_unknown());
    // Untracked prefixes are unknown even though "cf_J_Legsk_" might look sided.
    assert_eq!(tax.classify("cf_J_Legsk_01_00", Dof::ScaleX), DofClass::Unknown);
    assert_eq!(tax.classify("cf_J_ArmUp03_dam_L", Dof::ScaleX), DofClass::Unknown);
}

#[test]
fn test_validate() {
    let tax = Taxonomy::builtin();
    // Locked offset moved.
    match tax.validate("cf_J_Hand_L", Dof::OffsetY, 0.5, 0.0) {
        Validation::Violation { class: DofClass::Locked, .. } => (),
        v => panic!("unexpected {:?}", v),
    }
    // Rounding noise on a locked DOF is fine.
    assert!(tax.validate("cf_J_Hand_L", Dof::OffsetY, 0.004, 0.0).is_ok());
    // Shape and pose DOFs never complain.
    assert!(tax.validate("cf_J_Hand_L", Dof::Rotation, 3.0, 0.0).is_ok());
    assert!(tax.validate("cf_J_Hand_s_L", Dof::ScaleX, 2.0, 1.0).is_ok());
    // Noise.
    match tax.validate("cf_J_Mune01_L", Dof::OffsetX, 0.2, 0.0) {
        Validation::Suspicious { .. } => (),
        v => panic!("unexpected {:?}", v),
    }
    // Unknown joints get flagged even for small values.
    match tax.validate("mystery", Dof::ScaleZ, 1.001, 1.0) {
        Validation::Unrecognized { .. } => (),
        v => panic!("unexpected {:?}", v),
    }
    // Untracked joints are ignored.
    assert!(tax.validate("cf_J_Legsk_01_00", Dof::ScaleZ, 3.0, 1.0).is_ok());
}

#[test]
fn test_parse_codes() {
    assert_eq!(DofClasses::parse("f").unwrap().get(Dof::Rotation), DofClass::Pose);
    assert_eq!(DofClasses::parse("c").unwrap().get(Dof::Rotation), DofClass::Constrained);
    assert!(DofClasses::parse("?").unwrap().is_all_unknown());
    assert!(DofClasses::parse("xxxx").is_none());
    assert!(DofClasses::parse("xxxqxxx").is_none());
}

#[test]
fn test_humanoid_joints_all_classified() {
    let tax = Taxonomy::builtin();
    for &(name, _, _) in crate::fixtures::HUMANOID_JOINTS {
        assert!(tax.is_known(name), "{} is not in the table", name);
        assert!(!tax.classes(name).is_all_unknown());
    }
}
