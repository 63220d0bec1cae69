//! Joint tree for a rig.
//!
//! A skeleton is built once from a flat list of joint records (a name, an
//! optional parent name and a rest local-to-world matrix) and from then on
//! only its pose overrides change. Joints live in an arena indexed by
//! `JointId`. The arena is in depth-first preorder from the single root, so
//! every parent comes before its children and a forward pass over the arena
//! is a top-down walk of the tree.
//!
//! For each joint we keep
//!
//!     rest_world    B, the bind local-to-world
//!     inverse_bind  B^{-1}
//!     local_bind    L = B[parent]^{-1} B
//!     pose          P, the local pose override
//!     baseline      the pose recorded when the rig was built
//!
//! The posed local-to-world is then W = W[parent] L P (see skinning).
//!
//! Changing poses is always done by computing every new pose into a side
//! buffer and then committing the whole buffer at once, so no walk ever
//! reads a half-updated tree.

pub mod dump;
pub mod retarget;
pub mod rigfile;
pub mod state;

use crate::errors::{ErrorKind, Result};
use crate::skinning::Trs;
use crate::util::matrix;
use cgmath::Matrix4;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;

pub type JointId = usize;

#[derive(Clone, Debug)]
pub struct Joint {
    pub name: String,
    pub parent: Option<JointId>,
    pub rest_world: Matrix4<f64>,
    pub inverse_bind: Matrix4<f64>,
    pub local_bind: Matrix4<f64>,
    pub pose: Trs,
    pub baseline: Trs,
}

/// Input to `Skeleton::build`.
#[derive(Clone, Debug)]
pub struct JointRecord {
    pub name: String,
    pub parent: Option<String>,
    pub world: Matrix4<f64>,
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    joints: Vec<Joint>,
    children: Vec<Vec<JointId>>,
    by_name: HashMap<String, JointId>,
    /// Pose-file lines about joints this skeleton does not have.
    unused_pose_lines: Vec<String>,
}

impl Skeleton {
    /// Builds the tree. Fails without building anything if the records do
    /// not form a single tree.
    pub fn build(records: Vec<JointRecord>) -> Result<Skeleton> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            if index.insert(r.name.as_str(), i).is_some() {
                bail!(ErrorKind::DuplicateJoint(r.name.clone()));
            }
        }

        let mut graph = DiGraph::<usize, ()>::with_capacity(records.len(), records.len());
        let nodes: Vec<_> = (0..records.len()).map(|i| graph.add_node(i)).collect();
        let mut record_parent: Vec<Option<usize>> = Vec::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            let parent = match r.parent {
                Some(ref p) => match index.get(p.as_str()) {
                    Some(&pi) => Some(pi),
                    None => bail!(ErrorKind::UnknownParent(r.name.clone(), p.clone())),
                },
                None => None,
            };
            if let Some(pi) = parent {
                graph.add_edge(nodes[pi], nodes[i], ());
            }
            record_parent.push(parent);
        }
        if let Err(cycle) = toposort(&graph, None) {
            let name = records[graph[cycle.node_id()]].name.clone();
            bail!(ErrorKind::JointCycle(name));
        }

        let roots: Vec<usize> = (0..records.len()).filter(|&i| record_parent[i].is_none()).collect();
        let root = match roots.len() {
            0 => bail!(ErrorKind::NoRoot),
            1 => roots[0],
            _ => {
                let names = roots.iter().map(|&i| records[i].name.clone()).collect();
                bail!(ErrorKind::MultipleRoots(names))
            }
        };

        // Preorder walk, children in record order.
        let mut record_children: Vec<Vec<usize>> = vec![vec![]; records.len()];
        for (i, p) in record_parent.iter().enumerate() {
            if let Some(pi) = *p {
                record_children[pi].push(i);
            }
        }
        let mut order = Vec::with_capacity(records.len());
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(record_children[i].iter().rev());
        }
        check!(order.len() == records.len())?;

        let mut id_of = vec![0; records.len()];
        for (id, &i) in order.iter().enumerate() {
            id_of[i] = id;
        }

        let mut slots: Vec<Option<JointRecord>> = records.into_iter().map(Some).collect();
        let mut joints: Vec<Joint> = Vec::with_capacity(order.len());
        let mut children = vec![vec![]; order.len()];
        let mut by_name = HashMap::with_capacity(order.len());
        for (id, &i) in order.iter().enumerate() {
            let r = match slots[i].take() {
                Some(r) => r,
                None => bail!("joint record visited twice"),
            };
            let parent = record_parent[i].map(|pi| id_of[pi]);
            if let Some(p) = parent {
                children[p].push(id);
            }
            let inverse_bind = matrix::invert_or_bump(&r.world);
            let local_bind = match parent {
                Some(p) => joints[p].inverse_bind * r.world,
                None => r.world,
            };
            by_name.insert(r.name.clone(), id);
            joints.push(Joint {
                name: r.name,
                parent,
                rest_world: r.world,
                inverse_bind,
                local_bind,
                pose: Trs::identity(),
                baseline: Trs::identity(),
            });
        }

        Ok(Skeleton { joints, children, by_name, unused_pose_lines: vec![] })
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, id: JointId) -> &Joint {
        &self.joints[id]
    }

    pub fn root(&self) -> JointId {
        0
    }

    pub fn find(&self, name: &str) -> Option<JointId> {
        self.by_name.get(name).cloned()
    }

    pub fn children(&self, id: JointId) -> &[JointId] {
        &self.children[id]
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn parent_name(&self, id: JointId) -> Option<&str> {
        self.joints[id].parent.map(|p| self.joints[p].name.as_str())
    }

    /// Replaces every joint's rest matrix and recomputes the bind data
    /// derived from it. Poses are not touched.
    pub fn set_rest_worlds(&mut self, worlds: &[Matrix4<f64>]) -> Result<()> {
        check!(worlds.len() == self.joints.len())?;
        for id in 0..self.joints.len() {
            let world = worlds[id];
            let inverse_bind = matrix::invert_or_bump(&world);
            let local_bind = match self.joints[id].parent {
                Some(p) => self.joints[p].inverse_bind * world,
                None => world,
            };
            let j = &mut self.joints[id];
            j.rest_world = world;
            j.inverse_bind = inverse_bind;
            j.local_bind = local_bind;
        }
        Ok(())
    }

    pub fn poses(&self) -> Vec<Trs> {
        self.joints.iter().map(|j| j.pose).collect()
    }

    /// Installs a whole buffer of new poses. With `update_baseline` they
    /// also become the baseline.
    pub fn commit_poses(&mut self, poses: Vec<Trs>, update_baseline: bool) -> Result<()> {
        check!(poses.len() == self.joints.len())?;
        for (j, pose) in self.joints.iter_mut().zip(poses) {
            j.pose = pose;
            if update_baseline {
                j.baseline = pose;
            }
        }
        Ok(())
    }

    /// Replaces every baseline.
    pub fn commit_baselines(&mut self, baselines: Vec<Trs>) -> Result<()> {
        check!(baselines.len() == self.joints.len())?;
        for (j, baseline) in self.joints.iter_mut().zip(baselines) {
            j.baseline = baseline;
        }
        Ok(())
    }

    /// Puts every joint back in its bind pose.
    pub fn reset_poses(&mut self) {
        for j in &mut self.joints {
            j.pose = Trs::identity();
        }
    }

    /// Lines from loaded pose files that named joints not in the skeleton,
    /// in the order they were first seen.
    pub fn unused_pose_lines(&self) -> &[String] {
        &self.unused_pose_lines
    }

    /// Remembers pose-file lines for joints not in the skeleton. A line
    /// replaces an earlier one for the same joint and group, and a `null`
    /// line replaces every earlier line for its joint (and vice versa).
    pub fn keep_unused_pose_lines<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        for line in lines {
            let (joint, group) = line_key(&line);
            self.unused_pose_lines.retain(|old| {
                let (j, g) = line_key(old);
                j != joint || (g != group && g != "null" && group != "null")
            });
            self.unused_pose_lines.push(line);
        }
    }

    /// Records describing the rest pose, in arena order. Building from them
    /// gives back the same tree.
    pub fn records(&self) -> Vec<JointRecord> {
        self.joints
            .iter()
            .enumerate()
            .map(|(id, j)| JointRecord {
                name: j.name.clone(),
                parent: self.parent_name(id).map(|s| s.to_string()),
                world: j.rest_world,
            })
            .collect()
    }
}

/// Joint name and group token of a pose-file line.
fn line_key(line: &str) -> (&str, &str) {
    let mut tokens = line.split_whitespace();
    (tokens.next().unwrap_or(""), tokens.next().unwrap_or(""))
}

#[cfg(test)]
fn rec(name: &str, parent: Option<&str>, y: f64) -> JointRecord {
    use cgmath::vec3;
    JointRecord {
        name: name.to_string(),
        parent: parent.map(|s| s.to_string()),
        world: Matrix4::from_translation(vec3(0.0, y, 0.0)),
    }
}

#[test]
fn test_build_orders_parents_first() {
    // Child listed before its parent.
    let skel = Skeleton::build(vec![
        rec("c", Some("b"), 2.0),
        rec("a", None, 0.0),
        rec("b", Some("a"), 1.0),
        rec("d", Some("a"), 1.5),
    ])
    .unwrap();
    let names: Vec<&str> = skel.joints().iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    assert_eq!(skel.root(), 0);
    assert_eq!(skel.children(0), &[1, 3]);
    for (id, j) in skel.joints().iter().enumerate() {
        if let Some(p) = j.parent {
            assert!(p < id);
        }
    }
    assert_eq!(skel.find("c"), Some(2));
    assert_eq!(skel.parent_name(2), Some("b"));
}

#[test]
fn test_local_bind_composes_to_rest() {
    let skel = Skeleton::build(vec![
        rec("a", None, 0.5),
        rec("b", Some("a"), 1.0),
        rec("c", Some("b"), 3.0),
    ])
    .unwrap();
    let c = skel.joint(2);
    assert!((c.local_bind.w.y - 2.0).abs() < 1e-12);
    let world = crate::skinning::world_transform(&skel, 2);
    assert!((world.w.y - 3.0).abs() < 1e-12);
}

#[test]
fn test_build_errors() {
    use crate::errors::Error;

    fn kind(r: Result<Skeleton>) -> ErrorKind {
        match r {
            Err(Error(kind, _)) => kind,
            Ok(_) => panic!("expected an error"),
        }
    }

    match kind(Skeleton::build(vec![])) {
        ErrorKind::NoRoot => (),
        k => panic!("unexpected {:?}", k),
    }
    match kind(Skeleton::build(vec![rec("a", None, 0.0), rec("a", None, 0.0)])) {
        ErrorKind::DuplicateJoint(ref n) if n == "a" => (),
        k => panic!("unexpected {:?}", k),
    }
    match kind(Skeleton::build(vec![rec("a", None, 0.0), rec("b", Some("zz"), 0.0)])) {
        ErrorKind::UnknownParent(ref j, ref p) if j == "b" && p == "zz" => (),
        k => panic!("unexpected {:?}", k),
    }
    match kind(Skeleton::build(vec![rec("a", None, 0.0), rec("b", None, 0.0)])) {
        ErrorKind::MultipleRoots(ref names) => assert_eq!(names.len(), 2),
        k => panic!("unexpected {:?}", k),
    }
    match kind(Skeleton::build(vec![
        rec("r", None, 0.0),
        rec("a", Some("b"), 0.0),
        rec("b", Some("a"), 0.0),
    ])) {
        ErrorKind::JointCycle(_) => (),
        k => panic!("unexpected {:?}", k),
    }
}

#[test]
fn test_commit_poses() {
    use cgmath::vec3;

    let mut skel = Skeleton::build(vec![rec("a", None, 0.0), rec("b", Some("a"), 1.0)]).unwrap();
    let mut poses = skel.poses();
    poses[1].translation = vec3(0.0, 0.0, 1.0);
    skel.commit_poses(poses.clone(), false).unwrap();
    assert_eq!(skel.joint(1).pose, poses[1]);
    assert_eq!(skel.joint(1).baseline, Trs::identity());
    skel.commit_poses(poses.clone(), true).unwrap();
    assert_eq!(skel.joint(1).baseline, poses[1]);
    assert!(skel.commit_poses(vec![], true).is_err());
}

#[test]
fn test_keep_unused_pose_lines() {
    let mut skel = Skeleton::build(vec![rec("a", None, 0.0)]).unwrap();
    skel.keep_unused_pose_lines(vec![
        "cf_J_Tail01 scale 2 2 2".to_string(),
        "cf_J_Tail01 offset 0 1 0".to_string(),
        "cf_J_Ear_L rotation 1 0 0 0".to_string(),
    ]);
    skel.keep_unused_pose_lines(vec!["cf_J_Tail01 scale 3 3 3".to_string()]);
    assert_eq!(
        skel.unused_pose_lines(),
        &[
            "cf_J_Tail01 offset 0 1 0".to_string(),
            "cf_J_Ear_L rotation 1 0 0 0".to_string(),
            "cf_J_Tail01 scale 3 3 3".to_string(),
        ]
    );
    skel.keep_unused_pose_lines(vec!["cf_J_Tail01 null".to_string()]);
    assert_eq!(
        skel.unused_pose_lines(),
        &["cf_J_Ear_L rotation 1 0 0 0".to_string(), "cf_J_Tail01 null".to_string()]
    );
}
