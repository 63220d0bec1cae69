error_chain! {
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error);
        ParseFloat(::std::num::ParseFloatError);
        Json(::json::Error);
        Persist(::tempfile::PersistError);
    }

    errors {
        BadDump(line: usize, reason: String) {
            description("unparseable skeleton dump")
            display("skeleton dump, line {}: {}", line, reason)
        }
        NoRoot {
            description("skeleton has no root joint")
            display("skeleton has no root joint")
        }
        MultipleRoots(names: Vec<String>) {
            description("skeleton has more than one root joint")
            display("skeleton has more than one root joint: {}", names.join(", "))
        }
        UnknownParent(joint: String, parent: String) {
            description("joint refers to a parent that does not exist")
            display("joint {} refers to missing parent {}", joint, parent)
        }
        DuplicateJoint(name: String) {
            description("joint name appears twice")
            display("joint {} appears more than once", name)
        }
        JointCycle(name: String) {
            description("joint parent links form a cycle")
            display("joint parent links form a cycle through {}", name)
        }
        BadRigFile(line: usize, reason: String) {
            description("unparseable rig file")
            display("rig file, line {}: {}", line, reason)
        }
        BadPoseLine(line: usize, reason: String) {
            description("unparseable pose file")
            display("pose file, line {}: {}", line, reason)
        }
        BadCharacter(reason: String) {
            description("unparseable character file")
            display("character file: {}", reason)
        }
        TopologyMismatch(mesh: String, expected: usize, found: usize) {
            description("vertex count mismatch")
            display("mesh {}: expected {} vertices, found {}", mesh, expected, found)
        }
        BadState(reason: String) {
            description("unparseable skeleton state")
            display("skeleton state: {}", reason)
        }
    }
}

macro_rules! check {
    ($b:expr) => {
        if !$b {
            use crate::errors::Error;
            use crate::errors::ErrorKind;
            Err(Error::from_kind(ErrorKind::Msg(format!(
                "expected: {}",
                stringify!($b)
            ))))
        } else {
            Ok(())
        }
    };
}
