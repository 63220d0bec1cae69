mod pose;
mod rig;
mod solve;

use crate::errors::Result;
use crate::pose::PoseMode;
use crate::skeleton::state::State;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::path::{Path, PathBuf};

pub fn app() -> App<'static, 'static> {
    let state = || {
        Arg::with_name("STATE")
            .short("s")
            .long("state")
            .takes_value(true)
            .required(true)
            .help("skeleton state file (skeleton.json from `solve`)")
    };
    let mode = || {
        Arg::with_name("MODE")
            .short("m")
            .long("mode")
            .takes_value(true)
            .possible_values(&["pose", "shape", "all", "raw"])
            .default_value("pose")
            .help("which DOFs to include")
    };
    let state_out = || {
        Arg::with_name("OUTPUT")
            .short("o")
            .long("output")
            .takes_value(true)
            .help("where to write the new state (default: overwrite --state)")
    };

    App::new("rigsolve")
        .about("Recovers rest-pose geometry for characters retargeted onto a generic rig")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::DisableVersion)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .global(true)
                .help("more logging (-vv for even more)"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .global(true)
                .conflicts_with("verbose")
                .help("only log warnings and errors"),
        )
        .subcommand(
            SubCommand::with_name("solve")
                .about("Retarget a skeleton dump and solve a character's rest geometry")
                .arg(Arg::with_name("DUMP").short("d").long("dump").takes_value(true).required(true)
                    .help("skeleton dump"))
                .arg(Arg::with_name("RIG").short("r").long("rig").takes_value(true)
                    .help("default rig file (without one the dump is taken as the rest pose)"))
                .arg(Arg::with_name("CHARACTER").short("c").long("character").takes_value(true).required(true)
                    .help("character file with deformed meshes"))
                .arg(Arg::with_name("OUTPUT").short("o").long("output").takes_value(true).required(true)
                    .help("output directory (will be created)"))
                .arg(Arg::with_name("CACHE").long("cache").takes_value(true)
                    .help("solution cache file"))
                .arg(Arg::with_name("iterative").long("iterative")
                    .help("use the iterative solver for every vertex"))
                .arg(Arg::with_name("MAX_PASSES").long("max-passes").takes_value(true)
                    .help("pass limit for the iterative solver")),
        )
        .subcommand(
            SubCommand::with_name("pose-write")
                .about("Write a skeleton's pose overrides as a pose file")
                .arg(state())
                .arg(mode())
                .arg(Arg::with_name("OUTPUT").short("o").long("output").takes_value(true)
                    .help("pose file to write (default: stdout)")),
        )
        .subcommand(
            SubCommand::with_name("pose-apply")
                .about("Load a pose file onto a skeleton")
                .arg(state())
                .arg(Arg::with_name("POSE").short("p").long("pose").takes_value(true).required(true)
                    .help("pose file or skeleton dump"))
                .arg(mode())
                .arg(Arg::with_name("MIRROR").long("mirror").takes_value(true)
                    .possible_values(&["same", "flip"])
                    .help("copy left FK rotations to right joints the pose leaves out"))
                .arg(state_out()),
        )
        .subcommand(
            SubCommand::with_name("shape")
                .about("Scale a skeleton's body-shape customization")
                .arg(state())
                .arg(Arg::with_name("FACTOR").short("z").long("factor").takes_value(true).required(true)
                    .allow_hyphen_values(true)
                    .help("0 = generic body, 1 = as customized"))
                .arg(Arg::with_name("DELTA").long("delta").takes_value(true)
                    .help("pose file with an extra shape change to add"))
                .arg(Arg::with_name("DELTA_FACTOR").long("delta-factor").takes_value(true)
                    .requires("DELTA")
                    .allow_hyphen_values(true)
                    .help("weight of --delta (default 1)"))
                .arg(state_out()),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("Validate every joint's pose against the rig taxonomy")
                .arg(state()),
        )
        .subcommand(
            SubCommand::with_name("rig-write")
                .about("Write a skeleton's posed world matrices as a default rig file")
                .arg(state())
                .arg(Arg::with_name("OUTPUT").short("o").long("output").takes_value(true).required(true)
                    .help("rig file to write")),
        )
        .subcommand(SubCommand::with_name("version").about("Print version info"))
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("solve", Some(m)) => solve::main(m),
        ("pose-write", Some(m)) => pose::write_main(m),
        ("pose-apply", Some(m)) => pose::apply_main(m),
        ("shape", Some(m)) => pose::shape_main(m),
        ("check", Some(m)) => rig::check_main(m),
        ("rig-write", Some(m)) => rig::write_main(m),
        ("version", _) => {
            crate::version::print_version_info();
            Ok(())
        }
        (name, _) => bail!("unknown command {:?}", name),
    }
}

fn path_arg(matches: &ArgMatches, name: &str) -> Option<PathBuf> {
    matches.value_of_os(name).map(PathBuf::from)
}

fn required_path(matches: &ArgMatches, name: &str) -> Result<PathBuf> {
    match path_arg(matches, name) {
        Some(p) => Ok(p),
        None => bail!("missing {}", name),
    }
}

fn mode_arg(matches: &ArgMatches) -> Result<PoseMode> {
    matches.value_of("MODE").unwrap_or("pose").parse()
}

fn read_state(matches: &ArgMatches) -> Result<(PathBuf, State)> {
    let path = required_path(matches, "STATE")?;
    let state = State::read(&path)?;
    debug!("read skeleton state ({} joints) from {}", state.skeleton.len(), path.display());
    Ok((path, state))
}

/// Writes `state` to OUTPUT, or back to where it came from.
fn write_state(matches: &ArgMatches, from: &Path, state: &State) -> Result<()> {
    let out = path_arg(matches, "OUTPUT").unwrap_or_else(|| from.to_path_buf());
    state.write(&out)?;
    info!("wrote skeleton state to {}", out.display());
    Ok(())
}

#[test]
fn test_app_parses_commands() {
    let m = app()
        .get_matches_from_safe(vec!["rigsolve", "-vv", "shape", "-s", "a.json", "-z", "-0.5"])
        .unwrap();
    assert_eq!(m.occurrences_of("verbose"), 2);
    let (name, sub) = m.subcommand();
    assert_eq!(name, "shape");
    assert_eq!(sub.unwrap().value_of("FACTOR"), Some("-0.5"));

    let m = app()
        .get_matches_from_safe(vec!["rigsolve", "pose-apply", "-s", "a.json", "-p", "p.txt", "--mirror", "flip"])
        .unwrap();
    assert_eq!(m.subcommand_matches("pose-apply").unwrap().value_of("MIRROR"), Some("flip"));
    assert!(app().get_matches_from_safe(vec!["rigsolve", "shape", "-s", "a", "-z", "1", "--delta-factor", "2"]).is_err());

    let m = app().get_matches_from_safe(vec!["rigsolve", "pose-write", "-s", "a.json"]).unwrap();
    assert_eq!(mode_arg(m.subcommand_matches("pose-write").unwrap()).unwrap(), PoseMode::Pose);

    assert!(app().get_matches_from_safe(vec!["rigsolve", "pose-write", "-s", "a", "-m", "most"]).is_err());
    assert!(app().get_matches_from_safe(vec!["rigsolve", "solve", "-d", "dump.txt"]).is_err());
}
