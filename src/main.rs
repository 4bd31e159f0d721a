use std::fs;
use std::path::Path;
use std::process;

use clap::{Arg, ArgAction, Command};
use log::debug;

use scrap::{repl, runner, Config};

fn main() {
    let matches = Command::new("scrap")
        .about("Interpreter for the Scrap scripting language")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("args")
                .help("Arguments passed to the script as std::args")
                .value_name("ARGS")
                .index(2)
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .visible_alias("repl")
                .help("Start in interactive REPL mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("N")
                .help("Maximum depth of nested calls")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .help("Log more, repeat for more detail")
                .action(ArgAction::Count),
        )
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = Config::default();
    if let Some(depth) = matches.get_one::<usize>("max-depth") {
        config = config.with_max_call_depth(*depth);
    }
    if let Some(args) = matches.get_many::<String>("args") {
        config = config.with_script_args(args.cloned().collect());
    }

    match matches.get_one::<String>("file") {
        Some(file) if !matches.get_flag("interactive") => run_file(file, config),
        _ => repl::start(config),
    }
}

fn run_file(path: &str, config: Config) {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        process::exit(1);
    }

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            process::exit(1);
        }
    };

    let config = match path.file_stem() {
        Some(stem) => config.with_program_name(stem.to_string_lossy()),
        None => config,
    };
    let filename = path.to_string_lossy();
    debug!("running {}", filename);
    if runner::run(&source, Some(filename.as_ref()), config).is_err() {
        process::exit(1);
    }
}
