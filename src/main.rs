extern crate env_logger;
#[macro_use]
extern crate clap;
extern crate log;

use std::io::Write;
use std::{path, process};

use fdsolve::fd::solver::{Order, Settings};


fn main() {
    let ls012 = ["0", "1", "2"];
    let matches = clap::App::new("fdsolve")
        .version(&crate_version!()[..])
        .version_short("v")
        .about("Finite-domain constraint solver over bounded integer intervals")

        .arg(clap::Arg::with_name("verb").long("verb").takes_value(true).possible_values(&ls012).help("Verbosity level (0=silent, 1=some, 2=more)"))
        .arg(clap::Arg::with_name("binds").short("b").long("binds").takes_value(true).help("Maximum number of binds"))
        .arg(clap::Arg::with_name("conflicts").short("c").long("conflicts").takes_value(true).help("Create conflict clauses (true/false)"))
        .arg(clap::Arg::with_name("prefer-failing").short("f").long("prefer-failing").takes_value(true).help("Prefer failing variables when ordering (true/false)"))
        .arg(clap::Arg::with_name("jobs").short("j").long("jobs").takes_value(true).help("Number of jobs to run simultaneously"))
        .arg(clap::Arg::with_name("memory").short("m").long("memory").takes_value(true).help("Allocation stack size in bytes (k/M/G suffixes accepted)"))
        .arg(clap::Arg::with_name("confl-memory").short("M").long("confl-memory").takes_value(true).help("Conflict allocation stack size in bytes"))
        .arg(clap::Arg::with_name("order").short("o").long("order").takes_value(true).possible_values(&["none", "smallest-domain", "largest-domain", "smallest-value", "largest-value"]).help("How to order variables during solving"))
        .arg(clap::Arg::with_name("patches").short("p").long("patches").takes_value(true).help("Maximum number of patches"))
        .arg(clap::Arg::with_name("restart-freq").short("r").long("restart-freq").takes_value(true).help("Restart frequency when looking for any solution, 0 to disable"))
        .arg(clap::Arg::with_name("stats-freq").short("s").long("stats-freq").takes_value(true).help("Statistics printing frequency, 0 to disable"))
        .arg(clap::Arg::with_name("time").short("t").long("time").takes_value(true).help("Maximum solving time in seconds, 0 to disable"))
        .arg(clap::Arg::with_name("weighten").short("w").long("weighten").takes_value(true).help("Compute weights of variables for initial order (true/false)"))
        .arg(clap::Arg::with_name("input").required(false).help("Problem file, `-` or absent for stdin"))

        .get_matches();

    {
        let mut builder = env_logger::Builder::new();
        builder.format(|buf, record| writeln!(buf, "{}", record.args()));
        builder.filter(
            None,
            matches
                .value_of("verb")
                .map(|v| match v {
                    "1" => log::LevelFilter::Info,
                    "2" => log::LevelFilter::Trace,
                    _ => log::LevelFilter::Off,
                })
                .unwrap_or(log::LevelFilter::Info),
        );
        builder.init();
    }

    let settings = {
        let mut s = Settings::default();

        if let Some(x) = matches.value_of("binds") {
            s.bind_capacity = parse_size(x);
        }
        if let Some(x) = matches.value_of("patches") {
            s.patch_capacity = parse_size(x);
        }
        if let Some(x) = matches.value_of("memory") {
            s.memory = parse_size(x);
        }
        if let Some(x) = matches.value_of("confl-memory") {
            s.confl_memory = parse_size(x);
        }
        if let Some(x) = matches.value_of("conflicts") {
            s.create_conflicts = parse_bool(x);
        }
        if let Some(x) = matches.value_of("prefer-failing") {
            s.prefer_failing = parse_bool(x);
        }
        if let Some(x) = matches.value_of("weighten") {
            s.compute_weights = parse_bool(x);
        }
        if let Some(x) = matches.value_of("order") {
            s.order = x.parse::<Order>().unwrap_or_else(|e| die(&e));
        }
        if let Some(x) = matches.value_of("restart-freq") {
            s.restart_freq = parse_int(x);
        }
        if let Some(x) = matches.value_of("stats-freq") {
            s.stats_freq = parse_int(x);
        }
        if let Some(x) = matches.value_of("time") {
            s.time_max = parse_int(x) as u32;
        }
        if let Some(x) = matches.value_of("jobs") {
            let jobs = parse_int(x) as u32;
            if jobs == 0 {
                die("invalid integer argument: 0 jobs");
            }
            s.workers_max = jobs;
        }

        s
    };

    let in_path = matches
        .value_of("input")
        .filter(|&p| p != "-")
        .map(path::PathBuf::from);

    if let Err(e) = fdsolve::solve_file(in_path.as_ref().map(|p| p.as_path()), settings) {
        die(&e.to_string());
    }
}


fn die(msg: &str) -> ! {
    eprintln!("fdsolve: error: {}", msg);
    process::exit(1);
}

fn parse_bool(s: &str) -> bool {
    match s {
        "true" => true,
        "false" => false,
        _ => die(&format!("invalid boolean argument: {}", s)),
    }
}

fn parse_int(s: &str) -> u64 {
    match s.parse() {
        Ok(v) => v,
        Err(_) => die(&format!("invalid integer argument: {}", s)),
    }
}

// Parse a size, accepting an integer with an optional k/M/G suffix.
fn parse_size(s: &str) -> usize {
    const KILO: usize = 1024;

    let (digits, factor) = match s.char_indices().last() {
        Some((i, 'k')) | Some((i, 'K')) => (&s[..i], KILO),
        Some((i, 'm')) | Some((i, 'M')) => (&s[..i], KILO * KILO),
        Some((i, 'g')) | Some((i, 'G')) => (&s[..i], KILO * KILO * KILO),
        _ => (s, 1),
    };

    match digits.parse::<usize>() {
        Ok(v) => v * factor,
        Err(_) => die(&format!("invalid size argument: {}", s)),
    }
}
