use std::collections::HashSet;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use fdsolve::fd::constr::Store;
use fdsolve::fd::input;
use fdsolve::fd::solver::{Settings, Solution, Solver};


fn quiet() -> Settings {
    Settings {
        stats_freq: 0,
        ..Settings::default()
    }
}

fn build(text: &str, settings: &Settings) -> Solver {
    let mut store = Store::new(settings.memory, settings.confl_memory);
    let mut bytes = text.as_bytes();
    let problem = input::parse(&mut bytes, &mut store).expect("parse failure");
    Solver::new(store, problem, settings.clone()).expect("setup failure")
}

fn solve(text: &str, settings: Settings) -> Solver {
    let mut solver = build(text, &settings);
    assert!(
        solver.preprocess().expect("preprocess failure"),
        "inconsistent at the root"
    );
    solver.run().expect("search failure");
    solver
}

fn value(solution: &Solution, name: &str) -> i32 {
    solution
        .values
        .iter()
        .find(|(n, _)| n == name)
        .map(|&(_, v)| v)
        .unwrap_or_else(|| panic!("no value for {}", name))
}


#[test]
fn any_solution_of_a_small_boolean_problem() {
    let solver = solve(
        "var x in [0, 1];\n\
         var y in [0, 1];\n\
         var z in [0, 1];\n\
         x | y;\n\
         !x | z;\n\
         any;\n",
        quiet(),
    );

    let shared = solver.shared();
    assert_eq!(shared.solutions(), 1);

    let found = shared.found();
    let (x, y, z) = (
        value(&found[0], "x"),
        value(&found[0], "y"),
        value(&found[0], "z"),
    );
    assert!(x == 1 || y == 1);
    assert!(x == 0 || z == 1);
}

#[test]
fn unique_solution_is_enumerated_exactly_once() {
    let solver = solve(
        "var a in [1, 3];\n\
         var b in [1, 3];\n\
         a + b = 4;\n\
         a < b;\n\
         all;\n",
        quiet(),
    );

    let shared = solver.shared();
    assert_eq!(shared.solutions(), 1);
    let found = shared.found();
    assert_eq!(value(&found[0], "a"), 1);
    assert_eq!(value(&found[0], "b"), 3);
    assert!(solver.stats().calls > 0);
}

#[test]
fn minimization_converges_to_the_smallest_feasible_value() {
    let solver = solve(
        "var n in [1, 10];\n\
         5 < n;\n\
         min n;\n",
        quiet(),
    );

    let shared = solver.shared();
    assert_eq!(shared.best(), 6);
    let found = shared.found();
    let last = found.last().expect("no solution recorded");
    assert_eq!(value(last, "n"), 6);
    assert_eq!(last.best, 6);
}

#[test]
fn maximization_converges_to_the_largest_feasible_value() {
    let solver = solve(
        "var n in [1, 10];\n\
         n < 8;\n\
         max n;\n",
        quiet(),
    );

    let shared = solver.shared();
    assert_eq!(shared.best(), 7);
    let last = shared.found();
    assert_eq!(value(last.last().unwrap(), "n"), 7);
}

#[test]
fn contradiction_is_caught_by_initial_propagation() {
    let settings = quiet();
    let mut solver = build(
        "var x in [0, 1];\n\
         x = 1;\n\
         x = 0;\n",
        &settings,
    );
    assert_eq!(solver.preprocess().expect("preprocess failure"), false);
}

#[test]
fn infeasible_problem_learns_a_conflict_clause_and_terminates() {
    let solver = solve(
        "var x in [0, 1];\n\
         var y in [0, 1];\n\
         x = y;\n\
         x != y;\n\
         any;\n",
        quiet(),
    );

    let shared = solver.shared();
    assert_eq!(shared.solutions(), 0);
    assert!(solver.stats().confl >= 1, "expected a learnt clause");
    assert!(solver.stats().cuts >= 1);
}

#[test]
fn conflict_learning_can_be_disabled() {
    let solver = solve(
        "var x in [0, 1];\n\
         var y in [0, 1];\n\
         x = y;\n\
         x != y;\n\
         any;\n",
        Settings {
            create_conflicts: false,
            ..quiet()
        },
    );

    assert_eq!(solver.shared().solutions(), 0);
    assert_eq!(solver.stats().confl, 0);
}

#[test]
fn two_sat_enumeration_matches_the_model_set() {
    let solver = solve(
        "var x1 in [0, 1];\n\
         var x2 in [0, 1];\n\
         var x3 in [0, 1];\n\
         var x4 in [0, 1];\n\
         x1 | x2;\n\
         !x1 | x3;\n\
         !x2 | x4;\n\
         !x3 | !x4;\n\
         all;\n",
        quiet(),
    );

    let shared = solver.shared();
    let models: HashSet<(i32, i32, i32, i32)> = shared
        .found()
        .iter()
        .map(|s| {
            (
                value(s, "x1"),
                value(s, "x2"),
                value(s, "x3"),
                value(s, "x4"),
            )
        })
        .collect();

    let mut expected = HashSet::new();
    for bits in 0..16 {
        let (x1, x2, x3, x4) = (bits & 1, (bits >> 1) & 1, (bits >> 2) & 1, (bits >> 3) & 1);
        if (x1 | x2) == 1 && (1 - x1 | x3) == 1 && (1 - x2 | x4) == 1 && (1 - x3 | 1 - x4) == 1 {
            expected.insert((x1, x2, x3, x4));
        }
    }

    assert_eq!(models, expected);
    assert_eq!(shared.solutions() as usize, expected.len());
}

#[test]
fn eight_queens_has_ninety_two_solutions() {
    let mut text = String::new();
    for i in 1..=8 {
        text.push_str(&format!("var q{} in [1, 8];\n", i));
    }
    for i in 1..=8 {
        for j in (i + 1)..=8 {
            let d = j - i;
            text.push_str(&format!("q{} != q{};\n", i, j));
            text.push_str(&format!("q{} - q{} != {};\n", i, j, d));
            text.push_str(&format!("q{} - q{} != {};\n", j, i, d));
        }
    }
    text.push_str("all;\n");

    let solver = solve(&text, quiet());
    assert_eq!(solver.shared().solutions(), 92);
}

#[test]
fn nearly_unbounded_variable_still_propagates() {
    let solver = solve(
        "var x in [-2147483646, 2147483646];\n\
         2147483640 < x;\n\
         any;\n",
        quiet(),
    );

    let shared = solver.shared();
    assert_eq!(shared.solutions(), 1);
    let found = shared.found();
    assert!(value(&found[0], "x") > 2147483640);
}

#[test]
fn unbounded_variable_is_rejected() {
    let settings = quiet();
    let mut solver = build(
        "var x in [-2147483648, 5];\n\
         x < 3;\n",
        &settings,
    );
    match solver.preprocess() {
        Err(fdsolve::fd::Error::UnboundedVariable(name)) => assert_eq!(name, "x"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn duplicate_variables_are_rejected() {
    let mut store = Store::new(1 << 20, 1 << 20);
    let mut bytes = "var x in [0, 1];\nvar x in [0, 1];\n".as_bytes();
    assert!(input::parse(&mut bytes, &mut store).is_err());
}

#[test]
fn undefined_variables_are_rejected() {
    let mut store = Store::new(1 << 20, 1 << 20);
    let mut bytes = "var x in [0, 1];\nx = y;\n".as_bytes();
    assert!(input::parse(&mut bytes, &mut store).is_err());
}

#[test]
fn stray_characters_are_rejected_with_a_line_number() {
    let mut store = Store::new(1 << 20, 1 << 20);
    let mut bytes = "var x in [0, 1];\nx = $;\n".as_bytes();
    let err = input::parse(&mut bytes, &mut store).unwrap_err();
    assert!(err.to_string().contains("line 2"), "{}", err);
}

#[test]
fn split_workers_agree_on_a_single_any_solution() {
    let solver = solve(
        "var x in [0, 9];\n\
         var y in [0, 9];\n\
         x + y = 9;\n\
         any;\n",
        Settings {
            workers_max: 2,
            ..quiet()
        },
    );

    let shared = solver.shared();
    assert_eq!(shared.solutions(), 1);
    let found = shared.found();
    let (x, y) = (value(&found[0], "x"), value(&found[0], "y"));
    assert_eq!(x + y, 9);
}

#[test]
fn timeout_interrupts_an_intractable_search() {
    let start = std::time::Instant::now();
    let solver = solve(
        "var x in [1, 100000000];\n\
         var y in [1, 100000000];\n\
         x * y = 2147483629;\n\
         any;\n",
        Settings {
            time_max: 1,
            ..quiet()
        },
    );

    let shared = solver.shared();
    assert!(shared.timed_out());
    assert_eq!(shared.solutions(), 0);
    assert!(start.elapsed().as_secs() < 30);
}

#[test]
fn gzipped_problem_files_round_trip() {
    let text = "var a in [1, 3];\nvar b in [1, 3];\na + b = 4;\na < b;\nall;\n";

    let file = tempfile::Builder::new()
        .suffix(".gz")
        .tempfile()
        .expect("tempfile");
    {
        let mut encoder = GzEncoder::new(file.as_file(), Compression::default());
        encoder.write_all(text.as_bytes()).expect("write");
        encoder.finish().expect("finish");
    }

    let settings = quiet();
    let mut store = Store::new(settings.memory, settings.confl_memory);
    let problem = input::parse_file(file.path(), &mut store).expect("parse failure");
    let mut solver = Solver::new(store, problem, settings).expect("setup failure");
    assert!(solver.preprocess().expect("preprocess failure"));
    solver.run().expect("search failure");

    let shared = solver.shared();
    assert_eq!(shared.solutions(), 1);
    let found = shared.found();
    assert_eq!(value(&found[0], "a"), 1);
    assert_eq!(value(&found[0], "b"), 3);
}

#[test]
fn solve_file_reports_success_on_a_plain_file() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(b"var n in [1, 10];\n5 < n;\nmin n;\n")
        .expect("write");

    fdsolve::solve_file(Some(file.path()), quiet()).expect("solve_file failure");
}
