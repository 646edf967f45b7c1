#[macro_use]
extern crate log;
use time;

use std::{io, path};

use crate::fd::constr::Store;
use crate::fd::input;
use crate::fd::solver::{Settings, Solver};

pub mod fd;
pub(crate) mod util;


/// Read a problem, preprocess it, and search. Solutions, statistics and the
/// final outcome lines go to stdout; diagnostics go to the logger.
pub fn solve_file(in_path: Option<&path::Path>, settings: Settings) -> io::Result<()> {
    info!("============================[ Problem Statistics ]=============================");
    info!("|                                                                             |");

    let initial_time = time::precise_time_s();

    let mut store = Store::new(settings.memory, settings.confl_memory);
    let problem = match in_path {
        Some(path) => input::parse_file(path, &mut store)?,
        None => {
            let stdin = io::stdin();
            input::parse(&mut stdin.lock(), &mut store)?
        }
    };
    let parse_end_time = time::precise_time_s();

    let mut solver = Solver::new(store, problem, settings).map_err(fatal)?;

    info!("|  Number of variables:  {:12}                                         |", solver.n_vars());
    info!("|  Number of clauses:    {:12}                                         |", solver.n_clauses());
    info!("|  Parse time:           {:12.2} s                                       |", parse_end_time - initial_time);
    info!("|                                                                             |");
    info!("===============================================================================");

    let consistent = solver.preprocess().map_err(fatal)?;
    if !consistent {
        info!("Solved by initial propagation");
        println!("NO SOLUTION FOUND");
        return Ok(());
    }

    solver.run().map_err(fatal)?;

    let cpu_time = time::precise_time_s() - initial_time;
    info!("CPU time              : {} s", cpu_time);
    if let Some(mem_used) = util::mem_used_peak() {
        info!("Memory used           : {} kB", mem_used);
    }

    Ok(())
}

fn fatal(e: fd::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}
