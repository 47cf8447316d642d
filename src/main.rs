extern crate kktsolver;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate rand;

use kktsolver::matrix;
use kktsolver::testlib::TrialResults;
use kktsolver::SaddlePointMethod;

fn main() {
    env_logger::init();

    let reps_per = 100;
    let methods = [SaddlePointMethod::Fullspace, SaddlePointMethod::Nullspace,
            SaddlePointMethod::Rangespace];
    let mut rng = rand::thread_rng();

    // Canonical forms of each structure first.
    for &structure in matrix::STRUCTURES.iter() {
        let mut worst = 0f64;
        let mut failed = 0;
        for &(m, n) in [(4, 8), (6, 12), (8, 24), (10, 10)].iter() {
            for _ in 0 .. reps_per {
                match kktsolver::echelonizer_trial(&mut rng, structure, m, n) {
                    Ok(err) => worst = worst.max(err),
                    Err(e) => {
                        failed += 1;
                        println!("critical error = {}", e);
                    },
                }
            }
        }
        info!("{:?}: worst canonical error {:.3e}, {} failures", structure, worst, failed);
    }

    // Sweep (nx, nw) with nw = ny + nz no larger than nx / 2.
    let mut dims = Vec::new();
    for nx in (8 .. 33).filter(|n| n % 8 == 0) {
        for nw in 1 .. nx / 2 + 1 {
            if nw % 2 != 0 { continue; }
            dims.push( (nx, nw) );
        }
    }

    for &method in methods.iter() {
        let mut total = TrialResults::new(0, 0, method);
        for &(nx, nw) in dims.iter() {
            let mut res = TrialResults::new(nx, nw, method);
            let (ny, nz) = (nw - nw / 2, nw / 2);
            let np = nx / 8;

            for _iter in 0 .. reps_per {
                let timer = std::time::Instant::now();
                let outcome = kktsolver::trial(&mut rng, nx, np, ny, nz, method);
                if let Err(ref e) = outcome {
                    debug!("{} ({}, {}): {}", method, nx, nw, e);
                }
                res.record(outcome, kktsolver::STEP_TOL);

                // Charge elapsed time for this run to its (nx, nw) dimension.
                let elapsed = timer.elapsed();
                res.time_elapsed += elapsed.as_secs() as f64 +
                                    elapsed.subsec_nanos() as f64 * 1e-9;
            }
            debug!("{}", res);

            let mut output =
                format!("{:10} nx = {:2}, nw = {:2}: success = {:4} / {:4}, ",
                        method, nx, nw, res.success, res.trials);
            output += &format!("(inaccurate = {:2}, singular = {:2}, err = {:2}), ",
                    res.inaccurate, res.singular, res.error);
            output += &format!("mean_time_per = {:.5e}",
                               res.time_elapsed / res.trials as f64);
            println!("{}", output);
            total += res;
        }
        info!("{}", total);
    }
}
