/*
 * This code is proprietary information and property of Stanford University.
 * Do not share without permission of the authors.  This code may only be
 * used for educational purposes.
 *
 * Authors: Jonathan Perlstein (jrperl@cs.stanford.edu)
 *          Thomas Dean (trdean@stanford.edu)
 *
 */

// imports{@
extern crate nalgebra as na;
extern crate rand;
#[macro_use]
extern crate log;
#[cfg(test)]
extern crate env_logger;

pub mod options;
pub mod matrix;
pub mod echelonizer;
pub mod stability;
pub mod saddlepoint;
pub mod stepper;
pub mod testlib;

pub use echelonizer::{Echelonizer, EchelonizerError};
pub use options::{EchelonizerOptions, KktOptions, Options, SaddlePointMethod, StabilityOptions};
pub use saddlepoint::{SaddlePointError, SaddlePointMatrix, SaddlePointVector};
pub use stability::{Stability, StabilityChecker, StabilityError, Status};
pub use stepper::{Phase, Stepper, StepperError};

use rand::Rng;

use matrix::Structure;
use stepper::{CanonicalizeArgs, InitializeArgs, NewtonStep, ResidualsArgs, SolveArgs};
use testlib::RandomProblem;
// end imports@}
// constants{@
/// Relative error |M u - r| / (1 + |r|) below which a step counts as accurate.
pub const STEP_TOL: f64 = 1e-9;
// end constants@}

// Principal functions{@
//{@
/// Run every phase of one Newton step on +problem+ and return the stepper
/// with the step it produced.
//@}
pub fn single_run(problem: &RandomProblem, options: Options) //{@
        -> Result<(Stepper, NewtonStep), StepperError> {
    let p = problem;
    let mut stepper = Stepper::new(p.nx, p.np, p.ny, p.nz, &p.ax, &p.ap)?;
    stepper.set_options(options);
    stepper.initialize(InitializeArgs {
        b: &p.b, xlower: &p.xlower, xupper: &p.xupper,
        plower: &p.plower, pupper: &p.pupper, x: &p.x,
    })?;
    stepper.canonicalize(CanonicalizeArgs {
        x: &p.x, p: &p.p, y: &p.y, z: &p.z, g: &p.g,
        hxx: &p.hxx, hxp: &p.hxp, vpx: &p.vpx, vpp: &p.vpp,
        jx: &p.jx, jp: &p.jp,
        xlower: &p.xlower, xupper: &p.xupper,
        plower: &p.plower, pupper: &p.pupper,
    })?;
    let res = stepper.residuals(ResidualsArgs {
        x: &p.x, p: &p.p, y: &p.y, z: &p.z,
        b: &p.b, h: &p.h, v: &p.v, g: &p.g, jx: &p.jx,
    })?;
    debug!("max residual errors: x {:.3e}, p {:.3e}, w {:.3e}",
            matrix::max_abs_vec(&res.errx), matrix::max_abs_vec(&res.errp),
            matrix::max_abs_vec(&res.errw));
    stepper.decompose()?;
    let step = stepper.solve(SolveArgs {
        x: &p.x, p: &p.p, y: &p.y, z: &p.z,
        g: &p.g, b: &p.b, h: &p.h, v: &p.v,
    })?;
    Ok((stepper, step))
} //@}

//{@
/// Generate a random problem with nx variables and nw = ny + nz multipliers,
/// take one Newton step with +method+ and return its relative error.
//@}
pub fn trial<R: Rng>(rng: &mut R, nx: usize, np: usize, ny: usize, nz: usize, //{@
        method: SaddlePointMethod) -> Result<f64, StepperError> {
    let diagonal = method == SaddlePointMethod::Rangespace;
    let problem = testlib::random_problem(rng, nx, np, ny, nz, diagonal);
    let options = Options { kkt: KktOptions { method }, ..Default::default() };
    let (stepper, step) = single_run(&problem, options)?;
    trace!("stability = {}", stepper.stability());
    testlib::step_error(&stepper, &step.vector())
} //@}

//{@
/// Canonicalize a random m x n matrix of the given structure, shuffle its
/// basis with random priority weights, and return the canonical form error.
//@}
pub fn echelonizer_trial<R: Rng>(rng: &mut R, structure: Structure, m: usize, n: usize) //{@
        -> Result<f64, EchelonizerError> {
    let a = matrix::assemble_matrix_a(rng, structure, m, n, &[]);
    let mut ech = Echelonizer::new(&a);
    let weights = matrix::rand_matrix(rng, n, 1).column(0).into_owned();
    ech.update_with_priority_weights(&weights)?;
    ech.clean_residual_roundoff_errors();
    debug!("{:?} {} x {}: rank {}, {} swaps", structure, m, n, ech.rank(), ech.num_updates());
    Ok(testlib::canonical_error(&ech))
} //@}
// end Principal functions@}
