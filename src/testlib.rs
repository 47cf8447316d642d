extern crate nalgebra as na;
extern crate rand;

use std;
use std::fmt;

use rand::Rng;

use echelonizer::Echelonizer;
use matrix::{linspace, matrix_non_singular, max_abs, max_abs_vec, pascal_matrix, rand_matrix};
use options::SaddlePointMethod;
use stepper::{StepperError, Stepper};

#[derive(Clone)]
pub struct TrialResults {
    pub dims: (usize,usize),
    pub method: SaddlePointMethod,
    pub trials: usize,
    pub success: usize,
    pub inaccurate: usize,
    pub singular: usize,
    pub unsupported: usize,
    pub error: usize,
    pub max_error: f64,
    pub time_elapsed: f64,
}

impl Default for TrialResults {
    fn default() -> TrialResults {
        TrialResults {
            dims: (0,0),
            method: SaddlePointMethod::default(),
            trials: 0,
            success: 0,
            inaccurate: 0,
            singular: 0,
            unsupported: 0,
            error: 0,
            max_error: 0f64,
            time_elapsed: 0f64,
        }
    }
}

impl TrialResults {
    pub fn new( nx: usize, nw: usize, method: SaddlePointMethod ) -> TrialResults {
        TrialResults {
            dims: (nx, nw),
            method: method,
            ..Default::default()
        }
    }

    //{@
    /// Tally the outcome of one run: the relative error of the step, or the
    /// error that stopped it.
    //@}
    pub fn record( &mut self, outcome: Result<f64, StepperError>, tol: f64 ) { //{@
        self.trials += 1;
        match outcome {
            Ok(err) => {
                self.max_error = self.max_error.max(err);
                if err <= tol {
                    self.success += 1;
                } else {
                    self.inaccurate += 1;
                }
            },
            Err(StepperError::SingularMatrix) => self.singular += 1,
            Err(StepperError::UnsupportedDegenerateParameters { .. }) => self.unsupported += 1,
            Err(_) => self.error += 1,
        }
    } //@}
}

impl fmt::Display for TrialResults {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();

        s += &format!("{} ({}, {}): ", self.method, self.dims.0, self.dims.1);
        s += &format!("Trials: {}, Success: {} ({:e}), Inaccurate: {}, Singular: {}, \
                Unsupported: {}, Error: {}\n",
                self.trials, self.success, self.success as f64 / self.trials as f64,
                self.inaccurate, self.singular, self.unsupported, self.error);
        s += &format!("Max error: {:.3e}, mean_time_per = {:.5e}",
                self.max_error, self.time_elapsed / self.trials as f64);

        write!(f, "{}", s)
    }
}

impl std::ops::AddAssign for TrialResults {
    fn add_assign(&mut self, other: TrialResults) {
        *self = TrialResults {
            dims: self.dims,
            method: self.method,
            trials: self.trials + other.trials,
            success: self.success + other.success,
            inaccurate: self.inaccurate + other.inaccurate,
            singular: self.singular + other.singular,
            unsupported: self.unsupported + other.unsupported,
            error: self.error + other.error,
            max_error: self.max_error.max(other.max_error),
            time_elapsed: self.time_elapsed + other.time_elapsed,
        };
    }
}

// problems{@
//{@
/// A random instance of the Newton step problem: the constraint and Hessian
/// blocks, bounds, and the current iterate.
//@}
pub struct RandomProblem { //{@
    pub nx: usize,
    pub np: usize,
    pub ny: usize,
    pub nz: usize,
    pub ax: na::DMatrix<f64>,
    pub ap: na::DMatrix<f64>,
    pub jx: na::DMatrix<f64>,
    pub jp: na::DMatrix<f64>,
    pub hxx: na::DMatrix<f64>,
    pub hxp: na::DMatrix<f64>,
    pub vpx: na::DMatrix<f64>,
    pub vpp: na::DMatrix<f64>,
    pub xlower: na::DVector<f64>,
    pub xupper: na::DVector<f64>,
    pub plower: na::DVector<f64>,
    pub pupper: na::DVector<f64>,
    pub x: na::DVector<f64>,
    pub p: na::DVector<f64>,
    pub y: na::DVector<f64>,
    pub z: na::DVector<f64>,
    pub g: na::DVector<f64>,
    pub b: na::DVector<f64>,
    pub h: na::DVector<f64>,
    pub v: na::DVector<f64>,
} //@}

fn rand_vector<R: Rng>(rng: &mut R, n: usize) -> na::DVector<f64> {
    rand_matrix(rng, n, 1).column(0).into_owned()
}

//{@
/// Generate a random problem.  About one variable in four sits on a bound;
/// one in eight of those is fixed.  A diagonal Hxx is used when +diagonal+
/// is set so that the rangespace method applies.
//@}
pub fn random_problem<R: Rng>(rng: &mut R, nx: usize, np: usize, ny: usize, nz: usize, //{@
        diagonal: bool) -> RandomProblem {
    let x = rand_vector(rng, nx);
    let g = rand_vector(rng, nx);
    let mut xlower = na::DVector::from_element(nx, std::f64::NEG_INFINITY);
    let mut xupper = na::DVector::from_element(nx, std::f64::INFINITY);
    for i in 0 .. nx {
        let r: f64 = rng.gen();
        if r < 1.0 / 32.0 {
            xlower[i] = x[i];
            xupper[i] = x[i];
        } else if r < 1.0 / 8.0 {
            xlower[i] = x[i];
        } else if r < 1.0 / 4.0 {
            xupper[i] = x[i];
        } else {
            xlower[i] = x[i] - 1.0;
        }
    }

    let hxx = if diagonal {
        na::DMatrix::from_diagonal(&linspace(1.0, nx as f64, nx))
    } else {
        matrix_non_singular(nx)
    };

    RandomProblem {
        nx, np, ny, nz,
        ax: rand_matrix(rng, ny, nx),
        ap: rand_matrix(rng, ny, np),
        jx: rand_matrix(rng, nz, nx),
        jp: rand_matrix(rng, nz, np),
        hxx,
        hxp: pascal_matrix(nx, np),
        vpx: pascal_matrix(np, nx),
        vpp: matrix_non_singular(np),
        xlower,
        xupper,
        plower: na::DVector::from_element(np, std::f64::NEG_INFINITY),
        pupper: na::DVector::from_element(np, std::f64::INFINITY),
        x,
        p: rand_vector(rng, np),
        y: rand_vector(rng, ny),
        z: rand_vector(rng, nz),
        g,
        b: rand_vector(rng, ny),
        h: rand_vector(rng, nz),
        v: rand_vector(rng, np),
    }
} //@}
// end problems@}

// checks{@
//{@
/// Largest entry of R * A[:, Q] - [I S; 0 0].
//@}
pub fn canonical_error(ech: &Echelonizer) -> f64 { //{@
    let ra = ech.r() * ech.matrix().select_columns(ech.q());
    max_abs(&(ra - ech.c()))
} //@}

//{@
/// Relative error |M u - r| / (1 + |r|) of the last step taken by +stepper+.
//@}
pub fn step_error(stepper: &Stepper, u: &na::DVector<f64>) //{@
        -> Result<f64, StepperError> {
    let mat = stepper.matrix()?;
    let r = match stepper.residual_vector() {
        Some(rhs) => rhs.vector(),
        None => return Err(StepperError::PhaseOrder {
            operation: "measure the step error", phase: stepper.phase() }),
    };
    Ok(max_abs_vec(&(mat * u - &r)) / (1.0 + max_abs_vec(&r)))
} //@}
// end checks@}
