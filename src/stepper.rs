// imports{@
extern crate nalgebra as na;

use std::error;
use std::fmt;

use echelonizer::{Echelonizer, EchelonizerError};
use matrix::{hstack, vstack, vstack_vec};
use options::{Options, SaddlePointMethod};
use saddlepoint::{SaddlePointError, SaddlePointMatrix, SaddlePointVector};
use stability::{priority_weights, Stability, StabilityChecker, StabilityError};
// end imports@}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)] //{@
/// Phases of one Newton step calculation, in the order they must run.
//@}
pub enum Phase { //{@
    Created,
    Initialized,
    Canonicalized,
    ResidualsComputed,
    Decomposed,
    Solved,
} //@}

#[derive(Debug, Clone, PartialEq)] //{@
/// Errors raised by the Stepper.
//@}
pub enum StepperError { //{@
    DimensionMismatch { what: &'static str, expected: usize, found: usize },
    /// More Lagrange multipliers (ny + nz) than primal variables.
    TooManyMultipliers { nx: usize, nw: usize },
    /// Parameter variables combined with linearly dependent rows or basic
    /// unstable variables.
    UnsupportedDegenerateParameters { np: usize, nl: usize, nbu: usize },
    PhaseOrder { operation: &'static str, phase: Phase },
    SingularMatrix,
    Echelonizer(EchelonizerError),
    Stability(StabilityError),
    SaddlePoint(SaddlePointError),
} //@}
impl error::Error for StepperError {}
impl fmt::Display for StepperError { //{@
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &StepperError::DimensionMismatch { what, expected, found } =>
                write!(f, "Dimension mismatch in {}: expected {}, found {}",
                        what, expected, found),
            &StepperError::TooManyMultipliers { nx, nw } =>
                write!(f, "{} Lagrange multipliers exceed {} primal variables", nw, nx),
            &StepperError::UnsupportedDegenerateParameters { np, nl, nbu } =>
                write!(f, "{} parameter variables with {} dependent rows and {} basic \
                        unstable variables is not supported", np, nl, nbu),
            &StepperError::PhaseOrder { operation, phase } =>
                write!(f, "Cannot {} in phase {:?}", operation, phase),
            &StepperError::SingularMatrix => write!(f, "Saddle point matrix is singular"),
            &StepperError::Echelonizer(ref e) => write!(f, "Echelonizer: {}", e),
            &StepperError::Stability(ref e) => write!(f, "Stability: {}", e),
            &StepperError::SaddlePoint(ref e) => write!(f, "Saddle point: {}", e),
        }
    }
} //@}
impl From<EchelonizerError> for StepperError {
    fn from(e: EchelonizerError) -> StepperError {
        StepperError::Echelonizer(e)
    }
}
impl From<StabilityError> for StepperError {
    fn from(e: StabilityError) -> StepperError {
        StepperError::Stability(e)
    }
}
impl From<SaddlePointError> for StepperError {
    fn from(e: SaddlePointError) -> StepperError {
        StepperError::SaddlePoint(e)
    }
}

// arguments{@
/// Bounds and right-hand side recorded by Stepper::initialize.
pub struct InitializeArgs<'a> {
    pub b: &'a na::DVector<f64>,
    pub xlower: &'a na::DVector<f64>,
    pub xupper: &'a na::DVector<f64>,
    pub plower: &'a na::DVector<f64>,
    pub pupper: &'a na::DVector<f64>,
    pub x: &'a na::DVector<f64>,
}

/// Current iterate and the blocks of the saddle point matrix.
pub struct CanonicalizeArgs<'a> {
    pub x: &'a na::DVector<f64>,
    pub p: &'a na::DVector<f64>,
    pub y: &'a na::DVector<f64>,
    pub z: &'a na::DVector<f64>,
    pub g: &'a na::DVector<f64>,
    pub hxx: &'a na::DMatrix<f64>,
    pub hxp: &'a na::DMatrix<f64>,
    pub vpx: &'a na::DMatrix<f64>,
    pub vpp: &'a na::DMatrix<f64>,
    pub jx: &'a na::DMatrix<f64>,
    pub jp: &'a na::DMatrix<f64>,
    pub xlower: &'a na::DVector<f64>,
    pub xupper: &'a na::DVector<f64>,
    pub plower: &'a na::DVector<f64>,
    pub pupper: &'a na::DVector<f64>,
}

pub struct ResidualsArgs<'a> {
    pub x: &'a na::DVector<f64>,
    pub p: &'a na::DVector<f64>,
    pub y: &'a na::DVector<f64>,
    pub z: &'a na::DVector<f64>,
    pub b: &'a na::DVector<f64>,
    pub h: &'a na::DVector<f64>,
    pub v: &'a na::DVector<f64>,
    pub g: &'a na::DVector<f64>,
    pub jx: &'a na::DMatrix<f64>,
}

pub struct SolveArgs<'a> {
    pub x: &'a na::DVector<f64>,
    pub p: &'a na::DVector<f64>,
    pub y: &'a na::DVector<f64>,
    pub z: &'a na::DVector<f64>,
    pub g: &'a na::DVector<f64>,
    pub b: &'a na::DVector<f64>,
    pub h: &'a na::DVector<f64>,
    pub v: &'a na::DVector<f64>,
}

/// Derivatives of g, h, b and v with respect to nw parameters (one column each).
pub struct SensitivityArgs<'a> {
    pub dgdw: &'a na::DMatrix<f64>,
    pub dhdw: &'a na::DMatrix<f64>,
    pub dbdw: &'a na::DMatrix<f64>,
    pub dvdw: &'a na::DMatrix<f64>,
}
// end arguments@}

// results{@
#[derive(Clone, Debug)]
pub struct Residuals {
    /// rx = -(g + Ax^T y + Jx^T z), zero for unstable variables.
    pub resx: na::DVector<f64>,
    /// -v
    pub resp: na::DVector<f64>,
    /// [b - Ax x - Ap p; -h]
    pub resw: na::DVector<f64>,
    pub errx: na::DVector<f64>,
    pub errp: na::DVector<f64>,
    pub errw: na::DVector<f64>,
    /// s = g + Jx^T z + Ax^T y
    pub s: na::DVector<f64>,
}

#[derive(Clone, Debug)]
pub struct NewtonStep {
    pub dx: na::DVector<f64>,
    pub dp: na::DVector<f64>,
    pub dy: na::DVector<f64>,
    pub dz: na::DVector<f64>,
}
impl NewtonStep {
    /// The stacked step (dx, dp, dy, dz).
    pub fn vector(&self) -> na::DVector<f64> {
        vstack_vec(&vstack_vec(&self.dx, &self.dp), &vstack_vec(&self.dy, &self.dz))
    }
}

#[derive(Clone, Debug)]
pub struct Sensitivities {
    pub dxdw: na::DMatrix<f64>,
    pub dpdw: na::DMatrix<f64>,
    pub dydw: na::DMatrix<f64>,
    pub dzdw: na::DMatrix<f64>,
    /// dgdw + Ax^T dydw + Jx^T dzdw on unstable variables, zero elsewhere.
    pub dsdw: na::DMatrix<f64>,
}
// end results@}

//{@
/// Newton step calculator for the saddle point problem
///
/// ```text
/// [ Hxx  Hxp  Ax^T  Jx^T ] [dx]   [rx]
/// [ Vpx  Vpp   0     0   ] [dp] = [rp]
/// [ Ax   Ap    0     0   ] [dy]   [ry]
/// [ Jx   Jp    0     0   ] [dz]   [rz]
/// ```
///
/// where the rows of unstable variables are replaced by unit rows and their
/// columns are zeroed in the rows of Hxx, so dx = 0 on them.
///
/// The constraint rows W = [Ax; Jx] are brought to canonical form with an
/// Echelonizer that keeps unstable variables out of the basic set.  Every
/// method then works on the reduced system over the stable variables and the
/// canonical rows of the stable basic variables, which has full row rank.
/// The phases must run in the order initialize, canonicalize, residuals,
/// decompose, solve, sensitivities.
//@}
pub struct Stepper { //{@
    options: Options,
    nx: usize,
    np: usize,
    ny: usize,
    nz: usize,
    ax: na::DMatrix<f64>,
    ap: na::DMatrix<f64>,
    hxx: na::DMatrix<f64>,
    hxp: na::DMatrix<f64>,
    vpx: na::DMatrix<f64>,
    vpp: na::DMatrix<f64>,
    jx: na::DMatrix<f64>,
    w: na::DMatrix<f64>,
    wp: na::DMatrix<f64>,
    // Canonical form of the constant block Ax, kept across canonicalizations.
    echelonizer_ax: Echelonizer,
    // Canonical form of W = [Ax; Jx], extended from echelonizer_ax.
    echelonizer: Echelonizer,
    checker: StabilityChecker,
    stability: Stability,
    ncanonicalizations: usize,
    // Stable variables: basic ones in canonical row order, then non-basic.
    js: Vec<usize>,
    nbs: usize,
    // Canonical rows of the stable basic variables, and W, Wp reduced by them.
    rbs: na::DMatrix<f64>,
    wc: na::DMatrix<f64>,
    wpc: na::DMatrix<f64>,
    hss: na::DMatrix<f64>,
    hsp: na::DMatrix<f64>,
    vps: na::DMatrix<f64>,
    dinv: na::DVector<f64>,
    method: SaddlePointMethod,
    lu: Option<na::LU<f64, na::Dyn, na::Dyn>>,
    rhs: Option<SaddlePointVector>,
    phase: Phase,
} //@}

impl Stepper { //{@
    pub fn new(nx: usize, np: usize, ny: usize, nz: usize, //{@
            ax: &na::DMatrix<f64>, ap: &na::DMatrix<f64>) -> Result<Stepper, StepperError> {
        if ny + nz > nx {
            return Err(StepperError::TooManyMultipliers { nx, nw: ny + nz });
        }
        check_shape("Ax", (ny, nx), ax.shape())?;
        check_shape("Ap", (ny, np), ap.shape())?;

        let checker = StabilityChecker::new(nx, ny + nz, ax)?;
        let stability = checker.stability().clone();
        Ok(Stepper {
            options: Options::default(),
            nx, np, ny, nz,
            ax: ax.clone(),
            ap: ap.clone(),
            hxx: na::DMatrix::zeros(nx, nx),
            hxp: na::DMatrix::zeros(nx, np),
            vpx: na::DMatrix::zeros(np, nx),
            vpp: na::DMatrix::zeros(np, np),
            jx: na::DMatrix::zeros(nz, nx),
            w: vstack(ax, &na::DMatrix::zeros(nz, nx)),
            wp: vstack(ap, &na::DMatrix::zeros(nz, np)),
            echelonizer_ax: Echelonizer::new(ax),
            echelonizer: Echelonizer::default(),
            checker,
            stability,
            ncanonicalizations: 0,
            js: Vec::new(),
            nbs: 0,
            rbs: na::DMatrix::zeros(0, ny + nz),
            wc: na::DMatrix::zeros(0, 0),
            wpc: na::DMatrix::zeros(0, np),
            hss: na::DMatrix::zeros(0, 0),
            hsp: na::DMatrix::zeros(0, np),
            vps: na::DMatrix::zeros(np, 0),
            dinv: na::DVector::zeros(0),
            method: SaddlePointMethod::default(),
            lu: None,
            rhs: None,
            phase: Phase::Created,
        })
    } //@}

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
        self.echelonizer_ax.set_options(options.echelonizer);
        self.echelonizer.set_options(options.echelonizer);
        self.checker.set_options(options.stability);
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Classification of the variables from the last canonicalize.
    pub fn stability(&self) -> &Stability {
        &self.stability
    }

    /// Canonical form of W = [Ax; Jx] from the last canonicalize.
    pub fn echelonizer(&self) -> &Echelonizer {
        &self.echelonizer
    }

    /// Canonical form of Ax alone.  It is computed once and only updated by
    /// basis swaps, except for the periodic reset.
    pub fn linear_echelonizer(&self) -> &Echelonizer {
        &self.echelonizer_ax
    }

    /// The method used by the last decompose, after any fallback.
    pub fn method(&self) -> SaddlePointMethod {
        self.method
    }

    fn require(&self, operation: &'static str, ok: bool) -> Result<(), StepperError> {
        if !ok {
            return Err(StepperError::PhaseOrder { operation, phase: self.phase });
        }
        Ok(())
    }

    //{@
    /// Record the bounds and seed the stability of the variables from them.
    //@}
    pub fn initialize(&mut self, args: InitializeArgs) -> Result<(), StepperError> { //{@
        let (nx, np, ny) = (self.nx, self.np, self.ny);
        check_len("b", ny, args.b.len())?;
        check_len("xlower", nx, args.xlower.len())?;
        check_len("xupper", nx, args.xupper.len())?;
        check_len("plower", np, args.plower.len())?;
        check_len("pupper", np, args.pupper.len())?;
        check_len("x", nx, args.x.len())?;

        self.checker.initialize(&self.ax, args.b, args.xlower, args.xupper)?;
        self.stability = self.checker.stability().clone();
        self.lu = None;
        self.rhs = None;
        self.phase = Phase::Initialized;

        let onbound = (0 .. nx)
            .filter(|&i| args.x[i] == args.xlower[i] || args.x[i] == args.xupper[i])
            .count();
        debug!("Stepper: initialized with {} fixed and {} variables on a bound",
                self.stability.num_fixed(), onbound);
        Ok(())
    } //@}

    //{@
    /// Classify the variables and bring W = [Ax; Jx] to a canonical form whose
    /// basic variables are stable wherever possible.
    //@}
    pub fn canonicalize(&mut self, args: CanonicalizeArgs) -> Result<(), StepperError> { //{@
        self.require("canonicalize", self.phase >= Phase::Initialized)?;
        self.phase = Phase::Initialized;
        self.lu = None;
        self.rhs = None;

        let (nx, np, ny, nz) = (self.nx, self.np, self.ny, self.nz);
        check_len("x", nx, args.x.len())?;
        check_len("p", np, args.p.len())?;
        check_len("y", ny, args.y.len())?;
        check_len("z", nz, args.z.len())?;
        check_len("g", nx, args.g.len())?;
        check_len("xlower", nx, args.xlower.len())?;
        check_len("xupper", nx, args.xupper.len())?;
        check_len("plower", np, args.plower.len())?;
        check_len("pupper", np, args.pupper.len())?;
        check_shape("Hxx", (nx, nx), args.hxx.shape())?;
        check_shape("Hxp", (nx, np), args.hxp.shape())?;
        check_shape("Vpx", (np, nx), args.vpx.shape())?;
        check_shape("Vpp", (np, np), args.vpp.shape())?;
        check_shape("Jx", (nz, nx), args.jx.shape())?;
        check_shape("Jp", (nz, np), args.jp.shape())?;

        self.hxx = args.hxx.clone();
        self.hxp = args.hxp.clone();
        self.vpx = args.vpx.clone();
        self.vpp = args.vpp.clone();
        self.jx = args.jx.clone();
        self.w = vstack(&self.ax, args.jx);
        self.wp = vstack(&self.ap, args.jp);

        let yz = vstack_vec(args.y, args.z);
        self.checker.update(&self.w, args.x, &yz, args.g, args.xlower, args.xupper)?;
        self.stability = self.checker.stability().clone();

        let mut weights = priority_weights(args.x, args.xlower, args.xupper);
        for i in self.stability.indices_unstable() {
            weights[i] = f64::NEG_INFINITY;
        }

        self.ncanonicalizations += 1;
        let freq = self.options.refactorization_frequency;
        if freq > 0 && self.ncanonicalizations % freq == 0 {
            warn!("Stepper: resetting echelon form after {} canonicalizations",
                    self.ncanonicalizations);
            self.echelonizer_ax.reset();
        }
        self.echelonizer_ax.update_with_priority_weights(&weights)?;

        // Only the rows of Jx are eliminated; Ax keeps its canonical form.
        self.echelonizer = self.echelonizer_ax.extended(args.jx)?;
        if nz > 0 {
            self.echelonizer.update_with_priority_weights(&weights)?;
        }
        self.echelonizer.clean_residual_roundoff_errors();
        trace!("{}", self.echelonizer);

        self.partition()
    } //@}

    //{@
    /// Split the stable variables into basic and non-basic and reduce W, Wp
    /// to the canonical rows of the stable basic variables.
    //@}
    fn partition(&mut self) -> Result<(), StepperError> { //{@
        let ech = &self.echelonizer;
        let nb = ech.num_basic_variables();
        let q = ech.q();

        let rows: Vec<usize> = (0 .. nb).filter(|&i| self.stability.is_stable(q[i])).collect();
        let mut js: Vec<usize> = rows.iter().map(|&i| q[i]).collect();
        let nbs = js.len();
        js.extend(q[nb ..].iter().cloned().filter(|&j| self.stability.is_stable(j)));

        let nl = ech.num_dependent_rows();
        let nbu = nb - nbs;
        if self.np > 0 && nl + nbu > 0 {
            error!("Stepper: {} parameters with {} dependent rows and {} basic unstable variables",
                    self.np, nl, nbu);
            return Err(StepperError::UnsupportedDegenerateParameters {
                np: self.np, nl, nbu });
        }

        let rbs = ech.r().select_rows(&rows);
        self.wc = &rbs * self.w.select_columns(&js);
        self.wpc = &rbs * &self.wp;
        self.rbs = rbs;
        debug!("Stepper: {} basic stable, {} non-basic stable, {} basic unstable, {} dependent rows",
                nbs, js.len() - nbs, nbu, nl);
        self.js = js;
        self.nbs = nbs;
        self.phase = Phase::Canonicalized;
        Ok(())
    } //@}

    //{@
    /// Residuals of the optimality conditions and of the constraints, with
    /// their relative errors.
    //@}
    pub fn residuals(&mut self, args: ResidualsArgs) -> Result<Residuals, StepperError> { //{@
        self.require("compute residuals", self.phase == Phase::Canonicalized)?;
        let (nx, np, ny, nz) = (self.nx, self.np, self.ny, self.nz);
        check_len("x", nx, args.x.len())?;
        check_len("p", np, args.p.len())?;
        check_len("y", ny, args.y.len())?;
        check_len("z", nz, args.z.len())?;
        check_len("b", ny, args.b.len())?;
        check_len("h", nz, args.h.len())?;
        check_len("v", np, args.v.len())?;
        check_len("g", nx, args.g.len())?;
        check_shape("Jx", (nz, nx), args.jx.shape())?;

        let s = args.g + self.ax.tr_mul(args.y) + args.jx.tr_mul(args.z);
        let mut resx = -&s;
        for i in self.stability.indices_unstable() {
            resx[i] = 0.0;
        }
        let resp = -args.v;
        let ry = args.b - &self.ax * args.x - &self.ap * args.p;
        let rz = -args.h;

        let errx = na::DVector::from_fn(nx, |i, _| resx[i].abs() / (1.0 + args.g[i].abs()));
        let errp = resp.abs();
        let erry = na::DVector::from_fn(ny, |i, _| ry[i].abs() / (1.0 + args.b[i].abs()));
        let errw = vstack_vec(&erry, &rz.abs());

        self.phase = Phase::ResidualsComputed;
        Ok(Residuals {
            resw: vstack_vec(&ry, &rz),
            resx, resp, errx, errp, errw, s,
        })
    } //@}

    //{@
    /// Factorize the reduced saddle point matrix with the configured method.
    /// Rangespace needs a diagonal Hxx with non-zero entries on the stable
    /// variables and falls back to Fullspace otherwise.
    //@}
    pub fn decompose(&mut self) -> Result<(), StepperError> { //{@
        self.require("decompose", self.phase == Phase::ResidualsComputed)?;

        self.hss = self.hxx.select_rows(&self.js).select_columns(&self.js);
        self.hsp = self.hxp.select_rows(&self.js);
        self.vps = self.vpx.select_columns(&self.js);

        let mut method = self.options.kkt.method;
        if method == SaddlePointMethod::Rangespace && !is_invertible_diagonal(&self.hss) {
            warn!("Stepper: Hxx is not an invertible diagonal on the stable variables, \
                    using fullspace instead of rangespace");
            method = SaddlePointMethod::Fullspace;
        }

        let k = match method {
            SaddlePointMethod::Fullspace => self.matrix_fullspace(),
            SaddlePointMethod::Nullspace => self.matrix_nullspace(),
            SaddlePointMethod::Rangespace => {
                self.dinv = self.hss.diagonal().map(|d| 1.0 / d);
                self.matrix_rangespace()
            },
        };
        debug!("Stepper: {} decomposition of a {} x {} matrix", method, k.nrows(), k.ncols());
        trace!("K = {:.4}", k);

        self.lu = if k.nrows() == 0 {
            None
        } else {
            let lu = na::LU::new(k);
            if !lu.is_invertible() {
                error!("Stepper: singular saddle point matrix");
                return Err(StepperError::SingularMatrix);
            }
            Some(lu)
        };
        self.method = method;
        self.phase = Phase::Decomposed;
        Ok(())
    } //@}

    fn matrix_fullspace(&self) -> na::DMatrix<f64> { //{@
        let (ns, np, nbs) = (self.js.len(), self.np, self.nbs);
        block_matrix(&[ns, np, nbs], &[ns, np, nbs], &[
            (0, 0, &self.hss), (0, 1, &self.hsp), (0, 2, &self.wc.transpose()),
            (1, 0, &self.vps), (1, 1, &self.vpp),
            (2, 0, &self.wc), (2, 1, &self.wpc),
        ])
    } //@}

    fn matrix_nullspace(&self) -> na::DMatrix<f64> { //{@
        let (ns, np, nbs) = (self.js.len(), self.np, self.nbs);
        let nns = ns - nbs;
        let hbb = self.hss.view((0, 0), (nbs, nbs)).into_owned();
        let hbn = self.hss.view((0, nbs), (nbs, nns)).into_owned();
        let hnb = self.hss.view((nbs, 0), (nns, nbs)).into_owned();
        let hnn = self.hss.view((nbs, nbs), (nns, nns)).into_owned();
        let hbp = self.hsp.rows(0, nbs).into_owned();
        let hnp = self.hsp.rows(nbs, nns).into_owned();
        let vpb = self.vps.columns(0, nbs).into_owned();
        let vpn = self.vps.columns(nbs, nns).into_owned();
        let sbn = self.wc.columns(nbs, nns).into_owned();
        let sp = &self.wpc;

        let knn = &hnn - &hnb * &sbn - sbn.tr_mul(&hbn) + sbn.tr_mul(&(&hbb * &sbn));
        let knp = &hnp - &hnb * sp - sbn.tr_mul(&hbp) + sbn.tr_mul(&(&hbb * sp));
        let kpn = &vpn - &vpb * &sbn;
        let kpp = &self.vpp - &vpb * sp;
        block_matrix(&[nns, np], &[nns, np], &[
            (0, 0, &knn), (0, 1, &knp),
            (1, 0, &kpn), (1, 1, &kpp),
        ])
    } //@}

    fn matrix_rangespace(&self) -> na::DMatrix<f64> { //{@
        let (np, nbs) = (self.np, self.nbs);
        let dhsp = scale_rows(&self.hsp, &self.dinv);
        let dwct = scale_rows(&self.wc.transpose(), &self.dinv);

        let kpp = &self.vpp - &self.vps * &dhsp;
        let kpw = -(&self.vps * &dwct);
        let kwp = &self.wpc - &self.wc * &dhsp;
        let kww = -(&self.wc * &dwct);
        block_matrix(&[np, nbs], &[np, nbs], &[
            (0, 0, &kpp), (0, 1, &kpw),
            (1, 0, &kwp), (1, 1, &kww),
        ])
    } //@}

    fn lu_solve(&self, rhs: &na::DMatrix<f64>) -> Result<na::DMatrix<f64>, StepperError> { //{@
        match self.lu {
            None => Ok(na::DMatrix::zeros(0, rhs.ncols())),
            Some(ref lu) => lu.solve(rhs).ok_or(StepperError::SingularMatrix),
        }
    } //@}

    //{@
    /// Solve the saddle point system for every column of [rx; rp; rw] with
    /// the decomposed matrix.  Rows of rx for unstable variables must already
    /// be zero.  Returns (dx, dp, dw).
    //@}
    fn solve_reduced(&self, rx: &na::DMatrix<f64>, rp: &na::DMatrix<f64>, //{@
            rw: &na::DMatrix<f64>)
            -> Result<(na::DMatrix<f64>, na::DMatrix<f64>, na::DMatrix<f64>), StepperError> {
        let (ns, np, nbs) = (self.js.len(), self.np, self.nbs);
        let nns = ns - nbs;
        let rxs = rx.select_rows(&self.js);
        let rwc = &self.rbs * rw;

        let (dxs, dp, dl) = match self.method {
            SaddlePointMethod::Fullspace => {
                let sol = self.lu_solve(&vstack(&vstack(&rxs, rp), &rwc))?;
                (sol.rows(0, ns).into_owned(),
                 sol.rows(ns, np).into_owned(),
                 sol.rows(ns + np, nbs).into_owned())
            },
            SaddlePointMethod::Nullspace => {
                let hbb = self.hss.view((0, 0), (nbs, nbs));
                let hbn = self.hss.view((0, nbs), (nbs, nns));
                let hnb = self.hss.view((nbs, 0), (nns, nbs));
                let hbp = self.hsp.rows(0, nbs);
                let vpb = self.vps.columns(0, nbs);
                let sbn = self.wc.columns(nbs, nns).into_owned();
                let rxb = rxs.rows(0, nbs).into_owned();
                let rxn = rxs.rows(nbs, nns).into_owned();
                let a = &rwc;

                let rhsn = &rxn - &hnb * a - sbn.tr_mul(&(&rxb - &hbb * a));
                let rhsp = rp - &vpb * a;
                let sol = self.lu_solve(&vstack(&rhsn, &rhsp))?;
                let dxn = sol.rows(0, nns).into_owned();
                let dp = sol.rows(nns, np).into_owned();

                let dxb = a - &sbn * &dxn - &self.wpc * &dp;
                let dl = &rxb - &hbb * &dxb - &hbn * &dxn - &hbp * &dp;
                (vstack(&dxb, &dxn), dp, dl)
            },
            SaddlePointMethod::Rangespace => {
                let drx = scale_rows(&rxs, &self.dinv);
                let rhsp = rp - &self.vps * &drx;
                let rhsw = &rwc - &self.wc * &drx;
                let sol = self.lu_solve(&vstack(&rhsp, &rhsw))?;
                let dp = sol.rows(0, np).into_owned();
                let dl = sol.rows(np, nbs).into_owned();
                let dxs = scale_rows(&(&rxs - &self.hsp * &dp - self.wc.tr_mul(&dl)), &self.dinv);
                (dxs, dp, dl)
            },
        };

        let mut dx = na::DMatrix::zeros(self.nx, rx.ncols());
        for (k, &j) in self.js.iter().enumerate() {
            dx.row_mut(j).copy_from(&dxs.row(k));
        }
        let dw = self.rbs.tr_mul(&dl);
        Ok((dx, dp, dw))
    } //@}

    //{@
    /// Compute the Newton step (dx, dp, dy, dz) with dx = 0 on the unstable
    /// variables.
    //@}
    pub fn solve(&mut self, args: SolveArgs) -> Result<NewtonStep, StepperError> { //{@
        self.require("solve", self.phase == Phase::Decomposed)?;
        let (nx, np, ny, nz) = (self.nx, self.np, self.ny, self.nz);
        check_len("x", nx, args.x.len())?;
        check_len("p", np, args.p.len())?;
        check_len("y", ny, args.y.len())?;
        check_len("z", nz, args.z.len())?;
        check_len("g", nx, args.g.len())?;
        check_len("b", ny, args.b.len())?;
        check_len("h", nz, args.h.len())?;
        check_len("v", np, args.v.len())?;

        let mut rx = -(args.g + self.ax.tr_mul(args.y) + self.jx.tr_mul(args.z));
        for i in self.stability.indices_unstable() {
            rx[i] = 0.0;
        }
        let rp = -args.v;
        let ry = -(&self.ax * args.x + &self.ap * args.p - args.b);
        let rz = -args.h;
        let rw = vstack_vec(&ry, &rz);

        let (dx, dp, dw) = self.solve_reduced(&column(&rx), &column(&rp), &column(&rw))?;
        self.rhs = Some(SaddlePointVector::new(&vstack_vec(&rx, &rp), &rw));
        self.phase = Phase::Solved;

        Ok(NewtonStep {
            dx: dx.column(0).into_owned(),
            dp: dp.column(0).into_owned(),
            dy: dw.view((0, 0), (ny, 1)).column(0).into_owned(),
            dz: dw.view((ny, 0), (nz, 1)).column(0).into_owned(),
        })
    } //@}

    //{@
    /// Derivatives of the solution with respect to nw parameters, reusing the
    /// factorization of the last decompose.
    //@}
    pub fn sensitivities(&mut self, args: SensitivityArgs) //{@
            -> Result<Sensitivities, StepperError> {
        self.require("compute sensitivities", self.phase >= Phase::Solved)?;
        let (nx, np, ny, nz) = (self.nx, self.np, self.ny, self.nz);
        let nw = args.dgdw.ncols();
        check_shape("dgdw", (nx, nw), args.dgdw.shape())?;
        check_shape("dhdw", (nz, nw), args.dhdw.shape())?;
        check_shape("dbdw", (ny, nw), args.dbdw.shape())?;
        check_shape("dvdw", (np, nw), args.dvdw.shape())?;

        let unstable = self.stability.indices_unstable();
        let mut rx = -args.dgdw;
        for &i in unstable.iter() {
            rx.row_mut(i).fill(0.0);
        }
        let rp = -args.dvdw;
        let rw = vstack(args.dbdw, &(-args.dhdw));

        let (dxdw, dpdw, dwdw) = self.solve_reduced(&rx, &rp, &rw)?;
        let dydw = dwdw.rows(0, ny).into_owned();
        let dzdw = dwdw.rows(ny, nz).into_owned();

        let mut dsdw = na::DMatrix::zeros(nx, nw);
        let full = args.dgdw + self.ax.tr_mul(&dydw) + self.jx.tr_mul(&dzdw);
        for &i in unstable.iter() {
            dsdw.row_mut(i).copy_from(&full.row(i));
        }
        debug!("Stepper: sensitivities for {} parameters", nw);
        Ok(Sensitivities { dxdw, dpdw, dydw, dzdw, dsdw })
    } //@}

    //{@
    /// The saddle point matrix of the last canonicalize, with unit rows for
    /// the unstable variables.
    //@}
    pub fn matrix(&self) -> Result<na::DMatrix<f64>, StepperError> { //{@
        self.require("assemble the matrix", self.phase >= Phase::Canonicalized)?;
        let (nx, np) = (self.nx, self.np);
        let m = self.ny + self.nz;
        let h = vstack(&hstack(&self.hxx, &self.hxp), &hstack(&self.vpx, &self.vpp));
        let a = hstack(&self.w, &self.wp);
        let spm = SaddlePointMatrix::with_fixed_indices(&h, &a, &na::DMatrix::zeros(m, m),
                &self.stability.indices_unstable())?;
        let mut mat = spm.matrix();
        // The p rows keep Vpx in full and carry no multiplier terms.
        mat.view_mut((nx, 0), (np, nx)).copy_from(&self.vpx);
        mat.view_mut((nx, nx + np), (np, m)).fill(0.0);
        Ok(mat)
    } //@}

    /// The right-hand side [rx; rp | ry; rz] assembled by the last solve.
    pub fn residual_vector(&self) -> Option<&SaddlePointVector> {
        self.rhs.as_ref()
    }
} //@}

// helpers{@
fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), StepperError> {
    if expected != found {
        return Err(StepperError::DimensionMismatch { what, expected, found });
    }
    Ok(())
}

fn check_shape(what: &'static str, expected: (usize, usize), found: (usize, usize)) //{@
        -> Result<(), StepperError> {
    check_len(what, expected.0, found.0)?;
    check_len(what, expected.1, found.1)
} //@}

fn column(v: &na::DVector<f64>) -> na::DMatrix<f64> {
    na::DMatrix::from_column_slice(v.len(), 1, v.as_slice())
}

//{@
/// Assemble a block matrix from row and column block sizes.  Blocks that are
/// not listed are zero.
//@}
fn block_matrix(rows: &[usize], cols: &[usize], //{@
        blocks: &[(usize, usize, &na::DMatrix<f64>)]) -> na::DMatrix<f64> {
    let offset = |sizes: &[usize], k: usize| sizes[.. k].iter().sum::<usize>();
    let nrows = rows.iter().sum();
    let ncols = cols.iter().sum();
    let mut mat = na::DMatrix::zeros(nrows, ncols);
    for &(i, j, b) in blocks.iter() {
        mat.view_mut((offset(rows, i), offset(cols, j)), b.shape()).copy_from(b);
    }
    mat
} //@}

fn scale_rows(m: &na::DMatrix<f64>, d: &na::DVector<f64>) -> na::DMatrix<f64> {
    let mut out = m.clone();
    for i in 0 .. out.nrows() {
        out.row_mut(i).scale_mut(d[i]);
    }
    out
}

fn is_invertible_diagonal(h: &na::DMatrix<f64>) -> bool {
    for j in 0 .. h.ncols() {
        for i in 0 .. h.nrows() {
            if (i == j) != (h[(i,j)] != 0.0) {
                return false;
            }
        }
    }
    true
}
// end helpers@}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix::{assemble_matrix_ax, linspace, matrix_non_singular, max_abs, pascal_matrix};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const NX: usize = 12;
    const METHODS: [SaddlePointMethod; 3] = [SaddlePointMethod::Fullspace,
            SaddlePointMethod::Nullspace, SaddlePointMethod::Rangespace];

    struct Problem {
        nx: usize,
        np: usize,
        ny: usize,
        nz: usize,
        ax: na::DMatrix<f64>,
        ap: na::DMatrix<f64>,
        jx: na::DMatrix<f64>,
        jp: na::DMatrix<f64>,
        hxx: na::DMatrix<f64>,
        hxp: na::DMatrix<f64>,
        vpx: na::DMatrix<f64>,
        vpp: na::DMatrix<f64>,
        xlower: na::DVector<f64>,
        xupper: na::DVector<f64>,
        plower: na::DVector<f64>,
        pupper: na::DVector<f64>,
        x: na::DVector<f64>,
        p: na::DVector<f64>,
        y: na::DVector<f64>,
        z: na::DVector<f64>,
        g: na::DVector<f64>,
        b: na::DVector<f64>,
        h: na::DVector<f64>,
        v: na::DVector<f64>,
        mat: na::DMatrix<f64>,
        r: na::DVector<f64>,
        iunstable: Vec<usize>,
    }

    fn sorted_union(a: &[usize], b: &[usize]) -> Vec<usize> {
        let mut v: Vec<usize> = a.iter().chain(b.iter()).cloned().collect();
        v.sort();
        v.dedup();
        v
    }

    fn head_tail(seq: &[usize]) -> Vec<usize> {
        let mut v = Vec::new();
        if let Some(&h) = seq.first() { v.push(h); }
        if let Some(&t) = seq.last() { v.push(t); }
        v
    }

    fn reshape(v: &na::DVector<f64>, nrows: usize, ncols: usize) -> na::DMatrix<f64> {
        na::DMatrix::from_row_slice(nrows, ncols, v.as_slice())
    }

    //{@
    /// Build a problem whose Newton step is known: u = (dx, dp, dy, dz) is a
    /// ramp with dx = 0 on the unstable variables, r = M u, and g, v, b, h
    /// are derived from r.
    //@}
    fn assemble(rng: &mut StdRng, nx: usize, np: usize, ny: usize, nz: usize, //{@
            nbu: usize, nl: usize, ifixed: &[usize], ilower: &[usize], iupper: &[usize],
            diagonal: bool) -> Problem {
        let ilower = sorted_union(ilower, ifixed);
        let iupper = sorted_union(iupper, ifixed);
        let t = nx + np + ny + nz;
        let m = ny + nz;

        let ax = assemble_matrix_ax(rng, ny, nx, nbu, nl, ifixed);
        let ap = reshape(&linspace(1.0, (ny * np) as f64, ny * np), ny, np);
        let jfull = reshape(&linspace(0.0, 1.0, nz * (nx + np)), nz, nx + np);
        let jx = jfull.columns(0, nx).into_owned();
        let jp = jfull.columns(nx, np).into_owned();

        let mut xlower = na::DVector::from_element(nx, f64::NEG_INFINITY);
        let mut xupper = na::DVector::from_element(nx, f64::INFINITY);
        for (k, &i) in ilower.iter().enumerate() {
            xlower[i] = -100.0 * (k + 1) as f64;
        }
        for (k, &i) in iupper.iter().enumerate() {
            xupper[i] = 100.0 * (k + 1) as f64;
        }
        for (k, &i) in ifixed.iter().enumerate() {
            xlower[i] = 10.0 * (k + 1) as f64;
            xupper[i] = xlower[i];
        }
        let plower = na::DVector::from_element(np, f64::NEG_INFINITY);
        let pupper = na::DVector::from_element(np, f64::INFINITY);

        let mut x = linspace(1.0, nx as f64, nx);
        let p = linspace(1.0, np as f64, np);
        let y = linspace(1.0, ny as f64, ny);
        let z = linspace(1.0, nz as f64, nz);

        let hxx = if diagonal {
            na::DMatrix::from_diagonal(&linspace(1.0, nx as f64, nx))
        } else {
            matrix_non_singular(nx)
        };
        let hxp = pascal_matrix(nx, np);
        let vpx = pascal_matrix(np, nx);
        let vpp = matrix_non_singular(np);

        let iunstable_lower = sorted_union(&head_tail(&ilower), ifixed);
        let iunstable_upper = sorted_union(&head_tail(&iupper), ifixed);
        let iunstable = sorted_union(&iunstable_lower, &iunstable_upper);

        let mut u = linspace(1.0, t as f64, t);
        for &i in iunstable.iter() {
            u[i] = 0.0;
        }
        for &i in iunstable_lower.iter() {
            x[i] = xlower[i];
        }
        for &i in iunstable_upper.iter() {
            x[i] = xupper[i];
        }

        let mut mat = na::DMatrix::zeros(t, t);
        let n = nx + np;
        mat.view_mut((0, 0), (nx, nx)).copy_from(&hxx);
        mat.view_mut((0, nx), (nx, np)).copy_from(&hxp);
        mat.view_mut((0, n), (nx, ny)).copy_from(&ax.transpose());
        mat.view_mut((0, n + ny), (nx, nz)).copy_from(&jx.transpose());
        mat.view_mut((nx, 0), (np, nx)).copy_from(&vpx);
        mat.view_mut((nx, nx), (np, np)).copy_from(&vpp);
        mat.view_mut((n, 0), (ny, nx)).copy_from(&ax);
        mat.view_mut((n, nx), (ny, np)).copy_from(&ap);
        mat.view_mut((n + ny, 0), (nz, nx)).copy_from(&jx);
        mat.view_mut((n + ny, nx), (nz, np)).copy_from(&jp);
        for &j in iunstable.iter() {
            mat.row_mut(j).fill(0.0);
            mat.view_mut((0, j), (nx, 1)).fill(0.0);
            mat[(j,j)] = 1.0;
        }
        let r = &mat * &u;

        let rx = r.rows(0, nx).into_owned();
        let rp = r.rows(nx, np).into_owned();
        let ry = r.rows(n, ny).into_owned();
        let rz = r.rows(n + ny, nz).into_owned();

        let mut g = -(&rx + ax.tr_mul(&y) + jx.tr_mul(&z));
        for &i in iunstable_lower.iter() {
            g[i] = 100.0;
        }
        for &i in iunstable_upper.iter() {
            g[i] = -100.0;
        }
        let v = -rp;
        let h = -rz;
        let b = &ry + &ax * &x + &ap * &p;

        Problem {
            nx, np, ny, nz, ax, ap, jx, jp, hxx, hxp, vpx, vpp,
            xlower, xupper, plower, pupper, x, p, y, z, g, b, h, v,
            mat, r, iunstable,
        }
    } //@}

    fn run_to_decomposed(prob: &Problem, method: SaddlePointMethod) //{@
            -> Result<(Stepper, Residuals), StepperError> {
        let mut stepper = Stepper::new(prob.nx, prob.np, prob.ny, prob.nz, &prob.ax, &prob.ap)?;
        stepper.set_options(Options {
            kkt: ::options::KktOptions { method },
            ..Default::default()
        });
        stepper.initialize(InitializeArgs {
            b: &prob.b, xlower: &prob.xlower, xupper: &prob.xupper,
            plower: &prob.plower, pupper: &prob.pupper, x: &prob.x,
        })?;
        stepper.canonicalize(CanonicalizeArgs {
            x: &prob.x, p: &prob.p, y: &prob.y, z: &prob.z, g: &prob.g,
            hxx: &prob.hxx, hxp: &prob.hxp, vpx: &prob.vpx, vpp: &prob.vpp,
            jx: &prob.jx, jp: &prob.jp,
            xlower: &prob.xlower, xupper: &prob.xupper,
            plower: &prob.plower, pupper: &prob.pupper,
        })?;
        let res = stepper.residuals(ResidualsArgs {
            x: &prob.x, p: &prob.p, y: &prob.y, z: &prob.z,
            b: &prob.b, h: &prob.h, v: &prob.v, g: &prob.g, jx: &prob.jx,
        })?;
        stepper.decompose()?;
        Ok((stepper, res))
    } //@}

    fn solve_args(prob: &Problem) -> SolveArgs {
        SolveArgs {
            x: &prob.x, p: &prob.p, y: &prob.y, z: &prob.z,
            g: &prob.g, b: &prob.b, h: &prob.h, v: &prob.v,
        }
    }

    fn close(a: &na::DMatrix<f64>, b: &na::DMatrix<f64>) -> bool {
        max_abs(&(a - b)) <= 1e-9 * (1.0 + max_abs(b))
    }

    fn check_problem(prob: &Problem, method: SaddlePointMethod, label: &str) { //{@
        let (mut stepper, res) = run_to_decomposed(prob, method).unwrap();
        let nx = prob.nx;
        let (np, ny, nz) = (prob.np, prob.ny, prob.nz);
        let t = nx + np + ny + nz;

        assert_eq!(stepper.stability().indices_unstable(), prob.iunstable, "{}", label);
        assert_eq!(stepper.matrix().unwrap(), prob.mat, "{}", label);

        let rx = prob.r.rows(0, nx).into_owned();
        assert!(close(&column(&res.resx), &column(&rx)), "{}: resx", label);
        assert!(close(&column(&res.resp), &column(&prob.r.rows(nx, np).into_owned())),
                "{}: resp", label);
        assert!(close(&column(&res.resw), &column(&prob.r.rows(nx + np, ny + nz).into_owned())),
                "{}: resw", label);
        let s = &prob.g + prob.ax.tr_mul(&prob.y) + prob.jx.tr_mul(&prob.z);
        assert!(close(&column(&res.s), &column(&s)), "{}: s", label);
        assert!(res.errx.iter().all(|&e| e >= 0.0));

        let step = stepper.solve(solve_args(prob)).unwrap();
        for &i in prob.iunstable.iter() {
            assert_eq!(step.dx[i], 0.0, "{}: dx[{}]", label, i);
        }
        let u = step.vector();
        assert_eq!(u.len(), t);
        let mu = &prob.mat * &u;
        assert!(close(&column(&mu), &column(&prob.r)), "{}: M u != r ({:e})",
                label, max_abs(&column(&(&mu - &prob.r))));
        let rhs = stepper.residual_vector().unwrap().vector();
        assert!(close(&column(&rhs), &column(&prob.r)), "{}: residual vector", label);

        // Sensitivities with respect to nw parameters.
        let nw = 5;
        let mut dudw = reshape(&linspace(1.0, (t * nw) as f64, t * nw), t, nw);
        for &i in prob.iunstable.iter() {
            dudw.row_mut(i).fill(0.0);
        }
        let drdw = &prob.mat * &dudw;
        let mut dgdw = -drdw.rows(0, nx).into_owned();
        let dvdw = -drdw.rows(nx, np).into_owned();
        let dbdw = drdw.rows(nx + np, ny).into_owned();
        let dhdw = -drdw.rows(nx + np + ny, nz).into_owned();
        let nu = prob.iunstable.len();
        let extra = reshape(&linspace(1.0, (nu * nw) as f64, nu * nw), nu, nw);
        for (k, &i) in prob.iunstable.iter().enumerate() {
            dgdw.row_mut(i).copy_from(&extra.row(k));
        }

        let sens = stepper.sensitivities(SensitivityArgs {
            dgdw: &dgdw, dhdw: &dhdw, dbdw: &dbdw, dvdw: &dvdw,
        }).unwrap();
        for &i in prob.iunstable.iter() {
            assert!(sens.dxdw.row(i).iter().all(|&e| e == 0.0), "{}: dxdw", label);
        }
        let dudw_actual = vstack(&vstack(&sens.dxdw, &sens.dpdw), &vstack(&sens.dydw, &sens.dzdw));
        assert!(close(&(&prob.mat * &dudw_actual), &drdw), "{}: M dudw != drdw", label);

        let mut dsdw = &dgdw + prob.ax.tr_mul(&sens.dydw) + prob.jx.tr_mul(&sens.dzdw);
        for i in 0 .. nx {
            if !prob.iunstable.contains(&i) {
                dsdw.row_mut(i).fill(0.0);
            }
        }
        assert!(close(&sens.dsdw, &dsdw), "{}: dsdw", label);
        assert_eq!(stepper.phase(), Phase::Solved);
    } //@}

    #[test]
    fn newton_step_basic() {
        let mut rng = StdRng::seed_from_u64(42);
        for &method in METHODS.iter() {
            let diagonal = method == SaddlePointMethod::Rangespace;
            let prob = assemble(&mut rng, NX, 0, 3, 0, 0, 0, &[], &[], &[], diagonal);
            check_problem(&prob, method, &format!("{}", method));
        }
    }

    #[test]
    fn newton_step_six_variables() {
        let mut rng = StdRng::seed_from_u64(6);
        let ifixed_cases: Vec<Vec<usize>> = vec![vec![], vec![1]];
        let ilower_cases: Vec<Vec<usize>> = vec![vec![], vec![2, 4]];
        let iupper_cases: Vec<Vec<usize>> = vec![vec![], vec![0, 5]];

        for &method in METHODS.iter() {
            let diagonal = method == SaddlePointMethod::Rangespace;
            for &nbu in [0, 1].iter() {
            for &nl in [0, 1].iter() {
            for ifixed in ifixed_cases.iter() {
            for ilower in ilower_cases.iter() {
            for iupper in iupper_cases.iter() {
                if nbu > 0 && ifixed.is_empty() { continue; }
                let prob = assemble(&mut rng, 6, 0, 3, 0, nbu, nl, ifixed, ilower, iupper,
                        diagonal);
                let label = format!("{} nx=6 ny=3 nbu={} nl={} fixed={:?} lower={:?} \
                        upper={:?}", method, nbu, nl, ifixed, ilower, iupper);
                check_problem(&prob, method, &label);
            }}}}}
        }
    }

    #[test]
    fn moving_jacobian_keeps_linear_form() {
        let mut rng = StdRng::seed_from_u64(31);
        let prob = assemble(&mut rng, NX, 0, 4, 2, 0, 1, &[1], &[2, 4, 8], &[], false);
        let mut stepper = Stepper::new(NX, 0, 4, 2, &prob.ax, &prob.ap).unwrap();
        stepper.initialize(InitializeArgs {
            b: &prob.b, xlower: &prob.xlower, xupper: &prob.xupper,
            plower: &prob.plower, pupper: &prob.pupper, x: &prob.x,
        }).unwrap();

        for k in 0 .. 4 {
            let jx = &prob.jx + ::matrix::rand_matrix(&mut rng, 2, NX) * (0.1 * k as f64);
            stepper.canonicalize(CanonicalizeArgs {
                x: &prob.x, p: &prob.p, y: &prob.y, z: &prob.z, g: &prob.g,
                hxx: &prob.hxx, hxp: &prob.hxp, vpx: &prob.vpx, vpp: &prob.vpp,
                jx: &jx, jp: &prob.jp,
                xlower: &prob.xlower, xupper: &prob.xupper,
                plower: &prob.plower, pupper: &prob.pupper,
            }).unwrap();

            let lin = stepper.linear_echelonizer();
            assert_eq!(lin.num_factorizations(), 1);
            assert_eq!(lin.matrix(), &prob.ax);
            assert_eq!(lin.rank(), 3);

            let ech = stepper.echelonizer();
            assert_eq!(ech.matrix(), &vstack(&prob.ax, &jx));
            assert_eq!(ech.rank(), 5);
            let err = ech.r() * ech.matrix().select_columns(ech.q()) - ech.c();
            assert!(max_abs(&err) < 1e-10, "k={} err={:e}", k, max_abs(&err));
        }
    }

    #[test]
    fn newton_step() {
        let _ = ::env_logger::builder().is_test(true).try_init();
        let mut rng = StdRng::seed_from_u64(2024);
        let ifixed_cases: Vec<Vec<usize>> = vec![vec![], vec![1], vec![1, 3, 7]];
        let ilower_cases: Vec<Vec<usize>> = vec![vec![], vec![2, 4, 8]];
        let iupper_cases: Vec<Vec<usize>> = vec![vec![], vec![0, 5, 9]];

        for &method in METHODS.iter() {
            let diagonal = method == SaddlePointMethod::Rangespace;
            for &np in [0, 2].iter() {
            for &ny in [3, 4].iter() {
            for &nz in [0, 2].iter() {
            for &nbu in [0, 1].iter() {
            for &nl in [0, 1].iter() {
            for ifixed in ifixed_cases.iter() {
            for ilower in ilower_cases.iter() {
            for iupper in iupper_cases.iter() {
                if np > 0 && nbu + nl > 0 { continue; }
                if nbu > 0 && ifixed.is_empty() { continue; }
                let prob = assemble(&mut rng, NX, np, ny, nz, nbu, nl, ifixed, ilower, iupper,
                        diagonal);
                let label = format!("{} np={} ny={} nz={} nbu={} nl={} fixed={:?} \
                        lower={:?} upper={:?}", method, np, ny, nz, nbu, nl, ifixed,
                        ilower, iupper);
                check_problem(&prob, method, &label);
            }}}}}}}}
        }
    }

    #[test]
    fn rangespace_falls_back() {
        let mut rng = StdRng::seed_from_u64(8);
        let prob = assemble(&mut rng, NX, 2, 3, 2, 0, 0, &[1], &[], &[], false);
        let (stepper, _) = run_to_decomposed(&prob, SaddlePointMethod::Rangespace).unwrap();
        assert_eq!(stepper.method(), SaddlePointMethod::Fullspace);
        check_problem(&prob, SaddlePointMethod::Rangespace, "fallback");
    }

    #[test]
    fn degenerate_parameters_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let prob = assemble(&mut rng, NX, 2, 3, 0, 0, 1, &[], &[], &[], false);
        match run_to_decomposed(&prob, SaddlePointMethod::Fullspace) {
            Err(StepperError::UnsupportedDegenerateParameters { np, nl, nbu }) => {
                assert_eq!((np, nl, nbu), (2, 1, 0));
            },
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("degenerate parameters accepted"),
        }
    }

    #[test]
    fn too_many_multipliers() {
        let ax = na::DMatrix::zeros(3, 2);
        let ap = na::DMatrix::zeros(3, 0);
        match Stepper::new(2, 0, 3, 0, &ax, &ap) {
            Err(StepperError::TooManyMultipliers { nx: 2, nw: 3 }) => {},
            _ => panic!("expected TooManyMultipliers"),
        }
        let ax = na::DMatrix::zeros(2, 4);
        assert!(Stepper::new(4, 0, 3, 0, &ax, &ap).is_err());
    }

    #[test]
    fn phase_order() {
        let mut rng = StdRng::seed_from_u64(17);
        let prob = assemble(&mut rng, NX, 0, 3, 0, 0, 0, &[], &[], &[], false);
        let mut stepper = Stepper::new(NX, 0, 3, 0, &prob.ax, &prob.ap).unwrap();
        assert_eq!(stepper.phase(), Phase::Created);
        assert_eq!(stepper.decompose(),
                Err(StepperError::PhaseOrder { operation: "decompose", phase: Phase::Created }));
        assert!(stepper.solve(solve_args(&prob)).is_err());
        assert!(stepper.matrix().is_err());
        assert!(stepper.residual_vector().is_none());

        let (mut stepper, _) = run_to_decomposed(&prob, SaddlePointMethod::Nullspace).unwrap();
        assert_eq!(stepper.phase(), Phase::Decomposed);
        assert!(stepper.decompose().is_err());
        let dgdw = na::DMatrix::zeros(NX, 1);
        let empty = na::DMatrix::zeros(0, 1);
        let dbdw = na::DMatrix::zeros(3, 1);
        assert!(stepper.sensitivities(SensitivityArgs {
            dgdw: &dgdw, dhdw: &empty, dbdw: &dbdw, dvdw: &empty }).is_err());
        stepper.solve(solve_args(&prob)).unwrap();
        assert!(stepper.solve(solve_args(&prob)).is_err());
        let sens = stepper.sensitivities(SensitivityArgs {
            dgdw: &dgdw, dhdw: &empty, dbdw: &dbdw, dvdw: &empty }).unwrap();
        assert!(max_abs(&sens.dxdw) < 1e-12);
    }

    #[test]
    fn repeated_canonicalization_resets() {
        let mut rng = StdRng::seed_from_u64(21);
        let prob = assemble(&mut rng, NX, 0, 4, 2, 1, 1, &[1, 3, 7], &[2, 4, 8], &[], false);
        let mut stepper = Stepper::new(NX, 0, 4, 2, &prob.ax, &prob.ap).unwrap();
        stepper.set_options(Options { refactorization_frequency: 2, ..Default::default() });
        stepper.initialize(InitializeArgs {
            b: &prob.b, xlower: &prob.xlower, xupper: &prob.xupper,
            plower: &prob.plower, pupper: &prob.pupper, x: &prob.x,
        }).unwrap();
        for _ in 0 .. 5 {
            stepper.canonicalize(CanonicalizeArgs {
                x: &prob.x, p: &prob.p, y: &prob.y, z: &prob.z, g: &prob.g,
                hxx: &prob.hxx, hxp: &prob.hxp, vpx: &prob.vpx, vpp: &prob.vpp,
                jx: &prob.jx, jp: &prob.jp,
                xlower: &prob.xlower, xupper: &prob.xupper,
                plower: &prob.plower, pupper: &prob.pupper,
            }).unwrap();
            let ech = stepper.echelonizer();
            let err = ech.r() * ech.matrix().select_columns(ech.q()) - ech.c();
            assert!(max_abs(&err) < 1e-10);
            for &j in ech.indices_basic_variables() {
                if prob.iunstable.contains(&j) {
                    assert_eq!(j, 1);
                }
            }
        }
        assert_eq!(stepper.linear_echelonizer().num_factorizations(), 3);
        assert_eq!(stepper.phase(), Phase::Canonicalized);
    }
}
