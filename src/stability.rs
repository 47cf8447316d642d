// imports{@
extern crate nalgebra as na;

use std::error;
use std::fmt;

use matrix::max_abs_vec;
use options::StabilityOptions;
// end imports@}

#[derive(Debug, Clone, PartialEq)]
pub enum StabilityError {
    DimensionMismatch { what: &'static str, expected: usize, found: usize },
}
impl error::Error for StabilityError {}
impl fmt::Display for StabilityError { //{@
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &StabilityError::DimensionMismatch { what, expected, found } =>
                write!(f, "Dimension mismatch in {}: expected {}, found {}",
                        what, expected, found),
        }
    }
} //@}

#[derive(Clone, Copy, Debug, PartialEq, Eq)] //{@
/// Active-set status of a single primal variable.  Exactly one applies.
//@}
pub enum Status { //{@
    /// Interior, or on a bound with a dual residual pointing inward.
    Stable,
    /// On its lower bound with s > 0.
    LowerUnstable,
    /// On its upper bound with s < 0.
    UpperUnstable,
    /// Lower and upper bounds coincide.
    Fixed,
} //@}

#[derive(Clone, Debug)] //{@
/// Classification of every variable together with the dual residual
/// s = g + W^T y it was computed from.
//@}
pub struct Stability { //{@
    status: Vec<Status>,
    s: na::DVector<f64>,
} //@}
impl fmt::Display for Stability { //{@
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "stable {:?}, lower {:?}, upper {:?}, fixed {:?}",
                self.indices_stable(), self.indices_lower_unstable(),
                self.indices_upper_unstable(), self.indices_fixed())
    }
} //@}

impl Stability { //{@
    //{@
    /// Initial classification from the bounds alone: fixed where the bounds
    /// coincide, stable elsewhere.  The dual residual is zero.
    //@}
    pub fn from_bounds(xlower: &na::DVector<f64>, xupper: &na::DVector<f64>) //{@
            -> Result<Stability, StabilityError> {
        check_len("xupper", xlower.len(), xupper.len())?;
        let status = xlower.iter().zip(xupper.iter())
            .map(|(l, u)| if l == u { Status::Fixed } else { Status::Stable })
            .collect();
        Ok(Stability { status, s: na::DVector::zeros(xlower.len()) })
    } //@}

    pub fn num_variables(&self) -> usize {
        self.status.len()
    }

    pub fn status(&self, i: usize) -> Status {
        self.status[i]
    }

    pub fn statuses(&self) -> &[Status] {
        &self.status
    }

    pub fn is_stable(&self, i: usize) -> bool {
        self.status[i] == Status::Stable
    }

    /// The dual residual s = g + W^T y.
    pub fn s(&self) -> &na::DVector<f64> {
        &self.s
    }

    fn indices_with(&self, status: Status) -> Vec<usize> {
        (0 .. self.status.len()).filter(|&i| self.status[i] == status).collect()
    }

    pub fn indices_stable(&self) -> Vec<usize> {
        self.indices_with(Status::Stable)
    }

    pub fn indices_lower_unstable(&self) -> Vec<usize> {
        self.indices_with(Status::LowerUnstable)
    }

    pub fn indices_upper_unstable(&self) -> Vec<usize> {
        self.indices_with(Status::UpperUnstable)
    }

    pub fn indices_fixed(&self) -> Vec<usize> {
        self.indices_with(Status::Fixed)
    }

    /// Lower unstable, upper unstable and fixed variables, ascending.
    pub fn indices_unstable(&self) -> Vec<usize> {
        (0 .. self.status.len()).filter(|&i| self.status[i] != Status::Stable).collect()
    }

    pub fn num_stable(&self) -> usize {
        self.status.iter().filter(|&&s| s == Status::Stable).count()
    }

    pub fn num_lower_unstable(&self) -> usize {
        self.status.iter().filter(|&&s| s == Status::LowerUnstable).count()
    }

    pub fn num_upper_unstable(&self) -> usize {
        self.status.iter().filter(|&&s| s == Status::UpperUnstable).count()
    }

    pub fn num_fixed(&self) -> usize {
        self.status.iter().filter(|&&s| s == Status::Fixed).count()
    }

    pub fn num_unstable(&self) -> usize {
        self.status.len() - self.num_stable()
    }
} //@}

//{@
/// Classifies variables as stable, unstable at a bound, or fixed, from the
/// sign of the dual residual s = g + W^T y where W = [A; J].
//@}
#[derive(Clone, Debug)]
pub struct StabilityChecker { //{@
    options: StabilityOptions,
    n: usize,
    m: usize,
    a: na::DMatrix<f64>,
    b: na::DVector<f64>,
    stability: Stability,
} //@}

impl StabilityChecker { //{@
    //{@
    /// Checker for +n+ variables and +m+ rows in W = [A; J], where +a+ holds
    /// the linear rows.
    //@}
    pub fn new(n: usize, m: usize, a: &na::DMatrix<f64>) //{@
            -> Result<StabilityChecker, StabilityError> {
        check_len("A columns", n, a.ncols())?;
        if a.nrows() > m {
            return Err(StabilityError::DimensionMismatch {
                what: "A rows", expected: m, found: a.nrows() });
        }
        Ok(StabilityChecker {
            options: StabilityOptions::default(),
            n,
            m,
            a: a.clone(),
            b: na::DVector::zeros(a.nrows()),
            stability: Stability {
                status: vec![Status::Stable; n],
                s: na::DVector::zeros(n),
            },
        })
    } //@}

    pub fn set_options(&mut self, options: StabilityOptions) {
        self.options = options;
    }

    pub fn options(&self) -> &StabilityOptions {
        &self.options
    }

    //{@
    /// Store the static problem data and seed the classification from the
    /// bounds.
    //@}
    pub fn initialize(&mut self, a: &na::DMatrix<f64>, b: &na::DVector<f64>, //{@
            xlower: &na::DVector<f64>, xupper: &na::DVector<f64>)
            -> Result<(), StabilityError> {
        check_len("A columns", self.n, a.ncols())?;
        check_len("b", a.nrows(), b.len())?;
        check_len("xlower", self.n, xlower.len())?;
        check_len("xupper", self.n, xupper.len())?;
        self.a = a.clone();
        self.b = b.clone();
        self.stability = Stability::from_bounds(xlower, xupper)?;
        debug!("StabilityChecker: {} fixed of {} variables",
                self.stability.num_fixed(), self.n);
        Ok(())
    } //@}

    //{@
    /// Recompute s = g + W^T y and classify every variable.
    ///  * fixed when xlower[i] == xupper[i];
    ///  * lower unstable when x[i] is on its lower bound and s[i] > 0;
    ///  * upper unstable when x[i] is on its upper bound and s[i] < 0;
    ///  * stable otherwise.
    //@}
    pub fn update(&mut self, w: &na::DMatrix<f64>, x: &na::DVector<f64>, //{@
            y: &na::DVector<f64>, g: &na::DVector<f64>,
            xlower: &na::DVector<f64>, xupper: &na::DVector<f64>)
            -> Result<(), StabilityError> {
        let n = self.n;
        check_len("W rows", self.m, w.nrows())?;
        check_len("W columns", n, w.ncols())?;
        check_len("y", w.nrows(), y.len())?;
        check_len("x", n, x.len())?;
        check_len("g", n, g.len())?;
        check_len("xlower", n, xlower.len())?;
        check_len("xupper", n, xupper.len())?;

        let s = g + w.tr_mul(y);
        let tol = self.options.bound_tolerance;
        let on_bound = |xi: f64, bound: f64| {
            bound.is_finite() && (xi - bound).abs() <= tol * (1.0 + bound.abs())
        };

        let status = (0 .. n).map(|i| {
            if xlower[i] == xupper[i] {
                Status::Fixed
            } else if on_bound(x[i], xlower[i]) && s[i] > 0.0 {
                Status::LowerUnstable
            } else if on_bound(x[i], xupper[i]) && s[i] < 0.0 {
                Status::UpperUnstable
            } else {
                Status::Stable
            }
        }).collect();
        self.stability = Stability { status, s };

        if self.a.nrows() > 0 && self.a.nrows() == self.b.len() {
            let feasibility = max_abs_vec(&(&self.a * x - &self.b));
            trace!("StabilityChecker: |Ax - b| = {:e}", feasibility);
        }
        debug!("StabilityChecker: {}", self.stability);
        Ok(())
    } //@}

    pub fn stability(&self) -> &Stability {
        &self.stability
    }
} //@}

//{@
/// Priority weights for the choice of basic variables: the distance to the
/// nearest bound, |x| for unbounded variables, and -1 for variables sitting on
/// a bound.
//@}
pub fn priority_weights(x: &na::DVector<f64>, xlower: &na::DVector<f64>, //{@
        xupper: &na::DVector<f64>) -> na::DVector<f64> {
    na::DVector::from_fn(x.len(), |i, _| {
        let w = (x[i] - xlower[i]).min(xupper[i] - x[i]);
        let w = if w.is_infinite() { x[i].abs() } else { w };
        if w > 0.0 { w } else { -1.0 }
    })
} //@}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), StabilityError> {
    if expected != found {
        return Err(StabilityError::DimensionMismatch { what, expected, found });
    }
    Ok(())
}
