use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)] //{@
/// Strategy used to decompose the saddle point matrix.  All three produce the
/// same step; they differ in cost and in what they assume about Hxx.
//@}
pub enum SaddlePointMethod { //{@
    /// Direct LU of the (reduced) saddle point matrix.
    Fullspace,
    /// Eliminate the basic variables through the canonical form and factorize
    /// the reduced Hessian on the non-basic variables.
    Nullspace,
    /// Eliminate the primal variables through a diagonal Hxx and factorize
    /// the Schur complement on the multipliers.
    Rangespace,
} //@}
impl Default for SaddlePointMethod {
    fn default() -> SaddlePointMethod {
        SaddlePointMethod::Fullspace
    }
}
impl fmt::Display for SaddlePointMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            &SaddlePointMethod::Fullspace => "fullspace",
            &SaddlePointMethod::Nullspace => "nullspace",
            &SaddlePointMethod::Rangespace => "rangespace",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct KktOptions {
    pub method: SaddlePointMethod,
}

#[derive(Clone, Copy, Debug)] //{@
/// Tolerances used by the Echelonizer.
//@}
pub struct EchelonizerOptions { //{@
    /// A pivot smaller than rank_tolerance * max|A| ends the elimination.
    pub rank_tolerance: f64,
    /// Basis swaps driven by priority weights skip pivots smaller than
    /// pivot_tolerance * max|S(i,:)|.
    pub pivot_tolerance: f64,
    /// Entries smaller than roundoff_tolerance * max|.| are zeroed on cleanup.
    pub roundoff_tolerance: f64,
} //@}
impl Default for EchelonizerOptions {
    fn default() -> EchelonizerOptions {
        EchelonizerOptions {
            rank_tolerance: 1e-12,
            pivot_tolerance: 1e-8,
            roundoff_tolerance: 1e-14,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StabilityOptions {
    /// x is on a bound when |x - bound| <= bound_tolerance * (1 + |bound|).
    pub bound_tolerance: f64,
}
impl Default for StabilityOptions {
    fn default() -> StabilityOptions {
        StabilityOptions { bound_tolerance: 1e-14 }
    }
}

#[derive(Clone, Copy, Debug)] //{@
/// Options for the Newton step calculation.
//@}
pub struct Options { //{@
    pub kkt: KktOptions,
    pub echelonizer: EchelonizerOptions,
    pub stability: StabilityOptions,
    /// Number of canonicalizations after which the echelon form is recomputed
    /// from scratch.  Zero disables the periodic reset.
    pub refactorization_frequency: usize,
} //@}
impl Default for Options {
    fn default() -> Options {
        Options {
            kkt: KktOptions::default(),
            echelonizer: EchelonizerOptions::default(),
            stability: StabilityOptions::default(),
            refactorization_frequency: 50,
        }
    }
}
