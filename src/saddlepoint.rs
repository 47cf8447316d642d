// imports{@
extern crate nalgebra as na;

use std::error;
use std::fmt;

use matrix::vstack_vec;
// end imports@}

#[derive(Debug, Clone, PartialEq)]
pub enum SaddlePointError {
    DimensionMismatch { what: &'static str, expected: usize, found: usize },
}
impl error::Error for SaddlePointError {}
impl fmt::Display for SaddlePointError { //{@
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &SaddlePointError::DimensionMismatch { what, expected, found } =>
                write!(f, "Dimension mismatch in {}: expected {}, found {}",
                        what, expected, found),
        }
    }
} //@}

//{@
/// The block matrix
///
/// ```text
/// M = [ H  A^T ]
///     [ A  G   ]
/// ```
///
/// where the rows of the fixed variables jf are replaced by unit rows and
/// their columns are zeroed in the upper n rows.  The A block below the fixed
/// columns is kept.
//@}
#[derive(Clone, Debug)]
pub struct SaddlePointMatrix { //{@
    h: na::DMatrix<f64>,
    a: na::DMatrix<f64>,
    g: na::DMatrix<f64>,
    jf: Vec<usize>,
} //@}

impl SaddlePointMatrix { //{@
    //{@
    /// Saddle point matrix whose last +nf+ of the n = nx + nf variables are
    /// fixed.
    //@}
    pub fn new(h: &na::DMatrix<f64>, a: &na::DMatrix<f64>, g: &na::DMatrix<f64>, //{@
            nx: usize, nf: usize) -> Result<SaddlePointMatrix, SaddlePointError> {
        check_len("nx + nf", h.nrows(), nx + nf)?;
        let jf: Vec<usize> = (nx .. nx + nf).collect();
        SaddlePointMatrix::with_fixed_indices(h, a, g, &jf)
    } //@}

    pub fn with_fixed_indices(h: &na::DMatrix<f64>, a: &na::DMatrix<f64>, //{@
            g: &na::DMatrix<f64>, jf: &[usize]) -> Result<SaddlePointMatrix, SaddlePointError> {
        let n = h.nrows();
        let m = a.nrows();
        check_len("H columns", n, h.ncols())?;
        check_len("A columns", n, a.ncols())?;
        check_len("G rows", m, g.nrows())?;
        check_len("G columns", m, g.ncols())?;
        if let Some(&j) = jf.iter().find(|&&j| j >= n) {
            return Err(SaddlePointError::DimensionMismatch {
                what: "fixed index", expected: n, found: j });
        }
        Ok(SaddlePointMatrix {
            h: h.clone(),
            a: a.clone(),
            g: g.clone(),
            jf: jf.to_vec(),
        })
    } //@}

    pub fn h(&self) -> &na::DMatrix<f64> {
        &self.h
    }

    pub fn a(&self) -> &na::DMatrix<f64> {
        &self.a
    }

    pub fn g(&self) -> &na::DMatrix<f64> {
        &self.g
    }

    pub fn indices_fixed(&self) -> &[usize] {
        &self.jf
    }

    /// Total dimension n + m.
    pub fn size(&self) -> usize {
        self.h.nrows() + self.a.nrows()
    }

    //{@
    /// Materialize M as a dense matrix.
    //@}
    pub fn matrix(&self) -> na::DMatrix<f64> { //{@
        let n = self.h.nrows();
        let m = self.a.nrows();
        let mut mat = na::DMatrix::zeros(n + m, n + m);
        mat.view_mut((0, 0), (n, n)).copy_from(&self.h);
        mat.view_mut((0, n), (n, m)).copy_from(&self.a.transpose());
        mat.view_mut((n, 0), (m, n)).copy_from(&self.a);
        mat.view_mut((n, n), (m, m)).copy_from(&self.g);
        for &j in self.jf.iter() {
            mat.row_mut(j).fill(0.0);
            mat.view_mut((0, j), (n, 1)).fill(0.0);
            mat[(j,j)] = 1.0;
        }
        mat
    } //@}

    //{@
    /// M * u computed block by block.
    //@}
    pub fn mul_vector(&self, u: &na::DVector<f64>) //{@
            -> Result<na::DVector<f64>, SaddlePointError> {
        let n = self.h.nrows();
        let m = self.a.nrows();
        check_len("u", n + m, u.len())?;

        let ux = u.rows(0, n).into_owned();
        let uy = u.rows(n, m).into_owned();
        let mut uxfree = ux.clone();
        for &j in self.jf.iter() {
            uxfree[j] = 0.0;
        }

        let mut top = &self.h * &uxfree + self.a.tr_mul(&uy);
        for &j in self.jf.iter() {
            top[j] = ux[j];
        }
        let bottom = &self.a * &ux + &self.g * &uy;
        Ok(vstack_vec(&top, &bottom))
    } //@}
} //@}

#[derive(Clone, Debug, PartialEq)] //{@
/// A vector split as [a; b] to match the blocks of a SaddlePointMatrix.
//@}
pub struct SaddlePointVector { //{@
    a: na::DVector<f64>,
    b: na::DVector<f64>,
} //@}

impl SaddlePointVector { //{@
    pub fn new(a: &na::DVector<f64>, b: &na::DVector<f64>) -> SaddlePointVector {
        SaddlePointVector { a: a.clone(), b: b.clone() }
    }

    //{@
    /// Split +r+ into its first +n+ and last +m+ entries.
    //@}
    pub fn from_vector(r: &na::DVector<f64>, n: usize, m: usize) //{@
            -> Result<SaddlePointVector, SaddlePointError> {
        check_len("r", n + m, r.len())?;
        Ok(SaddlePointVector {
            a: r.rows(0, n).into_owned(),
            b: r.rows(n, m).into_owned(),
        })
    } //@}

    pub fn a(&self) -> &na::DVector<f64> {
        &self.a
    }

    pub fn b(&self) -> &na::DVector<f64> {
        &self.b
    }

    pub fn vector(&self) -> na::DVector<f64> {
        vstack_vec(&self.a, &self.b)
    }
} //@}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), SaddlePointError> {
    if expected != found {
        return Err(SaddlePointError::DimensionMismatch { what, expected, found });
    }
    Ok(())
}
