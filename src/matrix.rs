extern crate nalgebra as na;
extern crate rand;

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

// helpers{@
//{@
/// Largest absolute entry of a matrix; zero for an empty matrix.
//@}
pub fn max_abs(m: &na::DMatrix<f64>) -> f64 { //{@
    m.iter().fold(0.0, |acc: f64, &e| acc.max(e.abs()))
} //@}

pub fn max_abs_vec(v: &na::DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc: f64, &e| acc.max(e.abs()))
}

//{@
/// n evenly spaced values from +start+ to +stop+ (both inclusive).
//@}
pub fn linspace(start: f64, stop: f64, n: usize) -> na::DVector<f64> { //{@
    if n == 1 {
        return na::DVector::from_element(1, start);
    }
    let step = if n > 1 { (stop - start) / (n - 1) as f64 } else { 0.0 };
    na::DVector::from_fn(n, |i, _| start + step * i as f64)
} //@}

//{@
/// Stack +top+ over +bottom+.  Both must have the same number of columns.
//@}
pub fn vstack(top: &na::DMatrix<f64>, bottom: &na::DMatrix<f64>) -> na::DMatrix<f64> { //{@
    assert!(top.ncols() == bottom.ncols());
    let mut out = na::DMatrix::zeros(top.nrows() + bottom.nrows(), top.ncols());
    out.view_mut((0, 0), top.shape()).copy_from(top);
    out.view_mut((top.nrows(), 0), bottom.shape()).copy_from(bottom);
    out
} //@}

//{@
/// Place +left+ next to +right+.  Both must have the same number of rows.
//@}
pub fn hstack(left: &na::DMatrix<f64>, right: &na::DMatrix<f64>) -> na::DMatrix<f64> { //{@
    assert!(left.nrows() == right.nrows());
    let mut out = na::DMatrix::zeros(left.nrows(), left.ncols() + right.ncols());
    out.view_mut((0, 0), left.shape()).copy_from(left);
    out.view_mut((0, left.ncols()), right.shape()).copy_from(right);
    out
} //@}

pub fn vstack_vec(top: &na::DVector<f64>, bottom: &na::DVector<f64>) -> na::DVector<f64> {
    let mut out = na::DVector::zeros(top.len() + bottom.len());
    out.rows_mut(0, top.len()).copy_from(top);
    out.rows_mut(top.len(), bottom.len()).copy_from(bottom);
    out
}
// end helpers@}

// fixtures{@
#[allow(dead_code)]
//{@
/// Generate a random Uniform(-1, 1) matrix of the given dimensions.
//@}
pub fn rand_matrix<R: Rng>(rng: &mut R, nrows: usize, ncols: usize) //{@
    -> na::DMatrix<f64>
{
    let dist = Uniform::new(-1.0, 1.0);
    let mut data = Vec::with_capacity(nrows * ncols);
    for _ in 0 .. (nrows * ncols) {
        data.push(dist.sample(rng));
    }
    na::DMatrix::from_column_slice(nrows, ncols, &data)
} //@}

//{@
/// The m x n upper-left corner of the Pascal matrix, scaled down so that the
/// entries stay of order one.
//@}
pub fn pascal_matrix(m: usize, n: usize) -> na::DMatrix<f64> { //{@
    let mut p = na::DMatrix::from_element(m, n, 1.0);
    for i in 1 .. m {
        for j in 1 .. n {
            p[(i, j)] = p[(i - 1, j)] + p[(i, j - 1)];
        }
    }
    let scale = max_abs(&p);
    if scale > 0.0 {
        p /= scale;
    }
    p
} //@}

//{@
/// A deterministic, non-symmetric, strictly diagonally dominant n x n matrix.
//@}
pub fn matrix_non_singular(n: usize) -> na::DMatrix<f64> { //{@
    let mut h = na::DMatrix::from_fn(n, n, |i, j| {
        1.0 / (1.0 + i as f64 + 2.0 * j as f64)
    });
    for i in 0 .. n {
        let offdiag = (0 .. n).filter(|&j| j != i)
            .fold(0.0, |acc, j| acc + h[(i, j)].abs());
        h[(i, i)] = offdiag + 1.0 + i as f64;
    }
    h
} //@}

#[derive(Clone, Copy, Debug, PartialEq)] //{@
/// Structures of the constraint matrices used to exercise the Echelonizer.
//@}
pub enum Structure { //{@
    /// Random dense entries.
    Dense,
    /// Random dense entries with the last two rows linearly dependent on the
    /// first two.
    Dependent,
    /// Band of width four starting at the diagonal.
    Banded,
} //@}

pub const STRUCTURES: [Structure; 3] =
    [Structure::Dense, Structure::Dependent, Structure::Banded];

//{@
/// Assemble an m x n constraint matrix of the given structure.  Each variable
/// in +jfixed+ gets its own unit row (one per leading row of A) and is removed
/// from every other row, so that it is pinned by its own equation.
//@}
pub fn assemble_matrix_a<R: Rng>(rng: &mut R, structure: Structure, //{@
        m: usize, n: usize, jfixed: &[usize]) -> na::DMatrix<f64> {
    let mut a = match structure {
        Structure::Dense | Structure::Dependent => rand_matrix(rng, m, n),
        Structure::Banded => {
            let full = rand_matrix(rng, m, n);
            na::DMatrix::from_fn(m, n, |i, j| {
                if j >= i && j < i + 4 { full[(i, j)] } else { 0.0 }
            })
        },
    };

    for (k, &j) in jfixed.iter().enumerate() {
        if k >= m { break; }
        a.column_mut(j).fill(0.0);
        a.row_mut(k).fill(0.0);
        a[(k, j)] = 1.0;
    }

    if structure == Structure::Dependent && m >= 4 {
        for j in 0 .. n {
            a[(m - 1, j)] = a[(0, j)] + a[(1, j)];
            a[(m - 2, j)] = 2.0 * a[(1, j)] - a[(0, j)];
        }
    }
    a
} //@}

//{@
/// Assemble the ny x nx matrix Ax used in the Newton step tests.
///  * The first +nbu+ variables of +ifixed+ get a unit row each, which forces
///    them to be basic in any canonical form of Ax.
///  * The last +nl+ rows are linear combinations of the leading rows.
//@}
pub fn assemble_matrix_ax<R: Rng>(rng: &mut R, ny: usize, nx: usize, //{@
        nbu: usize, nl: usize, ifixed: &[usize]) -> na::DMatrix<f64> {
    assert!(nbu <= ifixed.len() && nbu + nl <= ny);
    let mut ax = rand_matrix(rng, ny, nx);

    for (k, &j) in ifixed.iter().take(nbu).enumerate() {
        ax.row_mut(k).fill(0.0);
        ax[(k, j)] = 1.0;
    }

    let nindep = ny - nl;
    for l in 0 .. nl {
        let target = ny - 1 - l;
        for j in 0 .. nx {
            ax[(target, j)] = (0 .. nindep)
                .fold(0.0, |acc, i| acc + (i + l + 1) as f64 * ax[(i, j)]);
        }
    }
    ax
} //@}
// end fixtures@}
