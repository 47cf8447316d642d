// imports{@
extern crate nalgebra as na;

use std::error;
use std::fmt;

use matrix::max_abs;
use options::EchelonizerOptions;
// end imports@}

#[derive(Debug, Clone, PartialEq)] //{@
/// Errors raised by the Echelonizer.  All of them indicate a caller mistake;
/// the echelon form is left untouched when one is returned.
//@}
pub enum EchelonizerError { //{@
    /// A basic or non-basic index passed to a swap is out of range.
    IndexOutOfRange { index: usize, len: usize },
    /// An ordering is not a permutation of 0..len.
    InvalidOrdering { len: usize },
    /// The priority weights do not have one entry per variable.
    WeightsLength { expected: usize, found: usize },
    /// Rows appended to the matrix have the wrong number of columns.
    ColumnsMismatch { expected: usize, found: usize },
} //@}
impl error::Error for EchelonizerError {}
impl fmt::Display for EchelonizerError { //{@
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &EchelonizerError::IndexOutOfRange { index, len } =>
                write!(f, "Index {} out of range (len {})", index, len),
            &EchelonizerError::InvalidOrdering { len } =>
                write!(f, "Ordering is not a permutation of 0..{}", len),
            &EchelonizerError::WeightsLength { expected, found } =>
                write!(f, "Expected {} priority weights, found {}", expected, found),
            &EchelonizerError::ColumnsMismatch { expected, found } =>
                write!(f, "Expected rows with {} columns, found {}", expected, found),
        }
    }
} //@}

//{@
/// Incrementally maintained canonical form R * A * Q = C of an m x n matrix A.
///
///  * R is an m x m invertible matrix.
///  * Q is a column permutation, stored as the variable ordering
///    [basic variables, non-basic variables].
///  * C = [I S; 0 0] where I is nb x nb and nb = rank(A).  The zero rows
///    correspond to linearly dependent rows of A.
///
/// The form is built once by full-pivot Gauss-Jordan elimination and then
/// updated through basis swaps and reorderings, which only touch the first
/// nb rows of R.
//@}
#[derive(Clone, Debug)]
pub struct Echelonizer { //{@
    options: EchelonizerOptions,
    a: na::DMatrix<f64>,
    r: na::DMatrix<f64>,
    s: na::DMatrix<f64>,
    q: Vec<usize>,
    // Original row of A eliminated into each row of R * A.
    rows: Vec<usize>,
    nb: usize,
    updates: usize,
    factorizations: usize,
} //@}
impl Default for Echelonizer { //{@
    fn default() -> Echelonizer {
        Echelonizer {
            options: EchelonizerOptions::default(),
            a: na::DMatrix::zeros(0, 0),
            r: na::DMatrix::zeros(0, 0),
            s: na::DMatrix::zeros(0, 0),
            q: Vec::new(),
            rows: Vec::new(),
            nb: 0,
            updates: 0,
            factorizations: 0,
        }
    }
} //@}
impl fmt::Display for Echelonizer { //{@
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        s += &format!("Echelonizer: {} x {}, rank {}, {} updates\n",
                self.num_equations(), self.num_variables(), self.nb, self.updates);
        s += &format!("Q = {:?}\n", self.q);
        s += &format!("R = {:.4}", self.r);
        s += &format!("S = {:.4}", self.s);
        write!(f, "{}", s)
    }
} //@}

impl Echelonizer { //{@
    pub fn new(a: &na::DMatrix<f64>) -> Echelonizer { //{@
        Echelonizer::with_options(a, EchelonizerOptions::default())
    } //@}

    pub fn with_options(a: &na::DMatrix<f64>, options: EchelonizerOptions) //{@
            -> Echelonizer {
        let mut ech = Echelonizer { options, ..Default::default() };
        ech.a = a.clone();
        ech.factorize();
        ech
    } //@}

    pub fn options(&self) -> &EchelonizerOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: EchelonizerOptions) {
        self.options = options;
    }

    //{@
    /// Compute the canonical form of +a+ from scratch.  Calling this again
    /// with a matrix equal to the last one is a no-op, so any swaps and
    /// reorderings applied since then are kept.
    //@}
    pub fn compute(&mut self, a: &na::DMatrix<f64>) { //{@
        if self.a == *a {
            trace!("Echelonizer: matrix unchanged, keeping current form");
            return;
        }
        self.a = a.clone();
        self.factorize();
    } //@}

    //{@
    /// Discard all updates and recompute the canonical form of the last
    /// matrix given to compute.
    //@}
    pub fn reset(&mut self) { //{@
        self.factorize();
    } //@}

    //{@
    /// Full-pivot Gauss-Jordan elimination of the stored matrix.  R starts as
    /// the identity and receives every row operation applied to A.
    //@}
    fn factorize(&mut self) { //{@
        let (m, n) = self.a.shape();
        let mut c = self.a.clone();
        let mut r = na::DMatrix::identity(m, m);
        let mut q: Vec<usize> = (0 .. n).collect();
        let mut rows: Vec<usize> = (0 .. m).collect();

        let threshold = self.options.rank_tolerance * max_abs(&self.a);
        let mut rank = 0;
        for k in 0 .. m.min(n) {
            let (mut ip, mut jp, mut pmax) = (k, k, 0.0);
            for j in k .. n {
                for i in k .. m {
                    let v = c[(i,j)].abs();
                    if v > pmax {
                        ip = i;
                        jp = j;
                        pmax = v;
                    }
                }
            }
            if pmax <= threshold {
                break;
            }

            if ip != k {
                c.swap_rows(k, ip);
                r.swap_rows(k, ip);
                rows.swap(k, ip);
            }
            if jp != k {
                c.swap_columns(k, jp);
                q.swap(k, jp);
            }

            let pivot = c[(k,k)];
            div_row_float(&mut c, k, pivot);
            div_row_float(&mut r, k, pivot);
            for i in 0 .. m {
                if i == k { continue; }
                let mult = -c[(i,k)];
                if mult == 0.0 { continue; }
                add_row_multiple(&mut c, i, k, mult);
                add_row_multiple(&mut r, i, k, mult);
                c[(i,k)] = 0.0;
            }
            rank += 1;
        }

        self.s = c.view((0, rank), (rank, n - rank)).into_owned();
        self.r = r;
        self.q = q;
        self.rows = rows;
        self.nb = rank;
        self.updates = 0;
        self.factorizations += 1;
        debug!("Echelonizer: rank {} for {} x {} matrix", rank, m, n);
    } //@}

    //{@
    /// Canonical form of [A; J] built from the current form of A, which is
    /// left untouched.  Only the rows of +j+ are eliminated: they are reduced
    /// against the basic rows to J[:, Qn] - J[:, Qb] * S, and the pivots found
    /// there join the basic set.  Swaps and orderings already applied to A
    /// carry over.  The dependent rows of A and of J end up at the bottom.
    //@}
    pub fn extended(&self, j: &na::DMatrix<f64>) -> Result<Echelonizer, EchelonizerError> { //{@
        let (m, n) = self.a.shape();
        if j.ncols() != n {
            return Err(EchelonizerError::ColumnsMismatch { expected: n, found: j.ncols() });
        }
        let nz = j.nrows();
        let nb = self.nb;
        let nn = n - nb;
        let mt = m + nz;

        let jq = j.select_columns(&self.q);
        let jb = jq.columns(0, nb).into_owned();
        let rb = self.r.rows(0, nb).into_owned();

        // Rows: basic rows of A, reduced rows of J, dependent rows of A.
        let mut c = na::DMatrix::zeros(mt, n);
        c.view_mut((0, 0), (nb, nb)).fill_with_identity();
        c.view_mut((0, nb), (nb, nn)).copy_from(&self.s);
        let jn = jq.columns(nb, nn).into_owned();
        c.view_mut((nb, nb), (nz, nn)).copy_from(&(jn - &jb * &self.s));

        let mut r = na::DMatrix::zeros(mt, mt);
        r.view_mut((0, 0), (nb, m)).copy_from(&rb);
        r.view_mut((nb, 0), (nz, m)).copy_from(&(-(&jb * &rb)));
        r.view_mut((nb, m), (nz, nz)).fill_with_identity();
        r.view_mut((nb + nz, 0), (m - nb, m)).copy_from(&self.r.rows(nb, m - nb));

        let mut rows: Vec<usize> = self.rows[.. nb].to_vec();
        rows.extend(m .. mt);
        rows.extend_from_slice(&self.rows[nb ..]);
        let mut q = self.q.clone();

        let threshold = self.options.rank_tolerance * max_abs(&self.a).max(max_abs(j));
        let mut rank = nb;
        for k in nb .. (nb + nz).min(n) {
            let (mut ip, mut jp, mut pmax) = (k, k, 0.0);
            for jj in k .. n {
                for i in k .. nb + nz {
                    let v = c[(i,jj)].abs();
                    if v > pmax {
                        ip = i;
                        jp = jj;
                        pmax = v;
                    }
                }
            }
            if pmax <= threshold {
                break;
            }

            if ip != k {
                c.swap_rows(k, ip);
                r.swap_rows(k, ip);
                rows.swap(k, ip);
            }
            if jp != k {
                c.swap_columns(k, jp);
                q.swap(k, jp);
            }

            let pivot = c[(k,k)];
            div_row_float(&mut c, k, pivot);
            div_row_float(&mut r, k, pivot);
            for i in 0 .. nb + nz {
                if i == k { continue; }
                let mult = -c[(i,k)];
                if mult == 0.0 { continue; }
                add_row_multiple(&mut c, i, k, mult);
                add_row_multiple(&mut r, i, k, mult);
                c[(i,k)] = 0.0;
            }
            rank += 1;
        }
        debug!("Echelonizer: {} rows appended, rank {} -> {}", nz, nb, rank);

        let mut a = na::DMatrix::zeros(mt, n);
        a.view_mut((0, 0), (m, n)).copy_from(&self.a);
        a.view_mut((m, 0), (nz, n)).copy_from(j);
        Ok(Echelonizer {
            options: self.options,
            a,
            r,
            s: c.view((0, rank), (rank, n - rank)).into_owned(),
            q,
            rows,
            nb: rank,
            updates: 0,
            factorizations: 0,
        })
    } //@}

    //{@
    /// Exchange the basic variable at position +ib+ with the non-basic one at
    /// position +jn+.  Requires S(ib,jn) != 0; a tiny pivot is the caller's
    /// responsibility and is only reported through the log.
    //@}
    pub fn update_with_swap_basic_variable(&mut self, ib: usize, jn: usize) //{@
            -> Result<(), EchelonizerError> {
        let nb = self.nb;
        let nn = self.num_non_basic_variables();
        if ib >= nb {
            return Err(EchelonizerError::IndexOutOfRange { index: ib, len: nb });
        }
        if jn >= nn {
            return Err(EchelonizerError::IndexOutOfRange { index: jn, len: nn });
        }

        let pivot = self.s[(ib,jn)];
        if pivot == 0.0 {
            warn!("Echelonizer: swapping on a zero pivot S({},{})", ib, jn);
        }
        let col = self.s.column(jn).clone_owned();

        div_row_float(&mut self.r, ib, pivot);
        div_row_float(&mut self.s, ib, pivot);
        for i in 0 .. nb {
            if i == ib || col[i] == 0.0 { continue; }
            add_row_multiple(&mut self.r, i, ib, -col[i]);
            add_row_multiple(&mut self.s, i, ib, -col[i]);
        }

        let aux = 1.0 / pivot;
        for i in 0 .. nb {
            self.s[(i,jn)] = -col[i] * aux;
        }
        self.s[(ib,jn)] = aux;

        self.q.swap(ib, nb + jn);
        self.updates += 1;
        trace!("Echelonizer: swapped basic {} with non-basic {}",
                self.q[nb + jn], self.q[ib]);
        Ok(())
    } //@}

    //{@
    /// Swap basic and non-basic variables so that the basic set prefers
    /// variables of larger weight, then order both sets by decreasing weight.
    ///
    /// A swap of basic i for non-basic j happens only when w[j] > w[i] and
    /// |S(i,j)| exceeds pivot_tolerance * max|S(i,:)|.  Among candidates, the
    /// largest weight wins and ties go to the larger |S(i,j)|.  Every swap
    /// replaces a basic weight by a strictly larger one, so the loop ends.
    //@}
    pub fn update_with_priority_weights(&mut self, weights: &na::DVector<f64>) //{@
            -> Result<(), EchelonizerError> {
        let n = self.num_variables();
        if weights.len() != n {
            return Err(EchelonizerError::WeightsLength {
                expected: n, found: weights.len() });
        }

        let nb = self.nb;
        let nn = n - nb;
        let mut nswaps = 0;
        loop {
            let mut swapped = false;
            for i in 0 .. nb {
                let wi = weights[self.q[i]];
                let rowmax = (0 .. nn).fold(0.0, |acc: f64, j| acc.max(self.s[(i,j)].abs()));
                if rowmax == 0.0 { continue; }
                let threshold = self.options.pivot_tolerance * rowmax;

                let mut best: Option<usize> = None;
                for j in 0 .. nn {
                    let sij = self.s[(i,j)].abs();
                    let wj = weights[self.q[nb + j]];
                    if sij <= threshold || !(wj > wi) { continue; }
                    best = match best {
                        None => Some(j),
                        Some(k) => {
                            let wk = weights[self.q[nb + k]];
                            if wj > wk || (wj == wk && sij > self.s[(i,k)].abs()) {
                                Some(j)
                            } else {
                                Some(k)
                            }
                        },
                    };
                }

                if let Some(j) = best {
                    self.update_with_swap_basic_variable(i, j)?;
                    swapped = true;
                    nswaps += 1;
                }
            }
            if !swapped { break; }
        }
        debug!("Echelonizer: {} swaps from priority weights", nswaps);

        let q = &self.q;
        let mut kb: Vec<usize> = (0 .. nb).collect();
        let mut kn: Vec<usize> = (0 .. nn).collect();
        kb.sort_by(|&a, &b| weights[q[b]].total_cmp(&weights[q[a]]));
        kn.sort_by(|&a, &b| weights[q[nb + b]].total_cmp(&weights[q[nb + a]]));
        self.update_ordering(&kb, &kn)
    } //@}

    //{@
    /// Reorder the basic variables by +kb+ and the non-basic ones by +kn+:
    /// position i of the new basic set holds what was at kb[i].  The basic
    /// rows of R follow the basic variables.
    //@}
    pub fn update_ordering(&mut self, kb: &[usize], kn: &[usize]) //{@
            -> Result<(), EchelonizerError> {
        let nb = self.nb;
        let nn = self.num_non_basic_variables();
        if !is_permutation(kb, nb) {
            return Err(EchelonizerError::InvalidOrdering { len: nb });
        }
        if !is_permutation(kn, nn) {
            return Err(EchelonizerError::InvalidOrdering { len: nn });
        }

        let rold = self.r.rows(0, nb).into_owned();
        for (i, &k) in kb.iter().enumerate() {
            self.r.row_mut(i).copy_from(&rold.row(k));
        }
        self.s = self.s.select_rows(kb).select_columns(kn);

        let qb: Vec<usize> = kb.iter().map(|&k| self.q[k]).collect();
        let qn: Vec<usize> = kn.iter().map(|&k| self.q[nb + k]).collect();
        let rows: Vec<usize> = kb.iter().map(|&k| self.rows[k]).collect();
        self.q[.. nb].copy_from_slice(&qb);
        self.q[nb ..].copy_from_slice(&qn);
        self.rows[.. nb].copy_from_slice(&rows);
        Ok(())
    } //@}

    //{@
    /// Zero out round-off noise in R, then rebuild S = R[basic rows] * A[:, Qn]
    /// so that it agrees with the current R, and zero its noise as well.
    //@}
    pub fn clean_residual_roundoff_errors(&mut self) { //{@
        let tol = self.options.roundoff_tolerance;
        let rthresh = tol * max_abs(&self.r);
        self.r.apply(|e| if e.abs() < rthresh { *e = 0.0 });

        let nb = self.nb;
        if nb > 0 && self.num_non_basic_variables() > 0 {
            let an = self.a.select_columns(&self.q[nb ..]);
            self.s = self.r.rows(0, nb) * an;
        }
        let sthresh = tol * max_abs(&self.s);
        self.s.apply(|e| if e.abs() < sthresh { *e = 0.0 });
    } //@}

    // accessors{@
    /// The matrix whose canonical form is maintained.
    pub fn matrix(&self) -> &na::DMatrix<f64> {
        &self.a
    }

    pub fn r(&self) -> &na::DMatrix<f64> {
        &self.r
    }

    pub fn s(&self) -> &na::DMatrix<f64> {
        &self.s
    }

    pub fn q(&self) -> &[usize] {
        &self.q
    }

    //{@
    /// The canonical matrix C = [I S; 0 0].
    //@}
    pub fn c(&self) -> na::DMatrix<f64> { //{@
        let (m, n) = self.a.shape();
        let nb = self.nb;
        let mut c = na::DMatrix::zeros(m, n);
        for i in 0 .. nb {
            c[(i,i)] = 1.0;
        }
        c.view_mut((0, nb), (nb, n - nb)).copy_from(&self.s);
        c
    } //@}

    pub fn num_variables(&self) -> usize {
        self.a.ncols()
    }

    pub fn num_equations(&self) -> usize {
        self.a.nrows()
    }

    pub fn num_basic_variables(&self) -> usize {
        self.nb
    }

    pub fn num_non_basic_variables(&self) -> usize {
        self.a.ncols() - self.nb
    }

    pub fn rank(&self) -> usize {
        self.nb
    }

    pub fn num_dependent_rows(&self) -> usize {
        self.a.nrows() - self.nb
    }

    pub fn indices_basic_variables(&self) -> &[usize] {
        &self.q[.. self.nb]
    }

    pub fn indices_non_basic_variables(&self) -> &[usize] {
        &self.q[self.nb ..]
    }

    /// Rows of A that together span its row space.
    pub fn indices_linearly_independent_rows(&self) -> &[usize] {
        &self.rows[.. self.nb]
    }

    /// Swaps applied since the last factorization.
    pub fn num_updates(&self) -> usize {
        self.updates
    }

    /// Full eliminations run by compute and reset.
    pub fn num_factorizations(&self) -> usize {
        self.factorizations
    }
    // end accessors@}
} //@}

// row operations{@
pub(crate) fn add_row_multiple(m: &mut na::DMatrix<f64>, tgtrow: usize, //{@
        srcrow: usize, mult: f64) {
    for j in 0 .. m.ncols() {
        let v = m[(srcrow,j)];
        m[(tgtrow,j)] += mult * v;
    }
} //@}

pub(crate) fn div_row_float(m: &mut na::DMatrix<f64>, tgtrow: usize, divisor: f64) { //{@
    for e in m.row_mut(tgtrow).iter_mut() {
        *e /= divisor;
    }
} //@}

fn is_permutation(k: &[usize], len: usize) -> bool {
    if k.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in k {
        if i >= len || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}
// end row operations@}
