//! Dense row-major matrix primitive and its in-place arithmetic.

use std::fmt::{self, Debug};
use std::ops::{Add, Index, IndexMut, Mul};

/// A dense row-major matrix of `f64`s.
///
/// Once constructed, the dimensions never change and the backing buffer is
/// stable: `data().len() == rows() * cols()` for the lifetime of the value.
/// The element at `(r, c)` lives at `data()[r * cols() + c]`.
///
/// A column vector is just a matrix with one column, see [`Mat::col`].
#[derive(Clone, PartialEq)]
pub struct Mat {
    rows: usize,
    cols: usize,
    data: Box<[f64]>,
}

impl Debug for Mat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mat")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("data", &self.data)
            .finish()
    }
}

impl Mat {
    /// A zeroed matrix with the given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: bytemuck::zeroed_slice_box(rows * cols),
        }
    }

    /// A matrix with the given dimensions backed by `data`.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    #[track_caller]
    pub fn from_data(rows: usize, cols: usize, data: impl Into<Box<[f64]>>) -> Self {
        let data = data.into();
        assert!(
            data.len() == rows * cols,
            "data length {} does not match matrix size {rows},{cols}",
            data.len(),
        );
        Self { rows, cols, data }
    }

    /// A zeroed column vector of the given height.
    pub fn col(len: usize) -> Self {
        Self::new(len, 1)
    }

    /// A column vector backed by `data`.
    pub fn col_from(data: impl Into<Box<[f64]>>) -> Self {
        let data = data.into();
        Self {
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Height times width.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// The underlying buffer, row-major. Writing through it writes the matrix.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn view(&self) -> MatRef<'_> {
        MatRef {
            rows: self.rows,
            cols: self.cols,
            data: &self.data,
        }
    }

    pub fn view_mut(&mut self) -> MatMut<'_> {
        MatMut {
            rows: self.rows,
            cols: self.cols,
            data: &mut self.data,
        }
    }

    #[inline(always)]
    #[track_caller]
    pub fn at(&self, r: usize, c: usize) -> f64 {
        self.view().at(r, c)
    }

    #[inline(always)]
    #[track_caller]
    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        self.view_mut().set(r, c, value);
    }
}

impl Index<(usize, usize)> for Mat {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        check_index(self.rows, self.cols, r, c);
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Mat {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        check_index(self.rows, self.cols, r, c);
        &mut self.data[r * self.cols + c]
    }
}

/// Convenience operator, allocates a fresh result. Not for hot paths; use
/// [`add`] with a caller-supplied output there.
impl Add for &Mat {
    type Output = Mat;

    fn add(self, rhs: Self) -> Mat {
        let mut out = Mat::new(self.rows, self.cols);
        add(out.view_mut(), self.view(), rhs.view());
        out
    }
}

/// Convenience operator, allocates a fresh result. Not for hot paths; use
/// [`mul`] with a caller-supplied output there.
impl Mul for &Mat {
    type Output = Mat;

    fn mul(self, rhs: Self) -> Mat {
        let mut out = Mat::new(self.rows, rhs.cols);
        mul(out.view_mut(), self.view(), rhs.view());
        out
    }
}

/// Immutable view of a matrix, typically a slice of some shared flat buffer.
#[derive(Debug, Clone, Copy)]
pub struct MatRef<'a> {
    rows: usize,
    cols: usize,
    data: &'a [f64],
}

impl<'a> MatRef<'a> {
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    #[track_caller]
    pub fn from_slice(rows: usize, cols: usize, data: &'a [f64]) -> Self {
        assert!(
            data.len() == rows * cols,
            "data length {} does not match matrix size {rows},{cols}",
            data.len(),
        );
        Self { rows, cols, data }
    }

    pub fn col_from_slice(data: &'a [f64]) -> Self {
        Self {
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &'a [f64] {
        self.data
    }

    /// Reinterprets the buffer as a single row. Row-major layout makes this
    /// free; it is how backprop treats a column as its transpose.
    pub fn as_row(self) -> MatRef<'a> {
        MatRef {
            rows: 1,
            cols: self.data.len(),
            data: self.data,
        }
    }

    #[inline(always)]
    #[track_caller]
    pub fn at(&self, r: usize, c: usize) -> f64 {
        #[cfg(feature = "unchecked-math")]
        {
            debug_assert!(r < self.rows && c < self.cols);
            // Safety: dimension invariant gives r * cols + c < data.len()
            // whenever r < rows and c < cols, which callers must uphold.
            unsafe { *self.data.get_unchecked(r * self.cols + c) }
        }
        #[cfg(not(feature = "unchecked-math"))]
        {
            check_index(self.rows, self.cols, r, c);
            self.data[r * self.cols + c]
        }
    }
}

/// Mutable view of a matrix.
#[derive(Debug)]
pub struct MatMut<'a> {
    rows: usize,
    cols: usize,
    data: &'a mut [f64],
}

impl<'a> MatMut<'a> {
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    #[track_caller]
    pub fn from_slice(rows: usize, cols: usize, data: &'a mut [f64]) -> Self {
        assert!(
            data.len() == rows * cols,
            "data length {} does not match matrix size {rows},{cols}",
            data.len(),
        );
        Self { rows, cols, data }
    }

    pub fn col_from_slice(data: &'a mut [f64]) -> Self {
        Self {
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Reborrows, so the view can be passed to an operation without giving it
    /// up.
    pub fn rb(&mut self) -> MatMut<'_> {
        MatMut {
            rows: self.rows,
            cols: self.cols,
            data: self.data,
        }
    }

    pub fn as_const(&self) -> MatRef<'_> {
        MatRef {
            rows: self.rows,
            cols: self.cols,
            data: self.data,
        }
    }

    /// Reinterprets the buffer as a single row, see [`MatRef::as_row`].
    pub fn as_row(self) -> MatMut<'a> {
        MatMut {
            rows: 1,
            cols: self.data.len(),
            data: self.data,
        }
    }

    #[inline(always)]
    #[track_caller]
    pub fn at(&self, r: usize, c: usize) -> f64 {
        self.as_const().at(r, c)
    }

    #[inline(always)]
    #[track_caller]
    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        #[cfg(feature = "unchecked-math")]
        {
            debug_assert!(r < self.rows && c < self.cols);
            // Safety: same bound as `MatRef::at`.
            unsafe { *self.data.get_unchecked_mut(r * self.cols + c) = value }
        }
        #[cfg(not(feature = "unchecked-math"))]
        {
            check_index(self.rows, self.cols, r, c);
            self.data[r * self.cols + c] = value;
        }
    }
}

#[inline(always)]
#[track_caller]
fn check_index(rows: usize, cols: usize, r: usize, c: usize) {
    assert!(
        r < rows && c < cols,
        "index out of range [{r}][{c}] with dimensions {rows},{cols}",
    );
}

#[inline(always)]
#[track_caller]
fn check_same(a: (usize, usize), b: (usize, usize)) {
    assert!(a == b, "matrix dimensions do not match: {a:?} vs {b:?}");
}

/// R = 0.
pub fn zero(r: MatMut) {
    r.data.fill(0.0);
}

/// R = A.
///
/// # Panics
///
/// Panics if the dimensions of the two matrices don't match.
#[track_caller]
pub fn assign(r: MatMut, a: MatRef) {
    check_same((r.rows, r.cols), (a.rows, a.cols));
    r.data.copy_from_slice(a.data);
}

/// R = A + B, for R, A, B in [n x m].
///
/// # Panics
///
/// Panics if the dimensions of the three matrices don't match.
#[track_caller]
pub fn add(r: MatMut, a: MatRef, b: MatRef) {
    check_same((r.rows, r.cols), (a.rows, a.cols));
    check_same((a.rows, a.cols), (b.rows, b.cols));
    for (r, (&a, &b)) in r.data.iter_mut().zip(a.data.iter().zip(b.data)) {
        *r = a + b;
    }
}

/// R += B, for R, B in [n x m].
///
/// # Panics
///
/// Panics if the dimensions of the two matrices don't match.
#[track_caller]
pub fn add_assign(r: MatMut, b: MatRef) {
    check_same((r.rows, r.cols), (b.rows, b.cols));
    for (r, &b) in r.data.iter_mut().zip(b.data) {
        *r += b;
    }
}

/// R = A * B, for R in [n x m], A in [n x p], B in [p x m].
///
/// # Panics
///
/// Panics if the dimensions of the three matrices don't match.
#[track_caller]
pub fn mul(r: MatMut, a: MatRef, b: MatRef) {
    assert!(
        r.rows == a.rows && r.cols == b.cols && a.cols == b.rows,
        "matrix dimensions do not match: {:?} = {:?} * {:?}",
        (r.rows, r.cols),
        (a.rows, a.cols),
        (b.rows, b.cols),
    );
    let mut i = 0;
    for j in 0..a.rows {
        for k in 0..b.cols {
            let mut sum = 0.0;
            for l in 0..a.cols {
                sum += a.at(j, l) * b.at(l, k);
            }
            r.data[i] = sum;
            i += 1;
        }
    }
}

/// R = A + B * C, for R, A in [n x m], B in [n x p], C in [p x m].
///
/// # Panics
///
/// Panics if the dimensions of the four matrices don't match.
#[track_caller]
pub fn add_mul(r: MatMut, a: MatRef, b: MatRef, c: MatRef) {
    check_same((r.rows, r.cols), (a.rows, a.cols));
    assert!(
        a.rows == b.rows && a.cols == c.cols && b.cols == c.rows,
        "matrix dimensions do not match: {:?} + {:?} * {:?}",
        (a.rows, a.cols),
        (b.rows, b.cols),
        (c.rows, c.cols),
    );
    let mut i = 0;
    for j in 0..b.rows {
        for k in 0..c.cols {
            let mut sum = a.data[i];
            for l in 0..b.cols {
                sum += b.at(j, l) * c.at(l, k);
            }
            r.data[i] = sum;
            i += 1;
        }
    }
}

/// R += B * C, for R in [n x m], B in [n x p], C in [p x m].
///
/// # Panics
///
/// Panics if the dimensions of the three matrices don't match.
#[track_caller]
pub fn add_mul_assign(r: MatMut, b: MatRef, c: MatRef) {
    assert!(
        r.rows == b.rows && r.cols == c.cols && b.cols == c.rows,
        "matrix dimensions do not match: {:?} += {:?} * {:?}",
        (r.rows, r.cols),
        (b.rows, b.cols),
        (c.rows, c.cols),
    );
    let mut i = 0;
    for j in 0..b.rows {
        for k in 0..c.cols {
            let mut sum = r.data[i];
            for l in 0..b.cols {
                sum += b.at(j, l) * c.at(l, k);
            }
            r.data[i] = sum;
            i += 1;
        }
    }
}

/// R = A + s * B, for R, A, B in [n x m].
///
/// # Panics
///
/// Panics if the dimensions of the three matrices don't match.
#[track_caller]
pub fn add_smul(r: MatMut, a: MatRef, s: f64, b: MatRef) {
    check_same((r.rows, r.cols), (a.rows, a.cols));
    check_same((a.rows, a.cols), (b.rows, b.cols));
    for (r, (&a, &b)) in r.data.iter_mut().zip(a.data.iter().zip(b.data)) {
        *r = a + s * b;
    }
}

/// R += s * B, for R, B in [n x m].
///
/// # Panics
///
/// Panics if the dimensions of the two matrices don't match.
#[track_caller]
pub fn add_smul_assign(r: MatMut, s: f64, b: MatRef) {
    check_same((r.rows, r.cols), (b.rows, b.cols));
    for (r, &b) in r.data.iter_mut().zip(b.data) {
        *r += s * b;
    }
}

/// R = s * A, for R, A in [n x m].
///
/// # Panics
///
/// Panics if the dimensions of the two matrices don't match.
#[track_caller]
pub fn smul(r: MatMut, s: f64, a: MatRef) {
    check_same((r.rows, r.cols), (a.rows, a.cols));
    for (r, &a) in r.data.iter_mut().zip(a.data) {
        *r = s * a;
    }
}

/// R *= s.
pub fn scale(r: MatMut, s: f64) {
    for r in r.data.iter_mut() {
        *r *= s;
    }
}

/// R = A ⊙ B (Hadamard product), for R, A, B in [n x m].
///
/// # Panics
///
/// Panics if the dimensions of the three matrices don't match.
#[track_caller]
pub fn hmul(r: MatMut, a: MatRef, b: MatRef) {
    check_same((r.rows, r.cols), (a.rows, a.cols));
    check_same((a.rows, a.cols), (b.rows, b.cols));
    for (r, (&a, &b)) in r.data.iter_mut().zip(a.data.iter().zip(b.data)) {
        *r = a * b;
    }
}

/// R ⊙= B, for R, B in [n x m].
///
/// # Panics
///
/// Panics if the dimensions of the two matrices don't match.
#[track_caller]
pub fn hmul_assign(r: MatMut, b: MatRef) {
    check_same((r.rows, r.cols), (b.rows, b.cols));
    for (r, &b) in r.data.iter_mut().zip(b.data) {
        *r *= b;
    }
}

/// R[i][j] = fn(A[i][j]).
///
/// # Panics
///
/// Panics if the dimensions of the two matrices don't match.
#[track_caller]
pub fn apply(r: MatMut, a: MatRef, f: impl Fn(f64) -> f64) {
    check_same((r.rows, r.cols), (a.rows, a.cols));
    for (r, &a) in r.data.iter_mut().zip(a.data) {
        *r = f(a);
    }
}

/// R[i][j] = fn(R[i][j]).
pub fn apply_assign(r: MatMut, f: impl Fn(f64) -> f64) {
    for r in r.data.iter_mut() {
        *r = f(*r);
    }
}

/// A^T * B for A, B of the same dimensions, i.e., the sum of the elementwise
/// product. The operands are treated as vectors even when they aren't.
///
/// # Panics
///
/// Panics if the dimensions of the two matrices don't match.
#[track_caller]
pub fn dot(a: MatRef, b: MatRef) -> f64 {
    check_same((a.rows, a.cols), (b.rows, b.cols));
    let mut sum = 0.0;
    for (&a, &b) in a.data.iter().zip(b.data) {
        sum += a * b;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::prelude::*;

    #[test]
    fn construction_invariant() {
        let m = Mat::new(3, 4);
        assert_eq!(m.dim(), (3, 4));
        assert_eq!(m.data().len(), 12);
        assert!(m.data().iter().all(|&x| x == 0.0));

        let v = Mat::col_from(vec![1.0, 2.0, 3.0]);
        assert_eq!(v.dim(), (3, 1));
    }

    #[test]
    #[should_panic(expected = "does not match matrix size")]
    fn construction_rejects_wrong_length() {
        let _ = Mat::from_data(2, 2, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn indexing_is_row_major() {
        let m = Mat::from_data(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.at(0, 2), 3.0);
        assert_eq!(m.at(1, 0), 4.0);
        assert_eq!(m[(1, 2)], 6.0);
    }

    #[test]
    #[should_panic(expected = "index out of range")]
    fn indexing_rejects_out_of_range() {
        let m = Mat::new(2, 2);
        let _ = m[(2, 0)];
    }

    #[test]
    fn mul_small_fixture() {
        // [1 2; 3 4] * [5; 6] = [17; 39]
        let a = Mat::from_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = Mat::col_from(vec![5.0, 6.0]);
        let mut r = Mat::col(2);
        mul(r.view_mut(), a.view(), b.view());
        assert_eq!(r.data(), &[17.0, 39.0]);
    }

    #[test]
    #[should_panic(expected = "matrix dimensions do not match")]
    fn mul_rejects_mismatched_dims() {
        let a = Mat::new(2, 3);
        let b = Mat::new(2, 3);
        let mut r = Mat::new(2, 3);
        mul(r.view_mut(), a.view(), b.view());
    }

    #[test]
    fn elementwise_ops() {
        let a = Mat::from_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = Mat::from_data(2, 2, vec![5.0, 6.0, 7.0, 8.0]);
        let mut r = Mat::new(2, 2);

        add(r.view_mut(), a.view(), b.view());
        assert_eq!(r.data(), &[6.0, 8.0, 10.0, 12.0]);

        hmul(r.view_mut(), a.view(), b.view());
        assert_eq!(r.data(), &[5.0, 12.0, 21.0, 32.0]);

        smul(r.view_mut(), 2.0, a.view());
        assert_eq!(r.data(), &[2.0, 4.0, 6.0, 8.0]);

        add_smul(r.view_mut(), a.view(), -1.0, b.view());
        assert_eq!(r.data(), &[-4.0, -4.0, -4.0, -4.0]);

        apply(r.view_mut(), a.view(), |x| x * x);
        assert_eq!(r.data(), &[1.0, 4.0, 9.0, 16.0]);

        assert_eq!(dot(a.view(), b.view()), 70.0);
    }

    #[test]
    fn in_place_ops_match_three_address_forms() {
        let a = Mat::from_data(2, 2, vec![1.0, -2.0, 3.0, 4.0]);
        let b = Mat::from_data(2, 2, vec![0.5, 6.0, -7.0, 8.0]);

        let mut r = a.clone();
        add_assign(r.view_mut(), b.view());
        let mut want = Mat::new(2, 2);
        add(want.view_mut(), a.view(), b.view());
        assert_eq!(r, want);

        let mut r = a.clone();
        hmul_assign(r.view_mut(), b.view());
        hmul(want.view_mut(), a.view(), b.view());
        assert_eq!(r, want);

        let mut r = a.clone();
        add_smul_assign(r.view_mut(), 0.25, b.view());
        add_smul(want.view_mut(), a.view(), 0.25, b.view());
        assert_eq!(r, want);

        let mut r = a.clone();
        add_mul_assign(r.view_mut(), a.view(), b.view());
        add_mul(want.view_mut(), a.view(), a.view(), b.view());
        assert_eq!(r, want);

        let mut r = a.clone();
        scale(r.view_mut(), 3.0);
        smul(want.view_mut(), 3.0, a.view());
        assert_eq!(r, want);
    }

    #[test]
    fn zero_and_assign() {
        let a = Mat::from_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let mut r = Mat::new(2, 2);
        assign(r.view_mut(), a.view());
        assert_eq!(r, a);
        zero(r.view_mut());
        assert!(r.data().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn as_row_reshapes_in_place() {
        let v = Mat::col_from(vec![1.0, 2.0, 3.0]);
        let row = v.view().as_row();
        assert_eq!((row.rows(), row.cols()), (1, 3));
        assert_eq!(row.at(0, 2), 3.0);
    }

    fn random_mat(rng: &mut impl Rng, rows: usize, cols: usize) -> Mat {
        let data: Vec<f64> = (0..rows * cols).map(|_| rng.random_range(-2.0..2.0)).collect();
        Mat::from_data(rows, cols, data)
    }

    #[test]
    fn mul_distributes_over_add() {
        let mut rng = StdRng::seed_from_u64(0x6d6c70);
        for &(n, p, m) in &[(1, 1, 1), (2, 3, 4), (5, 2, 5), (7, 7, 1)] {
            let a = random_mat(&mut rng, n, p);
            let b = random_mat(&mut rng, n, p);
            let c = random_mat(&mut rng, p, m);

            let lhs = &(&a + &b) * &c;
            let rhs = &(&a * &c) + &(&b * &c);
            for (x, y) in lhs.data().iter().zip(rhs.data()) {
                assert!((x - y).abs() < 1e-12, "{x} != {y}");
            }
        }
    }

    #[test]
    fn mul_matches_faer() {
        let mut rng = StdRng::seed_from_u64(0xfae5);
        let a = random_mat(&mut rng, 4, 6);
        let b = random_mat(&mut rng, 6, 3);
        let got = &a * &b;

        let fa = faer::Mat::from_fn(4, 6, |i, j| a.at(i, j));
        let fb = faer::Mat::from_fn(6, 3, |i, j| b.at(i, j));
        let mut want = faer::Mat::<f64>::zeros(4, 3);
        faer::linalg::matmul::matmul(
            want.as_mut(),
            faer::Accum::Replace,
            fa.as_ref(),
            fb.as_ref(),
            1.0,
            faer::Par::Seq,
        );
        for i in 0..4 {
            for j in 0..3 {
                assert!((got.at(i, j) - want.as_ref()[(i, j)]).abs() < 1e-12);
            }
        }
    }
}
