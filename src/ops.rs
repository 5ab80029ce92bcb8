//! Dimension-checked free functions and operator syntax.
//!
//! The free functions own the contract layer: they derive effective
//! (transpose-aware) shapes through [`DeviceMatrix::effective_shape`],
//! assert compatibility, resize the output, and delegate to the thin BLAS
//! wrappers. The operator impls are sugar over the same paths; operators
//! that build a fresh result swap it into the destination.
//!
//! A dimension mismatch is a caller error and fails the assertion; there
//! is no recoverable path, consistent with the crate-wide error policy.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

use crate::blas::BlasScalar;
use crate::matrix::DeviceMatrix;

/// `C := op(A) * op(B)`: gemm with the default multipliers
/// `alpha = 1`, `beta = 0`, i.e. `C` is fully overwritten.
///
/// `C` is resized to the product shape first; do not pre-size it expecting
/// the shape to survive.
pub fn gemm<T: BlasScalar>(a: &DeviceMatrix<T>, b: &DeviceMatrix<T>, c: &mut DeviceMatrix<T>) {
    gemm_scaled(a, b, c, T::one(), T::zero());
}

/// `C := alpha*op(A)*op(B) + beta*C`.
///
/// Effective shapes: `op(A)` is `m x n`, `op(B)` is `k x l`; requires
/// `n == k`. `C` is resized to `m x l` and its transpose flag cleared (a
/// full overwrite stores an untransposed result). With `beta != 0` the
/// caller must have sized `C` compatibly so its contents survive the
/// resize.
pub fn gemm_scaled<T: BlasScalar>(
    a: &DeviceMatrix<T>,
    b: &DeviceMatrix<T>,
    c: &mut DeviceMatrix<T>,
    alpha: T,
    beta: T,
) {
    let (m, n) = a.effective_shape();
    let (k, l) = b.effective_shape();
    assert_eq!(
        n, k,
        "gemm inner dimensions do not match: {m}x{n} * {k}x{l}"
    );
    c.resize(m, l);
    c.set_untransposed();
    if m == 0 || l == 0 {
        return;
    }
    if k == 0 {
        // op(A)*op(B) is an empty sum: C := beta*C.
        if beta == T::zero() {
            c.fill(T::zero());
        } else {
            c.scale(beta);
        }
        return;
    }

    let (lda, ldb, ldc) = (a.lda(), b.lda(), c.lda());
    let (transa, transb) = (a.op(), b.op());
    let a_buf = a.data().expect("non-empty operand has a buffer");
    let b_buf = b.data().expect("non-empty operand has a buffer");
    let c_buf = c.data_mut().expect("resized output has a buffer");
    // SAFETY: shapes validated above; resize sized C to m*l and the leading
    // dimensions are the operands' physical row counts.
    unsafe {
        DeviceMatrix::gemm(
            transa, transb, m as i32, l as i32, k as i32, alpha, a_buf, lda, b_buf, ldb, beta,
            c_buf, ldc,
        );
    }
}

/// `C := op(A) + op(B)`: geam with the default multipliers
/// `alpha = beta = 1`, i.e. a plain elementwise sum.
pub fn geam<T: BlasScalar>(a: &DeviceMatrix<T>, b: &DeviceMatrix<T>, c: &mut DeviceMatrix<T>) {
    geam_scaled(a, b, c, T::one(), T::one());
}

/// `C := alpha*op(A) + beta*op(B)`.
///
/// The effective shapes of `A` and `B` must be equal; `C` is resized to
/// that shape and its transpose flag cleared.
pub fn geam_scaled<T: BlasScalar>(
    a: &DeviceMatrix<T>,
    b: &DeviceMatrix<T>,
    c: &mut DeviceMatrix<T>,
    alpha: T,
    beta: T,
) {
    let (m, n) = a.effective_shape();
    let (k, l) = b.effective_shape();
    assert!(
        m == k && n == l,
        "geam operand shapes do not match: {m}x{n} vs {k}x{l}"
    );
    c.resize(m, n);
    c.set_untransposed();
    if m == 0 || n == 0 {
        return;
    }

    let (lda, ldb, ldc) = (a.lda(), b.lda(), c.lda());
    let (transa, transb) = (a.op(), b.op());
    let a_buf = a.data().expect("non-empty operand has a buffer");
    let b_buf = b.data().expect("non-empty operand has a buffer");
    let c_buf = c.data_mut().expect("resized output has a buffer");
    // SAFETY: shapes validated above, output sized to m*n.
    unsafe {
        DeviceMatrix::geam(
            transa, transb, m as i32, n as i32, alpha, a_buf, lda, beta, b_buf, ldb, c_buf, ldc,
        );
    }
}

/// Euclidean 2-norm over all live elements, treated as a flat vector.
///
/// Invariant under the transpose flag. Empty matrix yields 0.
pub fn nrm2<T: BlasScalar>(a: &DeviceMatrix<T>) -> T {
    if a.is_empty() {
        return T::zero();
    }
    let buf = a.data().expect("non-empty matrix has a buffer");
    // SAFETY: the buffer holds at least `size` live elements.
    unsafe { DeviceMatrix::nrm2(a.size() as i32, buf, 1) }
}

// ---------------------------------------------------------------------
// Matrix-matrix operators
// ---------------------------------------------------------------------

impl<'a, 'b, T: BlasScalar> Add<&'b DeviceMatrix<T>> for &'a DeviceMatrix<T> {
    type Output = DeviceMatrix<T>;

    fn add(self, rhs: &'b DeviceMatrix<T>) -> DeviceMatrix<T> {
        let mut out = DeviceMatrix::new();
        geam(self, rhs, &mut out);
        out
    }
}

impl<'a, 'b, T: BlasScalar> Sub<&'b DeviceMatrix<T>> for &'a DeviceMatrix<T> {
    type Output = DeviceMatrix<T>;

    fn sub(self, rhs: &'b DeviceMatrix<T>) -> DeviceMatrix<T> {
        let mut out = DeviceMatrix::new();
        geam_scaled(self, rhs, &mut out, T::one(), -T::one());
        out
    }
}

impl<'a, 'b, T: BlasScalar> Mul<&'b DeviceMatrix<T>> for &'a DeviceMatrix<T> {
    type Output = DeviceMatrix<T>;

    fn mul(self, rhs: &'b DeviceMatrix<T>) -> DeviceMatrix<T> {
        let mut out = DeviceMatrix::new();
        gemm(self, rhs, &mut out);
        out
    }
}

// Compound assignment builds a fresh result and swaps: cuBLAS forbids
// in-place geam/gemm on a transposed destination, and the swap keeps the
// left-hand side untouched if anything faults before completion.

impl<T: BlasScalar> AddAssign<&DeviceMatrix<T>> for DeviceMatrix<T> {
    fn add_assign(&mut self, rhs: &DeviceMatrix<T>) {
        let mut out = DeviceMatrix::new();
        geam(self, rhs, &mut out);
        self.swap(&mut out);
    }
}

impl<T: BlasScalar> SubAssign<&DeviceMatrix<T>> for DeviceMatrix<T> {
    fn sub_assign(&mut self, rhs: &DeviceMatrix<T>) {
        let mut out = DeviceMatrix::new();
        geam_scaled(self, rhs, &mut out, T::one(), -T::one());
        self.swap(&mut out);
    }
}

impl<T: BlasScalar> MulAssign<&DeviceMatrix<T>> for DeviceMatrix<T> {
    fn mul_assign(&mut self, rhs: &DeviceMatrix<T>) {
        let mut out = DeviceMatrix::new();
        gemm(self, rhs, &mut out);
        self.swap(&mut out);
    }
}

// ---------------------------------------------------------------------
// Matrix-scalar operators
// ---------------------------------------------------------------------

impl<'a, T: BlasScalar> Add<T> for &'a DeviceMatrix<T> {
    type Output = DeviceMatrix<T>;

    fn add(self, value: T) -> DeviceMatrix<T> {
        let mut out = self.clone();
        out.add_scalar(value);
        out
    }
}

impl<'a, T: BlasScalar> Sub<T> for &'a DeviceMatrix<T> {
    type Output = DeviceMatrix<T>;

    fn sub(self, value: T) -> DeviceMatrix<T> {
        let mut out = self.clone();
        out.add_scalar(-value);
        out
    }
}

impl<'a, T: BlasScalar> Mul<T> for &'a DeviceMatrix<T> {
    type Output = DeviceMatrix<T>;

    fn mul(self, alpha: T) -> DeviceMatrix<T> {
        let mut out = self.clone();
        out.scale(alpha);
        out
    }
}

impl<'a, T: BlasScalar> Div<T> for &'a DeviceMatrix<T> {
    type Output = DeviceMatrix<T>;

    fn div(self, alpha: T) -> DeviceMatrix<T> {
        let mut out = self.clone();
        out.scale(T::one() / alpha);
        out
    }
}

impl<T: BlasScalar> AddAssign<T> for DeviceMatrix<T> {
    fn add_assign(&mut self, value: T) {
        self.add_scalar(value);
    }
}

impl<T: BlasScalar> SubAssign<T> for DeviceMatrix<T> {
    fn sub_assign(&mut self, value: T) {
        self.add_scalar(-value);
    }
}

impl<T: BlasScalar> MulAssign<T> for DeviceMatrix<T> {
    fn mul_assign(&mut self, alpha: T) {
        self.scale(alpha);
    }
}

impl<T: BlasScalar> DivAssign<T> for DeviceMatrix<T> {
    fn div_assign(&mut self, alpha: T) {
        self.scale(T::one() / alpha);
    }
}

// Scalar-on-the-left forms. The orphan rule keeps these per-type.
macro_rules! scalar_lhs_ops {
    ($($t:ty),*) => {$(
        impl<'a> Add<&'a DeviceMatrix<$t>> for $t {
            type Output = DeviceMatrix<$t>;

            fn add(self, m: &'a DeviceMatrix<$t>) -> DeviceMatrix<$t> {
                m + self
            }
        }

        impl<'a> Mul<&'a DeviceMatrix<$t>> for $t {
            type Output = DeviceMatrix<$t>;

            fn mul(self, m: &'a DeviceMatrix<$t>) -> DeviceMatrix<$t> {
                m * self
            }
        }

        impl<'a> Sub<&'a DeviceMatrix<$t>> for $t {
            type Output = DeviceMatrix<$t>;

            fn sub(self, m: &'a DeviceMatrix<$t>) -> DeviceMatrix<$t> {
                let mut out = m.clone();
                out.scale(-1.0);
                out.add_scalar(self);
                out
            }
        }
    )*};
}

scalar_lhs_ops!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    // Host-only coverage: empty operands never touch the device, so the
    // contract layer is testable anywhere.

    #[test]
    fn gemm_of_empty_matrices_is_empty() {
        let a = DeviceMatrix::<f32>::new();
        let b = DeviceMatrix::<f32>::new();
        let mut c = DeviceMatrix::<f32>::new();
        gemm(&a, &b, &mut c);
        assert!(c.is_empty());
        assert!(!c.is_transposed());
    }

    #[test]
    fn geam_of_empty_matrices_is_empty() {
        let a = DeviceMatrix::<f64>::new();
        let b = DeviceMatrix::<f64>::new();
        let mut c = DeviceMatrix::<f64>::new();
        geam(&a, &b, &mut c);
        assert!(c.is_empty());
    }

    #[test]
    fn nrm2_of_empty_is_zero() {
        let a = DeviceMatrix::<f32>::new();
        assert_eq!(nrm2(&a), 0.0);
    }

    #[test]
    fn gemm_clears_output_transpose_flag() {
        let a = DeviceMatrix::<f32>::new();
        let b = DeviceMatrix::<f32>::new();
        let mut c = DeviceMatrix::<f32>::new();
        c.transpose();
        gemm(&a, &b, &mut c);
        assert!(!c.is_transposed());
    }
}
