//! Integration tests for the device matrix core.
//!
//! Every test that touches the GPU guards on `cuda_available()` and runs
//! serially: the cuBLAS handle is a shared process-wide resource and the
//! tests intentionally exercise it from one thread, which is the supported
//! model.

use matriz::{cuda_available, geam, geam_scaled, gemm, gemm_scaled, nrm2, DeviceMatrix};
use serial_test::serial;

fn gpu() -> bool {
    cuda_available()
}

fn assert_close(got: &[f32], want: &[f32], tol: f32) {
    assert_eq!(got.len(), want.len(), "length mismatch");
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        assert!(
            (g - w).abs() <= tol,
            "element {i}: got {g}, want {w} (tol {tol})"
        );
    }
}

/// Host reference for column-major gemm over effective shapes.
fn host_gemm(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    for j in 0..n {
        for i in 0..m {
            let mut acc = 0.0;
            for p in 0..k {
                acc += a[i + p * m] * b[p + j * k];
            }
            c[i + j * m] = acc;
        }
    }
    c
}

// ============================================================================
// Norm
// ============================================================================

#[test]
#[serial]
fn nrm2_matches_host_norm() {
    if !gpu() {
        return;
    }
    let data = [1.0f32, -2.0, 3.0, -4.0, 5.0, -6.0];
    let a = DeviceMatrix::from_host(&data, 2, 3);
    let want = data.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((nrm2(&a) - want).abs() < 1e-5);
}

#[test]
#[serial]
fn nrm2_is_transpose_invariant() {
    if !gpu() {
        return;
    }
    let mut a = DeviceMatrix::from_host(&[3.0f32, 4.0, 0.0, 12.0], 2, 2);
    let plain = nrm2(&a);
    a.transpose();
    assert!((nrm2(&a) - plain).abs() < 1e-6);
    assert_eq!(plain, 13.0);
}

// ============================================================================
// gemm
// ============================================================================

#[test]
#[serial]
fn gemm_known_product() {
    if !gpu() {
        return;
    }
    // A = [[1,2,3],[4,5,6]] (2x3), B = [[1,0],[0,1],[1,1]] (3x2).
    let a = DeviceMatrix::from_host(&[1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0], 2, 3);
    let b = DeviceMatrix::from_host(&[1.0f32, 0.0, 1.0, 0.0, 1.0, 1.0], 3, 2);
    let mut c = DeviceMatrix::new();
    gemm(&a, &b, &mut c);
    assert_eq!((c.rows(), c.cols()), (2, 2));
    // C = [[4,5],[10,11]], column-major [4,10,5,11].
    assert_close(&c.to_vec(), &[4.0, 10.0, 5.0, 11.0], 1e-5);
}

#[test]
#[serial]
fn gemm_matches_host_reference() {
    if !gpu() {
        return;
    }
    let (m, k, n) = (5, 7, 4);
    let a_host: Vec<f32> = (0..m * k).map(|i| (i as f32 * 0.37).sin()).collect();
    let b_host: Vec<f32> = (0..k * n).map(|i| (i as f32 * 0.91).cos()).collect();
    let a = DeviceMatrix::from_host(&a_host, m, k);
    let b = DeviceMatrix::from_host(&b_host, k, n);
    let mut c = DeviceMatrix::new();
    gemm(&a, &b, &mut c);
    assert_close(&c.to_vec(), &host_gemm(&a_host, &b_host, m, k, n), 1e-4);
}

#[test]
#[serial]
fn transpose_view_gemm_equals_physical_transpose() {
    if !gpu() {
        return;
    }
    // A = 2x3; compute the Gram matrix A^T * A through the view.
    let a_host = [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0];
    let mut a = DeviceMatrix::from_host(&a_host, 2, 3);
    let a_copy = DeviceMatrix::from_host(&a_host, 2, 3);

    a.transpose();
    let mut gram = DeviceMatrix::new();
    gemm(&a, &a_copy, &mut gram);
    a.transpose(); // restore the view

    assert_eq!((gram.rows(), gram.cols()), (3, 3));

    // Physically transposed data: A^T is 3x2, column-major = row-major of A.
    let at_host = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    let at = DeviceMatrix::from_host(&at_host, 3, 2);
    let mut gram_physical = DeviceMatrix::new();
    gemm(&at, &a_copy, &mut gram_physical);

    assert_close(&gram.to_vec(), &gram_physical.to_vec(), 1e-5);

    // The lazy transpose must never have rearranged A's storage.
    assert_eq!(a.to_vec(), a_host.to_vec());
}

#[test]
#[serial]
fn gemm_scaled_accumulates_with_beta() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::from_host(&[1.0f32, 0.0, 0.0, 1.0], 2, 2); // identity
    let b = DeviceMatrix::from_host(&[1.0f32, 2.0, 3.0, 4.0], 2, 2);
    let mut c = DeviceMatrix::zeros(2, 2);
    c.fill(10.0);
    // C := 2*I*B + 1*C = 2B + 10.
    gemm_scaled(&a, &b, &mut c, 2.0, 1.0);
    assert_close(&c.to_vec(), &[12.0, 14.0, 16.0, 18.0], 1e-5);
}

#[test]
#[serial]
fn gemm_resizes_incompatible_output() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::from_host(&[1.0f32, 2.0], 2, 1);
    let b = DeviceMatrix::from_host(&[3.0f32], 1, 1);
    let mut c = DeviceMatrix::zeros(7, 7); // wrong shape, gets overwritten
    gemm(&a, &b, &mut c);
    assert_eq!((c.rows(), c.cols()), (2, 1));
    assert!(c.capacity() >= 49, "capacity is a high-water mark");
    assert_close(&c.to_vec(), &[3.0, 6.0], 1e-6);
}

#[test]
#[serial]
fn gemm_rejects_mismatched_inner_dimensions() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::<f32>::zeros(2, 3);
    let b = DeviceMatrix::<f32>::zeros(2, 3); // 3 != 2
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut c = DeviceMatrix::new();
        gemm(&a, &b, &mut c);
    }));
    assert!(outcome.is_err(), "mismatched inner dimensions must panic");
}

#[test]
#[serial]
fn gemm_double_precision() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::from_host(&[1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0], 2, 3);
    let b = DeviceMatrix::from_host(&[1.0f64, 0.0, 1.0, 0.0, 1.0, 1.0], 3, 2);
    let mut c = DeviceMatrix::new();
    gemm(&a, &b, &mut c);
    let got = c.to_vec();
    let want = [4.0f64, 10.0, 5.0, 11.0];
    for (g, w) in got.iter().zip(&want) {
        assert!((g - w).abs() < 1e-12);
    }
}

// ============================================================================
// geam
// ============================================================================

#[test]
#[serial]
fn geam_is_elementwise_sum_by_default() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::from_host(&[1.0f32, 2.0, 3.0, 4.0], 2, 2);
    let b = DeviceMatrix::from_host(&[10.0f32, 20.0, 30.0, 40.0], 2, 2);
    let mut c = DeviceMatrix::new();
    geam(&a, &b, &mut c);
    assert_close(&c.to_vec(), &[11.0, 22.0, 33.0, 44.0], 1e-6);
}

#[test]
#[serial]
fn geam_applies_transpose_views() {
    if !gpu() {
        return;
    }
    // A is 2x3; B is 3x2 but viewed transposed, so effective shapes match.
    let a = DeviceMatrix::from_host(&[1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0], 2, 3);
    let mut b = DeviceMatrix::from_host(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2);
    b.transpose();
    let mut c = DeviceMatrix::new();
    geam(&a, &b, &mut c);
    assert_eq!((c.rows(), c.cols()), (2, 3));
    // B^T = [[1,2,3],[4,5,6]] column-major [1,4,2,5,3,6]; sum doubles A.
    assert_close(&c.to_vec(), &[2.0, 8.0, 4.0, 10.0, 6.0, 12.0], 1e-6);
}

#[test]
#[serial]
fn geam_scaled_forms_differences() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::from_host(&[5.0f32, 6.0, 7.0, 8.0], 2, 2);
    let b = DeviceMatrix::from_host(&[1.0f32, 2.0, 3.0, 4.0], 2, 2);
    let mut c = DeviceMatrix::new();
    geam_scaled(&a, &b, &mut c, 1.0, -1.0);
    assert_close(&c.to_vec(), &[4.0; 4], 1e-6);
}

#[test]
#[serial]
fn geam_rejects_shape_mismatch() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::<f32>::zeros(2, 3);
    let b = DeviceMatrix::<f32>::zeros(3, 2);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut c = DeviceMatrix::new();
        geam(&a, &b, &mut c);
    }));
    assert!(outcome.is_err(), "mismatched shapes must panic");
}

// ============================================================================
// Memory laws
// ============================================================================

#[test]
#[serial]
fn resize_within_capacity_does_not_reallocate() {
    if !gpu() {
        return;
    }
    let mut m = DeviceMatrix::<f32>::zeros(6, 6);
    assert_eq!(m.capacity(), 36);
    m.resize(3, 4);
    assert_eq!((m.rows(), m.cols()), (3, 4));
    assert_eq!(m.capacity(), 36);
    m.resize(2, 2);
    assert_eq!(m.capacity(), 36);
    m.resize(6, 7);
    assert_eq!(m.capacity(), 42);
}

#[test]
#[serial]
fn copy_produces_independent_buffers() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::from_host(&[1.0f32, 2.0, 3.0, 4.0], 2, 2);
    let mut b = a.clone();
    assert_eq!((b.rows(), b.cols()), (2, 2));
    assert_eq!(b.to_vec(), a.to_vec());
    b.fill(0.0);
    assert_eq!(a.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
}

// ============================================================================
// File round trip
// ============================================================================

#[test]
#[serial]
fn save_then_load_round_trips() {
    if !gpu() {
        return;
    }
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("a.mat");

    let a = DeviceMatrix::from_host(&[1.5f32, 4.25, -2.0, 5.0, 3.125, -6.5], 2, 3);
    a.save(&path);

    let b = DeviceMatrix::<f32>::from_file(&path);
    assert_eq!((b.rows(), b.cols()), (2, 3));
    assert_eq!(b.to_vec(), a.to_vec());
}

#[test]
#[serial]
fn save_of_transposed_view_round_trips_the_effective_matrix() {
    if !gpu() {
        return;
    }
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("at.mat");

    let mut a = DeviceMatrix::from_host(&[1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0], 2, 3);
    a.transpose(); // effective 3x2
    a.save(&path);

    let b = DeviceMatrix::<f32>::from_file(&path);
    assert_eq!((b.rows(), b.cols()), (3, 2));
    // Loaded matrix stores the effective view physically.
    assert_eq!(b.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

// ============================================================================
// Operator surface
// ============================================================================

#[test]
#[serial]
fn operator_forms_match_free_functions() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::from_host(&[1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0], 2, 3);
    let b = DeviceMatrix::from_host(&[1.0f32, 0.0, 1.0, 0.0, 1.0, 1.0], 3, 2);

    let product = &a * &b;
    let mut c = DeviceMatrix::new();
    gemm(&a, &b, &mut c);
    assert_eq!(product.to_vec(), c.to_vec());

    let sum = &a + &a;
    let mut d = DeviceMatrix::new();
    geam(&a, &a, &mut d);
    assert_eq!(sum.to_vec(), d.to_vec());

    let difference = &sum - &a;
    assert_close(&difference.to_vec(), &a.to_vec(), 1e-6);
}

#[test]
#[serial]
fn scalar_operators_broadcast() {
    if !gpu() {
        return;
    }
    let a = DeviceMatrix::from_host(&[1.0f32, 2.0, 3.0, 4.0], 2, 2);

    assert_close(&(&a + 1.0).to_vec(), &[2.0, 3.0, 4.0, 5.0], 1e-6);
    assert_close(&(&a - 1.0).to_vec(), &[0.0, 1.0, 2.0, 3.0], 1e-6);
    assert_close(&(&a * 2.0).to_vec(), &[2.0, 4.0, 6.0, 8.0], 1e-6);
    assert_close(&(&a / 2.0).to_vec(), &[0.5, 1.0, 1.5, 2.0], 1e-6);
    assert_close(&(1.0 + &a).to_vec(), &[2.0, 3.0, 4.0, 5.0], 1e-6);
    assert_close(&(2.0 * &a).to_vec(), &[2.0, 4.0, 6.0, 8.0], 1e-6);
    assert_close(&(10.0 - &a).to_vec(), &[9.0, 8.0, 7.0, 6.0], 1e-6);
}

#[test]
#[serial]
fn compound_assignment_updates_in_place() {
    if !gpu() {
        return;
    }
    let b = DeviceMatrix::from_host(&[1.0f32, 1.0, 1.0, 1.0], 2, 2);

    let mut a = DeviceMatrix::from_host(&[1.0f32, 2.0, 3.0, 4.0], 2, 2);
    a += &b;
    assert_close(&a.to_vec(), &[2.0, 3.0, 4.0, 5.0], 1e-6);
    a -= &b;
    assert_close(&a.to_vec(), &[1.0, 2.0, 3.0, 4.0], 1e-6);
    a *= 3.0;
    assert_close(&a.to_vec(), &[3.0, 6.0, 9.0, 12.0], 1e-6);
    a /= 3.0;
    assert_close(&a.to_vec(), &[1.0, 2.0, 3.0, 4.0], 1e-6);
    a += 0.5;
    assert_close(&a.to_vec(), &[1.5, 2.5, 3.5, 4.5], 1e-6);
    a -= 0.5;

    // Matrix product assignment: A *= I leaves A unchanged.
    let identity = DeviceMatrix::from_host(&[1.0f32, 0.0, 0.0, 1.0], 2, 2);
    a *= &identity;
    assert_close(&a.to_vec(), &[1.0, 2.0, 3.0, 4.0], 1e-5);
}

#[test]
#[serial]
fn add_assign_of_transposed_operand_goes_through_fresh_output() {
    if !gpu() {
        return;
    }
    // Self is viewed transposed: the result must land untransposed with the
    // effective shape, which only works via the build-then-swap path.
    let mut a = DeviceMatrix::from_host(&[1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0], 2, 3);
    a.transpose(); // effective 3x2
    let b = DeviceMatrix::from_host(&[1.0f32; 6], 3, 2);
    a += &b;
    assert!(!a.is_transposed());
    assert_eq!((a.rows(), a.cols()), (3, 2));
    // A^T row-major is [1,4,2,5,3,6] read down columns: [1,2,3,4,5,6] + 1.
    assert_close(&a.to_vec(), &[2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 1e-6);
}

// ============================================================================
// Remaining BLAS wrappers
// ============================================================================

#[test]
#[serial]
fn gemv_computes_matrix_vector_product() {
    if !gpu() {
        return;
    }
    // y := A*x with A = [[1,2,3],[4,5,6]].
    let a = DeviceMatrix::from_host(&[1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0], 2, 3);
    let x = DeviceMatrix::from_host(&[1.0f32, 1.0, 1.0], 3, 1);
    let mut y = DeviceMatrix::<f32>::zeros(2, 1);

    let a_buf = a.data().expect("buffer");
    let x_buf = x.data().expect("buffer");
    let y_buf = y.data_mut().expect("buffer");
    // SAFETY: A is 2x3 with lda 2; x has 3 elements, y has 2.
    unsafe {
        DeviceMatrix::gemv(a.op(), 2, 3, 1.0, a_buf, a.lda(), x_buf, 1, 0.0, y_buf, 1);
    }
    assert_close(&y.to_vec(), &[6.0, 15.0], 1e-5);
}

#[test]
#[serial]
fn fill_scale_and_add_scalar() {
    if !gpu() {
        return;
    }
    let mut m = DeviceMatrix::<f32>::zeros(4, 3);
    m.fill(2.0);
    assert_eq!(m.to_vec(), vec![2.0; 12]);
    m.scale(-1.5); // scal
    assert_close(&m.to_vec(), &[-3.0; 12], 1e-6);
    m.add_scalar(3.5); // axpy against the device unit scalar, stride 0
    assert_close(&m.to_vec(), &[0.5; 12], 1e-6);
}
