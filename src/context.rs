//! Process-wide cuBLAS context handle and fatal error policy.
//!
//! The cuBLAS runtime wants exactly one handle per process: creating a
//! handle spins up device state and repeated creation is both expensive and
//! a correctness hazard. [`BlasContext`] is that handle, lazily constructed
//! behind a `OnceLock` accessor on first use and shared by every
//! [`DeviceMatrix`](crate::DeviceMatrix) operation afterwards.
//!
//! The statics are never dropped; the CUDA driver reclaims the primary
//! context when the process exits. That realizes "destroyed once at process
//! teardown" without betting on static-destruction ordering.

use std::sync::{Arc, OnceLock};

use cudarc::cublas::CudaBlas;
use cudarc::driver::CudaDevice;

/// Check if verbose diagnostics are enabled (`MATRIZ_VERBOSE=1`).
/// Default is quiet - only fatal errors are printed.
pub(crate) fn verbose() -> bool {
    static VERBOSE: OnceLock<bool> = OnceLock::new();
    *VERBOSE.get_or_init(|| std::env::var("MATRIZ_VERBOSE").is_ok())
}

/// Device ordinal selection (`MATRIZ_DEVICE=n`), read once. Default 0.
fn device_ordinal() -> usize {
    static ORDINAL: OnceLock<usize> = OnceLock::new();
    *ORDINAL.get_or_init(|| {
        std::env::var("MATRIZ_DEVICE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    })
}

/// Report an unrecoverable device/runtime failure and abort.
///
/// Device state after a failed driver or cuBLAS call is unspecified, so
/// there is no safe continuation: print a diagnostic identifying the failing
/// call and take the process down.
pub(crate) fn fatal(call: &str, detail: impl std::fmt::Display) -> ! {
    eprintln!("matriz: fatal: {call}: {detail}");
    std::process::abort();
}

/// The process-wide cuBLAS context: a CUDA device plus the cuBLAS handle
/// bound to it.
///
/// All BLAS calls in the crate are issued through this handle. It is
/// read-only after construction; concurrent use of a single
/// [`DeviceMatrix`](crate::DeviceMatrix) still requires external
/// serialization by the caller.
pub struct BlasContext {
    device: Arc<CudaDevice>,
    blas: CudaBlas,
}

impl BlasContext {
    /// Get the global context, constructing it on first call.
    ///
    /// Aborts the process if no usable CUDA device exists: context creation
    /// failure is a device/runtime failure with no recovery path.
    pub fn global() -> &'static Self {
        match Self::try_global() {
            Some(ctx) => ctx,
            None => fatal("cublasCreate", "no usable CUDA device"),
        }
    }

    /// Get the global context if a CUDA device is usable, without aborting.
    ///
    /// The probe runs once; later calls return the cached outcome.
    pub fn try_global() -> Option<&'static Self> {
        static CONTEXT: OnceLock<Option<BlasContext>> = OnceLock::new();
        CONTEXT
            .get_or_init(|| {
                let ordinal = device_ordinal();
                let device = match CudaDevice::new(ordinal) {
                    Ok(device) => device,
                    Err(err) => {
                        if verbose() {
                            eprintln!("matriz: cuInit/cuDeviceGet({ordinal}): {err:?}");
                        }
                        return None;
                    }
                };
                let blas = match CudaBlas::new(device.clone()) {
                    Ok(blas) => blas,
                    Err(err) => {
                        if verbose() {
                            eprintln!("matriz: cublasCreate: {err:?}");
                        }
                        return None;
                    }
                };
                if verbose() {
                    eprintln!("matriz: cuBLAS context ready on device {ordinal}");
                }
                Some(BlasContext { device, blas })
            })
            .as_ref()
    }

    /// The CUDA device the context is bound to.
    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// The cuBLAS handle wrapper.
    pub(crate) fn blas(&self) -> &CudaBlas {
        &self.blas
    }

    /// Block until all work issued on the context's stream has completed.
    ///
    /// Readback entry points synchronize implicitly; this is for timing
    /// harnesses that need an explicit barrier around kernel launches.
    pub fn synchronize(&self) {
        if let Err(err) = self.device.synchronize() {
            fatal("cuStreamSynchronize", format!("{err:?}"));
        }
    }
}

/// Check whether a CUDA device and cuBLAS handle are usable in this process.
///
/// The first call performs the lazy context construction probe; the result
/// is cached. Tests use this to skip GPU-bound cases on machines without a
/// device.
pub fn cuda_available() -> bool {
    BlasContext::try_global().is_some()
}
