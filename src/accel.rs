use ndarray::ArrayD;

use crate::errors::Result;

/// Opaque handle to an array resident in device memory.
///
/// Dropping the handle releases the device allocation, so transfers stay
/// leak-free on every exit path, including early returns on error.
pub struct DeviceArray {
    data: ArrayD<f64>,
}

/// Numeric accelerator collaborator.
///
/// `to_device` and `to_host` must be inverses up to the accelerator's native
/// numeric format. When no device is available the implementation must be a
/// deterministic pass-through, not a silently degraded one.
pub trait Accelerator: Send + Sync {
    fn is_available(&self) -> bool;

    fn to_device(&self, data: ArrayD<f64>) -> Result<DeviceArray>;

    fn to_host(&self, handle: DeviceArray) -> Result<ArrayD<f64>>;
}

/// Accelerator used when no compute device is present.
///
/// Transfers are pass-throughs: the host array is moved into the handle and
/// moved back out unchanged.
#[derive(Debug, Default)]
pub struct PassthroughAccelerator;

impl Accelerator for PassthroughAccelerator {
    fn is_available(&self) -> bool {
        false
    }

    fn to_device(&self, data: ArrayD<f64>) -> Result<DeviceArray> {
        Ok(DeviceArray { data })
    }

    fn to_host(&self, handle: DeviceArray) -> Result<ArrayD<f64>> {
        Ok(handle.data)
    }
}
