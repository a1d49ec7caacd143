use ndarray::{Array2, Array3, ArrayD, ArrayView2, ArrayView3, ArrayViewD, Ix2, Ix3};

use crate::errors::{OrganoidError, Result};

/// A 2D labeled mask: 0 = background, label N = region N.
pub type Mask2 = Array2<u32>;

/// A 3D labeled volume: 0 = background, label N = region N.
pub type Mask3 = Array3<u32>;

/// A labeled mask of dynamic rank, for seams that accept either 2D or 3D.
pub type MaskD = ArrayD<u32>;

/// Find the lowest non-zero label in a mask.
///
/// Multi-region masks are reduced to the first labeled region for
/// single-object analysis; this is a documented simplification, not
/// multi-instance support.
pub fn first_label(mask: ArrayViewD<'_, u32>) -> Result<u32> {
    mask.iter()
        .filter(|&&v| v != 0)
        .min()
        .copied()
        .ok_or(OrganoidError::NoRegionFound)
}

/// Extract the binary footprint of the first labeled region of a 2D mask.
pub fn first_region_2d(mask: &ArrayView2<'_, u32>) -> Result<Array2<bool>> {
    let label = first_label(mask.view().into_dyn())?;
    Ok(mask.mapv(|v| v == label))
}

/// Extract the binary footprint of the first labeled region of a 3D volume.
pub fn first_region_3d(volume: &ArrayView3<'_, u32>) -> Result<Array3<bool>> {
    let label = first_label(volume.view().into_dyn())?;
    Ok(volume.mapv(|v| v == label))
}

/// View a dynamic-rank mask as 2D, or fail with the actual rank.
pub fn as_2d<'a>(mask: &'a MaskD) -> Result<ArrayView2<'a, u32>> {
    mask.view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| OrganoidError::InvalidDimensionality(mask.ndim()))
}

/// View a dynamic-rank mask as 3D, or fail with the actual rank.
pub fn as_3d<'a>(mask: &'a MaskD) -> Result<ArrayView3<'a, u32>> {
    mask.view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| OrganoidError::InvalidDimensionality(mask.ndim()))
}
