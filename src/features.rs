// src/features.rs - Morphology feature engine for labeled masks (2D and 3D)

use std::f64::consts::PI;
use std::sync::Arc;

use log::warn;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

use crate::accel::{Accelerator, PassthroughAccelerator};
use crate::errors::{OrganoidError, Result};
use crate::mask::{self, MaskD};
use crate::record::FeatureRecord;

/// Moore neighborhood in clockwise order, starting from the left neighbor.
const MOORE_NEIGHBORHOOD: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

const ENTROPY_EPSILON: f64 = 1e-10;

/// Computes shape and texture descriptors from labeled masks.
///
/// Masks with multiple labels are reduced to the first (lowest) labeled
/// region; this engine analyzes a single object per mask.
pub struct FeatureEngine {
    accel: Arc<dyn Accelerator>,
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureEngine {
    pub fn new() -> Self {
        Self {
            accel: Arc::new(PassthroughAccelerator),
        }
    }

    /// Use the given accelerator for device-side computation.
    pub fn with_accelerator(accel: Arc<dyn Accelerator>) -> Self {
        Self { accel }
    }

    /// Compute 2D shape and texture features from a labeled mask.
    pub fn compute_2d(&self, mask: &ArrayView2<'_, u32>) -> Result<FeatureRecord> {
        let region = mask::first_region_2d(mask)?;
        let region = self.device_round_trip_2d(region)?;

        let area = region.iter().filter(|&&v| v).count() as f64;

        let (centroid_row, centroid_col) = centroid_2d(&region);
        let (major_axis, minor_axis, eccentricity, orientation) =
            axis_features_2d(&region, centroid_row, centroid_col);

        let contour = trace_contour(&region);
        let perimeter = contour_perimeter(&contour);

        let circularity = if perimeter > 0.0 {
            4.0 * PI * area / (perimeter * perimeter)
        } else {
            0.0
        };
        let aspect_ratio = if minor_axis > 0.0 {
            major_axis / minor_axis
        } else {
            0.0
        };
        let solidity = solidity_2d(&region, area);

        let mut record = FeatureRecord::new();
        record.insert("area", area);
        record.insert("perimeter", perimeter);
        record.insert("centroid_row", centroid_row);
        record.insert("centroid_col", centroid_col);
        record.insert("major_axis_length", major_axis);
        record.insert("minor_axis_length", minor_axis);
        record.insert("eccentricity", eccentricity);
        record.insert("orientation", orientation);
        record.insert("solidity", solidity);
        record.insert("circularity", circularity);
        record.insert("aspect_ratio", aspect_ratio);

        let (uniformity, entropy) = texture_features(mask, &region);
        record.insert("texture_uniformity", uniformity);
        record.insert("texture_entropy", entropy);

        Ok(record)
    }

    /// Compute 3D shape features from a labeled volume.
    pub fn compute_3d(&self, volume: &ArrayView3<'_, u32>) -> Result<FeatureRecord> {
        let region = mask::first_region_3d(volume)?;
        let region = self.device_round_trip_3d(region)?;

        let vol = region.iter().filter(|&&v| v).count() as f64;
        let surface_area = surface_area_3d(&region);
        let (cz, cr, cc) = centroid_3d(&region);

        let mut record = FeatureRecord::new();
        record.insert("volume", vol);
        record.insert("surface_area", surface_area);
        record.insert("sphericity", sphericity(vol, surface_area));
        record.insert("equivalent_diameter", equivalent_diameter(vol));
        record.insert("centroid_z", cz);
        record.insert("centroid_row", cr);
        record.insert("centroid_col", cc);

        Ok(record)
    }

    /// Compute features from a mask of dynamic rank, dispatching on 2D vs 3D.
    pub fn compute_dyn(&self, mask: &MaskD) -> Result<FeatureRecord> {
        match mask.ndim() {
            2 => self.compute_2d(&mask::as_2d(mask)?),
            3 => self.compute_3d(&mask::as_3d(mask)?),
            rank => Err(OrganoidError::InvalidDimensionality(rank)),
        }
    }

    /// Compute features for a list of masks, isolating per-item failures.
    ///
    /// A failing item yields `None` at its position and a logged warning; the
    /// rest of the batch proceeds.
    pub fn compute_batch(&self, masks: &[MaskD]) -> Vec<Option<FeatureRecord>> {
        masks
            .iter()
            .enumerate()
            .map(|(idx, mask)| match self.compute_dyn(mask) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("feature computation failed for mask {}: {}", idx, e);
                    None
                }
            })
            .collect()
    }

    /// Round-trip the region through device memory when an accelerator is
    /// present. With no device this is a pass-through and the region is
    /// returned unchanged.
    fn device_round_trip_2d(&self, region: Array2<bool>) -> Result<Array2<bool>> {
        if !self.accel.is_available() {
            return Ok(region);
        }
        let shape = (region.nrows(), region.ncols());
        let as_f64 = region.mapv(|v| if v { 1.0 } else { 0.0 }).into_dyn();
        let handle = self.accel.to_device(as_f64)?;
        let back = self.accel.to_host(handle)?;
        let back2 = back
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|_| OrganoidError::Analysis("device transfer changed mask rank".to_string()))?;
        debug_assert_eq!((back2.nrows(), back2.ncols()), shape);
        Ok(back2.mapv(|v| v >= 0.5))
    }

    /// 3D counterpart of the device round-trip; both ranks take the same
    /// path through the accelerator.
    fn device_round_trip_3d(&self, region: Array3<bool>) -> Result<Array3<bool>> {
        if !self.accel.is_available() {
            return Ok(region);
        }
        let shape = region.dim();
        let as_f64 = region.mapv(|v| if v { 1.0 } else { 0.0 }).into_dyn();
        let handle = self.accel.to_device(as_f64)?;
        let back = self.accel.to_host(handle)?;
        let back3 = back
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|_| OrganoidError::Analysis("device transfer changed mask rank".to_string()))?;
        debug_assert_eq!(back3.dim(), shape);
        Ok(back3.mapv(|v| v >= 0.5))
    }
}

/// Sphericity of a 3D region: `(6 * volume * pi)^(2/3) / surface_area`.
pub fn sphericity(volume: f64, surface_area: f64) -> f64 {
    if surface_area <= 0.0 {
        return 0.0;
    }
    (6.0 * volume * PI).powf(2.0 / 3.0) / surface_area
}

/// Equivalent spherical diameter of a 3D region: `2 * (3V / 4pi)^(1/3)`.
pub fn equivalent_diameter(volume: f64) -> f64 {
    2.0 * (3.0 * volume / (4.0 * PI)).powf(1.0 / 3.0)
}

/// Surface area of a 3D binary region, counted as voxel faces exposed to
/// background or the volume boundary.
pub fn surface_area_3d(region: &Array3<bool>) -> f64 {
    let (nz, ny, nx) = region.dim();
    let mut faces = 0u64;
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if !region[[z, y, x]] {
                    continue;
                }
                let neighbors: [(i64, i64, i64); 6] = [
                    (z as i64 - 1, y as i64, x as i64),
                    (z as i64 + 1, y as i64, x as i64),
                    (z as i64, y as i64 - 1, x as i64),
                    (z as i64, y as i64 + 1, x as i64),
                    (z as i64, y as i64, x as i64 - 1),
                    (z as i64, y as i64, x as i64 + 1),
                ];
                for (az, ay, ax) in neighbors {
                    let outside = az < 0
                        || ay < 0
                        || ax < 0
                        || az >= nz as i64
                        || ay >= ny as i64
                        || ax >= nx as i64;
                    if outside || !region[[az as usize, ay as usize, ax as usize]] {
                        faces += 1;
                    }
                }
            }
        }
    }
    faces as f64
}

pub(crate) fn centroid_2d(region: &Array2<bool>) -> (f64, f64) {
    let mut sum_r = 0.0;
    let mut sum_c = 0.0;
    let mut count = 0.0;
    for ((r, c), &v) in region.indexed_iter() {
        if v {
            sum_r += r as f64;
            sum_c += c as f64;
            count += 1.0;
        }
    }
    (sum_r / count, sum_c / count)
}

pub(crate) fn centroid_3d(region: &Array3<bool>) -> (f64, f64, f64) {
    let mut sums = [0.0f64; 3];
    let mut count = 0.0;
    for ((z, y, x), &v) in region.indexed_iter() {
        if v {
            sums[0] += z as f64;
            sums[1] += y as f64;
            sums[2] += x as f64;
            count += 1.0;
        }
    }
    (sums[0] / count, sums[1] / count, sums[2] / count)
}

/// Axis lengths, eccentricity and orientation from normalized second-order
/// central moments (regionprops convention: axis length = 4 * sqrt(eigenvalue)).
fn axis_features_2d(region: &Array2<bool>, cr: f64, cc: f64) -> (f64, f64, f64, f64) {
    let mut mu20 = 0.0;
    let mut mu02 = 0.0;
    let mut mu11 = 0.0;
    let mut count = 0.0;
    for ((r, c), &v) in region.indexed_iter() {
        if v {
            let dr = r as f64 - cr;
            let dc = c as f64 - cc;
            mu20 += dc * dc;
            mu02 += dr * dr;
            mu11 += dr * dc;
            count += 1.0;
        }
    }
    mu20 /= count;
    mu02 /= count;
    mu11 /= count;

    let common = ((mu20 - mu02) * (mu20 - mu02) / 4.0 + mu11 * mu11).sqrt();
    let lambda1 = (mu20 + mu02) / 2.0 + common;
    let lambda2 = (mu20 + mu02) / 2.0 - common;
    let lambda2 = lambda2.max(0.0);

    let major = 4.0 * lambda1.sqrt();
    let minor = 4.0 * lambda2.sqrt();
    let eccentricity = if lambda1 > 0.0 {
        (1.0 - lambda2 / lambda1).max(0.0).sqrt()
    } else {
        0.0
    };
    let orientation = 0.5 * (2.0 * mu11).atan2(mu20 - mu02);

    (major, minor, eccentricity, orientation)
}

/// Solidity: region area over the area of its convex hull.
///
/// Degenerate regions whose hull has no area (points, lines) count as fully
/// solid.
fn solidity_2d(region: &Array2<bool>, area: f64) -> f64 {
    let points: Vec<(f64, f64)> = region
        .indexed_iter()
        .filter(|(_, &v)| v)
        .map(|((r, c), _)| (c as f64, r as f64))
        .collect();

    let hull = convex_hull(&points);
    // Hull of pixel centers underestimates pixel coverage; pad by the half
    // pixel border via the perimeter-strip approximation.
    let hull_area = polygon_area(&hull) + 0.5 * polygon_perimeter(&hull) + 1.0;
    if hull_area <= 0.0 {
        return 1.0;
    }
    (area / hull_area).min(1.0)
}

/// Andrew's monotone chain convex hull. Returns vertices in counterclockwise
/// order without the closing point.
fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    sorted.dedup();

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut hull: Vec<(f64, f64)> = Vec::with_capacity(sorted.len() * 2);
    for &p in sorted.iter().chain(sorted.iter().rev().skip(1)) {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

fn polygon_area(vertices: &[(f64, f64)]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..vertices.len() {
        let (x1, y1) = vertices[i];
        let (x2, y2) = vertices[(i + 1) % vertices.len()];
        sum += x1 * y2 - x2 * y1;
    }
    sum.abs() / 2.0
}

fn polygon_perimeter(vertices: &[(f64, f64)]) -> f64 {
    if vertices.len() < 2 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..vertices.len() {
        let (x1, y1) = vertices[i];
        let (x2, y2) = vertices[(i + 1) % vertices.len()];
        sum += ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
    }
    sum
}

/// Trace the outer boundary of a binary region using Moore-neighbor tracing.
///
/// Returns the boundary pixels in traversal order. A single-pixel region
/// yields a one-point contour.
pub fn trace_contour(region: &Array2<bool>) -> Vec<(usize, usize)> {
    let (height, width) = region.dim();
    let inside = |r: i32, c: i32| {
        r >= 0 && c >= 0 && (r as usize) < height && (c as usize) < width && region[[r as usize, c as usize]]
    };

    // First region pixel in scan order is always on the boundary.
    let start = match region.indexed_iter().find(|(_, &v)| v) {
        Some(((r, c), _)) => (r, c),
        None => return Vec::new(),
    };

    let mut contour = vec![start];
    let mut current = start;
    let mut backtrack_idx = 0usize;
    // A closed boundary trace revisits thin pixels at most a few times, so
    // the walk can never legitimately exceed a small multiple of the region
    // size. The cap only guards against a non-terminating walk.
    let area = region.iter().filter(|&&v| v).count();
    let max_len = 4 * area + 8;

    loop {
        let mut advanced = false;
        for i in 0..8 {
            let idx = (backtrack_idx + i) % 8;
            let (dc, dr) = MOORE_NEIGHBORHOOD[idx];
            let nr = current.0 as i32 + dr;
            let nc = current.1 as i32 + dc;
            if inside(nr, nc) {
                let next = (nr as usize, nc as usize);
                if next == start && contour.len() > 1 {
                    return contour;
                }
                contour.push(next);
                current = next;
                // Restart the scan from the direction we came from.
                backtrack_idx = (idx + 5) % 8;
                advanced = true;
                break;
            }
        }
        if !advanced {
            return contour;
        }
        if contour.len() > max_len {
            warn!(
                "contour trace did not close after {} points; returning partial boundary",
                max_len
            );
            return contour;
        }
    }
}

/// Perimeter of a traced contour: summed Euclidean distances between
/// successive points, closed back to the start.
pub fn contour_perimeter(contour: &[(usize, usize)]) -> f64 {
    if contour.len() < 2 {
        return 0.0;
    }
    let n = contour.len();
    let mut perimeter = 0.0;
    for i in 0..n {
        let (r1, c1) = contour[i];
        let (r2, c2) = contour[(i + 1) % n];
        let dr = r2 as f64 - r1 as f64;
        let dc = c2 as f64 - c1 as f64;
        perimeter += (dr * dr + dc * dc).sqrt();
    }
    perimeter
}

/// Texture features from a local-binary-pattern histogram over the region.
///
/// Each region pixel gets an 8-bit code comparing its Moore neighbors to the
/// center value; `uniformity` is the sum of squared histogram frequencies and
/// `entropy` is `-sum(p * log2(p + eps))`.
fn texture_features(mask: &ArrayView2<'_, u32>, region: &Array2<bool>) -> (f64, f64) {
    let (height, width) = mask.dim();
    let mut histogram = [0u64; 256];
    let mut total = 0u64;

    for ((r, c), &in_region) in region.indexed_iter() {
        if !in_region {
            continue;
        }
        let center = mask[[r, c]];
        let mut code = 0u8;
        for (bit, &(dc, dr)) in MOORE_NEIGHBORHOOD.iter().enumerate() {
            let nr = r as i32 + dr;
            let nc = c as i32 + dc;
            let neighbor = if nr >= 0 && nc >= 0 && (nr as usize) < height && (nc as usize) < width
            {
                mask[[nr as usize, nc as usize]]
            } else {
                0
            };
            if neighbor >= center {
                code |= 1 << bit;
            }
        }
        histogram[code as usize] += 1;
        total += 1;
    }

    if total == 0 {
        return (0.0, 0.0);
    }

    let mut uniformity = 0.0;
    let mut entropy = 0.0;
    for &count in &histogram {
        if count == 0 {
            continue;
        }
        let p = count as f64 / total as f64;
        uniformity += p * p;
        entropy -= p * (p + ENTROPY_EPSILON).log2();
    }

    (uniformity, entropy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::{Array2, Array3, ArrayD};

    fn disk_mask(radius: usize) -> Array2<u32> {
        let size = 2 * radius + 3;
        let center = (size / 2) as f64;
        Array2::from_shape_fn((size, size), |(r, c)| {
            let dr = r as f64 - center;
            let dc = c as f64 - center;
            if (dr * dr + dc * dc).sqrt() <= radius as f64 {
                1
            } else {
                0
            }
        })
    }

    fn ball_volume(radius: usize) -> Array3<u32> {
        let size = 2 * radius + 3;
        let center = (size / 2) as f64;
        Array3::from_shape_fn((size, size, size), |(z, y, x)| {
            let dz = z as f64 - center;
            let dy = y as f64 - center;
            let dx = x as f64 - center;
            if (dz * dz + dy * dy + dx * dx).sqrt() <= radius as f64 {
                1
            } else {
                0
            }
        })
    }

    #[test]
    fn circularity_matches_formula_exactly() {
        let engine = FeatureEngine::new();
        let mask = disk_mask(10);
        let record = engine.compute_2d(&mask.view()).unwrap();

        let area = record.get_f64("area").unwrap();
        let perimeter = record.get_f64("perimeter").unwrap();
        let expected = 4.0 * PI * area / (perimeter * perimeter);
        assert_approx_eq!(record.get_f64("circularity").unwrap(), expected, 1e-12);
    }

    #[test]
    fn disk_is_nearly_circular() {
        let engine = FeatureEngine::new();
        let record = engine.compute_2d(&disk_mask(20).view()).unwrap();
        let circularity = record.get_f64("circularity").unwrap();
        assert!(
            circularity > 0.75 && circularity < 1.2,
            "disk circularity out of range: {}",
            circularity
        );
        // A disk has no preferred axis.
        assert!(record.get_f64("eccentricity").unwrap() < 0.2);
        assert!(record.get_f64("aspect_ratio").unwrap() < 1.2);
    }

    #[test]
    fn elongated_region_has_high_aspect_ratio() {
        let engine = FeatureEngine::new();
        let mut mask = Array2::<u32>::zeros((20, 60));
        for r in 8..12 {
            for c in 5..55 {
                mask[[r, c]] = 1;
            }
        }
        let record = engine.compute_2d(&mask.view()).unwrap();
        assert!(record.get_f64("aspect_ratio").unwrap() > 5.0);
        assert!(record.get_f64("eccentricity").unwrap() > 0.9);
    }

    #[test]
    fn empty_mask_fails_with_no_region_found() {
        let engine = FeatureEngine::new();
        let mask = Array2::<u32>::zeros((10, 10));
        let err = engine.compute_2d(&mask.view()).unwrap_err();
        assert!(matches!(err, OrganoidError::NoRegionFound));

        let volume = Array3::<u32>::zeros((5, 5, 5));
        let err = engine.compute_3d(&volume.view()).unwrap_err();
        assert!(matches!(err, OrganoidError::NoRegionFound));
    }

    #[test]
    fn wrong_rank_fails_with_dimensionality_error() {
        let engine = FeatureEngine::new();
        let mask: MaskD = ArrayD::zeros(ndarray::IxDyn(&[4]));
        let err = engine.compute_dyn(&mask).unwrap_err();
        assert!(matches!(err, OrganoidError::InvalidDimensionality(1)));
    }

    #[test]
    fn sphericity_matches_formula_exactly() {
        let engine = FeatureEngine::new();
        let record = engine.compute_3d(&ball_volume(6).view()).unwrap();

        let volume = record.get_f64("volume").unwrap();
        let surface_area = record.get_f64("surface_area").unwrap();
        let expected = (6.0 * volume * PI).powf(2.0 / 3.0) / surface_area;
        assert_approx_eq!(record.get_f64("sphericity").unwrap(), expected, 1e-12);
    }

    #[test]
    fn single_voxel_surface_is_six_faces() {
        let mut volume = Array3::<u32>::zeros((3, 3, 3));
        volume[[1, 1, 1]] = 1;
        let region = volume.mapv(|v| v == 1);
        assert_eq!(surface_area_3d(&region), 6.0);
    }

    #[test]
    fn cube_features() {
        let engine = FeatureEngine::new();
        let mut volume = Array3::<u32>::zeros((10, 10, 10));
        for z in 2..6 {
            for y in 2..6 {
                for x in 2..6 {
                    volume[[z, y, x]] = 1;
                }
            }
        }
        let record = engine.compute_3d(&volume.view()).unwrap();
        assert_approx_eq!(record.get_f64("volume").unwrap(), 64.0, 1e-12);
        // A 4x4x4 cube exposes 6 faces of 16 voxel faces each.
        assert_approx_eq!(record.get_f64("surface_area").unwrap(), 96.0, 1e-12);
        assert_approx_eq!(record.get_f64("centroid_z").unwrap(), 3.5, 1e-12);
    }

    struct LoopbackAccelerator;

    impl Accelerator for LoopbackAccelerator {
        fn is_available(&self) -> bool {
            true
        }

        fn to_device(&self, data: ArrayD<f64>) -> Result<crate::accel::DeviceArray> {
            PassthroughAccelerator.to_device(data)
        }

        fn to_host(&self, handle: crate::accel::DeviceArray) -> Result<ArrayD<f64>> {
            PassthroughAccelerator.to_host(handle)
        }
    }

    #[test]
    fn device_backed_engine_matches_host_results_on_both_ranks() {
        let host = FeatureEngine::new();
        let device = FeatureEngine::with_accelerator(Arc::new(LoopbackAccelerator));

        let mask = disk_mask(8);
        assert_eq!(
            device.compute_2d(&mask.view()).unwrap(),
            host.compute_2d(&mask.view()).unwrap()
        );

        let volume = ball_volume(5);
        assert_eq!(
            device.compute_3d(&volume.view()).unwrap(),
            host.compute_3d(&volume.view()).unwrap()
        );
    }

    #[test]
    fn compute_batch_isolates_failures() {
        let engine = FeatureEngine::new();
        let good = disk_mask(5).into_dyn();
        let empty = Array2::<u32>::zeros((8, 8)).into_dyn();
        let wrong_rank: MaskD = ArrayD::zeros(ndarray::IxDyn(&[3]));

        let results = engine.compute_batch(&[good, empty, wrong_rank]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert!(results[2].is_none());
    }

    #[test]
    fn texture_of_uniform_interior_is_concentrated() {
        let engine = FeatureEngine::new();
        let record = engine.compute_2d(&disk_mask(10).view()).unwrap();
        let uniformity = record.get_f64("texture_uniformity").unwrap();
        let entropy = record.get_f64("texture_entropy").unwrap();
        // A flat disk produces only a handful of LBP codes (interior plus
        // boundary orientations), so uniformity is high and entropy low.
        assert!(uniformity > 0.3, "uniformity = {}", uniformity);
        assert!(entropy < 3.0, "entropy = {}", entropy);
    }

    #[test]
    fn contour_perimeter_of_square() {
        let mut region = Array2::<bool>::from_elem((10, 10), false);
        for r in 2..7 {
            for c in 2..7 {
                region[[r, c]] = true;
            }
        }
        let contour = trace_contour(&region);
        // The boundary of a 5x5 square has 16 pixels.
        assert_eq!(contour.len(), 16);
        assert_approx_eq!(contour_perimeter(&contour), 16.0, 1e-9);
    }

    #[test]
    fn thin_serpentine_boundary_is_traced_in_full() {
        // A one-pixel-wide snake: every pixel is a boundary pixel, so the
        // trace walks the whole region out and back.
        let mut region = Array2::<bool>::from_elem((20, 20), false);
        for r in (0..20).step_by(2) {
            for c in 0..20 {
                region[[r, c]] = true;
            }
        }
        for r in (1..18).step_by(2) {
            let c = if (r / 2) % 2 == 0 { 19 } else { 0 };
            region[[r, c]] = true;
        }
        let pixels = region.iter().filter(|&&v| v).count();
        assert_eq!(pixels, 209);

        let contour = trace_contour(&region);
        let visited: std::collections::BTreeSet<(usize, usize)> =
            contour.iter().copied().collect();
        // Every region pixel must appear in the trace; a capped trace covers
        // only a prefix of the snake.
        assert_eq!(visited.len(), pixels);
        // Thin arms are walked twice, so the trace is longer than the region.
        assert!(contour.len() > pixels, "contour len = {}", contour.len());
        assert!(contour_perimeter(&contour) > pixels as f64);
    }

    #[test]
    fn solidity_of_convex_region_is_near_one() {
        let engine = FeatureEngine::new();
        let record = engine.compute_2d(&disk_mask(12).view()).unwrap();
        let solidity = record.get_f64("solidity").unwrap();
        assert!(solidity > 0.9, "solidity = {}", solidity);
    }

    #[test]
    fn first_region_is_used_when_multiple_labels_present() {
        let engine = FeatureEngine::new();
        let mut mask = Array2::<u32>::zeros((20, 20));
        // label 1: 3x3 square, label 2: larger square
        for r in 1..4 {
            for c in 1..4 {
                mask[[r, c]] = 1;
            }
        }
        for r in 8..16 {
            for c in 8..16 {
                mask[[r, c]] = 2;
            }
        }
        let record = engine.compute_2d(&mask.view()).unwrap();
        assert_approx_eq!(record.get_f64("area").unwrap(), 9.0, 1e-12);
    }
}
