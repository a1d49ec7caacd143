// src/segmentation.rs - Segmentation collaborator interface and threshold segmenter

use std::collections::VecDeque;

use ndarray::Array2;

use crate::errors::{OrganoidError, Result};
use crate::mask::Mask2;

/// Segmentation collaborator: turns a grayscale image into a labeled mask.
///
/// A failed segmentation surfaces as a typed error; implementations must not
/// silently return an empty mask.
pub trait SegmentationModel: Send + Sync {
    fn segment(&self, image: &Array2<u8>) -> Result<Mask2>;
}

/// Otsu-threshold segmenter with connected-component labeling.
///
/// Stands in for external model-based segmentation backends, which implement
/// the same trait. Assumes bright objects on a dark background.
pub struct OtsuSegmenter {
    /// Components smaller than this pixel count are discarded as noise.
    pub min_region_size: usize,
}

impl Default for OtsuSegmenter {
    fn default() -> Self {
        Self { min_region_size: 16 }
    }
}

impl OtsuSegmenter {
    pub fn new(min_region_size: usize) -> Self {
        Self { min_region_size }
    }
}

impl SegmentationModel for OtsuSegmenter {
    fn segment(&self, image: &Array2<u8>) -> Result<Mask2> {
        let threshold = otsu_threshold(image);
        let foreground = image.mapv(|v| v > threshold);
        let mask = label_components(&foreground, self.min_region_size);

        if mask.iter().all(|&v| v == 0) {
            return Err(OrganoidError::Segmentation(format!(
                "no foreground region above threshold {}",
                threshold
            )));
        }
        Ok(mask)
    }
}

/// Otsu's method: the threshold maximizing between-class variance.
fn otsu_threshold(image: &Array2<u8>) -> u8 {
    let mut histogram = [0u64; 256];
    for &v in image.iter() {
        histogram[v as usize] += 1;
    }
    let total = image.len() as f64;
    let total_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &count)| v as f64 * count as f64)
        .sum();

    let mut best_threshold = 0u8;
    let mut best_variance = 0.0;
    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;

    for t in 0..256 {
        weight_bg += histogram[t] as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += t as f64 * histogram[t] as f64;

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (total_sum - sum_bg) / weight_fg;
        let variance = weight_bg * weight_fg * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if variance > best_variance {
            best_variance = variance;
            best_threshold = t as u8;
        }
    }
    best_threshold
}

/// 4-connected component labeling; components below `min_size` are dropped.
/// Surviving components get labels 1..=N in scan order.
fn label_components(foreground: &Array2<bool>, min_size: usize) -> Mask2 {
    let (height, width) = foreground.dim();
    let mut mask = Array2::<u32>::zeros((height, width));
    let mut next_label = 1u32;
    let mut queue = VecDeque::new();

    for r in 0..height {
        for c in 0..width {
            if !foreground[[r, c]] || mask[[r, c]] != 0 {
                continue;
            }

            let mut component = Vec::new();
            mask[[r, c]] = next_label;
            queue.push_back((r, c));
            while let Some((cr, cc)) = queue.pop_front() {
                component.push((cr, cc));
                let neighbors = [
                    (cr.wrapping_sub(1), cc),
                    (cr + 1, cc),
                    (cr, cc.wrapping_sub(1)),
                    (cr, cc + 1),
                ];
                for (nr, nc) in neighbors {
                    if nr < height && nc < width && foreground[[nr, nc]] && mask[[nr, nc]] == 0 {
                        mask[[nr, nc]] = next_label;
                        queue.push_back((nr, nc));
                    }
                }
            }

            if component.len() < min_size {
                for (cr, cc) in component {
                    mask[[cr, cc]] = 0;
                }
            } else {
                next_label += 1;
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bright_square_becomes_one_labeled_region() {
        let mut image = Array2::<u8>::from_elem((30, 30), 10);
        for r in 5..15 {
            for c in 5..15 {
                image[[r, c]] = 200;
            }
        }
        let mask = OtsuSegmenter::default().segment(&image).unwrap();
        let labels: std::collections::BTreeSet<u32> =
            mask.iter().copied().filter(|&v| v != 0).collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(mask.iter().filter(|&&v| v != 0).count(), 100);
        assert_eq!(mask[[10, 10]], 1);
        assert_eq!(mask[[0, 0]], 0);
    }

    #[test]
    fn separate_blobs_get_separate_labels() {
        let mut image = Array2::<u8>::from_elem((40, 40), 0);
        for r in 2..10 {
            for c in 2..10 {
                image[[r, c]] = 255;
            }
        }
        for r in 25..35 {
            for c in 25..35 {
                image[[r, c]] = 255;
            }
        }
        let mask = OtsuSegmenter::default().segment(&image).unwrap();
        assert_ne!(mask[[5, 5]], 0);
        assert_ne!(mask[[30, 30]], 0);
        assert_ne!(mask[[5, 5]], mask[[30, 30]]);
    }

    #[test]
    fn blank_image_is_a_typed_error() {
        let image = Array2::<u8>::zeros((20, 20));
        let err = OtsuSegmenter::default().segment(&image).unwrap_err();
        assert!(matches!(err, OrganoidError::Segmentation(_)));
    }

    #[test]
    fn tiny_specks_are_discarded() {
        let mut image = Array2::<u8>::from_elem((30, 30), 0);
        // One real object and one 2-pixel speck.
        for r in 5..15 {
            for c in 5..15 {
                image[[r, c]] = 255;
            }
        }
        image[[25, 25]] = 255;
        image[[25, 26]] = 255;

        let mask = OtsuSegmenter::new(16).segment(&image).unwrap();
        assert_eq!(mask[[25, 25]], 0);
        assert_ne!(mask[[10, 10]], 0);
    }
}
