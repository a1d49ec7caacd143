use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::errors::{OrganoidError, Result};

/// Represents an input microscopy frame with its metadata
pub struct InputImage {
    pub pixels: Array2<u8>,
    pub path: PathBuf,
    pub filename: String,
}

/// Get all PNG files from a directory (recursively)
pub fn get_png_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(OrganoidError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(OrganoidError::Config(format!(
            "{} is not a directory",
            dir_path.display()
        )));
    }

    let mut png_files = Vec::new();
    find_png_files_recursive(dir_path, &mut png_files)?;
    png_files.sort();

    Ok(png_files)
}

fn find_png_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_png_files_recursive(&path, result)?;
        } else if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext.to_ascii_lowercase() == "png" {
                    result.push(path);
                }
            }
        }
    }

    Ok(())
}

/// Load an image as an 8-bit grayscale pixel array
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    let filename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| OrganoidError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let img = image::open(path)?.to_luma8();
    let (width, height) = img.dimensions();

    let pixels = Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        img.get_pixel(c as u32, r as u32)[0]
    });

    Ok(InputImage {
        pixels,
        path: path.to_path_buf(),
        filename,
    })
}
