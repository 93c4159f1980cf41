use std::fs;
use std::path::Path;

use crate::models::error::LoopbackError;
use crate::processing::surface::PixelBuffer;

/// Write a rendered frame as a binary PPM image, creating parent directories.
pub fn write_ppm(frame: &PixelBuffer, path: &Path) -> Result<(), LoopbackError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| LoopbackError::Storage(format!("failed to create directory: {}", e)))?;
        }
    }
    fs::write(path, frame.to_ppm())
        .map_err(|e| LoopbackError::Storage(format!("failed to write frame: {}", e)))
}
