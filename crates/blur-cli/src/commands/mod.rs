//! CLI command implementations

pub mod blur;
pub mod kernel;
pub mod sweep;

use std::path::Path;

use anyhow::{Context, Result};
use blur_core::PixelBuffer;
use blur_engine::EngineConfig;
use tracing::debug;

/// Builds the engine config from an optional RON file and the `-j` override.
pub fn load_config(path: Option<&Path>, threads: Option<i32>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(threads) = threads {
        config.processor.thread_count = threads;
    }
    config.validate().context("Invalid engine configuration")?;
    debug!(?config, "Engine config");
    Ok(config)
}

/// Load image from path
pub fn load_image(path: &Path) -> Result<PixelBuffer> {
    let image = crate::io::read_png(path)?;
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        channels = image.channels().count(),
        "Loaded image"
    );
    Ok(image)
}

/// Save image to path
pub fn save_image(path: &Path, image: &PixelBuffer) -> Result<()> {
    crate::io::write_png(path, image).with_context(|| format!("Failed to save: {}", path.display()))
}

/// Format byte count for display
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn threads_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(processor: (thread_count: 2), debounce_ms: 10)").unwrap();

        let config = load_config(Some(file.path()), Some(6)).unwrap();
        assert_eq!(config.processor.thread_count, 6);
        assert_eq!(config.debounce_ms, 10);
    }

    #[test]
    fn defaults_without_file() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.processor.thread_count, -1);
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(150 * 1024 * 1024), "150.00 MB");
    }
}
