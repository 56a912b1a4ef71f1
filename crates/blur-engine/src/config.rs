//! Engine configuration.
//!
//! Settings are plain serde structs with defaults for every field, so a RON
//! file only needs to mention what it changes:
//!
//! ```ron
//! (
//!     processor: (thread_count: 4),
//!     cache: (max_entries: 8),
//!     debounce_ms: 60,
//! )
//! ```

use std::path::Path;
use std::time::Duration;

use blur_cache::MIN_MEMORY_BYTES;
use blur_core::{Error, Result, MAX_IMAGE_DIMENSION};
use blur_ops::BlurQuality;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fewest worker threads.
pub const MIN_THREADS: usize = 1;

/// Most worker threads.
pub const MAX_THREADS: usize = 8;

/// Default scratch width (4K UHD).
pub const DEFAULT_MAX_WIDTH: i32 = 3840;

/// Default scratch height (4K UHD).
pub const DEFAULT_MAX_HEIGHT: i32 = 2160;

/// Default cache entry limit.
pub const DEFAULT_CACHE_ENTRIES: u32 = 5;

/// Default cache memory limit (150 MiB).
pub const DEFAULT_CACHE_MEMORY: usize = 150 * 1024 * 1024;

/// Default debounce delay in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Number of logical CPUs, or 1 if it cannot be determined.
pub fn detect_thread_count() -> usize {
    match sys_info::cpu_num() {
        Ok(n) if n > 0 => n as usize,
        _ => 1,
    }
}

/// Resolves a requested thread count.
///
/// Negative means auto-detect. The result is clamped to
/// `[MIN_THREADS, MAX_THREADS]`, so `0` yields one thread.
pub fn resolve_thread_count(requested: i32) -> usize {
    let n = if requested < 0 {
        detect_thread_count()
    } else {
        requested as usize
    };
    n.clamp(MIN_THREADS, MAX_THREADS)
}

/// Blur quality as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityMode {
    /// Full sigma.
    #[default]
    Full,
    /// Half sigma preview.
    Progressive,
}

impl From<QualityMode> for BlurQuality {
    fn from(mode: QualityMode) -> Self {
        match mode {
            QualityMode::Full => BlurQuality::Full,
            QualityMode::Progressive => BlurQuality::Progressive,
        }
    }
}

/// Processor limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Largest width the pre-allocated scratch covers.
    pub max_width: i32,
    /// Largest height the pre-allocated scratch covers.
    pub max_height: i32,
    /// Worker threads; negative = one per CPU.
    pub thread_count: i32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            thread_count: -1,
        }
    }
}

impl ProcessorConfig {
    /// Checks dimensions against `1..=MAX_IMAGE_DIMENSION`.
    pub fn validate(&self) -> Result<()> {
        let cap = MAX_IMAGE_DIMENSION as i32;
        if !(1..=cap).contains(&self.max_width) || !(1..=cap).contains(&self.max_height) {
            return Err(Error::InvalidConfig(format!(
                "processor dimensions {}x{} must be within 1..={cap}",
                self.max_width, self.max_height
            )));
        }
        Ok(())
    }
}

/// Result cache limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry limit, at least 1.
    pub max_entries: u32,
    /// Memory limit in bytes, at least 1 MiB.
    pub max_memory_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_ENTRIES,
            max_memory_bytes: DEFAULT_CACHE_MEMORY,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Processor limits.
    pub processor: ProcessorConfig,
    /// Cache limits.
    pub cache: CacheConfig,
    /// Delay between the last intensity change and the blur request.
    pub debounce_ms: u64,
    /// Quality used for debounced requests.
    pub quality: QualityMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorConfig::default(),
            cache: CacheConfig::default(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            quality: QualityMode::Full,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a RON document.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self =
            ron::from_str(text).map_err(|e| Error::InvalidConfig(format!("RON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a RON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Serializes to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::InvalidConfig(format!("RON serialize error: {e}")))
    }

    /// Checks every limit.
    pub fn validate(&self) -> Result<()> {
        self.processor.validate()?;
        if self.cache.max_entries == 0 {
            return Err(Error::InvalidConfig("cache.max_entries must be at least 1".into()));
        }
        if self.cache.max_memory_bytes < MIN_MEMORY_BYTES {
            return Err(Error::InvalidConfig(format!(
                "cache.max_memory_bytes must be at least {MIN_MEMORY_BYTES}"
            )));
        }
        Ok(())
    }

    /// Debounce delay as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Quality for blur requests.
    pub fn blur_quality(&self) -> BlurQuality {
        self.quality.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.processor.max_width, 3840);
        assert_eq!(config.processor.max_height, 2160);
        assert_eq!(config.processor.thread_count, -1);
        assert_eq!(config.cache.max_entries, 5);
        assert_eq!(config.cache.max_memory_bytes, 150 * 1024 * 1024);
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert_eq!(config.blur_quality(), BlurQuality::Full);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_thread_resolution() {
        assert_eq!(resolve_thread_count(0), 1);
        assert_eq!(resolve_thread_count(3), 3);
        assert_eq!(resolve_thread_count(64), MAX_THREADS);
        let auto = resolve_thread_count(-1);
        assert!((MIN_THREADS..=MAX_THREADS).contains(&auto));
    }

    #[test]
    fn test_partial_ron() {
        let config = EngineConfig::from_ron_str(
            "(processor: (thread_count: 4), cache: (max_entries: 8), debounce_ms: 60, quality: Progressive)",
        )
        .unwrap();
        assert_eq!(config.processor.thread_count, 4);
        assert_eq!(config.processor.max_width, DEFAULT_MAX_WIDTH);
        assert_eq!(config.cache.max_entries, 8);
        assert_eq!(config.cache.max_memory_bytes, DEFAULT_CACHE_MEMORY);
        assert_eq!(config.debounce_ms, 60);
        assert_eq!(config.blur_quality(), BlurQuality::Progressive);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EngineConfig::from_ron_str("(cache: (max_entries: 0))").is_err());
        assert!(EngineConfig::from_ron_str("(cache: (max_memory_bytes: 1000))").is_err());
        assert!(EngineConfig::from_ron_str("(processor: (max_width: 9000))").is_err());
        assert!(EngineConfig::from_ron_str("(processor: (max_height: 0))").is_err());
        assert!(EngineConfig::from_ron_str("(debounce_ms: \"soon\")").is_err());
    }

    #[test]
    fn test_ron_round_trip() {
        let mut config = EngineConfig::default();
        config.debounce_ms = 250;
        config.processor.thread_count = 2;
        let text = config.to_ron_string().unwrap();
        assert_eq!(EngineConfig::from_ron_str(&text).unwrap(), config);
    }
}
