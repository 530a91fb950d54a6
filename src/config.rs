//! Playback configuration (JSON via serde).
//!
//! All fields have defaults, so a config file only needs the keys it changes:
//!
//! ```json
//! { "loop_policy": { "finite": 3 }, "circle_mask": true }
//! ```

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Delay floor for sources reporting tiny non-zero delays (ms)
pub const MIN_DELAY_MS: u64 = 20;
/// Delay used when a source reports 0 (undefined in GIF) (ms)
pub const DEFAULT_DELAY_MS: u64 = 100;

/// How many passes through the sequence before the finished notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopPolicy {
    /// Stop after `n` loops. 0 never matches, so it loops forever.
    Finite(u32),
    /// Loop forever, never notify
    Infinite,
    /// Use the loop count stored in the source data
    #[default]
    SourceDefault,
}

/// Per-frame delay normalization, imitating common viewer behavior for
/// GIF/WebP sources with zero or tiny delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    pub min_delay_ms: u64,
    pub default_delay_ms: u64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            min_delay_ms: MIN_DELAY_MS,
            default_delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl DelayPolicy {
    /// 0 → default, below floor → floor, anything else unchanged
    pub fn effective(&self, reported_ms: u64) -> u64 {
        if reported_ms == 0 {
            self.default_delay_ms
        } else {
            reported_ms.max(self.min_delay_ms)
        }
    }
}

/// Engine settings applied at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub min_delay_ms: u64,
    pub default_delay_ms: u64,
    pub loop_policy: LoopPolicy,
    pub circle_mask: bool,
    pub alpha: u8,
    pub filter: bool,
    /// Color filter tint (RGBA multiply)
    pub tint: Option<[u8; 4]>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: MIN_DELAY_MS,
            default_delay_ms: DEFAULT_DELAY_MS,
            loop_policy: LoopPolicy::default(),
            circle_mask: false,
            alpha: 255,
            filter: true,
            tint: None,
        }
    }
}

impl PlaybackConfig {
    /// Load from JSON file, missing keys take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        debug!("Loaded playback config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn delay_policy(&self) -> DelayPolicy {
        DelayPolicy {
            min_delay_ms: self.min_delay_ms,
            default_delay_ms: self.default_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_normalization() {
        let policy = DelayPolicy::default();
        assert_eq!(policy.effective(0), 100);
        assert_eq!(policy.effective(5), 20);
        assert_eq!(policy.effective(19), 20);
        assert_eq!(policy.effective(20), 20);
        assert_eq!(policy.effective(150), 150);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PlaybackConfig::from_json(r#"{ "circle_mask": true }"#).unwrap();
        assert!(config.circle_mask);
        assert_eq!(config.tint, None);
        assert_eq!(config.min_delay_ms, MIN_DELAY_MS);
        assert_eq!(config.loop_policy, LoopPolicy::SourceDefault);
    }

    #[test]
    fn test_loop_policy_json() {
        let config = PlaybackConfig::from_json(r#"{ "loop_policy": { "finite": 3 } }"#).unwrap();
        assert_eq!(config.loop_policy, LoopPolicy::Finite(3));

        let config = PlaybackConfig::from_json(r#"{ "loop_policy": "infinite" }"#).unwrap();
        assert_eq!(config.loop_policy, LoopPolicy::Infinite);
    }

    #[test]
    fn test_tint_json() {
        let config = PlaybackConfig::from_json(r#"{ "tint": [255, 128, 0, 255] }"#).unwrap();
        assert_eq!(config.tint, Some([255, 128, 0, 255]));
    }

    #[test]
    fn test_load_missing_file() {
        let result = PlaybackConfig::load(Path::new("/nonexistent/animseq.json"));
        assert!(result.is_err());
    }
}
