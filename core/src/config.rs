use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::format::OutputFormat;

/// User-facing 0-100 quality knob. Only lossy encoders look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const MAX: Quality = Quality(100);

    /// Values above 100 are clamped.
    pub fn new(value: u8) -> Self {
        Quality(value.min(100))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Fidelity factor in 0.0..=1.0.
    pub fn factor(&self) -> f32 {
        f32::from(self.0) / 100.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality(92)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Quality {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u8>() {
            Ok(v) if v <= 100 => Ok(Quality(v)),
            _ => Err(format!("quality must be an integer in 0..=100, got {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Output format applied to every file of the batch
    pub target: OutputFormat,
    /// Lossy quality, ignored by lossless targets
    pub quality: Quality,
    /// Upper bound on a single video's frame extraction
    pub frame_timeout: Duration,
    /// Maximum number of history records kept
    pub history_limit: usize,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            target: OutputFormat::Png,
            quality: Quality::default(),
            frame_timeout: Duration::from_millis(10_000),
            history_limit: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_factor() {
        assert_eq!(Quality::new(50).factor(), 0.5);
        assert_eq!(Quality::new(250).value(), 100);
        assert_eq!(Quality::MAX.factor(), 1.0);
    }

    #[test]
    fn test_quality_parse() {
        assert_eq!("92".parse::<Quality>(), Ok(Quality::new(92)));
        assert!("101".parse::<Quality>().is_err());
        assert!("high".parse::<Quality>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = ConversionConfig::default();
        assert_eq!(config.frame_timeout, Duration::from_secs(10));
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.quality.value(), 92);
    }
}
