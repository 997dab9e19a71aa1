use std::time::Duration;

/// Alignment session tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentConfig {
    /// Samples per body half before the center orientation counts as converged.
    pub sample_threshold: u32,
    /// Largest tolerated residual error (radians) before a session fails.
    pub max_error_rad: f32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            sample_threshold: 350,
            max_error_rad: 0.26,
        }
    }
}

impl AlignmentConfig {
    /// Defaults overridden by `ENFLUX_ALIGN_SAMPLES` and `ENFLUX_ALIGN_MAX_ERROR`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sample_threshold: read_env_u32("ENFLUX_ALIGN_SAMPLES", defaults.sample_threshold),
            max_error_rad: read_env_f32("ENFLUX_ALIGN_MAX_ERROR", defaults.max_error_rad),
        }
        .validated()
    }

    /// Clamp values that would make a session never finish or never succeed.
    pub fn validated(self) -> Self {
        let defaults = Self::default();
        let max_error_rad = if self.max_error_rad.is_finite() && self.max_error_rad >= 0.0 {
            self.max_error_rad
        } else {
            log::warn!(
                "Invalid alignment max error {}, using {}",
                self.max_error_rad,
                defaults.max_error_rad
            );
            defaults.max_error_rad
        };
        Self {
            sample_threshold: self.sample_threshold.max(1),
            max_error_rad,
        }
    }
}

/// Background polling of the native driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub poll_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            channel_capacity: 256,
        }
    }
}

impl StreamConfig {
    /// Defaults overridden by `ENFLUX_POLL_INTERVAL_MS` and `ENFLUX_CHANNEL_CAPACITY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(read_env_u64(
                "ENFLUX_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            channel_capacity: read_env_u64(
                "ENFLUX_CHANNEL_CAPACITY",
                defaults.channel_capacity as u64,
            )
            .max(1) as usize,
        }
    }
}

/// Suit manager settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuitConfig {
    pub alignment: AlignmentConfig,
    /// Delay between requesting an alignment and starting to sample, so the
    /// wearer has time to get into the stance.
    pub countdown: Duration,
}

impl Default for SuitConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentConfig::default(),
            countdown: Duration::from_secs(3),
        }
    }
}

impl SuitConfig {
    pub fn new(alignment: AlignmentConfig, countdown: Duration) -> Self {
        Self {
            alignment,
            countdown,
        }
    }

    /// Alignment settings from the environment plus `ENFLUX_COUNTDOWN_MS`.
    pub fn from_env() -> Self {
        Self {
            alignment: AlignmentConfig::from_env(),
            countdown: Duration::from_millis(read_env_u64("ENFLUX_COUNTDOWN_MS", 3000)),
        }
    }
}

fn read_env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AlignmentConfig::default();
        assert_eq!(config.sample_threshold, 350);
        assert!((config.max_error_rad - 0.26).abs() < 1e-6);
        assert_eq!(StreamConfig::default().channel_capacity, 256);
        assert_eq!(SuitConfig::default().countdown, Duration::from_secs(3));
    }

    #[test]
    fn test_validated_clamps() {
        let config = AlignmentConfig {
            sample_threshold: 0,
            max_error_rad: f32::NAN,
        }
        .validated();
        assert_eq!(config.sample_threshold, 1);
        assert!((config.max_error_rad - 0.26).abs() < 1e-6);

        let config = AlignmentConfig {
            sample_threshold: 10,
            max_error_rad: -1.0,
        }
        .validated();
        assert_eq!(config.sample_threshold, 10);
        assert!((config.max_error_rad - 0.26).abs() < 1e-6);
    }

    #[test]
    fn test_env_fallback_on_garbage() {
        assert_eq!(read_env_u32("ENFLUX_TEST_UNSET_VARIABLE", 7), 7);
        std::env::set_var("ENFLUX_TEST_GARBAGE_U64", "not-a-number");
        assert_eq!(read_env_u64("ENFLUX_TEST_GARBAGE_U64", 42), 42);
        std::env::set_var("ENFLUX_TEST_F32", " 0.5 ");
        assert!((read_env_f32("ENFLUX_TEST_F32", 1.0) - 0.5).abs() < 1e-6);
    }
}
