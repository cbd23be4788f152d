use std::time::Duration;

use tollgate_common::{BucketSettings, TollgateError, TollgateResult};

/// Immutable parameters of one token bucket. One instance governs every
/// client observed against the route it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketConfig {
    capacity: f64,
    refill_rate: f64,
    refill_period: Duration,
    block_threshold: u32,
    block_duration: Duration,
    min_request_spacing: Duration,
}

impl BucketConfig {
    /// Build a bucket configuration.
    ///
    /// * `capacity`        - maximum tokens held, at least 1
    /// * `refill_rate`     - tokens accrued per `refill_period`
    /// * `refill_period`   - non-zero duration over which `refill_rate` tokens accrue
    /// * `block_threshold` - violations that trigger a lockout, at least 1
    /// * `block_duration`  - length of a lockout
    ///
    /// The minimum inter-request spacing defaults to the time it takes to
    /// accrue one token; see [`with_min_request_spacing`](Self::with_min_request_spacing).
    pub fn new(
        capacity: u32,
        refill_rate: f64,
        refill_period: Duration,
        block_threshold: u32,
        block_duration: Duration,
    ) -> TollgateResult<Self> {
        if capacity == 0 {
            return Err(TollgateError::Config("capacity must be at least 1".into()));
        }
        if !(refill_rate.is_finite() && refill_rate > 0.0) {
            return Err(TollgateError::Config(
                "refill rate must be a positive number".into(),
            ));
        }
        if refill_period.is_zero() {
            return Err(TollgateError::Config(
                "refill period must be greater than 0".into(),
            ));
        }
        if block_threshold == 0 {
            return Err(TollgateError::Config(
                "block threshold must be at least 1".into(),
            ));
        }

        let min_request_spacing =
            Duration::try_from_secs_f64(refill_period.as_secs_f64() / refill_rate)
                .unwrap_or(Duration::MAX);

        Ok(Self {
            capacity: f64::from(capacity),
            refill_rate,
            refill_period,
            block_threshold,
            block_duration,
            min_request_spacing,
        })
    }

    /// Override the spacing under which retries against an empty bucket count
    /// as violations.
    pub fn with_min_request_spacing(mut self, spacing: Duration) -> Self {
        self.min_request_spacing = spacing;
        self
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    pub fn block_threshold(&self) -> u32 {
        self.block_threshold
    }

    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }

    pub fn min_request_spacing(&self) -> Duration {
        self.min_request_spacing
    }

    /// Tokens accrued over `elapsed`.
    pub(crate) fn tokens_for(&self, elapsed: Duration) -> f64 {
        self.refill_rate * (elapsed.as_secs_f64() / self.refill_period.as_secs_f64())
    }
}

impl TryFrom<&BucketSettings> for BucketConfig {
    type Error = TollgateError;

    fn try_from(settings: &BucketSettings) -> Result<Self, Self::Error> {
        settings.validate()?;

        let config = Self::new(
            settings.capacity,
            settings.refill_rate,
            Duration::from_millis(settings.refill_period_ms),
            settings.block_threshold,
            Duration::from_millis(settings.block_duration_ms),
        )?;

        Ok(match settings.min_request_spacing_ms {
            Some(ms) => config.with_min_request_spacing(Duration::from_millis(ms)),
            None => config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spacing_is_time_per_token() {
        let config =
            BucketConfig::new(5, 2.0, Duration::from_secs(1), 3, Duration::from_secs(10)).unwrap();
        assert_eq!(config.min_request_spacing(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_invalid_parameters() {
        let period = Duration::from_secs(1);
        assert!(BucketConfig::new(0, 1.0, period, 1, period).is_err());
        assert!(BucketConfig::new(1, 0.0, period, 1, period).is_err());
        assert!(BucketConfig::new(1, f64::NAN, period, 1, period).is_err());
        assert!(BucketConfig::new(1, 1.0, Duration::ZERO, 1, period).is_err());
        assert!(BucketConfig::new(1, 1.0, period, 0, period).is_err());
    }

    #[test]
    fn from_settings_applies_explicit_spacing() {
        let settings = BucketSettings {
            min_request_spacing_ms: Some(250),
            ..BucketSettings::default()
        };
        let config = BucketConfig::try_from(&settings).unwrap();
        assert_eq!(config.capacity(), 2.0);
        assert_eq!(config.refill_period(), Duration::from_millis(6000));
        assert_eq!(config.min_request_spacing(), Duration::from_millis(250));
    }

    #[test]
    fn from_settings_rejects_unknown_algorithm() {
        let settings = BucketSettings {
            algorithm: "leaky_bucket".into(),
            ..BucketSettings::default()
        };
        assert!(matches!(
            BucketConfig::try_from(&settings),
            Err(TollgateError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn one_period_accrues_refill_rate_tokens() {
        let config =
            BucketConfig::new(10, 3.0, Duration::from_millis(1500), 1, Duration::ZERO).unwrap();
        assert_eq!(config.tokens_for(Duration::from_millis(1500)), 3.0);
        assert_eq!(config.tokens_for(Duration::ZERO), 0.0);
    }
}
