//! Matcher configuration
//!
//! Plain data passed explicitly into the solver and the chain builder.
//! Persisting or loading it is up to the embedding application; with the
//! `serde` feature enabled the struct can be deserialized from any format,
//! and missing fields fall back to their defaults.

use crate::error::ConfigError;

/// Tunable thresholds for matching a performance window against a bar
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatcherConfig {
    /// Window growth factor: a bar of `n` notes is searched for in
    /// `ceil(n * (1 + margin))` performed notes
    pub margin: f64,
    /// Requested size of the random test pattern
    pub pattern_length: usize,
    /// Minimum correlation for the note mapper to pair two notes
    pub correlation_threshold: f64,
    /// Largest fraction of unmatched reference notes that is still accepted
    pub missing_note_threshold: f64,
    /// Distance (reference pulses) at which a note's correlation drops to 0
    pub alignment_tolerance: f64,
    /// Distance (reference pulses) within which the comparator counts a note
    pub fit_tolerance: f64,
    /// Minimum coarse score, as a fraction of the test pattern length
    pub min_pattern_score: f64,
    /// Largest accepted tempo ratio between reference and performance
    pub max_tempo_ratio: f64,
    /// Iteration cap of the least-squares refiner
    pub refine_iterations: usize,
    /// Number of pitch buckets; pitches outside `[0, max_pitches)` are ignored
    pub max_pitches: usize,
    /// Base seed of the test pattern generator
    pub seed: u64,
}

impl MatcherConfig {
    pub fn new() -> Self {
        Self {
            margin: 0.25,
            pattern_length: 8,
            correlation_threshold: 0.5,
            missing_note_threshold: 0.25,
            alignment_tolerance: 0.25,
            fit_tolerance: 0.2,
            min_pattern_score: 0.5,
            max_tempo_ratio: 2.0,
            refine_iterations: 32,
            max_pitches: 128,
            seed: 0,
        }
    }

    /// Set the window margin
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Set the requested test pattern length
    pub fn with_pattern_length(mut self, length: usize) -> Self {
        self.pattern_length = length;
        self
    }

    /// Set the missing note threshold (1.0 accepts any non-empty match)
    pub fn with_missing_note_threshold(mut self, threshold: f64) -> Self {
        self.missing_note_threshold = threshold;
        self
    }

    /// Set the note mapper's correlation threshold
    pub fn with_correlation_threshold(mut self, threshold: f64) -> Self {
        self.correlation_threshold = threshold;
        self
    }

    /// Set both alignment and fit tolerances
    pub fn with_tolerances(mut self, alignment: f64, fit: f64) -> Self {
        self.alignment_tolerance = alignment;
        self.fit_tolerance = fit;
        self
    }

    /// Set the base seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of performed notes searched for a bar of `note_count` notes
    pub fn window_length(&self, note_count: usize) -> usize {
        (note_count as f64 * (1.0 + self.margin)).ceil() as usize
    }

    /// Check every field for a usable value
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("margin", self.margin, 0.0, 16.0)?;
        check_range("correlation_threshold", self.correlation_threshold, 0.0, 1.0)?;
        check_range("missing_note_threshold", self.missing_note_threshold, 0.0, 1.0)?;
        check_range("min_pattern_score", self.min_pattern_score, 0.0, 1.0)?;
        check_positive("alignment_tolerance", self.alignment_tolerance)?;
        check_positive("fit_tolerance", self.fit_tolerance)?;
        check_range("max_tempo_ratio", self.max_tempo_ratio, 1.0, f64::MAX)?;

        if self.pattern_length == 0 {
            return Err(ConfigError::Zero { field: "pattern_length" });
        }
        if self.refine_iterations == 0 {
            return Err(ConfigError::Zero { field: "refine_iterations" });
        }
        if self.max_pitches == 0 {
            return Err(ConfigError::Zero { field: "max_pitches" });
        }

        Ok(())
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field, value });
    }
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field, value });
    }
    if value <= 0.0 {
        return Err(ConfigError::OutOfRange {
            field,
            min: f64::MIN_POSITIVE,
            max: f64::MAX,
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(MatcherConfig::default().validate().is_ok());
    }

    #[test]
    fn test_window_length() {
        let config = MatcherConfig::default();
        // ceil(8 * 1.25) = 10
        assert_eq!(config.window_length(8), 10);
        assert_eq!(config.window_length(3), 4);
        assert_eq!(config.window_length(0), 0);

        let tight = MatcherConfig::default().with_margin(0.0);
        assert_eq!(tight.window_length(8), 8);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = MatcherConfig::default().with_missing_note_threshold(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "missing_note_threshold",
                ..
            })
        ));

        let config = MatcherConfig::default().with_tolerances(f64::NAN, 0.2);
        assert!(matches!(config.validate(), Err(ConfigError::NotFinite { .. })));

        let config = MatcherConfig::default().with_tolerances(0.25, 0.0);
        assert!(config.validate().is_err());

        let config = MatcherConfig::default().with_pattern_length(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "pattern_length"
            })
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MatcherConfig =
            serde_json::from_str(r#"{ "margin": 0.5, "seed": 7 }"#).unwrap();
        assert_eq!(config.margin, 0.5);
        assert_eq!(config.seed, 7);
        assert_eq!(config.pattern_length, 8);
    }
}
