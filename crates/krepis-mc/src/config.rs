//! Checker Configuration
//!
//! # Overview
//!
//! All recognized options, loaded from JSON with serde. Every section
//! defaults field-by-field, so a config file only needs the keys it changes:
//!
//! ```json
//! {
//!   "threads": { "break_start": true },
//!   "break_single_choice": false,
//!   "scheduler": { "policy": "round_robin" },
//!   "box_cache": { "int_high": 1023 },
//!   "search": { "max_depth": 500, "state_table": "exact" }
//! }
//! ```
//!
//! [`CheckerConfig::validate`] rejects anything the engine could not
//! resolve at startup; it is the only place configuration errors surface.

use crate::domain::scheduler::POLICY_NAMES;
use crate::domain::serializer::STATE_TABLE_NAMES;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Extra scheduling points for thread operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadBreakConfig {
    /// Branch on every thread start
    pub break_start: bool,
    /// Branch on `Thread.yield()`
    pub break_yield: bool,
    /// Branch on `Thread.sleep()`
    pub break_sleep: bool,
    /// Branch on every shared array access
    pub break_array_access: bool,
}

/// Scheduling policy selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// One of `default`, `round_robin`, `priority`, `randomized`
    pub policy: String,
    /// Seed for the `randomized` policy
    pub seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: "default".to_owned(),
            seed: 0,
        }
    }
}

/// Heap limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Raise the out-of-memory flag above this many live objects
    pub max_live_objects: Option<usize>,
}

/// Value ranges served from the boxed-value caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxCacheBounds {
    /// Lowest cached `Byte`
    pub byte_low: i64,
    /// Highest cached `Byte`
    pub byte_high: i64,
    /// Highest cached `Character` (lowest is always 0)
    pub char_high: i64,
    /// Lowest cached `Short`
    pub short_low: i64,
    /// Highest cached `Short`
    pub short_high: i64,
    /// Lowest cached `Integer`
    pub int_low: i64,
    /// Highest cached `Integer`
    pub int_high: i64,
    /// Lowest cached `Long`
    pub long_low: i64,
    /// Highest cached `Long`
    pub long_high: i64,
}

impl Default for BoxCacheBounds {
    fn default() -> Self {
        Self {
            byte_low: -128,
            byte_high: 127,
            char_high: 127,
            short_low: -128,
            short_high: 127,
            int_low: -128,
            int_high: 127,
            long_low: -128,
            long_high: 127,
        }
    }
}

impl BoxCacheBounds {
    fn validate(&self) -> Result<(), ConfigError> {
        let ranges = [
            ("byte", self.byte_low, self.byte_high, i64::from(i8::MIN), i64::from(i8::MAX)),
            ("char", 0, self.char_high, 0, i64::from(u16::MAX)),
            ("short", self.short_low, self.short_high, i64::from(i16::MIN), i64::from(i16::MAX)),
            ("int", self.int_low, self.int_high, i64::from(i32::MIN), i64::from(i32::MAX)),
            ("long", self.long_low, self.long_high, i64::MIN, i64::MAX),
        ];
        for (kind, low, high, min, max) in ranges {
            if low > high || low < min || high > max {
                return Err(ConfigError::InvalidBoxBounds { kind, low, high });
            }
        }
        Ok(())
    }
}

/// Exploration budgets and state matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Stop descending below this many decisions
    pub max_depth: Option<usize>,
    /// Abort after this many distinct states
    pub max_states: Option<usize>,
    /// Abort after this many transitions
    pub max_transitions: Option<usize>,
    /// Run GC after every transition, before fingerprinting
    pub gc_after_transition: bool,
    /// Visited-state table: `hashed` or `exact`
    pub state_table: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_states: None,
            max_transitions: None,
            gc_after_transition: true,
            state_table: "hashed".to_owned(),
        }
    }
}

/// Complete checker configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// `threads.*` break options
    pub threads: ThreadBreakConfig,
    /// Produce generators even for a single candidate
    pub break_single_choice: bool,
    /// Scheduling policy
    pub scheduler: SchedulerConfig,
    /// Heap limits
    pub heap: HeapConfig,
    /// Boxed-value cache bounds
    pub box_cache: BoxCacheBounds,
    /// Search budgets
    pub search: SearchConfig,
}

impl CheckerConfig {
    /// Parse and validate a JSON document
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed JSON, or any error from
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every option resolves
    ///
    /// # Errors
    ///
    /// Unknown policy or state table names, and invalid box bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !POLICY_NAMES.contains(&self.scheduler.policy.as_str()) {
            return Err(ConfigError::UnknownPolicy(self.scheduler.policy.clone()));
        }
        if !STATE_TABLE_NAMES.contains(&self.search.state_table.as_str()) {
            return Err(ConfigError::UnknownStateTable(self.search.state_table.clone()));
        }
        self.box_cache.validate()
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CheckerConfig::default();
        assert!(!config.break_single_choice);
        assert!(!config.threads.break_start);
        assert_eq!(config.scheduler.policy, "default");
        assert_eq!(config.box_cache.int_low, -128);
        assert_eq!(config.box_cache.char_high, 127);
        assert!(config.search.gc_after_transition);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = CheckerConfig::from_json(
            r#"{ "threads": { "break_yield": true }, "break_single_choice": true,
                 "box_cache": { "int_high": 1023 } }"#,
        )
        .unwrap();

        assert!(config.threads.break_yield);
        assert!(!config.threads.break_sleep);
        assert!(config.break_single_choice);
        assert_eq!(config.box_cache.int_high, 1023);
        assert_eq!(config.box_cache.int_low, -128);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let err = CheckerConfig::from_json(r#"{ "scheduler": { "policy": "lottery" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPolicy(name) if name == "lottery"));
    }

    #[test]
    fn test_unknown_state_table_rejected() {
        let err = CheckerConfig::from_json(r#"{ "search": { "state_table": "bloom" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStateTable(_)));
    }

    #[test]
    fn test_inverted_box_bounds_rejected() {
        let err = CheckerConfig::from_json(r#"{ "box_cache": { "short_low": 10, "short_high": 5 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBoxBounds { kind: "short", .. }));
    }

    #[test]
    fn test_byte_bounds_out_of_range() {
        let err = CheckerConfig::from_json(r#"{ "box_cache": { "byte_high": 300 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBoxBounds { kind: "byte", .. }));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(CheckerConfig::from_json("{ nope"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_json_round_trip_preserves_options() {
        let mut config = CheckerConfig::default();
        config.search.max_depth = Some(12);
        config.scheduler.policy = "priority".into();
        let parsed = CheckerConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
