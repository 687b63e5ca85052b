use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::budget::{Budget, BudgetReport};

/// Duplicate key handling policy for mappings.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateKeyPolicy {
    /// Error out on encountering a duplicate key.
    Error,
    /// First key wins: later duplicate values are consumed and ignored.
    FirstWins,
    /// Last key wins: the earlier value is released and the later one is loaded in its place.
    LastWins,
}

/// Loader configuration.
///
/// `Options` is read-only during a load and can be shared between any number of
/// concurrent loads.
///
/// ```rust
/// use schema_saphyr::options::DuplicateKeyPolicy;
/// use schema_saphyr::{Field, SchemaNode};
///
/// let schema = SchemaNode::mapping(1, vec![Field::new("on", 0, SchemaNode::boolean(1))]);
/// let options = schema_saphyr::options! {
///     duplicate_keys: DuplicateKeyPolicy::LastWins,
///     strict_booleans: true,
/// };
///
/// let tree = schema_saphyr::load_from_str("on: false\non: true\n", &options, &schema).unwrap();
/// assert_eq!(tree.view(&schema).field("on").and_then(|v| v.as_bool()), Some(true));
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Options {
    /// Most verbose level forwarded to the `log` facade. Default: `Warn`.
    pub log_level: LevelFilter,
    /// Optional YAML budget enforced while events are pulled (counts raw parser events).
    pub budget: Option<Budget>,
    /// Optional callback given the final budget report after a successful load.
    #[serde(skip)]
    pub budget_report: Option<fn(&BudgetReport)>,
    /// Policy for keys that occur more than once in one mapping.
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Read integers with a leading `0` followed by more digits (`0755`, `010`) as
    /// octal, as C's `strtol` does with base 0. Default: true. When false such
    /// literals are decimal and only `0o` marks octal.
    pub leading_zero_octal: bool,
    /// If true, only `true` and `false` (any case) are booleans; YAML 1.1 forms like
    /// `yes`/`no`/`on`/`off` are rejected. Default: false.
    pub strict_booleans: bool,
    /// Hard cap on decoded bytes read by the reader-based entry points.
    pub input_limit: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Warn,
            budget: None,
            budget_report: None,
            duplicate_keys: DuplicateKeyPolicy::Error,
            leading_zero_octal: true,
            strict_booleans: false,
            input_limit: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("log_level", &self.log_level)
            .field("budget", &self.budget)
            .field("budget_report", &if self.budget_report.is_some() { "set" } else { "none" })
            .field("duplicate_keys", &self.duplicate_keys)
            .field("leading_zero_octal", &self.leading_zero_octal)
            .field("strict_booleans", &self.strict_booleans)
            .field("input_limit", &self.input_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let opts = Options::default();
        assert_eq!(opts.log_level, LevelFilter::Warn);
        assert!(opts.budget.is_none());
        assert!(opts.budget_report.is_none());
        assert_eq!(opts.duplicate_keys, DuplicateKeyPolicy::Error);
        assert!(opts.leading_zero_octal);
        assert!(!opts.strict_booleans);
        assert!(opts.input_limit.is_none());
    }

    #[test]
    fn test_options_debug_format() {
        fn report(_: &BudgetReport) {}

        let opts = Options::default();
        let debug_str = format!("{:?}", opts);
        assert!(debug_str.contains("Options"));
        assert!(debug_str.contains("budget_report: \"none\""));

        let opts = Options {
            budget_report: Some(report),
            ..Options::default()
        };
        assert!(format!("{:?}", opts).contains("budget_report: \"set\""));
    }

    #[test]
    fn options_macro_overrides_fields() {
        let opts = crate::options! {
            strict_booleans: true,
            input_limit: Some(16),
        };
        assert!(opts.strict_booleans);
        assert_eq!(opts.input_limit, Some(16));
        assert_eq!(opts.duplicate_keys, DuplicateKeyPolicy::Error);
    }
}
