//! Public macros for constructing option structs without relying on struct literal syntax.
//!
//! These keep call sites ergonomic while allowing [`crate::Options`] to gain fields
//! without forcing breaking changes.

/// Construct [`crate::Options`] from `Default` and a list of field assignments.
///
/// Example:
///
/// ```rust
/// use schema_saphyr::options::DuplicateKeyPolicy;
///
/// let options = schema_saphyr::options! {
///     duplicate_keys: DuplicateKeyPolicy::FirstWins,
///     leading_zero_octal: false,
/// };
/// assert!(!options.leading_zero_octal);
/// ```
#[macro_export]
macro_rules! options {
    ( $( $field:ident : $value:expr ),* $(,)? ) => {{
        let mut opt = $crate::Options::default();
        $(
            opt.$field = $value;
        )*
        opt
    }};
}

/// Forward a diagnostic to the `log` facade when `$options.log_level` lets it through.
///
/// Logging is purely observational: nothing here may influence control flow.
macro_rules! diag {
    ($options:expr, $level:expr, $($arg:tt)+) => {{
        let level: log::Level = $level;
        if level <= $options.log_level {
            log::log!(target: "schema_saphyr", level, $($arg)+);
        }
    }};
}
