//! Error handling foundation for the idm crates.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums and wraps lower-level reports with `.context()` as they cross a
//! layer.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_alias_carries_context_type() {
        #[derive(Debug)]
        struct Boom;
        impl std::fmt::Display for Boom {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("boom")
            }
        }
        impl std::error::Error for Boom {}

        let err: Result<(), Boom> = Err(Report::new(Boom));
        let report = err.expect_err("should be an error");
        assert_eq!(report.current_context().to_string(), "boom");
    }
}
