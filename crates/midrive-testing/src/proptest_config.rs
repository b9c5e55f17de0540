//! Shared proptest configuration
//!
//! ```rust,ignore
//! use midrive_testing::proptest_config;
//!
//! proptest! {
//!     #![proptest_config(proptest_config::auto_config())]
//!
//!     #[test]
//!     fn parser_never_panics(line in ".*") {
//!         let _ = midrive_mi::parse_line(&line);
//!     }
//! }
//! ```
//!
//! `PROPTEST_PROFILE` picks the profile (`ci`, `nightly`, anything else is
//! standard); `PROPTEST_CASES` overrides its case count.

use proptest::prelude::*;

/// Fast feedback for PR checks
pub fn ci_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    }
}

pub fn nightly_config() -> ProptestConfig {
    ProptestConfig {
        cases: 5000,
        max_shrink_iters: 10000,
        ..ProptestConfig::default()
    }
}

/// Profile from `PROPTEST_PROFILE`, case count from `PROPTEST_CASES`
pub fn auto_config() -> ProptestConfig {
    let profile = std::env::var("PROPTEST_PROFILE").ok();
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok());
    config_for(profile.as_deref(), cases)
}

fn config_for(profile: Option<&str>, cases: Option<u32>) -> ProptestConfig {
    let config = match profile {
        Some("ci") => ci_config(),
        Some("nightly") => nightly_config(),
        _ => standard_config(),
    };
    match cases {
        Some(cases) => ProptestConfig { cases, ..config },
        None => config,
    }
}

pub fn standard_config() -> ProptestConfig {
    ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    }
}
