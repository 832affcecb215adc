//! Test logging infrastructure.
//!
//! Tests log their phases and assertion outcomes through the helpers in
//! this module so that a failing run can be replayed with full context.
//! Output is written to stderr. The logger knows three tiers, matching
//! what fence tests actually produce: assertion failures, phase
//! boundaries, and per-assert detail. Select one with the `TEST_LOG`
//! environment variable (`quiet`, `phases`, `verbose`, or `0`/`1`/`2`).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Once;

/// How much the test logger prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TestVerbosity {
    /// Assertion failures only.
    Quiet,
    /// Phase boundaries and failures.
    #[default]
    Phases,
    /// Sections and passing assertions as well.
    Verbose,
}

impl TestVerbosity {
    /// Reads the verbosity from the `TEST_LOG` environment variable.
    /// Unset or unrecognized values select [`TestVerbosity::Phases`].
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("TEST_LOG").map_or_else(|_| Self::default(), |raw| Self::parse(&raw))
    }

    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quiet" | "q" | "0" => Self::Quiet,
            "verbose" | "v" | "2" => Self::Verbose,
            _ => Self::Phases,
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Quiet => 0,
            Self::Phases => 1,
            Self::Verbose => 2,
        }
    }

    fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Self::Quiet,
            2 => Self::Verbose,
            _ => Self::Phases,
        }
    }
}

static VERBOSITY: AtomicU8 = AtomicU8::new(TestVerbosity::Phases.rank());
static INIT: Once = Once::new();

/// Initializes test logging from the environment. Idempotent.
pub fn init_test_logging() {
    INIT.call_once(|| {
        VERBOSITY.store(TestVerbosity::from_env().rank(), Ordering::Relaxed);
    });
}

fn verbosity() -> TestVerbosity {
    TestVerbosity::from_rank(VERBOSITY.load(Ordering::Relaxed))
}

/// Logs the start of a test phase.
pub fn log_phase(name: &str) {
    if verbosity() >= TestVerbosity::Phases {
        eprintln!("[test] ===== {name} =====");
    }
}

/// Logs a section within a test phase.
pub fn log_section(name: &str) {
    if verbosity() >= TestVerbosity::Verbose {
        eprintln!("[test] --- {name} ---");
    }
}

/// Logs the completion of a test phase.
pub fn log_complete(name: &str) {
    if verbosity() >= TestVerbosity::Phases {
        eprintln!("[test] ===== {name}: ok =====");
    }
}

/// Logs an assertion outcome. Failures always print.
pub fn log_assert(what: &str, ok: bool) {
    if !ok {
        eprintln!("[test] ASSERT FAILED: {what}");
    } else if verbosity() >= TestVerbosity::Verbose {
        eprintln!("[test] assert ok: {what}");
    }
}

/// Marks the start of a test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::test_utils::log_phase($name)
    };
}

/// Marks a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        $crate::test_utils::log_section($name)
    };
}

/// Marks the successful completion of a test phase.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::test_utils::log_complete($name)
    };
}

/// Asserts a condition, logging the outcome with expected/actual values.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $what:expr, $expected:expr, $actual:expr) => {{
        let ok = $cond;
        $crate::test_utils::log_assert($what, ok);
        assert!(
            ok,
            "{}: expected {:?}, actual {:?}",
            $what, $expected, $actual
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_parses_names_aliases_and_digits() {
        init_test_logging();
        crate::test_phase!("verbosity_parses_names_aliases_and_digits");
        for (raw, expected) in [
            ("quiet", TestVerbosity::Quiet),
            ("  Q ", TestVerbosity::Quiet),
            ("0", TestVerbosity::Quiet),
            ("phases", TestVerbosity::Phases),
            ("1", TestVerbosity::Phases),
            ("VERBOSE", TestVerbosity::Verbose),
            ("v", TestVerbosity::Verbose),
            ("2", TestVerbosity::Verbose),
            ("garbage", TestVerbosity::Phases),
            ("", TestVerbosity::Phases),
        ] {
            crate::assert_with_log!(
                TestVerbosity::parse(raw) == expected,
                "verbosity string parses",
                expected,
                TestVerbosity::parse(raw)
            );
        }
        crate::test_complete!("verbosity_parses_names_aliases_and_digits");
    }

    #[test]
    fn verbosity_tiers_are_ordered() {
        init_test_logging();
        crate::test_phase!("verbosity_tiers_are_ordered");
        crate::assert_with_log!(
            TestVerbosity::Quiet < TestVerbosity::Phases
                && TestVerbosity::Phases < TestVerbosity::Verbose,
            "tiers order quiet < phases < verbose",
            true,
            TestVerbosity::Quiet < TestVerbosity::Phases
        );
        crate::test_complete!("verbosity_tiers_are_ordered");
    }

    #[test]
    fn rank_round_trips() {
        init_test_logging();
        crate::test_phase!("rank_round_trips");
        for tier in [
            TestVerbosity::Quiet,
            TestVerbosity::Phases,
            TestVerbosity::Verbose,
        ] {
            crate::assert_with_log!(
                TestVerbosity::from_rank(tier.rank()) == tier,
                "rank survives the round trip",
                tier,
                TestVerbosity::from_rank(tier.rank())
            );
        }
        crate::test_complete!("rank_round_trips");
    }
}
