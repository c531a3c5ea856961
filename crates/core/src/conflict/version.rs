//! Composer version syntax.
//!
//! Accepts the single-token forms composer's constraint parser takes for a
//! bound: classical `major[.minor[.patch[.build]]]` versions with an optional
//! `v` prefix, date-based versions, stability modifiers (`-beta2`, `RC1`,
//! `-dev`, `-patch1`), `+build` metadata, a trailing `@stability` flag, the
//! `*`/`x` wildcard, wildcard versions (`1.0.*`, `1.x`), branch aliases
//! (`1.x-dev`) and `dev-` branches. Operators and multi-part constraints are
//! rejected: a bound is one token a `<`/`<=`/`>`/`>=` operator can prefix.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::errors::ValidationError;

const MODIFIER: &str =
    r"[._-]?(?:(?:stable|beta|b|rc|alpha|a|patch|pl|p)(?:(?:[.-]?\d+)*)?)?(?:[.-]?dev)?";

static CLASSICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^v?\d{{1,5}}(?:\.\d+)?(?:\.\d+)?(?:\.\d+)?{MODIFIER}$"))
        .expect("classical version regex is valid")
});

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^v?\d{{4}}(?:[.:-]?\d{{2}}){{1,6}}(?:[.:-]?\d{{1,3}}){{0,2}}{MODIFIER}$"
    ))
    .expect("date version regex is valid")
});

/// `1.*`, `1.0.x`, `2.x-dev`: numeric prefix with wildcard segments.
static WILDCARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^v?\d+(?:\.(?:\d+|x|\*)){0,3}(?:[.-]?dev)?$")
        .expect("wildcard version regex is valid")
});

static DEV_BRANCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^dev-[^\s,|<>=!^~@]+$").expect("dev branch regex is valid")
});

static STABILITY_FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)@(?:stable|rc|beta|alpha|dev)$").expect("stability flag regex is valid")
});

/// Check that `version` is a composer version bound.
pub fn validate(version: &str) -> Result<(), ValidationError> {
    if is_valid(version) {
        Ok(())
    } else {
        Err(ValidationError {
            version: version.to_string(),
        })
    }
}

/// Whether `version` is a composer version bound.
pub fn is_valid(version: &str) -> bool {
    let version = version.trim();
    if version.is_empty() || version.chars().any(char::is_whitespace) {
        return false;
    }

    let stripped = STABILITY_FLAG.replace(version, "");
    if matches!(&*stripped, "*" | "x" | "X") || DEV_BRANCH.is_match(&stripped) {
        return true;
    }

    let base = match stripped.split_once('+') {
        Some((_, "")) => return false,
        Some((base, _)) => base,
        None => &*stripped,
    };

    CLASSICAL.is_match(base) || DATE.is_match(base) || WILDCARD.is_match(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classical_versions() {
        for v in ["1", "1.0", "2.1.0", "4.9.22", "1.2.3.4", "v3.0.1", "10.0.0"] {
            assert!(is_valid(v), "{v} should be valid");
        }
    }

    #[test]
    fn test_modifiers_and_metadata() {
        for v in [
            "1.0.0-beta1",
            "1.0.0-RC2",
            "2.0.0alpha",
            "1.0.0-dev",
            "1.0.0-patch1",
            "1.0.0+20240101",
            "1.0.0@beta",
        ] {
            assert!(is_valid(v), "{v} should be valid");
        }
    }

    #[test]
    fn test_date_versions() {
        assert!(is_valid("2024.01.15"));
        assert!(is_valid("20240115"));
    }

    #[test]
    fn test_wildcards_and_branches() {
        for v in [
            "*", "x", "1.*", "1.0.*", "1.x", "1.2.X", "2.x-dev", "1.0.x-dev", "dev-master",
            "dev-feature/login", "dev-main@dev",
        ] {
            assert!(is_valid(v), "{v} should be valid");
        }
    }

    #[test]
    fn test_rejected_tokens() {
        for v in [
            "", " ", ">=1.0", "1.0 || 2.0", "1.0,2.0", "latest", "1.0.0+", "1.0.0.0.0", "n/a",
            "dev-", "**", "1.*.0.0.0", "^1.0",
        ] {
            assert!(!is_valid(v), "{v:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_reports_the_version() {
        let err = validate("abc").unwrap_err();
        assert_eq!(err.version, "abc");
        assert!(validate("1.2.3").is_ok());
    }
}
