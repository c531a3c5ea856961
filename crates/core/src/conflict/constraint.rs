//! Affected-version range to composer constraint.
//!
//! Produces strings like:
//! - `1.4.2` (the range is a single version)
//! - `*` (every version, for an unpatched `* - *` range)
//! - `<=3.0.5` (open lower bound)
//! - `>=1.0.4,<2.0.0` / `>2.0.0,<=2.0.3` (both bounds)

use crate::conflict::version;
use crate::errors::ValidationError;
use crate::feed::AffectedVersionRange;

/// Why a range produced no constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unbuildable {
    /// The range has no (or an empty) upper bound.
    MissingUpperBound,
    /// One of the bounds is not a composer version.
    InvalidVersion(ValidationError),
}

impl std::fmt::Display for Unbuildable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingUpperBound => write!(f, "range has no upper bound"),
            Self::InvalidVersion(e) => write!(f, "{e}"),
        }
    }
}

/// Build the conflict constraint for a range, or `None` if it has none.
pub fn build(range: &AffectedVersionRange) -> Option<String> {
    try_build(range).ok()
}

/// Like [`build`], but says why a range was unbuildable.
pub fn try_build(range: &AffectedVersionRange) -> Result<String, Unbuildable> {
    let to_version = match range.to_version.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => return Err(Unbuildable::MissingUpperBound),
    };
    let from_version = range.from_version.as_str();

    version::validate(from_version).map_err(Unbuildable::InvalidVersion)?;
    version::validate(to_version).map_err(Unbuildable::InvalidVersion)?;

    let from_symbol = if range.from_inclusive { ">=" } else { ">" };
    let to_symbol = if range.to_inclusive { "<=" } else { "<" };

    Ok(if from_version == to_version {
        from_version.to_string()
    } else if from_version == "*" {
        format!("{to_symbol}{to_version}")
    } else {
        format!("{from_symbol}{from_version},{to_symbol}{to_version}")
    })
}
