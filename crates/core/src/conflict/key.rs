//! Package identifiers for vulnerable software.
//!
//! Plugins and themes are installed through WPackagist, WordPress core through
//! the `roots/wordpress` package. Nothing else has a composer package we can
//! put in a conflict section.

use crate::feed::SoftwareType;

/// Composer package for WordPress core.
pub const WORDPRESS_CORE_PACKAGE: &str = "roots/wordpress";

/// Map a software record to its composer package identifier.
///
/// Returns `None` for software with no package mapping, which callers treat
/// as a silent skip.
pub fn resolve(software_type: SoftwareType, slug: &str) -> Option<String> {
    let slug = slug.to_lowercase();
    match software_type {
        SoftwareType::Plugin => Some(format!("wpackagist-plugin/{slug}")),
        SoftwareType::Theme => Some(format!("wpackagist-theme/{slug}")),
        SoftwareType::Core if slug == "wordpress" => Some(WORDPRESS_CORE_PACKAGE.to_string()),
        SoftwareType::Core | SoftwareType::Unsupported => None,
    }
}
