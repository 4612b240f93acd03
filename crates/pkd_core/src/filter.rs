//! Filter grammar.
//!
//! A filter is a `;`-joined list of tokens, each of which may be negated
//! with a leading `~`. Tokens combine with AND. `none` means no filtering.

use crate::bitfield::{EnumSet, TextEnum};
use crate::enums::text_enum;
use crate::error::{CoreError, CoreResult};
use crate::text::strvalidate;

text_enum! {
    /// A single filter predicate, positive or negated.
    pub enum Filter("filter") {
        /// No filtering.
        None = "none",
        /// Only installed packages.
        Installed = "installed",
        /// Only packages that are not installed.
        NotInstalled = "~installed",
        /// Only development packages.
        Development = "devel",
        /// No development packages.
        NotDevelopment = "~devel",
        /// Only graphical packages.
        Gui = "gui",
        /// No graphical packages.
        NotGui = "~gui",
        /// Only free software.
        Free = "free",
        /// No free software.
        NotFree = "~free",
        /// Only packages visible to users.
        Visible = "visible",
        /// Only packages hidden from users.
        NotVisible = "~visible",
        /// Only supported packages.
        Supported = "supported",
        /// Only unsupported packages.
        NotSupported = "~supported",
        /// Only the base package of a split package.
        Basename = "basename",
        /// Only subpackages of a split package.
        NotBasename = "~basename",
        /// Only the newest version.
        Newest = "newest",
        /// Every version but the newest.
        NotNewest = "~newest",
        /// Only the native architecture.
        Arch = "arch",
        /// Only foreign architectures.
        NotArch = "~arch",
        /// Only source packages.
        Source = "source",
        /// No source packages.
        NotSource = "~source",
        /// Only collections.
        Collections = "collections",
        /// No collections.
        NotCollections = "~collections",
        /// Only applications.
        Application = "application",
        /// No applications.
        NotApplication = "~application",
    }
}

/// A conjunction of filter predicates.
pub type FilterSet = EnumSet<Filter>;

impl Filter {
    /// Returns the opposite predicate, or `None` for `none`.
    pub fn negation(self) -> Option<Filter> {
        let text = self.as_str();
        let flipped = match text.strip_prefix('~') {
            Some(positive) => positive.to_string(),
            None => format!("~{text}"),
        };
        <Filter as TextEnum>::from_text(&flipped)
    }

    /// Returns true if this predicate is a `~` negation.
    pub fn is_negated(self) -> bool {
        self.as_str().starts_with('~')
    }
}

impl FilterSet {
    /// Returns true if the set applies no filtering at all.
    pub fn is_unfiltered(&self) -> bool {
        self.iter().all(|f| f == Filter::None)
    }
}

/// Validates filter text.
///
/// Fails if the text is empty, contains unsafe characters, has an empty
/// `;` section, or names an unknown token.
pub fn filter_check(text: &str) -> CoreResult<()> {
    if text.is_empty() {
        return Err(CoreError::invalid_filter("filter zero length"));
    }
    if !strvalidate(text) {
        return Err(CoreError::invalid_filter(format!(
            "Invalid filter term: {text}"
        )));
    }
    for section in text.split(';') {
        if section.is_empty() {
            return Err(CoreError::invalid_filter(format!(
                "Single empty section of filter: {text}"
            )));
        }
        if <Filter as TextEnum>::from_text(section).is_none() {
            return Err(CoreError::invalid_filter(format!(
                "Unknown filter part: {section}"
            )));
        }
    }
    Ok(())
}

/// Parses filter text after validating it.
pub fn filter_from_text(text: &str) -> CoreResult<FilterSet> {
    filter_check(text)?;
    FilterSet::from_text(text)
}

/// Formats a filter set as canonical text.
pub fn filter_to_text(filters: &FilterSet) -> String {
    filters.to_text()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_tokens() {
        let set = filter_from_text("installed;~devel;newest").unwrap();
        assert!(set.contains(Filter::Installed));
        assert!(set.contains(Filter::NotDevelopment));
        assert!(set.contains(Filter::Newest));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn none_is_a_valid_filter() {
        let set = filter_from_text("none").unwrap();
        assert!(set.is_unfiltered());
        assert_eq!(filter_to_text(&set), "none");
        assert!(FilterSet::empty().is_unfiltered());
    }

    #[test]
    fn rejects_empty_text() {
        let err = filter_check("").unwrap_err();
        assert!(err.to_string().contains("filter zero length"));
    }

    #[test]
    fn rejects_empty_sections() {
        assert!(filter_check("installed;").is_err());
        assert!(filter_check(";installed").is_err());
        assert!(filter_check("installed;;gui").is_err());
    }

    #[test]
    fn rejects_unknown_parts() {
        let err = filter_check("installed;moo").unwrap_err();
        assert!(err.to_string().contains("Unknown filter part: moo"));
        assert!(filter_check("~none").is_err());
        assert!(filter_check("~~installed").is_err());
    }

    #[test]
    fn rejects_unsafe_characters() {
        assert!(filter_check("installed;$gui").is_err());
        assert!(filter_check("<gui>").is_err());
    }

    #[test]
    fn negation_flips_both_ways() {
        assert_eq!(Filter::Installed.negation(), Some(Filter::NotInstalled));
        assert_eq!(Filter::NotInstalled.negation(), Some(Filter::Installed));
        assert_eq!(Filter::None.negation(), None);
        assert!(Filter::NotGui.is_negated());
    }

    #[test]
    fn canonical_text_round_trips() {
        let text = "installed;~gui;arch";
        let set = filter_from_text(text).unwrap();
        let back = filter_to_text(&set);
        let mut want: Vec<&str> = text.split(';').collect();
        let mut got: Vec<&str> = back.split(';').collect();
        want.sort_unstable();
        got.sort_unstable();
        assert_eq!(want, got);
    }
}
