//! Property-based test generators using proptest.
//!
//! Provides strategies for generating client input that the daemon must
//! accept, and input it must refuse.

use pkd_core::{Filter, PackageId, TextEnum};
use pkd_daemon::RoleRequest;
use proptest::prelude::*;

const ARCHES: &[&str] = &["i386", "x86_64", "noarch", "armv7hl", ""];

/// Strategy for generating a single filter token other than `none`.
pub fn filter_token_strategy() -> impl Strategy<Value = &'static str> {
    let tokens: Vec<&'static str> = Filter::all()
        .iter()
        .filter(|filter| **filter != Filter::None)
        .map(|filter| filter.text())
        .collect();
    prop::sample::select(tokens)
}

/// Strategy for generating valid filter text.
pub fn filter_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        1 => Just("none".to_string()),
        4 => prop::collection::vec(filter_token_strategy(), 1..5)
            .prop_map(|tokens| tokens.join(";")),
    ]
}

/// Strategy for generating filter text the grammar must refuse.
pub fn invalid_filter_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        filter_text_strategy().prop_map(|text| format!("{text};")),
        filter_text_strategy().prop_map(|text| format!("{text};$installed")),
        prop::string::string_regex("[a-z]{3,8}")
            .expect("Invalid regex")
            .prop_filter("Must not be a known filter", |text| {
                Filter::from_text(text).is_none()
            }),
    ]
}

/// Strategy for generating valid package ids.
pub fn package_id_strategy() -> impl Strategy<Value = PackageId> {
    (
        prop::string::string_regex("[a-z][a-z0-9+._-]{0,20}").expect("Invalid regex"),
        prop::string::string_regex("([0-9][0-9a-z.]{0,8}-[0-9]{1,2})?").expect("Invalid regex"),
        prop::sample::select(ARCHES),
        prop::string::string_regex("[a-z]{0,10}").expect("Invalid regex"),
    )
        .prop_map(|(name, version, arch, data)| PackageId::new(name, version, arch, data))
}

/// Strategy for generating valid search text.
pub fn search_text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9 ._-]{1,40}").expect("Invalid regex")
}

fn package_ids_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(package_id_strategy().prop_map(|id| id.to_text()), 1..4)
}

/// Strategy for generating requests the dummy backend implements.
pub fn role_request_strategy() -> impl Strategy<Value = RoleRequest> {
    prop_oneof![
        (filter_text_strategy(), prop::collection::vec(search_text_strategy(), 1..3)).prop_map(
            |(filter, packages)| RoleRequest::Resolve { filter, packages }
        ),
        (filter_text_strategy(), search_text_strategy())
            .prop_map(|(filter, search)| RoleRequest::SearchName { filter, search }),
        (any::<bool>(), package_ids_strategy()).prop_map(|(only_trusted, package_ids)| {
            RoleRequest::InstallPackages {
                only_trusted,
                package_ids,
            }
        }),
        (package_ids_strategy(), any::<bool>(), any::<bool>()).prop_map(
            |(package_ids, allow_deps, autoremove)| RoleRequest::RemovePackages {
                package_ids,
                allow_deps,
                autoremove,
            }
        ),
        package_ids_strategy().prop_map(|package_ids| RoleRequest::GetDetails { package_ids }),
        any::<bool>().prop_map(|force| RoleRequest::RefreshCache { force }),
        any::<bool>().prop_map(|only_trusted| RoleRequest::UpdateSystem { only_trusted }),
        filter_text_strategy().prop_map(|filter| RoleRequest::GetUpdates { filter }),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::filter_check;
    use pkd_daemon::{search_check, validate_request};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_filters_are_accepted(text in filter_text_strategy()) {
            prop_assert!(filter_check(&text).is_ok());
        }

        #[test]
        fn invalid_filters_are_refused(text in invalid_filter_text_strategy()) {
            prop_assert!(filter_check(&text).is_err());
        }

        #[test]
        fn package_id_text_parses(id in package_id_strategy()) {
            let text = id.to_text();
            prop_assert!(PackageId::check(&text));
            prop_assert_eq!(PackageId::parse(&text).unwrap(), id);
        }

        #[test]
        fn search_text_is_accepted(search in search_text_strategy()) {
            prop_assert!(search_check(&search).is_ok());
        }

        #[test]
        fn generated_requests_validate(request in role_request_strategy()) {
            prop_assert!(validate_request(&request).is_ok());
        }
    }
}
