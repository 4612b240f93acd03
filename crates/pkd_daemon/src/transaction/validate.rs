//! Request validation done before a transaction is cached.

use crate::error::{TransactionError, TransactionResult};
use crate::request::RoleRequest;
use pkd_core::{filter_check, package_ids_check, strvalidate, Provides, MAX_INPUT_LENGTH};
use std::fs;
use std::path::Path;

const SERVICE_PACK_EXTENSION: &str = "servicepack";

/// Validates search text.
pub fn search_check(search: &str) -> TransactionResult<()> {
    if search.is_empty() {
        return Err(TransactionError::search_invalid("Search string zero length"));
    }
    let length = search.chars().count();
    if length < 2 {
        return Err(TransactionError::search_invalid(
            "The search string length is too small",
        ));
    }
    if length > MAX_INPUT_LENGTH {
        return Err(TransactionError::search_invalid(
            "The search string length is too large",
        ));
    }
    if search.contains('*') {
        return Err(TransactionError::search_invalid(
            "Invalid search containing '*'",
        ));
    }
    if search.contains('?') {
        return Err(TransactionError::search_invalid(
            "Invalid search containing '?'",
        ));
    }
    if search.chars().any(char::is_control) {
        return Err(TransactionError::search_invalid(
            "Invalid search containing a control character",
        ));
    }
    if !strvalidate(search) {
        return Err(TransactionError::input_invalid("Invalid search term"));
    }
    Ok(())
}

fn check_filter(text: &str) -> TransactionResult<()> {
    filter_check(text).map_err(|e| TransactionError::input_invalid(e.to_string()))
}

fn check_package_ids(package_ids: &[String]) -> TransactionResult<()> {
    if package_ids_check(package_ids) {
        return Ok(());
    }
    Err(TransactionError::package_id_invalid(format!(
        "The package id's '{}' are not valid",
        package_ids.join("&")
    )))
}

fn check_text<S: AsRef<str>>(values: &[S]) -> TransactionResult<()> {
    if values.iter().all(|value| strvalidate(value.as_ref())) {
        Ok(())
    } else {
        Err(TransactionError::input_invalid(
            "Invalid input passed to daemon",
        ))
    }
}

fn check_files(full_paths: &[String]) -> TransactionResult<()> {
    check_text(full_paths)?;
    for path in full_paths {
        let path = Path::new(path);
        let metadata = fs::metadata(path).map_err(|_| {
            TransactionError::no_such_file(format!("No such file {}", path.display()))
        })?;
        let is_pack = path
            .extension()
            .is_some_and(|extension| extension == SERVICE_PACK_EXTENSION);
        if is_pack && metadata.len() == 0 {
            return Err(TransactionError::pack_invalid(format!(
                "The service pack {} is empty",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Checks everything about a request that does not depend on daemon state.
pub fn validate_request(request: &RoleRequest) -> TransactionResult<()> {
    if let Some(filter) = request.filter_text() {
        check_filter(filter)?;
    }
    if let Some(package_ids) = request.package_ids() {
        check_package_ids(package_ids)?;
    }

    match request {
        RoleRequest::SearchDetails { search, .. }
        | RoleRequest::SearchFile { search, .. }
        | RoleRequest::SearchGroup { search, .. }
        | RoleRequest::SearchName { search, .. } => search_check(search),
        RoleRequest::WhatProvides {
            provides, search, ..
        } => {
            if provides.parse::<Provides>().is_err() {
                return Err(TransactionError::invalid_provide(format!(
                    "provide type '{provides}' not found"
                )));
            }
            search_check(search)
        }
        RoleRequest::Resolve { packages, .. } => {
            if packages.is_empty() {
                return Err(TransactionError::input_invalid("No packages to resolve"));
            }
            check_text(packages.as_slice())
        }
        RoleRequest::InstallFiles { full_paths, .. }
        | RoleRequest::SimulateInstallFiles { full_paths } => check_files(full_paths),
        RoleRequest::InstallSignature {
            key_id, package_id, ..
        } => {
            check_text(&[key_id])?;
            check_package_ids(std::slice::from_ref(package_id))
        }
        RoleRequest::RepoEnable { repo_id, .. } => check_text(&[repo_id]),
        RoleRequest::RepoSetData {
            repo_id,
            parameter,
            value,
        } => check_text(&[repo_id, parameter, value]),
        RoleRequest::Rollback { transaction_id } => check_text(&[transaction_id]),
        RoleRequest::AcceptEula { eula_id } => check_text(&[eula_id]),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn search_rules() {
        assert!(search_check("power").is_ok());
        assert_eq!(
            search_check("").unwrap_err(),
            TransactionError::search_invalid("Search string zero length")
        );
        assert_eq!(search_check("a").unwrap_err().kind(), "search-invalid");
        assert_eq!(search_check("pow*").unwrap_err().kind(), "search-invalid");
        assert_eq!(search_check("pow?").unwrap_err().kind(), "search-invalid");
        assert!(search_check(&"a".repeat(1024)).is_ok());
        assert_eq!(search_check(&"a".repeat(1025)).unwrap_err().kind(), "search-invalid");
        assert_eq!(search_check("pow$er").unwrap_err().kind(), "input-invalid");
    }

    #[test]
    fn search_rejects_control_characters() {
        assert_eq!(search_check("pow\u{1}er").unwrap_err().kind(), "search-invalid");
        assert_eq!(search_check("pow\ner").unwrap_err().kind(), "search-invalid");
        assert_eq!(search_check("pow\u{7f}er").unwrap_err().kind(), "search-invalid");
        assert!(search_check("power top").is_ok());
    }

    #[test]
    fn search_length_counts_characters() {
        assert!(search_check(&"ö".repeat(600)).is_ok());
        assert!(search_check(&"ö".repeat(1024)).is_ok());
        assert_eq!(search_check(&"ö".repeat(1025)).unwrap_err().kind(), "search-invalid");
        assert!(search_check("öl").is_ok());
    }

    #[test]
    fn bad_filter_is_input_invalid() {
        let request = RoleRequest::GetPackages {
            filter: "installed;;devel".into(),
        };
        assert_eq!(validate_request(&request).unwrap_err().kind(), "input-invalid");
    }

    #[test]
    fn bad_package_id_is_rejected() {
        let request = RoleRequest::GetDetails {
            package_ids: vec![";1.0;i386;fedora".into()],
        };
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.kind(), "package-id-invalid");
        assert_eq!(
            err.detail(),
            "The package id's ';1.0;i386;fedora' are not valid"
        );
    }

    #[test]
    fn unknown_provide_is_rejected() {
        let request = RoleRequest::WhatProvides {
            filter: "none".into(),
            provides: "teleporter".into(),
            search: "gstreamer0.10(decoder-audio/mpeg)".into(),
        };
        assert_eq!(
            validate_request(&request).unwrap_err(),
            TransactionError::invalid_provide("provide type 'teleporter' not found")
        );
    }

    #[test]
    fn install_files_must_exist() {
        let temp = tempdir().unwrap();
        let present = temp.path().join("foo.rpm");
        fs::write(&present, b"rpm").unwrap();
        let empty_pack = temp.path().join("updates.servicepack");
        fs::write(&empty_pack, b"").unwrap();

        let request = |path: &Path| RoleRequest::InstallFiles {
            only_trusted: true,
            full_paths: vec![path.display().to_string()],
        };
        assert!(validate_request(&request(&present)).is_ok());
        assert_eq!(
            validate_request(&request(&temp.path().join("absent.rpm")))
                .unwrap_err()
                .kind(),
            "no-such-file"
        );
        assert_eq!(validate_request(&request(&empty_pack)).unwrap_err().kind(), "pack-invalid");
    }

    #[test]
    fn free_text_is_validated() {
        let request = RoleRequest::RepoSetData {
            repo_id: "fedora".into(),
            parameter: "baseurl".into(),
            value: "http://example.org/$basearch".into(),
        };
        assert_eq!(
            validate_request(&request).unwrap_err(),
            TransactionError::input_invalid("Invalid input passed to daemon")
        );
    }
}
