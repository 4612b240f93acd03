//! Validation commands for filter text and package ids.

use pkd_core::{filter_from_text, filter_to_text, PackageId};

/// Validates filter text and prints its normalized form.
pub fn filter(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", normalize_filter(text)?);
    Ok(())
}

/// Validates a package id and prints its fields.
pub fn package_id(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let id = PackageId::parse(text)?;
    println!("Name:    {}", id.name);
    println!("Version: {}", id.version);
    println!("Arch:    {}", id.arch);
    println!("Data:    {}", id.data);
    Ok(())
}

fn normalize_filter(text: &str) -> Result<String, Box<dyn std::error::Error>> {
    let filters = filter_from_text(text)?;
    Ok(filter_to_text(&filters))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_text_is_normalized() {
        assert_eq!(normalize_filter("none").unwrap(), "none");
        assert!(normalize_filter("installed;~devel").is_ok());
        assert!(normalize_filter("installed;bogus").is_err());
    }

    #[test]
    fn package_ids_need_four_fields() {
        assert!(package_id("powertop;1.8-1.fc8;i386;fedora").is_ok());
        assert!(package_id("powertop;1.8-1.fc8;i386").is_err());
        assert!(package_id(";1.8;i386;fedora").is_err());
    }
}
