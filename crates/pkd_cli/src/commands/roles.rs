//! Roles command implementation.

use pkd_daemon::BackendRegistry;

/// Loads a backend from the built-in registry and prints its capabilities.
pub fn run(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = BackendRegistry::builtin();
    let backend = registry
        .load(name)
        .map_err(|e| format!("{e} (available: {})", registry.names().join(", ")))?;

    println!("Backend:     {}", backend.name());
    println!("Description: {}", backend.description());
    println!("Author:      {}", backend.author());
    println!();
    println!("Roles:      {}", backend.roles().to_text());
    println!("Groups:     {}", backend.groups().to_text());
    println!("Filters:    {}", backend.filters().to_text());
    let mime_types = backend.mime_types();
    if mime_types.is_empty() {
        println!("Mime types: none");
    } else {
        println!("Mime types: {}", mime_types.join(";"));
    }
    println!(
        "Cancel:     {}",
        if backend.supports_cancel() { "yes" } else { "no" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_is_builtin() {
        assert!(run("dummy").is_ok());
    }

    #[test]
    fn unknown_backend_lists_alternatives() {
        let err = run("conary").unwrap_err();
        assert!(err.to_string().contains("dummy"));
    }
}
