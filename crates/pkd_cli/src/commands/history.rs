//! History command implementation.

use pkd_core::{LedgerRecord, StateDir, TransactionDb};
use std::path::Path;

/// Runs the history command.
pub fn run(path: &Path, limit: usize, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let records = load(path, limit)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => print_text_output(&records),
    }
    Ok(())
}

/// Reads up to `limit` ledger records, newest first.
pub fn load(path: &Path, limit: usize) -> Result<Vec<LedgerRecord>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No state directory found at {:?}", path).into());
    }
    let dir = StateDir::open(path, false)?;
    let db = TransactionDb::open(&dir)?;
    Ok(db.get_list(limit))
}

fn print_text_output(records: &[LedgerRecord]) {
    if records.is_empty() {
        println!("No transactions recorded");
        return;
    }
    for record in records {
        let outcome = if record.succeeded { "ok" } else { "failed" };
        println!(
            "{}  {}  {}  {}  {} ms",
            record.timestamp, record.tid, record.role, outcome, record.duration_ms
        );
        for line in record.data.lines() {
            println!("    {}", line.replace('\t', "  "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::Role;
    use tempfile::tempdir;

    #[test]
    fn reads_records_newest_first() {
        let temp = tempdir().unwrap();

        // Write two records through the ledger
        {
            let dir = StateDir::open(temp.path(), true).unwrap();
            let mut db = TransactionDb::open(&dir).unwrap();
            let first = db.generate_id();
            db.add(&first, 100).unwrap();
            db.set_role(&first, Role::InstallPackages).unwrap();
            db.set_finished(&first, true, 1200).unwrap();
            let second = db.generate_id();
            db.add(&second, 200).unwrap();
            db.set_role(&second, Role::RemovePackages).unwrap();
            db.set_finished(&second, false, 40).unwrap();
        }

        let records = load(temp.path(), 0).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::RemovePackages);
        assert!(!records[0].succeeded);
        assert_eq!(records[1].role, Role::InstallPackages);

        let limited = load(temp.path(), 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempdir().unwrap();
        assert!(load(&temp.path().join("absent"), 0).is_err());
    }
}
