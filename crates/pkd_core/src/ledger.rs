//! Transaction ledger.
//!
//! The ledger is an append-only JSON-lines journal. Each line is one
//! [`LedgerEntry`]; the current view (one [`LedgerRecord`] per transaction
//! plus the last time each role succeeded) is rebuilt by replaying the file
//! on open. A torn final line left by a crash is ignored.

use crate::dir::StateDir;
use crate::enums::Role;
use crate::error::CoreResult;
use crate::tid::TidGenerator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// One line of the ledger journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// A transaction was committed.
    Added {
        /// Transaction id.
        tid: String,
        /// Unix time in seconds.
        timestamp: u64,
    },
    /// The role of a transaction was recorded.
    Role {
        /// Transaction id.
        tid: String,
        /// Role text.
        role: Role,
    },
    /// The package summary of a transaction was recorded.
    Data {
        /// Transaction id.
        tid: String,
        /// One `info\tpackage_id\tsummary` line per package.
        data: String,
    },
    /// A transaction finished.
    Finished {
        /// Transaction id.
        tid: String,
        /// Whether it succeeded.
        succeeded: bool,
        /// Runtime in milliseconds.
        duration_ms: u64,
    },
    /// A role last succeeded at this time.
    ActionTime {
        /// Role that succeeded.
        role: Role,
        /// Unix time in seconds.
        timestamp: u64,
    },
}

/// The recorded history of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Transaction id.
    pub tid: String,
    /// Unix time in seconds when it was committed.
    pub timestamp: u64,
    /// Whether it succeeded.
    pub succeeded: bool,
    /// Role.
    pub role: Role,
    /// Runtime in milliseconds.
    pub duration_ms: u64,
    /// Package summary lines.
    pub data: String,
}

impl LedgerRecord {
    fn new(tid: String, timestamp: u64) -> Self {
        Self {
            tid,
            timestamp,
            succeeded: false,
            role: Role::Unknown,
            duration_ms: 0,
            data: String::new(),
        }
    }
}

/// Persistent history of transactions and role action times.
#[derive(Debug)]
pub struct TransactionDb {
    records: Vec<LedgerRecord>,
    index: HashMap<String, usize>,
    action_times: HashMap<Role, u64>,
    tids: TidGenerator,
    file: Option<File>,
}

impl TransactionDb {
    /// Creates a ledger that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            action_times: HashMap::new(),
            tids: TidGenerator::in_memory(),
            file: None,
        }
    }

    /// Opens the ledger and id counter inside a state directory.
    pub fn open(dir: &StateDir) -> CoreResult<Self> {
        let mut db = Self::open_file(&dir.ledger_path())?;
        db.tids = TidGenerator::open(dir.job_count_path());
        Ok(db)
    }

    /// Opens a ledger file, replaying any existing entries.
    ///
    /// Anything after the last complete, readable line is truncated so later
    /// appends start on a clean line.
    pub fn open_file(path: &Path) -> CoreResult<Self> {
        let mut db = Self::in_memory();
        let mut valid_len = 0u64;
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            for (number, line) in contents.split_inclusive('\n').enumerate() {
                if !line.ends_with('\n') {
                    warn!(line = number + 1, "ignoring torn ledger tail");
                    break;
                }
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    match serde_json::from_str::<LedgerEntry>(trimmed) {
                        Ok(entry) => db.apply(entry),
                        Err(e) => {
                            warn!(line = number + 1, "ignoring unreadable ledger tail: {}", e);
                            break;
                        }
                    }
                }
                valid_len += line.len() as u64;
            }
            debug!(records = db.records.len(), "replayed ledger");
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
        }
        db.file = Some(file);
        Ok(db)
    }

    /// Issues a new transaction id.
    pub fn generate_id(&mut self) -> String {
        self.tids.generate()
    }

    /// Records a newly committed transaction.
    pub fn add(&mut self, tid: &str, timestamp: u64) -> CoreResult<()> {
        if self.index.contains_key(tid) {
            warn!(tid, "transaction already in ledger");
            return Ok(());
        }
        self.record(LedgerEntry::Added {
            tid: tid.to_string(),
            timestamp,
        })
    }

    /// Records the role of a transaction.
    pub fn set_role(&mut self, tid: &str, role: Role) -> CoreResult<()> {
        if !self.known(tid) {
            return Ok(());
        }
        self.record(LedgerEntry::Role {
            tid: tid.to_string(),
            role,
        })
    }

    /// Records the package summary of a transaction.
    pub fn set_data(&mut self, tid: &str, data: &str) -> CoreResult<()> {
        if !self.known(tid) {
            return Ok(());
        }
        self.record(LedgerEntry::Data {
            tid: tid.to_string(),
            data: data.to_string(),
        })
    }

    /// Records the outcome of a transaction.
    pub fn set_finished(&mut self, tid: &str, succeeded: bool, duration_ms: u64) -> CoreResult<()> {
        if !self.known(tid) {
            return Ok(());
        }
        self.record(LedgerEntry::Finished {
            tid: tid.to_string(),
            succeeded,
            duration_ms,
        })
    }

    /// Returns a record by id.
    pub fn get(&self, tid: &str) -> Option<&LedgerRecord> {
        self.index.get(tid).map(|&i| &self.records[i])
    }

    /// Returns up to `limit` records, newest first. A limit of zero returns
    /// every record.
    pub fn get_list(&self, limit: usize) -> Vec<LedgerRecord> {
        let take = if limit == 0 { self.records.len() } else { limit };
        self.records.iter().rev().take(take).cloned().collect()
    }

    /// Number of recorded transactions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Marks `role` as having just succeeded.
    pub fn action_time_reset(&mut self, role: Role, timestamp: u64) -> CoreResult<()> {
        self.record(LedgerEntry::ActionTime { role, timestamp })
    }

    /// Seconds since `role` last succeeded, or zero if it never did.
    pub fn action_time_since(&self, role: Role, now: u64) -> u64 {
        self.action_times
            .get(&role)
            .map(|&then| now.saturating_sub(then))
            .unwrap_or(0)
    }

    fn known(&self, tid: &str) -> bool {
        let known = self.index.contains_key(tid);
        if !known {
            debug!(tid, "not in ledger, skipping update");
        }
        known
    }

    fn record(&mut self, entry: LedgerEntry) -> CoreResult<()> {
        if let Some(file) = self.file.as_mut() {
            let mut line = serde_json::to_string(&entry)?;
            line.push('\n');
            file.write_all(line.as_bytes())?;
            file.sync_data()?;
        }
        self.apply(entry);
        Ok(())
    }

    fn apply(&mut self, entry: LedgerEntry) {
        match entry {
            LedgerEntry::Added { tid, timestamp } => {
                if !self.index.contains_key(&tid) {
                    self.index.insert(tid.clone(), self.records.len());
                    self.records.push(LedgerRecord::new(tid, timestamp));
                }
            }
            LedgerEntry::Role { tid, role } => {
                if let Some(record) = self.record_mut(&tid) {
                    record.role = role;
                }
            }
            LedgerEntry::Data { tid, data } => {
                if let Some(record) = self.record_mut(&tid) {
                    record.data = data;
                }
            }
            LedgerEntry::Finished {
                tid,
                succeeded,
                duration_ms,
            } => {
                if let Some(record) = self.record_mut(&tid) {
                    record.succeeded = succeeded;
                    record.duration_ms = duration_ms;
                }
            }
            LedgerEntry::ActionTime { role, timestamp } => {
                self.action_times.insert(role, timestamp);
            }
        }
    }

    fn record_mut(&mut self, tid: &str) -> Option<&mut LedgerRecord> {
        let i = *self.index.get(tid)?;
        self.records.get_mut(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn finished_install(db: &mut TransactionDb, tid: &str, timestamp: u64) {
        db.add(tid, timestamp).unwrap();
        db.set_role(tid, Role::InstallPackages).unwrap();
        db.set_data(tid, "installing\tfoo;1.0;x86_64;repo\tFoo").unwrap();
        db.set_finished(tid, true, 1500).unwrap();
    }

    #[test]
    fn records_full_lifecycle() {
        let mut db = TransactionDb::in_memory();
        finished_install(&mut db, "/1_abcdeabc_data", 100);

        let record = db.get("/1_abcdeabc_data").unwrap();
        assert_eq!(record.role, Role::InstallPackages);
        assert!(record.succeeded);
        assert_eq!(record.duration_ms, 1500);
        assert_eq!(record.timestamp, 100);
        assert!(record.data.contains("foo;1.0;x86_64;repo"));
    }

    #[test]
    fn list_is_newest_first_and_limited() {
        let mut db = TransactionDb::in_memory();
        for i in 1..=5 {
            finished_install(&mut db, &format!("/{i}_aaaaaaaa_data"), i);
        }
        let all = db.get_list(0);
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].tid, "/5_aaaaaaaa_data");

        let two = db.get_list(2);
        assert_eq!(two.len(), 2);
        assert_eq!(two[1].tid, "/4_aaaaaaaa_data");
    }

    #[test]
    fn updates_for_unknown_tids_are_ignored() {
        let mut db = TransactionDb::in_memory();
        db.set_role("/9_x_data", Role::Resolve).unwrap();
        db.set_finished("/9_x_data", true, 1).unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn action_time_since() {
        let mut db = TransactionDb::in_memory();
        assert_eq!(db.action_time_since(Role::RefreshCache, 1000), 0);
        db.action_time_reset(Role::RefreshCache, 1000).unwrap();
        assert_eq!(db.action_time_since(Role::RefreshCache, 1060), 60);
        assert_eq!(db.action_time_since(Role::UpdateSystem, 1060), 0);
    }

    #[test]
    fn replay_restores_state() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("transactions.log");
        {
            let mut db = TransactionDb::open_file(&path).unwrap();
            finished_install(&mut db, "/1_abcdeabc_data", 10);
            db.action_time_reset(Role::InstallPackages, 12).unwrap();
        }
        let db = TransactionDb::open_file(&path).unwrap();
        assert_eq!(db.len(), 1);
        assert!(db.get("/1_abcdeabc_data").unwrap().succeeded);
        assert_eq!(db.action_time_since(Role::InstallPackages, 20), 8);
    }

    #[test]
    fn torn_tail_is_ignored() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("transactions.log");
        {
            let mut db = TransactionDb::open_file(&path).unwrap();
            finished_install(&mut db, "/1_abcdeabc_data", 10);
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"op\":\"added\",\"tid\":").unwrap();
        drop(file);

        let mut db = TransactionDb::open_file(&path).unwrap();
        assert_eq!(db.len(), 1);
        finished_install(&mut db, "/2_abcdeabc_data", 11);
        drop(db);

        let db = TransactionDb::open_file(&path).unwrap();
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn open_in_state_dir_issues_ordered_ids() {
        let temp = tempdir().unwrap();
        let dir = StateDir::open(temp.path(), true).unwrap();
        let mut db = TransactionDb::open(&dir).unwrap();
        let first = db.generate_id();
        let second = db.generate_id();
        assert!(first.starts_with("/1_"));
        assert!(second.starts_with("/2_"));
    }
}
