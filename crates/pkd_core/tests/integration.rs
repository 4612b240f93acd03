//! Integration tests for pkd core state handling.

use pkd_core::{
    filter_from_text, filter_to_text, Filter, PackageId, PackageItem, Info, Role, StateDir,
    TransactionDb,
};
use tempfile::tempdir;

#[test]
fn state_survives_daemon_restart() {
    let temp = tempdir().unwrap();
    let tid;
    {
        let dir = StateDir::open(temp.path(), true).unwrap();
        let mut db = TransactionDb::open(&dir).unwrap();
        tid = db.generate_id();
        db.add(&tid, 1_700_000_000).unwrap();
        db.set_role(&tid, Role::UpdateSystem).unwrap();
        let item = PackageItem::new(Info::Updating, "bash;5.2;x86_64;updates", "Shell");
        db.set_data(&tid, &item.to_ledger_line()).unwrap();
        db.set_finished(&tid, true, 4200).unwrap();
        db.action_time_reset(Role::UpdateSystem, 1_700_000_010).unwrap();
    }

    let dir = StateDir::open(temp.path(), true).unwrap();
    let mut db = TransactionDb::open(&dir).unwrap();
    let records = db.get_list(0);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tid, tid);
    assert_eq!(records[0].role, Role::UpdateSystem);
    assert!(records[0].succeeded);
    assert_eq!(db.action_time_since(Role::UpdateSystem, 1_700_000_070), 60);

    let next = db.generate_id();
    assert!(next.starts_with("/2_"));
}

#[test]
fn filter_and_package_id_grammar_together() {
    let filters = filter_from_text("installed;~devel").unwrap();
    assert!(filters.contains(Filter::Installed));
    assert_eq!(filter_to_text(&filters), "installed;~devel");

    let id: PackageId = "foo;1.0;x86_64;repo".parse().unwrap();
    assert_eq!(id.name, "foo");
    assert!("".parse::<PackageId>().is_err());
}
