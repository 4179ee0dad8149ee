use std::error::Error;

use pf_tables::errors::TableError;
use pf_tables::{AddrRecord, Feedback, OpFlags, TableFlags, TableRegistry};

mod common {
    use std::io::Write;

    pub fn init() {
        let _ = env_logger::builder()
            .format(|buf, record| writeln!(buf, "{}", record.args()))
            .is_test(true)
            .try_init();
    }
}

fn records(strs: &[&str]) -> Result<Vec<AddrRecord>, TableError> {
    strs.iter().map(|s| s.parse::<AddrRecord>()).collect()
}

fn registry_with(name: &str) -> Result<TableRegistry, TableError> {
    let reg: TableRegistry = TableRegistry::try_default()?;
    reg.create_table(name)?;
    Ok(reg)
}

#[test]
fn test_add_test_set_scenario() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("T")?;
    let t = reg.table("T")?;

    let report = reg.add_addrs("T", &records(&["10.0.0.0/24"])?, OpFlags::default())?;
    assert_eq!(report.feedback_values(), vec![Feedback::Added]);
    assert_eq!(t.count(), 1);

    let report = reg.test_addrs("T", &records(&["10.0.0.5"])?)?;
    assert_eq!(report.feedback_values(), vec![Feedback::Match]);
    let report = reg.test_addrs("T", &records(&["10.0.1.5"])?)?;
    assert_eq!(report.feedback_values(), vec![Feedback::None]);

    let report = reg.set_addrs(
        "T",
        &records(&["10.0.0.0/24", "10.0.2.0/24"])?,
        OpFlags::default(),
        None,
    )?;
    assert_eq!((report.added, report.deleted, report.changed), (1, 0, 0));
    assert_eq!(
        report.feedback_values(),
        vec![Feedback::None, Feedback::Added]
    );
    assert_eq!(t.count(), 2);

    let report = reg.add_addrs("T", &records(&["!10.0.0.0/24"])?, OpFlags::default())?;
    assert_eq!(report.feedback_values(), vec![Feedback::None]);
    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults.first().map(|f| &f.error), Some(&TableError::Conflict));
    assert!(!report.is_clean());
    assert_eq!(t.count(), 2);
    t.verify();

    Ok(())
}

#[test]
fn test_add_is_idempotent() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("idem")?;
    let recs = records(&["192.0.2.0/24", "!192.0.2.128/25", "2001:db8::/48"])?;

    let first = reg.add_addrs("idem", &recs, OpFlags::default())?;
    assert_eq!(first.added, 3);
    assert!(first.feedback_values().iter().all(|f| *f == Feedback::Added));

    let second = reg.add_addrs("idem", &recs, OpFlags::default())?;
    assert_eq!(second.added, 0);
    assert!(second.is_clean());
    assert!(second.feedback_values().iter().all(|f| *f == Feedback::None));
    assert_eq!(reg.table("idem")?.count(), 3);

    Ok(())
}

#[test]
fn test_round_trip() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("rt")?;
    // Already in the order get() returns: IPv4 first, by address then
    // length.
    let recs = records(&[
        "10.0.0.0/8",
        "10.0.0.0/16",
        "!10.1.0.0/16",
        "192.0.2.7",
        "::/0",
        "2001:db8::/32",
        "!2001:db8:1::/48",
    ])?;
    reg.add_addrs("rt", &recs, OpFlags::default())?;
    assert_eq!(reg.get_addrs("rt", 16)?, recs);

    assert_eq!(
        reg.get_addrs("rt", 6),
        Err(TableError::CapacityTooSmall { required: 7 })
    );

    let report = reg.del_addrs("rt", &recs, OpFlags::default())?;
    assert_eq!(report.deleted, 7);
    assert!(reg.get_addrs("rt", 16)?.is_empty());
    reg.table("rt")?.verify();

    Ok(())
}

#[test]
fn test_duplicates_in_one_call() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("dup")?;
    let report = reg.add_addrs(
        "dup",
        &records(&["10.0.0.0/8", "10.0.0.0/8", "!10.0.0.0/8"])?,
        OpFlags::default(),
    )?;
    assert_eq!(
        report.feedback_values(),
        vec![Feedback::Added, Feedback::None, Feedback::None]
    );
    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults.first().map(|f| f.index), Some(2));

    let report = reg.del_addrs(
        "dup",
        &records(&["10.0.0.0/8", "!10.0.0.0/8"])?,
        OpFlags::default(),
    )?;
    assert_eq!(
        report.feedback_values(),
        vec![Feedback::Deleted, Feedback::None]
    );
    assert_eq!(reg.table("dup")?.count(), 0);

    Ok(())
}

#[test]
fn test_invalid_records_do_not_abort_the_batch() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("inv")?;
    let mut bad = AddrRecord::host("192.0.2.1".parse()?);
    bad.net = 24;
    let mut wide = AddrRecord::host("192.0.2.0".parse()?);
    wide.net = 40;
    let good: AddrRecord = "198.51.100.0/24".parse()?;

    let report = reg.add_addrs("inv", &[bad, good, wide], OpFlags::default())?;
    assert_eq!(
        report.feedback_values(),
        vec![Feedback::None, Feedback::Added, Feedback::None]
    );
    assert_eq!(
        report.faults.iter().map(|f| f.index).collect::<Vec<_>>(),
        vec![0, 2]
    );
    assert_eq!(reg.table("inv")?.count(), 1);

    // Test only takes host addresses.
    let report = reg.test_addrs("inv", &[good])?;
    assert!(matches!(
        report.faults.first().map(|f| &f.error),
        Some(TableError::InvalidArgument(_))
    ));

    Ok(())
}

#[test]
fn test_set_changes_negation() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("neg")?;
    reg.add_addrs(
        "neg",
        &records(&["10.0.0.0/8", "10.1.0.0/16", "192.0.2.0/24"])?,
        OpFlags::default(),
    )?;
    assert_eq!(
        reg.test_addrs("neg", &records(&["10.1.2.3"])?)?.feedback_values(),
        vec![Feedback::Match]
    );

    let report = reg.set_addrs(
        "neg",
        &records(&["10.0.0.0/8", "!10.1.0.0/16"])?,
        OpFlags::default(),
        Some(8),
    )?;
    assert_eq!((report.added, report.deleted, report.changed), (0, 1, 1));
    assert_eq!(
        report.feedback,
        records(&["10.0.0.0/8", "!10.1.0.0/16"])?
            .into_iter()
            .zip([Feedback::None, Feedback::Changed])
            .map(|(r, f)| r.with_feedback(f))
            .chain([
                "192.0.2.0/24".parse::<AddrRecord>()?.with_feedback(Feedback::Deleted)
            ])
            .collect::<Vec<_>>()
    );

    let report = reg.test_addrs("neg", &records(&["10.1.2.3", "10.2.0.1", "192.0.2.1"])?)?;
    assert_eq!(
        report.feedback_values(),
        vec![Feedback::None, Feedback::Match, Feedback::None]
    );
    reg.table("neg")?.verify();

    Ok(())
}

#[test]
fn test_set_capacity_is_checked_first() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("cap")?;
    let old = records(&["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"])?;
    reg.add_addrs("cap", &old, OpFlags::default())?;

    let new = records(&["100.64.0.0/10"])?;
    assert_eq!(
        reg.set_addrs("cap", &new, OpFlags::default(), Some(3)),
        Err(TableError::CapacityTooSmall { required: 4 })
    );
    assert_eq!(reg.get_addrs("cap", 8)?, old);

    let report = reg.set_addrs("cap", &new, OpFlags::default(), Some(4))?;
    assert_eq!(report.feedback.len(), 4);
    assert_eq!(reg.get_addrs("cap", 8)?, new);

    Ok(())
}

#[test]
fn test_dry_run_changes_nothing() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("dry")?;
    reg.add_addrs("dry", &records(&["10.0.0.0/8"])?, OpFlags::default())?;
    let before = reg.get_addrs("dry", 8)?;

    let report = reg.set_addrs(
        "dry",
        &records(&["!10.0.0.0/8", "192.0.2.0/24"])?,
        OpFlags::dry_run(),
        None,
    )?;
    assert_eq!((report.added, report.deleted, report.changed), (1, 0, 1));

    let report = reg.add_addrs("dry", &records(&["198.51.100.0/24"])?, OpFlags::dry_run())?;
    assert_eq!(report.added, 1);
    assert_eq!(reg.clr_addrs("dry", OpFlags::dry_run())?, 1);
    assert_eq!(reg.get_addrs("dry", 8)?, before);
    assert_eq!(reg.entries_used(), 1);

    Ok(())
}

#[test]
fn test_atomic_flag() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("atomic")?;
    let recs = records(&["10.0.0.0/8", "2001:db8::/32"])?;
    let report = reg.add_addrs("atomic", &recs, OpFlags::atomic())?;
    assert_eq!(report.added, 2);
    let report = reg.set_addrs("atomic", &recs[..1], OpFlags::atomic(), None)?;
    assert_eq!(report.deleted, 1);
    assert_eq!(reg.clr_addrs("atomic", OpFlags::atomic())?, 1);
    assert_eq!(reg.table("atomic")?.count(), 0);

    Ok(())
}

#[test]
fn test_constant_table() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("const")?;
    reg.add_addrs("const", &records(&["10.0.0.0/8"])?, OpFlags::default())?;
    let on = TableFlags { constant: true };
    reg.set_tflags("const", on, TableFlags::default())?;

    let recs = records(&["192.0.2.0/24"])?;
    assert_eq!(
        reg.add_addrs("const", &recs, OpFlags::default()).map(|r| r.added),
        Err(TableError::PermissionDenied)
    );
    assert_eq!(
        reg.set_addrs("const", &recs, OpFlags::default(), None)
            .map(|r| r.added),
        Err(TableError::PermissionDenied)
    );
    assert_eq!(
        reg.clr_addrs("const", OpFlags::default()),
        Err(TableError::PermissionDenied)
    );
    // Reading and testing is still fine.
    assert_eq!(reg.get_addrs("const", 8)?.len(), 1);
    assert_eq!(
        reg.test_addrs("const", &records(&["10.9.9.9"])?)?.matched,
        1
    );

    reg.set_tflags("const", TableFlags::default(), on)?;
    assert_eq!(reg.add_addrs("const", &recs, OpFlags::default())?.added, 1);

    Ok(())
}

#[test]
fn test_clear_table() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let reg = registry_with("clr")?;
    reg.add_addrs(
        "clr",
        &records(&["10.0.0.0/8", "10.0.0.0/9", "::1", "fe80::/10"])?,
        OpFlags::default(),
    )?;
    assert_eq!(reg.clr_addrs("clr", OpFlags::default())?, 4);
    let t = reg.table("clr")?;
    assert_eq!(t.count(), 0);
    t.verify();
    assert!(!t.classify("10.1.1.1".parse()?));
    assert_eq!(reg.entries_used(), 0);

    Ok(())
}
