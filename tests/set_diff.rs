use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::net::Ipv4Addr;

use inetnum::addr::Prefix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pf_tables::{AddrRecord, Feedback, OpFlags, TableRegistry};

mod common {
    use std::io::Write;

    pub fn init() {
        let _ = env_logger::builder()
            .format(|buf, record| writeln!(buf, "{}", record.args()))
            .is_test(true)
            .try_init();
    }
}

// A small key space, so that random states overlap a lot.
fn random_state(rng: &mut StdRng) -> Result<BTreeMap<(u32, u8), bool>, Box<dyn Error>> {
    let mut state = BTreeMap::new();
    for _ in 0..rng.random_range(0..24) {
        let len = [8_u8, 16, 24, 32][rng.random_range(0..4)];
        let addr = (10_u32 << 24) | (rng.random_range(0..4_u32) << 16) | (rng.random_range(0..4_u32) << 8);
        let net = match len {
            8 => addr & 0xff00_0000,
            16 => addr & 0xffff_0000,
            _ => addr,
        };
        state.insert((net, len), rng.random_bool(0.3));
    }
    Ok(state)
}

fn to_records(state: &BTreeMap<(u32, u8), bool>) -> Result<Vec<AddrRecord>, Box<dyn Error>> {
    state
        .iter()
        .map(|((net, len), negate)| {
            Ok(AddrRecord::new(
                Prefix::new(Ipv4Addr::from(*net).into(), *len)?,
                *negate,
            ))
        })
        .collect()
}

#[test]
fn test_set_diff_is_minimal() -> Result<(), Box<dyn Error>> {
    crate::common::init();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let reg: TableRegistry = TableRegistry::try_default()?;
    let table = reg.create_table("diff")?;

    for round in 0..200 {
        let current = random_state(&mut rng)?;
        let desired = random_state(&mut rng)?;

        reg.clr_addrs("diff", OpFlags::default())?;
        reg.add_addrs("diff", &to_records(&current)?, OpFlags::default())?;

        let flags = match round % 2 {
            0 => OpFlags::default(),
            _ => OpFlags::atomic(),
        };
        let report = reg.set_addrs("diff", &to_records(&desired)?, flags, None)?;

        let cur_keys = current.keys().collect::<BTreeSet<_>>();
        let des_keys = desired.keys().collect::<BTreeSet<_>>();
        let changed = cur_keys
            .intersection(&des_keys)
            .filter(|k| current.get(**k) != desired.get(**k))
            .count();

        assert_eq!(report.added, des_keys.difference(&cur_keys).count());
        assert_eq!(report.deleted, cur_keys.difference(&des_keys).count());
        assert_eq!(report.changed, changed);
        assert!(report.is_clean());
        assert_eq!(report.feedback.len(), desired.len());

        let mut got = reg.get_addrs("diff", 64)?;
        got.iter_mut().for_each(|r| r.feedback = Feedback::None);
        assert_eq!(got, to_records(&desired)?);
        assert_eq!(table.count(), desired.len());
        table.verify();
    }
    assert_eq!(reg.entries_used(), table.count());

    Ok(())
}
