#![cfg(feature = "cli")]

use ansi_term::Colour;
use pf_tables::errors::TableError;
use pf_tables::registry::config::LimitsConfig;
use pf_tables::{
    AddrRecord, BulkReport, Feedback, OpFlags, TableFlags, TableHandle,
    TableRegistry,
};

use std::env;
use std::error::Error;
use std::fs::File;
use std::path::Path;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const HISTORY_FILE: &str = "/tmp/pf-tables-history.txt";

const HELP: &str = "\
commands:
  create <table>               drop <table>             tables
  flush <table>                add <table> <addr>...    del <table> <addr>...
  replace <table> <addr>...    test <table> <addr>...   show <table>
  astats <table> [zero]        tstats [zero]            zero <table>|all
  const <table> on|off         wrap <table>             unwrap <handle>
  load <table> <file.csv>      help                     quit
addresses are written as [!]addr[/len]";

fn load_config() -> Result<LimitsConfig, Box<dyn Error>> {
    match env::args_os().nth(1) {
        None => Ok(LimitsConfig {
            create_on_add: true,
            ..Default::default()
        }),
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(LimitsConfig::from_json(&json)?)
        }
    }
}

// One address per row, in the first column. Rows starting with `#` are
// skipped.
fn load_records(path: &Path) -> Result<Vec<AddrRecord>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(file);
    let mut records = vec![];
    for result in rdr.records() {
        let row = result?;
        if let Some(field) = row.get(0) {
            records.push(field.parse::<AddrRecord>()?);
        }
    }
    Ok(records)
}

fn parse_records(args: &[&str]) -> Result<Vec<AddrRecord>, TableError> {
    args.iter().map(|a| a.parse::<AddrRecord>()).collect()
}

fn print_report(report: &BulkReport) {
    for rec in &report.feedback {
        let colour = match rec.feedback {
            Feedback::Added | Feedback::Match => Colour::Green,
            Feedback::Deleted => Colour::Red,
            Feedback::Changed | Feedback::Cleared => Colour::Yellow,
            Feedback::None => Colour::White,
        };
        println!("{:<8} {}", colour.paint(rec.feedback.to_string()), rec);
    }
    for fault in &report.faults {
        println!("{}", Colour::Red.paint(fault.to_string()));
    }
    println!(
        "added {}, deleted {}, changed {}, matched {}",
        report.added, report.deleted, report.changed, report.matched
    );
}

fn run(
    reg: &TableRegistry<LimitsConfig>,
    cmd: &str,
    args: &[&str],
) -> Result<(), Box<dyn Error>> {
    let flags = OpFlags::default();
    match (cmd, args) {
        ("help", _) => println!("{}", HELP),
        ("create", [name]) => {
            reg.create_table(name)?;
        }
        ("drop", [name]) => {
            if !reg.delete_table(name) {
                return Err(TableError::NotFound.into());
            }
        }
        ("tables", []) => {
            for name in reg.get_tables() {
                println!("{}", name);
            }
        }
        ("flush", [name]) => {
            println!("{} addresses deleted", reg.clr_addrs(name, flags)?);
        }
        ("add", [name, addrs @ ..]) => {
            print_report(&reg.add_addrs(name, &parse_records(addrs)?, flags)?)
        }
        ("del", [name, addrs @ ..]) => {
            print_report(&reg.del_addrs(name, &parse_records(addrs)?, flags)?)
        }
        ("replace", [name, addrs @ ..]) => {
            let records = parse_records(addrs)?;
            let capacity = records.len() + reg.table(name)?.count();
            print_report(&reg.set_addrs(
                name,
                &records,
                flags,
                Some(capacity),
            )?)
        }
        ("test", [name, addrs @ ..]) => {
            print_report(&reg.test_addrs(name, &parse_records(addrs)?)?)
        }
        ("show", [name]) => {
            let count = reg.table(name)?.count();
            for rec in reg.get_addrs(name, count)? {
                println!("{}", rec);
            }
        }
        ("astats", [name, rest @ ..]) => {
            let flags = match rest {
                ["zero"] => flags.with_clear_stats(),
                _ => flags,
            };
            let count = reg.table(name)?.count();
            let stats = reg.get_astats(name, count, flags)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        ("tstats", rest) => {
            let flags = match rest {
                ["zero"] => flags.with_clear_stats(),
                _ => flags,
            };
            let stats = reg.get_tstats(flags)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        ("zero", ["all"]) => {
            let n = reg.clr_tstats(None, flags.with_addrs_too())?;
            println!("statistics of {} tables cleared", n);
        }
        ("zero", [name]) => {
            if reg.clr_tstats(Some(&[*name]), flags.with_addrs_too())? == 0 {
                return Err(TableError::NotFound.into());
            }
        }
        ("const", [name, onoff]) => {
            let on = TableFlags { constant: true };
            let off = TableFlags::default();
            let flags = match *onoff {
                "on" => reg.set_tflags(name, on, off)?,
                "off" => reg.set_tflags(name, off, on)?,
                _ => return Err("expected on or off".into()),
            };
            println!("constant: {}", flags.constant);
        }
        ("wrap", [name]) => println!("{}", reg.wrap_table(name)?),
        ("unwrap", [handle]) => {
            let handle = handle.parse::<TableHandle>()?;
            println!("{}", reg.unwrap_table(&handle)?);
        }
        ("load", [name, path]) => {
            let records = load_records(Path::new(path))?;
            println!("read {} addresses from {}", records.len(), path);
            let report = reg.add_addrs(name, &records, flags)?;
            println!(
                "added {}, {} rejected",
                report.added,
                report.faults.len()
            );
        }
        _ => return Err(format!("unknown command {:?}, try help", cmd).into()),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let reg = TableRegistry::new_with_config(load_config()?)?;

    let mut rl = DefaultEditor::new()?;
    if rl.load_history(HISTORY_FILE).is_err() {
        println!("No previous history.");
    }
    loop {
        match rl.readline("(pf-tables)> ") {
            Ok(line) => {
                let words = line.split_whitespace().collect::<Vec<_>>();
                let Some((cmd, args)) = words.split_first() else {
                    continue;
                };
                rl.add_history_entry(line.as_str())?;
                if *cmd == "quit" {
                    break;
                }
                if let Err(err) = run(&reg, cmd, args) {
                    println!("{}", Colour::Red.paint(err.to_string()));
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {}", err);
                break;
            }
        }
    }
    rl.save_history(HISTORY_FILE)?;
    Ok(())
}
