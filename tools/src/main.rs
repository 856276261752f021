//! case-desk: line-oriented driver for the recovery desk.
//!
//! Usage:
//!   case-desk --db recovery.db                 # JSON commands on stdin
//!   case-desk --db recovery.db --config desk.json
//!   case-desk --db recovery.db --report        # establishment totals
//!
//! Each stdin line is one command, e.g.
//!   {"cmd":"read_case","case_id":1}
//! and yields one reply line, or {"error":...,"retryable":...}.
//! {"cmd":"quit"} or EOF ends the session.

use anyhow::Result;
use recovery_core::{
    command::DeskCommand,
    config::DeskConfig,
    types::format_amount,
    DeskError, RecoveryDesk,
};
use std::env;
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let report = args.iter().any(|a| a == "--report");
    let config = match flag_value(&args, "--config") {
        Some(path) => DeskConfig::load(path)?,
        None => DeskConfig::default(),
    };

    log::info!(
        "case-desk: db={db} over_recovery={:?} operator={}",
        config.over_recovery,
        config.operator
    );
    let mut desk = RecoveryDesk::open(db, config)?;

    if report {
        print_report(&desk)
    } else {
        run_command_loop(&mut desk)
    }
}

fn run_command_loop(desk: &mut RecoveryDesk) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(&buffer) {
            Ok(v) => v,
            Err(e) => {
                write_error(&mut stdout, &e.to_string(), false)?;
                continue;
            }
        };
        if value["cmd"] == "quit" {
            break;
        }
        let command: DeskCommand = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(e) => {
                write_error(&mut stdout, &e.to_string(), false)?;
                continue;
            }
        };

        match desk.execute(command) {
            Ok(reply) => writeln!(stdout, "{}", serde_json::to_string(&reply)?)?,
            Err(e) => {
                if let DeskError::Database(_) | DeskError::Other(_) = e {
                    log::error!("command failed: {e}");
                }
                write_error(&mut stdout, &e.to_string(), e.is_retryable())?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn write_error(out: &mut impl Write, message: &str, retryable: bool) -> Result<()> {
    let err_json = serde_json::json!({ "error": message, "retryable": retryable });
    writeln!(out, "{err_json}")?;
    out.flush()?;
    Ok(())
}

fn print_report(desk: &RecoveryDesk) -> Result<()> {
    let codes = desk.list_establishments()?;
    println!("=== ESTABLISHMENT SUMMARY ===");
    if codes.is_empty() {
        println!("  (no live cases)");
    }
    for code in codes {
        let s = desk.read_establishment(&code)?;
        println!(
            "  {} | cases: {} | demand: {} | recovered: {} | outstanding: {} \
             | cost: {} | with cost: {}",
            s.establishment_code,
            s.case_count,
            format_amount(s.demand_total),
            format_amount(s.recovered_total),
            format_amount(s.outstanding_total),
            format_amount(s.cost_outstanding),
            format_amount(s.outstanding_with_cost_total)
        );
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
