use crate::cli::CliContext;
use crate::core::audit_log::AuditLog;
use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Display the audit trail
    Log(AuditLogArgs),
    /// Verify audit chain integrity
    Verify,
}

#[derive(Args, Debug)]
pub struct AuditLogArgs {
    /// Maximum number of entries to display
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

pub fn run(ctx: &CliContext, cmd: AuditCommand) -> Result<()> {
    let Some(log) = ctx.audit_log() else {
        bail!("no audit log configured (use --audit-log or audit_log in the config file)");
    };
    match cmd {
        AuditCommand::Log(args) => run_log(&log, args),
        AuditCommand::Verify => run_verify(&log),
    }
}

fn run_log(log: &AuditLog, args: AuditLogArgs) -> Result<()> {
    let records = log.read(Some(args.limit))?;

    if records.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Timestamp").add_attribute(Attribute::Bold),
        Cell::new("Action").add_attribute(Attribute::Bold),
        Cell::new("Username").add_attribute(Attribute::Bold),
        Cell::new("Actor").add_attribute(Attribute::Bold),
        Cell::new("Result").add_attribute(Attribute::Bold),
    ]);

    for record in &records {
        let local: DateTime<Local> = record.timestamp.into();
        let result = match (&record.result.success, &record.result.error) {
            (true, _) => "OK".to_string(),
            (false, Some(err)) => format!("FAIL: {}", err),
            (false, None) => "REJECTED".to_string(),
        };
        table.add_row(vec![
            local.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.action.clone(),
            record.username.clone(),
            record.actor.clone(),
            result,
        ]);
    }

    println!("{}", table);
    println!("\n{} entries shown.", records.len());
    Ok(())
}

fn run_verify(log: &AuditLog) -> Result<()> {
    let (total, errors) = log.verify_chain()?;

    if total == 0 && errors.is_empty() {
        println!("No audit entries to verify.");
        return Ok(());
    }

    for err in &errors {
        println!("  [FAIL] {}", err);
    }

    println!();
    if errors.is_empty() {
        println!("Audit chain: {} entries verified, 0 errors", total);
    } else {
        println!("Audit chain: {} entries, {} errors", total, errors.len());
        std::process::exit(1);
    }
    Ok(())
}
