#![cfg(not(tarpaulin_include))]

use clap::{Parser, Subcommand};
use power_ledger::aggregate;
use power_ledger::billing;
use power_ledger::ingest;
use power_ledger::ledger::LedgerSession;
use power_ledger::report;
use power_ledger::store::{DataStore, StoreError};
use power_ledger::value::display_text;
use power_ledger::view;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

/// Offline maintenance of the project ledger store
#[derive(Parser)]
#[command(name = "ledger-cli", version, about)]
struct Cli {
    /// Store file (gzip-compressed JSON)
    #[arg(long, env = "LEDGER_DATA", default_value = "database/ledger.json.gz")]
    data: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capacity, category and generation summary
    Summary,
    /// List projects, optionally filtered
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Replace the master project list from an xlsx file
    ImportMaster { file: PathBuf },
    /// Merge a monthly report xlsx into the monthly sheet
    Append { file: PathBuf },
    /// Replace one project's ledger from an xlsx file
    ImportHistory { project: String, file: PathBuf },
    /// Write the joined report to an xlsx file
    Report {
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        #[arg(short, long, default_value = report::REPORT_FILENAME)]
        output: PathBuf,
    },
    /// Preview the bill for a new reading
    Preview {
        project: String,
        #[arg(long)]
        export: f64,
        #[arg(long)]
        import: f64,
    },
    /// Edit a project's ledger interactively
    Edit { project: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let mut store = DataStore::open(&cli.data)?;

    match cli.command {
        Command::Summary => {
            let summary = aggregate::aggregate(store.projects());
            println!("Projects:          {}", summary.total_count);
            println!("Total capacity:    {:.2} MW", summary.total_capacity);
            println!("Total generation:  {:.2}", summary.total_generation);
            println!();
            for group in &summary.categories {
                println!(
                    "{:<20} {:>4}  installed {:>10.2}  contracted {:>10.2}",
                    group.label, group.count, group.installed_capacity, group.contracted_capacity
                );
            }
            println!();
            for point in &summary.monthly {
                println!("{:<10} {:>10.2} MU", point.month, point.value_mu);
            }
            let stats = store.stats();
            if !stats.monthly_payments.is_empty() {
                println!();
                for (month, amount) in stats.displayable_payments() {
                    println!("{:<10} {:>14.2}", month, amount);
                }
                println!("Latest: {} ({:.2})", stats.latest_month, stats.latest_payment);
            }
        }
        Command::List { search } => {
            let term = search.unwrap_or_default();
            let matches = view::filter_projects(store.projects(), &term);
            for record in &matches {
                println!("{}", view::project_name(record));
            }
            println!("{} of {} projects", matches.len(), store.projects().len());
        }
        Command::ImportMaster { file } => {
            let sheet = ingest::read_master(&fs::read(&file)?)?;
            println!("{} projects imported", sheet.rows.len());
            store.replace_master(sheet)?;
        }
        Command::Append { file } => {
            let sheet = ingest::read_monthly(&fs::read(&file)?)?;
            println!("{} rows, {} columns read", sheet.rows.len(), sheet.headers.len());
            store.append_monthly(sheet)?;
        }
        Command::ImportHistory { project, file } => {
            let sheet = ingest::read_table(&fs::read(&file)?)?;
            println!("{} ledger rows imported for {}", sheet.rows.len(), project);
            store.replace_history(&project, sheet)?;
        }
        Command::Report { columns, output } => {
            let sheet = store.report_sheet(&columns);
            fs::write(&output, report::to_xlsx(&sheet)?)?;
            println!("{} rows written to {}", sheet.rows.len(), output.display());
        }
        Command::Preview {
            project,
            export,
            import,
        } => {
            let sheet = store
                .history(&project)
                .ok_or_else(|| StoreError::UnknownProject(project.clone()))?;
            let bill = billing::preview(&sheet.rows, &sheet.headers, export, import)?;
            println!("Export difference: {:.2}", bill.diff_export);
            println!("Export kWh:        {:.2}", bill.kwh_export);
            println!("Import difference: {:.2}", bill.diff_import);
            println!("Import kWh:        {:.2}", bill.kwh_import);
            println!("Net units:         {:.2}", bill.net_units);
            println!("Bill:              {}", bill.bill);
        }
        Command::Edit { project } => edit(&mut store, &project)?,
    }

    Ok(())
}

fn edit(store: &mut DataStore, project: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = store
        .history(project)
        .ok_or_else(|| StoreError::UnknownProject(project.to_string()))?;
    let mut session = LedgerSession::new(project, sheet.headers.clone(), sheet.rows.clone());

    let mut start_time = Instant::now();
    let mut status = String::from("ok");
    loop {
        print!("[{:.1}] ({}) > ", start_time.elapsed().as_secs_f64(), status);
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let command = line.trim();
        start_time = Instant::now();

        match command.split_once(' ').unwrap_or((command, "")) {
            ("q", _) => break,
            ("help", _) => {
                println!("Commands:");
                println!("  show: Print the ledger (* marks unsaved rows)");
                println!("  set <row> <column>=<value>: Change a cell");
                println!("  save [row]: Save one row, or every unsaved row");
                println!("  q: Quit");
                status = String::from("ok");
            }
            ("show", _) => {
                println!("{}", session.headers().join(" | "));
                for (i, row) in session.rows().iter().enumerate() {
                    let cells: Vec<String> = session
                        .headers()
                        .iter()
                        .map(|h| row.record.get(h).map(display_text).unwrap_or_default())
                        .collect();
                    let mark = if row.is_modified() { "*" } else { " " };
                    println!("{}{:>3}  {}", mark, i, cells.join(" | "));
                }
                status = String::from("ok");
            }
            ("set", rest) => {
                let parsed = rest.split_once(' ').and_then(|(row, assignment)| {
                    let row = row.parse::<usize>().ok()?;
                    let (column, value) = assignment.split_once('=')?;
                    Some((row, column.trim().to_string(), value.trim().to_string()))
                });
                status = match parsed {
                    Some((row, column, value)) => match session.edit_cell(row, &column, value) {
                        Ok(()) => String::from("ok"),
                        Err(e) => e.to_string(),
                    },
                    None => String::from("usage: set <row> <column>=<value>"),
                };
            }
            ("save", "") => {
                let pending = session.modified_rows();
                let mut failed = 0;
                for row in &pending {
                    if let Err(e) = session.save_row(*row, store) {
                        eprintln!("row {}: {}", row, e);
                        failed += 1;
                    }
                }
                status = format!("{} saved, {} failed", pending.len() - failed, failed);
            }
            ("save", row) => {
                status = match row.parse::<usize>() {
                    Ok(row) => match session.save_row(row, store) {
                        Ok(()) => String::from("ok"),
                        Err(e) => e.to_string(),
                    },
                    Err(_) => String::from("invalid row"),
                };
            }
            _ => status = String::from("invalid command"),
        }
    }

    let unsaved = session.modified_rows().len();
    if unsaved > 0 {
        println!("{} unsaved rows discarded", unsaved);
    }
    Ok(())
}
