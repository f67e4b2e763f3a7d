use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::style::Stylize;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use grid_editor::backend::memory::InMemoryBackend;
use grid_editor::backend::rest::RestBackend;
use grid_editor::backend::{GridBackend, RowSource};
use grid_editor::config::config::Config;
use grid_editor::config::preferences::{
    FilePreferencesStore, MemoryPreferencesStore, PreferencesStore,
};
use grid_editor::data::cell_value::CellValue;
use grid_editor::data::row::Row;
use grid_editor::grid_session::{GridSession, SessionServices};
use grid_editor::grid_state::CellRef;
use grid_editor::notifications::{NotificationLevel, RecordingNotifier};
use grid_editor::services::bulk_operations::BulkMutation;

mod table_display;

use table_display::{display_filter_values, display_window};

fn print_help() {
    println!("{}", "grid-editor - editable grid engine demo".blue().bold());
    println!();
    println!("{}", "Usage:".yellow());
    println!("  grid-editor [OPTIONS]");
    println!();
    println!("{}", "Options:".yellow());
    println!("  {}        - Number of seeded rows (default 2000)", "--rows <n>".green());
    println!("  {}  - Use a REST backend instead of the in-memory one", "--remote <url>".green());
    println!("  {}     - Remote table name (default deals)", "--table <t>".green());
    println!("  {}       - Keep preferences in memory only", "--ephemeral".green());
    println!("  {}  - Write the default config file and exit", "--generate-config".green());
    println!("  {}            - Print recent log lines at the end", "--logs".green());
    println!();
    println!("GRID_API_KEY is sent as a bearer token to the remote backend.");
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn seed_rows(count: usize) -> Vec<Row> {
    const COMPANIES: &[&str] = &["Acme", "Globex", "Initech", "Umbrella", "Hooli", "Stark"];
    const OWNERS: &[&str] = &["ana", "ben", "chen", "dara", "eli"];
    const STATUSES: &[&str] = &["Lead", "Qualified", "Proposal", "Won", "Lost"];
    const PRIORITIES: &[&str] = &["Low", "Medium", "High", "Urgent"];

    let mut rng = StdRng::seed_from_u64(7);
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN);
    (0..count)
        .map(|i| {
            let company = COMPANIES[rng.gen_range(0..COMPANIES.len())];
            Row::new(format!("deal-{:05}", i))
                .with_field("name", CellValue::Text(format!("{} deal #{}", company, i)))
                .with_field("company", CellValue::Text(company.to_string()))
                .with_field("status", CellValue::Status(STATUSES[rng.gen_range(0..STATUSES.len())].into()))
                .with_field(
                    "priority",
                    CellValue::Status(PRIORITIES[rng.gen_range(0..PRIORITIES.len())].into()),
                )
                .with_field("owner", CellValue::Text(OWNERS[rng.gen_range(0..OWNERS.len())].into()))
                .with_field(
                    "deal_value",
                    CellValue::Currency {
                        amount: rng.gen_range(1_000..250_000) as f64,
                        code: "USD".into(),
                    },
                )
                .with_field(
                    "created_at",
                    CellValue::Date(base + chrono::Duration::days(rng.gen_range(0..365))),
                )
                .with_field("website", CellValue::Url(format!("https://{}.example.com", company.to_lowercase())))
        })
        .collect()
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

#[tokio::main]
async fn main() -> Result<()> {
    let logs = grid_editor::utils::logging::init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|a| a == "--generate-config") {
        let path = Config::get_config_path()?;
        Config::default().save_to(&path)?;
        println!("Configuration file created at: {:?}", path);
        return Ok(());
    }

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("{}", format!("Using default config: {}", e).yellow());
        Config::default()
    });

    let row_count = match arg_value(&args, "--rows") {
        Some(n) => n.parse().context("--rows expects a number")?,
        None => 2000,
    };
    let rows = seed_rows(row_count);

    let (backend, row_source): (Arc<dyn GridBackend>, Arc<dyn RowSource>) =
        match arg_value(&args, "--remote") {
            Some(url) => {
                let mut rest = RestBackend::new(url, arg_value(&args, "--table").unwrap_or("deals"));
                if let Ok(key) = std::env::var("GRID_API_KEY") {
                    rest = rest.with_api_key(key);
                }
                let rest = Arc::new(rest);
                (rest.clone() as Arc<dyn GridBackend>, rest as Arc<dyn RowSource>)
            }
            None => {
                let memory = Arc::new(InMemoryBackend::new(rows.clone()));
                (memory.clone() as Arc<dyn GridBackend>, memory as Arc<dyn RowSource>)
            }
        };

    let preferences: Arc<dyn PreferencesStore> = if args.iter().any(|a| a == "--ephemeral") {
        Arc::new(MemoryPreferencesStore::new())
    } else {
        Arc::new(FilePreferencesStore::open_default()?)
    };

    let notifier = RecordingNotifier::new();
    let mut session = GridSession::new(
        &config,
        SessionServices {
            backend,
            row_source,
            preferences,
            notifier: Arc::new(notifier.clone()),
            deleter: None,
        },
        rows,
    );
    session.set_viewport(1200, 400);

    println!("{}", "Initial window".cyan().bold());
    display_window(&session);

    // edit a company cell by typing over it
    let now = Instant::now();
    session.click(CellRef::new("deal-00001", "company"));
    for ch in "Wayne".chars() {
        session.handle_key(&key(KeyCode::Char(ch)), now).await?;
    }
    session.handle_key(&key(KeyCode::Enter), now).await?;
    println!("{}", "After editing deal-00001".cyan().bold());
    display_window(&session);
    let indicator = session
        .saved_indicator_remaining(now)
        .unwrap_or(Duration::ZERO);
    println!("{}", format!("Saved indicator clears in {}ms", indicator.as_millis()).dark_grey());

    session
        .handle_key(&KeyEvent::new(KeyCode::Char('z'), KeyModifiers::CONTROL), now)
        .await?;
    session.tick(now + indicator);
    println!("{}", "After undo".cyan().bold());
    display_window(&session);

    for id in ["deal-00000", "deal-00002", "deal-00003"] {
        session.select_row(id);
    }
    match session.bulk_update(BulkMutation::Status("Won".into())).await {
        Ok(count) => println!("{}", format!("Bulk update touched {} row(s)", count).green()),
        Err(e) => eprintln!("{}", format!("Bulk update failed: {}", e).red()),
    }
    display_window(&session);

    if let Some(values) = session.filter_values("owner").await {
        display_filter_values(&values);
    }

    for notification in notifier.take() {
        let line = match notification.level {
            NotificationLevel::Error => notification.message.red(),
            NotificationLevel::Warning => notification.message.yellow(),
            _ => notification.message.green(),
        };
        println!("{}", line);
    }

    if args.iter().any(|a| a == "--logs") {
        for record in logs.recent(50) {
            println!("{}", record.display_line());
        }
    }
    Ok(())
}
