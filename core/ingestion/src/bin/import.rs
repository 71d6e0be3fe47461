/// Import Binary - Loads an exported message history CSV into the store
///
/// Usage:
///   cargo run --bin import -- --csv <file> --user <user_id> [--db-path <path>]
///
/// Options:
///   --csv:     CSV file with columns timestamp,sender,content[,sentiment]
///   --user:    User the messages belong to
///   --db-path: Path to SQLite database (defaults to ~/.local/share/tandem/tandem.db)
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tandem_ingestion::{import_csv, Database};
use tandem_schemas::UserId;
use tracing::{info, Level};
use tracing_subscriber;

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Import exported message history into the Tandem store")]
struct Args {
    /// CSV file to import
    #[arg(long)]
    csv: PathBuf,

    /// User the imported messages belong to
    #[arg(long)]
    user: String,

    /// Path to SQLite database file
    #[arg(long, short)]
    db_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Tandem - Message History Import Tool v0.1.0");

    let args = Args::parse();

    let db_path = args.db_path.unwrap_or_else(|| {
        let home = std::env::var("HOME").expect("HOME environment variable not set");
        PathBuf::from(format!("{}/.local/share/tandem/tandem.db", home))
    });

    info!("Database: {}", db_path.display());
    info!("Importing {} for user {}", args.csv.display(), args.user);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::new(&db_path)?;
    let user_id = UserId(args.user);

    let stats = import_csv(&db, &args.csv, &user_id)?;

    info!("Import complete!");
    info!("  Messages imported:   {}", stats.rows);
    info!("  Pre-scored rows:     {}", stats.scored);
    info!(
        "  Awaiting sentiment:  {}",
        stats.rows - stats.scored
    );

    Ok(())
}
