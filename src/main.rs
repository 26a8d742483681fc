use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csvie::{load_data_statement, Csvie, CsvieConfig, ImportOptions, SchemaSource, SqliteStore};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "csvie", version, about = "Chunk, import and export CSV files against a SQLite database")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, default_value = "csvie.db")]
    database: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split files into header-prefixed chunks on the storage disk
    Chunk {
        files: Vec<PathBuf>,
        #[arg(long)]
        size: Option<usize>,
    },
    /// Print the rows of a CSV file as JSON
    Read { file: PathBuf },
    /// Bulk-load a CSV file into a table
    Import {
        file: PathBuf,
        table: String,
        #[arg(long)]
        delimiter: Option<String>,
        #[arg(long)]
        ignore_lines: Option<usize>,
    },
    /// Export every table into a dump directory
    Export {
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Truncate and re-import every table from a dump directory
    Restore { dir: PathBuf },
    /// Delete files on the storage disk
    Clear { dir: Option<PathBuf> },
    /// Print the MySQL LOAD DATA statement for a file and table
    LoadStatement { file: PathBuf, table: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CsvieConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let mut csvie = Csvie::new(config).context("Invalid configuration")?;

    match cli.command {
        Command::Chunk { files, size } => {
            if let Some(size) = size {
                csvie.set_file_chunk_size(size);
            }
            let chunks = csvie.chunk_files(&files).context("Failed to chunk files")?;
            for chunk in chunks {
                println!("{}", chunk.display());
            }
        }
        Command::Read { file } => {
            let rows = csvie
                .read_csv_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Import {
            file,
            table,
            delimiter,
            ignore_lines,
        } => {
            let conn = open_database(&cli.database)?;
            let store = SqliteStore::new(&conn);
            let options = ImportOptions {
                file_fields_terminated_by: delimiter,
                file_lines_ignored: ignore_lines,
                ..Default::default()
            };

            let complete = csvie
                .import_csv(&store, &file, &table, &options)
                .with_context(|| format!("Failed to import {} into {}", file.display(), table))?;
            if !complete {
                eprintln!("Some rows of {} were not inserted", file.display());
                std::process::exit(1);
            }
        }
        Command::Export { exclude, dir } => {
            let conn = open_database(&cli.database)?;
            let store = SqliteStore::new(&conn);
            let excluded: Vec<&str> = exclude.iter().map(String::as_str).collect();

            let dump = csvie
                .export_database(&store, &excluded, dir.as_deref())
                .context("Failed to export database")?;
            println!("{}", dump.display());
        }
        Command::Restore { dir } => {
            let conn = open_database(&cli.database)?;
            let store = SqliteStore::new(&conn);

            if !csvie
                .restore_database(&store, &dir)
                .context("Failed to restore database")?
            {
                eprintln!("Restore from {} did not complete", dir.display());
                std::process::exit(1);
            }
        }
        Command::Clear { dir } => {
            if !csvie.clear_storage_disk(dir.as_deref()) {
                eprintln!("Could not clear {}", csvie.storage_disk().display());
                std::process::exit(1);
            }
        }
        Command::LoadStatement { file, table } => {
            let conn = open_database(&cli.database)?;
            let store = SqliteStore::new(&conn);
            let columns = store
                .column_names(&table)
                .with_context(|| format!("Unknown table {}", table))?;

            let path = csvie.disk().path(&file);
            println!("{}", load_data_statement(&path, &table, &columns, csvie.config()));
        }
    }

    Ok(())
}

fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
