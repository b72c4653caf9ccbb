//! scopedb command-line client
//!
//! Installs the filtered view for a user on an instance's primary database,
//! runs one query against it and prints the rows.

mod formatter;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use formatter::OutputFormat;
use scopedb_core::{
    AccessMode, ConnectionRegistry, Connector, Datastore, Settings, SqliteConnector,
    SystemOverrides,
};
use scopedb_proto::{FetchMode, QueryOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Token in the query replaced by the name of the filtered view.
const VIEW_TOKEN: &str = "{view}";

/// Database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite database files
    Sqlite,
    /// PostgreSQL server (requires the `postgres` feature)
    Postgres,
}

/// scopedb command-line client
#[derive(Parser, Debug)]
#[command(name = "scopedb")]
#[command(version, about = "Run a query against a user's view of a database")]
pub struct Args {
    /// Instance configuration file (TOML)
    #[arg(short = 'c', long)]
    pub config: PathBuf,

    /// Site-wide configuration file (TOML)
    #[arg(long)]
    pub global_config: Option<PathBuf>,

    /// Instance override file (TOML)
    #[arg(long = "override")]
    pub overrides: Option<PathBuf>,

    /// Primary database, replacing the configured one
    #[arg(short = 'd', long)]
    pub database: Option<String>,

    /// Directory SQLite database names are resolved against
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Database backend
    #[arg(long, default_value = "sqlite", value_enum)]
    pub backend: Backend,

    /// User to run the query as (anonymous when omitted)
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Use curation access rules
    #[arg(long)]
    pub curate: bool,

    /// Dataset subset
    #[arg(long)]
    pub set_id: Option<i64>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Query to run; `{view}` is replaced by the filtered view
    pub query: String,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scopedb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    match run(&args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<String, Box<dyn std::error::Error>> {
    let settings = Arc::new(load_settings(args)?);
    let registry = Arc::new(ConnectionRegistry::new(connector(args)?));

    let mut datastore = Datastore::open(registry, settings)?;
    if args.user.is_some() {
        let count = datastore.initiate_user_dbs()?;
        tracing::debug!(count, "user databases registered");
    }

    let mode = if args.curate {
        AccessMode::Curate
    } else {
        AccessMode::Ordinary
    };
    let view = datastore.initiate_view(args.user.as_deref(), mode, args.set_id)?;

    let sql = args.query.replace(VIEW_TOKEN, &view);
    let records = datastore
        .run_query(&sql, (), FetchMode::Records, &QueryOptions::new())?
        .into_records();

    Ok(formatter::create_formatter(args.format).format_records(&records))
}

/// Compose the configuration files, then apply `--database` on top.
fn load_settings(args: &Args) -> Result<Settings, scopedb_core::ConfigError> {
    let settings = Settings::load(
        args.global_config.as_deref(),
        &args.config,
        args.overrides.as_deref(),
    )?;

    match &args.database {
        Some(db) => {
            let cli = SystemOverrides {
                db: Some(db.clone()),
                ..Default::default()
            };
            Settings::compose(settings.global().clone(), settings.system().clone(), Some(&cli))
        }
        None => Ok(settings),
    }
}

fn connector(args: &Args) -> Result<Arc<dyn Connector>, Box<dyn std::error::Error>> {
    match args.backend {
        Backend::Sqlite => Ok(Arc::new(match &args.data_dir {
            Some(dir) => SqliteConnector::with_data_dir(dir),
            None => SqliteConnector::new(),
        })),
        #[cfg(feature = "postgres")]
        Backend::Postgres => Ok(Arc::new(scopedb_core::PostgresConnector)),
        #[cfg(not(feature = "postgres"))]
        Backend::Postgres => Err("scopedb was built without the `postgres` feature".into()),
    }
}
