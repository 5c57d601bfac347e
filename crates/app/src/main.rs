mod api;
mod error;

use std::path::PathBuf;

use anyhow::bail;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use padel_config::Config;
use padel_models::NewCourt;
use sqlx::SqlitePool;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::OffsetTime;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: &str = env!("PADEL_GIT_HASH");

pub(crate) fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH})")
}

// --- CLI definition ---

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "padel")]
#[command(about = "Padel court booking server")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("PADEL_GIT_HASH"), ")"))]
struct Cli {
    /// Log level [default: info]
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Display log timestamps in UTC (default: local time)
    #[arg(long, global = true)]
    utc: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Database URL [default: sqlite:padel.db]
    #[arg(long, global = true)]
    db_url: Option<String>,

    /// Config file (default: ~/.padel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on [default: 3000]
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory holding the built web client
        #[arg(long)]
        static_dir: Option<String>,
    },
    /// Add a court
    AddCourt {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Court is covered
        #[arg(long)]
        indoor: bool,
        /// Maximum number of players
        #[arg(long, default_value_t = 4)]
        capacity: i32,
        /// Price per booking in minor units (e.g. 5000 = 50.00)
        #[arg(long)]
        price: i64,
        #[arg(long, default_value = "EUR")]
        currency: String,
        /// IANA timezone of the venue
        #[arg(long, default_value = "Europe/Madrid")]
        timezone: String,
    },
    /// List all courts
    ListCourts,
    /// List a user's reservations, latest first
    ListReservations {
        /// Identity-provider user id
        #[arg(long)]
        user: String,
    },
    /// Cancel a reservation
    CancelReservation {
        id: i64,
        #[arg(long)]
        reason: Option<String>,
    },
}

/// Layer CLI flags over the loaded configuration.
fn merge_cli(config: &mut Config, cli: &Cli) {
    if let Some(level) = &cli.log_level { config.log_level = level.to_string(); }
    if cli.utc { config.utc = true; }
    if cli.log_json { config.log_json = true; }
    if let Some(url) = &cli.db_url { config.db_url = url.clone(); }
    if let Commands::Serve { port, static_dir } = &cli.command {
        if let Some(p) = port { config.port = *p; }
        if let Some(dir) = static_dir { config.static_dir = dir.clone(); }
    }
}

// --- Logging ---

fn init_logging(config: &Config) {
    let filter = EnvFilter::new(&config.log_level);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let utc = OffsetTime::new(
        time::UtcOffset::UTC,
        time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ),
    );

    match (config.log_json, config.utc) {
        (true, true) => builder.json().with_timer(utc).init(),
        (true, false) => builder.json().with_timer(LocalTimer).init(),
        (false, true) => builder.with_timer(utc).init(),
        (false, false) => builder.with_timer(LocalTimer).init(),
    }
}

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

// --- Server ---

async fn run_server(config: &Config, pool: SqlitePool) -> anyhow::Result<()> {
    info!("Padel v{}", version_string());

    let app = api::router(pool, &config.static_dir);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on http://{addr} (static files from {})", config.static_dir);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn format_price(minor: i64, currency: &str) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

fn validate_court(court: &NewCourt) -> anyhow::Result<()> {
    if court.timezone.parse::<chrono_tz::Tz>().is_err() {
        bail!("Unknown timezone: {}", court.timezone);
    }
    if court.capacity < 1 {
        bail!("Capacity must be at least 1");
    }
    if court.price < 0 {
        bail!("Price cannot be negative");
    }
    Ok(())
}

/// Cancel a reservation and describe what was cancelled.
async fn cancel_and_describe(pool: &SqlitePool, id: i64, reason: Option<&str>) -> anyhow::Result<String> {
    let updated = padel_db::cancel_reservation(pool, id, reason).await?;
    let reservation = match padel_db::get_reservation(pool, id).await? {
        Some(r) if updated > 0 => r,
        _ => return Ok(format!("No reservation with id {id}")),
    };
    let court = padel_db::get_court(pool, reservation.court_id)
        .await?
        .map(|c| c.name)
        .unwrap_or_else(|| format!("court {}", reservation.court_id));
    Ok(format!(
        "Reservation {id} cancelled: {court} {} - {} for {}",
        reservation.start_time.format("%Y-%m-%d %H:%M"),
        reservation.end_time.format("%H:%M"),
        reservation.user_id,
    ))
}

// --- Main ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref());
    merge_cli(&mut config, &cli);
    init_logging(&config);

    let pool = padel_db::connect(&config.db_url, config.db_max_connections).await?;
    padel_db::migrate(&pool).await?;

    match cli.command {
        Commands::Serve { .. } => {
            run_server(&config, pool).await?;
        }
        Commands::AddCourt { name, description, indoor, capacity, price, currency, timezone } => {
            let new_court = NewCourt { name, description, indoor, capacity, price, currency, timezone };
            validate_court(&new_court)?;
            let court = padel_db::add_court(&pool, &new_court).await?;
            println!(
                "Added court: {} (id={}, {}, {} players, {})",
                court.name,
                court.id,
                if court.indoor { "indoor" } else { "outdoor" },
                court.capacity,
                format_price(court.price, &court.currency),
            );
        }
        Commands::ListCourts => {
            let courts = padel_db::list_courts(&pool).await?;
            if courts.is_empty() {
                println!("No courts registered. Use `padel add-court` to add one.");
            } else {
                println!(
                    "{:<6} {:<20} {:<8} {:<8} {:<14} {:<18} {}",
                    "ID", "Name", "Type", "Players", "Price", "Timezone", "Description"
                );
                println!("{}", "-".repeat(100));
                for c in &courts {
                    println!(
                        "{:<6} {:<20} {:<8} {:<8} {:<14} {:<18} {}",
                        c.id,
                        c.name,
                        if c.indoor { "indoor" } else { "outdoor" },
                        c.capacity,
                        format_price(c.price, &c.currency),
                        c.timezone,
                        c.description.as_deref().unwrap_or(""),
                    );
                }
                println!("\n{} court(s) total", courts.len());
            }
        }
        Commands::ListReservations { user } => {
            if let Some(u) = padel_db::get_user(&pool, &user).await? {
                println!("Reservations for {} <{}>", u.name, u.email);
            }
            let reservations = padel_db::list_reservations_for_user(&pool, &user).await?;
            if reservations.is_empty() {
                println!("No reservations found.");
            } else {
                println!(
                    "{:<6} {:<20} {:<20} {:<20} {:<8} {:<14} {}",
                    "ID", "Court", "Start", "End", "Players", "Price", "Status"
                );
                println!("{}", "-".repeat(100));
                for d in &reservations {
                    let r = &d.reservation;
                    let status = match &r.cancel_reason {
                        Some(reason) => format!("{} ({reason})", r.status),
                        None => r.status.to_string(),
                    };
                    println!(
                        "{:<6} {:<20} {:<20} {:<20} {:<8} {:<14} {}",
                        r.id,
                        d.court_name,
                        r.start_time.format("%Y-%m-%d %H:%M").to_string(),
                        r.end_time.format("%Y-%m-%d %H:%M").to_string(),
                        r.players_count,
                        format_price(r.price_cents, &r.currency),
                        status,
                    );
                }
                println!("\n{} reservation(s) total", reservations.len());
            }
        }
        Commands::CancelReservation { id, reason } => {
            println!("{}", cancel_and_describe(&pool, id, reason.as_deref()).await?);
        }
    }

    Ok(())
}
