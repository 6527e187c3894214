mod api;

use clap::Parser;
use practizio_storage::{resolve_data_dir, PracticeStore};
use std::{
    fs::{File, OpenOptions},
    io,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_PORT: u16 = 5001;
const HUB_LOG_FILE: &str = "practizio-hub.log";

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    data_dir: PathBuf,
    debug: bool,
    log_dir: String,
}

#[derive(Parser, Debug)]
#[command(name = "practizio-hub", about = "HTTP API for the Practizio practice store")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    init_logging(&config);
    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };

    let store = match PracticeStore::open_dir(&config.data_dir) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(event = "hub_error", error = %err, data_dir = %config.data_dir.display());
            return;
        }
    };

    let app = api::router(store);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err);
            return;
        }
    };

    info!(event = "hub_start", addr = %config.addr, data_dir = %config.data_dir.display());

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "hub_stop");
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(event = "hub_error", error = %err);
    }
}

fn load_config() -> Config {
    let args = Args::parse();
    Config {
        addr: resolve_addr(&args.addr),
        data_dir: resolve_data_dir(args.data_dir.as_deref()),
        debug: args.debug || env_true("PRACTIZIO_DEBUG"),
        log_dir: resolve_log_dir(&args.log_dir),
    }
}

fn init_logging(config: &Config) {
    let level = default_level(config.debug, std::env::var("PRACTIZIO_LOG_LEVEL").ok());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file_layer = match open_log_file(&config.log_dir) {
        Ok(file) => file.map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        }),
        Err(err) => {
            eprintln!("log_file_error: {err}");
            None
        }
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
    {
        eprintln!("log_init_error: {err}");
    }
}

/// `--debug` wins over `PRACTIZIO_LOG_LEVEL`; `RUST_LOG` overrides both.
fn default_level(debug: bool, level_env: Option<String>) -> String {
    if debug {
        return "debug".to_string();
    }
    level_env
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Opens `<log_dir>/practizio-hub.log` for appending; a blank dir means
/// stdout only.
fn open_log_file(log_dir: &str) -> io::Result<Option<File>> {
    if log_dir.trim().is_empty() {
        return Ok(None);
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(HUB_LOG_FILE))
        .map(Some)
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => is_truthy(&value),
        Err(_) => false,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn resolve_addr(addr_flag: &str) -> String {
    resolve_addr_from(
        addr_flag,
        std::env::var("PRACTIZIO_ADDR").ok(),
        std::env::var("PORT").ok(),
    )
}

fn resolve_addr_from(addr_flag: &str, addr_env: Option<String>, port_env: Option<String>) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    if let Some(value) = addr_env {
        if !value.trim().is_empty() {
            return value;
        }
    }
    let port = port_env
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    format!("127.0.0.1:{port}")
}

fn resolve_log_dir(log_dir_flag: &str) -> String {
    if !log_dir_flag.trim().is_empty() {
        return log_dir_flag.to_string();
    }
    std::env::var("PRACTIZIO_LOG_DIR").unwrap_or_default()
}
