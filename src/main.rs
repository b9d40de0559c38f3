use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use eframe::egui;
use ping_logger::config::{ConfigError, ProbeKind};
use ping_logger::{AppConfig, Monitor, PingLoggerApp, ProbeBackend, SampleLog};
use tokio::sync::oneshot;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pings a set of hosts on a fixed interval, logs every sample to CSV and
/// charts the most recent ones.
#[derive(Parser, Debug)]
#[command(name = "ping-logger", version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "PING_LOGGER_CONFIG")]
    config: Option<PathBuf>,

    /// Hosts to ping, comma separated (overrides config file)
    #[arg(long, env = "PING_HOSTS", value_delimiter = ',')]
    hosts: Option<Vec<String>>,

    /// CSV log path (overrides config file)
    #[arg(long, env = "PING_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Seconds between rounds (overrides config file)
    #[arg(long, env = "PING_INTERVAL")]
    interval: Option<u64>,

    /// Samples kept per host in the chart (overrides config file)
    #[arg(long, env = "PING_MAX_POINTS")]
    max_points: Option<usize>,

    /// How each host is probed (overrides config file)
    #[arg(long, value_enum)]
    backend: Option<ProbeKind>,

    /// Run without a window, logging samples only
    #[arg(long)]
    headless: bool,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("ping_logger=info"))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BoxError> {
    let config = load_config(&cli)?;
    let log = SampleLog::open(&config.log_file)?;
    let probe = ProbeBackend::from_config(&config.probe);
    let monitor = Monitor::new(&config, probe, log);

    if cli.headless {
        run_headless(monitor)
    } else {
        run_with_window(monitor)
    }
}

/// CLI > env > config file > defaults.
fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };

    if let Some(hosts) = &cli.hosts {
        config.hosts = hosts.iter().map(|h| h.trim().to_string()).collect();
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file = log_file.clone();
    }
    if let Some(interval) = cli.interval {
        config.ping_interval = interval;
    }
    if let Some(max_points) = cli.max_points {
        config.max_points = max_points;
    }
    if let Some(backend) = cli.backend {
        config.probe.backend = backend;
    }

    config.validate()?;

    if cli.save_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => AppConfig::get_config_path()?,
        };
        config.save_to(&path)?;
        log::info!("Saved configuration to {}", path.display());
    }

    Ok(config)
}

fn run_headless(mut monitor: Monitor<ProbeBackend>) -> Result<(), BoxError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(monitor.run_until(shutdown_signal()))?;
    Ok(())
}

fn run_with_window(monitor: Monitor<ProbeBackend>) -> Result<(), BoxError> {
    let app = PingLoggerApp::new(monitor.subscribe());
    let (closed_tx, closed_rx) = oneshot::channel::<()>();

    let sampler = thread::Builder::new()
        .name("sampler".to_string())
        .spawn(move || -> Result<(), BoxError> {
            let mut monitor = monitor;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(monitor.run_until(async move {
                tokio::select! {
                    _ = shutdown_signal() => {}
                    _ = closed_rx => {
                        log::info!("Window closed");
                    }
                }
            }))?;
            Ok(())
        })?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 520.0])
            .with_min_inner_size([400.0, 300.0]),
        ..Default::default()
    };
    let shown = eframe::run_native("Ping Logger", options, Box::new(move |_cc| Ok(Box::new(app))));

    // The sampler may already be gone after an interrupt.
    let _ = closed_tx.send(());
    let flushed = sampler
        .join()
        .map_err(|_| BoxError::from("sampler thread panicked"))?;

    shown.map_err(|e| BoxError::from(e.to_string()))?;
    flushed
}

/// Completes on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Interrupted by user");
        }
        _ = terminate => {
            log::info!("Received terminate signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config.json");
        let file = AppConfig {
            hosts: vec!["file.example".into()],
            ping_interval: 30,
            max_points: 40,
            log_file: dir.path().join("from_file.csv"),
            ..AppConfig::default()
        };
        file.save_to(&path).unwrap();
        path
    }

    #[test]
    fn flags_override_environment_which_overrides_the_file() {
        let tmp = tempdir().unwrap();
        let path = write_config(&tmp);
        let path = path.to_str().unwrap();

        // SAFETY: only std reads the environment in this binary, under its own lock.
        // The other tests here do not assert on interval or max_points.
        unsafe {
            std::env::set_var("PING_INTERVAL", "9");
            std::env::set_var("PING_MAX_POINTS", "12");
        }
        let cli = Cli::parse_from(["ping-logger", "--config", path, "--interval", "7"]);
        unsafe {
            std::env::remove_var("PING_INTERVAL");
            std::env::remove_var("PING_MAX_POINTS");
        }

        let config = load_config(&cli).unwrap();
        assert_eq!(config.ping_interval, 7);
        assert_eq!(config.max_points, 12);
        assert_eq!(config.hosts, vec!["file.example"]);
        assert_eq!(config.log_file, tmp.path().join("from_file.csv"));
        assert_eq!(config.probe, AppConfig::default().probe);
    }

    #[test]
    fn host_list_is_split_and_trimmed() {
        let tmp = tempdir().unwrap();
        let path = write_config(&tmp);
        let cli = Cli::parse_from([
            "ping-logger",
            "--config",
            path.to_str().unwrap(),
            "--hosts",
            " a.example , 10.0.0.1 ",
            "--backend",
            "icmp",
        ]);

        let config = load_config(&cli).unwrap();
        assert_eq!(config.hosts, vec!["a.example", "10.0.0.1"]);
        assert_eq!(config.probe.backend, ProbeKind::Icmp);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let tmp = tempdir().unwrap();
        let path = write_config(&tmp);
        let cli = Cli::parse_from([
            "ping-logger",
            "--config",
            path.to_str().unwrap(),
            "--hosts",
            "a, a",
        ]);
        assert!(matches!(load_config(&cli), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn save_config_writes_the_effective_settings() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("saved").join("config.json");
        let cli = Cli::parse_from([
            "ping-logger",
            "--config",
            path.to_str().unwrap(),
            "--hosts",
            "router.lan",
            "--max-points",
            "25",
            "--save-config",
        ]);

        // An explicit config path must exist, even when saving to it.
        assert!(matches!(load_config(&cli), Err(ConfigError::Read { .. })));

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{}").unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
        assert_eq!(config.hosts, vec!["router.lan"]);
        assert_eq!(config.max_points, 25);
    }
}
