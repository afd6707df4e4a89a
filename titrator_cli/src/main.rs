//! `titrator` binary: pH-titration burette/valve control from the command line.

mod cli;
mod error_fmt;
mod rt;
mod run;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use titrator_config::{Config, Logging, SAMPLE_CONFIG};
use titrator_core::error::Result;
use tracing::{info, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, JSON_MODE, RtLock};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = try_main(&cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn try_main(cli: &Cli) -> Result<()> {
    let cfg = load_config(cli)?;
    init_logging(cli, &cfg.logging)?;
    rt::setup_rt_once(
        cli.rt,
        cli.rt_prio,
        cli.rt_lock.unwrap_or_else(RtLock::os_default),
        cli.rt_cpu,
    );

    // One flag shared by the Ctrl-C handler and both motor axes.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("stop requested; finishing the current pulse batch and de-energizing");
            cancel.store(true, Ordering::SeqCst);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    let mut station = build_station(&cfg, &cancel)?;
    let outcome = station.execute(&cli.cmd)?;
    if cli.json {
        println!("{}", outcome.json);
    } else {
        println!("{}", outcome.human);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    if cli.config.exists() {
        titrator_config::load_file(&cli.config)
    } else {
        let cfg = titrator_config::load_toml(SAMPLE_CONFIG)
            .wrap_err("parse built-in reference config")?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(feature = "hardware")]
fn build_station(cfg: &Config, cancel: &Arc<AtomicBool>) -> Result<run::Station> {
    run::build_hw_station(cfg, cancel)
}

#[cfg(not(feature = "hardware"))]
fn build_station(cfg: &Config, cancel: &Arc<AtomicBool>) -> Result<run::Station> {
    run::build_sim_station(cfg, cancel)
}

/// Console layer at `--log-level` (RUST_LOG wins), plus an optional
/// JSON-lines file sink from the `[logging]` config section.
fn init_logging(cli: &Cli, logging: &Logging) -> Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    let level = logging.level.clone().unwrap_or_else(|| cli.log_level.clone());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let mut layers: Vec<Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>> = Vec::new();
    if cli.json {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed(),
        );
    } else {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(file) = &logging.file {
        let path = std::path::Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
        let rotation = match logging.rotation.as_deref() {
            None | Some("never") => Rotation::NEVER,
            Some("daily") => Rotation::DAILY,
            Some("hourly") => Rotation::HOURLY,
            Some(other) => return Err(eyre::eyre!("unknown logging.rotation: {other}")),
        };
        let appender =
            RollingFileAppender::new(rotation, dir.unwrap_or(std::path::Path::new(".")), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = cli::FILE_GUARD.set(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    if let Some(file) = &logging.file {
        info!(file = %file, "file logging enabled");
    }
    Ok(())
}
