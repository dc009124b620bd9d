use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::{General, load_config};
use crate::errors::InitError;
use crate::initialization::init;
use crate::orchestrator::RunOutcome;
use crate::scheduler::Scheduler;

mod config;
mod errors;
mod extraction;
mod initialization;
mod manager_mail;
mod manager_psl;
mod orchestrator;
mod report;
mod scheduler;
mod state;
mod targets;

fn main() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("PLUVIO_CONFIG").ok())
        .unwrap_or_else(|| "pluvio.toml".to_string());

    let config = load_config(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;

    init_logging(&config.general)?;

    info!("pluvio version {}", env!("CARGO_PKG_VERSION"));
    info!("dataset source: {}", config.dataset.source);
    info!("extraction window: {} days", config.dataset.extracted_days);

    let orchestrator = init(&config)?;

    let scheduler = Scheduler::new(
        Duration::from_secs(config.schedule.interval_minutes * 60),
        Duration::from_secs(config.schedule.misfire_grace_secs),
    );

    let handle = scheduler.start(move || match orchestrator.run_once() {
        Ok(RunOutcome::Completed(timestamp)) => info!("run completed, state advanced to {}", timestamp),
        Ok(RunOutcome::NoNewData) => info!("run finished, no new upstream data"),
        Ok(RunOutcome::Skipped) => warn!("trigger skipped, previous run still in flight"),
        Err(e) => error!("run failed, retrying on next trigger: {}", e),
    });

    handle.join();
    Ok(())
}

/// Sets up the log file appender and optionally logging to stdout
///
/// # Arguments
///
/// * 'general' - the general section of the configuration
fn init_logging(general: &General) -> Result<(), InitError> {
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}")))
        .build(&general.log_path)
        .map_err(|e| InitError::Logging(e.to_string()))?;

    let mut builder = LogConfig::builder()
        .appender(Appender::builder().build("file", Box::new(file)));
    let mut root = Root::builder().appender("file");

    if general.log_to_stdout {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} - {m}{n}")))
            .build();
        builder = builder.appender(Appender::builder().build("stdout", Box::new(stdout)));
        root = root.appender("stdout");
    }

    let log_config = builder
        .build(root.build(general.log_level))
        .map_err(|e| InitError::Logging(e.to_string()))?;
    log4rs::init_config(log_config).map_err(|e| InitError::Logging(e.to_string()))?;

    Ok(())
}
