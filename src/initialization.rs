use std::sync::Arc;

use crate::config::Config;
use crate::errors::InitError;
use crate::manager_mail::Mail;
use crate::manager_psl::Psl;
use crate::orchestrator::Orchestrator;
use crate::state::StateTracker;

/// Wires the managers and the orchestrator together from the configuration
///
/// # Arguments
///
/// * 'config' - the loaded configuration
pub fn init(config: &Config) -> Result<Arc<Orchestrator<Psl, Mail>>, InitError> {
    let psl = Psl::new(
        &config.dataset.source,
        &config.dataset.variable,
        &config.files.work_dir,
        config.dataset.timeout_secs,
        config.dataset.retention_hours,
    );

    let mail = Mail::new(&config.mail)?;

    let state = StateTracker::new(&config.files.state_file);

    Ok(Arc::new(Orchestrator::new(
        psl,
        mail,
        state,
        &config.files.target_file,
        &config.files.output_file,
        config.dataset.extracted_days,
    )))
}
