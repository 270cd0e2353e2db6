use super::*;
use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::time::Duration;

/// Upper bound for every configured timeout and interval.
pub const MAX_CONFIGURED_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Validate the complete configuration
pub fn validate_config(config: &OrchestratorConfig) -> Result<()> {
    validate_orchestrator_options(&config.orchestrator)?;
    validate_supervisor_options(&config.supervisor)?;
    validate_retry_options(&config.retry)?;

    if let Some(ref service) = config.service {
        validate_service_config(service)?;
    }

    validate_profile_list(&config.profiles)?;
    validate_duration_bounds(config)?;

    Ok(())
}

fn validate_orchestrator_options(options: &OrchestratorOptions) -> Result<()> {
    if options.control_port == 0 {
        return Err(anyhow!(
            "Control port must be between 1 and 65535, got: {}",
            options.control_port
        ));
    }

    if options.event_queue_capacity == 0 {
        return Err(anyhow!("Event queue capacity must be greater than 0"));
    }

    match options.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            options.log_level
        )),
    }
}

fn validate_supervisor_options(options: &SupervisorOptions) -> Result<()> {
    if options.graceful_timeout.is_zero() {
        return Err(anyhow!("Graceful timeout must be greater than 0"));
    }

    if options.control_timeout.is_zero() {
        return Err(anyhow!("Control timeout must be greater than 0"));
    }

    Ok(())
}

fn validate_retry_options(retry: &RetryOptions) -> Result<()> {
    if retry.max_attempts == 0 {
        return Err(anyhow!("Retry max_attempts must be at least 1"));
    }

    if !(retry.backoff_coefficient >= 1.0) {
        return Err(anyhow!(
            "Retry backoff coefficient must be at least 1.0, got: {}",
            retry.backoff_coefficient
        ));
    }

    if retry.max_interval < retry.initial_interval {
        return Err(anyhow!(
            "Retry max_interval ({:?}) must not be shorter than initial_interval ({:?})",
            retry.max_interval,
            retry.initial_interval
        ));
    }

    Ok(())
}

fn validate_service_config(service: &ServiceConfig) -> Result<()> {
    if !service.enabled {
        return Ok(());
    }

    if service.executable.trim().is_empty() {
        return Err(anyhow!("Service executable cannot be empty"));
    }

    if service.startup_timeout.is_zero() {
        return Err(anyhow!("Service startup timeout must be greater than 0"));
    }

    if service.poll_interval.is_zero() {
        return Err(anyhow!("Service poll interval must be greater than 0"));
    }

    Ok(())
}

fn validate_duration_bounds(config: &OrchestratorConfig) -> Result<()> {
    let mut durations = vec![
        ("supervisor.graceful_timeout", config.supervisor.graceful_timeout),
        ("supervisor.port_reclaim_timeout", config.supervisor.port_reclaim_timeout),
        ("supervisor.control_timeout", config.supervisor.control_timeout),
        ("recovery.grace_interval", config.recovery.grace_interval),
        ("retry.initial_interval", config.retry.initial_interval),
        ("retry.max_interval", config.retry.max_interval),
        ("gate.dependencies_timeout", config.gate.dependencies_timeout),
    ];
    if let Some(ref service) = config.service {
        durations.push(("service.startup_timeout", service.startup_timeout));
        durations.push(("service.poll_interval", service.poll_interval));
    }

    for (name, value) in durations {
        if value > MAX_CONFIGURED_DURATION {
            return Err(anyhow!(
                "{} ({:?}) exceeds the maximum of {:?}",
                name,
                value,
                MAX_CONFIGURED_DURATION
            ));
        }
    }
    Ok(())
}

fn validate_profile_list(profiles: &[String]) -> Result<()> {
    let mut ids = HashSet::new();
    for id in profiles {
        if id.trim().is_empty() {
            return Err(anyhow!("Profile ID cannot be empty"));
        }
        if !ids.insert(id) {
            return Err(anyhow!("Duplicate profile ID: {}", id));
        }
    }
    Ok(())
}
