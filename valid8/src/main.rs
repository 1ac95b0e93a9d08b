//! valid8 - KYC/KYB verification routing
//!
//! CLI entry point for inspecting the adapter registry and driving simulated
//! verifications through the dashboard.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use valid8::cli::{Cli, Command, OutputFormat};
use valid8::config::{AdapterConfig, Config, ManagerConfig};
use valid8::dashboard::{DashboardData, DashboardProvider};
use valid8::events::{EventBus, EventLogger, ServiceType, VerificationStatus};
use valid8::{SimulatedAdapter, VerificationAdapter, VerificationClient, VerificationManager, VerificationRequest};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("valid8")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => parse_level(s).unwrap_or_else(|| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("valid8.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn parse_level(s: &str) -> Option<tracing::Level> {
    match s.to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" | "WARNING" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    config.validate().context("Invalid configuration")?;
    info!(adapters = config.manager.adapters.len(), "valid8 loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Adapters { format }) => cmd_adapters(&config, format),
        Some(Command::Simulate {
            count,
            service,
            adapter,
            failure_rate,
            format,
        }) => cmd_simulate(&config, count, service, adapter.as_deref(), failure_rate, format).await,
        Some(Command::Config) => cmd_config(&config),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Adapters used when the config names none
fn demo_manager_config() -> ManagerConfig {
    ManagerConfig {
        default_adapter: Some("primary".to_string()),
        enable_fallback: true,
        adapters: vec![
            AdapterConfig::new("primary").with_priority(10).with_setting("failure-rate", 0.1),
            AdapterConfig::new("backup").with_priority(1),
        ],
    }
}

/// Registry backed by simulated adapters for every configured entry
fn build_manager(config: &ManagerConfig, bus: Option<Arc<EventBus>>) -> VerificationManager {
    let mut manager = VerificationManager::from_config(config);
    if let Some(bus) = bus {
        manager = manager.with_event_bus(bus);
    }
    for entry in &config.adapters {
        let name = entry.normalized_name();
        let adapter_name = name.clone();
        manager.register_factory(&name, move |settings| {
            let adapter = SimulatedAdapter::from_settings(adapter_name.clone(), settings)?;
            Ok(Arc::new(adapter) as Arc<dyn VerificationAdapter>)
        });
    }
    manager
}

fn effective_manager_config(config: &Config) -> ManagerConfig {
    if config.manager.adapters.is_empty() {
        debug!("effective_manager_config: no adapters configured, using demo adapters");
        demo_manager_config()
    } else {
        config.manager.clone()
    }
}

fn cmd_adapters(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_adapters: called");
    let manager = build_manager(&effective_manager_config(config), None);
    let default = manager.default_adapter_name();
    let resolved = match manager.get_adapter_with_fallback(None) {
        Ok(Some(adapter)) => Ok(adapter.name().to_string()),
        Ok(None) => Err("no ready adapter".to_string()),
        Err(e) => Err(e.to_string()),
    };

    let adapters: Vec<serde_json::Value> = manager
        .available_adapters()
        .into_iter()
        .map(|name| {
            json!({
                "name": name,
                "ready": manager.is_adapter_ready(&name),
                "priority": manager.priority_of(&name),
                "default": default.as_deref() == Some(name.as_str()),
                "capabilities": manager.capabilities_of(&name).unwrap_or_default(),
            })
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let resolution = match &resolved {
                Ok(name) => json!({ "adapter": name }),
                Err(e) => json!({ "error": e }),
            };
            let output = json!({
                "adapters": adapters,
                "fallback_enabled": manager.is_fallback_enabled(),
                "resolves_to": resolution,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("{}", "Registered Adapters".bold());
            println!("-------------------");
            for name in manager.available_adapters() {
                let ready = if manager.is_adapter_ready(&name) {
                    "ready".green()
                } else {
                    "not ready".red()
                };
                let marker = if default.as_deref() == Some(name.as_str()) {
                    " (default)".cyan().to_string()
                } else {
                    String::new()
                };
                let capabilities = manager.capabilities_of(&name).unwrap_or_default();
                println!(
                    "  {:<16} {:<10} priority {:>3}  [{}]{}",
                    name,
                    ready,
                    manager.priority_of(&name),
                    capabilities,
                    marker
                );
            }
            println!();
            println!(
                "Fallback: {}",
                if manager.is_fallback_enabled() { "enabled" } else { "disabled" }
            );
            match resolved {
                Ok(name) => println!("Resolves to: {}", name.green()),
                Err(e) => println!("Resolves to: {}", e.red()),
            }
        }
    }
    Ok(())
}

async fn cmd_simulate(
    config: &Config,
    count: usize,
    service: ServiceType,
    preferred: Option<&str>,
    failure_rate: Option<f64>,
    format: OutputFormat,
) -> Result<()> {
    debug!(count, %service, ?preferred, ?failure_rate, ?format, "cmd_simulate: called");
    let mut manager_config = effective_manager_config(config);
    if let Some(rate) = failure_rate {
        for entry in &mut manager_config.adapters {
            entry.config.extra.insert("failure-rate".to_string(), json!(rate));
        }
    }

    let bus = Arc::new(EventBus::new(config.events.max_history_size));
    let _event_logger = EventLogger::new(&bus, tracing::Level::DEBUG);
    let dashboard = DashboardProvider::new(bus.clone(), &config.dashboard);
    let manager = Arc::new(build_manager(&manager_config, Some(bus.clone())));
    let client = VerificationClient::new(manager, bus.clone());

    let mut errors = 0usize;
    for i in 0..count {
        let request = VerificationRequest::new(service).with_field("reference", format!("SIM-{:05}", i + 1));
        if let Err(e) = client.verify(request, preferred).await {
            debug!(error = %e, "cmd_simulate: verification errored");
            errors += 1;
            if e.is_configuration_error() {
                dashboard.destroy();
                return Err(e).context("Cannot run simulation");
            }
        }
    }
    info!(count, errors, "Simulation finished");

    let data = dashboard.get_dashboard_data();
    dashboard.destroy();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
        OutputFormat::Text => print_dashboard(&data, errors),
    }
    Ok(())
}

fn status_label(status: VerificationStatus) -> colored::ColoredString {
    if status == VerificationStatus::Success {
        status.as_str().green()
    } else if status.is_failure() {
        status.as_str().red()
    } else {
        status.as_str().yellow()
    }
}

fn print_dashboard(data: &DashboardData, errors: usize) {
    let summary = &data.summary;
    println!("{}", "valid8 Dashboard".bold());
    println!("----------------");
    println!("Total verifications: {}", summary.total_verifications);
    println!("  Successful:  {}", summary.successful_verifications.to_string().green());
    println!("  Failed:      {}", summary.failed_verifications.to_string().red());
    println!("  Success rate: {:.1}%", summary.success_rate * 100.0);
    println!("  Avg response: {:.1}ms", summary.average_response_time);
    if errors > 0 {
        println!("  Adapter errors: {}", errors.to_string().red());
    }

    println!();
    println!("{}", "Services".bold());
    for row in &data.service_status {
        println!(
            "  {:<14} total {:>5}  ok {:>5}  failed {:>5}  {:>6.1}%  {:>8.1}ms",
            row.service.as_str(),
            row.total,
            row.success,
            row.failed,
            row.success_rate * 100.0,
            row.average_time
        );
    }

    println!();
    println!("{}", "Adapters".bold());
    for row in &data.adapter_health {
        let health = if row.is_healthy { "healthy".green() } else { "unhealthy".red() };
        println!(
            "  {:<16} {:<10} requests {:>5}  error rate {:>5.1}%",
            row.adapter,
            health,
            row.total_requests,
            row.error_rate * 100.0
        );
    }

    println!();
    println!("{}", "Recent Activity".bold());
    for activity in data.recent_activity.iter().take(10) {
        println!(
            "  {}  {:<14} {:<16} {:<10} {}",
            activity.timestamp.format("%H:%M:%S%.3f"),
            activity.service_type.as_str(),
            activity.adapter,
            status_label(activity.status),
            activity.error.as_deref().unwrap_or("").dimmed()
        );
    }

    println!();
    println!("{}", "Timeline (5 min buckets)".bold());
    for bucket in &data.timeline {
        println!("  {}  {:>5} events", bucket.timestamp.format("%Y-%m-%d %H:%M"), bucket.total);
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}
