//! `bodyscan monitor`: run the performance control loop on synthetic telemetry.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use tokio_util::sync::CancellationToken;

use bodyscan::capability::{CapabilityProfiler, SystemProbe};
use bodyscan::config::ConfigFile;
use bodyscan::performance::{
    PerformanceMonitor, PerformanceOptimizer, Predictor, SyntheticProfile, SyntheticTelemetry,
    TickObserver, TuningState, DEFAULT_HORIZON,
};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Number of ticks to run
    #[arg(long, default_value_t = 20)]
    pub ticks: u64,

    /// Override the tick interval, in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Battery drained per tick, 0..1
    #[arg(long)]
    pub battery_drain: Option<f64>,
}

pub async fn run(config: ConfigFile, args: MonitorArgs) -> Result<(), CliError> {
    let mut monitor_config = config.monitor.clone();
    if let Some(ms) = args.interval_ms {
        monitor_config.tick_interval = Duration::from_millis(ms);
    }
    let interval = monitor_config.tick_interval;

    let mut profile = SyntheticProfile::default();
    if let Some(drain) = args.battery_drain {
        profile.battery_drain = drain;
    }

    let profiler = Arc::new(CapabilityProfiler::new(
        config.capability.clone(),
        Arc::new(SystemProbe::new()),
    ));
    let tuning = Arc::new(TuningState::from_capabilities(&profiler.detect()));
    let optimizer = PerformanceOptimizer::new(
        config.optimizer.clone(),
        Arc::clone(&profiler),
        Arc::clone(&tuning),
        Predictor::linear(DEFAULT_HORIZON, interval),
    );
    let monitor = PerformanceMonitor::new(monitor_config, Arc::new(SyntheticTelemetry::new(profile)));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        on_signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!(
        "{} {} ticks every {} ms (Ctrl+C to stop)",
        style("Monitoring:").bold(),
        args.ticks,
        interval.as_millis()
    );
    println!();

    let observer: &dyn TickObserver = &optimizer;
    for tick in 1..=args.ticks {
        if cancel.is_cancelled() {
            break;
        }
        if let Some(report) = monitor.tick(Some(observer)).await {
            let s = &report.snapshot;
            println!(
                "[{:>3}] {:>5.1} fps  mem {:>3.0}%  cpu {:>3.0}%  battery {:>3.0}%  thermal {}  → {} fps, {} quality",
                tick,
                s.frame_rate,
                s.memory_usage_ratio * 100.0,
                s.cpu_usage_ratio * 100.0,
                s.battery_level * 100.0,
                s.thermal_state.as_str(),
                tuning.frame_rate(),
                tuning.quality(),
            );
            for alert in &report.alerts {
                println!("      {} {}", style(alert.severity).yellow(), alert.message);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!(
        ticks = monitor.tick_count(),
        skipped = monitor.skipped_ticks(),
        "Monitoring stopped"
    );
    let status = monitor.status();
    println!();
    println!(
        "{} {} (score {:.0}, {} active alerts)",
        style("Health:").bold(),
        status.grade,
        status.score,
        status.active_alerts
    );
    let trends = monitor.trends();
    println!(
        "  Trends: frame rate {}, memory {}, cpu {}, battery {}, overall {}",
        trends.frame_rate, trends.memory, trends.cpu, trends.battery, trends.overall
    );
    if let Some(decision) = optimizer.current() {
        for line in decision.recommendations {
            println!("  - {}", line);
        }
    }
    for rec in monitor.recommendations() {
        println!("  * [{}] {}: {}", rec.priority, rec.title, rec.description);
    }
    Ok(())
}
