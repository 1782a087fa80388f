//! `bodyscan profile`: show device capabilities.

use std::sync::Arc;

use clap::Args;
use console::style;

use bodyscan::capability::{
    CapabilityProfiler, DeviceProbe, HardwareInfo, StaticProbe, SystemProbe,
};
use bodyscan::config::ConfigFile;

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Override the detected memory, in GB
    #[arg(long)]
    pub memory_gb: Option<f64>,

    /// Override the detected core count
    #[arg(long)]
    pub cores: Option<u32>,
}

pub fn run(config: &ConfigFile, args: ProfileArgs) -> Result<(), CliError> {
    let probe = resolve_probe(&args);
    let profiler = CapabilityProfiler::new(config.capability.clone(), probe);
    let caps = profiler.detect();
    let bounds = profiler.optimal_memory_bounds();

    println!("{}", style("Device Capabilities").bold());
    println!("===================");
    println!("  Tier:                 {}", style(caps.performance_tier).cyan());
    println!("  Memory:               {:.1} GB", caps.memory_gb);
    println!("  Cores:                {}", caps.processor_cores);
    println!("  High-perf GPU:        {}", yes_no(caps.has_high_performance_gpu));
    println!("  Advanced tracking:    {}", yes_no(caps.supports_advanced_ar));
    println!(
        "  Frame interval:       {} ms",
        caps.recommended_frame_interval.as_millis()
    );
    println!("  Max concurrent ops:   {}", caps.max_concurrent_operations);
    println!();
    println!("{}", style("Memory Bounds").bold());
    println!("  Cache budget:         {:.0} MB", bounds.max_cache_size_mb);
    println!("  History entries:      {}", bounds.max_history_entries);
    println!("  GC threshold:         {:.0}%", bounds.gc_threshold * 100.0);
    Ok(())
}

/// The host probe, with any CLI overrides layered on top.
fn resolve_probe(args: &ProfileArgs) -> Arc<dyn DeviceProbe> {
    if args.memory_gb.is_none() && args.cores.is_none() {
        return Arc::new(SystemProbe::new());
    }
    let host = SystemProbe::new().probe().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Hardware probe failed, using baseline values");
        HardwareInfo {
            memory_gb: 4.0,
            processor_cores: 6,
        }
    });
    Arc::new(StaticProbe::new(
        args.memory_gb.unwrap_or(host.memory_gb),
        args.cores.unwrap_or(host.processor_cores),
    ))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
