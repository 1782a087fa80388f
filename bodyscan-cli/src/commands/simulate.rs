//! `bodyscan simulate`: exercise the full pipeline on synthetic input.

use std::sync::Arc;

use clap::Args;
use console::style;

use bodyscan::calibration::{CalibrationSample, KnownMeasurements, SessionStatus};
use bodyscan::config::ConfigFile;
use bodyscan::detection::{SyntheticBodyBackend, SyntheticFrameSource};
use bodyscan::measurement::RawMeasurement;
use bodyscan::startup::StartupStatus;
use bodyscan::system::{MeasurementReport, MeasurementSystem};

use crate::error::CliError;

/// Upper bound on calibration submissions before giving up.
const MAX_CALIBRATION_FRAMES: u64 = 60;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// User the calibration profile belongs to
    #[arg(long, default_value = "demo")]
    pub user: String,

    /// Height of the simulated body, in cm
    #[arg(long, default_value_t = 175.0)]
    pub height: f64,

    /// Shoulder width of the simulated body, in cm
    #[arg(long, default_value_t = 44.0)]
    pub shoulders: f64,

    /// Frame-to-frame wobble, in cm
    #[arg(long, default_value_t = 0.5)]
    pub jitter: f64,

    /// Height the user confirms during calibration, in cm
    #[arg(long)]
    pub known_height: Option<f64>,

    /// Skip calibration
    #[arg(long)]
    pub no_calibration: bool,

    /// Measurements to take after calibration
    #[arg(long, default_value_t = 5)]
    pub frames: u64,

    /// Print measurement reports as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub async fn run(config: ConfigFile, args: SimulateArgs) -> Result<(), CliError> {
    let backend = SyntheticBodyBackend::new(args.height, args.shoulders)
        .with_confidence(0.95)
        .with_jitter_cm(args.jitter);
    let system = MeasurementSystem::builder(config)
        .with_landmark_backend("synthetic_ar", Arc::new(backend))
        .build();
    let frames = SyntheticFrameSource::new(320, 480);

    let report = system.startup().initialize().await;
    println!(
        "{} {} in {} ms",
        style("Startup:").bold(),
        status_label(report.status()),
        report.elapsed.as_millis()
    );
    println!("  Features: {}", report.features_enabled.join(", "));
    for warning in &report.warnings {
        println!("  {} {}", style("warning:").yellow(), warning);
    }
    if report.status() == StartupStatus::Failed {
        tracing::error!(warnings = ?report.warnings, "Startup failed, not measuring");
        system.shutdown();
        report.into_result()?;
    }

    let mut sequence = 0;
    if !args.no_calibration {
        sequence = calibrate(&system, &frames, &args).await?;
    }

    println!();
    println!("{}", style("Measurements").bold());
    for i in 0..args.frames {
        let frame = frames.render(sequence + i);
        let report = system.measure(&args.user, &frame).await?;
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            print_report(&report);
        }
    }

    let stats = system.calibration().statistics();
    println!();
    println!(
        "Sessions: {} total, {} completed, average accuracy {:.0}%",
        stats.total_sessions,
        stats.completed_sessions,
        stats.average_accuracy * 100.0
    );
    system.shutdown();
    Ok(())
}

/// Drive one calibration session with frames from `frames`. Returns the
/// next unused frame sequence.
async fn calibrate(
    system: &MeasurementSystem,
    frames: &SyntheticFrameSource,
    args: &SimulateArgs,
) -> Result<u64, CliError> {
    let engine = system.calibration();
    let session = engine.start_session(&args.user)?;
    println!();
    println!("{} session {}", style("Calibration:").bold(), session.id);

    let known = KnownMeasurements {
        height_cm: args.known_height,
        shoulder_width_cm: None,
    };

    let mut sequence = 0;
    while sequence < MAX_CALIBRATION_FRAMES {
        let Some(current) = engine.session(&session.id) else {
            break;
        };
        if !current.is_active() {
            break;
        }
        let (step_name, accepts_known) = current
            .active_step()
            .map(|s| (s.spec.name.clone(), s.spec.accepts_known))
            .unwrap_or_default();

        let report = system.measure(&args.user, &frames.render(sequence)).await?;
        sequence += 1;

        let m = &report.measurement;
        let mut sample = CalibrationSample::new(
            RawMeasurement::new(m.shoulder_width_cm, m.height_cm, m.confidence),
            m.quality,
        );
        if accepts_known && !known.is_empty() {
            sample = sample.with_known(known);
        }

        let outcome = engine.submit_sample(&session.id, sample)?;
        let marker = if outcome.accepted {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!("  {} [{}] {}", marker, step_name, outcome.feedback);
        if outcome.session_status == SessionStatus::Completed {
            break;
        }
    }

    match engine.profile(&args.user) {
        Some(profile) => println!(
            "  Profile v{}: height ×{:.3}, shoulders ×{:.3}, body type {}",
            profile.version,
            profile.scale_factors.height,
            profile.scale_factors.shoulder_width,
            profile.physical.body_type
        ),
        None => println!("  {}", style("No profile created").yellow()),
    }
    Ok(sequence)
}

fn print_report(report: &MeasurementReport) {
    let m = &report.measurement;
    println!(
        "  height {:>6.1} cm  shoulders {:>5.1} cm  chest {:>5.1}  waist {:>5.1}  hips {:>5.1}  conf {:.2}  {} via {}{}",
        m.height_cm,
        m.shoulder_width_cm,
        m.chest_cm,
        m.waist_cm,
        m.hips_cm,
        m.confidence,
        m.quality,
        report.method,
        if m.calibration_applied { " (calibrated)" } else { "" }
    );
    for warning in &m.warnings {
        println!("    {} {}", style("warning:").yellow(), warning);
    }
}

fn status_label(status: StartupStatus) -> console::StyledObject<&'static str> {
    match status {
        StartupStatus::Ready => style("ready").green(),
        StartupStatus::Degraded => style("degraded").yellow(),
        StartupStatus::Failed => style("failed").red(),
    }
}
