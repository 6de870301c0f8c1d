use assay_core::calibration::CalibrationReport;
use assay_core::config::AssayConfig;
use serde::Serialize;
use tracing::warn;

use super::{CommandResult, EXIT_CONFIG};

const COMMAND: &str = "calibration";

#[derive(Debug, Serialize)]
struct CalibrationSummary {
    #[serde(flatten)]
    report: CalibrationReport,
    improved: bool,
}

/// Scores the configured calibrator against the held-out samples it was
/// configured with. Lower ECE and Brier values are better.
pub fn run(config: &AssayConfig) -> CommandResult {
    let calibrator = match config.calibration.build() {
        Ok(calibrator) => calibrator,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "calibration_config",
                error.to_string(),
                EXIT_CONFIG,
            )
        }
    };

    let samples = &config.calibration.samples;
    if samples.is_empty() {
        warn!(
            event_name = "cli.calibration.no_samples",
            method = %config.calibration.method,
            "no held-out samples configured; report is empty"
        );
    }

    let report = calibrator.report(samples);
    let improved = !samples.is_empty() && report.ece_after <= report.ece_before;
    CommandResult::report(COMMAND, &CalibrationSummary { report, improved })
}
