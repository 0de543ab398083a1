//! Read/write fit-results JSON files.
//!
//! The results file is the portable representation of a fit run:
//! - time unit of the series that was fitted
//! - every converged channel: parameters, statistics, observations,
//!   best-fit curve and uncertainty band
//!
//! It is what `growth plot` reloads. The schema is `domain::FitResultsFile`.

use std::fs::File;
use std::path::Path;

use crate::domain::{ChannelFits, FitResult, FitResultsFile, TimeUnit};
use crate::error::AppError;

/// Write the converged fits of a run.
pub fn save_results(path: &Path, fits: &ChannelFits, unit: TimeUnit) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create results JSON '{}': {e}", path.display())))?;

    let results = FitResultsFile {
        tool: "growth".to_string(),
        time_unit: unit,
        fits: fits.values().filter_map(|r| r.as_ref().ok()).cloned().collect(),
    };

    serde_json::to_writer_pretty(file, &results)
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;

    Ok(())
}

/// Read a results JSON file.
pub fn load_results(path: &Path) -> Result<FitResultsFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open results JSON '{}': {e}", path.display())))?;
    let results: FitResultsFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid results JSON: {e}")))?;
    Ok(results)
}

impl FitResultsFile {
    /// The saved fit of one channel.
    pub fn channel(&self, channel: &str) -> Result<&FitResult, AppError> {
        self.fits.iter().find(|f| f.channel == channel).ok_or_else(|| {
            let known: Vec<&str> = self.fits.iter().map(|f| f.channel.as_str()).collect();
            AppError::new(
                2,
                format!("No fit for channel '{channel}' (available: {}).", known.join(", ")),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticConfig, generate_series};
    use crate::domain::FitConfig;
    use crate::fit::GrowthFitter;
    use crate::io::table::tests::temp_dir;
    use crate::models::value;
    use approx::assert_relative_eq;

    #[test]
    fn saved_results_reload_with_parameters_and_curve() {
        let dir = temp_dir("results");
        let series = generate_series(&SyntheticConfig::default()).unwrap();
        let channels = vec!["440".to_string(), "800".to_string()];
        let fits = GrowthFitter::new(FitConfig::default()).fit(&series, &channels);
        let path = dir.join("fit_results.json");
        save_results(&path, &fits, series.unit()).unwrap();

        let loaded = load_results(&path).unwrap();
        assert_eq!(loaded.time_unit, TimeUnit::Days);
        assert_eq!(loaded.fits.len(), 2);

        let original = fits["800"].as_ref().unwrap();
        let reloaded = loaded.channel("800").unwrap();
        assert_relative_eq!(reloaded.parameters.a, original.parameters.a, max_relative = 1e-12);
        assert_relative_eq!(reloaded.parameters.c, original.parameters.c, max_relative = 1e-12);
        assert_eq!(reloaded.best_fit.len(), original.best_fit.len());
        for point in &reloaded.best_fit {
            assert_relative_eq!(point.value, value(point.time, &reloaded.parameters), max_relative = 1e-9);
        }

        assert!(loaded.channel("999").is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
