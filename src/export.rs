// src/export.rs - Tabular and structured result export

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use csv::Writer;
use log::info;
use serde::Serialize;
use serde_json::json;

use crate::errors::Result;
use crate::record::{FeatureRecord, FeatureValue};
use crate::time_series::{GrowthAnalysis, MorphologyChanges};

/// Writes analysis results to an output directory as CSV and JSON.
pub struct ResultExporter {
    output_dir: PathBuf,
}

impl ResultExporter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Write one CSV row per record. The header is the sorted union of all
    /// feature names; records missing a feature get an empty cell.
    pub fn export_csv(&self, records: &[FeatureRecord], filename: &str) -> Result<PathBuf> {
        let output_path = self.output_dir.join(format!("{}.csv", filename));

        let columns: BTreeSet<&String> = records.iter().flat_map(|r| r.keys()).collect();
        let columns: Vec<&String> = columns.into_iter().collect();

        let mut writer = Writer::from_path(&output_path)?;
        writer.write_record(columns.iter().map(|c| c.as_str()))?;

        for record in records {
            let row: Vec<String> = columns
                .iter()
                .map(|column| match record.get(column) {
                    Some(value) => format_value(value),
                    None => String::new(),
                })
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush().map_err(csv::Error::from)?;

        info!("results exported to {}", output_path.display());
        Ok(output_path)
    }

    /// Write any serializable value as pretty-printed JSON.
    pub fn export_json<T: Serialize>(&self, value: &T, filename: &str) -> Result<PathBuf> {
        let output_path = self.output_dir.join(format!("{}.json", filename));
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&output_path, content)?;
        info!("results exported to {}", output_path.display());
        Ok(output_path)
    }

    /// Export a time-series study: a per-timepoint CSV plus a combined
    /// analysis JSON.
    pub fn export_time_series(
        &self,
        growth: &GrowthAnalysis,
        morphology: &MorphologyChanges,
        filename: &str,
    ) -> Result<()> {
        self.export_csv(&morphology.time_points, &format!("{}_timeseries", filename))?;

        let analysis = json!({
            "growth_analysis": growth,
            "morphology_changes": morphology,
        });
        self.export_json(&analysis, &format!("{}_analysis", filename))?;
        Ok(())
    }
}

fn format_value(value: &FeatureValue) -> String {
    match value {
        FeatureValue::Float(v) => format!("{:.6}", v),
        FeatureValue::Int(v) => v.to_string(),
        FeatureValue::Bool(b) => b.to_string(),
    }
}
