// src/pipeline.rs - Orchestration: segmentation -> features -> plugin -> cache

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use ndarray::Array2;

use crate::accel::{Accelerator, PassthroughAccelerator};
use crate::batch::{BatchExecutor, BatchSummary};
use crate::cache::{DiskCache, ResultCache};
use crate::config::Config;
use crate::errors::{OrganoidError, Result};
use crate::export::ResultExporter;
use crate::features::FeatureEngine;
use crate::image_io::{get_png_files_in_dir, load_image, InputImage};
use crate::model_manager::ModelManager;
use crate::plugin::{builtin_registry, plugin_key, OrganoidPlugin};
use crate::record::FeatureRecord;
use crate::segmentation::{OtsuSegmenter, SegmentationModel};
use crate::time_series::{TimePoint, TimeSeries};

/// End-to-end analysis pipeline for one configured plugin.
///
/// Per-item flow: segmentation collaborator produces a mask, the feature
/// engine computes generic morphology, the plugin adds domain features
/// (winning on key collisions), and the merged record is memoized under the
/// item's identity.
pub struct AnalysisPipeline {
    engine: FeatureEngine,
    segmenter: Box<dyn SegmentationModel>,
    plugin: Arc<dyn OrganoidPlugin>,
    cache: ResultCache,
    disk_cache: Option<DiskCache>,
    executor: BatchExecutor,
    models: ModelManager,
    batch_size: usize,
    analysis_key: String,
}

impl AnalysisPipeline {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = builtin_registry();
        let plugin_config = config.plugin_config(&config.plugin_type, &config.plugin_name);
        let plugin = registry.create(&config.plugin_type, &config.plugin_name, &plugin_config)?;

        let accel: Arc<dyn Accelerator> = Arc::new(PassthroughAccelerator);
        if config.gpu_enabled && !accel.is_available() {
            warn!("gpu_enabled is set but no compute device is available; running on CPU");
        }

        let disk_cache = match &config.cache_dir {
            Some(dir) => Some(DiskCache::new(dir)?),
            None => None,
        };

        Ok(Self {
            engine: FeatureEngine::with_accelerator(accel),
            segmenter: Box::new(OtsuSegmenter::new(config.min_region_size)),
            plugin,
            cache: ResultCache::new(config.cache_max_size),
            disk_cache,
            executor: BatchExecutor::new(config.num_workers)?,
            models: ModelManager::new(&config.model_path)?,
            batch_size: config.batch_size,
            analysis_key: plugin_key(&config.plugin_type, &config.plugin_name),
        })
    }

    /// Model registry rooted at the configured `model_path`. Model-backed
    /// segmenters register and look up their checkpoints through this.
    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    /// Replace the segmentation collaborator (model-backed segmenters
    /// implement the same trait).
    pub fn with_segmenter(mut self, segmenter: Box<dyn SegmentationModel>) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Cache identity for an item: item id plus the analysis variant.
    fn cache_key(&self, item_id: &str) -> String {
        format!("{}:{}", item_id, self.analysis_key)
    }

    /// Analyze a single image, consulting the cache first.
    pub fn analyze_image(&self, item_id: &str, image: &Array2<u8>) -> Result<FeatureRecord> {
        let key = self.cache_key(item_id);
        if let Some(hit) = self.cache.get(&key) {
            debug!("cache hit for {}", key);
            return Ok(hit);
        }
        if let Some(disk) = &self.disk_cache {
            if let Some(hit) = disk.get(&key) {
                debug!("disk cache hit for {}", key);
                self.cache.put(&key, hit.clone());
                return Ok(hit);
            }
        }

        let mask = self.segmenter.segment(image)?.into_dyn();
        let mut record = self.engine.compute_dyn(&mask)?;
        let plugin_record = self.plugin.analyze(&mask)?;
        record.merge(&plugin_record);

        self.cache.put(&key, record.clone());
        if let Some(disk) = &self.disk_cache {
            disk.put(&key, &record);
        }
        Ok(record)
    }

    /// Analyze a set of loaded images in parallel batches.
    ///
    /// Results keep one slot per input; failed items are logged with their
    /// identity and hold `None`.
    pub fn run_batch(
        &self,
        items: &[InputImage],
    ) -> (Vec<Option<FeatureRecord>>, BatchSummary) {
        let results = self.executor.map_batch(
            |item: &InputImage| {
                self.analyze_image(&item.path.to_string_lossy(), &item.pixels)
                    .map_err(|e| {
                        OrganoidError::Analysis(format!("{}: {}", item.filename, e))
                    })
            },
            items,
            self.batch_size,
        );
        let summary = BatchSummary::from_results(&results);
        info!(
            "batch complete: {} total, {} succeeded, {} failed",
            summary.total, summary.succeeded, summary.failed
        );
        (results, summary)
    }
}

/// Acquisition time encoded in a filename stem such as `image_12.5` or
/// `well3_t04`; the trailing underscore-separated token is parsed, with a
/// leading `t` allowed.
pub fn parse_time_from_stem(stem: &str) -> Option<f64> {
    let token = stem.rsplit('_').next()?;
    let token = token.strip_prefix('t').unwrap_or(token);
    token.parse::<f64>().ok().filter(|t| *t >= 0.0)
}

/// Run the full configured analysis over a directory of images.
///
/// Writes per-image results as CSV and JSON and, when time-series mode is
/// enabled, growth and morphology-trend summaries. Fails only when zero
/// items succeed.
pub fn run_analysis(config: &Config) -> Result<BatchSummary> {
    let pipeline = AnalysisPipeline::from_config(config)?;
    let exporter = ResultExporter::new(&config.output_dir)?;

    let input_path = PathBuf::from(&config.input_path);
    let files = if input_path.is_file() {
        vec![input_path]
    } else {
        get_png_files_in_dir(&input_path)?
    };
    info!("found {} input images", files.len());

    // Load failures are item failures, not run failures.
    let mut items = Vec::new();
    let mut load_failures = 0usize;
    for path in &files {
        match load_image(path) {
            Ok(item) => items.push(item),
            Err(e) => {
                warn!("failed to load {}: {}", path.display(), e);
                load_failures += 1;
            }
        }
    }

    let (results, mut summary) = pipeline.run_batch(&items);
    summary.total += load_failures;
    summary.failed += load_failures;

    let succeeded: Vec<FeatureRecord> = results.iter().flatten().cloned().collect();
    exporter.export_csv(&succeeded, "analysis_results")?;
    exporter.export_json(&succeeded, "analysis_results")?;

    if config.time_series_enabled && !succeeded.is_empty() {
        let mut series = TimeSeries::new();
        for (idx, (item, result)) in items.iter().zip(&results).enumerate() {
            if let Some(record) = result {
                let time = parse_time_from_stem(&item.filename).unwrap_or(idx as f64);
                series.add_time_point(TimePoint::new(time, record.clone()));
            }
        }
        match series.analyze_growth() {
            Ok(growth) => {
                let morphology = series.analyze_morphology_changes()?;
                exporter.export_time_series(&growth, &morphology, "time_series")?;
            }
            Err(e) => warn!("skipping time-series summary: {}", e),
        }
    }

    if summary.is_total_failure() {
        return Err(OrganoidError::Analysis(format!(
            "all {} items failed",
            summary.total
        )));
    }
    Ok(summary)
}
