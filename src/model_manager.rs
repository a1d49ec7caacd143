// src/model_manager.rs - Detection model registry with checkpoint selection

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::info;
use ndarray::ArrayD;

use crate::errors::{OrganoidError, Result};

/// A single detected object proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub score: f64,
    /// (min_row, min_col, max_row, max_col), inclusive.
    pub bbox: (usize, usize, usize, usize),
}

/// Wrapper around a loaded detection/prediction model.
///
/// Wrappers declare which inference parameters they honor and must be loaded
/// from a checkpoint before `predict` is called.
pub trait ModelWrapper: Send + Sync {
    fn load(&mut self, checkpoint: &Path) -> Result<()>;

    fn predict(&self, data: &ArrayD<f64>) -> Result<Vec<Detection>>;

    /// Names of the inference parameters this wrapper reads from its config.
    fn supported_inference_params(&self) -> &'static [&'static str];

    /// Checkpoint the wrapper was loaded from, if any.
    fn checkpoint(&self) -> Option<&Path>;
}

/// Intensity-threshold detector standing in for an external inference
/// engine. Real model runtimes are external collaborators behind the same
/// trait.
pub struct ThresholdWrapper {
    threshold: f64,
    checkpoint: Option<PathBuf>,
}

impl ThresholdWrapper {
    pub fn new(config: &toml::Table) -> Self {
        let threshold = config
            .get("threshold")
            .and_then(|v| v.as_float())
            .unwrap_or(0.5);
        Self {
            threshold,
            checkpoint: None,
        }
    }
}

impl ModelWrapper for ThresholdWrapper {
    fn load(&mut self, checkpoint: &Path) -> Result<()> {
        // The checkpoint must at least be readable; its contents may carry a
        // calibrated threshold override.
        let content = fs::read_to_string(checkpoint)?;
        if let Ok(table) = content.parse::<toml::Table>() {
            if let Some(threshold) = table.get("threshold").and_then(|v| v.as_float()) {
                self.threshold = threshold;
            }
        }
        info!("loaded threshold model from {}", checkpoint.display());
        self.checkpoint = Some(checkpoint.to_path_buf());
        Ok(())
    }

    fn predict(&self, data: &ArrayD<f64>) -> Result<Vec<Detection>> {
        if self.checkpoint.is_none() {
            return Err(OrganoidError::ModelNotLoaded("threshold".to_string()));
        }
        if data.ndim() != 2 {
            return Err(OrganoidError::InvalidDimensionality(data.ndim()));
        }
        let view = data
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|_| OrganoidError::InvalidDimensionality(data.ndim()))?;

        let mut min_r = usize::MAX;
        let mut min_c = usize::MAX;
        let mut max_r = 0usize;
        let mut max_c = 0usize;
        let mut sum = 0.0;
        let mut count = 0usize;
        for ((r, c), &v) in view.indexed_iter() {
            if v >= self.threshold {
                min_r = min_r.min(r);
                min_c = min_c.min(c);
                max_r = max_r.max(r);
                max_c = max_c.max(c);
                sum += v;
                count += 1;
            }
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![Detection {
            score: sum / count as f64,
            bbox: (min_r, min_c, max_r, max_c),
        }])
    }

    fn supported_inference_params(&self) -> &'static [&'static str] {
        &["threshold"]
    }

    fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }
}

/// Process-wide registry of loaded models, one active model per plugin name.
pub struct ModelManager {
    checkpoints_dir: PathBuf,
    configs_dir: PathBuf,
    models: RwLock<HashMap<String, Arc<dyn ModelWrapper>>>,
}

impl ModelManager {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let checkpoints_dir = base_dir.join("checkpoints");
        let configs_dir = base_dir.join("configs");
        fs::create_dir_all(&checkpoints_dir)?;
        fs::create_dir_all(&configs_dir)?;
        Ok(Self {
            checkpoints_dir,
            configs_dir,
            models: RwLock::new(HashMap::new()),
        })
    }

    pub fn configs_dir(&self) -> &Path {
        &self.configs_dir
    }

    /// Register a model for a plugin name: load its config (if a path is
    /// given), pick the newest checkpoint under `checkpoints/<plugin_name>/`,
    /// load it and store the handle. Re-registering the same name replaces
    /// the prior handle, dropping its resources.
    pub fn register_model(
        &self,
        plugin_name: &str,
        model_type: &str,
        config_path: Option<&Path>,
    ) -> Result<Arc<dyn ModelWrapper>> {
        let config = match config_path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                content
                    .parse::<toml::Table>()
                    .map_err(|e| OrganoidError::ConfigLoad {
                        source: e,
                        path: path.to_path_buf(),
                    })?
            }
            None => toml::Table::new(),
        };

        let mut wrapper: Box<dyn ModelWrapper> = match model_type.to_lowercase().as_str() {
            "threshold" => Box::new(ThresholdWrapper::new(&config)),
            other => return Err(OrganoidError::UnsupportedModelType(other.to_string())),
        };

        let checkpoint_dir = self.checkpoints_dir.join(plugin_name);
        fs::create_dir_all(&checkpoint_dir)?;
        let checkpoint = latest_checkpoint(&checkpoint_dir)?;
        wrapper.load(&checkpoint)?;

        let handle: Arc<dyn ModelWrapper> = Arc::from(wrapper);
        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        if models
            .insert(plugin_name.to_string(), Arc::clone(&handle))
            .is_some()
        {
            info!("replaced model for plugin {}", plugin_name);
        }
        Ok(handle)
    }

    pub fn get_model(&self, plugin_name: &str) -> Option<Arc<dyn ModelWrapper>> {
        self.models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(plugin_name)
            .cloned()
    }
}

/// Most-recently-modified regular file in the checkpoint directory.
fn latest_checkpoint(dir: &Path) -> Result<PathBuf> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        let is_newer = match &newest {
            Some((best, _)) => modified > *best,
            None => true,
        };
        if is_newer {
            newest = Some((modified, path));
        }
    }
    newest
        .map(|(_, path)| path)
        .ok_or_else(|| OrganoidError::NoCheckpointFound(dir.to_path_buf()))
}
