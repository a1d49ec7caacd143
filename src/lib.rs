// src/lib.rs - Library interface for organoid_morph

pub mod accel;
pub mod batch;
pub mod cache;
pub mod config;
pub mod errors;
pub mod export;
pub mod features;
pub mod image_io;
pub mod mask;
pub mod model_manager;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod record;
pub mod segmentation;
pub mod time_series;

// Re-export commonly used types and functions
pub use errors::{OrganoidError, Result};
pub use config::Config;
pub use record::{FeatureRecord, FeatureValue};
pub use pipeline::{run_analysis, AnalysisPipeline};
pub use image_io::{get_png_files_in_dir, load_image, InputImage};

// Feature engine and geometry helpers
pub use features::{
    contour_perimeter,
    equivalent_diameter,
    sphericity,
    surface_area_3d,
    trace_contour,
    FeatureEngine,
};

// Plugin contract and registry
pub use plugin::{
    builtin_registry,
    plugin_key,
    MorphologySpec,
    OrganoidPlugin,
    PluginConfig,
    PluginDescriptor,
    PluginFactory,
    PluginRegistration,
    PluginRegistry,
};

// Execution and memoization
pub use batch::{BatchExecutor, BatchSummary};
pub use cache::{DiskCache, ResultCache};

// Model and segmentation collaborators
pub use model_manager::{Detection, ModelManager, ModelWrapper};
pub use segmentation::{OtsuSegmenter, SegmentationModel};

// Time-series aggregation
pub use time_series::{GrowthAnalysis, MorphologyChanges, TimePoint, TimeSeries};
