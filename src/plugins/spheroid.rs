// src/plugins/spheroid.rs - Spheroid organoid analysis plugin

use std::sync::Arc;

use toml::Value;

use crate::errors::Result;
use crate::features::{self, contour_perimeter, trace_contour};
use crate::mask::{self, MaskD};
use crate::plugin::{
    MorphologySpec, OrganoidPlugin, PluginConfig, PluginDescriptor, PluginRegistration,
};
use crate::record::FeatureRecord;

const PLUGIN_TYPE: &str = "organoid";
const PLUGIN_NAME: &str = "spheroid";
const VERSION: &str = "1.0.0";

/// Analysis plugin for spheroid organoids.
///
/// Validates that the segmented object is within the configured size range
/// and sufficiently spherical.
pub struct SpheroidPlugin {
    size_range: (f64, f64),
    sphericity_threshold: f64,
    required_keys: Vec<String>,
}

impl SpheroidPlugin {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(
            PLUGIN_TYPE,
            PLUGIN_NAME,
            VERSION,
            &["size_range", "sphericity_threshold"],
        )
    }

    /// Construct from configuration. Fails with `MissingConfigKeys` before
    /// reading any value if a required key is absent.
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let descriptor = Self::descriptor();
        config.require(&descriptor.required_config_keys)?;

        let size_range = config.get_f64_pair("size_range").ok_or_else(|| {
            crate::errors::OrganoidError::Config(
                "size_range must be a two-element numeric array".to_string(),
            )
        })?;
        let sphericity_threshold = config.get_f64("sphericity_threshold").ok_or_else(|| {
            crate::errors::OrganoidError::Config(
                "sphericity_threshold must be numeric".to_string(),
            )
        })?;

        Ok(Self {
            size_range,
            sphericity_threshold,
            required_keys: descriptor.required_config_keys,
        })
    }

    /// Volume, surface and centroid measures for a mask of either rank.
    ///
    /// For a 3D volume these are the voxel count and exposed-face surface.
    /// A 2D mask is treated as a projected section: volume is the pixel
    /// count and the traced contour perimeter stands in for the surface.
    fn measure(&self, mask: &MaskD) -> Result<(f64, f64, FeatureRecord)> {
        let mut record = FeatureRecord::new();
        match mask.ndim() {
            3 => {
                let region = mask::first_region_3d(&mask::as_3d(mask)?)?;
                let volume = region.iter().filter(|&&v| v).count() as f64;
                let (cz, cr, cc) = features::centroid_3d(&region);
                record.insert("centroid_z", cz);
                record.insert("centroid_row", cr);
                record.insert("centroid_col", cc);
                Ok((volume, features::surface_area_3d(&region), record))
            }
            _ => {
                let region = mask::first_region_2d(&mask::as_2d(mask)?)?;
                let volume = region.iter().filter(|&&v| v).count() as f64;
                let (cr, cc) = features::centroid_2d(&region);
                record.insert("centroid_row", cr);
                record.insert("centroid_col", cc);
                let surface = contour_perimeter(&trace_contour(&region));
                Ok((volume, surface, record))
            }
        }
    }
}

impl OrganoidPlugin for SpheroidPlugin {
    fn required_config_keys(&self) -> &[String] {
        &self.required_keys
    }

    fn define_morphology(&self) -> MorphologySpec {
        let mut spec = MorphologySpec::new();
        spec.insert(
            "expected_shape".to_string(),
            Value::String("spherical".to_string()),
        );
        spec.insert(
            "size_range".to_string(),
            Value::Array(vec![
                Value::Float(self.size_range.0),
                Value::Float(self.size_range.1),
            ]),
        );
        spec.insert(
            "sphericity_threshold".to_string(),
            Value::Float(self.sphericity_threshold),
        );
        spec
    }

    fn analyze(&self, mask: &MaskD) -> Result<FeatureRecord> {
        let (volume, surface_area, mut record) = self.measure(mask)?;
        let sphericity = features::sphericity(volume, surface_area);
        let diameter = features::equivalent_diameter(volume);

        let (min_size, max_size) = self.size_range;
        let is_valid = (min_size..=max_size).contains(&volume)
            && sphericity >= self.sphericity_threshold;

        record.insert("volume", volume);
        record.insert("surface_area", surface_area);
        record.insert("sphericity", sphericity);
        record.insert("diameter", diameter);
        record.insert("is_valid_spheroid", is_valid);
        Ok(record)
    }

    fn metadata(&self) -> PluginDescriptor {
        Self::descriptor()
    }
}

/// Manifest entry for startup registration.
pub fn registration() -> PluginRegistration {
    PluginRegistration {
        descriptor: SpheroidPlugin::descriptor(),
        factory: Box::new(|config| {
            Ok(Arc::new(SpheroidPlugin::from_config(config)?) as Arc<dyn OrganoidPlugin>)
        }),
    }
}
