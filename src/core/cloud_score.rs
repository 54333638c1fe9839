use crate::core::engine::RasterEngine;
use crate::core::harmonize::SensorBandMap;
use crate::types::{BandImage, RasterStack, Scene, WaterError, WaterResult};
use ndarray::Array2;

/// Bands read by the cloud heuristic, by canonical role
const SCORE_BANDS: [&str; 6] = ["blue", "green", "red", "nir", "swir1", "swir2"];

/// Linear ramp clamped to [0, 1]; `lo > hi` gives a falling ramp
fn rescale(value: f32, lo: f32, hi: f32) -> f32 {
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Simple spectral cloud likelihood in [0, 100] from reflectance values.
///
/// Clouds are bright in the blue, bright across the visible and infrared,
/// and are not snow (low NDSI). The score is the weakest of those cues.
pub fn simple_cloud_score(blue: f32, green: f32, red: f32, nir: f32, swir1: f32, swir2: f32) -> f32 {
    let mut score = 1.0f32;
    score = score.min(rescale(blue, 0.1, 0.3));
    score = score.min(rescale(red + green + blue, 0.2, 0.8));
    score = score.min(rescale(nir + swir1 + swir2, 0.3, 0.8));

    let denom = green + swir1;
    let ndsi = if denom.abs() > f32::EPSILON { (green - swir1) / denom } else { 0.0 };
    score = score.min(rescale(ndsi, 0.8, 0.6));

    score * 100.0
}

/// Cloud suppressor: clears validity where the cloud score reaches the threshold
pub struct CloudSuppressor<'e, E: RasterEngine> {
    engine: &'e E,
    threshold: f64,
    reflectance_scale: f64,
}

impl<'e, E: RasterEngine> CloudSuppressor<'e, E> {
    /// `threshold` must be > 0; callers skip this stage when it is 0.
    /// `reflectance_scale` divides stored values into 0..1 reflectance.
    pub fn new(engine: &'e E, threshold: f64, reflectance_scale: f64) -> WaterResult<Self> {
        if threshold <= 0.0 {
            return Err(WaterError::InvalidParameter(format!(
                "Cloud score threshold must be > 0 to run cloud suppression, got {}",
                threshold
            )));
        }
        if reflectance_scale <= 0.0 {
            return Err(WaterError::InvalidParameter(format!(
                "Reflectance scale must be > 0, got {}",
                reflectance_scale
            )));
        }
        Ok(Self {
            engine,
            threshold,
            reflectance_scale,
        })
    }

    /// Per-pixel cloud score for a scene in native band naming
    pub fn score_scene(&self, scene: &Scene) -> WaterResult<Array2<f32>> {
        let map = SensorBandMap::for_sensor(scene.sensor);
        let mut layers: Vec<&BandImage> = Vec::with_capacity(SCORE_BANDS.len());
        let mut missing = Vec::new();
        for role in SCORE_BANDS {
            let native = map.native_for(role).unwrap_or(role);
            // Already-harmonized scenes expose the canonical name directly.
            match scene.raster.band(native).or_else(|| scene.raster.band(role)) {
                Some(b) => layers.push(b),
                None => missing.push(native.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(WaterError::BandMappingIncomplete {
                product_id: scene.product_id.clone(),
                sensor: scene.sensor,
                missing,
            });
        }

        let k = 1.0 / self.reflectance_scale as f32;
        let score = Array2::from_shape_fn(scene.raster.shape(), |idx| {
            simple_cloud_score(
                layers[0][idx] * k,
                layers[1][idx] * k,
                layers[2][idx] * k,
                layers[3][idx] * k,
                layers[4][idx] * k,
                layers[5][idx] * k,
            )
        });
        Ok(score)
    }

    /// Mask cloudy pixels of one scene
    pub fn suppress_scene(&self, scene: &Scene) -> WaterResult<Scene> {
        let score = self.score_scene(scene)?;
        let threshold = self.threshold as f32;
        let clear = score.mapv(|s| s < threshold);
        let raster = self.engine.mask(&scene.raster, &clear)?;
        Ok(scene.with_raster(raster))
    }

    /// Mask cloudy pixels across a stack; scenes that cannot be scored are skipped
    pub fn suppress_stack(&self, stack: &RasterStack) -> WaterResult<RasterStack> {
        log::debug!(
            "Cloud suppression over {} scenes (threshold {})",
            stack.len(),
            self.threshold
        );
        let mut scenes = Vec::with_capacity(stack.len());
        for scene in &stack.scenes {
            match self.suppress_scene(scene) {
                Ok(s) => scenes.push(s),
                Err(e @ WaterError::BandMappingIncomplete { .. }) => {
                    log::warn!("Skipping scene in cloud suppression: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(RasterStack::from_scenes(stack.crs, scenes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::LocalEngine;
    use crate::types::{GeoTransform, Raster, SensorGeneration};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_bright_white_pixel_scores_high() {
        let s = simple_cloud_score(0.4, 0.4, 0.4, 0.4, 0.3, 0.3);
        assert_relative_eq!(s, 100.0);
    }

    #[test]
    fn test_dark_water_scores_zero() {
        let s = simple_cloud_score(0.05, 0.06, 0.04, 0.02, 0.01, 0.01);
        assert_relative_eq!(s, 0.0);
    }

    #[test]
    fn test_snow_is_not_cloud() {
        // Bright everywhere but a high NDSI.
        let s = simple_cloud_score(0.8, 0.8, 0.8, 0.7, 0.05, 0.05);
        assert_relative_eq!(s, 0.0);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let engine = LocalEngine::new();
        assert!(CloudSuppressor::new(&engine, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_cloudy_pixel_masked() {
        let engine = LocalEngine::new();
        let mut raster = Raster::new(GeoTransform::north_up(0.0, 1.0, 1.0), (1, 2));
        let bright = ndarray::arr2(&[[0.05f32, 0.5]]);
        for b in ["B1", "B2", "B3", "B4"] {
            raster = raster.with_band(b, bright.clone()).unwrap();
        }
        for b in ["B5", "B7"] {
            raster = raster.with_band(b, ndarray::arr2(&[[0.01f32, 0.4]])).unwrap();
        }
        let t = Utc.with_ymd_and_hms(2001, 5, 1, 0, 0, 0).unwrap();
        let scene = Scene::new("LT05_test", SensorGeneration::Landsat5, t, raster);
        let suppressor = CloudSuppressor::new(&engine, 80.0, 1.0).unwrap();
        let out = suppressor.suppress_scene(&scene).unwrap();
        assert!(out.raster.valid[[0, 0]]);
        assert!(!out.raster.valid[[0, 1]]);
    }
}
