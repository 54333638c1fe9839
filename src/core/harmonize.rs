use crate::core::engine::RasterEngine;
use crate::types::{RasterStack, Scene, SensorGeneration, WaterError, WaterResult, STD_NAMES};

/// Native band identifiers for each canonical band, in `STD_NAMES` order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorBandMap {
    pub sensor: SensorGeneration,
    native: [&'static str; 7],
}

const OLI_BANDS: [&str; 7] = ["B1", "B2", "B3", "B4", "B5", "B6", "B7"];
// TM and ETM+ have no coastal band; blue stands in for blue2.
const TM_BANDS: [&str; 7] = ["B1", "B1", "B2", "B3", "B4", "B5", "B7"];

impl SensorBandMap {
    pub fn for_sensor(sensor: SensorGeneration) -> Self {
        let native = match sensor {
            SensorGeneration::Landsat8 => OLI_BANDS,
            SensorGeneration::Landsat4 | SensorGeneration::Landsat5 | SensorGeneration::Landsat7 => TM_BANDS,
        };
        Self { sensor, native }
    }

    pub fn native_names(&self) -> &[&'static str; 7] {
        &self.native
    }

    /// Native identifier backing a canonical band
    pub fn native_for(&self, canonical: &str) -> Option<&'static str> {
        STD_NAMES
            .iter()
            .position(|&n| n == canonical)
            .map(|i| self.native[i])
    }
}

/// Band harmonizer: renames native bands onto `STD_NAMES`
pub struct BandHarmonizer<'e, E: RasterEngine> {
    engine: &'e E,
}

impl<'e, E: RasterEngine> BandHarmonizer<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Harmonize one scene.
    ///
    /// A scene that already carries every canonical band is returned as is.
    pub fn harmonize_scene(&self, scene: &Scene) -> WaterResult<Scene> {
        if STD_NAMES.iter().all(|n| scene.raster.band(n).is_some()) {
            return Ok(scene.clone());
        }

        let map = SensorBandMap::for_sensor(scene.sensor);
        let mut missing: Vec<String> = map
            .native_names()
            .iter()
            .filter(|n| scene.raster.band(n).is_none())
            .map(|n| n.to_string())
            .collect();
        missing.dedup();
        if !missing.is_empty() {
            return Err(WaterError::BandMappingIncomplete {
                product_id: scene.product_id.clone(),
                sensor: scene.sensor,
                missing,
            });
        }

        let raster = self
            .engine
            .select_and_rename(&scene.raster, map.native_names(), &STD_NAMES)?;
        Ok(scene.with_raster(raster))
    }

    /// Harmonize every scene; incomplete scenes are skipped with a warning
    pub fn harmonize_stack(&self, stack: &RasterStack) -> WaterResult<RasterStack> {
        log::debug!("Harmonizing {} scenes onto {:?}", stack.len(), STD_NAMES);
        let mut scenes = Vec::with_capacity(stack.len());
        for scene in &stack.scenes {
            match self.harmonize_scene(scene) {
                Ok(s) => scenes.push(s),
                Err(e @ WaterError::BandMappingIncomplete { .. }) => {
                    log::warn!("Skipping scene: {}", e);
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
    use crate::types::{CoordinateSystem, GeoTransform, Raster};
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn scene_with(sensor: SensorGeneration, bands: &[&str]) -> Scene {
        let mut raster = Raster::new(GeoTransform::north_up(0.0, 2.0, 1.0), (2, 2));
        for (i, b) in bands.iter().enumerate() {
            raster = raster.with_band(b, Array2::from_elem((2, 2), i as f32)).unwrap();
        }
        let t = Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap();
        Scene::new("test", sensor, t, raster)
    }

    #[test]
    fn test_tm_blue_feeds_both_blue_bands() {
        let engine = LocalEngine::new();
        let harmonizer = BandHarmonizer::new(&engine);
        let scene = scene_with(SensorGeneration::Landsat5, &["B1", "B2", "B3", "B4", "B5", "B7"]);
        let out = harmonizer.harmonize_scene(&scene).unwrap();
        assert_eq!(out.raster.bands.len(), 7);
        assert_eq!(out.raster.band("blue2"), out.raster.band("blue"));
        assert_eq!(out.raster.band("swir2"), scene.raster.band("B7"));
    }

    #[test]
    fn test_harmonize_twice_is_noop() {
        let engine = LocalEngine::new();
        let harmonizer = BandHarmonizer::new(&engine);
        let scene = scene_with(SensorGeneration::Landsat8, &OLI_BANDS);
        let once = harmonizer.harmonize_scene(&scene).unwrap();
        let twice = harmonizer.harmonize_scene(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_incomplete_scene_is_skipped() {
        let engine = LocalEngine::new();
        let harmonizer = BandHarmonizer::new(&engine);
        let good = scene_with(SensorGeneration::Landsat8, &OLI_BANDS);
        let bad = scene_with(SensorGeneration::Landsat8, &["B2", "B3"]);
        assert!(matches!(
            harmonizer.harmonize_scene(&bad),
            Err(WaterError::BandMappingIncomplete { .. })
        ));
        let stack = RasterStack::from_scenes(CoordinateSystem::Geographic, vec![good, bad]);
        let out = harmonizer.harmonize_stack(&stack).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_native_lookup() {
        let map = SensorBandMap::for_sensor(SensorGeneration::Landsat7);
        assert_eq!(map.native_for("swir1"), Some("B5"));
        assert_eq!(map.native_for("thermal"), None);
    }
}
