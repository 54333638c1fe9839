//! Spectral indices and threshold masks.
//!
//! MNDWI (Xu, 2006) picks out open water, NDVI flags vegetated pixels that
//! would otherwise pass the water test. Both are normalized differences in
//! [-1, 1].

use crate::core::engine::RasterEngine;
use crate::types::{BandImage, Mask, Raster, WaterError, WaterResult};
use ndarray::Zip;

pub const MNDWI: &str = "mndwi";
pub const NDVI: &str = "ndvi";

/// Supported spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectralIndex {
    /// Modified Normalized Difference Water Index: (green - swir1) / (green + swir1)
    Mndwi,
    /// Normalized Difference Vegetation Index: (nir - red) / (nir + red)
    Ndvi,
}

impl SpectralIndex {
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Mndwi => MNDWI,
            SpectralIndex::Ndvi => NDVI,
        }
    }

    /// (positive, negative) band pair
    pub fn bands(&self) -> (&'static str, &'static str) {
        match self {
            SpectralIndex::Mndwi => ("green", "swir1"),
            SpectralIndex::Ndvi => ("nir", "red"),
        }
    }
}

/// `(a - b) / (a + b)`; zero or non-finite denominators give NaN
pub fn normalized_difference(a: f32, b: f32) -> f32 {
    let sum = a + b;
    if !sum.is_finite() || sum.abs() < 1e-10 {
        return f32::NAN;
    }
    (a - b) / sum
}

/// Computes index rasters and threshold masks from a composite
pub struct IndexEngine<'e, E: RasterEngine> {
    engine: &'e E,
}

impl<'e, E: RasterEngine> IndexEngine<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Single-band raster named after the index.
    ///
    /// Validity follows the composite; pixels where the index is undefined
    /// are also invalid.
    pub fn compute(&self, composite: &Raster, index: SpectralIndex) -> WaterResult<Raster> {
        let (pos, neg) = index.bands();
        let a = band(composite, pos)?;
        let b = band(composite, neg)?;
        let values = self.engine.band_math(a, b, &normalized_difference)?;

        let mut valid = composite.valid.clone();
        Zip::from(&mut valid)
            .and(&values)
            .for_each(|v, &x| *v = *v && x.is_finite());

        Ok(Raster {
            geo_transform: composite.geo_transform,
            bands: [(index.name().to_string(), values)].into_iter().collect(),
            valid,
        })
    }

    /// Strict `value > threshold` mask of a single-band index raster.
    /// A value equal to the threshold is not flagged.
    pub fn threshold(&self, index_raster: &Raster, index: SpectralIndex, threshold: f64) -> WaterResult<Mask> {
        let values = band(index_raster, index.name())?;
        let t = threshold as f32;
        Ok(Mask {
            source: index.name().to_string(),
            threshold,
            values: values.mapv(|x| x > t),
            valid: index_raster.valid.clone(),
        })
    }
}

fn band<'r>(raster: &'r Raster, name: &str) -> WaterResult<&'r BandImage> {
    raster
        .band(name)
        .ok_or_else(|| WaterError::InvalidFormat(format!("Composite has no '{}' band", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::LocalEngine;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn composite(green: f32, swir1: f32, nir: f32, red: f32) -> Raster {
        Raster::new(GeoTransform::north_up(0.0, 1.0, 1.0), (1, 1))
            .with_band("green", arr2(&[[green]]))
            .unwrap()
            .with_band("swir1", arr2(&[[swir1]]))
            .unwrap()
            .with_band("nir", arr2(&[[nir]]))
            .unwrap()
            .with_band("red", arr2(&[[red]]))
            .unwrap()
    }

    #[test]
    fn test_mndwi_value() {
        let engine = LocalEngine::new();
        let idx = IndexEngine::new(&engine);
        let out = idx.compute(&composite(50.0, 10.0, 1.0, 1.0), SpectralIndex::Mndwi).unwrap();
        assert_relative_eq!(out.band(MNDWI).unwrap()[[0, 0]], 40.0 / 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_threshold_is_strict() {
        let engine = LocalEngine::new();
        let idx = IndexEngine::new(&engine);
        // (0.6 - 0.2) / 0.8 = 0.5 exactly in f32
        let raster = idx.compute(&composite(0.6, 0.2, 0.75, 0.25), SpectralIndex::Mndwi).unwrap();
        let value = raster.band(MNDWI).unwrap()[[0, 0]];
        let at = idx.threshold(&raster, SpectralIndex::Mndwi, value as f64).unwrap();
        assert!(!at.values[[0, 0]]);
        let below = idx.threshold(&raster, SpectralIndex::Mndwi, value as f64 - 1e-3).unwrap();
        assert!(below.values[[0, 0]]);
    }

    #[test]
    fn test_zero_sum_is_invalid() {
        let engine = LocalEngine::new();
        let idx = IndexEngine::new(&engine);
        let out = idx.compute(&composite(0.0, 0.0, 0.3, 0.1), SpectralIndex::Mndwi).unwrap();
        assert!(!out.valid[[0, 0]]);
        let ndvi = idx.compute(&composite(0.0, 0.0, 0.3, 0.1), SpectralIndex::Ndvi).unwrap();
        assert!(ndvi.valid[[0, 0]]);
        assert_relative_eq!(ndvi.band(NDVI).unwrap()[[0, 0]], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_band() {
        let engine = LocalEngine::new();
        let idx = IndexEngine::new(&engine);
        let raster = Raster::new(GeoTransform::north_up(0.0, 1.0, 1.0), (1, 1));
        assert!(idx.compute(&raster, SpectralIndex::Ndvi).is_err());
    }
}
