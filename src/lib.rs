//! surfwater: percentile-composite surface water classification
//!
//! Multi-sensor Landsat stacks are filtered, cloud-suppressed, harmonized to a
//! common band set and defringed, then reduced to a permanent and a temporary
//! percentile composite. MNDWI, NDVI and height above nearest drainage turn
//! each composite into a clean water mask; the two masks sum into a class
//! raster with values 1 (temporary water) and 2 (permanent water).

pub mod types;
pub mod io;
pub mod core;

mod maybe_rayon;

// Re-export main types and functions for easier access
pub use types::{
    BandImage, BoundingBox, ClassifiedRaster, CoordinateSystem, Footprint, GeoTransform, GridSpec,
    Mask, Raster, RasterStack, Scene, SensorGeneration, ValidityMask, WaterError, WaterResult,
    STD_NAMES,
};

pub use crate::core::{
    ClassificationOutput, ClassificationParameters, ClassificationResult, LocalEngine,
    MonthlySeries, RasterEngine, WaterClassifier,
};

pub use io::{ParameterFile, SceneId};

#[cfg(feature = "python")]
mod python {
    use crate::core::{ClassificationParameters, LocalEngine, WaterClassifier};
    use crate::types::{
        BoundingBox, CoordinateSystem, Footprint, GeoTransform, Raster, RasterStack, Scene,
        SensorGeneration, WaterError, STD_NAMES,
    };
    use chrono::{NaiveDate, TimeZone, Utc};
    use ndarray::s;
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2, PyReadonlyArray4};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    impl From<WaterError> for PyErr {
        fn from(err: WaterError) -> PyErr {
            match err {
                WaterError::InvalidParameter(msg) => PyValueError::new_err(msg),
                other => PyRuntimeError::new_err(other.to_string()),
            }
        }
    }

    /// Classify a (scenes, 7, rows, cols) reflectance cube already in canonical
    /// band order. `months` gives the acquisition month of each scene.
    ///
    /// Returns the class raster with 0 where no water was found.
    #[pyfunction]
    #[pyo3(signature = (
        scenes,
        months,
        hand = None,
        percentile_permanent = 40.0,
        percentile_temporary = 8.0,
        water_index_threshold = 0.3,
        vegetation_index_threshold = 0.6,
        elevation_threshold = 50.0,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn classify_arrays<'py>(
        py: Python<'py>,
        scenes: PyReadonlyArray4<'py, f32>,
        months: Vec<u32>,
        hand: Option<PyReadonlyArray2<'py, f32>>,
        percentile_permanent: f64,
        percentile_temporary: f64,
        water_index_threshold: f64,
        vegetation_index_threshold: f64,
        elevation_threshold: f64,
    ) -> PyResult<&'py PyArray2<u8>> {
        let cube = scenes.as_array();
        let shape = cube.shape();
        if shape[1] != STD_NAMES.len() {
            return Err(PyValueError::new_err(format!(
                "Expected {} bands on axis 1, got {}",
                STD_NAMES.len(),
                shape[1]
            )));
        }
        if months.len() != shape[0] {
            return Err(PyValueError::new_err(format!(
                "{} months given for {} scenes",
                months.len(),
                shape[0]
            )));
        }
        let (rows, cols) = (shape[2], shape[3]);
        let gt = GeoTransform::north_up(0.0, rows as f64, 1.0);

        let mut stack_scenes = Vec::with_capacity(shape[0]);
        for (i, &month) in months.iter().enumerate() {
            let acquired = Utc
                .with_ymd_and_hms(2000, month, 1, 0, 0, 0)
                .single()
                .ok_or_else(|| PyValueError::new_err(format!("Invalid month {}", month)))?;
            let mut raster = Raster::new(gt, (rows, cols));
            for (b, name) in STD_NAMES.iter().enumerate() {
                raster = raster.with_band(name, cube.slice(s![i, b, .., ..]).to_owned())?;
            }
            stack_scenes.push(Scene::new(&format!("scene_{}", i), SensorGeneration::Landsat8, acquired, raster));
        }

        let crs = CoordinateSystem::Geographic;
        let stack = RasterStack::from_scenes(crs, stack_scenes);
        let footprint = Footprint::new(crs, BoundingBox::new(0.0, 0.0, cols as f64, rows as f64));
        let hand_raster = match hand {
            Some(h) => Some(Raster::new(gt, (rows, cols)).with_band("hand", h.as_array().to_owned())?),
            None => None,
        };

        let params = ClassificationParameters {
            date_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            date_end: NaiveDate::from_ymd_opt(2000, 12, 31).unwrap_or_default(),
            percentile_permanent,
            percentile_temporary,
            water_index_threshold,
            vegetation_index_threshold,
            elevation_threshold,
            cloud_score_threshold: 0.0,
            defringe_enabled: false,
            ..Default::default()
        };
        let engine = LocalEngine::new();
        let output = py.allow_threads(|| {
            WaterClassifier::new(&engine, params)?.run(&[stack], &footprint, hand_raster.as_ref())
        })?;
        Ok(output.full_period.classified.values.into_pyarray(py))
    }

    /// Default classification parameters as a dict-like list of pairs
    #[pyfunction]
    fn default_parameters() -> Vec<(String, f64)> {
        let p = ClassificationParameters::default();
        vec![
            ("percentile_permanent".to_string(), p.percentile_permanent),
            ("percentile_temporary".to_string(), p.percentile_temporary),
            ("water_index_threshold".to_string(), p.water_index_threshold),
            ("vegetation_index_threshold".to_string(), p.vegetation_index_threshold),
            ("elevation_threshold".to_string(), p.elevation_threshold),
            ("cloud_score_threshold".to_string(), p.cloud_score_threshold),
            ("reflectance_scale".to_string(), p.reflectance_scale),
        ]
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(classify_arrays, m)?)?;
        m.add_function(wrap_pyfunction!(default_parameters, m)?)?;
        Ok(())
    }
}
