use crate::core::classify::{ClassificationResult, WaterClassifier};
use crate::core::engine::RasterEngine;
use crate::maybe_rayon::*;
use crate::types::{Footprint, GridSpec, Mask, RasterStack, WaterError, WaterResult};

/// One classification result per calendar month, January first
#[derive(Debug, Clone)]
pub struct MonthlySeries {
    results: Vec<ClassificationResult>,
}

impl MonthlySeries {
    pub fn new(results: Vec<ClassificationResult>) -> WaterResult<Self> {
        if results.len() != 12 {
            return Err(WaterError::Processing(format!(
                "Monthly series needs 12 results, got {}",
                results.len()
            )));
        }
        Ok(Self { results })
    }

    /// Result for `month` in 1..=12
    pub fn get(&self, month: u32) -> Option<&ClassificationResult> {
        if (1..=12).contains(&month) {
            self.results.get(month as usize - 1)
        } else {
            None
        }
    }

    /// `(month, result)` pairs in calendar order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ClassificationResult)> {
        self.results.iter().enumerate().map(|(i, r)| (i as u32 + 1, r))
    }

    /// Months with at least one valid observation
    pub fn populated_months(&self) -> Vec<u32> {
        self.iter().filter(|(_, r)| !r.is_empty()).map(|(m, _)| m).collect()
    }
}

/// Scenes captured in `month`, any year
pub fn month_subset(stack: &RasterStack, month: u32) -> RasterStack {
    let scenes = stack
        .scenes
        .iter()
        .filter(|s| s.month() == month)
        .cloned()
        .collect();
    RasterStack::from_scenes(stack.crs, scenes)
}

/// Re-runs compositing and classification on each calendar-month subset
pub struct TemporalDecomposer<'c, 'e, E: RasterEngine> {
    classifier: &'c WaterClassifier<'e, E>,
}

impl<'c, 'e, E: RasterEngine> TemporalDecomposer<'c, 'e, E> {
    pub fn new(classifier: &'c WaterClassifier<'e, E>) -> Self {
        Self { classifier }
    }

    /// Twelve independent classifications, evaluated concurrently.
    ///
    /// Empty months yield all-invalid results; any failure fails the whole
    /// series.
    pub fn decompose(
        &self,
        stack: &RasterStack,
        grid: &GridSpec,
        footprint: &Footprint,
        elevation: &Mask,
    ) -> WaterResult<MonthlySeries> {
        log::info!("Monthly decomposition over {} scenes", stack.len());
        let results = (1..=12u32)
            .into_par_iter()
            .map(|month| {
                let subset = month_subset(stack, month);
                if subset.is_empty() {
                    log::info!("Month {:02}: no observations", month);
                } else {
                    log::debug!("Month {:02}: {} scenes", month, subset.len());
                }
                self.classifier.classify_stack(&subset, grid, footprint, elevation)
            })
            .collect::<WaterResult<Vec<_>>>()?;
        MonthlySeries::new(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform, Raster, Scene, SensorGeneration};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_month_subset_ignores_year() {
        let raster = Raster::new(GeoTransform::north_up(0.0, 1.0, 1.0), (1, 1));
        let scenes = vec![
            Scene::new("a", SensorGeneration::Landsat7, Utc.with_ymd_and_hms(2001, 3, 2, 0, 0, 0).unwrap(), raster.clone()),
            Scene::new("b", SensorGeneration::Landsat7, Utc.with_ymd_and_hms(2005, 3, 30, 0, 0, 0).unwrap(), raster.clone()),
            Scene::new("c", SensorGeneration::Landsat7, Utc.with_ymd_and_hms(2005, 4, 1, 0, 0, 0).unwrap(), raster),
        ];
        let stack = RasterStack::from_scenes(CoordinateSystem::Geographic, scenes);
        let march = month_subset(&stack, 3);
        assert_eq!(march.len(), 2);
        assert!(month_subset(&stack, 12).is_empty());
    }
}
