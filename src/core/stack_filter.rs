use crate::core::engine::RasterEngine;
use crate::types::{Footprint, RasterStack, WaterError, WaterResult};
use chrono::{Duration, NaiveDate, TimeZone, Utc};

/// Selects scenes by spatial footprint and inclusive date range
pub struct StackFilter<'e, E: RasterEngine> {
    engine: &'e E,
}

impl<'e, E: RasterEngine> StackFilter<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Scenes intersecting `footprint` and acquired on any day in `[start, end]`.
    ///
    /// The end date is inclusive: the upper bound handed to the engine is the
    /// midnight after `end`.
    pub fn filter(
        &self,
        stack: &RasterStack,
        footprint: &Footprint,
        start: NaiveDate,
        end: NaiveDate,
    ) -> WaterResult<RasterStack> {
        check_crs(stack, footprint)?;

        let lower = Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN));
        let upper = Utc.from_utc_datetime(&(end + Duration::days(1)).and_time(chrono::NaiveTime::MIN));

        let in_bounds = self.engine.filter_bounds(stack, footprint)?;
        let in_range = self.engine.filter_date(&in_bounds, lower, upper)?;

        log::debug!(
            "Stack filter kept {} of {} scenes ({} in bounds) for {} .. {}",
            in_range.len(),
            stack.len(),
            in_bounds.len(),
            start,
            end
        );
        Ok(in_range)
    }
}

/// Stack and footprint must share a coordinate system
pub fn check_crs(stack: &RasterStack, footprint: &Footprint) -> WaterResult<()> {
    if stack.crs != footprint.crs {
        return Err(WaterError::CrsMismatch {
            stack: stack.crs.to_string(),
            footprint: footprint.crs.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::LocalEngine;
    use crate::types::{BoundingBox, CoordinateSystem, GeoTransform, Raster, Scene, SensorGeneration};
    use chrono::DateTime;

    fn scene_at(x0: f64, acquired: DateTime<Utc>) -> Scene {
        let raster = Raster::new(GeoTransform::north_up(x0, 10.0, 1.0), (10, 10));
        Scene::new("s", SensorGeneration::Landsat8, acquired, raster)
    }

    fn footprint() -> Footprint {
        Footprint::new(
            CoordinateSystem::Projected { epsg: 32633 },
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        )
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let engine = LocalEngine::new();
        let last_evening = Utc.with_ymd_and_hms(2020, 3, 31, 23, 59, 0).unwrap();
        let next_morning = Utc.with_ymd_and_hms(2020, 4, 1, 0, 0, 0).unwrap();
        let first = Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap();
        let stack = RasterStack::from_scenes(
            CoordinateSystem::Projected { epsg: 32633 },
            vec![scene_at(0.0, first), scene_at(0.0, last_evening), scene_at(0.0, next_morning)],
        );
        let out = StackFilter::new(&engine)
            .filter(
                &stack,
                &footprint(),
                NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2020, 3, 31).unwrap(),
            )
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.scenes.iter().all(|s| s.acquired < next_morning));
    }

    #[test]
    fn test_scenes_outside_footprint_are_dropped() {
        let engine = LocalEngine::new();
        let t = Utc.with_ymd_and_hms(2020, 3, 5, 0, 0, 0).unwrap();
        let stack = RasterStack::from_scenes(
            CoordinateSystem::Projected { epsg: 32633 },
            vec![scene_at(5.0, t), scene_at(500.0, t)],
        );
        let d = NaiveDate::from_ymd_opt(2020, 3, 5).unwrap();
        let out = StackFilter::new(&engine).filter(&stack, &footprint(), d, d).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_crs_mismatch_is_fatal() {
        let engine = LocalEngine::new();
        let stack = RasterStack::new(CoordinateSystem::Geographic);
        let d = NaiveDate::from_ymd_opt(2020, 3, 5).unwrap();
        let err = StackFilter::new(&engine).filter(&stack, &footprint(), d, d).unwrap_err();
        assert!(matches!(err, WaterError::CrsMismatch { .. }));
    }
}
