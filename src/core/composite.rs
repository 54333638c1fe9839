use crate::core::engine::RasterEngine;
use crate::types::{Footprint, GridSpec, Raster, RasterStack, WaterError, WaterResult, STD_NAMES};

/// Percentile compositor over a merged, harmonized stack
pub struct PercentileCompositor<'e, E: RasterEngine> {
    engine: &'e E,
    grid: GridSpec,
    footprint: Footprint,
}

impl<'e, E: RasterEngine> PercentileCompositor<'e, E> {
    /// Composites are produced on `grid` and clipped to `footprint`
    pub fn new(engine: &'e E, grid: GridSpec, footprint: Footprint) -> Self {
        Self {
            engine,
            grid,
            footprint,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Per-pixel p-th percentile of every canonical band.
    ///
    /// Scenes that do not expose all canonical bands are left out with a
    /// warning. Scenes on other grids are sampled by georeference. An empty
    /// stack gives an all-invalid composite.
    pub fn composite(&self, stack: &RasterStack, percentile: f64) -> WaterResult<Raster> {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(WaterError::InvalidParameter(format!(
                "Percentile {} outside [0, 100]",
                percentile
            )));
        }

        let homogeneous = self.homogeneous(stack);
        if homogeneous.is_empty() {
            log::info!("No observations for p{} composite; result is all-invalid", percentile);
        } else {
            log::debug!("Compositing p{} over {} scenes", percentile, homogeneous.len());
        }

        self.engine
            .reduce_percentile(&homogeneous, percentile, &STD_NAMES, &self.grid, &self.footprint)
    }

    fn homogeneous(&self, stack: &RasterStack) -> RasterStack {
        let scenes = stack
            .scenes
            .iter()
            .filter(|s| {
                let missing: Vec<&str> = STD_NAMES
                    .iter()
                    .copied()
                    .filter(|n| s.raster.band(n).is_none())
                    .collect();
                if !missing.is_empty() {
                    log::warn!(
                        "Scene {} lacks canonical bands {:?}; skipped from composite",
                        s.product_id,
                        missing
                    );
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        RasterStack::from_scenes(stack.crs, scenes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::LocalEngine;
    use crate::types::{BoundingBox, CoordinateSystem, GeoTransform, Scene, SensorGeneration};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn grid() -> GridSpec {
        GridSpec::new(GeoTransform::north_up(0.0, 4.0, 1.0), (4, 4))
    }

    fn footprint(bounds: BoundingBox) -> Footprint {
        Footprint::new(CoordinateSystem::Projected { epsg: 32610 }, bounds)
    }

    fn canonical_scene(day: u32, green: f32) -> Scene {
        let g = grid();
        let mut raster = Raster::new(g.geo_transform, g.shape);
        for name in STD_NAMES {
            let v = if name == "green" { green } else { 0.1 };
            raster = raster.with_band(name, Array2::from_elem(g.shape, v)).unwrap();
        }
        let t = Utc.with_ymd_and_hms(2018, 8, day, 0, 0, 0).unwrap();
        Scene::new(&format!("d{}", day), SensorGeneration::Landsat8, t, raster)
    }

    #[test]
    fn test_composite_is_order_independent() {
        let engine = LocalEngine::new();
        let fp = footprint(BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        let compositor = PercentileCompositor::new(&engine, grid(), fp);
        let scenes: Vec<Scene> = (1..=7).map(|d| canonical_scene(d, d as f32 * 0.03)).collect();
        let mut reversed = scenes.clone();
        reversed.reverse();
        reversed.swap(1, 4);

        let crs = CoordinateSystem::Projected { epsg: 32610 };
        let a = compositor.composite(&RasterStack::from_scenes(crs, scenes), 40.0).unwrap();
        let b = compositor.composite(&RasterStack::from_scenes(crs, reversed), 40.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_clipped_to_footprint() {
        let engine = LocalEngine::new();
        // Covers only the left half of the grid.
        let fp = footprint(BoundingBox::new(0.0, 0.0, 2.0, 4.0));
        let compositor = PercentileCompositor::new(&engine, grid(), fp);
        let stack = RasterStack::from_scenes(
            CoordinateSystem::Projected { epsg: 32610 },
            vec![canonical_scene(1, 0.2)],
        );
        let out = compositor.composite(&stack, 50.0).unwrap();
        assert!(out.valid[[0, 0]]);
        assert!(out.valid[[3, 1]]);
        assert!(!out.valid[[0, 2]]);
        assert!(out.band("green").unwrap()[[0, 3]].is_nan());
        assert_relative_eq!(out.band("green").unwrap()[[2, 1]], 0.2);
    }

    #[test]
    fn test_incomplete_scene_left_out() {
        let engine = LocalEngine::new();
        let fp = footprint(BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        let compositor = PercentileCompositor::new(&engine, grid(), fp);
        let mut partial = canonical_scene(2, 5.0);
        partial.raster.bands.remove("swir2");
        let stack = RasterStack::from_scenes(
            CoordinateSystem::Projected { epsg: 32610 },
            vec![canonical_scene(1, 0.2), partial],
        );
        let out = compositor.composite(&stack, 100.0).unwrap();
        assert_relative_eq!(out.band("green").unwrap()[[1, 1]], 0.2);
    }

    #[test]
    fn test_offset_scene_only_contributes_where_it_overlaps() {
        let engine = LocalEngine::new();
        let fp = footprint(BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        let compositor = PercentileCompositor::new(&engine, grid(), fp);
        let mut shifted = canonical_scene(2, 0.1);
        shifted.raster.geo_transform = GeoTransform::north_up(2.0, 4.0, 1.0);
        let stack = RasterStack::from_scenes(
            CoordinateSystem::Projected { epsg: 32610 },
            vec![canonical_scene(1, 0.5), shifted],
        );
        let out = compositor.composite(&stack, 0.0).unwrap();
        let green = out.band("green").unwrap();
        // x = 0.5 and 1.5 are outside the shifted scene
        assert_relative_eq!(green[[0, 0]], 0.5);
        assert_relative_eq!(green[[3, 1]], 0.5);
        assert_relative_eq!(green[[0, 2]], 0.1);
        assert_relative_eq!(green[[2, 3]], 0.1);
    }

    #[test]
    fn test_out_of_range_percentile() {
        let engine = LocalEngine::new();
        let fp = footprint(BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        let compositor = PercentileCompositor::new(&engine, grid(), fp);
        let stack = RasterStack::new(CoordinateSystem::Projected { epsg: 32610 });
        assert!(matches!(
            compositor.composite(&stack, 101.0),
            Err(WaterError::InvalidParameter(_))
        ));
    }
}
