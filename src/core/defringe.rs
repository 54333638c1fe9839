//! Fringe removal for Thematic Mapper scenes.
//!
//! The TM scan mirrors of Landsat 4 and 5 leave thin striped "fringes" of
//! spurious values along scene edges. Those pixels have few valid
//! neighbours, so counting valid cells in a wide fixed kernel and keeping
//! only well-surrounded pixels trims them away.

use crate::core::engine::{Kernel, RasterEngine};
use crate::types::{RasterStack, Scene, WaterResult};

/// Kernel edge length in pixels
pub const FRINGE_KERNEL_SIZE: usize = 41;

/// Unit cells in the fringe kernel
pub const FRINGE_KERNEL_CELLS: usize = 1481;

/// Minimum number of valid neighbours for a pixel to survive
pub const FRINGE_COUNT_THRESHOLD: f32 = 279.0;

/// Half width of each kernel row, top to bottom (41 rows, radius 20).
///
/// This is a chosen approximation, not a reproduction of a published kernel:
/// full-width core rows taper into clipped corners, and the taper skips half
/// width 15 so the octagon holds exactly 1,481 cells.
const FRINGE_KERNEL_HALF_WIDTHS: [usize; FRINGE_KERNEL_SIZE] = [
    10, 11, 12, 13, 14, 16, 17, 18, 19, 20, //
    20, 20, 20, 20, 20, 20, 20, 20, 20, 20, //
    20, //
    20, 20, 20, 20, 20, 20, 20, 20, 20, 20, //
    20, 19, 18, 17, 16, 14, 13, 12, 11, 10,
];

/// The fixed 41x41 fringe kernel
pub fn fringe_kernel() -> WaterResult<Kernel> {
    Kernel::from_half_widths(&FRINGE_KERNEL_HALF_WIDTHS)
}

/// Removes scan-mirror fringe pixels from affected sensor generations
pub struct FringeRemover<'e, E: RasterEngine> {
    engine: &'e E,
    kernel: Kernel,
}

impl<'e, E: RasterEngine> FringeRemover<'e, E> {
    pub fn new(engine: &'e E) -> WaterResult<Self> {
        Ok(Self {
            engine,
            kernel: fringe_kernel()?,
        })
    }

    /// Mask fringe pixels in one scene; other sensors pass through unchanged
    pub fn defringe_scene(&self, scene: &Scene) -> WaterResult<Scene> {
        if !scene.sensor.has_scan_fringe() {
            return Ok(scene.clone());
        }
        let counts = self.engine.reduce_neighborhood(&scene.raster.valid, &self.kernel)?;
        let keep = counts.mapv(|n| n >= FRINGE_COUNT_THRESHOLD);
        let raster = self.engine.mask(&scene.raster, &keep)?;

        log::debug!(
            "Defringe {}: {} -> {} valid pixels",
            scene.product_id,
            scene.raster.valid_count(),
            raster.valid_count()
        );
        Ok(scene.with_raster(raster))
    }

    pub fn defringe_stack(&self, stack: &RasterStack) -> WaterResult<RasterStack> {
        let scenes = stack
            .scenes
            .iter()
            .map(|s| self.defringe_scene(s))
            .collect::<WaterResult<Vec<_>>>()?;
        Ok(RasterStack::from_scenes(stack.crs, scenes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::LocalEngine;
    use crate::types::{GeoTransform, Raster, SensorGeneration};
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn scene(sensor: SensorGeneration, shape: (usize, usize)) -> Scene {
        let raster = Raster::new(GeoTransform::north_up(0.0, 0.0, 30.0), shape)
            .with_band("B1", Array2::from_elem(shape, 0.1))
            .unwrap();
        let t = Utc.with_ymd_and_hms(1995, 7, 14, 0, 0, 0).unwrap();
        Scene::new("fringe", sensor, t, raster)
    }

    #[test]
    fn test_kernel_shape() {
        let k = fringe_kernel().unwrap();
        assert_eq!(k.size(), FRINGE_KERNEL_SIZE);
        assert_eq!(k.cell_count(), FRINGE_KERNEL_CELLS);
        let halves: Vec<usize> = FRINGE_KERNEL_HALF_WIDTHS.iter().copied().rev().collect();
        assert_eq!(halves, FRINGE_KERNEL_HALF_WIDTHS.to_vec());
    }

    #[test]
    fn test_isolated_strip_is_removed() {
        let engine = LocalEngine::new();
        let remover = FringeRemover::new(&engine).unwrap();
        let mut s = scene(SensorGeneration::Landsat5, (60, 60));
        s.raster.valid.fill(false);
        // A 3-pixel-wide strip never collects 279 neighbours.
        for r in 0..60 {
            for c in 0..3 {
                s.raster.valid[[r, c]] = true;
            }
        }
        let out = remover.defringe_scene(&s).unwrap();
        assert_eq!(out.raster.valid_count(), 0);
    }

    #[test]
    fn test_interior_survives() {
        let engine = LocalEngine::new();
        let remover = FringeRemover::new(&engine).unwrap();
        let s = scene(SensorGeneration::Landsat4, (60, 60));
        let out = remover.defringe_scene(&s).unwrap();
        assert!(out.raster.valid[[30, 30]]);
        // Corner pixels see roughly a quarter of the kernel.
        assert!(out.raster.valid[[0, 0]]);
    }

    #[test]
    fn test_other_sensors_untouched() {
        let engine = LocalEngine::new();
        let remover = FringeRemover::new(&engine).unwrap();
        let s = scene(SensorGeneration::Landsat8, (1, 1));
        let out = remover.defringe_scene(&s).unwrap();
        assert_eq!(out, s);
    }
}
