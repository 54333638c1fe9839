//! Raster execution engine seam.
//!
//! Pipeline stages describe *what* to compute through [`RasterEngine`]; the
//! engine decides *how*. An implementation may evaluate eagerly, defer work
//! until a result is inspected, or fan tiles out to remote workers. The only
//! contract is that every call either returns a complete value or an error,
//! so a failure (including cancellation inside the engine) never leaves a
//! half-built result behind.

use crate::maybe_rayon::*;
use crate::types::{
    BandImage, Footprint, GridSpec, Raster, RasterStack, ValidityMask, WaterError, WaterResult,
};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Zip};
use num_traits::Float;
use std::collections::BTreeMap;

/// Per-pixel binary operator used by [`RasterEngine::band_math`]
pub type PixelOp<'a> = &'a (dyn Fn(f32, f32) -> f32 + Sync);

/// Square neighbourhood kernel with unit weights.
///
/// Each kernel row is a contiguous run of unit cells, stored as inclusive
/// column offsets relative to the centre (`None` for an empty row).
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    radius: usize,
    row_spans: Vec<Option<(isize, isize)>>,
}

impl Kernel {
    /// Build a kernel symmetric about its centre column from per-row half widths.
    pub fn from_half_widths(half_widths: &[usize]) -> WaterResult<Self> {
        if half_widths.len() % 2 == 0 {
            return Err(WaterError::Processing(
                "Kernel must have an odd number of rows".to_string(),
            ));
        }
        let radius = half_widths.len() / 2;
        if let Some(&w) = half_widths.iter().find(|&&w| w > radius) {
            return Err(WaterError::Processing(format!(
                "Kernel half width {} exceeds radius {}",
                w, radius
            )));
        }
        let row_spans = half_widths
            .iter()
            .map(|&w| Some((-(w as isize), w as isize)))
            .collect();
        Ok(Self { radius, row_spans })
    }

    pub fn size(&self) -> usize {
        2 * self.radius + 1
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Number of unit cells
    pub fn cell_count(&self) -> usize {
        self.row_spans
            .iter()
            .flatten()
            .map(|(lo, hi)| (hi - lo + 1) as usize)
            .sum()
    }

    pub fn row_spans(&self) -> &[Option<(isize, isize)>] {
        &self.row_spans
    }
}

/// Abstract operations the classification core consumes.
///
/// Implementations must be `Send + Sync`; the monthly decomposition calls a
/// shared engine from several threads at once.
pub trait RasterEngine: Send + Sync {
    /// Scenes whose bounds intersect the footprint
    fn filter_bounds(&self, stack: &RasterStack, footprint: &Footprint) -> WaterResult<RasterStack>;

    /// Scenes acquired in the half-open interval `[start, end)`
    fn filter_date(
        &self,
        stack: &RasterStack,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WaterResult<RasterStack>;

    /// Copy `source[i]` into a band named `target[i]`, dropping everything else.
    /// A source band may be selected more than once.
    fn select_and_rename(&self, raster: &Raster, source: &[&str], target: &[&str]) -> WaterResult<Raster>;

    /// Kernel-weighted sum of a boolean grid; cells outside the grid count as 0
    fn reduce_neighborhood(&self, mask: &ValidityMask, kernel: &Kernel) -> WaterResult<Array2<f32>>;

    /// Per-pixel, per-band percentile over every valid observation in the stack,
    /// on `grid`, restricted to pixel centres inside `footprint`.
    ///
    /// Scenes are placed by georeference, not by array position: each grid
    /// pixel takes the scene pixel containing its centre, and grid pixels a
    /// scene does not cover get no observation from it.
    fn reduce_percentile(
        &self,
        stack: &RasterStack,
        percentile: f64,
        bands: &[&str],
        grid: &GridSpec,
        footprint: &Footprint,
    ) -> WaterResult<Raster>;

    /// Per-pixel arithmetic over two bands of equal shape
    fn band_math(&self, a: &BandImage, b: &BandImage, op: PixelOp<'_>) -> WaterResult<BandImage>;

    /// Intersect a raster's validity with another mask
    fn mask(&self, raster: &Raster, validity: &ValidityMask) -> WaterResult<Raster>;
}

/// In-memory engine backed by ndarray.
///
/// Evaluates eagerly; row-parallel through rayon when the `parallel`
/// feature is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEngine;

impl LocalEngine {
    pub fn new() -> Self {
        Self
    }
}

impl RasterEngine for LocalEngine {
    fn filter_bounds(&self, stack: &RasterStack, footprint: &Footprint) -> WaterResult<RasterStack> {
        let scenes = stack
            .scenes
            .iter()
            .filter(|s| s.raster.bounds().intersects(&footprint.bounds))
            .cloned()
            .collect();
        Ok(RasterStack::from_scenes(stack.crs, scenes))
    }

    fn filter_date(
        &self,
        stack: &RasterStack,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WaterResult<RasterStack> {
        let scenes = stack
            .scenes
            .iter()
            .filter(|s| s.acquired >= start && s.acquired < end)
            .cloned()
            .collect();
        Ok(RasterStack::from_scenes(stack.crs, scenes))
    }

    fn select_and_rename(&self, raster: &Raster, source: &[&str], target: &[&str]) -> WaterResult<Raster> {
        if source.len() != target.len() {
            return Err(WaterError::Engine(format!(
                "select_and_rename got {} source names and {} target names",
                source.len(),
                target.len()
            )));
        }
        let mut bands = BTreeMap::new();
        for (&src, &dst) in source.iter().zip(target) {
            let data = raster.band(src).ok_or_else(|| {
                WaterError::InvalidFormat(format!("Band '{}' not present in raster", src))
            })?;
            bands.insert(dst.to_string(), data.clone());
        }
        Ok(Raster {
            geo_transform: raster.geo_transform,
            bands,
            valid: raster.valid.clone(),
        })
    }

    fn reduce_neighborhood(&self, mask: &ValidityMask, kernel: &Kernel) -> WaterResult<Array2<f32>> {
        let (rows, cols) = mask.dim();
        let radius = kernel.radius() as isize;

        // Row-wise prefix sums make each kernel row an O(1) lookup.
        let mut prefix = Array2::<u32>::zeros((rows, cols + 1));
        for r in 0..rows {
            let mut acc = 0u32;
            for c in 0..cols {
                if mask[[r, c]] {
                    acc += 1;
                }
                prefix[[r, c + 1]] = acc;
            }
        }

        let spans = kernel.row_spans();
        let data: Vec<f32> = (0..rows)
            .into_par_iter()
            .flat_map(|r| {
                let mut row_out = vec![0.0f32; cols];
                for (c, out) in row_out.iter_mut().enumerate() {
                    let mut sum = 0u32;
                    for (k, span) in spans.iter().enumerate() {
                        let Some((lo, hi)) = span else { continue };
                        let rr = r as isize + k as isize - radius;
                        if rr < 0 || rr >= rows as isize {
                            continue;
                        }
                        let c0 = (c as isize + lo).max(0);
                        let c1 = (c as isize + hi).min(cols as isize - 1);
                        if c0 > c1 {
                            continue;
                        }
                        let rr = rr as usize;
                        sum += prefix[[rr, c1 as usize + 1]] - prefix[[rr, c0 as usize]];
                    }
                    *out = sum as f32;
                }
                row_out
            })
            .collect();

        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| WaterError::Engine(format!("Failed to reshape neighbourhood sum: {}", e)))
    }

    fn reduce_percentile(
        &self,
        stack: &RasterStack,
        percentile: f64,
        bands: &[&str],
        grid: &GridSpec,
        footprint: &Footprint,
    ) -> WaterResult<Raster> {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(WaterError::InvalidParameter(format!(
                "Percentile {} outside [0, 100]",
                percentile
            )));
        }
        let (rows, cols) = grid.shape;
        let inside = grid.inside(&footprint.bounds);
        let grid_bounds = grid.bounds();

        // Scenes on the analysis grid are read in place; the rest are
        // sampled at each grid pixel centre.
        let placed: Vec<(&Raster, Option<SceneLookup>)> = stack
            .scenes
            .iter()
            .filter(|s| {
                let overlaps = s.raster.bounds().intersects(&grid_bounds);
                if !overlaps {
                    log::debug!("Scene {} does not overlap the composite grid", s.product_id);
                }
                overlaps
            })
            .map(|s| (&s.raster, scene_lookup(grid, &s.raster)))
            .collect();

        let mut composite = Raster::empty(grid.geo_transform, grid.shape);
        let mut any_valid = Array2::from_elem(grid.shape, false);

        for &band in bands {
            let layers: Vec<(&BandImage, &ValidityMask, Option<&SceneLookup>)> = placed
                .iter()
                .filter_map(|(raster, lookup)| {
                    raster
                        .band(band)
                        .map(|b| (b, &raster.valid, lookup.as_ref()))
                })
                .collect();

            let data: Vec<f32> = (0..rows)
                .into_par_iter()
                .flat_map(|r| {
                    let mut samples = Vec::with_capacity(layers.len());
                    let mut row_out = vec![f32::NAN; cols];
                    for (c, out) in row_out.iter_mut().enumerate() {
                        if !inside[[r, c]] {
                            continue;
                        }
                        samples.clear();
                        for (values, valid, lookup) in &layers {
                            let idx = match lookup {
                                None => (r, c),
                                Some(l) => match l[[r, c]] {
                                    Some(idx) => idx,
                                    None => continue,
                                },
                            };
                            let v = values[idx];
                            if valid[idx] && v.is_finite() {
                                samples.push(v);
                            }
                        }
                        if let Some(p) = percentile_of(&mut samples, percentile) {
                            *out = p;
                        }
                    }
                    row_out
                })
                .collect();

            let image = Array2::from_shape_vec((rows, cols), data)
                .map_err(|e| WaterError::Engine(format!("Failed to reshape composite band: {}", e)))?;
            Zip::from(&mut any_valid)
                .and(&image)
                .for_each(|v, &x| *v = *v || x.is_finite());
            composite.bands.insert(band.to_string(), image);
        }

        composite.valid = any_valid;
        Ok(composite)
    }

    fn band_math(&self, a: &BandImage, b: &BandImage, op: PixelOp<'_>) -> WaterResult<BandImage> {
        if a.dim() != b.dim() {
            return Err(WaterError::Engine(format!(
                "band_math shape mismatch: {:?} vs {:?}",
                a.dim(),
                b.dim()
            )));
        }
        #[cfg(feature = "parallel")]
        let out = Zip::from(a).and(b).par_map_collect(|&x, &y| op(x, y));
        #[cfg(not(feature = "parallel"))]
        let out = Zip::from(a).and(b).map_collect(|&x, &y| op(x, y));
        Ok(out)
    }

    fn mask(&self, raster: &Raster, validity: &ValidityMask) -> WaterResult<Raster> {
        if raster.shape() != validity.dim() {
            return Err(WaterError::Engine(format!(
                "mask shape {:?} does not match raster {:?}",
                validity.dim(),
                raster.shape()
            )));
        }
        let mut masked = raster.clone();
        Zip::from(&mut masked.valid)
            .and(validity)
            .for_each(|v, &keep| *v = *v && keep);
        Ok(masked)
    }
}

/// Scene pixel under each grid pixel centre, `None` where the scene has no data
type SceneLookup = Array2<Option<(usize, usize)>>;

/// `None` when the scene already sits on the grid
fn scene_lookup(grid: &GridSpec, raster: &Raster) -> Option<SceneLookup> {
    if raster.geo_transform == grid.geo_transform && raster.shape() == grid.shape {
        return None;
    }
    let (rows, cols) = raster.shape();
    Some(Array2::from_shape_fn(grid.shape, |(r, c)| {
        let (x, y) = grid.geo_transform.pixel_center(r, c);
        raster.geo_transform.pixel_containing(x, y, rows, cols)
    }))
}

/// Percentile by linear interpolation between closest ranks.
///
/// Sorts `samples` in place; `None` when there are no samples.
pub fn percentile_of<T: Float>(samples: &mut [T], percentile: f64) -> Option<T> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = percentile.clamp(0.0, 100.0) / 100.0 * (samples.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = T::from(rank - lo as f64)?;
    Some(samples[lo] + (samples[hi] - samples[lo]) * frac)
}
