//! End-to-end surface water classification.
//!
//! Per sensor stack: filter by footprint and date, suppress clouds, map bands
//! onto canonical names, remove TM fringes. The cleaned stacks are merged and
//! reduced to a "permanent" and a "temporary" percentile composite; each
//! composite goes through MNDWI/NDVI thresholds and the HAND mask, and the
//! two cleaned water masks are summed into the final class raster.

use crate::core::cloud_score::CloudSuppressor;
use crate::core::combine::{self, elevation_mask};
use crate::core::composite::PercentileCompositor;
use crate::core::defringe::FringeRemover;
use crate::core::engine::RasterEngine;
use crate::core::harmonize::BandHarmonizer;
use crate::core::indices::{IndexEngine, SpectralIndex};
use crate::core::monthly::{MonthlySeries, TemporalDecomposer};
use crate::core::stack_filter::{check_crs, StackFilter};
use crate::types::{
    ClassifiedRaster, Footprint, GridSpec, Mask, Raster, RasterStack, WaterError, WaterResult,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Classification parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationParameters {
    /// First acquisition day considered
    pub date_start: NaiveDate,
    /// Last acquisition day considered (inclusive)
    pub date_end: NaiveDate,
    /// Also classify each calendar month separately
    pub do_monthly: bool,
    /// Percentile for the permanent-water composite
    pub percentile_permanent: f64,
    /// Percentile for the temporary-water composite
    pub percentile_temporary: f64,
    /// MNDWI cut-off (strictly greater is water)
    pub water_index_threshold: f64,
    /// NDVI cut-off (strictly greater is vegetation)
    pub vegetation_index_threshold: f64,
    /// HAND cut-off in metres (strictly greater is excluded)
    pub elevation_threshold: f64,
    /// Cloud score cut-off in [0, 100]; 0 disables cloud suppression
    pub cloud_score_threshold: f64,
    /// Remove scan-mirror fringes from TM scenes
    pub defringe_enabled: bool,
    /// Divisor turning stored band values into 0..1 reflectance
    pub reflectance_scale: f64,
}

impl Default for ClassificationParameters {
    fn default() -> Self {
        Self {
            date_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            date_end: NaiveDate::from_ymd_opt(2000, 12, 31).unwrap_or_default(),
            do_monthly: false,
            percentile_permanent: 40.0,
            percentile_temporary: 8.0,
            water_index_threshold: 0.3,
            vegetation_index_threshold: 0.6,
            elevation_threshold: 50.0,
            cloud_score_threshold: 80.0,
            defringe_enabled: true,
            reflectance_scale: 1.0,
        }
    }
}

impl ClassificationParameters {
    /// Reject out-of-domain values before any pipeline work
    pub fn validate(&self) -> WaterResult<()> {
        if self.date_end < self.date_start {
            return Err(WaterError::InvalidParameter(format!(
                "date_end {} is before date_start {}",
                self.date_end, self.date_start
            )));
        }
        for (name, p) in [
            ("percentile_permanent", self.percentile_permanent),
            ("percentile_temporary", self.percentile_temporary),
        ] {
            if !(0.0..=100.0).contains(&p) {
                return Err(WaterError::InvalidParameter(format!(
                    "{} must be within [0, 100], got {}",
                    name, p
                )));
            }
        }
        for (name, t) in [
            ("water_index_threshold", self.water_index_threshold),
            ("vegetation_index_threshold", self.vegetation_index_threshold),
        ] {
            if !(-1.0..=1.0).contains(&t) {
                return Err(WaterError::InvalidParameter(format!(
                    "{} must be within [-1, 1], got {}",
                    name, t
                )));
            }
        }
        if !self.elevation_threshold.is_finite() || self.elevation_threshold < 0.0 {
            return Err(WaterError::InvalidParameter(format!(
                "elevation_threshold must be a non-negative number, got {}",
                self.elevation_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.cloud_score_threshold) {
            return Err(WaterError::InvalidParameter(format!(
                "cloud_score_threshold must be within [0, 100], got {}",
                self.cloud_score_threshold
            )));
        }
        if !self.reflectance_scale.is_finite() || self.reflectance_scale <= 0.0 {
            return Err(WaterError::InvalidParameter(format!(
                "reflectance_scale must be positive, got {}",
                self.reflectance_scale
            )));
        }
        Ok(())
    }

    pub fn cloud_suppression_enabled(&self) -> bool {
        self.cloud_score_threshold > 0.0
    }
}

/// Everything produced by one classification run
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub composite_permanent: Raster,
    pub composite_temporary: Raster,
    pub mndwi_permanent: Raster,
    pub mndwi_temporary: Raster,
    pub ndvi_permanent: Raster,
    pub ndvi_temporary: Raster,
    pub water_permanent: Mask,
    pub water_temporary: Mask,
    pub vegetation_permanent: Mask,
    pub vegetation_temporary: Mask,
    pub elevation: Mask,
    pub water_permanent_clean: Mask,
    pub water_temporary_clean: Mask,
    pub classified: ClassifiedRaster,
}

/// Pixel counts for run logging
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassificationSummary {
    /// Pixels with a valid composite observation
    pub observed_pixels: usize,
    pub temporary_pixels: usize,
    pub permanent_pixels: usize,
    /// Water pixels (class 1 or 2) over observed pixels
    pub water_fraction: f64,
}

impl ClassificationResult {
    /// True when no pixel had a valid observation
    pub fn is_empty(&self) -> bool {
        !self.composite_permanent.has_valid_pixels() && !self.composite_temporary.has_valid_pixels()
    }

    pub fn summary(&self) -> ClassificationSummary {
        let observed = self.composite_permanent.valid_count();
        let temporary = self.classified.count_class(1);
        let permanent = self.classified.count_class(2);
        let water_fraction = if observed > 0 {
            (temporary + permanent) as f64 / observed as f64
        } else {
            0.0
        };
        ClassificationSummary {
            observed_pixels: observed,
            temporary_pixels: temporary,
            permanent_pixels: permanent,
            water_fraction,
        }
    }
}

/// Full-period result plus the optional monthly series
#[derive(Debug, Clone)]
pub struct ClassificationOutput {
    pub full_period: ClassificationResult,
    pub monthly: Option<MonthlySeries>,
}

/// Surface water classifier
pub struct WaterClassifier<'e, E: RasterEngine> {
    engine: &'e E,
    params: ClassificationParameters,
    grid: Option<GridSpec>,
}

impl<'e, E: RasterEngine> WaterClassifier<'e, E> {
    /// Validates `params` up front
    pub fn new(engine: &'e E, params: ClassificationParameters) -> WaterResult<Self> {
        params.validate()?;
        Ok(Self {
            engine,
            params,
            grid: None,
        })
    }

    /// Fix the output grid instead of taking it from the HAND raster or scenes
    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn params(&self) -> &ClassificationParameters {
        &self.params
    }

    pub fn engine(&self) -> &'e E {
        self.engine
    }

    /// Run the whole pipeline over per-sensor stacks.
    ///
    /// The analysis grid comes from [`with_grid`](Self::with_grid), else the
    /// HAND raster, else the first scene of the input stacks. Scenes that
    /// fall outside the date window still fix the grid; only a call with no
    /// scenes at all, no HAND raster and no explicit grid fails, with
    /// `WaterError::Processing`. That is a caller error, unlike an empty
    /// observation window, which yields an all-invalid result.
    pub fn run(
        &self,
        stacks: &[RasterStack],
        footprint: &Footprint,
        hand: Option<&Raster>,
    ) -> WaterResult<ClassificationOutput> {
        log::info!(
            "Classifying surface water {} .. {} over {} stack(s)",
            self.params.date_start,
            self.params.date_end,
            stacks.len()
        );
        for stack in stacks {
            check_crs(stack, footprint)?;
        }
        let grid = self.resolve_grid(stacks, hand)?;

        let merged = self.preprocess(stacks, footprint)?;
        log::info!("{} scenes after preprocessing", merged.len());

        let elevation = elevation_mask(hand, self.params.elevation_threshold, grid.shape)?;
        let full_period = self.classify_stack(&merged, &grid, footprint, &elevation)?;
        let summary = full_period.summary();
        log::info!(
            "Full period: {} observed, {} temporary, {} permanent ({:.1}% water)",
            summary.observed_pixels,
            summary.temporary_pixels,
            summary.permanent_pixels,
            summary.water_fraction * 100.0
        );

        let monthly = if self.params.do_monthly {
            let decomposer = TemporalDecomposer::new(self);
            Some(decomposer.decompose(&merged, &grid, footprint, &elevation)?)
        } else {
            None
        };

        Ok(ClassificationOutput { full_period, monthly })
    }

    /// Filter, clean and harmonize each stack, then merge them
    pub fn preprocess(&self, stacks: &[RasterStack], footprint: &Footprint) -> WaterResult<RasterStack> {
        let filter = StackFilter::new(self.engine);
        let harmonizer = BandHarmonizer::new(self.engine);
        let cloud = if self.params.cloud_suppression_enabled() {
            Some(CloudSuppressor::new(
                self.engine,
                self.params.cloud_score_threshold,
                self.params.reflectance_scale,
            )?)
        } else {
            log::debug!("Cloud suppression disabled");
            None
        };
        let defringe = if self.params.defringe_enabled {
            Some(FringeRemover::new(self.engine)?)
        } else {
            None
        };

        let mut cleaned = Vec::with_capacity(stacks.len());
        for stack in stacks {
            let mut s = filter.filter(stack, footprint, self.params.date_start, self.params.date_end)?;
            if let Some(cloud) = &cloud {
                s = cloud.suppress_stack(&s)?;
            }
            s = harmonizer.harmonize_stack(&s)?;
            if let Some(defringe) = &defringe {
                s = defringe.defringe_stack(&s)?;
            }
            cleaned.push(s);
        }

        if cleaned.is_empty() {
            return Ok(RasterStack::new(footprint.crs));
        }
        RasterStack::merge(cleaned)
    }

    /// Composites, indices, masks and final classes for one merged stack
    pub fn classify_stack(
        &self,
        stack: &RasterStack,
        grid: &GridSpec,
        footprint: &Footprint,
        elevation: &Mask,
    ) -> WaterResult<ClassificationResult> {
        let compositor = PercentileCompositor::new(self.engine, *grid, *footprint);
        let composite_permanent = compositor.composite(stack, self.params.percentile_permanent)?;
        let composite_temporary = compositor.composite(stack, self.params.percentile_temporary)?;

        let indices = IndexEngine::new(self.engine);
        let mndwi_permanent = indices.compute(&composite_permanent, SpectralIndex::Mndwi)?;
        let mndwi_temporary = indices.compute(&composite_temporary, SpectralIndex::Mndwi)?;
        let ndvi_permanent = indices.compute(&composite_permanent, SpectralIndex::Ndvi)?;
        let ndvi_temporary = indices.compute(&composite_temporary, SpectralIndex::Ndvi)?;

        let water_t = self.params.water_index_threshold;
        let veg_t = self.params.vegetation_index_threshold;
        let water_permanent = indices.threshold(&mndwi_permanent, SpectralIndex::Mndwi, water_t)?;
        let water_temporary = indices.threshold(&mndwi_temporary, SpectralIndex::Mndwi, water_t)?;
        let vegetation_permanent = indices.threshold(&ndvi_permanent, SpectralIndex::Ndvi, veg_t)?;
        let vegetation_temporary = indices.threshold(&ndvi_temporary, SpectralIndex::Ndvi, veg_t)?;

        let water_permanent_clean = combine::clean_water(&water_permanent, &vegetation_permanent, elevation)?;
        let water_temporary_clean = combine::clean_water(&water_temporary, &vegetation_temporary, elevation)?;
        let classified = combine::classify(&water_permanent_clean, &water_temporary_clean, grid.geo_transform)?;

        Ok(ClassificationResult {
            composite_permanent,
            composite_temporary,
            mndwi_permanent,
            mndwi_temporary,
            ndvi_permanent,
            ndvi_temporary,
            water_permanent,
            water_temporary,
            vegetation_permanent,
            vegetation_temporary,
            elevation: elevation.clone(),
            water_permanent_clean,
            water_temporary_clean,
            classified,
        })
    }

    fn resolve_grid(&self, stacks: &[RasterStack], hand: Option<&Raster>) -> WaterResult<GridSpec> {
        if let Some(grid) = self.grid {
            return Ok(grid);
        }
        if let Some(hand) = hand {
            return Ok(hand.grid());
        }
        stacks.iter().find_map(|s| s.grid()).ok_or_else(|| {
            WaterError::Processing(
                "Cannot determine analysis grid: no scenes, no HAND raster and no explicit grid".to_string(),
            )
        })
    }
}
