use chrono::{DateTime, Datelike, Utc};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Real-valued band sample (surface reflectance or scaled DN)
pub type BandValue = f32;

/// 2D single-band grid (rows x cols)
pub type BandImage = Array2<BandValue>;

/// Per-pixel validity grid (true = usable observation)
pub type ValidityMask = Array2<bool>;

/// Canonical band names shared by every sensor generation after harmonization
pub const STD_NAMES: [&str; 7] = ["blue2", "blue", "green", "red", "nir", "swir1", "swir2"];

/// Coordinate reference system of a stack or footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (longitude, latitude on WGS84)
    Geographic,
    /// Projected coordinates (e.g., UTM)
    Projected { epsg: u32 },
}

impl std::fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinateSystem::Geographic => write!(f, "EPSG:4326"),
            CoordinateSystem::Projected { epsg } => write!(f, "EPSG:{}", epsg),
        }
    }
}

/// Optical sensor generations with a known band layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorGeneration {
    /// Landsat 4 Thematic Mapper
    Landsat4,
    /// Landsat 5 Thematic Mapper
    Landsat5,
    /// Landsat 7 Enhanced Thematic Mapper Plus
    Landsat7,
    /// Landsat 8 Operational Land Imager
    Landsat8,
}

impl SensorGeneration {
    pub const ALL: [SensorGeneration; 4] = [
        SensorGeneration::Landsat4,
        SensorGeneration::Landsat5,
        SensorGeneration::Landsat7,
        SensorGeneration::Landsat8,
    ];

    /// TM scan mirrors leave fringe artifacts along the scene edges
    pub fn has_scan_fringe(&self) -> bool {
        matches!(self, SensorGeneration::Landsat4 | SensorGeneration::Landsat5)
    }
}

impl std::fmt::Display for SensorGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorGeneration::Landsat4 => write!(f, "LT04"),
            SensorGeneration::Landsat5 => write!(f, "LT05"),
            SensorGeneration::Landsat7 => write!(f, "LE07"),
            SensorGeneration::Landsat8 => write!(f, "LC08"),
        }
    }
}

/// Axis-aligned bounding box in the units of its coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    /// Closed-interval overlap test; touching edges count as intersecting
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Analysis area: a bounding box tagged with its coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub crs: CoordinateSystem,
    pub bounds: BoundingBox,
}

impl Footprint {
    pub fn new(crs: CoordinateSystem, bounds: BoundingBox) -> Self {
        Self { crs, bounds }
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up grid with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// World coordinate of a pixel centre
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Fractional (row, col) of a world coordinate; `None` for a degenerate transform
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < 1e-12 {
            return None;
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Some((row, col))
    }

    /// Pixel of a `rows x cols` grid containing the world coordinate
    pub fn pixel_containing(&self, x: f64, y: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (r, c) = self.world_to_pixel(x, y)?;
        if r < 0.0 || c < 0.0 {
            return None;
        }
        let (r, c) = (r.floor() as usize, c.floor() as usize);
        (r < rows && c < cols).then_some((r, c))
    }

    /// Bounds covered by a grid of the given shape
    pub fn bounds(&self, rows: usize, cols: usize) -> BoundingBox {
        let corners = [(0.0, 0.0), (cols as f64, 0.0), (0.0, rows as f64), (cols as f64, rows as f64)];
        let mut bbox = BoundingBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (c, r) in corners {
            let x = self.top_left_x + c * self.pixel_width + r * self.rotation_x;
            let y = self.top_left_y + c * self.rotation_y + r * self.pixel_height;
            bbox.min_x = bbox.min_x.min(x);
            bbox.max_x = bbox.max_x.max(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }
}

/// Output grid for reductions: transform plus (rows, cols)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub geo_transform: GeoTransform,
    pub shape: (usize, usize),
}

impl GridSpec {
    pub fn new(geo_transform: GeoTransform, shape: (usize, usize)) -> Self {
        Self { geo_transform, shape }
    }

    pub fn bounds(&self) -> BoundingBox {
        self.geo_transform.bounds(self.shape.0, self.shape.1)
    }

    /// Pixel centres that fall inside `bounds`
    pub fn inside(&self, bounds: &BoundingBox) -> ValidityMask {
        Array2::from_shape_fn(self.shape, |(r, c)| {
            let (x, y) = self.geo_transform.pixel_center(r, c);
            bounds.contains(x, y)
        })
    }
}

/// Georeferenced multi-band grid with an explicit validity mask.
///
/// A pixel counts as an observation for a band only when the mask is set
/// and the band value is finite. Every transform yields a new raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub geo_transform: GeoTransform,
    pub bands: BTreeMap<String, BandImage>,
    pub valid: ValidityMask,
}

impl Raster {
    /// Raster with no bands and every pixel valid
    pub fn new(geo_transform: GeoTransform, shape: (usize, usize)) -> Self {
        Self {
            geo_transform,
            bands: BTreeMap::new(),
            valid: Array2::from_elem(shape, true),
        }
    }

    /// Raster with no bands and no valid pixel
    pub fn empty(geo_transform: GeoTransform, shape: (usize, usize)) -> Self {
        Self {
            geo_transform,
            bands: BTreeMap::new(),
            valid: Array2::from_elem(shape, false),
        }
    }

    pub fn with_band(mut self, name: &str, data: BandImage) -> WaterResult<Self> {
        if data.dim() != self.valid.dim() {
            return Err(WaterError::InvalidFormat(format!(
                "Band '{}' has shape {:?}, raster grid is {:?}",
                name,
                data.dim(),
                self.valid.dim()
            )));
        }
        self.bands.insert(name.to_string(), data);
        Ok(self)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.valid.dim()
    }

    pub fn band(&self, name: &str) -> Option<&BandImage> {
        self.bands.get(name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.keys().map(|k| k.as_str()).collect()
    }

    pub fn grid(&self) -> GridSpec {
        GridSpec::new(self.geo_transform, self.shape())
    }

    pub fn bounds(&self) -> BoundingBox {
        let (rows, cols) = self.shape();
        self.geo_transform.bounds(rows, cols)
    }

    /// Per-band validity: mask set and value finite
    pub fn band_validity(&self, name: &str) -> Option<ValidityMask> {
        let band = self.bands.get(name)?;
        let mut out = self.valid.clone();
        Zip::from(&mut out).and(band).for_each(|v, &x| *v = *v && x.is_finite());
        Some(out)
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn has_valid_pixels(&self) -> bool {
        self.valid.iter().any(|&v| v)
    }
}

/// One capture in a stack
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub product_id: String,
    pub sensor: SensorGeneration,
    pub acquired: DateTime<Utc>,
    pub raster: Raster,
}

impl Scene {
    pub fn new(product_id: &str, sensor: SensorGeneration, acquired: DateTime<Utc>, raster: Raster) -> Self {
        Self {
            product_id: product_id.to_string(),
            sensor,
            acquired,
            raster,
        }
    }

    /// Calendar month of capture, 1..=12
    pub fn month(&self) -> u32 {
        self.acquired.month()
    }

    /// Same capture metadata, different pixels
    pub fn with_raster(&self, raster: Raster) -> Self {
        Self {
            product_id: self.product_id.clone(),
            sensor: self.sensor,
            acquired: self.acquired,
            raster,
        }
    }
}

/// Unordered collection of scenes sharing one coordinate system
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStack {
    pub crs: CoordinateSystem,
    pub scenes: Vec<Scene>,
}

impl RasterStack {
    pub fn new(crs: CoordinateSystem) -> Self {
        Self { crs, scenes: Vec::new() }
    }

    pub fn from_scenes(crs: CoordinateSystem, scenes: Vec<Scene>) -> Self {
        Self { crs, scenes }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Grid of the first scene, used as the output grid for reductions
    pub fn grid(&self) -> Option<GridSpec> {
        self.scenes.first().map(|s| s.raster.grid())
    }

    /// Union of several stacks; all must share the same coordinate system
    pub fn merge(stacks: Vec<RasterStack>) -> WaterResult<RasterStack> {
        let mut iter = stacks.into_iter();
        let mut merged = match iter.next() {
            Some(first) => first,
            None => {
                return Err(WaterError::Processing("Cannot merge an empty list of stacks".to_string()))
            }
        };
        for stack in iter {
            if stack.crs != merged.crs {
                return Err(WaterError::CrsMismatch {
                    stack: stack.crs.to_string(),
                    footprint: merged.crs.to_string(),
                });
            }
            merged.scenes.extend(stack.scenes);
        }
        Ok(merged)
    }
}

/// Boolean grid derived from a threshold comparison.
///
/// `source` and `threshold` name the raster band and cut-off it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub source: String,
    pub threshold: f64,
    pub values: Array2<bool>,
    pub valid: ValidityMask,
}

impl Mask {
    /// All-false, all-valid mask (nothing flagged anywhere)
    pub fn none_set(source: &str, shape: (usize, usize)) -> Self {
        Self {
            source: source.to_string(),
            threshold: f64::NAN,
            values: Array2::from_elem(shape, false),
            valid: Array2::from_elem(shape, true),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Valid and set
    pub fn count_set(&self) -> usize {
        self.values
            .iter()
            .zip(self.valid.iter())
            .filter(|(&v, &ok)| v && ok)
            .count()
    }
}

/// Final classification grid: 0 = no water, 1 = temporary, 2 = permanent.
///
/// Pixels with value 0 are never valid.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRaster {
    pub geo_transform: GeoTransform,
    pub values: Array2<u8>,
    pub valid: ValidityMask,
}

impl ClassifiedRaster {
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn count_class(&self, class: u8) -> usize {
        self.values
            .iter()
            .zip(self.valid.iter())
            .filter(|(&v, &ok)| ok && v == class)
            .count()
    }

    pub fn has_valid_pixels(&self) -> bool {
        self.valid.iter().any(|&v| v)
    }
}

/// Error types for surface-water classification
#[derive(Debug, thiserror::Error)]
pub enum WaterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("CRS mismatch: stack is {stack}, footprint is {footprint}")]
    CrsMismatch { stack: String, footprint: String },

    #[error("Scene {product_id} ({sensor}) is missing bands required by its band map: {missing:?}")]
    BandMappingIncomplete {
        product_id: String,
        sensor: SensorGeneration,
        missing: Vec<String>,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Raster engine failure: {0}")]
    Engine(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),
}

/// Result type for classification operations
pub type WaterResult<T> = Result<T, WaterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_to_pixel_inverts_pixel_center() {
        let gt = GeoTransform::north_up(500000.0, 4100000.0, 30.0);
        let (x, y) = gt.pixel_center(7, 3);
        let (r, c) = gt.world_to_pixel(x, y).unwrap();
        assert!((r - 7.5).abs() < 1e-9 && (c - 3.5).abs() < 1e-9);
        assert_eq!(gt.pixel_containing(x, y, 10, 10), Some((7, 3)));
        assert_eq!(gt.pixel_containing(x, y, 5, 10), None);
        assert_eq!(gt.pixel_containing(499990.0, y, 10, 10), None);
    }
}
