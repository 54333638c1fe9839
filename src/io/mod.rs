//! Input handling: parameter files, product ids and raster files

pub mod params;
pub mod scene_id;
#[cfg(feature = "gdal")]
pub mod raster_reader;

pub use params::ParameterFile;
pub use scene_id::SceneId;
#[cfg(feature = "gdal")]
pub use raster_reader::RasterReader;
