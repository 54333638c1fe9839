use crate::io::scene_id::SceneId;
use crate::core::combine::HAND_BAND;
use crate::types::{CoordinateSystem, GeoTransform, Raster, Scene, WaterError, WaterResult};
use gdal::Dataset;
use ndarray::{Array2, Zip};
use std::path::Path;

/// GeoTIFF reader for scenes and HAND rasters
pub struct RasterReader;

impl RasterReader {
    /// Read the first `band_names.len()` bands of a file, named in order.
    ///
    /// Nodata and non-finite values become NaN; a pixel is valid only when
    /// every band holds a value there.
    pub fn read_raster<P: AsRef<Path>>(
        path: P,
        band_names: &[&str],
    ) -> WaterResult<(Raster, CoordinateSystem)> {
        log::info!("Reading raster from: {}", path.as_ref().display());
        let dataset = Dataset::open(path.as_ref())?;

        let gt = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();
        let count = dataset.raster_count() as usize;
        if band_names.len() > count {
            return Err(WaterError::InvalidFormat(format!(
                "{} has {} bands, {} requested",
                path.as_ref().display(),
                count,
                band_names.len()
            )));
        }
        log::debug!("Raster size: {}x{}, {} bands", width, height, count);

        let crs = match dataset.spatial_ref().and_then(|sr| sr.auth_code()) {
            Ok(4326) => CoordinateSystem::Geographic,
            Ok(code) if code > 0 => CoordinateSystem::Projected { epsg: code as u32 },
            _ => {
                log::warn!("No EPSG code on {}; assuming geographic", path.as_ref().display());
                CoordinateSystem::Geographic
            }
        };

        let mut raster = Raster::new(gt, (height, width));
        for (i, name) in band_names.iter().enumerate() {
            let rasterband = dataset.rasterband(i as isize + 1)?;
            let nodata = rasterband.no_data_value().map(|v| v as f32);
            let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            let mut data = Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| WaterError::Processing(format!("Failed to reshape band {}: {}", name, e)))?;
            if let Some(nd) = nodata {
                data.mapv_inplace(|v| if v == nd { f32::NAN } else { v });
            }
            Zip::from(&mut raster.valid)
                .and(&data)
                .for_each(|ok, &v| *ok = *ok && v.is_finite());
            raster = raster.with_band(name, data)?;
        }

        log::debug!("{} valid pixels", raster.valid_count());
        Ok((raster, crs))
    }

    /// Read a scene whose file stem is its product id, e.g.
    /// `LC08_L1TP_044034_20180815_20180828_01_T1.tif`
    pub fn read_scene<P: AsRef<Path>>(path: P, band_names: &[&str]) -> WaterResult<(Scene, CoordinateSystem)> {
        let stem = path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| WaterError::InvalidFormat(format!("No file name in {}", path.as_ref().display())))?;
        let id = SceneId::parse(stem)?;
        let (raster, crs) = Self::read_raster(path.as_ref(), band_names)?;
        Ok((id.into_scene(raster), crs))
    }

    /// Single-band height-above-nearest-drainage raster
    pub fn read_hand<P: AsRef<Path>>(path: P) -> WaterResult<(Raster, CoordinateSystem)> {
        Self::read_raster(path, &[HAND_BAND])
    }
}
