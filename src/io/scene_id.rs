//! Landsat product identifier parsing.
//!
//! Two naming schemes are in circulation:
//!
//! * Collection ids, e.g. `LC08_L1TP_044034_20180815_20180828_01_T1`
//! * Pre-collection scene ids, e.g. `LT50440341990167XXX01`, where the date
//!   is a year plus day-of-year

use crate::types::{Raster, Scene, SensorGeneration, WaterError, WaterResult};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

const COLLECTION_PATTERN: &str =
    r"^(L[COTE]0[4578])_[A-Z0-9]{4}_(\d{3})(\d{3})_(\d{8})_\d{8}_\d{2}_[A-Z0-9]{2}$";
const PRE_COLLECTION_PATTERN: &str = r"^L([COTE])([4578])(\d{3})(\d{3})(\d{4})(\d{3})[A-Z]{3}\d{2}$";

/// Sensor, WRS-2 location and acquisition day encoded in a product id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneId {
    pub product_id: String,
    pub sensor: SensorGeneration,
    pub path: u16,
    pub row: u16,
    pub acquired: NaiveDate,
}

impl SceneId {
    pub fn parse(product_id: &str) -> WaterResult<Self> {
        let id = product_id.trim();
        let collection = Regex::new(COLLECTION_PATTERN)
            .map_err(|e| WaterError::Processing(format!("Invalid product id pattern: {}", e)))?;
        if let Some(caps) = collection.captures(id) {
            let sensor = sensor_from_prefix(&caps[1], id)?;
            let acquired = NaiveDate::parse_from_str(&caps[4], "%Y%m%d")
                .map_err(|e| invalid(id, &format!("bad acquisition date: {}", e)))?;
            return Ok(Self {
                product_id: id.to_string(),
                sensor,
                path: parse_number(&caps[2], id)?,
                row: parse_number(&caps[3], id)?,
                acquired,
            });
        }

        let pre = Regex::new(PRE_COLLECTION_PATTERN)
            .map_err(|e| WaterError::Processing(format!("Invalid scene id pattern: {}", e)))?;
        if let Some(caps) = pre.captures(id) {
            let prefix = format!("L{}0{}", &caps[1], &caps[2]);
            let sensor = sensor_from_prefix(&prefix, id)?;
            let year: i32 = parse_number(&caps[5], id)?;
            let doy: u32 = parse_number(&caps[6], id)?;
            let acquired = NaiveDate::from_yo_opt(year, doy)
                .ok_or_else(|| invalid(id, &format!("day {} does not exist in {}", doy, year)))?;
            return Ok(Self {
                product_id: id.to_string(),
                sensor,
                path: parse_number(&caps[3], id)?,
                row: parse_number(&caps[4], id)?,
                acquired,
            });
        }

        Err(invalid(id, "not a Landsat collection or pre-collection id"))
    }

    /// Acquisition day at 00:00 UTC
    pub fn acquired_utc(&self) -> DateTime<Utc> {
        self.acquired.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Wrap `raster` as a scene carrying this id's metadata
    pub fn into_scene(self, raster: Raster) -> Scene {
        let acquired = self.acquired_utc();
        Scene::new(&self.product_id, self.sensor, acquired, raster)
    }
}

fn sensor_from_prefix(prefix: &str, id: &str) -> WaterResult<SensorGeneration> {
    match prefix {
        "LT04" => Ok(SensorGeneration::Landsat4),
        "LT05" => Ok(SensorGeneration::Landsat5),
        "LE07" => Ok(SensorGeneration::Landsat7),
        "LC08" | "LO08" => Ok(SensorGeneration::Landsat8),
        other => Err(invalid(id, &format!("unsupported sensor prefix {}", other))),
    }
}

fn parse_number<T: std::str::FromStr>(digits: &str, id: &str) -> WaterResult<T> {
    digits
        .parse()
        .map_err(|_| invalid(id, &format!("'{}' is not a number", digits)))
}

fn invalid(id: &str, reason: &str) -> WaterError {
    WaterError::InvalidFormat(format!("Product id '{}': {}", id, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use chrono::Datelike;

    #[test]
    fn test_collection_id() {
        let id = SceneId::parse("LC08_L1TP_044034_20180815_20180828_01_T1").unwrap();
        assert_eq!(id.sensor, SensorGeneration::Landsat8);
        assert_eq!(id.path, 44);
        assert_eq!(id.row, 34);
        assert_eq!(id.acquired, NaiveDate::from_ymd_opt(2018, 8, 15).unwrap());

        let tm = SceneId::parse("LT05_L1TP_044034_19950612_20160926_01_T1").unwrap();
        assert_eq!(tm.sensor, SensorGeneration::Landsat5);
        assert!(tm.sensor.has_scan_fringe());
        assert_eq!(SceneId::parse("LE07_L1TP_044034_20030101_20160926_01_T1").unwrap().sensor, SensorGeneration::Landsat7);
    }

    #[test]
    fn test_pre_collection_id() {
        let id = SceneId::parse("LT50440341990167XXX01").unwrap();
        assert_eq!(id.sensor, SensorGeneration::Landsat5);
        assert_eq!(id.acquired, NaiveDate::from_ymd_opt(1990, 6, 16).unwrap());

        let l4 = SceneId::parse("LT40440341988001AAA02").unwrap();
        assert_eq!(l4.sensor, SensorGeneration::Landsat4);
        assert_eq!(l4.acquired.ordinal(), 1);
    }

    #[test]
    fn test_rejects_unknown_ids() {
        for bad in [
            "S2A_MSIL1C_20180815T184921_N0206_R113_T10SEG_20180815T221254",
            "LC09_L1TP_044034_20220101_20220102_02_T1",
            "LT50440341990367XXX01",
            "",
        ] {
            assert!(matches!(SceneId::parse(bad), Err(WaterError::InvalidFormat(_))), "{}", bad);
        }
    }

    #[test]
    fn test_into_scene() {
        let raster = Raster::new(GeoTransform::north_up(0.0, 1.0, 1.0), (1, 1));
        let scene = SceneId::parse("LE07_L1TP_044034_20030101_20160926_01_T1")
            .unwrap()
            .into_scene(raster);
        assert_eq!(scene.sensor, SensorGeneration::Landsat7);
        assert_eq!(scene.month(), 1);
        assert_eq!(scene.acquired.year(), 2003);
    }
}
