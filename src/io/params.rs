use crate::core::classify::ClassificationParameters;
use crate::types::{BoundingBox, CoordinateSystem, Footprint, WaterError, WaterResult};
use chrono::NaiveDate;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::Path;

/// Raw `<classification>` document; every element is optional
#[derive(Debug, Default, Deserialize)]
struct ParameterXml {
    #[serde(rename = "dateStart")]
    date_start: Option<String>,
    #[serde(rename = "dateEnd")]
    date_end: Option<String>,
    #[serde(rename = "doMonthly")]
    do_monthly: Option<bool>,
    #[serde(rename = "percentilePermanent")]
    percentile_permanent: Option<f64>,
    #[serde(rename = "percentileTemporary")]
    percentile_temporary: Option<f64>,
    #[serde(rename = "waterIndexThreshold")]
    water_index_threshold: Option<f64>,
    #[serde(rename = "vegetationIndexThreshold")]
    vegetation_index_threshold: Option<f64>,
    #[serde(rename = "elevationThreshold")]
    elevation_threshold: Option<f64>,
    #[serde(rename = "cloudScoreThreshold")]
    cloud_score_threshold: Option<f64>,
    #[serde(rename = "defringe")]
    defringe_enabled: Option<bool>,
    #[serde(rename = "reflectanceScale")]
    reflectance_scale: Option<f64>,
    footprint: Option<FootprintXml>,
}

#[derive(Debug, Deserialize)]
struct FootprintXml {
    epsg: Option<u32>,
    #[serde(rename = "minX")]
    min_x: f64,
    #[serde(rename = "minY")]
    min_y: f64,
    #[serde(rename = "maxX")]
    max_x: f64,
    #[serde(rename = "maxY")]
    max_y: f64,
}

/// Classification run configuration read from XML.
///
/// ```xml
/// <classification>
///   <dateStart>2018-01-01</dateStart>
///   <dateEnd>2018-12-31</dateEnd>
///   <percentilePermanent>40</percentilePermanent>
///   <footprint><epsg>32610</epsg><minX>0</minX><minY>0</minY><maxX>30</maxX><maxY>30</maxY></footprint>
/// </classification>
/// ```
///
/// Elements left out keep their default value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterFile {
    pub parameters: ClassificationParameters,
    pub footprint: Option<Footprint>,
}

impl ParameterFile {
    /// Parse and validate a parameter document
    pub fn from_xml_str(xml: &str) -> WaterResult<Self> {
        let raw: ParameterXml = from_str(xml)
            .map_err(|e| WaterError::XmlParsing(format!("Failed to parse parameter file: {}", e)))?;

        let defaults = ClassificationParameters::default();
        let parameters = ClassificationParameters {
            date_start: match raw.date_start.as_deref() {
                Some(s) => parse_date("dateStart", s)?,
                None => defaults.date_start,
            },
            date_end: match raw.date_end.as_deref() {
                Some(s) => parse_date("dateEnd", s)?,
                None => defaults.date_end,
            },
            do_monthly: raw.do_monthly.unwrap_or(defaults.do_monthly),
            percentile_permanent: raw.percentile_permanent.unwrap_or(defaults.percentile_permanent),
            percentile_temporary: raw.percentile_temporary.unwrap_or(defaults.percentile_temporary),
            water_index_threshold: raw.water_index_threshold.unwrap_or(defaults.water_index_threshold),
            vegetation_index_threshold: raw
                .vegetation_index_threshold
                .unwrap_or(defaults.vegetation_index_threshold),
            elevation_threshold: raw.elevation_threshold.unwrap_or(defaults.elevation_threshold),
            cloud_score_threshold: raw.cloud_score_threshold.unwrap_or(defaults.cloud_score_threshold),
            defringe_enabled: raw.defringe_enabled.unwrap_or(defaults.defringe_enabled),
            reflectance_scale: raw.reflectance_scale.unwrap_or(defaults.reflectance_scale),
        };
        parameters.validate()?;

        let footprint = raw.footprint.map(|f| {
            let crs = match f.epsg {
                Some(epsg) if epsg != 4326 => CoordinateSystem::Projected { epsg },
                _ => CoordinateSystem::Geographic,
            };
            Footprint::new(crs, BoundingBox::new(f.min_x, f.min_y, f.max_x, f.max_y))
        });

        log::debug!("Loaded parameters: {:?}", parameters);
        Ok(Self { parameters, footprint })
    }

    /// Read a parameter file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> WaterResult<Self> {
        let path = path.as_ref();
        log::info!("Reading parameter file {}", path.display());
        let xml = std::fs::read_to_string(path)?;
        Self::from_xml_str(&xml)
    }
}

fn parse_date(element: &str, value: &str) -> WaterResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        WaterError::InvalidParameter(format!("{} '{}' is not an ISO date: {}", element, value, e))
    })
}
