use crate::types::{ClassifiedRaster, GeoTransform, Mask, Raster, WaterError, WaterResult};
use ndarray::{Array2, Zip};

/// Band name expected in a HAND raster
pub const HAND_BAND: &str = "hand";

/// Elevation (HAND) mask: set where height above drainage exceeds the threshold.
///
/// Pixels where HAND is unknown are invalid in the mask. Without a HAND
/// raster the mask flags nothing.
pub fn elevation_mask(hand: Option<&Raster>, threshold: f64, shape: (usize, usize)) -> WaterResult<Mask> {
    let Some(hand) = hand else {
        log::info!("No HAND raster supplied; elevation mask disabled");
        return Ok(Mask::none_set(HAND_BAND, shape));
    };
    if hand.shape() != shape {
        return Err(WaterError::InvalidFormat(format!(
            "HAND raster grid {:?} does not match analysis grid {:?}",
            hand.shape(),
            shape
        )));
    }
    // Single-band rasters are accepted under any band name.
    let values = hand
        .band(HAND_BAND)
        .or_else(|| {
            if hand.bands.len() == 1 {
                hand.bands.values().next()
            } else {
                None
            }
        })
        .ok_or_else(|| WaterError::InvalidFormat(format!("HAND raster has no '{}' band", HAND_BAND)))?;

    let t = threshold as f32;
    let mut valid = hand.valid.clone();
    Zip::from(&mut valid)
        .and(values)
        .for_each(|v, &h| *v = *v && h.is_finite());
    Ok(Mask {
        source: HAND_BAND.to_string(),
        threshold,
        values: values.mapv(|h| h > t),
        valid,
    })
}

/// `water AND NOT vegetation AND NOT elevation`; invalid wherever any input is
pub fn clean_water(water: &Mask, vegetation: &Mask, elevation: &Mask) -> WaterResult<Mask> {
    let shape = water.shape();
    for (name, m) in [("vegetation", vegetation), ("elevation", elevation)] {
        if m.shape() != shape {
            return Err(WaterError::InvalidFormat(format!(
                "{} mask shape {:?} does not match water mask {:?}",
                name,
                m.shape(),
                shape
            )));
        }
    }

    let mut values = Array2::from_elem(shape, false);
    Zip::from(&mut values)
        .and(&water.values)
        .and(&vegetation.values)
        .and(&elevation.values)
        .for_each(|out, &w, &veg, &high| *out = w && !veg && !high);

    let mut valid = water.valid.clone();
    Zip::from(&mut valid)
        .and(&vegetation.valid)
        .and(&elevation.valid)
        .for_each(|v, &a, &b| *v = *v && a && b);

    Ok(Mask {
        source: format!("{}_clean", water.source),
        threshold: water.threshold,
        values,
        valid,
    })
}

/// Final class raster: `permanent + temporary`.
///
/// Both inputs are 0/1, so the sum is in {0, 1, 2}. Zero carries no
/// information and is marked invalid along with any invalid input.
pub fn classify(
    permanent: &Mask,
    temporary: &Mask,
    geo_transform: GeoTransform,
) -> WaterResult<ClassifiedRaster> {
    if permanent.shape() != temporary.shape() {
        return Err(WaterError::InvalidFormat(format!(
            "Permanent mask {:?} and temporary mask {:?} differ in shape",
            permanent.shape(),
            temporary.shape()
        )));
    }
    let shape = permanent.shape();
    let mut values = Array2::<u8>::zeros(shape);
    let mut valid = Array2::from_elem(shape, false);
    Zip::from(&mut values)
        .and(&mut valid)
        .and(&permanent.values)
        .and(&permanent.valid)
        .and(&temporary.values)
        .and(&temporary.valid)
        .for_each(|out, ok, &p, &p_ok, &t, &t_ok| {
            if p_ok && t_ok {
                *out = p as u8 + t as u8;
            }
            *ok = *out > 0;
        });

    Ok(ClassifiedRaster {
        geo_transform,
        values,
        valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn mask(values: [[bool; 2]; 1]) -> Mask {
        Mask {
            source: "mndwi".to_string(),
            threshold: 0.3,
            values: arr2(&values),
            valid: Array2::from_elem((1, 2), true),
        }
    }

    #[test]
    fn test_vegetation_and_elevation_suppress_water() {
        let water = mask([[true, true]]);
        let veg = mask([[true, false]]);
        let high = mask([[false, false]]);
        let clean = clean_water(&water, &veg, &high).unwrap();
        assert_eq!(clean.values, arr2(&[[false, true]]));

        let high = mask([[false, true]]);
        let clean = clean_water(&water, &veg, &high).unwrap();
        assert_eq!(clean.count_set(), 0);
    }

    #[test]
    fn test_final_domain() {
        let permanent = mask([[true, false]]);
        let temporary = mask([[true, true]]);
        let out = classify(&permanent, &temporary, GeoTransform::north_up(0.0, 1.0, 1.0)).unwrap();
        assert_eq!(out.values, arr2(&[[2u8, 1]]));
        assert!(out.valid.iter().all(|&v| v));

        let none = mask([[false, false]]);
        let out = classify(&none, &none, GeoTransform::north_up(0.0, 1.0, 1.0)).unwrap();
        assert!(!out.has_valid_pixels());
    }

    #[test]
    fn test_elevation_mask_strict() {
        let hand = Raster::new(GeoTransform::north_up(0.0, 1.0, 1.0), (1, 3))
            .with_band("hand", arr2(&[[80.0f32, 50.0, f32::NAN]]))
            .unwrap();
        let m = elevation_mask(Some(&hand), 50.0, (1, 3)).unwrap();
        assert_eq!(m.values, arr2(&[[true, false, false]]));
        assert_eq!(m.valid, arr2(&[[true, true, false]]));

        let off = elevation_mask(None, 50.0, (1, 3)).unwrap();
        assert_eq!(off.count_set(), 0);
        assert!(elevation_mask(Some(&hand), 50.0, (2, 3)).is_err());
    }
}
