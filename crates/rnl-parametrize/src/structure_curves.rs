//! Discharge relations of weirs, culverts and orifices from structure data.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rnl_core::{NodeId, round_decimals};
use serde::{Deserialize, Serialize};

use crate::error::{ParamError, ParamResult};

pub const GRAVITY: f64 = 9.81;
pub const LOSS_COEFFICIENT: f64 = 0.63;
/// Heads above crest sampled by [`rating_curve`].
pub const CREST_DEPTHS: [f64; 5] = [0.0, 0.05, 0.1, 0.25, 0.5];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossSection {
    Round,
    #[default]
    Rectangle,
    Ellipse,
}

impl CrossSection {
    pub fn as_str(self) -> &'static str {
        match self {
            CrossSection::Round => "round",
            CrossSection::Rectangle => "rectangle",
            CrossSection::Ellipse => "ellipse",
        }
    }
}

impl fmt::Display for CrossSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrossSection {
    type Err = ParamError;

    fn from_str(s: &str) -> ParamResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round" => Ok(CrossSection::Round),
            "rectangle" => Ok(CrossSection::Rectangle),
            "ellipse" => Ok(CrossSection::Ellipse),
            other => Err(ParamError::invalid(format!("cross-section shape '{other}' not implemented"))),
        }
    }
}

/// Flow area of a cross-section. Round sections only use `width`.
pub fn cross_section_area(shape: CrossSection, width: f64, height: Option<f64>) -> ParamResult<f64> {
    let height = || height.ok_or_else(|| ParamError::invalid(format!("{shape} cross-section needs a height")));
    Ok(match shape {
        CrossSection::Round => PI * (width / 2.0).powi(2),
        CrossSection::Rectangle => width * height()?,
        CrossSection::Ellipse => PI * (width / 2.0) * (height()? / 2.0),
    })
}

/// Velocity over a free weir; zero below the crest.
pub fn weir_velocity(level: f64, crest_level: f64) -> f64 {
    if crest_level > level {
        0.0
    } else {
        (2.0 / 3.0 * GRAVITY * (level - crest_level)).sqrt()
    }
}

/// Geometry of one structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Opening {
    pub crest_level: f64,
    pub width: f64,
    pub height: Option<f64>,
    pub shape: CrossSection,
    pub loss_coefficient: f64,
}

impl Opening {
    pub fn weir(crest_level: f64, width: f64) -> Self {
        Self {
            crest_level,
            width,
            height: None,
            shape: CrossSection::Rectangle,
            loss_coefficient: LOSS_COEFFICIENT,
        }
    }

    /// Discharge at `level`, rounded to 2 decimals.
    ///
    /// The wetted area over the crest is limited by the cross-section when a
    /// height is known.
    pub fn flow_rate(&self, level: f64) -> ParamResult<f64> {
        let velocity = weir_velocity(level, self.crest_level);
        let mut area = self.width * (2.0 / 3.0 * (level - self.crest_level));
        if self.height.is_some() {
            area = area.min(cross_section_area(self.shape, self.width, self.height)?);
        }
        Ok(round_decimals(self.loss_coefficient * area * velocity, 2))
    }

    /// Capacity at `max_velocity`, rounded to 2 decimals.
    pub fn capacity(&self, max_velocity: f64) -> ParamResult<f64> {
        let area = cross_section_area(self.shape, self.width, self.height)?;
        Ok(round_decimals(area * max_velocity, 2))
    }

    /// `(level, flow_rate)` pairs at [`CREST_DEPTHS`] above the crest.
    pub fn rating_curve(&self) -> ParamResult<Vec<(f64, f64)>> {
        let crest = round_decimals(self.crest_level, 2);
        CREST_DEPTHS
            .iter()
            .map(|depth| {
                let level = crest + depth;
                Ok((level, self.flow_rate(level)?))
            })
            .collect()
    }
}

/// Outlet static row: capacity at `max_velocity` with the crest as minimum
/// upstream level.
pub fn outlet_static(
    node_id: NodeId,
    opening: &Opening,
    max_velocity: f64,
) -> ParamResult<rnl_model::OutletStatic> {
    let mut row = rnl_model::StructureStatic::new(node_id, opening.capacity(max_velocity)?);
    row.min_upstream_level = Some(opening.crest_level);
    Ok(rnl_model::OutletStatic(row))
}

pub fn rating_curve(
    node_id: NodeId,
    opening: &Opening,
) -> ParamResult<Vec<rnl_model::TabulatedRatingCurveStatic>> {
    Ok(opening
        .rating_curve()?
        .into_iter()
        .map(|(level, flow_rate)| rnl_model::TabulatedRatingCurveStatic::new(node_id, level, flow_rate))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::id;
    use approx::assert_relative_eq;

    #[test]
    fn areas_per_shape() {
        assert_relative_eq!(cross_section_area(CrossSection::Round, 2.0, None).unwrap(), PI);
        assert_eq!(cross_section_area(CrossSection::Rectangle, 2.0, Some(1.5)).unwrap(), 3.0);
        assert_relative_eq!(cross_section_area(CrossSection::Ellipse, 2.0, Some(1.0)).unwrap(), PI / 2.0);
        assert!(cross_section_area(CrossSection::Rectangle, 2.0, None).is_err());
        assert!("trapezium".parse::<CrossSection>().is_err());
        assert_eq!(" Round".parse::<CrossSection>().unwrap(), CrossSection::Round);
    }

    #[test]
    fn no_flow_below_crest() {
        let weir = Opening::weir(1.0, 2.0);
        assert_eq!(weir_velocity(0.5, 1.0), 0.0);
        assert_eq!(weir.flow_rate(0.9).unwrap(), 0.0);
    }

    #[test]
    fn rating_curve_starts_at_crest() {
        let rows = rating_curve(id(3), &Opening::weir(1.234, 2.0)).unwrap();
        assert_eq!(rows.len(), 5);
        assert_relative_eq!(rows[0].level, 1.23);
        assert_eq!(rows[0].flow_rate, 0.0);
        // h = 0.5: 0.63 * (2 * 2/3 * 0.5) * sqrt(2/3 * 9.81 * 0.5)
        let h = 0.5 + (1.23 - 1.234);
        let expected = 0.63 * (2.0 * 2.0 / 3.0 * h) * (2.0 / 3.0 * GRAVITY * h).sqrt();
        assert_relative_eq!(rows[4].flow_rate, round_decimals(expected, 2));
        assert!(rows.windows(2).all(|w| w[0].flow_rate <= w[1].flow_rate));
    }

    #[test]
    fn culvert_flow_is_limited_by_its_section() {
        let culvert = Opening {
            height: Some(0.1),
            ..Opening::weir(0.0, 1.0)
        };
        let open = Opening::weir(0.0, 1.0);
        assert!(culvert.flow_rate(2.0).unwrap() < open.flow_rate(2.0).unwrap());
        let row = outlet_static(id(7), &culvert, 1.0).unwrap();
        assert_eq!(row.flow_rate, 0.1);
        assert_eq!(row.min_upstream_level, Some(0.0));
    }
}
