//! Typed analytic requests and their validation rules.
//!
//! Each request is parsed from an analysis' `metadata`, validated, and
//! normalized: defaults are filled in, repeated AOI ids are dropped and
//! set-like fields are sorted, so two requests that mean the same thing
//! serialize (and fingerprint) the same.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AnalyticType;
use crate::api::AreaOfInterest;
use crate::compute::{Aggregation, DatasetQuery, Filter, Operator};
use crate::error::ValidationError;

/// Key under which the analytic type is kept in normalized metadata.
pub const ANALYTIC_KEY: &str = "analytic";

/// Accepted canopy cover thresholds, in percent.
pub const CANOPY_COVER_THRESHOLDS: [u8; 7] = [10, 15, 20, 25, 30, 50, 75];

pub const LOSS_YEARS: std::ops::RangeInclusive<u16> = 2001..=2024;
pub const GAIN_YEARS: std::ops::RangeInclusive<u16> = 2000..=2020;
const GAIN_PERIOD_YEARS: u16 = 5;

/// Common behavior of every analytic request.
pub trait AnalyticRequest: Serialize + DeserializeOwned + Send + Sync + 'static {
    const ANALYTIC: AnalyticType;

    fn aoi(&self) -> &AreaOfInterest;

    fn aoi_mut(&mut self) -> &mut AreaOfInterest;

    /// Analytic-specific checks; AOI checks run separately.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Aggregation this request needs.
    fn dataset_query(&self) -> DatasetQuery;

    /// Put equivalent requests into one form.
    fn normalize(&mut self) {}

    /// Parse, normalize and validate `metadata`.
    ///
    /// An `analytic` key, when present, must name this request's analytic.
    fn parse(metadata: &Value) -> Result<Self, ValidationError> {
        let mut fields = match metadata {
            Value::Object(map) => map.clone(),
            _ => return Err(ValidationError::new("request must be a JSON object")),
        };
        if let Some(analytic) = fields.remove(ANALYTIC_KEY) {
            if analytic.as_str() != Some(Self::ANALYTIC.as_str()) {
                return Err(ValidationError::field(
                    ANALYTIC_KEY,
                    format!("expected '{}', got {}", Self::ANALYTIC, analytic),
                ));
            }
        }

        let mut request: Self = serde_json::from_value(Value::Object(fields))
            .map_err(|e| ValidationError::new(e.to_string()))?;
        request.aoi_mut().dedup_ids();
        request.normalize();
        validate_aoi(request.aoi())?;
        request.validate()?;
        Ok(request)
    }

    /// Normalized metadata, including the analytic type.
    fn normalized(&self) -> Result<Value, ValidationError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| ValidationError::new(format!("request cannot be normalized: {}", e)))?;
        if let Value::Object(map) = &mut value {
            map.insert(
                ANALYTIC_KEY.to_string(),
                Value::String(Self::ANALYTIC.as_str().to_string()),
            );
        }
        Ok(value)
    }
}

fn validate_aoi(aoi: &AreaOfInterest) -> Result<(), ValidationError> {
    if aoi.ids.is_empty() {
        return Err(ValidationError::field("aoi.ids", "at least one AOI id is required"));
    }
    if aoi.ids.iter().any(|id| id.trim().is_empty()) {
        return Err(ValidationError::field("aoi.ids", "AOI ids must not be blank"));
    }
    Ok(())
}

fn validate_canopy_cover(canopy_cover: u8) -> Result<(), ValidationError> {
    if CANOPY_COVER_THRESHOLDS.contains(&canopy_cover) {
        Ok(())
    } else {
        Err(ValidationError::field(
            "canopy_cover",
            format!(
                "{} is not one of {:?}",
                canopy_cover, CANOPY_COVER_THRESHOLDS
            ),
        ))
    }
}

fn default_canopy_cover() -> u8 {
    30
}

fn default_loss_start() -> u16 {
    *LOSS_YEARS.start()
}

fn default_loss_end() -> u16 {
    *LOSS_YEARS.end()
}

fn default_gain_start() -> u16 {
    *GAIN_YEARS.start()
}

fn default_gain_end() -> u16 {
    *GAIN_YEARS.end()
}

/// Layers a result can be broken down by.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intersection {
    Driver,
    NaturalForest,
    PrimaryForest,
}

impl Intersection {
    /// Logical field the intersection groups by.
    pub fn field(&self) -> &'static str {
        match self {
            Intersection::Driver => "driver",
            Intersection::NaturalForest => "natural_forest",
            Intersection::PrimaryForest => "primary_forest",
        }
    }
}

fn normalize_intersections(intersections: &mut Vec<Intersection>) {
    intersections.sort();
    intersections.dedup();
}

/// Tree cover extent in 2000 above a canopy threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeCoverRequest {
    pub aoi: AreaOfInterest,
    #[serde(default = "default_canopy_cover")]
    pub canopy_cover: u8,
}

impl AnalyticRequest for TreeCoverRequest {
    const ANALYTIC: AnalyticType = AnalyticType::TreeCover;

    fn aoi(&self) -> &AreaOfInterest {
        &self.aoi
    }

    fn aoi_mut(&mut self) -> &mut AreaOfInterest {
        &mut self.aoi
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_canopy_cover(self.canopy_cover)
    }

    fn dataset_query(&self) -> DatasetQuery {
        DatasetQuery::new("umd_tree_cover_density_2000", Aggregation::sum("area__ha"))
            .filter(Filter::new("canopy_cover", Operator::Ge, self.canopy_cover))
    }
}

/// Tree cover gain over five-year periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeCoverGainRequest {
    pub aoi: AreaOfInterest,
    #[serde(default = "default_gain_start")]
    pub start_year: u16,
    #[serde(default = "default_gain_end")]
    pub end_year: u16,
}

impl TreeCoverGainRequest {
    /// `"2000-2005"`, `"2005-2010"`, ... covering `start_year..end_year`.
    pub fn periods(&self) -> Vec<String> {
        (self.start_year..self.end_year)
            .step_by(GAIN_PERIOD_YEARS as usize)
            .map(|year| format!("{}-{}", year, year + GAIN_PERIOD_YEARS))
            .collect()
    }
}

impl AnalyticRequest for TreeCoverGainRequest {
    const ANALYTIC: AnalyticType = AnalyticType::TreeCoverGain;

    fn aoi(&self) -> &AreaOfInterest {
        &self.aoi
    }

    fn aoi_mut(&mut self) -> &mut AreaOfInterest {
        &mut self.aoi
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for (field, year) in [("start_year", self.start_year), ("end_year", self.end_year)] {
            if !GAIN_YEARS.contains(&year) || year % GAIN_PERIOD_YEARS != 0 {
                return Err(ValidationError::field(
                    field,
                    format!(
                        "{} must be a multiple of {} between {} and {}",
                        year,
                        GAIN_PERIOD_YEARS,
                        GAIN_YEARS.start(),
                        GAIN_YEARS.end()
                    ),
                ));
            }
        }
        if self.start_year >= self.end_year {
            return Err(ValidationError::field(
                "end_year",
                "end_year must be after start_year",
            ));
        }
        Ok(())
    }

    fn dataset_query(&self) -> DatasetQuery {
        DatasetQuery::new("umd_tree_cover_gain", Aggregation::sum("gain_area__ha"))
            .group_by("gain_period")
            .filter(Filter::new("gain_period", Operator::In, self.periods()))
    }
}

/// Annual tree cover loss, optionally broken down by intersections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeCoverLossRequest {
    pub aoi: AreaOfInterest,
    #[serde(default = "default_loss_start")]
    pub start_year: u16,
    #[serde(default = "default_loss_end")]
    pub end_year: u16,
    #[serde(default = "default_canopy_cover")]
    pub canopy_cover: u8,
    #[serde(default)]
    pub intersections: Vec<Intersection>,
}

impl AnalyticRequest for TreeCoverLossRequest {
    const ANALYTIC: AnalyticType = AnalyticType::TreeCoverLoss;

    fn aoi(&self) -> &AreaOfInterest {
        &self.aoi
    }

    fn aoi_mut(&mut self) -> &mut AreaOfInterest {
        &mut self.aoi
    }

    fn normalize(&mut self) {
        normalize_intersections(&mut self.intersections);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_canopy_cover(self.canopy_cover)?;
        for (field, year) in [("start_year", self.start_year), ("end_year", self.end_year)] {
            if !LOSS_YEARS.contains(&year) {
                return Err(ValidationError::field(
                    field,
                    format!(
                        "{} is outside {}..={}",
                        year,
                        LOSS_YEARS.start(),
                        LOSS_YEARS.end()
                    ),
                ));
            }
        }
        if self.start_year > self.end_year {
            return Err(ValidationError::field(
                "end_year",
                "end_year must not be before start_year",
            ));
        }
        Ok(())
    }

    fn dataset_query(&self) -> DatasetQuery {
        let mut query = DatasetQuery::new("umd_tree_cover_loss", Aggregation::sum("area__ha"))
            .group_by("loss_year")
            .filter(Filter::new("canopy_cover", Operator::Ge, self.canopy_cover))
            .filter(Filter::new("loss_year", Operator::Ge, self.start_year))
            .filter(Filter::new("loss_year", Operator::Le, self.end_year));
        for intersection in &self.intersections {
            query = query.group_by(intersection.field());
        }
        query
    }
}

/// Net forest carbon flux.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarbonFluxRequest {
    pub aoi: AreaOfInterest,
    #[serde(default = "default_canopy_cover")]
    pub canopy_cover: u8,
    #[serde(default)]
    pub intersections: Vec<Intersection>,
}

impl AnalyticRequest for CarbonFluxRequest {
    const ANALYTIC: AnalyticType = AnalyticType::CarbonFlux;

    fn aoi(&self) -> &AreaOfInterest {
        &self.aoi
    }

    fn aoi_mut(&mut self) -> &mut AreaOfInterest {
        &mut self.aoi
    }

    fn normalize(&mut self) {
        normalize_intersections(&mut self.intersections);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_canopy_cover(self.canopy_cover)
    }

    fn dataset_query(&self) -> DatasetQuery {
        let mut query =
            DatasetQuery::new("gfw_forest_carbon_net_flux", Aggregation::sum("net_flux__Mg_CO2e"))
                .filter(Filter::new("canopy_cover", Operator::Ge, self.canopy_cover));
        for intersection in &self.intersections {
            query = query.group_by(intersection.field());
        }
        query
    }
}
