use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees. Both halves are always present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(EtlError::validation(format!(
                "coordinate must be finite, got ({}, {})",
                latitude, longitude
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(EtlError::validation(format!(
                "coordinate out of range: ({}, {})",
                latitude, longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Builds a coordinate only when both halves are present and valid.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lng)) => Self::new(lat, lng).ok(),
            _ => None,
        }
    }
}

/// Raw listing entry. Only meaningful within the run that scraped it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePlace {
    pub name: String,
    pub short_description: String,
    pub source_local_id: String,
    pub source_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub detail_url: Option<String>,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
}

impl SourcePlace {
    pub fn new(
        name: impl Into<String>,
        short_description: impl Into<String>,
        source_local_id: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            short_description: short_description.into(),
            source_local_id: source_local_id.into(),
            source_name: source_name.into(),
            category: String::new(),
            detail_url: None,
            coordinate: None,
        }
    }

    /// Key used to drop repeats inside a single scraping run.
    pub fn run_key(&self) -> String {
        if self.source_local_id.is_empty() {
            format!("name:{}", self.name)
        } else {
            format!("id:{}", self.source_local_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceMatch {
    pub standardized_name: String,
    pub external_id: String,
    pub coordinate: Option<Coordinate>,
}

/// Outcome of one enrichment lookup. `matched == None` is a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub query_name: String,
    pub matched: Option<PlaceMatch>,
}

impl EnrichmentRecord {
    pub fn matched(query_name: impl Into<String>, matched: PlaceMatch) -> Self {
        Self {
            query_name: query_name.into(),
            matched: Some(matched),
        }
    }

    pub fn placeholder(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            matched: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.matched.is_none()
    }

    pub fn standardized_name(&self) -> &str {
        self.matched
            .as_ref()
            .map(|m| m.standardized_name.as_str())
            .unwrap_or(&self.query_name)
    }

    pub fn external_id(&self) -> Option<&str> {
        self.matched.as_ref().map(|m| m.external_id.as_str())
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        self.matched.as_ref().and_then(|m| m.coordinate)
    }
}

/// Canonical place as handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Place {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
            external_id: None,
            coordinate: None,
            source_name: String::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn from_source(source: &SourcePlace) -> Self {
        let mut place = Self::new(source.name.trim(), source.short_description.trim());
        place.source_name = source.source_name.clone();
        place
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.coordinate = Some(coordinate);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformResult {
    pub places: Vec<Place>,
    pub matched: usize,
    pub placeholders: usize,
    pub enrichment_skipped: bool,
}

/// Counts from one upsert batch. `inserted` is the number of net-new records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_rejects_out_of_range() {
        assert!(Coordinate::new(37.5512, 126.9882).is_ok());
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -181.0).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_coordinate_from_parts_needs_both_halves() {
        assert!(Coordinate::from_parts(Some(37.5), None).is_none());
        assert!(Coordinate::from_parts(None, Some(126.9)).is_none());
        assert_eq!(
            Coordinate::from_parts(Some(37.5), Some(126.9)),
            Some(Coordinate {
                latitude: 37.5,
                longitude: 126.9
            })
        );
    }

    #[test]
    fn test_placeholder_carries_only_the_name() {
        let record = EnrichmentRecord::placeholder("경복궁");
        assert!(record.is_placeholder());
        assert_eq!(record.standardized_name(), "경복궁");
        assert_eq!(record.external_id(), None);
        assert_eq!(record.coordinate(), None);
    }

    #[test]
    fn test_run_key_prefers_source_local_id() {
        let with_id = SourcePlace::new("경복궁", "", "KOP000001", "visitseoul");
        let without_id = SourcePlace::new("경복궁", "", "", "visitseoul");
        assert_eq!(with_id.run_key(), "id:KOP000001");
        assert_eq!(without_id.run_key(), "name:경복궁");
    }
}
