//! Fuses listing entries with enrichment results into canonical places.
//!
//! Pairing is positional: `enrichments[i]` must describe `sources[i]`. The
//! pipeline guarantees this by enriching sources one by one, in order, and
//! by producing a placeholder instead of dropping an item when a lookup
//! fails. Reordering either list independently breaks fusion silently.

use crate::domain::model::{Coordinate, EnrichmentRecord, Place, SourcePlace};
use crate::utils::error::{EtlError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Source-only places when `enrichments` is empty, otherwise
    /// `min(sources.len(), enrichments.len())` fused places.
    pub fn aggregate(&self, sources: &[SourcePlace], enrichments: &[EnrichmentRecord]) -> Vec<Place> {
        if enrichments.is_empty() {
            tracing::info!(
                "No enrichment data, building {} places from source data alone",
                sources.len()
            );
            return sources.iter().map(Place::from_source).collect();
        }

        if sources.len() != enrichments.len() {
            tracing::warn!(
                "Source/enrichment length mismatch ({} vs {}), fusing the first {} pairs",
                sources.len(),
                enrichments.len(),
                sources.len().min(enrichments.len())
            );
        }

        sources
            .iter()
            .zip(enrichments.iter())
            .map(|(source, enrichment)| match self.fuse(source, enrichment) {
                Ok(place) => place,
                Err(e) => {
                    tracing::warn!("Fusion failed for '{}': {}, using source data", source.name, e);
                    Place::from_source(source)
                }
            })
            .collect()
    }

    /// Enrichment wins for name and location, the source owns the description.
    pub fn fuse(&self, source: &SourcePlace, enrichment: &EnrichmentRecord) -> Result<Place> {
        let standardized = enrichment.standardized_name().trim();
        let name = if standardized.is_empty() {
            source.name.trim()
        } else {
            standardized
        };

        if name.is_empty() {
            return Err(EtlError::validation("fused place has no name"));
        }

        let mut place = Place::new(name, source.short_description.trim());
        place.source_name = source.source_name.clone();

        if let Some(matched) = &enrichment.matched {
            if let Some(coordinate) = matched.coordinate {
                // Re-validate: payloads may be deserialized without going through Coordinate::new.
                let coordinate = Coordinate::new(coordinate.latitude, coordinate.longitude)?;
                place = place
                    .with_external_id(matched.external_id.clone())
                    .with_coordinate(coordinate);
            }
        }

        Ok(place)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::PlaceMatch;

    fn source(name: &str, description: &str) -> SourcePlace {
        SourcePlace::new(name, description, "", "visitseoul")
    }

    fn matched(name: &str, id: &str, lat: f64, lng: f64) -> EnrichmentRecord {
        EnrichmentRecord::matched(
            name,
            PlaceMatch {
                standardized_name: name.to_string(),
                external_id: id.to_string(),
                coordinate: Some(Coordinate {
                    latitude: lat,
                    longitude: lng,
                }),
            },
        )
    }

    #[test]
    fn test_fusion_prefers_enrichment_name_and_source_description() {
        let sources = vec![source("N Seoul Tower", "Iconic landmark...")];
        let enrichments = vec![matched("Namsan Seoul Tower", "EXT123", 37.5512, 126.9882)];

        let places = Aggregator::new().aggregate(&sources, &enrichments);

        assert_eq!(places.len(), 1);
        let place = &places[0];
        assert_eq!(place.name, "Namsan Seoul Tower");
        assert_eq!(place.description, "Iconic landmark...");
        assert_eq!(place.external_id.as_deref(), Some("EXT123"));
        assert_eq!(
            place.coordinate,
            Some(Coordinate {
                latitude: 37.5512,
                longitude: 126.9882
            })
        );
    }

    #[test]
    fn test_empty_enrichment_yields_source_only_places() {
        let sources = vec![source("경복궁", "조선의 법궁"), source("창덕궁", "")];
        let places = Aggregator::new().aggregate(&sources, &[]);

        assert_eq!(places.len(), 2);
        assert!(places.iter().all(|p| p.external_id.is_none() && p.coordinate.is_none()));
        assert_eq!(places[0].description, "조선의 법궁");
    }

    #[test]
    fn test_positional_pairing_stops_at_shorter_list() {
        let sources = vec![source("a", ""), source("b", ""), source("c", "")];
        let enrichments = vec![
            matched("A", "1", 37.0, 127.0),
            matched("B", "2", 37.1, 127.1),
        ];
        assert_eq!(Aggregator::new().aggregate(&sources, &enrichments).len(), 2);

        let more_enrichments = vec![
            matched("A", "1", 37.0, 127.0),
            matched("B", "2", 37.1, 127.1),
            matched("C", "3", 37.2, 127.2),
            matched("D", "4", 37.3, 127.3),
        ];
        assert_eq!(Aggregator::new().aggregate(&sources, &more_enrichments).len(), 3);
    }

    #[test]
    fn test_match_without_coordinate_drops_external_id() {
        let sources = vec![source("덕수궁", "")];
        let enrichments = vec![EnrichmentRecord::matched(
            "덕수궁",
            PlaceMatch {
                standardized_name: "덕수궁 Deoksugung".to_string(),
                external_id: "EXT9".to_string(),
                coordinate: None,
            },
        )];

        let places = Aggregator::new().aggregate(&sources, &enrichments);
        assert_eq!(places[0].name, "덕수궁 Deoksugung");
        assert_eq!(places[0].external_id, None);
        assert_eq!(places[0].coordinate, None);
    }

    #[test]
    fn test_invalid_coordinate_falls_back_to_source() {
        let sources = vec![source("N Seoul Tower", "landmark")];
        let enrichments = vec![matched("Namsan Seoul Tower", "EXT123", 237.0, 126.9)];

        let places = Aggregator::new().aggregate(&sources, &enrichments);
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "N Seoul Tower");
        assert_eq!(places[0].external_id, None);
        assert_eq!(places[0].coordinate, None);
    }

    #[test]
    fn test_placeholder_keeps_source_name() {
        let sources = vec![source("서울식물원", "도시형 식물원")];
        let enrichments = vec![EnrichmentRecord::placeholder("서울식물원")];

        let places = Aggregator::new().aggregate(&sources, &enrichments);
        assert_eq!(places[0].name, "서울식물원");
        assert_eq!(places[0].description, "도시형 식물원");
        assert!(places[0].coordinate.is_none());
    }
}
