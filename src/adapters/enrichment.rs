//! Places text-search client that turns a listing name into an enrichment record.

use crate::adapters::http::RateLimitedClient;
use crate::config::toml_config::{CenterConfig, EnrichmentConfig};
use crate::core::similarity;
use crate::domain::model::{Coordinate, EnrichmentRecord, PlaceMatch};
use crate::domain::ports::Enricher;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const FIELD_MASK: &str = "places.id,places.displayName,places.location";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchTextRequest<'a> {
    text_query: &'a str,
    language_code: &'a str,
    max_result_count: usize,
    location_bias: LocationBias,
}

#[derive(Debug, Serialize)]
struct LocationBias {
    circle: Circle,
}

#[derive(Debug, Serialize)]
struct Circle {
    center: LatLng,
    radius: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

/// Candidate location as returned; either half may be absent.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct Location {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchTextResponse {
    #[serde(default)]
    places: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    id: Option<String>,
    display_name: Option<LocalizedText>,
    location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    text: String,
}

impl Candidate {
    fn name(&self) -> &str {
        self.display_name.as_ref().map(|d| d.text.as_str()).unwrap_or("")
    }
}

pub struct PlacesClient {
    client: Arc<RateLimitedClient>,
    endpoint: String,
    api_key: String,
    language: String,
    location_context: String,
    context_aliases: Vec<String>,
    region_center: CenterConfig,
    region_radius_m: f64,
    point_radius_m: f64,
    max_candidates: usize,
}

impl PlacesClient {
    pub fn new(client: Arc<RateLimitedClient>, config: &EnrichmentConfig, api_key: &str) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            language: config.language.clone(),
            location_context: config.location_context.clone(),
            context_aliases: config.context_aliases.clone(),
            region_center: config.region_center,
            region_radius_m: config.region_radius_m,
            point_radius_m: config.point_radius_m,
            max_candidates: config.max_candidates,
        }
    }

    /// Appends the city token unless the name already mentions the city.
    pub fn build_query(&self, name: &str) -> String {
        let name = name.trim();
        let lowered = name.to_lowercase();
        let has_context = std::iter::once(&self.location_context)
            .chain(self.context_aliases.iter())
            .filter(|token| !token.is_empty())
            .any(|token| lowered.contains(&token.to_lowercase()));

        if has_context || self.location_context.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", name, self.location_context)
        }
    }

    fn location_bias(&self, coordinate: Option<Coordinate>) -> LocationBias {
        let (center, radius) = match coordinate {
            Some(c) => (
                LatLng {
                    latitude: c.latitude,
                    longitude: c.longitude,
                },
                self.point_radius_m,
            ),
            None => (
                LatLng {
                    latitude: self.region_center.latitude,
                    longitude: self.region_center.longitude,
                },
                self.region_radius_m,
            ),
        };
        LocationBias {
            circle: Circle { center, radius },
        }
    }

    async fn search(&self, query: &str, coordinate: Option<Coordinate>) -> Result<Vec<Candidate>> {
        let body = SearchTextRequest {
            text_query: query,
            language_code: &self.language,
            max_result_count: self.max_candidates,
            location_bias: self.location_bias(coordinate),
        };

        let response = self
            .client
            .send(&self.endpoint, |client| {
                client
                    .post(&self.endpoint)
                    .header("X-Goog-Api-Key", &self.api_key)
                    .header("X-Goog-FieldMask", FIELD_MASK)
                    .json(&body)
            })
            .await?;

        let text = response.text().await?;
        let parsed: SearchTextResponse = serde_json::from_str(&text)
            .map_err(|e| EtlError::parse(format!("places response: {}", e)))?;
        Ok(parsed.places)
    }

    /// Highest scoring candidate with an id and a name; ties keep the earlier one.
    fn pick_best(&self, name: &str, candidates: Vec<Candidate>) -> Option<PlaceMatch> {
        let usable: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.id.as_deref().is_some_and(|id| !id.is_empty()) && !c.name().trim().is_empty())
            .collect();

        let (index, score) = similarity::best_match(name, usable.iter().map(Candidate::name))?;
        let best = usable.into_iter().nth(index)?;
        tracing::debug!("Best match for '{}' is '{}' (score {:.2})", name, best.name(), score);

        Some(PlaceMatch {
            standardized_name: best.name().trim().to_string(),
            external_id: best.id.clone().unwrap_or_default(),
            coordinate: best
                .location
                .and_then(|l| Coordinate::from_parts(l.latitude, l.longitude)),
        })
    }
}

#[async_trait]
impl Enricher for PlacesClient {
    async fn enrich(&self, name: &str, coordinate: Option<Coordinate>) -> EnrichmentRecord {
        let query = self.build_query(name);

        match self.search(&query, coordinate).await {
            Ok(candidates) if candidates.is_empty() => {
                tracing::info!("No places candidates for '{}'", query);
                EnrichmentRecord::placeholder(name)
            }
            Ok(candidates) => match self.pick_best(name, candidates) {
                Some(matched) => EnrichmentRecord::matched(name, matched),
                None => {
                    tracing::info!("No usable candidate for '{}'", query);
                    EnrichmentRecord::placeholder(name)
                }
            },
            Err(e) if e.is_transient() => {
                tracing::warn!("Enrichment failed for '{}', a later run may succeed: {}", query, e);
                EnrichmentRecord::placeholder(name)
            }
            Err(e) => {
                tracing::error!("Enrichment failed for '{}': {}", query, e);
                EnrichmentRecord::placeholder(name)
            }
        }
    }
}
