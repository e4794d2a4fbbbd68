use httpmock::prelude::*;
use place_etl::adapters::enrichment::PlacesClient;
use place_etl::adapters::http::RateLimitedClient;
use place_etl::core::{Coordinate, Enricher};
use place_etl::TomlConfig;
use serde_json::json;
use std::sync::Arc;

fn places_client(server: &MockServer) -> PlacesClient {
    let config = TomlConfig::from_toml_str(&format!(
        r#"
[pipeline]
name = "enrichment-test"

[http]
request_delay_ms = 1
max_retries = 2
backoff_base_ms = 5
backoff_max_ms = 20

[source]
base_url = "https://korean.visitseoul.net"

[[source.categories]]
name = "attractions"
path = "/attractions"

[enrichment]
endpoint = "{}"
api_key = "test-key"
"#,
        server.url("/v1/places:searchText")
    ))
    .unwrap();

    let client = Arc::new(RateLimitedClient::from_config(&config.http).unwrap());
    PlacesClient::new(client, &config.enrichment, config.api_key().unwrap())
}

#[tokio::test]
async fn test_best_candidate_is_matched() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/places:searchText")
                .header("x-goog-api-key", "test-key")
                .json_body_partial(r#"{"textQuery": "N서울타워", "languageCode": "ko"}"#);
            then.status(200).json_body(json!({
                "places": [
                    {
                        "id": "ChIJ-other",
                        "displayName": { "text": "남산골한옥마을" },
                        "location": { "latitude": 37.5593, "longitude": 126.9942 }
                    },
                    {
                        "id": "ChIJ-tower",
                        "displayName": { "text": "N서울타워" },
                        "location": { "latitude": 37.5512, "longitude": 126.9882 }
                    }
                ]
            }));
        })
        .await;

    let record = places_client(&server).enrich("N서울타워", None).await;

    search.assert_hits_async(1).await;
    assert!(!record.is_placeholder());
    assert_eq!(record.query_name, "N서울타워");
    assert_eq!(record.standardized_name(), "N서울타워");
    assert_eq!(record.external_id(), Some("ChIJ-tower"));
    assert_eq!(record.coordinate(), Coordinate::new(37.5512, 126.9882).ok());
}

#[tokio::test]
async fn test_city_token_is_appended_and_known_coordinate_narrows_bias() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/places:searchText").json_body_partial(
                r#"{"textQuery": "경복궁 서울", "locationBias": {"circle": {"center": {"latitude": 37.5796, "longitude": 126.977}, "radius": 1000.0}}}"#,
            );
            then.status(200).json_body(json!({
                "places": [{
                    "id": "ChIJ-palace",
                    "displayName": { "text": "경복궁" },
                    "location": { "latitude": 37.5796, "longitude": 126.977 }
                }]
            }));
        })
        .await;

    let record = places_client(&server)
        .enrich("경복궁", Coordinate::new(37.5796, 126.977).ok())
        .await;

    search.assert_hits_async(1).await;
    assert_eq!(record.external_id(), Some("ChIJ-palace"));
}

#[tokio::test]
async fn test_empty_result_yields_placeholder() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/places:searchText");
            then.status(200).json_body(json!({}));
        })
        .await;

    let record = places_client(&server).enrich("없는 장소", None).await;

    assert!(record.is_placeholder());
    assert_eq!(record.standardized_name(), "없는 장소");
    assert_eq!(record.external_id(), None);
}

#[tokio::test]
async fn test_server_error_yields_placeholder() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/places:searchText");
            then.status(500).body("internal error");
        })
        .await;

    let record = places_client(&server).enrich("서울숲", None).await;

    search.assert_hits_async(1).await;
    assert!(record.is_placeholder());
}

#[tokio::test]
async fn test_rate_limit_beyond_retry_cap_yields_placeholder() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/places:searchText");
            then.status(429).header("Retry-After", "0");
        })
        .await;

    let record = places_client(&server).enrich("서울숲", None).await;

    // One initial attempt plus two retries.
    search.assert_hits_async(3).await;
    assert!(record.is_placeholder());
}
