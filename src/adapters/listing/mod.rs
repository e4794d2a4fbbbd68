//! Paginated listing scraper.
//!
//! Each category is fetched page by page. Parsing is synchronous and turns
//! the document into owned records before the next request is awaited.

pub mod pagination;
pub mod strategy;
pub mod text;

use crate::adapters::http::RateLimitedClient;
use crate::config::toml_config::TomlConfig;
use crate::domain::model::{Coordinate, SourcePlace};
use crate::domain::ports::SourceFetcher;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::validate_regex;
use async_trait::async_trait;
use pagination::{page_url, PageCount, PageCountDetector};
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::sync::Arc;
use strategy::{RawItem, StrategyCascade};
use url::Url;

#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub url: Url,
}

#[derive(Debug)]
pub struct ParsedPage {
    pub places: Vec<SourcePlace>,
    pub page_count: PageCount,
    pub consent_banner: bool,
}

pub struct ListingFetcher {
    client: Arc<RateLimitedClient>,
    source_name: String,
    categories: Vec<Category>,
    strategies: StrategyCascade,
    page_counter: PageCountDetector,
    page_param: String,
    max_pages: usize,
    id_pattern: Regex,
    generic_segments: Vec<String>,
    consent_markers: Vec<String>,
    consent_cookie: Option<String>,
}

impl ListingFetcher {
    pub fn from_config(config: &TomlConfig, client: Arc<RateLimitedClient>) -> Result<Self> {
        let source = &config.source;
        let categories = source
            .categories
            .iter()
            .map(|category| {
                let url = config.category_url(category)?;
                let url = Url::parse(&url).map_err(|e| EtlError::InvalidConfigValueError {
                    field: "source.categories.path".to_string(),
                    value: url.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Category {
                    name: category.name.clone(),
                    url,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            client,
            source_name: source.name.clone(),
            categories,
            strategies: StrategyCascade::compile(&source.strategies)?,
            page_counter: PageCountDetector::new(
                &source.last_page_selectors,
                &source.pagination_selectors,
                &source.page_param,
                source.fallback_page_count,
            )?,
            page_param: source.page_param.clone(),
            max_pages: source.max_pages,
            id_pattern: validate_regex("source.id_pattern", &source.id_pattern)?,
            generic_segments: source.generic_path_segments.clone(),
            consent_markers: source.consent_markers.clone(),
            consent_cookie: source.consent_cookie.clone(),
        })
    }

    /// Parses one page into source places and a page count estimate.
    pub fn parse_page(&self, html: &str, page_url: &Url, category: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        let raw_items = self.strategies.extract(&document);
        let page_count = self.page_counter.detect(&document, html);
        let consent_banner = self
            .consent_markers
            .iter()
            .any(|marker| html.contains(marker.as_str()));

        let places = raw_items
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| {
                let place = self.source_place_from_raw(raw, page_url, category);
                if place.is_none() {
                    tracing::debug!("Skipping item {} on {}: no usable name", index + 1, page_url);
                }
                place
            })
            .collect();

        ParsedPage {
            places,
            page_count,
            consent_banner,
        }
    }

    pub fn source_place_from_raw(&self, raw: RawItem, page_url: &Url, category: &str) -> Option<SourcePlace> {
        let detail_url = raw.href.as_deref().and_then(|href| page_url.join(href).ok());

        let source_local_id = detail_url
            .as_ref()
            .map(|url| text::source_local_id(url.as_str(), &self.id_pattern))
            .unwrap_or_default();

        let name = detail_url
            .as_ref()
            .and_then(|url| text::name_from_url(url, &self.id_pattern, &self.generic_segments))
            .or_else(|| raw.title.clone().filter(|t| !t.is_empty()))
            .or_else(|| text::name_from_text(&raw.text))?;

        let description = match raw.description.as_deref() {
            Some(description) if !description.trim().is_empty() => {
                text::clean_description(description)
            }
            _ => {
                // Rendered text starts with the displayed title, which may differ from the slug.
                let displayed = raw.title.as_deref().unwrap_or(&name);
                text::extract_description(&raw.text, displayed)
                    .map(|(description, method)| {
                        tracing::trace!("Description for '{}' split by {:?}", name, method);
                        description
                    })
                    .unwrap_or_default()
            }
        };

        let mut place = SourcePlace::new(name, description, source_local_id, &self.source_name);
        place.category = category.to_string();
        place.detail_url = detail_url.map(|u| u.to_string());
        place.coordinate = Coordinate::from_parts(raw.latitude, raw.longitude);
        Some(place)
    }

    /// First page of a category, retried once with the consent cookie when a banner hides it.
    async fn fetch_first_page(&self, category: &Category) -> Result<(ParsedPage, bool)> {
        let html = self.client.get_text(category.url.as_str(), None).await?;
        let parsed = self.parse_page(&html, &category.url, &category.name);

        if !(parsed.consent_banner && parsed.places.is_empty()) {
            return Ok((parsed, false));
        }

        let Some(cookie) = self.consent_cookie.as_deref() else {
            tracing::debug!("Consent banner on {} but no consent cookie configured", category.url);
            return Ok((parsed, false));
        };

        tracing::info!("Dismissing consent banner on {}", category.url);
        match self.client.get_text(category.url.as_str(), Some(cookie)).await {
            Ok(html) => Ok((self.parse_page(&html, &category.url, &category.name), true)),
            Err(e) => {
                tracing::warn!("Could not dismiss consent banner on {}: {}", category.url, e);
                Ok((parsed, false))
            }
        }
    }

    pub async fn fetch_category(&self, category: &Category) -> Result<Vec<SourcePlace>> {
        let (first, consent_given) = self.fetch_first_page(category).await?;
        let cookie = if consent_given {
            self.consent_cookie.as_deref()
        } else {
            None
        };

        let mut total_pages = first.page_count.pages;
        if total_pages > self.max_pages {
            tracing::warn!(
                "Category '{}' claims {} pages, fetching only the first {}",
                category.name,
                total_pages,
                self.max_pages
            );
            total_pages = self.max_pages;
        }
        tracing::info!(
            "Category '{}': {} items on page 1, {} pages ({:?})",
            category.name,
            first.places.len(),
            total_pages,
            first.page_count.method
        );

        let mut places = first.places;
        for page in 2..=total_pages {
            let url = page_url(&category.url, &self.page_param, page);
            match self.client.get_text(url.as_str(), cookie).await {
                Ok(html) => {
                    let parsed = self.parse_page(&html, &url, &category.name);
                    tracing::debug!("Page {}/{}: {} items", page, total_pages, parsed.places.len());
                    places.extend(parsed.places);
                }
                Err(e) => {
                    tracing::warn!("Skipping page {} of '{}': {}", page, category.name, e);
                }
            }
        }

        Ok(places)
    }
}

#[async_trait]
impl SourceFetcher for ListingFetcher {
    async fn fetch_all(&self) -> Result<Vec<SourcePlace>> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();

        for category in &self.categories {
            match self.fetch_category(category).await {
                Ok(places) => {
                    let before = all.len();
                    for place in places {
                        if seen.insert(place.run_key()) {
                            all.push(place);
                        }
                    }
                    tracing::info!(
                        "Category '{}' contributed {} new source places",
                        category.name,
                        all.len() - before
                    );
                }
                Err(e) => {
                    tracing::warn!("Skipping category '{}': {}", category.name, e);
                }
            }
        }

        tracing::info!("Fetched {} source places from {}", all.len(), self.source_name);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::toml_config::TomlConfig;

    fn fetcher() -> ListingFetcher {
        let config = TomlConfig::from_toml_str(
            r#"
[pipeline]
name = "test"

[source]
base_url = "https://korean.visitseoul.net"

[[source.categories]]
name = "attractions"
path = "/attractions"
"#,
        )
        .unwrap();
        let client = Arc::new(RateLimitedClient::from_config(&config.http).unwrap());
        ListingFetcher::from_config(&config, client).unwrap()
    }

    #[test]
    fn test_parse_page_builds_source_places() {
        let html = r#"
<ul class="article-list">
  <li data-lat="37.5512" data-lng="126.9882">
    <a href="/attractions/N-Seoul-Tower/KOP000123">
      <span class="title">N서울타워</span>
      <span class="small-text">Iconic landmark... 리뷰 (120)</span>
    </a>
  </li>
  <li><a href="javascript:void(0)"></a></li>
</ul>
<div class="pagination"><a href="?page=1">1</a><a href="?page=4">4</a></div>"#;
        let fetcher = fetcher();
        let url = Url::parse("https://korean.visitseoul.net/attractions").unwrap();

        let parsed = fetcher.parse_page(html, &url, "attractions");

        assert_eq!(parsed.places.len(), 1);
        assert_eq!(parsed.page_count.pages, 4);
        let place = &parsed.places[0];
        assert_eq!(place.name, "N Seoul Tower");
        assert_eq!(place.short_description, "Iconic landmark...");
        assert_eq!(place.source_local_id, "KOP000123");
        assert_eq!(place.source_name, "visitseoul");
        assert_eq!(place.category, "attractions");
        assert_eq!(
            place.detail_url.as_deref(),
            Some("https://korean.visitseoul.net/attractions/N-Seoul-Tower/KOP000123")
        );
        assert_eq!(place.coordinate, Coordinate::from_parts(Some(37.5512), Some(126.9882)));
    }

    #[test]
    fn test_name_falls_back_to_text_and_description_is_split() {
        let fetcher = fetcher();
        let url = Url::parse("https://korean.visitseoul.net/attractions").unwrap();
        let raw = RawItem {
            href: Some("/attractions/KOP000777".to_string()),
            title: None,
            description: None,
            text: "서울식물원\n도시형 식물원과 공원이 결합된 공간".to_string(),
            latitude: Some(37.56),
            longitude: None,
        };

        let place = fetcher.source_place_from_raw(raw, &url, "parks").unwrap();
        assert_eq!(place.name, "서울식물원");
        assert_eq!(place.short_description, "도시형 식물원과 공원이 결합된 공간");
        assert_eq!(place.source_local_id, "KOP000777");
        assert_eq!(place.coordinate, None);
    }

    #[test]
    fn test_consent_banner_is_detected() {
        let fetcher = fetcher();
        let url = Url::parse("https://korean.visitseoul.net/attractions").unwrap();
        let parsed = fetcher.parse_page(
            r#"<div id="onetrust-banner-sdk">쿠키 동의</div>"#,
            &url,
            "attractions",
        );
        assert!(parsed.consent_banner);
        assert!(parsed.places.is_empty());
    }
}
