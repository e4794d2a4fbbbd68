//! Data-driven item extraction: an ordered list of selector strategies.
//! The first strategy that yields at least one item wins.

use crate::config::toml_config::StrategyConfig;
use crate::utils::error::Result;
use crate::utils::validation::validate_selector;
use scraper::{ElementRef, Html, Selector};

/// Everything a strategy could pull out of one listing entry, before interpretation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub href: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Text nodes of the entry, one per line.
    pub text: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig {
            item: "ul.article-list > li".to_string(),
            link: Some("a".to_string()),
            title: Some(".title, .infor-element-title, strong".to_string()),
            description: Some(".small-text, .text, p".to_string()),
        },
        StrategyConfig {
            item: "div.list-wrap li, div.article-list li".to_string(),
            link: Some("a[href]".to_string()),
            title: Some(".title, strong, h3".to_string()),
            description: Some("p".to_string()),
        },
        StrategyConfig {
            item: "li.item, div.item".to_string(),
            link: Some("a[href]".to_string()),
            title: None,
            description: None,
        },
        StrategyConfig {
            item: "a[href*='KOP']".to_string(),
            link: None,
            title: None,
            description: None,
        },
    ]
}

#[derive(Debug)]
pub struct ExtractionStrategy {
    label: String,
    item: Selector,
    link: Option<Selector>,
    title: Option<Selector>,
    description: Option<Selector>,
}

impl ExtractionStrategy {
    pub fn compile(config: &StrategyConfig) -> Result<Self> {
        let optional = |field: &str, selector: &Option<String>| -> Result<Option<Selector>> {
            selector
                .as_deref()
                .map(|s| validate_selector(field, s))
                .transpose()
        };

        Ok(Self {
            label: config.item.clone(),
            item: validate_selector("source.strategies.item", &config.item)?,
            link: optional("source.strategies.link", &config.link)?,
            title: optional("source.strategies.title", &config.title)?,
            description: optional("source.strategies.description", &config.description)?,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `None` when the item selector matches nothing usable on this page.
    pub fn extract(&self, document: &Html) -> Option<Vec<RawItem>> {
        let items: Vec<RawItem> = document
            .select(&self.item)
            .map(|element| self.extract_item(element))
            .filter(|item| item.href.is_some() || !item.text.is_empty())
            .collect();

        (!items.is_empty()).then_some(items)
    }

    fn extract_item(&self, element: ElementRef<'_>) -> RawItem {
        let link = match &self.link {
            Some(selector) => element.select(selector).next(),
            None => Some(element),
        };
        let href = link
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty() && !href.starts_with("javascript:") && *href != "#")
            .map(str::to_string);

        let (latitude, longitude) = coordinates_of(element)
            .or_else(|| link.and_then(coordinates_of))
            .unzip();

        RawItem {
            href,
            title: self.first_text(element, self.title.as_ref()),
            description: self.first_text(element, self.description.as_ref()),
            text: text_lines(element),
            latitude,
            longitude,
        }
    }

    fn first_text(&self, element: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
        let selector = selector?;
        element
            .select(selector)
            .map(|e| e.text().collect::<Vec<_>>().join(" "))
            .map(|t| super::text::collapse_whitespace(&t))
            .find(|t| !t.is_empty())
    }
}

fn text_lines(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn coordinates_of(element: ElementRef<'_>) -> Option<(f64, f64)> {
    let attr = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| element.value().attr(name))
            .and_then(|v| v.trim().parse::<f64>().ok())
    };
    let latitude = attr(&["data-lat", "data-latitude"])?;
    let longitude = attr(&["data-lng", "data-lon", "data-longitude"])?;
    Some((latitude, longitude))
}

#[derive(Debug)]
pub struct StrategyCascade {
    strategies: Vec<ExtractionStrategy>,
}

impl StrategyCascade {
    pub fn compile(configs: &[StrategyConfig]) -> Result<Self> {
        let strategies = configs
            .iter()
            .map(ExtractionStrategy::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { strategies })
    }

    pub fn extract(&self, document: &Html) -> Vec<RawItem> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            if let Some(items) = strategy.extract(document) {
                tracing::debug!(
                    "Strategy {} ('{}') matched {} items",
                    index + 1,
                    strategy.label(),
                    items.len()
                );
                return items;
            }
        }
        tracing::warn!("No extraction strategy matched any items");
        Vec::new()
    }
}
