//! Total page count discovery and paginated URL construction.

use crate::utils::error::{EtlError, Result};
use crate::utils::validation::validate_selector;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

pub fn default_last_page_selectors() -> Vec<String> {
    [
        "a.last",
        "a.btn-last",
        "a.page-last",
        "a[title*='마지막']",
        "a[aria-label*='Last']",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_pagination_selectors() -> Vec<String> {
    [".pagination a", ".paging a", "nav[aria-label*='agination'] a", "a.page-link"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCountMethod {
    LastPageLink,
    PaginationLinks,
    MarkupScan,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCount {
    pub pages: usize,
    pub method: PageCountMethod,
}

#[derive(Debug)]
pub struct PageCountDetector {
    last_page: Vec<Selector>,
    pagination: Vec<Selector>,
    page_param: String,
    markup_re: Regex,
    fallback: usize,
}

impl PageCountDetector {
    pub fn new(
        last_page_selectors: &[String],
        pagination_selectors: &[String],
        page_param: &str,
        fallback: usize,
    ) -> Result<Self> {
        let compile = |field: &str, selectors: &[String]| {
            selectors
                .iter()
                .map(|s| validate_selector(field, s))
                .collect::<Result<Vec<_>>>()
        };
        let markup_re = Regex::new(&format!(r"[?&;]{}=(\d+)", regex::escape(page_param)))
            .map_err(|e| EtlError::config(format!("page parameter pattern: {}", e)))?;

        Ok(Self {
            last_page: compile("source.last_page_selectors", last_page_selectors)?,
            pagination: compile("source.pagination_selectors", pagination_selectors)?,
            page_param: page_param.to_string(),
            markup_re,
            fallback: fallback.max(1),
        })
    }

    /// Runs the cascade: last-page link, pagination links, raw markup scan, fallback.
    pub fn detect(&self, document: &Html, raw: &str) -> PageCount {
        if let Some(pages) = self.from_last_page_link(document) {
            return PageCount {
                pages,
                method: PageCountMethod::LastPageLink,
            };
        }
        if let Some(pages) = self.from_pagination_links(document) {
            return PageCount {
                pages,
                method: PageCountMethod::PaginationLinks,
            };
        }
        if let Some(pages) = self.from_markup(raw) {
            return PageCount {
                pages,
                method: PageCountMethod::MarkupScan,
            };
        }
        PageCount {
            pages: self.fallback,
            method: PageCountMethod::Fallback,
        }
    }

    fn from_last_page_link(&self, document: &Html) -> Option<usize> {
        self.last_page.iter().find_map(|selector| {
            document
                .select(selector)
                .filter_map(|a| {
                    a.value()
                        .attr("href")
                        .and_then(|href| page_from_href(href, &self.page_param))
                        .or_else(|| page_from_text(&a.text().collect::<String>()))
                })
                .max()
        })
    }

    fn from_pagination_links(&self, document: &Html) -> Option<usize> {
        let mut pages = Vec::new();
        for selector in &self.pagination {
            for a in document.select(selector) {
                if let Some(page) = page_from_text(&a.text().collect::<String>()) {
                    pages.push(page);
                }
                if let Some(page) = a
                    .value()
                    .attr("href")
                    .and_then(|href| page_from_href(href, &self.page_param))
                {
                    pages.push(page);
                }
            }
        }
        pages.into_iter().max()
    }

    fn from_markup(&self, raw: &str) -> Option<usize> {
        self.markup_re
            .captures_iter(raw)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
            .filter(|page| *page > 0)
            .max()
    }
}

fn page_from_text(text: &str) -> Option<usize> {
    text.trim().parse::<usize>().ok().filter(|page| *page > 0)
}

/// Reads `param` from an absolute or relative href.
pub fn page_from_href(href: &str, param: &str) -> Option<usize> {
    let base = Url::parse("http://listing.invalid/").ok()?;
    let url = base.join(&href.replace("&amp;", "&")).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == param)
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .filter(|page| *page > 0)
}

/// `base` with `param=page`, replacing any existing value of `param`.
pub fn page_url(base: &Url, param: &str, page: usize) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = base.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        query.append_pair(param, &page.to_string());
    }
    url
}
