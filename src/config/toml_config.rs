use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Enrich sources that already carry a coordinate first.
    #[serde(default = "default_true")]
    pub sort_by_coordinates: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            request_delay_ms: default_request_delay_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_name")]
    pub name: String,
    pub base_url: String,
    pub categories: Vec<CategoryConfig>,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_fallback_page_count")]
    pub fallback_page_count: usize,
    /// Upper bound on pages fetched per category, whatever the listing claims.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_id_pattern")]
    pub id_pattern: String,
    #[serde(default = "crate::adapters::listing::strategy::default_strategies")]
    pub strategies: Vec<StrategyConfig>,
    #[serde(default = "crate::adapters::listing::pagination::default_last_page_selectors")]
    pub last_page_selectors: Vec<String>,
    #[serde(default = "crate::adapters::listing::pagination::default_pagination_selectors")]
    pub pagination_selectors: Vec<String>,
    #[serde(default = "default_consent_markers")]
    pub consent_markers: Vec<String>,
    #[serde(default)]
    pub consent_cookie: Option<String>,
    /// Path segments that never carry a place name (e.g. `attractions`, `ko`).
    #[serde(default = "default_generic_segments")]
    pub generic_path_segments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub path: String,
}

/// One item-extraction strategy: CSS selectors tried as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub item: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CenterConfig {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_enrichment_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_location_context")]
    pub location_context: String,
    #[serde(default = "default_context_aliases")]
    pub context_aliases: Vec<String>,
    #[serde(default = "default_region_center")]
    pub region_center: CenterConfig,
    #[serde(default = "default_region_radius_m")]
    pub region_radius_m: f64,
    #[serde(default = "default_point_radius_m")]
    pub point_radius_m: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_enrichment_endpoint(),
            api_key: None,
            language: default_language(),
            location_context: default_location_context(),
            context_aliases: default_context_aliases(),
            region_center: default_region_center(),
            region_radius_m: default_region_radius_m(),
            point_radius_m: default_point_radius_m(),
            max_candidates: default_max_candidates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
    #[serde(default = "default_document")]
    pub document: String,
    #[serde(default = "default_min_description_len")]
    pub min_description_len: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            document: default_document(),
            min_description_len: default_min_description_len(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_connect_timeout_seconds() -> u64 {
    10
}
fn default_request_delay_ms() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_user_agent() -> String {
    concat!("place-etl/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_source_name() -> String {
    "visitseoul".to_string()
}
fn default_page_param() -> String {
    "page".to_string()
}
fn default_fallback_page_count() -> usize {
    5
}
fn default_max_pages() -> usize {
    200
}
fn default_id_pattern() -> String {
    "KOP[0-9A-Za-z]+".to_string()
}
fn default_consent_markers() -> Vec<String> {
    vec![
        "onetrust-banner-sdk".to_string(),
        "cookie-consent".to_string(),
        "cookieConsent".to_string(),
    ]
}
fn default_generic_segments() -> Vec<String> {
    ["ko", "en", "ja", "zh", "attractions", "attraction", "detail", "view", "place", "places"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_enrichment_endpoint() -> String {
    "https://places.googleapis.com/v1/places:searchText".to_string()
}
fn default_language() -> String {
    "ko".to_string()
}
fn default_location_context() -> String {
    "서울".to_string()
}
fn default_context_aliases() -> Vec<String> {
    vec!["seoul".to_string()]
}
fn default_region_center() -> CenterConfig {
    CenterConfig {
        latitude: 37.5665,
        longitude: 126.9780,
    }
}
fn default_region_radius_m() -> f64 {
    20_000.0
}
fn default_point_radius_m() -> f64 {
    1_000.0
}
fn default_max_candidates() -> usize {
    5
}
fn default_storage_path() -> String {
    "./data".to_string()
}
fn default_document() -> String {
    "places.json".to_string()
}
fn default_min_description_len() -> usize {
    crate::core::dedup::DEFAULT_MIN_DESCRIPTION_LEN
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PLACES_API_KEY})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::config(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validation::validate_url("source.base_url", &self.source.base_url)?;
        validation::validate_non_empty_string("source.page_param", &self.source.page_param)?;
        validation::validate_positive_number(
            "source.fallback_page_count",
            self.source.fallback_page_count,
            1,
        )?;
        validation::validate_positive_number("source.max_pages", self.source.max_pages, 1)?;
        validation::validate_regex("source.id_pattern", &self.source.id_pattern)?;

        if self.source.categories.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "source.categories".to_string(),
            });
        }
        for category in &self.source.categories {
            validation::validate_non_empty_string("source.categories.name", &category.name)?;
            validation::validate_url("source.categories.path", &self.category_url(category)?)?;
        }

        if self.source.strategies.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "source.strategies".to_string(),
            });
        }
        for strategy in &self.source.strategies {
            validation::validate_selector("source.strategies.item", &strategy.item)?;
            for selector in [&strategy.link, &strategy.title, &strategy.description]
                .into_iter()
                .flatten()
            {
                validation::validate_selector("source.strategies", selector)?;
            }
        }
        for selector in self
            .source
            .last_page_selectors
            .iter()
            .chain(self.source.pagination_selectors.iter())
        {
            validation::validate_selector("source.pagination", selector)?;
        }

        validation::validate_url("enrichment.endpoint", &self.enrichment.endpoint)?;
        validation::validate_range(
            "enrichment.region_center.latitude",
            self.enrichment.region_center.latitude,
            -90.0,
            90.0,
        )?;
        validation::validate_range(
            "enrichment.region_center.longitude",
            self.enrichment.region_center.longitude,
            -180.0,
            180.0,
        )?;
        validation::validate_range(
            "enrichment.region_radius_m",
            self.enrichment.region_radius_m,
            1.0,
            50_000.0,
        )?;
        validation::validate_range(
            "enrichment.point_radius_m",
            self.enrichment.point_radius_m,
            1.0,
            50_000.0,
        )?;
        validation::validate_positive_number(
            "enrichment.max_candidates",
            self.enrichment.max_candidates,
            1,
        )?;

        validation::validate_path("storage.path", &self.storage.path)?;
        validation::validate_path("storage.document", &self.storage.document)?;
        validation::validate_positive_number("http.timeout_seconds", self.http.timeout_seconds as usize, 1)?;

        Ok(())
    }

    /// Absolute listing URL of a category.
    pub fn category_url(&self, category: &CategoryConfig) -> Result<String> {
        let base = url::Url::parse(&self.source.base_url).map_err(|e| {
            EtlError::InvalidConfigValueError {
                field: "source.base_url".to_string(),
                value: self.source.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        base.join(&category.path)
            .map(|u| u.to_string())
            .map_err(|e| EtlError::InvalidConfigValueError {
                field: "source.categories.path".to_string(),
                value: category.path.clone(),
                reason: e.to_string(),
            })
    }

    /// The API key, unless it is blank or an unresolved `${VAR}` placeholder.
    pub fn api_key(&self) -> Option<&str> {
        self.enrichment
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !(key.starts_with("${") && key.ends_with('}')))
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[pipeline]
name = "seoul-places"

[source]
base_url = "https://korean.visitseoul.net"

[[source.categories]]
name = "attractions"
path = "/attractions"
"#;

    #[test]
    fn test_parse_basic_toml_config_with_defaults() {
        let config = TomlConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.pipeline.name, "seoul-places");
        assert!(config.pipeline.sort_by_coordinates);
        assert_eq!(config.source.name, "visitseoul");
        assert_eq!(config.source.page_param, "page");
        assert_eq!(config.source.fallback_page_count, 5);
        assert_eq!(config.source.max_pages, 200);
        assert_eq!(config.source.strategies.len(), 4);
        assert_eq!(config.http.request_delay_ms, 250);
        assert_eq!(config.storage.min_description_len, 50);
        assert_eq!(config.enrichment.location_context, "서울");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.category_url(&config.source.categories[0]).unwrap(),
            "https://korean.visitseoul.net/attractions"
        );
    }

    #[test]
    fn test_env_var_substitution_for_api_key() {
        std::env::set_var("PLACE_ETL_TEST_KEY", "secret-key");

        let toml_content = format!(
            "{}\n[enrichment]\napi_key = \"${{PLACE_ETL_TEST_KEY}}\"\n",
            BASIC
        );
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(config.api_key(), Some("secret-key"));

        std::env::remove_var("PLACE_ETL_TEST_KEY");
    }

    #[test]
    fn test_unresolved_api_key_is_treated_as_missing() {
        let toml_content = format!(
            "{}\n[enrichment]\napi_key = \"${{PLACE_ETL_SURELY_UNSET_VAR}}\"\n",
            BASIC
        );
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(config.api_key(), None);

        let blank = format!("{}\n[enrichment]\napi_key = \"  \"\n", BASIC);
        assert_eq!(TomlConfig::from_toml_str(&blank).unwrap().api_key(), None);
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let bad_url = BASIC.replace("https://korean.visitseoul.net", "not-a-url");
        assert!(TomlConfig::from_toml_str(&bad_url).unwrap().validate().is_err());

        let bad_selector = format!(
            "{}\n[[source.strategies]]\nitem = \"li..broken\"\n",
            BASIC
        );
        assert!(TomlConfig::from_toml_str(&bad_selector)
            .unwrap()
            .validate()
            .is_err());

        let no_categories = r#"
[pipeline]
name = "x"

[source]
base_url = "https://example.com"
categories = []
"#;
        let err = TomlConfig::from_toml_str(no_categories)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, EtlError::MissingConfigError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.name, "seoul-places");
    }
}
