//! Application configuration for TenderWatch.
//!
//! User config lives at `~/.tenderwatch/tenderwatch.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TenderError};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tenderwatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tenderwatch";

// ---------------------------------------------------------------------------
// Config structs (matching tenderwatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Notice source site.
    #[serde(default)]
    pub source: SourceConfig,

    /// Fetch cascade tuning.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Headless renderer (Browserless).
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Completion service (Ollama).
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Local database.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-run defaults.
    #[serde(default)]
    pub run: RunDefaultsConfig,

    /// Input quality gate thresholds and signal keywords.
    #[serde(default)]
    pub quality: QualityConfig,

    /// Decision engine tuning.
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Company profile driving the rule scorer and the prompt.
    #[serde(default)]
    pub profile: ProfileConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Site root, used to resolve relative links and API paths.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the notice list page.
    #[serde(default = "default_list_path")]
    pub list_path: String,

    /// Detail page path for an item id; `{id}` is substituted.
    #[serde(default = "default_detail_path")]
    pub detail_path: String,

    /// Candidate JSON list endpoints, tried in order.
    #[serde(default = "default_api_paths")]
    pub api_paths: Vec<String>,

    /// Page size used while probing endpoints.
    #[serde(default = "default_discovery_page_size")]
    pub discovery_page_size: u32,

    /// Page size used once an endpoint is accepted.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum API list pages read per run.
    #[serde(default = "default_max_list_pages")]
    pub max_list_pages: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            list_path: default_list_path(),
            detail_path: default_detail_path(),
            api_paths: default_api_paths(),
            discovery_page_size: default_discovery_page_size(),
            page_size: default_page_size(),
            max_list_pages: default_max_list_pages(),
        }
    }
}

impl SourceConfig {
    /// Parsed site root.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| TenderError::config(format!("invalid source.base_url: {e}")))
    }

    /// Absolute URL of the notice list page.
    pub fn list_url(&self) -> Result<Url> {
        self.base_url()?
            .join(&self.list_path)
            .map_err(|e| TenderError::config(format!("invalid source.list_path: {e}")))
    }

    /// Absolute detail URL for a source item id.
    pub fn detail_url(&self, id: &str) -> Result<Url> {
        let path = self.detail_path.replace("{id}", id);
        self.base_url()?
            .join(&path)
            .map_err(|e| TenderError::config(format!("invalid source.detail_path: {e}")))
    }
}

fn default_base_url() -> String {
    "https://bid.powerchina.cn".into()
}
fn default_list_path() -> String {
    "/consult/notice".into()
}
fn default_detail_path() -> String {
    "/consult/notice/{id}".into()
}
fn default_api_paths() -> Vec<String> {
    vec![
        "/api/consult/notice/list".into(),
        "/api/notice/list".into(),
        "/api/tender/list".into(),
        "/consult/api/notice/list".into(),
    ]
}
fn default_discovery_page_size() -> u32 {
    10
}
fn default_page_size() -> u32 {
    20
}
fn default_max_list_pages() -> u32 {
    3
}

/// Timeout and retry settings for one fetch tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierConfig {
    /// Per-attempt timeout.
    pub timeout_secs: u64,
    /// Attempts before the tier gives up (at least 1).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff_ms: u64,
}

impl TierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Content shorter than this (in characters) is rejected and the next tier is tried.
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,

    /// Politeness delay between notices.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// User-Agent header for direct and API requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_direct_tier")]
    pub direct: TierConfig,

    #[serde(default = "default_api_tier")]
    pub api: TierConfig,

    #[serde(default = "default_render_tier")]
    pub render: TierConfig,

    #[serde(default = "default_render_tier")]
    pub interactive: TierConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_content_len: default_min_content_len(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: default_user_agent(),
            direct: default_direct_tier(),
            api: default_api_tier(),
            render: default_render_tier(),
            interactive: default_render_tier(),
        }
    }
}

fn default_min_content_len() -> usize {
    1000
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    concat!(
        "Mozilla/5.0 (compatible; TenderWatch/",
        env!("CARGO_PKG_VERSION"),
        ")"
    )
    .into()
}
fn default_direct_tier() -> TierConfig {
    TierConfig {
        timeout_secs: 30,
        max_attempts: 2,
        backoff_ms: 1000,
    }
}
fn default_api_tier() -> TierConfig {
    TierConfig {
        timeout_secs: 15,
        max_attempts: 1,
        backoff_ms: 0,
    }
}
fn default_render_tier() -> TierConfig {
    TierConfig {
        timeout_secs: 60,
        max_attempts: 2,
        backoff_ms: 2000,
    }
}

/// `[renderer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Browserless base URL. Rendering tiers are skipped when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Name of the env var holding the Browserless token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Run the browser headless.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Navigation timeout inside the browser.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: default_token_env(),
            headless: true,
            navigation_timeout_secs: default_navigation_timeout(),
        }
    }
}

impl RendererConfig {
    /// Token read from the configured env var, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

fn default_token_env() -> String {
    "BROWSERLESS_TOKEN".into()
}
fn default_true() -> bool {
    true
}
fn default_navigation_timeout() -> u64 {
    45
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Ollama base URL.
    #[serde(default = "default_completion_url")]
    pub base_url: String,

    /// Model name passed to `/api/generate`.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_completion_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_completion_backoff")]
    pub backoff_ms: u64,

    /// Notice text beyond this many characters is cut from the prompt.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_url(),
            model: default_model(),
            timeout_secs: default_completion_timeout(),
            max_attempts: default_completion_attempts(),
            backoff_ms: default_completion_backoff(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

impl CompletionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

fn default_completion_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "qwen2.5:0.5b".into()
}
fn default_completion_timeout() -> u64 {
    60
}
fn default_completion_attempts() -> u32 {
    2
}
fn default_completion_backoff() -> u64 {
    1000
}
fn default_max_prompt_chars() -> usize {
    3000
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; a leading `~/` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Database path with `~/` expanded.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.db_path)
    }
}

fn default_db_path() -> String {
    "~/.tenderwatch/notices.db".into()
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefaultsConfig {
    /// Maximum notices processed per run.
    #[serde(default = "default_max_notices")]
    pub max_notices: usize,

    /// Consult the decision engine.
    #[serde(default = "default_true")]
    pub analyze: bool,

    /// Write results to the store.
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Notices processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Directory for the recommendations CSV and Markdown digests.
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

impl Default for RunDefaultsConfig {
    fn default() -> Self {
        Self {
            max_notices: default_max_notices(),
            analyze: true,
            persist: true,
            concurrency: default_concurrency(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_max_notices() -> usize {
    10
}
fn default_concurrency() -> usize {
    1
}
fn default_report_dir() -> String {
    "reports".into()
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum normalized text length, in characters.
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,

    /// Minimum number of key-field signals.
    #[serde(default = "default_min_key_fields")]
    pub min_key_fields: usize,

    #[serde(default = "default_location_keywords")]
    pub location_keywords: Vec<String>,

    #[serde(default = "default_qualification_keywords")]
    pub qualification_keywords: Vec<String>,

    #[serde(default = "default_scope_keywords")]
    pub scope_keywords: Vec<String>,

    /// Regexes signalling a deadline.
    #[serde(default = "default_deadline_patterns")]
    pub deadline_patterns: Vec<String>,

    /// Regexes signalling a tonnage (tracked, not required).
    #[serde(default = "default_tonnage_patterns")]
    pub tonnage_patterns: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_text_len: default_min_text_len(),
            min_key_fields: default_min_key_fields(),
            location_keywords: default_location_keywords(),
            qualification_keywords: default_qualification_keywords(),
            scope_keywords: default_scope_keywords(),
            deadline_patterns: default_deadline_patterns(),
            tonnage_patterns: default_tonnage_patterns(),
        }
    }
}

fn default_min_text_len() -> usize {
    300
}
fn default_min_key_fields() -> usize {
    2
}
fn default_location_keywords() -> Vec<String> {
    strings(&["地点", "位于", "建设地点", "项目地点", "工程地点", "施工地点"])
}
fn default_qualification_keywords() -> Vec<String> {
    strings(&["资质", "资格", "专业承包", "施工资质", "资质要求", "资格要求"])
}
fn default_scope_keywords() -> Vec<String> {
    strings(&["项目内容", "建设内容", "工程内容", "范围", "工程范围", "施工范围"])
}
fn default_deadline_patterns() -> Vec<String> {
    strings(&[
        "投标截止",
        "开标时间",
        "报名截止",
        "截止时间",
        r"\d{4}[-/]\d{1,2}[-/]\d{1,2}.*(?:前|之前)",
    ])
}
fn default_tonnage_patterns() -> Vec<String> {
    strings(&[r"\d+(?:\.\d+)?\s*[吨tT]", "吨位", "用钢量"])
}

/// `[decision]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Skip the model when the rule engine judges a clear mismatch.
    #[serde(default = "default_true")]
    pub shortcut_mismatch: bool,

    /// Summary phrases that mean the model lacked information (matched case-insensitively).
    #[serde(default = "default_insufficient_indicators")]
    pub insufficient_indicators: Vec<String>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            shortcut_mismatch: true,
            insufficient_indicators: default_insufficient_indicators(),
        }
    }
}

fn default_insufficient_indicators() -> Vec<String> {
    strings(&[
        "信息不足",
        "信息不全",
        "无法判断",
        "无法确认",
        "不明确",
        "insufficient",
        "not enough information",
        "unclear",
        "cannot confirm",
    ])
}

/// Named keyword group, e.g. a region or a qualification category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Priority region with the points it contributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRule {
    pub name: String,
    pub score: u32,
    pub keywords: Vec<String>,
}

/// Acceptable and optimal tonnage band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScaleRange {
    pub min: f64,
    pub max: f64,
    pub optimal_min: f64,
    pub optimal_max: f64,
    pub target: f64,
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self {
            min: 200.0,
            max: 3000.0,
            optimal_min: 800.0,
            optimal_max: 1200.0,
            target: 1000.0,
        }
    }
}

/// `[profile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_company_name")]
    pub company_name: String,

    /// Keywords earning the scope preference bonus.
    #[serde(default = "default_preference_keywords")]
    pub preference_keywords: Vec<String>,

    #[serde(default)]
    pub scale: ScaleRange,

    /// Regions in priority order.
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionRule>,

    /// Project-type keyword groups.
    #[serde(default = "default_project_groups")]
    pub project_groups: Vec<KeywordGroup>,

    /// Qualification categories, each worth a fixed number of points.
    #[serde(default = "default_qualification_categories")]
    pub qualification_categories: Vec<KeywordGroup>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            company_name: default_company_name(),
            preference_keywords: default_preference_keywords(),
            scale: ScaleRange::default(),
            regions: default_regions(),
            project_groups: default_project_groups(),
            qualification_categories: default_qualification_categories(),
        }
    }
}

fn default_company_name() -> String {
    "Steel structure fabricator".into()
}
fn default_preference_keywords() -> Vec<String> {
    strings(&["制作安装", "钢结构制作", "钢结构安装", "专业分包", "加工制作", "钢构件"])
}
fn default_regions() -> Vec<RegionRule> {
    let region = |name: &str, score, keywords: &[&str]| RegionRule {
        name: name.into(),
        score,
        keywords: strings(keywords),
    };
    vec![
        region("四川", 30, &["四川", "成都", "绵阳", "德阳", "宜宾", "泸州", "乐山", "南充"]),
        region("重庆", 25, &["重庆"]),
        region("贵州", 20, &["贵州", "贵阳", "遵义"]),
        region("云南", 20, &["云南", "昆明"]),
        region("西北", 10, &["陕西", "西安", "甘肃", "兰州"]),
    ]
}
fn default_project_groups() -> Vec<KeywordGroup> {
    let group = |name: &str, keywords: &[&str]| KeywordGroup {
        name: name.into(),
        keywords: strings(keywords),
    };
    vec![
        group("厂房", &["钢结构厂房", "厂房", "仓库", "车间"]),
        group("场馆", &["体育馆", "展览馆", "会展中心", "场馆"]),
        group("桥梁", &["钢桥", "钢箱梁", "桥梁钢结构"]),
        group("电力", &["光伏支架", "钢结构支架", "输电塔", "变电站构架"]),
        group("钢结构", &["钢结构"]),
    ]
}
fn default_qualification_categories() -> Vec<KeywordGroup> {
    let group = |name: &str, keywords: &[&str]| KeywordGroup {
        name: name.into(),
        keywords: strings(keywords),
    };
    vec![
        group("钢结构专业承包", &["钢结构工程专业承包", "钢结构专业承包"]),
        group("建筑总承包", &["建筑工程施工总承包"]),
        group("安全生产许可", &["安全生产许可证"]),
        group("质量体系", &["ISO9001", "质量管理体系"]),
    ]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime run configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum notices processed.
    pub max_notices: usize,
    /// Consult the decision engine for changed notices.
    pub analyze: bool,
    /// Write results to the store.
    pub persist: bool,
    /// Reprocess notices whose content hash is unchanged.
    pub force: bool,
    /// Notices processed at the same time (at least 1).
    pub concurrency: usize,
    /// Politeness delay before each notice.
    pub request_delay: Duration,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_notices: config.run.max_notices,
            analyze: config.run.analyze,
            persist: config.run.persist,
            force: false,
            concurrency: config.run.concurrency.max(1),
            request_delay: Duration::from_millis(config.fetch.request_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tenderwatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| TenderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tenderwatch/tenderwatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TenderError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| TenderError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TenderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TenderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TenderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    config.source.list_url()?;

    let scale = &config.profile.scale;
    let ordered = scale.min < scale.optimal_min
        && scale.optimal_min <= scale.target
        && scale.target <= scale.optimal_max
        && scale.optimal_max < scale.max;
    if !ordered {
        return Err(TenderError::config(
            "profile.scale must satisfy min < optimal_min <= target <= optimal_max < max",
        ));
    }

    for pattern in config
        .quality
        .deadline_patterns
        .iter()
        .chain(&config.quality.tonnage_patterns)
    {
        regex::Regex::new(pattern)
            .map_err(|e| TenderError::config(format!("invalid quality pattern {pattern:?}: {e}")))?;
    }

    if let Some(endpoint) = &config.renderer.endpoint {
        Url::parse(endpoint)
            .map_err(|e| TenderError::config(format!("invalid renderer.endpoint: {e}")))?;
    }

    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| TenderError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("qwen2.5:0.5b"));
        assert!(toml_str.contains("BROWSERLESS_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.fetch.min_content_len, 1000);
        assert_eq!(parsed.quality.min_text_len, 300);
        assert_eq!(parsed.profile.regions.len(), config.profile.regions.len());
        assert_eq!(parsed.profile.scale.target, 1000.0);
        validate_config(&parsed).expect("defaults are valid");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[completion]
model = "qwen2.5:7b"

[renderer]
endpoint = "http://localhost:3000"

[[profile.regions]]
name = "湖北"
score = 15
keywords = ["湖北", "武汉"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.completion.model, "qwen2.5:7b");
        assert_eq!(config.completion.timeout_secs, 60);
        assert_eq!(config.renderer.endpoint.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.profile.regions.len(), 1);
        assert_eq!(config.profile.regions[0].keywords[1], "武汉");
        assert!(!config.profile.project_groups.is_empty());
    }

    #[test]
    fn source_urls_resolve() {
        let source = SourceConfig::default();
        assert_eq!(
            source.list_url().unwrap().as_str(),
            "https://bid.powerchina.cn/consult/notice"
        );
        assert_eq!(
            source.detail_url("42").unwrap().as_str(),
            "https://bid.powerchina.cn/consult/notice/42"
        );
    }

    #[test]
    fn run_config_from_app_config() {
        let mut app = AppConfig::default();
        app.run.concurrency = 0;
        let run = RunConfig::from(&app);
        assert_eq!(run.max_notices, 10);
        assert_eq!(run.concurrency, 1);
        assert_eq!(run.request_delay, Duration::from_millis(1000));
        assert!(run.analyze && run.persist && !run.force);
    }

    #[test]
    fn invalid_scale_rejected() {
        let mut config = AppConfig::default();
        config.profile.scale.optimal_min = 100.0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("profile.scale"));
    }

    #[test]
    fn invalid_pattern_rejected() {
        let mut config = AppConfig::default();
        config.quality.deadline_patterns.push("(unclosed".into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/x.db").unwrap(), PathBuf::from("/tmp/x.db"));
        assert!(expand_home("~/x.db").unwrap().ends_with("x.db"));
    }
}
