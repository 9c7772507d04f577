//! config - 配置加载库
//!
//! 加载顺序：`default.toml` → `{APP_ENV}.toml` → `APP_` 前缀的环境变量（`__` 分隔嵌套字段）。

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// 事务隔离级别：serializable | repeatable_read | read_committed
    #[serde(default = "default_isolation")]
    pub isolation: String,
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

fn default_isolation() -> String {
    "serializable".to_string()
}

/// 遥测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 分箱重组配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegroupingConfig {
    /// 养殖单元未声明行标签时使用
    #[serde(default = "default_row_labels")]
    pub default_row_labels: Vec<String>,
    /// 预览时最多建议的目标容器数
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
    /// 质量平衡容差（百分比）
    #[serde(default = "default_mass_balance_tolerance")]
    pub mass_balance_tolerance_percent: f64,
    /// 目标总数超过来源总数且超出容差时拒绝提交
    #[serde(default)]
    pub strict_mass_balance: bool,
    /// 重组编号使用的计数器名称
    #[serde(default = "default_sequence_name")]
    pub sequence_name: String,
}

fn default_row_labels() -> Vec<String> {
    vec!["DX".to_string(), "SX".to_string()]
}

fn default_suggestion_limit() -> usize {
    10
}

fn default_mass_balance_tolerance() -> f64 {
    1.0
}

fn default_sequence_name() -> String {
    "regrouping".to_string()
}

impl Default for RegroupingConfig {
    fn default() -> Self {
        Self {
            default_row_labels: default_row_labels(),
            suggestion_limit: default_suggestion_limit(),
            mass_balance_tolerance_percent: default_mass_balance_tolerance(),
            strict_mass_balance: false,
            sequence_name: default_sequence_name(),
        }
    }
}

impl RegroupingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_row_labels.is_empty() {
            return Err(ConfigError::Invalid(
                "regrouping.default_row_labels must not be empty".to_string(),
            ));
        }
        if self.mass_balance_tolerance_percent < 0.0 {
            return Err(ConfigError::Invalid(
                "regrouping.mass_balance_tolerance_percent must not be negative".to_string(),
            ));
        }
        if self.sequence_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "regrouping.sequence_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    /// 未配置时使用内存存储
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub regrouping: RegroupingConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        let figment = Figment::new()
            .merge(Serialized::default("app_env", &env))
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"));

        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.regrouping.validate()?;
        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}
