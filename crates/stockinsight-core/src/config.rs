//! Process configuration read from environment variables.
//!
//! Every key has a default so an empty environment yields a runnable
//! (if unconfigured) service. API keys are stored but never logged.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// LLM vendors the generator can route between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmVendor {
    OpenAi,
    Anthropic,
}

impl LlmVendor {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub const fn other(self) -> Self {
        match self {
            Self::OpenAi => Self::Anthropic,
            Self::Anthropic => Self::OpenAi,
        }
    }
}

impl FromStr for LlmVendor {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            _ => Err("expected openai or anthropic"),
        }
    }
}

/// Payment processor selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentVendor {
    PortOne,
    LemonSqueezy,
    Disabled,
}

impl PaymentVendor {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PortOne => "portone",
            Self::LemonSqueezy => "lemonsqueezy",
            Self::Disabled => "none",
        }
    }
}

impl FromStr for PaymentVendor {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "portone" | "iamport" => Ok(Self::PortOne),
            "lemonsqueezy" | "lemon_squeezy" => Ok(Self::LemonSqueezy),
            "none" | "" => Ok(Self::Disabled),
            _ => Err("expected portone, lemonsqueezy or none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub max_history: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDataConfig {
    pub finnhub_api_key: String,
    pub quote_ttl: Duration,
    pub directory_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub openai_api_key: String,
    pub openai_model: String,
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    pub primary: LlmVendor,
    pub breaker_threshold: u32,
    pub breaker_recovery: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOneConfig {
    pub api_key: String,
    pub api_secret: String,
    pub merchant_id: String,
    pub pg_provider: String,
    pub channel_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LemonSqueezyConfig {
    pub api_key: String,
    pub store_id: String,
    pub variant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub vendor: PaymentVendor,
    pub required: bool,
    pub price: i64,
    pub product_name: String,
    pub expectation_ttl: Duration,
    pub refund_max_retries: u32,
    pub portone: PortOneConfig,
    pub lemonsqueezy: LemonSqueezyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub market_data: MarketDataConfig,
    pub llm: LlmConfig,
    pub payment: PaymentConfig,
}

const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:3000,http://localhost:3001,http://127.0.0.1:3000,http://127.0.0.1:3001";

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let text = |key: &str, default: &str| read(key).unwrap_or_else(|| default.to_owned());

        let home = read("STOCKINSIGHT_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_home(read("HOME")));
        let db_path = read("STOCKINSIGHT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("insights.duckdb"));

        Ok(Self {
            server: ServerConfig {
                host: text("API_HOST", "0.0.0.0"),
                port: parse_or("API_PORT", read("API_PORT"), 8000)?,
                cors_origins: split_list(&text("CORS_ORIGINS", DEFAULT_CORS_ORIGINS)),
            },
            storage: StorageConfig {
                home,
                db_path,
                max_history: parse_or("ANALYSIS_MAX_HISTORY", read("ANALYSIS_MAX_HISTORY"), 100)?,
            },
            market_data: MarketDataConfig {
                finnhub_api_key: read("FINNHUB_API")
                    .or_else(|| read("FINNHUB_API_KEY"))
                    .unwrap_or_default(),
                quote_ttl: Duration::from_secs(parse_or(
                    "QUOTE_CACHE_TTL_SECS",
                    read("QUOTE_CACHE_TTL_SECS"),
                    300,
                )?),
                directory_ttl: Duration::from_secs(
                    parse_or::<u64>("DIRECTORY_TTL_HOURS", read("DIRECTORY_TTL_HOURS"), 24)? * 3600,
                ),
            },
            llm: LlmConfig {
                openai_api_key: text("OPENAI_API_KEY", ""),
                openai_model: text("OPENAI_DEFAULT_MODEL", "gpt-5-mini"),
                anthropic_api_key: text("ANTHROPIC_API_KEY", ""),
                anthropic_model: text("ANTHROPIC_DEFAULT_MODEL", "claude-3-5-sonnet-20241022"),
                primary: parse_or(
                    "LLM_PRIMARY_PROVIDER",
                    read("LLM_PRIMARY_PROVIDER"),
                    LlmVendor::OpenAi,
                )?,
                breaker_threshold: parse_or(
                    "LLM_CIRCUIT_BREAKER_THRESHOLD",
                    read("LLM_CIRCUIT_BREAKER_THRESHOLD"),
                    3,
                )?,
                breaker_recovery: Duration::from_secs(
                    parse_or::<u64>(
                        "LLM_CIRCUIT_BREAKER_RECOVERY_MINUTES",
                        read("LLM_CIRCUIT_BREAKER_RECOVERY_MINUTES"),
                        5,
                    )? * 60,
                ),
            },
            payment: PaymentConfig {
                vendor: parse_or(
                    "PAYMENT_PROVIDER",
                    read("PAYMENT_PROVIDER"),
                    PaymentVendor::PortOne,
                )?,
                required: parse_flag("PAYMENT_REQUIRED", read("PAYMENT_REQUIRED"))?,
                price: parse_or("ANALYSIS_PRICE", read("ANALYSIS_PRICE"), 1000)?,
                product_name: text("ANALYSIS_PRODUCT_NAME", "Stock Deep Research"),
                expectation_ttl: Duration::from_secs(
                    parse_or::<u64>(
                        "PAYMENT_EXPECTATION_TTL_MINUTES",
                        read("PAYMENT_EXPECTATION_TTL_MINUTES"),
                        30,
                    )? * 60,
                ),
                refund_max_retries: parse_or("REFUND_MAX_RETRIES", read("REFUND_MAX_RETRIES"), 0)?,
                portone: PortOneConfig {
                    api_key: text("PORTONE_API_KEY", ""),
                    api_secret: text("PORTONE_API_SECRET", ""),
                    merchant_id: text("PORTONE_MERCHANT_ID", ""),
                    pg_provider: text("PORTONE_PG_PROVIDER", "html5_inicis"),
                    channel_key: text("PORTONE_CHANNEL_KEY", ""),
                },
                lemonsqueezy: LemonSqueezyConfig {
                    api_key: text("LEMONSQUEEZY_API_KEY", ""),
                    store_id: text("LEMONSQUEEZY_STORE_ID", ""),
                    variant_id: text("LEMONSQUEEZY_VARIANT_ID", ""),
                },
            },
        })
    }
}

fn default_home(user_home: Option<String>) -> PathBuf {
    user_home
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stockinsight")
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError {
            key,
            value,
            reason: "unparseable value",
        }),
    }
}

fn parse_flag(key: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            key,
            value,
            reason: "expected a boolean",
        }),
    }
}
