//! Server configuration types
//!
//! Contains all configuration structures for the Atelier server.

use crate::middleware::bot_guard::BotProtectionSettings;
use crate::middleware::rate_limit::RateLimitSettings;
use atelier_imaging::{FalConfig, InferenceConfig};
use atelier_tools::ImagingSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub imaging: ImagingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub bot_protection: BotProtectionSettings,
    #[serde(default)]
    pub test_mode: TestModeConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Chat model settings
///
/// The API key is read from `OPENAI_API_KEY`, never from files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on model steps per chat turn
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_model() -> String {
    atelier_core::orchestrator::DEFAULT_MODEL.to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_steps() -> usize {
    atelier_core::DEFAULT_MAX_STEPS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            timeout_secs: default_llm_timeout(),
            max_steps: default_max_steps(),
            temperature: None,
        }
    }
}

/// Image provider settings
///
/// The shared project key is read from `FAL_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagingConfig {
    #[serde(default = "default_imaging_base_url")]
    pub base_url: String,
    #[serde(default = "default_storage_url")]
    pub storage_url: String,
    #[serde(default = "default_create_endpoint")]
    pub create_endpoint: String,
    #[serde(default = "default_edit_endpoint")]
    pub edit_endpoint: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub inference: InferenceConfig,
}

fn default_imaging_base_url() -> String {
    atelier_imaging::fal::DEFAULT_BASE_URL.to_string()
}

fn default_storage_url() -> String {
    atelier_imaging::fal::DEFAULT_STORAGE_URL.to_string()
}

fn default_create_endpoint() -> String {
    atelier_tools::generation::DEFAULT_CREATE_ENDPOINT.to_string()
}

fn default_edit_endpoint() -> String {
    atelier_tools::generation::DEFAULT_EDIT_ENDPOINT.to_string()
}

fn default_fetch_timeout() -> u64 {
    atelier_imaging::fetch::DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            base_url: default_imaging_base_url(),
            storage_url: default_storage_url(),
            create_endpoint: default_create_endpoint(),
            edit_endpoint: default_edit_endpoint(),
            fetch_timeout_secs: default_fetch_timeout(),
            request_timeout_secs: default_request_timeout(),
            inference: InferenceConfig::default(),
        }
    }
}

impl ImagingConfig {
    /// Client template for `FalClientFactory` (the key is replaced per request)
    pub fn fal_config(&self, api_key: &str) -> FalConfig {
        FalConfig::new(api_key)
            .with_base_url(&self.base_url)
            .with_storage_url(&self.storage_url)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout_secs))
    }

    /// Endpoints and sampler settings handed to the image tools
    pub fn settings(&self) -> ImagingSettings {
        ImagingSettings {
            create_endpoint: self.create_endpoint.clone(),
            edit_endpoint: self.edit_endpoint.clone(),
            inference: self.inference.clone(),
        }
    }
}

/// Offline mode: the image provider is simulated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestModeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_mock_image_url")]
    pub mock_image_url: String,
}

fn default_delay_ms() -> u64 {
    atelier_imaging::simulated::DEFAULT_DELAY_MS
}

fn default_mock_image_url() -> String {
    atelier_imaging::simulated::DEFAULT_MOCK_IMAGE_URL.to_string()
}

impl Default for TestModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: default_delay_ms(),
            mock_image_url: default_mock_image_url(),
        }
    }
}
