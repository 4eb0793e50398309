use crate::graph::ChartOptions;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiClient, LlmError, TextGenerator};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Settings shared by the web server and the report tool
///
/// Every value can come from the command line or from the environment; the
/// API key is handed to the client explicitly rather than read from a global.
#[derive(Args, Clone, Debug)]
pub struct DashboardConfig {
    /// Address to listen on
    #[arg(long, env = "DASHBOARD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "DASHBOARD_PORT", default_value_t = 3000)]
    pub port: u16,

    /// API key for the text-generation service
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "DASHBOARD_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, env = "DASHBOARD_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Upper bound for one text-generation call
    #[arg(long, env = "DASHBOARD_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    #[arg(long, default_value_t = 640)]
    pub chart_width: u32,

    #[arg(long, default_value_t = 420)]
    pub chart_height: u32,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "DASHBOARD_MAX_UPLOAD_MB", default_value_t = 32)]
    pub max_upload_mb: usize,

    /// Idle lifetime of a browser session
    #[arg(long, env = "DASHBOARD_SESSION_TTL_SECS", default_value_t = 24 * 60 * 60)]
    pub session_ttl_secs: u64,

    /// Directory served under /static
    #[arg(long, env = "DASHBOARD_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            chart_width: 640,
            chart_height: 420,
            max_upload_mb: 32,
            session_ttl_secs: 24 * 60 * 60,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl DashboardConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn chart_options(&self) -> ChartOptions {
        ChartOptions {
            width: self.chart_width,
            height: self.chart_height,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Build the text generator, or `None` when no API key is configured
    pub fn text_generator(&self) -> Result<Option<Arc<dyn TextGenerator>>, LlmError> {
        let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            log::warn!("GOOGLE_API_KEY is not set; AI conclusions are disabled");
            return Ok(None);
        };
        let client = GeminiClient::new(
            key.to_string(),
            &self.api_base_url,
            self.model.clone(),
            Duration::from_secs(self.request_timeout_secs),
        )?;
        Ok(Some(Arc::new(client)))
    }
}
