use leptos::logging::warn;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_poll_interval_ms() -> u32 {
    2000
}

fn default_autosave_debounce_ms() -> u32 {
    1500
}

fn default_request_timeout_ms() -> u32 {
    15_000
}

fn default_history_limit() -> u32 {
    50
}

/// Editor settings. Every key is optional; missing keys take the defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EditorConfig {
    #[serde(default = "default_api_url", alias = "API_URL")]
    pub api_url: String,

    /// Task status polling period.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u32,

    /// A slide is autosaved once its newest staged edit is this old.
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u32,

    /// Native builds only.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u32,

    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            poll_interval_ms: default_poll_interval_ms(),
            autosave_debounce_ms: default_autosave_debounce_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            history_limit: default_history_limit(),
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut v: serde_json::Value = serde_json::from_str(json)?;

        // `API_URL` (documented) wins over `api_url` when both are set.
        if let Some(obj) = v.as_object_mut() {
            if obj.contains_key("API_URL") {
                obj.remove("api_url");
            }
        }

        let mut cfg: Self = serde_json::from_value(v)?;
        cfg.api_url = cfg.api_url.trim().trim_end_matches('/').to_string();
        if cfg.api_url.is_empty() {
            cfg.api_url = default_api_url();
        }
        cfg.poll_interval_ms = cfg.poll_interval_ms.max(100);
        Ok(cfg)
    }

    /// Reads `window.ENV` in the browser and falls back to the defaults
    /// everywhere else.
    pub fn load() -> Self {
        let Some(json) = window_env_json() else {
            return Self::default();
        };
        match Self::from_json(&json) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("ignoring malformed window.ENV: {e}");
                Self::default()
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn window_env_json() -> Option<String> {
    let env = web_sys::window()?.get("ENV")?;
    if env.is_undefined() || !env.is_object() {
        return None;
    }
    js_sys::JSON::stringify(&env).ok()?.as_string()
}

#[cfg(not(target_arch = "wasm32"))]
fn window_env_json() -> Option<String> {
    None
}
