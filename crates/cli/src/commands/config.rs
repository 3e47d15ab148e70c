use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use textback_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let auth_token = match config.sms.auth_token.as_ref() {
        Some(token) if !token.expose_secret().trim().is_empty() => "<redacted>",
        Some(_) => "<empty>",
        None => "<unset>",
    };
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        render_line(
            "database.url",
            &config.database.url,
            source("database.url", "TEXTBACK_DATABASE_URL"),
        ),
        render_line(
            "database.max_connections",
            &config.database.max_connections.to_string(),
            source("database.max_connections", "TEXTBACK_DATABASE_MAX_CONNECTIONS"),
        ),
        render_line(
            "database.timeout_secs",
            &config.database.timeout_secs.to_string(),
            source("database.timeout_secs", "TEXTBACK_DATABASE_TIMEOUT_SECS"),
        ),
        render_line(
            "sms.validate_signatures",
            &config.sms.validate_signatures.to_string(),
            source("sms.validate_signatures", "TEXTBACK_SMS_VALIDATE_SIGNATURES"),
        ),
        render_line("sms.auth_token", auth_token, source("sms.auth_token", "TEXTBACK_SMS_AUTH_TOKEN")),
        render_line(
            "sms.public_base_url",
            config.sms.public_base_url.as_deref().unwrap_or("<unset>"),
            source("sms.public_base_url", "TEXTBACK_SMS_PUBLIC_BASE_URL"),
        ),
        render_line(
            "llm.provider",
            &format!("{:?}", config.llm.provider),
            source("llm.provider", "TEXTBACK_LLM_PROVIDER"),
        ),
        render_line("llm.model", &config.llm.model, source("llm.model", "TEXTBACK_LLM_MODEL")),
        render_line(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            source("llm.base_url", "TEXTBACK_LLM_BASE_URL"),
        ),
        render_line("llm.api_key", llm_api_key, source("llm.api_key", "TEXTBACK_LLM_API_KEY")),
        render_line(
            "scheduling.enabled",
            &config.scheduling.enabled.to_string(),
            source("scheduling.enabled", "TEXTBACK_SCHEDULING_ENABLED"),
        ),
        render_line(
            "scheduling.base_url",
            config.scheduling.base_url.as_deref().unwrap_or("<unset>"),
            source("scheduling.base_url", "TEXTBACK_SCHEDULING_BASE_URL"),
        ),
        render_line(
            "engine.history_limit",
            &config.engine.history_limit.to_string(),
            source("engine.history_limit", "TEXTBACK_ENGINE_HISTORY_LIMIT"),
        ),
        render_line(
            "server.bind_address",
            &config.server.bind_address,
            source("server.bind_address", "TEXTBACK_SERVER_BIND_ADDRESS"),
        ),
        render_line(
            "server.port",
            &config.server.port.to_string(),
            source("server.port", "TEXTBACK_SERVER_PORT"),
        ),
        render_line(
            "server.health_check_port",
            &config.server.health_check_port.to_string(),
            source("server.health_check_port", "TEXTBACK_SERVER_HEALTH_CHECK_PORT"),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", "TEXTBACK_LOGGING_LEVEL"),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", "TEXTBACK_LOGGING_FORMAT"),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("textback.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/textback.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
