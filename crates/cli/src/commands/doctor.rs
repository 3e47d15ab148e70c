use secrecy::ExposeSecret;
use serde::Serialize;
use textback_core::config::{AppConfig, LlmProvider, LoadOptions};
use textback_db::{connect_with_settings, migrations};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| {
            r#"{"overall_status":"fail","summary":"doctor report serialization failed"}"#
                .to_string()
        })
    } else {
        render_human(&report)
    }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            },
            signature_readiness(&config),
            database_connectivity(&config),
            llm_readiness(&config),
        ],
        Err(error) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
            skipped("signature_readiness"),
            skipped("database_connectivity"),
            skipped("llm_readiness"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    DoctorReport {
        overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        },
        checks,
    }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn signature_readiness(config: &AppConfig) -> DoctorCheck {
    let details = if config.sms.validate_signatures {
        "signature enforcement enabled; auth token and public base URL are set".to_string()
    } else {
        "signature enforcement disabled; inbound webhooks are accepted unsigned".to_string()
    };
    DoctorCheck { name: "signature_readiness", status: CheckStatus::Pass, details }
}

/// Connects, then reports how much of the shipped schema the database has
/// already seen. A fresh database is still a pass; only an unreachable one
/// fails.
fn database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let probe = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let applied = migrations::applied_count(&pool).await.unwrap_or(0);
        pool.close().await;
        Ok::<i64, String>(applied)
    });

    match probe {
        Ok(applied) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!(
                "connected using `{}`; {applied} of {} migrations applied",
                config.database.url,
                migrations::total_defined()
            ),
        },
        Err(details) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details }
        }
    }
}

fn llm_readiness(config: &AppConfig) -> DoctorCheck {
    let (status, details) = match config.llm.provider {
        LlmProvider::Ollama => match config.llm.base_url.as_deref() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => (
                CheckStatus::Pass,
                format!("ollama endpoint `{url}` configured for model `{}`", config.llm.model),
            ),
            _ => (
                CheckStatus::Fail,
                "llm.base_url must be an http(s) URL when llm.provider is ollama".to_string(),
            ),
        },
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            if config.llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().is_empty()) {
                (CheckStatus::Pass, format!("api key present for model `{}`", config.llm.model))
            } else {
                (CheckStatus::Fail, "llm.api_key is required for hosted providers".to_string())
            }
        }
    };
    DoctorCheck { name: "llm_readiness", status, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  {:<24} {:<4} {}", check.name, marker, check.details));
    }
    lines.join("\n")
}
