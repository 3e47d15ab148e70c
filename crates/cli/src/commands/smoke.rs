use std::time::Instant;

use crate::commands::CommandResult;
use secrecy::ExposeSecret;
use serde::Serialize;
use textback_core::config::{AppConfig, LlmProvider, LoadOptions};
use textback_db::{connect_with_settings, migrations};

/// Order is the execution order; a failure that makes later steps meaningless
/// records the remainder as skipped.
const STEP_NAMES: [&str; 4] =
    ["config_validation", "llm_readiness", "db_connectivity", "migration_visibility"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum StepStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeStep {
    name: &'static str,
    status: StepStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: StepStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeStep>,
}

#[derive(Default)]
struct StepRecorder {
    steps: Vec<SmokeStep>,
}

impl StepRecorder {
    fn record(&mut self, started: Instant, outcome: Result<String, String>) {
        let name = STEP_NAMES[self.steps.len()];
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let step = match outcome {
            Ok(message) => SmokeStep { name, status: StepStatus::Pass, elapsed_ms, message },
            Err(message) => SmokeStep { name, status: StepStatus::Fail, elapsed_ms, message },
        };
        self.steps.push(step);
    }

    fn skip_remaining(&mut self) {
        while self.steps.len() < STEP_NAMES.len() {
            self.steps.push(SmokeStep {
                name: STEP_NAMES[self.steps.len()],
                status: StepStatus::Skipped,
                elapsed_ms: 0,
                message: "skipped due to previous failure".to_string(),
            });
        }
    }
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut recorder = StepRecorder::default();

    let step = Instant::now();
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            recorder.record(step, Ok("configuration loaded and validated".to_string()));
            config
        }
        Err(error) => {
            recorder.record(step, Err(error.to_string()));
            recorder.skip_remaining();
            return report(recorder.steps, started);
        }
    };

    let step = Instant::now();
    recorder.record(step, llm_readiness(&config));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let step = Instant::now();
            recorder.record(step, Err(format!("failed to initialize async runtime: {error}")));
            recorder.skip_remaining();
            return report(recorder.steps, started);
        }
    };

    let step = Instant::now();
    let pool = match runtime.block_on(connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )) {
        Ok(pool) => {
            recorder.record(step, Ok(format!("connected using `{}`", config.database.url)));
            pool
        }
        Err(error) => {
            recorder.record(step, Err(format!("failed to connect: {error}")));
            recorder.skip_remaining();
            return report(recorder.steps, started);
        }
    };

    let step = Instant::now();
    let migrated = runtime.block_on(async {
        let result = migrations::run_pending(&pool).await;
        pool.close().await;
        result
    });
    recorder.record(
        step,
        migrated
            .map(|()| "migrations are visible and executable".to_string())
            .map_err(|error| format!("migration execution failed: {error}")),
    );

    report(recorder.steps, started)
}

fn llm_readiness(config: &AppConfig) -> Result<String, String> {
    match config.llm.provider {
        LlmProvider::Ollama => {
            let url_ok = config
                .llm
                .base_url
                .as_deref()
                .is_some_and(|url| url.starts_with("http://") || url.starts_with("https://"));
            if url_ok {
                Ok(format!("ollama endpoint configured for model `{}`", config.llm.model))
            } else {
                Err("llm.base_url must be an http(s) URL when llm.provider is ollama".to_string())
            }
        }
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let key_ok =
                config.llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().is_empty());
            if key_ok {
                Ok(format!("api key present for model `{}`", config.llm.model))
            } else {
                Err("llm.api_key is required for hosted providers".to_string())
            }
        }
    }
}

fn report(checks: Vec<SmokeStep>, started: Instant) -> CommandResult {
    let total_elapsed_ms = started.elapsed().as_millis() as u64;
    let passed = checks.iter().filter(|step| step.status == StepStatus::Pass).count();
    let failed = checks.iter().any(|step| step.status == StepStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { StepStatus::Fail } else { StepStatus::Pass },
        summary: format!(
            "smoke: {passed}/{} checks passed in {total_elapsed_ms}ms",
            checks.len()
        ),
        total_elapsed_ms,
        checks,
    };

    let machine = serde_json::to_string(&report).unwrap_or_else(|_| {
        r#"{"command":"smoke","status":"fail","summary":"report serialization failed"}"#.to_string()
    });

    CommandResult {
        exit_code: if failed { 6 } else { 0 },
        output: format!("{}\n{machine}", report.summary),
    }
}
