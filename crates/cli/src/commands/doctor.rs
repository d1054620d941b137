use std::path::Path;

use parley_core::config::{AppConfig, LoadOptions, StoreBackend};
use parley_db::connect_with_settings;
use serde::Serialize;

use super::CommandResult;

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

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 2 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_chat_credentials(&config));
            checks.push(check_store_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "chat_credentials",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Credential *shape* only; no network call is made. A deployment without any
/// chat credentials is valid - the relay endpoints answer "not configured".
fn check_chat_credentials(config: &AppConfig) -> DoctorCheck {
    let mut missing = Vec::new();
    if config.chat.signing_secret.is_none() {
        missing.push("chat.signing_secret");
    }
    if config.chat.channel_id.is_none() {
        missing.push("chat.channel_id");
    }
    if config.chat.bot_token.is_none() {
        missing.push("chat.bot_token");
    }

    match missing.len() {
        0 => DoctorCheck {
            name: "chat_credentials",
            status: CheckStatus::Pass,
            details: "signing secret, channel id, and bot token present".to_string(),
        },
        3 => DoctorCheck {
            name: "chat_credentials",
            status: CheckStatus::Skipped,
            details: "chat is not configured; relay endpoints stay disabled".to_string(),
        },
        _ => DoctorCheck {
            name: "chat_credentials",
            status: CheckStatus::Fail,
            details: format!("incomplete chat credentials; missing {}", missing.join(", ")),
        },
    }
}

fn check_store_connectivity(config: &AppConfig) -> DoctorCheck {
    match config.store.backend {
        StoreBackend::Sqlite => check_sqlite(config),
        StoreBackend::Flatfile => check_data_dir(&config.store.data_dir),
    }
}

fn check_sqlite(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.store.database_url,
            config.store.max_connections,
            config.store.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.store.database_url),
        },
        Err(error) => {
            DoctorCheck { name: "store_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn check_data_dir(data_dir: &str) -> DoctorCheck {
    let probe = Path::new(data_dir).join(".parley-doctor");
    let result = std::fs::create_dir_all(data_dir)
        .and_then(|()| std::fs::write(&probe, b"probe"))
        .and_then(|()| std::fs::remove_file(&probe));

    match result {
        Ok(()) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: format!("data dir `{data_dir}` is writable"),
        },
        Err(error) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Fail,
            details: format!("data dir `{data_dir}` is not writable: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
