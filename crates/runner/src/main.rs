//! `migrun` -- run one entity migration against the remote tool and
//! report the result.
//!
//! Connection settings come from [`RunnerConfig::from_env`]; the run
//! itself from [`RunInput::from_lookup`]. The run summary is printed to
//! stdout as JSON; logs go to stderr. Exits non-zero when the run fails.
//!
//! # Environment variables
//!
//! | Variable                    | Required | Default | Description                          |
//! |-----------------------------|----------|---------|--------------------------------------|
//! | `MIGRUN_PROFILE`            | yes      | --      | Profile, e.g. `devncdns_qancdns`     |
//! | `MIGRUN_MODULE`             | yes      | --      | `PD` or `AD`                         |
//! | `MIGRUN_UUIDS`              | yes      | --      | Entity ids, comma or newline separated |
//! | `MIGRUN_USE_CRUD`           | no       | `N`     | Y/N                                  |
//! | `MIGRUN_ASYNC`              | no       | `N`     | Y/N                                  |
//! | `MIGRUN_MIGRATE_DEPENDENTS` | no       | `N`     | Y/N                                  |
//! | `MIGRUN_MIGRATION_ID`       | no       | --      | Explicit migration uuid              |
//! | `MIGRUN_OUT`                | no       | --      | Artifact directory or `.json` path   |
//! | `MIGRUN_FORCE_REFRESH`      | no       | `N`     | Bypass the profile cache             |
//! | `LOG_FORMAT`                | no       | text    | `json` for JSON log lines            |

use anyhow::Context;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use migrun_runner::config::{RunInput, RunnerConfig};
use migrun_runner::orchestrator::{Orchestrator, RunOptions};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "migrun_runner=info,migrun_remote=info".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = RunnerConfig::from_env().context("Failed to load configuration")?;
    let input = RunInput::from_lookup(|key| std::env::var(key).ok(), &config.script_name)
        .context("Invalid run request")?;

    tracing::info!(
        tool_url = %config.tool_url,
        profile = %input.request.profile(),
        module = %input.request.module(),
        entities = input.request.entity_ids().len(),
        "Starting migrun",
    );

    let orchestrator = Orchestrator::from_config(&config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let options = RunOptions {
        request: input.request,
        force_refresh: input.force_refresh,
        cleanup: config.cleanup,
        artifacts: input.artifacts,
    };

    match orchestrator.run(options, &cancel).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
            Ok(())
        }
        Err(err) => {
            let report = json!({
                "success": false,
                "error": { "kind": err.kind(), "message": err.to_string() },
                "diagnostics": err.diagnostics(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Err(err.into())
        }
    }
}
