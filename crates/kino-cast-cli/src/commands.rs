//! CLI command implementations

use crate::output::emit;
use anyhow::{anyhow, Context};
use clap::ValueEnum;
use kino_cast::sim::{SimScript, SimulatedPlayer, SimulatedTransport, TransportCall};
use kino_cast::{
    CastConfig, CastErrorCode, CastHandle, CastService, CastSnapshot, ErrorClass,
    MediaLoadRequestBuilder, RemoteMedia, SessionState,
};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

/// Upper bound for any single state wait
const STATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Named cast scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Launch a session, then stop it and restore local playback
    LaunchStop,
    /// Adopt a session already running on the receiver
    Rejoin,
    /// The cast SDK never becomes available
    Unavailable,
    /// Session launch fails with --error-code
    LaunchError,
    /// The receiver ends the session on its own
    RemoteEnd,
    /// A new source starts while casting and is sent to the receiver
    Reload,
}

pub struct SimulateOptions {
    pub position: f64,
    pub playing: bool,
    pub error_code: String,
    pub src: String,
    pub mime_type: String,
}

#[derive(Serialize)]
struct ScenarioReport {
    scenario: Scenario,
    controller: CastSnapshot,
    player: serde_json::Value,
    transport_calls: Vec<TransportCall>,
}

/// Load configuration from `path`, or defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<CastConfig> {
    let Some(path) = path else {
        return Ok(CastConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(CastConfig::from_json_str(&json)?)
}

async fn wait_for(handle: &CastHandle, state: SessionState) -> anyhow::Result<()> {
    timeout(STATE_TIMEOUT, handle.wait_for(state))
        .await
        .map_err(|_| anyhow!("timed out waiting for {state}, controller is {}", handle.state()))??;
    Ok(())
}

/// Longest a full capability retry schedule can take, plus slack
fn retry_budget(config: &CastConfig) -> anyhow::Result<Duration> {
    config
        .init_retry_delay()
        .checked_mul(config.max_init_attempts)
        .and_then(|d| d.checked_add(STATE_TIMEOUT))
        .ok_or_else(|| anyhow!("capability retry schedule out of range"))
}

/// Run a scenario and report the final controller and player state
pub async fn simulate(
    scenario: Scenario,
    options: SimulateOptions,
    config: CastConfig,
    format: &str,
) -> anyhow::Result<()> {
    let remote = RemoteMedia {
        media_session_id: 1,
        content_id: options.src.clone(),
        content_type: options.mime_type.clone(),
    };
    let error_code = CastErrorCode::from_code(&options.error_code);

    let script = match scenario {
        Scenario::Rejoin => SimScript {
            existing_media: Some(remote),
            ..Default::default()
        },
        Scenario::Unavailable => SimScript {
            capability_after_checks: None,
            ..Default::default()
        },
        Scenario::LaunchError => SimScript {
            session_error: Some(error_code),
            ..Default::default()
        },
        _ => SimScript::default(),
    };

    let transport = SimulatedTransport::scripted(script);
    let player = SimulatedPlayer::new(&options.src, &options.mime_type);
    player.set_position(options.position);
    player.set_playing(options.playing);

    let give_up_after = retry_budget(&config)?;
    let (handle, task) = CastService::spawn(transport.clone(), player.clone(), config)?;
    info!(scenario = ?scenario, "Running cast scenario");

    handle.initialize()?;
    match scenario {
        Scenario::LaunchStop => {
            wait_for(&handle, SessionState::Ready).await?;
            handle.toggle().await?;
            wait_for(&handle, SessionState::Casting).await?;
            handle.toggle().await?;
            wait_for(&handle, SessionState::Ready).await?;
        }
        Scenario::Rejoin => {
            wait_for(&handle, SessionState::Casting).await?;
        }
        Scenario::Unavailable => {
            timeout(give_up_after, async {
                while handle.snapshot().await?.last_error.is_none() {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Ok::<_, kino_cast::Error>(())
            })
            .await
            .map_err(|_| anyhow!("capability retry did not finish"))??;
        }
        Scenario::LaunchError => {
            wait_for(&handle, SessionState::Ready).await?;
            handle.toggle().await?;
        }
        Scenario::RemoteEnd => {
            wait_for(&handle, SessionState::Ready).await?;
            handle.toggle().await?;
            wait_for(&handle, SessionState::Casting).await?;
            transport.end_session_remotely();
            wait_for(&handle, SessionState::Ready).await?;
        }
        Scenario::Reload => {
            wait_for(&handle, SessionState::Ready).await?;
            handle.toggle().await?;
            wait_for(&handle, SessionState::Casting).await?;
            player.load_source(format!("{}?episode=2", options.src), &options.mime_type);
            handle.playback_about_to_start()?;
        }
    }

    let report = ScenarioReport {
        scenario,
        controller: handle.snapshot().await?,
        player: player.snapshot(),
        transport_calls: transport.calls(),
    };
    handle.shutdown();
    task.await?;

    emit(&report, format, print_report);
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    let c = &report.controller;
    println!("Scenario: {:?}", report.scenario);
    println!("  Controller: {}", c.controller);
    println!("  State: {}", c.state);
    println!("  Initialized: {}", c.initialized);
    println!("  Receivers: {}", c.availability);
    println!(
        "  Affordance: visible={} connected={} error={}",
        c.affordance.visible, c.affordance.connected, c.affordance.error
    );
    if let Some(session) = &c.session_id {
        println!("  Session: {}", session);
    }
    if c.capability_checks > 0 {
        println!("  Failed capability checks: {}", c.capability_checks);
    }
    if let Some(error) = &c.last_error {
        println!("  Last error: {}", error);
    }

    println!("\nTransitions:");
    for change in &c.history {
        println!("  {} {} -> {}", change.at.format("%H:%M:%S%.3f"), change.from, change.to);
    }

    println!("\nTransport calls:");
    for call in &report.transport_calls {
        println!("  {:?}", call);
    }

    println!("\nLocal player:");
    println!("  Position: {}", report.player["position"]);
    println!("  Paused: {}", report.player["paused"]);
    println!("  Inactivity timeout: {}", report.player["inactivity_timeout"]);
}

/// Validate and print the effective configuration
pub fn config(config: CastConfig, app_id: Option<String>, format: &str) -> anyhow::Result<()> {
    let config = match app_id {
        Some(app_id) => config.with_app_id(app_id),
        None => config,
    };
    config.validate()?;

    emit(&config, format, |c| {
        println!("Cast configuration:");
        println!("  Receiver app: {}", c.effective_app_id());
        println!("  Capability checks: {}", c.max_init_attempts);
        println!("  Retry delay: {:?}", c.init_retry_delay());
        println!("  Default inactivity timeout: {}ms", c.default_inactivity_timeout_ms);
        println!("  Autoplay: {}", c.autoplay);
    });
    Ok(())
}

/// Preview a load request
pub fn request(
    src: &str,
    mime_type: &str,
    offset: f64,
    autoplay: bool,
    format: &str,
) -> anyhow::Result<()> {
    let request = MediaLoadRequestBuilder::new(src, mime_type)
        .with_start_offset(offset)
        .with_autoplay(autoplay)
        .build()?;

    emit(&request, format, |r| {
        println!("Load request:");
        println!("  Content: {}", r.source_uri());
        println!("  Type: {}", r.mime_type());
        println!("  Start: {}s", r.start_offset_seconds());
        println!("  Autoplay: {}", r.autoplay());
        println!("\n{}", r.to_json());
    });
    Ok(())
}

#[derive(Serialize)]
struct CodeRow {
    code: CastErrorCode,
    class: ErrorClass,
}

/// List SDK error codes with their handling
pub fn codes(format: &str) {
    let rows: Vec<CodeRow> = CastErrorCode::TRANSIENT
        .into_iter()
        .chain([CastErrorCode::Cancel, CastErrorCode::Other("<any other>".into())])
        .map(|code| CodeRow {
            class: code.class(),
            code,
        })
        .collect();

    emit(&rows, format, |rows| {
        println!("{:<26} HANDLING", "CODE");
        for row in rows {
            let handling = match row.class {
                ErrorClass::Transient => "error indicator",
                ErrorClass::Cancelled => "ignored",
                ErrorClass::Fatal => "player fatal error",
            };
            println!("{:<26} {}", row.code.as_str(), handling);
        }
    });
}
