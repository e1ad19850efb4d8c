mod domain;
mod infrastructure;
mod presentation;

use crate::domain::models::TerminationReason;
use crate::domain::output::{FanOutSink, OutputSink};
use crate::domain::session::Session;
use crate::domain::settings::{Settings, SettingsService};
use crate::domain::transport::BleTransport;
use crate::infrastructure::logging::init_logger;
use crate::presentation::console::ConsoleSink;
use std::path::Path;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let base_dir = settings_service
        .path()
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let _logging_guard = init_logger(&settings.log_settings, base_dir)?;

    info!("Starting GLM bridge");
    info!("Settings: {}", settings_service.path().display());

    let cancel = spawn_interrupt_listener();
    let sink = build_output_sink(&settings);

    info!("Press the measure button on the device and wait...");
    tokio::select! {
        _ = tokio::time::sleep(settings.startup_delay()) => {}
        _ = cancelled(cancel.clone()) => {
            info!("Interrupted before connecting");
            return Ok(ExitCode::SUCCESS);
        }
    }

    run_platform_session(&settings, sink, cancel).await
}

/// Flips to `true` on Ctrl+C
fn spawn_interrupt_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                let _ = tx.send(true);
            }
            Err(e) => warn!("Could not listen for Ctrl+C: {}", e),
        }
    });
    rx
}

/// Resolves once the flag is set; never if the flag can no longer change
async fn cancelled(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn build_output_sink(settings: &Settings) -> Box<dyn OutputSink> {
    let injection = if settings.output_mode.injects() {
        injection_sink(settings)
    } else {
        None
    };

    let mut sinks: Vec<Box<dyn OutputSink>> = Vec::new();
    if settings.output_mode.displays() || injection.is_none() {
        sinks.push(Box::new(ConsoleSink::stdout(settings.display_unit)));
    }
    sinks.extend(injection);

    Box::new(FanOutSink::new(sinks))
}

#[cfg(windows)]
fn injection_sink(settings: &Settings) -> Option<Box<dyn OutputSink>> {
    use crate::domain::output::InjectionSink;
    use crate::infrastructure::input_simulator::InputSimulator;

    Some(Box::new(InjectionSink::new(
        InputSimulator::new(),
        settings.injection_unit,
    )))
}

#[cfg(not(windows))]
fn injection_sink(_settings: &Settings) -> Option<Box<dyn OutputSink>> {
    warn!("Keystroke injection is not supported on this platform, using display only");
    None
}

#[cfg(windows)]
async fn run_platform_session(
    settings: &Settings,
    sink: Box<dyn OutputSink>,
    cancel: watch::Receiver<bool>,
) -> anyhow::Result<ExitCode> {
    let transport = infrastructure::bluetooth::WinRtTransport::new();
    if run_session(transport, settings, sink, cancel).await {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(not(windows))]
async fn run_platform_session(
    _settings: &Settings,
    _sink: Box<dyn OutputSink>,
    _cancel: watch::Receiver<bool>,
) -> anyhow::Result<ExitCode> {
    error!("No BLE transport is available on this platform");
    Ok(ExitCode::FAILURE)
}

/// True when the session ended by cancellation
#[cfg_attr(not(any(windows, test)), allow(dead_code))]
async fn run_session<T: BleTransport>(
    transport: T,
    settings: &Settings,
    sink: Box<dyn OutputSink>,
    cancel: watch::Receiver<bool>,
) -> bool {
    let mut session = Session::new(transport, settings.session_config(), sink);
    match session.run(cancelled(cancel)).await {
        Ok(TerminationReason::Cancelled) => {
            info!("Session closed");
            true
        }
        Ok(TerminationReason::ConnectionLost) => false,
        Err(e) => {
            error!("Session failed: {:#}", e);
            false
        }
    }
}
