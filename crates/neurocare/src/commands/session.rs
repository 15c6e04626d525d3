//! Session commands.
//!
//! `session run` drives one therapy session end to end against a
//! simulated device: start, live status, stop, save.

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use neurocare_core::error::{Error, Result as CoreResult};
use neurocare_core::progress::format_duration;
use neurocare_core::session::CompletedSession;
use neurocare_core::types::validate_intensity;
use neurocare_core::{
    DeviceChannel, DeviceContext, SessionController, SessionRepository, SessionSnapshot,
    SimulatedDevice, StopReason,
};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{SessionAction, SessionCommand};
use crate::config::Config;
use crate::database;

/// How often the status line is redrawn.
const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

pub async fn execute(cmd: SessionCommand, user: Option<&str>, config: &Config) -> Result<()> {
    match cmd.action {
        SessionAction::Run {
            seconds,
            intensity,
            emergency,
            disconnected,
        } => run(seconds, intensity, emergency, disconnected, user, config).await,
    }
}

async fn run(
    seconds: u64,
    intensity: Option<i64>,
    emergency: bool,
    disconnected: bool,
    user: Option<&str>,
    config: &Config,
) -> Result<()> {
    let intensity = intensity.map(validate_intensity).transpose()?;

    let repository: Arc<dyn SessionRepository> = database::open(config)?;
    let auth = database::auth_context(user, config);

    let device = Arc::new(SimulatedDevice::new(DeviceContext::new(
        !disconnected,
        config.device.battery,
    )));
    let _sensor = device.spawn_sensor(
        config.device.baseline_temperature,
        config.device.sensor_interval(),
    );
    let channel: Arc<dyn DeviceChannel> = device.clone();

    let controller = SessionController::new(auth, channel, repository, config.session.clone())?;

    if let Err(e) = begin(&controller, intensity).await {
        if e.is_device_not_connected() {
            println!("{} {}", "✗".red(), "Device not connected".red());
            println!("  Connect your device to start a session.");
        }
        controller.shutdown()?;
        return Err(e.into());
    }

    println!("{}", "Session started".cyan());
    println!("  Battery: {}%", device.context().battery());

    let spinner = create_spinner()?;
    let reason = drive(&controller, Duration::from_secs(seconds), emergency, &spinner).await;
    spinner.finish_and_clear();
    let reason = match reason {
        Ok(reason) => reason,
        Err(e) => {
            controller.shutdown()?;
            return Err(e);
        }
    };

    let outcome = match reason {
        StopReason::Normal => controller.stop().await,
        StopReason::Emergency => controller.emergency_stop().await,
    };

    match outcome {
        Ok(completed) => print_completed(&completed),
        Err(e) if e.is_persistence() || matches!(e, Error::MissingAuth { .. }) => {
            println!("{} {}", "✗".red(), e);
            recover_unsaved(&controller).await?;
        }
        Err(e) => {
            controller.shutdown()?;
            return Err(e.into());
        }
    }

    controller.acknowledge()?;
    controller.shutdown()?;
    Ok(())
}

/// Start the session at the requested intensity.
///
/// The intensity is set first so the start command already carries it,
/// unless the controller only accepts changes during a session.
async fn begin(controller: &SessionController, intensity: Option<u8>) -> CoreResult<()> {
    let Some(value) = intensity else {
        return controller.start().await;
    };

    if controller.config().intensity_requires_active {
        controller.start().await?;
        controller.adjust_intensity(i64::from(value)).await
    } else {
        controller.adjust_intensity(i64::from(value)).await?;
        controller.start().await
    }
}

/// Keep the session running until the deadline or Ctrl-C, refreshing the
/// status line. Returns how the session should end.
async fn drive(
    controller: &SessionController,
    length: Duration,
    emergency: bool,
    spinner: &ProgressBar,
) -> Result<StopReason> {
    let deadline = tokio::time::sleep(length);
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return Ok(if emergency { StopReason::Emergency } else { StopReason::Normal });
            }
            _ = &mut ctrl_c => {
                spinner.println(format!("{}", "Interrupted, stopping immediately".yellow()));
                return Ok(StopReason::Emergency);
            }
            _ = refresh.tick() => {
                spinner.set_message(status_line(&controller.snapshot()?));
            }
        }
    }
}

/// Offer to retry saving until it works or the user gives up.
async fn recover_unsaved(controller: &SessionController) -> Result<()> {
    while controller.unsaved_record()?.is_some() {
        let retry = std::io::stdin().is_terminal()
            && Confirm::new()
                .with_prompt("Retry saving the session?")
                .default(true)
                .interact()?;

        if !retry {
            controller.discard_unsaved()?;
            println!("{}", "⚠ Session discarded".yellow());
            break;
        }

        match controller.retry_save().await {
            Ok(completed) => print_completed(&completed),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }
    Ok(())
}

fn print_completed(completed: &CompletedSession) {
    let record = &completed.record;
    match completed.reason {
        StopReason::Normal => println!("{}", "✓ Session saved".green()),
        StopReason::Emergency => println!("{}", "⚠ Emergency stop, session saved".yellow()),
    }
    println!("  ID: {}", &record.id[..8.min(record.id.len())]);
    println!("  Duration: {}", format_duration(record.duration));
    println!("  Intensity: {}%", record.vibration_intensity);
    if let Some(temp) = record.average_temperature {
        println!("  Temperature: {:.1}°C", temp);
    }
}

fn status_line(snapshot: &SessionSnapshot) -> String {
    format!(
        "{}  intensity {}%  {:.1}°C",
        format_duration(snapshot.elapsed_seconds),
        snapshot.vibration_intensity,
        snapshot.last_temperature
    )
}

fn create_spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner} {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}
