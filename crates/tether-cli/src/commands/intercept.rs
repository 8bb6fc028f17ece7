//! Intercept command - redirect a workload's traffic to this machine
//!
//! Without a command the intercept is left in place. With a command, the
//! intercept lasts as long as the command runs, unless it already existed.

use console::style;
use tracing::{error, info, warn};
use tether_connect::{InterceptSpec, with_ensured_state};
use tether_core::ClientConfig;

use super::GlobalArgs;
use crate::error::{CliError, Result};
use crate::exit_codes;

/// Run the intercept command
pub async fn run(
    global: &GlobalArgs,
    config: &ClientConfig,
    name: &str,
    workload: Option<&str>,
    port: u16,
    command: &[String],
) -> Result<()> {
    let controller = global.intercept_controller(config).await?;
    let spec = InterceptSpec::new(workload.unwrap_or(name), port).with_name(name);
    let state = controller.intercept(spec);
    let target = format!("{}:{}", state.spec().target_host, state.spec().target_port);

    let retain = command.is_empty();
    with_ensured_state(&state, retain, || async {
        println!(
            "{} Intercepting {} and redirecting to {}",
            style("✓").green().bold(),
            style(&state.spec().workload).cyan(),
            style(&target).yellow()
        );
        if retain {
            Ok(())
        } else {
            run_command(command).await
        }
    })
    .await
}

async fn run_command(command: &[String]) -> Result<()> {
    run_until_interrupted(command, wait_for_interrupt()).await
}

/// Wait for Ctrl+C. Never resolves when the signal cannot be listened for.
async fn wait_for_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, stopping command"),
        Err(err) => {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await
        }
    }
}

/// Run `command` to completion, or stop it when `interrupt` resolves first
///
/// An interrupted command is reported as an error so that the caller still
/// removes an intercept it created.
async fn run_until_interrupted(
    command: &[String],
    interrupt: impl Future<Output = ()>,
) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CliError::user(format!("unable to run {program}: {e}")))?;

    let finished = tokio::select! {
        status = child.wait() => Some(status?),
        () = interrupt => None,
    };

    let Some(status) = finished else {
        if let Err(e) = child.kill().await {
            warn!(error = %e, "Unable to stop {}", program);
        }
        return Err(CliError::Interrupted);
    };

    if status.success() {
        Ok(())
    } else {
        Err(CliError::CommandFailed {
            status: status.code().unwrap_or(exit_codes::ERROR),
        })
    }
}
