//! Leave command - remove an intercept

use console::style;
use tether_core::ClientConfig;

use super::GlobalArgs;
use crate::error::Result;

pub async fn run(global: &GlobalArgs, config: &ClientConfig, name: &str) -> Result<()> {
    let controller = global.intercept_controller(config).await?;
    controller.remove(name).await?;

    println!(
        "{} Removed intercept {}",
        style("✓").green().bold(),
        style(name.trim()).cyan()
    );
    Ok(())
}
