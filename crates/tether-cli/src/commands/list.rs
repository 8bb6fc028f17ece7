//! List command - list the intercepts of the current session

use console::style;
use tether_core::ClientConfig;

use super::GlobalArgs;
use crate::error::Result;

/// Run the list command
pub async fn run(global: &GlobalArgs, config: &ClientConfig) -> Result<()> {
    let controller = global.intercept_controller(config).await?;
    let intercepts = controller.list().await?;

    if intercepts.is_empty() {
        println!("No intercepts");
        return Ok(());
    }

    for (i, intercept) in intercepts.iter().enumerate() {
        println!("{:4}. {}", i + 1, style(&intercept.spec.name).cyan());
        println!(
            "      Intercepting requests and redirecting them to {}:{}",
            intercept.spec.target_host, intercept.spec.target_port
        );
        if let Some(url) = intercept.preview_url() {
            println!("      Preview URL: {}", style(url).underlined());
        }
    }

    Ok(())
}
