//! `bulkrec health` command implementation

use colored::Colorize;

use crate::api::ApiClient;
use crate::error::Result;

pub async fn run(server: &str) -> Result<()> {
    let client = ApiClient::new(server)?;
    let health = client.health().await?;

    println!("{} {}", "Server:".cyan().bold(), server);
    println!("  Status:     {}", health.status.green());
    println!("  Version:    {}", health.version);
    println!("  Database:   {}", health.database);
    if let Some(mode) = &health.apply_mode {
        println!("  Apply mode: {}", mode);
    }

    Ok(())
}
