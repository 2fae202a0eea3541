//! Commands that print derived information without starting a browser.

use std::path::Path;

use console::style;

use super::helpers::query_from_args;
use super::AddressArgs;
use crate::browser::stealth::{init_script, STEALTH_VERSION};
use crate::config::EnrichConfig;
use crate::scrapers::crime::crime_urls;
use crate::scrapers::schools::city_listing_url;
use crate::scrapers::walkability::walkability_urls;

/// Print the deterministic per-site URLs for an address.
pub async fn cmd_urls(address: &AddressArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let config = EnrichConfig::load(config).await?;
    let query = query_from_args(address)?;

    eprintln!("{} {}", style("Address:").bold(), query.full_address());

    println!("{}", style("crime").cyan());
    for url in crime_urls(&config.sites.crime, &query)? {
        println!("  {} {}", style("→").dim(), url);
    }

    println!("{}", style("schools").cyan());
    println!(
        "  {} {} (address search)",
        style("→").dim(),
        config.sites.schools
    );
    println!(
        "  {} {}",
        style("→").dim(),
        city_listing_url(&config.sites.schools, &query)?
    );

    println!("{}", style("walkability").cyan());
    for url in walkability_urls(&config.sites.walkability, &query) {
        println!("  {} {}", style("→").dim(), url);
    }
    Ok(())
}

pub async fn cmd_stealth_script(config: Option<&Path>) -> anyhow::Result<()> {
    let config = EnrichConfig::load(config).await?;
    eprintln!("{} stealth script v{}", style("→").dim(), STEALTH_VERSION);
    println!("{}", init_script(&config.browser.languages()));
    Ok(())
}

pub async fn cmd_config(config: Option<&Path>) -> anyhow::Result<()> {
    let source = config
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "discovered file or defaults".to_string());
    let config = EnrichConfig::load(config).await?;
    eprintln!("{} Effective config ({} + environment)", style("→").dim(), source);
    print!("{}", config.to_toml()?);
    Ok(())
}
