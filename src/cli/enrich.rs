//! The `enrich` command.

use std::path::Path;
use std::sync::Arc;

use console::style;

use super::helpers::{failure, query_from_args, spinner, success};
use super::AddressArgs;
use crate::browser::SessionFactory;
use crate::config::EnrichConfig;
use crate::models::CombinedEnrichmentResult;
use crate::orchestrator::ScraperOrchestrator;
use crate::sink::{EnrichmentSink, JsonFileSink};

pub async fn cmd_enrich(
    address: &AddressArgs,
    headed: bool,
    config: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = EnrichConfig::load(config).await?;
    if headed {
        config.headless = false;
    }
    let query = query_from_args(address)?;

    let orchestrator = ScraperOrchestrator::new(session_factory(&config)?, &config);

    let pb = spinner(format!("Enriching {}", query.full_address()));
    let result = orchestrator.scrape_all(&query).await;
    pb.finish_and_clear();

    report(&result);

    match output {
        Some(path) => JsonFileSink::new(path).store(&result).await?,
        None => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    if !result.success {
        anyhow::bail!("No site returned data for {}", query.full_address());
    }
    Ok(())
}

#[cfg(feature = "browser")]
fn session_factory(config: &EnrichConfig) -> anyhow::Result<Arc<dyn SessionFactory>> {
    use crate::browser::ChromiumSessionFactory;

    Ok(Arc::new(ChromiumSessionFactory::new(
        config.browser.clone(),
        config.page_timeouts(),
    )))
}

#[cfg(not(feature = "browser"))]
fn session_factory(_config: &EnrichConfig) -> anyhow::Result<Arc<dyn SessionFactory>> {
    anyhow::bail!("Browser support not compiled in. Rebuild with --features browser")
}

/// One status line per site on stderr.
fn report(result: &CombinedEnrichmentResult) {
    let lines = [
        ("crime", result.crime.success, result.crime.error.as_deref()),
        ("schools", result.schools.success, result.schools.error.as_deref()),
        (
            "walkability",
            result.walkability.success,
            result.walkability.error.as_deref(),
        ),
    ];
    for (name, ok, error) in lines {
        if ok {
            eprintln!("{} {}", success(), name);
        } else {
            eprintln!(
                "{} {} {}",
                failure(),
                name,
                style(error.unwrap_or("failed")).dim()
            );
        }
    }
    if let Some(avg) = result.schools.data.as_ref().and_then(|s| s.average_rating) {
        eprintln!("  {} average school rating {:.1}", style("→").dim(), avg);
    }
}
