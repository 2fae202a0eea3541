//! Shared helper functions for CLI commands.

use std::time::Duration;

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

use super::AddressArgs;
use crate::models::LocationQuery;

pub fn success() -> StyledObject<&'static str> {
    style("✓").green()
}

pub fn failure() -> StyledObject<&'static str> {
    style("✗").red()
}

/// Build a validated query from command-line address parts.
pub fn query_from_args(args: &AddressArgs) -> anyhow::Result<LocationQuery> {
    Ok(LocationQuery::new(
        args.street.as_str(),
        args.city.as_deref(),
        args.state.as_str(),
        args.zip.as_deref(),
    )?)
}

/// Spinner on stderr; hidden when stderr is not a terminal.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
