//! CLI command implementations

pub mod backups;
pub mod check;
pub mod package;
pub mod restore;
pub mod update;

use anyhow::{Context, Result};
use camino::Utf8Path;
use hostpack_core::HostpackConfig;
use hostpack_update::UpdateContext;

/// Load the configuration and resolve it into an update context
pub(crate) fn load_context(
    config: Option<&Utf8Path>,
    progress: bool,
) -> Result<(HostpackConfig, UpdateContext)> {
    let config = HostpackConfig::load(config).context("failed to load configuration")?;
    let ctx = UpdateContext::from_config(&config)?.with_progress(progress);
    Ok((config, ctx))
}
