//! Restore command

use anyhow::{bail, Result};
use camino::Utf8Path;
use hostpack_update::restore_latest_backup;

use crate::cli::RestoreArgs;
use crate::output;

pub fn run(args: RestoreArgs, config: Option<&Utf8Path>, progress: bool) -> Result<()> {
    let (_, ctx) = super::load_context(config, progress && !args.json)?;

    if !args.json {
        output::header("Restore latest backup");
        output::kv("Backups", &ctx.backup_dir.display().to_string());
        output::kv("Code root", &ctx.code_root.display().to_string());
        if let Some(public_root) = &ctx.public_root {
            output::kv("Public root", &public_root.display().to_string());
        }
    }

    let result = restore_latest_backup(&ctx);

    if args.json {
        output::json(&result)?;
        if !result.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    if result.success {
        output::data_warnings(&result);
        output::success(&result.message);
        Ok(())
    } else {
        output::error(&result.message);
        bail!("restore failed");
    }
}
