//! Backups command

use anyhow::{bail, Result};
use camino::Utf8Path;
use hostpack_update::{prune_backups, BackupManager};
use indicatif::HumanBytes;

use crate::cli::BackupsCommands;
use crate::output;

pub fn run(cmd: BackupsCommands, config: Option<&Utf8Path>) -> Result<()> {
    let (_, ctx) = super::load_context(config, false)?;
    let manager = BackupManager::new(&ctx.backup_dir);

    match cmd {
        BackupsCommands::List { json } => {
            let backups = manager.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
                return Ok(());
            }

            output::header(&format!("Backups in {}", ctx.backup_dir.display()));
            if backups.is_empty() {
                output::info("No backups yet");
                return Ok(());
            }
            for backup in &backups {
                println!(
                    "  {}  {:>10}  {}",
                    backup.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    HumanBytes(backup.size_bytes).to_string(),
                    backup.file_name()
                );
            }
            Ok(())
        }
        BackupsCommands::Prune { keep } => {
            let result = prune_backups(&ctx, keep);
            if !result.success {
                output::error(&result.message);
                bail!("prune failed");
            }

            if let Some(failed) = result
                .data
                .as_ref()
                .and_then(|d| d.get("failed"))
                .and_then(|f| f.as_array())
            {
                for entry in failed.iter().filter_map(|e| e.as_array()) {
                    if let [path, reason] = entry.as_slice() {
                        output::warning(&format!(
                            "{}: {}",
                            path.as_str().unwrap_or_default(),
                            reason.as_str().unwrap_or_default()
                        ));
                    }
                }
            }
            output::success(&result.message);
            Ok(())
        }
    }
}
