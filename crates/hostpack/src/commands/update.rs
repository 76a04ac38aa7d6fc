//! Update command

use anyhow::{bail, Result};
use camino::Utf8Path;
use dialoguer::Confirm;
use hostpack_update::{check_release, perform_update};

use crate::cli::UpdateArgs;
use crate::output;

pub async fn run(args: UpdateArgs, config: Option<&Utf8Path>, progress: bool) -> Result<()> {
    let (_, ctx) = super::load_context(config, progress && !args.json)?;

    if !args.yes {
        let prompt = match (&args.url, &args.version) {
            (Some(url), Some(version)) => format!("Install {} as version {}?", url, version),
            _ => {
                let spinner = output::spinner("Checking for updates...", progress && !args.json);
                let check = check_release(&ctx).await;
                spinner.finish_and_clear();
                match check {
                    // Nothing to confirm; the pipeline reports up-to-date or
                    // the check failure in its own terms
                    Ok(check) if !check.update_available => {
                        return report(perform_update(&ctx, None, None).await, args.json)
                    }
                    Err(_) => return report(perform_update(&ctx, None, None).await, args.json),
                    Ok(check) => format!(
                        "Update {} from {} to {}? A backup is taken first",
                        ctx.code_root.display(),
                        check.current,
                        check.latest.version
                    ),
                }
            }
        };

        if !Confirm::new().with_prompt(prompt).default(false).interact()? {
            output::info("Update cancelled");
            return Ok(());
        }
    }

    let result = perform_update(&ctx, args.url.as_deref(), args.version.as_deref()).await;
    report(result, args.json)
}

fn report(result: hostpack_update::OperationResult, json: bool) -> Result<()> {
    if json {
        output::json(&result)?;
        if !result.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    if result.success {
        output::data_warnings(&result);
        output::success(&result.message);
        if let Some(backup) = result
            .data
            .as_ref()
            .and_then(|d| d.get("backup"))
            .and_then(|b| b.as_str())
        {
            output::kv("Backup", backup);
        }
        Ok(())
    } else {
        output::error(&result.message);
        bail!("update failed");
    }
}
