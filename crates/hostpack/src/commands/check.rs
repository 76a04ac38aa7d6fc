//! Check command

use anyhow::{bail, Result};
use camino::Utf8Path;
use hostpack_update::{check_for_updates, check_release};

use crate::cli::CheckArgs;
use crate::output;

pub async fn run(args: CheckArgs, config: Option<&Utf8Path>, progress: bool) -> Result<()> {
    let (_, ctx) = super::load_context(config, progress && !args.json)?;

    if args.json {
        let result = check_for_updates(&ctx).await;
        output::json(&result)?;
        if !result.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let spinner = output::spinner("Checking for updates...", progress);
    let check = check_release(&ctx).await;
    spinner.finish_and_clear();

    let check = match check {
        Ok(check) => check,
        Err(e) => {
            output::error(&e.to_string());
            if e.is_retryable() {
                output::info("This may be temporary; try again shortly");
            }
            bail!("update check failed");
        }
    };

    output::kv("Deployed", &check.current.to_string());
    output::kv("Latest", &check.latest.version.to_string());
    if let Some(date) = &check.latest.published_at {
        output::kv("Published", date.get(..10).unwrap_or(date));
    }

    if check.update_available {
        output::success(&format!("Update available: {}", check.latest.tag));
        if let Some(notes) = &check.latest.notes {
            let preview: String = notes.lines().take(10).collect::<Vec<_>>().join("\n");
            println!("\nRelease notes:\n{}\n", preview);
        }
        output::info("Run 'hostpack update' to install it");
    } else {
        output::success("Already on the latest version");
    }
    Ok(())
}
