//! Package command

use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use hostpack_archive::ArchiveWriter;
use hostpack_update::Operation;
use indicatif::HumanBytes;
use std::fs;

use crate::cli::PackageArgs;
use crate::output;

pub fn run(args: PackageArgs, config: Option<&Utf8Path>, progress: bool) -> Result<()> {
    let (config, ctx) = super::load_context(config, progress)?;

    let level = args.level.unwrap_or(config.backup.compression_level);
    if !(1..=9).contains(&level) {
        bail!("Compression level must be 1-9, got {}", level);
    }

    let sources = ctx.archive_sources(Operation::Package);
    output::header("Build package");
    for source in &sources {
        output::kv(&source.label, &source.root.display().to_string());
    }
    output::kv("Output", args.output.as_str());

    let report = ArchiveWriter::new()
        .with_compression_level(level)
        .with_progress(progress)
        .build(args.output.as_std_path(), &sources)
        .context("failed to build package")?;

    if !report.is_complete() {
        for skipped in &report.skipped {
            output::warning(&format!("{}: {}", skipped.path.display(), skipped.reason));
        }
        // An incomplete package must never be published
        fs::remove_file(&report.path)
            .with_context(|| format!("failed to remove incomplete package {}", args.output))?;
        bail!("{} path(s) could not be read", report.skipped.len());
    }

    let file_name = args.output.file_name().unwrap_or(args.output.as_str());
    let sidecar = format!("{}.sha256", args.output);
    fs::write(&sidecar, format!("{}  {}\n", report.checksum, file_name))
        .with_context(|| format!("failed to write {}", sidecar))?;

    output::success(&format!(
        "Packaged {} files ({} entries, {})",
        report.file_count,
        report.entry_count,
        HumanBytes(report.size_bytes)
    ));
    output::kv("SHA-256", &report.checksum);
    output::kv("Checksum file", &sidecar);
    Ok(())
}
