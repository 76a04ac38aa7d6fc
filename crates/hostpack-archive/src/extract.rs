//! Archive extraction and listing for zip and tar.gz

use crate::archive::ArchiveFormat;
use crate::error::{ArchiveError, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, warn};

fn open(archive: &Path) -> Result<File> {
    File::open(archive).map_err(|e| ArchiveError::io(archive, e))
}

/// Extract `archive` into `dest`, returning the number of entries written.
///
/// Entries whose paths would land outside `dest` are refused by the
/// underlying readers. Any read or decode failure is reported as
/// [`ArchiveError::Corrupt`].
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    let format = ArchiveFormat::from_path(archive)?;
    fs::create_dir_all(dest).map_err(|e| ArchiveError::io(dest, e))?;
    debug!("Extracting {} into {}", archive.display(), dest.display());

    match format {
        ArchiveFormat::Zip => {
            let mut zip = zip::ZipArchive::new(open(archive)?)
                .map_err(|e| ArchiveError::corrupt(archive, e))?;
            let count = zip.len();
            zip.extract(dest)
                .map_err(|e| ArchiveError::corrupt(archive, e))?;
            Ok(count)
        }
        ArchiveFormat::TarGz => {
            let mut tar = tar::Archive::new(GzDecoder::new(open(archive)?));
            tar.set_overwrite(true);
            let mut count = 0;
            for entry in tar
                .entries()
                .map_err(|e| ArchiveError::corrupt(archive, e))?
            {
                let mut entry = entry.map_err(|e| ArchiveError::corrupt(archive, e))?;
                let unpacked = entry
                    .unpack_in(dest)
                    .map_err(|e| ArchiveError::corrupt(archive, e))?;
                if unpacked {
                    count += 1;
                } else {
                    warn!(
                        "Refused unsafe entry {} in {}",
                        entry.path().map(|p| p.display().to_string()).unwrap_or_default(),
                        archive.display()
                    );
                }
            }
            Ok(count)
        }
    }
}

/// List entry names in `archive`, without trailing slashes, sorted.
pub fn list_entries(archive: &Path) -> Result<Vec<String>> {
    let format = ArchiveFormat::from_path(archive)?;

    let mut names: Vec<String> = match format {
        ArchiveFormat::Zip => {
            let zip = zip::ZipArchive::new(open(archive)?)
                .map_err(|e| ArchiveError::corrupt(archive, e))?;
            zip.file_names().map(str::to_string).collect()
        }
        ArchiveFormat::TarGz => {
            let mut tar = tar::Archive::new(GzDecoder::new(open(archive)?));
            let mut names = Vec::new();
            for entry in tar
                .entries()
                .map_err(|e| ArchiveError::corrupt(archive, e))?
            {
                let entry = entry.map_err(|e| ArchiveError::corrupt(archive, e))?;
                let path = entry
                    .path()
                    .map_err(|e| ArchiveError::corrupt(archive, e))?;
                names.push(path.to_string_lossy().into_owned());
            }
            names
        }
    };

    for name in &mut names {
        while name.ends_with('/') {
            name.pop();
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveSource, ArchiveWriter};
    use crate::filter::PathFilter;
    use tempfile::TempDir;

    fn build(source: &Path, dest: &Path) {
        let sources = vec![ArchiveSource::new(source, "app", PathFilter::identity())];
        ArchiveWriter::new().build(dest, &sources).unwrap();
    }

    #[test]
    fn test_extract_both_formats() {
        let source = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("config")).unwrap();
        fs::write(source.path().join("config/app.php"), "<?php return [];").unwrap();

        for name in ["pkg.zip", "backup.tar.gz"] {
            let work = TempDir::new().unwrap();
            let archive = work.path().join(name);
            build(source.path(), &archive);

            let dest = work.path().join("out");
            let count = extract_archive(&archive, &dest).unwrap();

            assert_eq!(count, 3, "{}", name);
            assert_eq!(
                fs::read_to_string(dest.join("app/config/app.php")).unwrap(),
                "<?php return [];"
            );
        }
    }

    #[test]
    fn test_list_entries_strips_directory_slashes() {
        let source = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("lib")).unwrap();
        fs::write(source.path().join("lib/a.txt"), "a").unwrap();

        let work = TempDir::new().unwrap();
        let archive = work.path().join("pkg.zip");
        build(source.path(), &archive);

        assert_eq!(
            list_entries(&archive).unwrap(),
            vec!["app", "app/lib", "app/lib/a.txt"]
        );
    }

    #[test]
    fn test_corrupt_archive() {
        let work = TempDir::new().unwrap();
        for name in ["broken.zip", "broken.tar.gz"] {
            let archive = work.path().join(name);
            fs::write(&archive, b"definitely not an archive").unwrap();

            assert!(matches!(
                extract_archive(&archive, &work.path().join("out")),
                Err(ArchiveError::Corrupt { .. })
            ));
            assert!(matches!(
                list_entries(&archive),
                Err(ArchiveError::Corrupt { .. })
            ));
        }
    }

    #[test]
    fn test_missing_archive_is_io_error() {
        let work = TempDir::new().unwrap();
        assert!(matches!(
            list_entries(&work.path().join("missing.zip")),
            Err(ArchiveError::Io { .. })
        ));
    }
}
