//! Source archive extraction.
//!
//! Unpacks `.tar.gz`, `.tar.zst`, plain `.tar`, and `.zip` archives into a
//! scratch directory with path traversal protection to prevent zip-slip
//! attacks. The archive format is sniffed from its leading bytes rather than
//! trusted from the URL.

use log::debug;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const ZIP_MAGIC: &[u8] = &[0x50, 0x4b, 0x03, 0x04];

/// Unpacks a downloaded source archive into a scratch directory.
///
/// The pipeline only sees this trait, so stage tests can substitute a
/// mock that fails or produces a canned tree.
///
/// ```
/// use formula_installer::extraction::{ArchiveExtractor, SourceExtractor};
///
/// fn unpacker() -> impl SourceExtractor {
///     ArchiveExtractor
/// }
/// # let _ = unpacker();
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait SourceExtractor {
    /// Unpack `archive_path` beneath `dest_dir`, returning the relative
    /// paths of every regular file written.
    ///
    /// # Errors
    ///
    /// Fails with [`ExtractionError::PathTraversal`] when a member would land
    /// outside `dest_dir`, [`ExtractionError::EmptyArchive`] when the archive
    /// holds no files, and [`ExtractionError::Io`] or [`ExtractionError::Zip`]
    /// when the container cannot be read.
    fn extract(&self, archive_path: &Path, dest_dir: &Path)
    -> Result<Vec<String>, ExtractionError>;
}

/// Reasons an archive could not be unpacked.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// Reading the archive or writing a member failed.
    #[error("could not unpack archive: {0}")]
    Io(#[from] io::Error),

    /// The zip container is corrupt.
    #[error("invalid zip archive: {0}")]
    Zip(String),

    /// A member path or link target points outside the scratch directory.
    #[error("archive member escapes the unpack directory: {path}")]
    PathTraversal {
        /// Member path as recorded in the archive.
        path: String,
    },

    /// No regular files were found in the archive.
    #[error("archive has no files to build from")]
    EmptyArchive,
}

impl From<zip::result::ZipError> for ExtractionError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(source) => Self::Io(source),
            other => Self::Zip(other.to_string()),
        }
    }
}

/// Container formats recognised by their magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball.
    TarGz,
    /// Zstandard-compressed tarball.
    TarZst,
    /// Zip archive.
    Zip,
    /// Uncompressed tarball.
    Tar,
}

impl ArchiveFormat {
    /// Identify the format from the first bytes of an archive.
    #[must_use]
    pub fn sniff(header: &[u8]) -> Self {
        if header.starts_with(GZIP_MAGIC) {
            Self::TarGz
        } else if header.starts_with(ZSTD_MAGIC) {
            Self::TarZst
        } else if header.starts_with(ZIP_MAGIC) {
            Self::Zip
        } else {
            Self::Tar
        }
    }
}

/// Extractor backed by the `tar`, `flate2`, `zstd` and `zip` crates.
///
/// Every member path is checked before anything is written, so a hostile
/// archive cannot place files outside the scratch directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl SourceExtractor for ArchiveExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
    ) -> Result<Vec<String>, ExtractionError> {
        let format = detect_format(archive_path)?;
        debug!("extracting {} as {format:?}", archive_path.display());

        let file = File::open(archive_path)?;
        let extracted = match format {
            ArchiveFormat::TarGz => unpack_tar(flate2::read::GzDecoder::new(file), dest_dir)?,
            ArchiveFormat::TarZst => unpack_tar(zstd::Decoder::new(file)?, dest_dir)?,
            ArchiveFormat::Tar => unpack_tar(file, dest_dir)?,
            ArchiveFormat::Zip => unpack_zip(file, dest_dir)?,
        };

        if extracted.is_empty() {
            return Err(ExtractionError::EmptyArchive);
        }
        Ok(extracted)
    }
}

/// Read the first bytes of `archive_path` and identify its format.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn detect_format(archive_path: &Path) -> io::Result<ArchiveFormat> {
    let mut header = [0u8; 4];
    let mut file = File::open(archive_path)?;
    let mut filled = 0;
    while filled < header.len() {
        let Some(rest) = header.get_mut(filled..) else {
            break;
        };
        let read = file.read(rest)?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(ArchiveFormat::sniff(header.get(..filled).unwrap_or(&[])))
}

/// Locate the source tree inside an extraction directory.
///
/// Release tarballs conventionally wrap everything in one top-level
/// directory (`claude-cli-0.1.0/`); when that is the only entry, it is the
/// source root. Otherwise the extraction directory itself is.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be listed.
pub fn source_root(extract_dir: &Path) -> io::Result<PathBuf> {
    let mut entries = fs::read_dir(extract_dir)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() == 1 {
        if let Some(only) = entries.pop() {
            if only.file_type()?.is_dir() {
                return Ok(only.path());
            }
        }
    }
    Ok(extract_dir.to_path_buf())
}

fn unpack_tar(reader: impl Read, dest_dir: &Path) -> Result<Vec<String>, ExtractionError> {
    let root = dest_dir.canonicalize()?;
    let mut tarball = tar::Archive::new(reader);
    tarball.set_preserve_permissions(true);
    let mut written = Vec::new();

    for next in tarball.entries()? {
        let mut member = next?;
        let relative = member.path()?.into_owned();
        validate_entry_path(&relative)?;
        let parent = ensure_parent_inside(&root, &relative)?;

        let kind = member.header().entry_type();
        if let Some(target) = member.link_name()? {
            if kind.is_hard_link() {
                validate_entry_path(&target)?;
            } else {
                validate_link_target(&relative, &target)?;
                if !resolve_link_target(&parent, &target)?.starts_with(&root) {
                    return Err(traversal(&relative, &target));
                }
            }
        }

        if !member.unpack_in(&root)? {
            return Err(ExtractionError::PathTraversal {
                path: relative.display().to_string(),
            });
        }
        if kind.is_file() {
            written.push(relative.to_string_lossy().into_owned());
        }
    }

    Ok(written)
}

/// Create the parent directories of `relative` under `root` one component
/// at a time, resolving each through any symlinks already unpacked.
///
/// Returns the canonical parent. Fails as soon as a component resolves
/// outside `root`, before anything is created beyond it.
fn ensure_parent_inside(root: &Path, relative: &Path) -> Result<PathBuf, ExtractionError> {
    let mut current = root.to_path_buf();
    let Some(parent) = relative.parent() else {
        return Ok(current);
    };
    for component in parent.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        let next = current.join(part);
        if fs::symlink_metadata(&next).is_err() {
            fs::create_dir(&next)?;
        }
        current = next.canonicalize()?;
        if !current.starts_with(root) {
            return Err(ExtractionError::PathTraversal {
                path: format!("{} (resolves to {})", relative.display(), current.display()),
            });
        }
    }
    Ok(current)
}

/// Resolve a relative symlink `target` from the canonical directory `base`,
/// following symlinks that already exist along the way.
fn resolve_link_target(base: &Path, target: &Path) -> io::Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in target.components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                let next = resolved.join(part);
                resolved = match next.canonicalize() {
                    Ok(real) => real,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => next,
                    Err(err) => return Err(err),
                };
            }
            _ => {}
        }
    }
    Ok(resolved)
}

fn traversal(entry_path: &Path, link: &Path) -> ExtractionError {
    ExtractionError::PathTraversal {
        path: format!("{} -> {}", entry_path.display(), link.display()),
    }
}

fn unpack_zip(file: File, dest_dir: &Path) -> Result<Vec<String>, ExtractionError> {
    let root = dest_dir.canonicalize()?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(entry_path) = entry.enclosed_name() else {
            return Err(ExtractionError::PathTraversal {
                path: entry.name().to_owned(),
            });
        };
        validate_entry_path(&entry_path)?;
        let parent = ensure_parent_inside(&root, &entry_path)?;

        let dest_path = root.join(&entry_path);
        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        let Some(file_name) = entry_path.file_name() else {
            continue;
        };
        let target = parent.join(file_name);
        let mut output = File::create(&target)?;
        io::copy(&mut entry, &mut output)?;
        apply_unix_mode(&target, entry.unix_mode())?;

        extracted.push(entry_path.to_string_lossy().into_owned());
    }

    Ok(extracted)
}

#[cfg(unix)]
fn apply_unix_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    match mode {
        Some(bits) => fs::set_permissions(path, fs::Permissions::from_mode(bits & 0o777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_unix_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// Refuse absolute member paths and any that climb out with `..`.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Validate that a link entry resolves inside the destination directory.
fn validate_link_target(entry_path: &Path, link: &Path) -> Result<(), ExtractionError> {
    if link.is_absolute() {
        return Err(traversal(entry_path, link));
    }
    let mut depth: usize = entry_path.components().count().saturating_sub(1);
    for component in link.components() {
        match component {
            Component::ParentDir => {
                if depth == 0 {
                    return Err(traversal(entry_path, link));
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
            _ => {}
        }
    }
    Ok(())
}
