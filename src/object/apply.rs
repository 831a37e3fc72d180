// src/object/apply.rs

//! Applying object actions to the local machine
//!
//! The filesystem and process primitives sit behind [`ActionRunner`] so that
//! template application can be exercised without touching the real system.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

use super::{ActionKind, Object, ObjectAction, ObjectSource};
use crate::error::{Error, Result};

/// Primitive operations used when applying object actions
pub trait ActionRunner {
    /// Copy `src` to `dst`, creating parent directories
    fn copy(&mut self, src: &Path, dst: &Path) -> Result<()>;

    /// Unpack a (possibly compressed) tar archive into `dst`
    fn extract_archive(&mut self, archive: &Path, dst: &Path) -> Result<()>;

    /// Run a command to completion; a non-zero exit is an error
    fn run_command(&mut self, argv: &[String]) -> Result<()>;

    /// Directory for `-once` markers; `None` disables once tracking
    fn state_dir(&self) -> Option<&Path> {
        None
    }
}

/// Runner acting directly on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalRunner {
    state_dir: Option<PathBuf>,
}

impl LocalRunner {
    pub fn new(state_dir: Option<PathBuf>) -> Self {
        Self { state_dir }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Xz,
}

fn detect_compression(path: &Path) -> Result<Compression> {
    let mut magic = [0u8; 6];
    let mut file = File::open(path)
        .map_err(|e| Error::ActionError(format!("Failed to open {}: {}", path.display(), e)))?;
    let n = file.read(&mut magic)?;

    Ok(match &magic[..n] {
        [0x1f, 0x8b, ..] => Compression::Gzip,
        [0xfd, b'7', b'z', b'X', b'Z', 0x00] => Compression::Xz,
        _ => Compression::None,
    })
}

impl ActionRunner for LocalRunner {
    fn copy(&mut self, src: &Path, dst: &Path) -> Result<()> {
        if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst).map_err(|e| {
            Error::ActionError(format!(
                "Failed to copy {} to {}: {}",
                src.display(),
                dst.display(),
                e
            ))
        })?;
        Ok(())
    }

    fn extract_archive(&mut self, archive: &Path, dst: &Path) -> Result<()> {
        let file = File::open(archive).map_err(|e| {
            Error::ActionError(format!("Failed to open archive {}: {}", archive.display(), e))
        })?;
        let reader: Box<dyn Read> = match detect_compression(archive)? {
            Compression::Gzip => Box::new(GzDecoder::new(BufReader::new(file))),
            Compression::Xz => Box::new(XzDecoder::new(BufReader::new(file))),
            Compression::None => Box::new(BufReader::new(file)),
        };

        fs::create_dir_all(dst)?;
        Archive::new(reader).unpack(dst).map_err(|e| {
            Error::ActionError(format!(
                "Failed to extract {} into {}: {}",
                archive.display(),
                dst.display(),
                e
            ))
        })
    }

    fn run_command(&mut self, argv: &[String]) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::ActionError("empty command".to_string()))?;

        debug!("Running: {}", argv.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::ActionError(format!("Failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(Error::ActionError(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }
}

/// Object content made available as a file
enum Content {
    Temp(NamedTempFile),
    Local(PathBuf),
}

impl Content {
    fn path(&self) -> &Path {
        match self {
            Content::Temp(file) => file.path(),
            Content::Local(path) => path,
        }
    }
}

impl Object {
    fn materialize(&self) -> Result<Content> {
        match (self.source(), self.data()) {
            (Some(ObjectSource::External(location)), _) => {
                let path = match url::Url::parse(location) {
                    Ok(url) if url.scheme() == "file" => url.to_file_path().map_err(|_| {
                        Error::ActionError(format!("invalid file URL '{}'", location))
                    })?,
                    Ok(url) => {
                        return Err(Error::ActionError(format!(
                            "object '{}': {} sources must be fetched before applying",
                            self.name(),
                            url.scheme()
                        )));
                    }
                    Err(_) => PathBuf::from(location),
                };
                Ok(Content::Local(path))
            }
            (_, Some(data)) => {
                let mut file = NamedTempFile::new()?;
                file.write_all(data.as_bytes())?;
                file.flush()?;
                Ok(Content::Temp(file))
            }
            _ => Err(Error::ActionError(format!(
                "object '{}' has no content to apply",
                self.name()
            ))),
        }
    }

    fn once_marker(&self, runner: &dyn ActionRunner, kind: ActionKind) -> Option<PathBuf> {
        let key = self.checksum().unwrap_or(self.name());
        runner
            .state_dir()
            .map(|dir| dir.join("once").join(format!("{}-{}", key, kind)))
    }

    /// Apply every local action in order, returning how many ran
    ///
    /// Kickstart hooks are skipped; they only matter to kickstart output.
    /// A `-once` action is skipped when its marker already exists in the
    /// runner's state directory.
    pub fn apply_actions(&self, runner: &mut dyn ActionRunner) -> Result<usize> {
        let local: Vec<&ObjectAction> = self
            .actions()
            .iter()
            .filter(|a| !a.kind.is_kickstart())
            .collect();
        if local.is_empty() {
            return Ok(0);
        }

        let content = self.materialize()?;
        let mut applied = 0;

        for action in local {
            let marker = if action.kind.is_once() {
                let marker = self.once_marker(runner, action.kind);
                match &marker {
                    Some(path) if path.exists() => {
                        debug!("Skipping {} for {}: already applied", action.kind, self);
                        continue;
                    }
                    None => warn!("No state directory; {} for {} will repeat", action.kind, self),
                    _ => {}
                }
                marker
            } else {
                None
            };

            info!("Applying {} for {}", action.kind, self);
            match action.kind {
                ActionKind::Copy | ActionKind::CopyOnce => {
                    runner.copy(content.path(), Path::new(self.action_path(action)?))?;
                }
                ActionKind::Extract | ActionKind::ExtractOnce => {
                    runner.extract_archive(content.path(), Path::new(self.action_path(action)?))?;
                }
                ActionKind::Execute | ActionKind::ExecuteOnce => {
                    let interp = action.str_param("interp").unwrap_or("/bin/sh");
                    let argv = vec![interp.to_string(), content.path().display().to_string()];
                    runner.run_command(&argv)?;
                }
                _ => continue,
            }
            applied += 1;

            if let Some(marker) = marker {
                if let Some(parent) = marker.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&marker, b"")?;
            }
        }
        Ok(applied)
    }

    fn action_path<'a>(&self, action: &'a ObjectAction) -> Result<&'a str> {
        action.path().ok_or_else(|| {
            Error::ActionError(format!(
                "{} action of object '{}' has no path",
                action.kind,
                self.name()
            ))
        })
    }
}
