use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Settings;
use crate::naming::asset_filename;
use crate::ProjectError;

/// Where generated audio lands: `<project>/<library>/<ai subfolder>`, or the
/// configured fallback directory while the project is unsaved.
pub fn output_dir(project_root: Option<&Path>, settings: &Settings) -> Result<PathBuf, ProjectError> {
    match project_root {
        Some(root) => Ok(root.join(&settings.library_folder).join(&settings.ai_subfolder)),
        None => settings.fallback_dir.clone().ok_or(ProjectError::ProjectUnsaved),
    }
}

/// Write `bytes` as `<sanitized prompt>_<n>.<ext>` under `dir`. An existing
/// file is never overwritten; `n` is bumped until a free name is found.
/// Returns the path written and the sequence number it ended up with.
pub fn write_asset(dir: &Path, prompt: &str, sequence_number: u32, extension: &str, bytes: &[u8]) -> Result<(PathBuf, u32), ProjectError> {
    fs::create_dir_all(dir).map_err(|source| ProjectError::Persistence { path: dir.to_path_buf(), source })?;
    let mut n = sequence_number.max(1);
    loop {
        let path = dir.join(asset_filename(prompt, n, extension));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let written = file.write_all(bytes).and_then(|_| file.sync_all());
                if let Err(source) = written {
                    let _ = fs::remove_file(&path);
                    return Err(ProjectError::Persistence { path, source });
                }
                debug!(path = %path.display(), bytes = bytes.len(), "asset written");
                return Ok((path, n));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                n = n.checked_add(1).ok_or_else(|| ProjectError::Persistence {
                    path: path.clone(),
                    source: io::Error::new(io::ErrorKind::AlreadyExists, "no free sequence number"),
                })?;
            }
            Err(source) => return Err(ProjectError::Persistence { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_project_uses_library_layout() {
        let settings = Settings::default();
        let dir = output_dir(Some(Path::new("/projects/film")), &settings).unwrap();
        assert_eq!(dir, PathBuf::from("/projects/film/Audio/AI SFX"));
    }

    #[test]
    fn unsaved_project_needs_a_fallback() {
        let mut settings = Settings::default();
        settings.fallback_dir = None;
        assert!(matches!(output_dir(None, &settings), Err(ProjectError::ProjectUnsaved)));
        settings.fallback_dir = Some(PathBuf::from("/tmp/sfx"));
        assert_eq!(output_dir(None, &settings).unwrap(), PathBuf::from("/tmp/sfx"));
    }

    #[test]
    fn collision_bumps_sequence_number() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("AI SFX");
        let (first, n1) = write_asset(&target, "Door Slam", 1, "mp3", b"one").unwrap();
        let (second, n2) = write_asset(&target, "Door Slam", 1, "mp3", b"two").unwrap();
        assert_eq!((n1, n2), (1, 2));
        assert_eq!(first.file_name().unwrap(), "door_slam_1.mp3");
        assert_eq!(second.file_name().unwrap(), "door_slam_2.mp3");
        assert_eq!(fs::read(&first).unwrap(), b"one");
    }

    #[test]
    fn unwritable_location_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let err = write_asset(&blocker.join("sub"), "boom", 1, "mp3", b"data").unwrap_err();
        assert!(matches!(err, ProjectError::Persistence { .. }));
    }
}
