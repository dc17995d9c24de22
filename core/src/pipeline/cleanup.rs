//! Output naming and end-of-export file cleanup.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::ExportOutcome;

/// Outputs smaller than this are considered unusable after a failure.
pub const MIN_OUTPUT_BYTES: u64 = 1000;

/// Suffixes appended to the output path by the encoder's intermediate files.
pub const TEMP_SUFFIXES: [&str; 3] = [".temp_audio.m4a", ".temp_audio.mp3", ".temp"];

/// `<stem>_visualizer.mp4` for a source track.
pub fn default_output_name(track: &Path) -> String {
    let stem = track
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("{}_visualizer.mp4", stem)
}

/// `folder/name`, or `folder/stem_N.ext` with the first free `N`.
pub fn unique_output_path(folder: &Path, name: &str) -> PathBuf {
    let candidate = folder.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let name_path = Path::new(name);
    let stem = name_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = folder.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Temporary files an export of `output` may leave behind.
pub fn temp_artifacts(output: &Path) -> Vec<PathBuf> {
    TEMP_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut path = OsString::from(output.as_os_str());
            path.push(suffix);
            PathBuf::from(path)
        })
        .collect()
}

/// Remove partial output and temp artifacts after an export ends.
///
/// Cancelled exports always lose their output, failed ones only when the
/// file is too small to be usable. Deletion failures are logged, never
/// returned. Returns the paths that were removed.
pub fn cleanup_export(output: &Path, outcome: &ExportOutcome) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    let remove_output = match outcome {
        ExportOutcome::Completed => false,
        ExportOutcome::Cancelled => true,
        ExportOutcome::Failed(_) => match fs::metadata(output) {
            Ok(meta) => meta.len() < MIN_OUTPUT_BYTES,
            Err(_) => false,
        },
    };

    if remove_output && remove_quietly(output) {
        removed.push(output.to_path_buf());
    }

    for temp in temp_artifacts(output) {
        if remove_quietly(&temp) {
            removed.push(temp);
        }
    }
    removed
}

fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            log::info!("Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FailureReason;

    fn write_bytes(path: &Path, len: usize) {
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output_name(Path::new("/music/My Song.flac")),
            "My Song_visualizer.mp4"
        );
        assert_eq!(default_output_name(Path::new("")), "output_visualizer.mp4");
    }

    #[test]
    fn test_unique_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_output_path(dir.path(), "song_visualizer.mp4");
        assert_eq!(first, dir.path().join("song_visualizer.mp4"));

        write_bytes(&first, 1);
        let second = unique_output_path(dir.path(), "song_visualizer.mp4");
        assert_eq!(second, dir.path().join("song_visualizer_1.mp4"));

        write_bytes(&second, 1);
        let third = unique_output_path(dir.path(), "song_visualizer.mp4");
        assert_eq!(third, dir.path().join("song_visualizer_2.mp4"));
    }

    #[test]
    fn test_temp_artifacts() {
        let temps = temp_artifacts(Path::new("/out/video.mp4"));
        assert_eq!(
            temps,
            vec![
                PathBuf::from("/out/video.mp4.temp_audio.m4a"),
                PathBuf::from("/out/video.mp4.temp_audio.mp3"),
                PathBuf::from("/out/video.mp4.temp"),
            ]
        );
    }

    #[test]
    fn test_completed_keeps_output_removes_temps() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("video.mp4");
        write_bytes(&out, 10);
        for temp in temp_artifacts(&out) {
            write_bytes(&temp, 10);
        }

        let removed = cleanup_export(&out, &ExportOutcome::Completed);
        assert!(out.exists());
        assert_eq!(removed.len(), 3);
        assert!(temp_artifacts(&out).iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_cancelled_always_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("video.mp4");
        write_bytes(&out, 50_000);
        cleanup_export(&out, &ExportOutcome::Cancelled);
        assert!(!out.exists());
    }

    #[test]
    fn test_failed_removes_only_small_output() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.mp4");
        let large = dir.path().join("large.mp4");
        write_bytes(&small, 999);
        write_bytes(&large, 1000);

        let failed = ExportOutcome::Failed(FailureReason::Encode);
        cleanup_export(&small, &failed);
        cleanup_export(&large, &failed);
        assert!(!small.exists());
        assert!(large.exists());
    }

    #[test]
    fn test_missing_files_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never_written.mp4");
        assert!(cleanup_export(&out, &ExportOutcome::Cancelled).is_empty());
    }
}
