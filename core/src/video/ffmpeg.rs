//! Encoder backed by an `ffmpeg` child process reading raw RGBA on stdin.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use super::encoder::{EncodeSpec, EncoderFactory, FrameEncoder, VideoError};

/// Spawns `ffmpeg` for each export.
#[derive(Debug, Clone)]
pub struct FfmpegFactory {
    program: OsString,
}

impl FfmpegFactory {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".into(),
        }
    }

    /// Use a specific ffmpeg binary instead of the one on `PATH`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderFactory for FfmpegFactory {
    fn open(&self, spec: &EncodeSpec) -> Result<Box<dyn FrameEncoder>, VideoError> {
        Ok(Box::new(FfmpegEncoder::spawn(&self.program, spec)?))
    }
}

/// Build the ffmpeg argument list for `spec`.
pub fn ffmpeg_args(spec: &EncodeSpec) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        "rgba".into(),
        "-video_size".into(),
        format!("{}x{}", spec.width, spec.height).into(),
        "-framerate".into(),
        spec.fps.to_string().into(),
        "-i".into(),
        "pipe:0".into(),
    ];

    if let Some(audio) = &spec.audio {
        args.push("-i".into());
        args.push(audio.as_os_str().to_owned());
    }

    args.extend([
        "-c:v".into(),
        spec.codec.codec.as_str().into(),
        "-pix_fmt".into(),
        spec.codec.pix_fmt.as_str().into(),
        "-crf".into(),
        spec.codec.crf.to_string().into(),
        "-preset".into(),
        spec.codec.preset.as_str().into(),
    ]);

    if spec.audio.is_some() {
        args.extend([
            OsString::from("-c:a"),
            spec.codec.audio_codec.as_str().into(),
            "-b:a".into(),
            spec.codec.audio_bitrate.as_str().into(),
            "-shortest".into(),
        ]);
    }

    args.push(spec.output.as_os_str().to_owned());
    args
}

/// A running ffmpeg process.
///
/// Dropping an encoder that was neither finished nor aborted kills the
/// process, so an unwinding export never leaves ffmpeg finalizing a
/// partial file.
pub struct FfmpegEncoder {
    child: Child,
    /// `None` once the encoder has been finished or aborted.
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frame_bytes: usize,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn spawn(program: &OsString, spec: &EncodeSpec) -> Result<Self, VideoError> {
        if spec.width == 0 || spec.height == 0 || spec.fps == 0 {
            return Err(VideoError::InvalidConfig(format!(
                "{}x{} @ {}fps",
                spec.width, spec.height, spec.fps
            )));
        }

        let mut child = Command::new(program)
            .args(ffmpeg_args(spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(VideoError::Spawn)?;
        let stdin = child.stdin.take();
        // Drained continuously so a chatty ffmpeg never blocks on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        log::info!(
            "ffmpeg encoder started: {}x{} @ {}fps, codec={} -> {}",
            spec.width,
            spec.height,
            spec.fps,
            spec.codec.codec,
            spec.output.display()
        );

        Ok(Self {
            child,
            stdin,
            stderr,
            frame_bytes: spec.frame_bytes(),
            frames: 0,
        })
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<(), VideoError> {
        if rgba.len() != self.frame_bytes {
            return Err(VideoError::InvalidConfig(format!(
                "frame is {} bytes, expected {}",
                rgba.len(),
                self.frame_bytes
            )));
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            VideoError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "ffmpeg stdin already closed",
            ))
        })?;
        stdin.write_all(rgba)?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), VideoError> {
        // EOF on stdin tells ffmpeg to finalize the container
        drop(self.stdin.take());
        let status = self.child.wait()?;
        let stderr = self.collect_stderr();
        if !status.success() {
            return Err(VideoError::ExitStatus {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        log::info!("ffmpeg encoding complete ({} frames)", self.frames);
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        self.kill();
        log::info!("ffmpeg encoding aborted after {} frames", self.frames);
    }
}

impl FfmpegEncoder {
    /// Process id of the running ffmpeg.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.kill() {
            log::debug!("ffmpeg already exited: {}", e);
        }
        if let Err(e) = self.child.wait() {
            log::warn!("Failed to reap ffmpeg: {}", e);
        }
        self.collect_stderr();
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            log::warn!(
                "ffmpeg encoder dropped after {} frames without finishing, killing it",
                self.frames
            );
            self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportSettings;
    use std::path::Path;

    fn args_as_strings(spec: &EncodeSpec) -> Vec<String> {
        ffmpeg_args(spec)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_args_with_audio() {
        let settings = ExportSettings {
            width: 640,
            height: 360,
            fps: 30,
            ..Default::default()
        };
        let spec = EncodeSpec::new(Path::new("out.mp4"), &settings, Some(Path::new("song.mp3")));
        let args = args_as_strings(&spec);

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-video_size") + 1], "640x360");
        assert_eq!(args[pos("-framerate") + 1], "30");
        assert_eq!(args[pos("-c:v") + 1], "libx264");
        assert_eq!(args[pos("-crf") + 1], "18");
        assert_eq!(args[pos("-c:a") + 1], "aac");
        assert!(args.contains(&"song.mp3".to_string()));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_args_without_audio() {
        let spec = EncodeSpec::new(Path::new("silent.mp4"), &ExportSettings::default(), None);
        let args = args_as_strings(&spec);
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert!(!args.contains(&"-c:a".to_string()));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let factory = FfmpegFactory::with_program("/nonexistent/ffmpeg-binary");
        let spec = EncodeSpec::new(Path::new("x.mp4"), &ExportSettings::default(), None);
        match factory.open(&spec) {
            Err(VideoError::Spawn(_)) => {}
            other => panic!("expected spawn error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_zero_fps_rejected() {
        let mut spec = EncodeSpec::new(Path::new("x.mp4"), &ExportSettings::default(), None);
        spec.fps = 0;
        assert!(matches!(
            FfmpegEncoder::spawn(&"ffmpeg".into(), &spec),
            Err(VideoError::InvalidConfig(_))
        ));
    }

    /// Executable shell script standing in for ffmpeg; ignores its arguments.
    #[cfg(unix)]
    fn stand_in(dir: &Path, body: &str) -> OsString {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.into_os_string()
    }

    /// Spawn, retrying while another test's fork still holds the script open.
    #[cfg(unix)]
    fn spawn_stand_in(program: &OsString, spec: &EncodeSpec) -> FfmpegEncoder {
        const ETXTBSY: i32 = 26;
        for _ in 0..50 {
            match FfmpegEncoder::spawn(program, spec) {
                Err(VideoError::Spawn(e)) if e.raw_os_error() == Some(ETXTBSY) => {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                other => return other.unwrap(),
            }
        }
        panic!("stand-in stayed busy");
    }

    fn spec_in(dir: &Path, width: u32, height: u32) -> EncodeSpec {
        let settings = ExportSettings {
            width,
            height,
            fps: 10,
            ..Default::default()
        };
        EncodeSpec::new(&dir.join("out.mp4"), &settings, None)
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dropped_encoder_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let program = stand_in(dir.path(), "exec sleep 30");
        let encoder = spawn_stand_in(&program, &spec_in(dir.path(), 4, 2));
        let pid = encoder.id();
        assert!(Path::new(&format!("/proc/{}", pid)).exists());

        let boxed: Box<dyn FrameEncoder> = Box::new(encoder);
        drop(boxed);
        // Killed and reaped, so the pid is gone
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_noisy_stderr_does_not_block_encoding() {
        let dir = tempfile::tempdir().unwrap();
        // Far more than a pipe buffer of diagnostics before reading any input
        let program = stand_in(dir.path(), "head -c 400000 /dev/zero >&2; cat > /dev/null");
        // Each frame alone overflows the stdin pipe
        let spec = spec_in(dir.path(), 256, 256);
        let mut encoder: Box<dyn FrameEncoder> =
            Box::new(spawn_stand_in(&program, &spec));

        let frame = vec![0u8; spec.frame_bytes()];
        for _ in 0..4 {
            encoder.write_frame(&frame).unwrap();
        }
        encoder.finish().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = stand_in(dir.path(), "echo 'codec not found' >&2; exit 3");
        let encoder: Box<dyn FrameEncoder> =
            Box::new(spawn_stand_in(&program, &spec_in(dir.path(), 4, 2)));

        match encoder.finish() {
            Err(VideoError::ExitStatus { stderr, .. }) => assert_eq!(stderr, "codec not found"),
            other => panic!("expected exit status error, got {:?}", other),
        }
    }
}
