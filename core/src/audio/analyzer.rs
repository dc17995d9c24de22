//! Background spectral analysis with time-indexed queries.
//!
//! [`SpectralAnalyzer`] owns the analysis state machine:
//!
//! ```text
//! Empty -> Analyzing -> Ready
//!                    -> Failed
//! ```
//!
//! A build runs on its own thread and publishes the finished [`Spectrogram`]
//! exactly once. Queries never block on a build: until the track is ready
//! they return a low-amplitude placeholder vector.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use rand::Rng;

use super::loader::{AudioData, AudioDecoder, SymphoniaDecoder};
use super::spectrogram::{AnalysisError, Spectrogram};
use crate::config::AnalyzerConfig;

/// Lifecycle of the analyzed track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    Empty,
    Analyzing,
    Ready,
    Failed,
}

/// How a single build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The track was published.
    Ready,
    /// Decode or transform failed; the analyzer is now `Failed`.
    Failed,
    /// A newer load started before this build finished; its result was dropped.
    Superseded,
}

/// Callback invoked on the build thread after a successful publish.
pub type ReadyCallback = Box<dyn FnOnce(Arc<Spectrogram>) + Send + 'static>;

/// Completion signal for one build.
///
/// Any thread may hold the handle and wait on it; the build thread sends
/// exactly one outcome.
#[derive(Debug)]
pub struct AnalysisHandle {
    generation: u64,
    rx: Receiver<BuildOutcome>,
}

impl AnalysisHandle {
    /// Block until the build finishes or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<BuildOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            // Sender dropped without reporting: the build thread died.
            Err(RecvTimeoutError::Disconnected) => Some(BuildOutcome::Failed),
        }
    }

    /// Non-blocking check for completion.
    pub fn try_outcome(&self) -> Option<BuildOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(BuildOutcome::Failed),
        }
    }

    /// Build generation this handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Shared {
    state: AnalysisState,
    track: Option<Arc<Spectrogram>>,
    generation: u64,
    last_error: Option<String>,
}

/// Decodes tracks and answers "spectral vector at time t" queries.
///
/// Cheap to share: wrap it in an `Arc` and query from any thread.
pub struct SpectralAnalyzer {
    config: AnalyzerConfig,
    decoder: Arc<dyn AudioDecoder>,
    shared: Arc<RwLock<Shared>>,
}

impl SpectralAnalyzer {
    /// Analyzer decoding files with Symphonia.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_decoder(config, Arc::new(SymphoniaDecoder))
    }

    /// Analyzer with a custom decode collaborator.
    pub fn with_decoder(config: AnalyzerConfig, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self {
            config,
            decoder,
            shared: Arc::new(RwLock::new(Shared {
                state: AnalysisState::Empty,
                track: None,
                generation: 0,
                last_error: None,
            })),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Length of every vector returned by [`query_at`](Self::query_at).
    pub fn bands(&self) -> usize {
        self.config.bands
    }

    pub fn state(&self) -> AnalysisState {
        self.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == AnalysisState::Ready
    }

    /// The published track, once ready.
    pub fn track(&self) -> Option<Arc<Spectrogram>> {
        self.read().track.clone()
    }

    /// Detail of the most recent failed build.
    pub fn last_error(&self) -> Option<String> {
        self.read().last_error.clone()
    }

    /// Start analyzing `path` on a background thread.
    pub fn load(&self, path: impl AsRef<Path>) -> AnalysisHandle {
        self.load_with_callback(path, None)
    }

    /// Start analyzing `path`, invoking `on_ready` after a successful publish.
    ///
    /// The callback runs on the build thread. Anything that must happen on
    /// another thread should be forwarded from it, or observed through the
    /// returned handle instead.
    pub fn load_with_callback(
        &self,
        path: impl AsRef<Path>,
        on_ready: Option<ReadyCallback>,
    ) -> AnalysisHandle {
        let path = path.as_ref().to_path_buf();
        let generation = self.begin();
        let (tx, rx) = bounded(1);

        log::info!("Analyzing {}", path.display());

        let shared = Arc::clone(&self.shared);
        let decoder = Arc::clone(&self.decoder);
        let config = self.config.clone();
        let job_tx = tx.clone();

        let spawned = thread::Builder::new()
            .name("spectral-analysis".into())
            .spawn(move || {
                let build = || {
                    decoder
                        .decode(&path)
                        .map_err(AnalysisError::from)
                        .and_then(|audio| Spectrogram::from_audio(&audio, Some(path), &config))
                };
                let result = panic::catch_unwind(AssertUnwindSafe(build)).unwrap_or_else(|payload| {
                    Err(AnalysisError::Panicked(panic_message(&*payload)))
                });
                let outcome = publish(&shared, generation, result, on_ready);
                let _ = job_tx.send(outcome);
            });

        if let Err(e) = spawned {
            let outcome = publish(
                &self.shared,
                generation,
                Err(AnalysisError::Decode(e.into())),
                None,
            );
            let _ = tx.send(outcome);
        }

        AnalysisHandle { generation, rx }
    }

    /// Analyze already decoded audio on the calling thread and publish it.
    pub fn build_from_samples(
        &self,
        audio: &AudioData,
        source: Option<PathBuf>,
    ) -> Result<Arc<Spectrogram>, AnalysisError> {
        let generation = self.begin();
        let result = Spectrogram::from_audio(audio, source, &self.config);
        match result {
            Ok(track) => {
                let track = Arc::new(track);
                publish_track(&self.shared, generation, Arc::clone(&track));
                Ok(track)
            }
            Err(e) => {
                fail(&self.shared, generation, &e);
                Err(e)
            }
        }
    }

    /// Spectral vector at `time` seconds.
    ///
    /// Never blocks on a build and never fails: while no track is ready the
    /// result is a placeholder of small positive values.
    pub fn query_at(&self, time: f64) -> Vec<f32> {
        match self.track() {
            Some(track) => track.vector_at(time, self.config.bands),
            None => placeholder_vector(self.config.bands, self.config.placeholder_amplitude),
        }
    }

    /// Drop the current track and return to `Empty`.
    ///
    /// Any build still running is superseded.
    pub fn reset(&self) {
        let mut shared = self.write();
        shared.generation += 1;
        shared.state = AnalysisState::Empty;
        shared.track = None;
        shared.last_error = None;
    }

    fn begin(&self) -> u64 {
        let mut shared = self.write();
        shared.generation += 1;
        shared.state = AnalysisState::Analyzing;
        shared.track = None;
        shared.last_error = None;
        shared.generation
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

/// Random vector with values in `(0, amplitude]`.
pub fn placeholder_vector(len: usize, amplitude: f32) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| amplitude * (1.0 - rng.gen::<f32>()))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

fn publish(
    shared: &RwLock<Shared>,
    generation: u64,
    result: Result<Spectrogram, AnalysisError>,
    on_ready: Option<ReadyCallback>,
) -> BuildOutcome {
    match result {
        Ok(track) => {
            let track = Arc::new(track);
            if !publish_track(shared, generation, Arc::clone(&track)) {
                return BuildOutcome::Superseded;
            }
            if let Some(callback) = on_ready {
                callback(track);
            }
            BuildOutcome::Ready
        }
        Err(e) => {
            if fail(shared, generation, &e) {
                BuildOutcome::Failed
            } else {
                BuildOutcome::Superseded
            }
        }
    }
}

fn publish_track(shared: &RwLock<Shared>, generation: u64, track: Arc<Spectrogram>) -> bool {
    let mut guard = shared.write().unwrap_or_else(PoisonError::into_inner);
    if guard.generation != generation {
        log::debug!("Discarding stale analysis (generation {})", generation);
        return false;
    }
    log::info!(
        "Analysis ready: {} frames x {} bins, {:.2}s",
        track.num_frames(),
        track.num_bins(),
        track.duration()
    );
    guard.track = Some(track);
    guard.state = AnalysisState::Ready;
    true
}

fn fail(shared: &RwLock<Shared>, generation: u64, error: &AnalysisError) -> bool {
    let mut guard = shared.write().unwrap_or_else(PoisonError::into_inner);
    if guard.generation != generation {
        return false;
    }
    log::error!("Analysis failed: {}", error);
    guard.state = AnalysisState::Failed;
    guard.last_error = Some(error.to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::loader::AudioError;
    use crate::audio::synth::generate_sine;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(10);

    /// Decoder returning a fixed sine, optionally after waiting on a gate.
    struct SineDecoder {
        seconds: f32,
        gate: Option<Mutex<Receiver<()>>>,
    }

    impl AudioDecoder for SineDecoder {
        fn decode(&self, _path: &Path) -> Result<AudioData, AudioError> {
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            Ok(AudioData::mono(
                generate_sine(440.0, 22050, self.seconds, 0.5),
                22050,
            ))
        }
    }

    struct BrokenDecoder;

    impl AudioDecoder for BrokenDecoder {
        fn decode(&self, _path: &Path) -> Result<AudioData, AudioError> {
            Err(AudioError::NoAudioTrack)
        }
    }

    struct PanickingDecoder;

    impl AudioDecoder for PanickingDecoder {
        fn decode(&self, _path: &Path) -> Result<AudioData, AudioError> {
            panic!("decoder blew up");
        }
    }

    fn sine_analyzer(seconds: f32) -> SpectralAnalyzer {
        SpectralAnalyzer::with_decoder(
            AnalyzerConfig::default(),
            Arc::new(SineDecoder {
                seconds,
                gate: None,
            }),
        )
    }

    #[test]
    fn test_initial_state_is_empty() {
        let analyzer = SpectralAnalyzer::default();
        assert_eq!(analyzer.state(), AnalysisState::Empty);
        assert!(analyzer.track().is_none());
    }

    #[test]
    fn test_load_reaches_ready() {
        let analyzer = sine_analyzer(1.0);
        let handle = analyzer.load("sine.wav");
        assert_eq!(handle.wait(WAIT), Some(BuildOutcome::Ready));
        assert_eq!(analyzer.state(), AnalysisState::Ready);

        let vector = analyzer.query_at(0.5);
        assert_eq!(vector.len(), 64);
        assert!(vector.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_callback_runs_on_success() {
        let analyzer = sine_analyzer(0.5);
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let handle = analyzer.load_with_callback(
            "sine.wav",
            Some(Box::new(move |track| {
                assert!(track.num_frames() > 0);
                flag.store(true, Ordering::SeqCst);
            })),
        );
        assert_eq!(handle.wait(WAIT), Some(BuildOutcome::Ready));
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_decode_failure_sets_failed_and_keeps_placeholder() {
        let analyzer =
            SpectralAnalyzer::with_decoder(AnalyzerConfig::default(), Arc::new(BrokenDecoder));
        let handle = analyzer.load("broken.mp3");
        assert_eq!(handle.wait(WAIT), Some(BuildOutcome::Failed));
        assert_eq!(analyzer.state(), AnalysisState::Failed);
        assert!(analyzer.last_error().is_some());

        let vector = analyzer.query_at(1.0);
        assert_eq!(vector.len(), 64);
        assert!(vector.iter().all(|&v| v > 0.0 && v <= 0.1));
    }

    #[test]
    fn test_decoder_panic_sets_failed() {
        let analyzer =
            SpectralAnalyzer::with_decoder(AnalyzerConfig::default(), Arc::new(PanickingDecoder));
        assert_eq!(analyzer.load("bad.mp3").wait(WAIT), Some(BuildOutcome::Failed));
        assert_eq!(analyzer.state(), AnalysisState::Failed);
        assert!(analyzer
            .last_error()
            .is_some_and(|e| e.contains("decoder blew up")));
        assert_eq!(analyzer.query_at(1.0).len(), 64);
    }

    #[test]
    fn test_query_during_build_returns_placeholder() {
        let (gate_tx, gate_rx) = bounded(1);
        let analyzer = SpectralAnalyzer::with_decoder(
            AnalyzerConfig::default(),
            Arc::new(SineDecoder {
                seconds: 0.5,
                gate: Some(Mutex::new(gate_rx)),
            }),
        );
        let handle = analyzer.load("slow.wav");
        assert_eq!(analyzer.state(), AnalysisState::Analyzing);

        let vector = analyzer.query_at(0.1);
        assert_eq!(vector.len(), 64);
        assert!(vector.iter().all(|&v| v > 0.0 && v <= 0.1));

        gate_tx.send(()).unwrap();
        assert_eq!(handle.wait(WAIT), Some(BuildOutcome::Ready));
    }

    #[test]
    fn test_newer_load_supersedes_running_build() {
        let (gate_tx, gate_rx) = bounded(1);
        let slow = SpectralAnalyzer::with_decoder(
            AnalyzerConfig::default(),
            Arc::new(SineDecoder {
                seconds: 0.5,
                gate: Some(Mutex::new(gate_rx)),
            }),
        );
        let stale = slow.load("first.wav");

        // A synchronous build bumps the generation past the running one
        let audio = AudioData::mono(generate_sine(880.0, 22050, 1.0, 0.5), 22050);
        let fresh = slow.build_from_samples(&audio, None).unwrap();

        gate_tx.send(()).unwrap();
        assert_eq!(stale.wait(WAIT), Some(BuildOutcome::Superseded));
        let published = slow.track().unwrap();
        assert!(Arc::ptr_eq(&published, &fresh));
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let analyzer = SpectralAnalyzer::default();
        let audio = AudioData::mono(generate_sine(440.0, 22050, 0.5, 0.5), 22050);
        analyzer.build_from_samples(&audio, None).unwrap();
        assert!(analyzer.is_ready());
        analyzer.reset();
        assert_eq!(analyzer.state(), AnalysisState::Empty);
    }

    #[test]
    fn test_placeholder_bounds() {
        let vector = placeholder_vector(50, 0.1);
        assert_eq!(vector.len(), 50);
        assert!(vector.iter().all(|&v| v > 0.0 && v <= 0.1));
    }
}
