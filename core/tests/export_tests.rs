//! Integration tests for the export pipeline with a recording encoder.


use std::sync::Arc;

use fixtures::{ready_analyzer, small_settings, RecordingFactory};
use pulsecast::config::RotationConfig;
use pulsecast::pipeline::{temp_artifacts, ModeRotation};
use pulsecast::{
    ExportError, ExportEvent, ExportJob, ExportOutcome, ExportPipeline, ExportStatus,
    ModeSelection, VisualizerMode,
};

fn rotating_pool() -> ModeSelection {
    ModeSelection::Rotating {
        pool: vec![
            VisualizerMode::Bars,
            VisualizerMode::CosmicParticles,
            VisualizerMode::PlasmaFluid,
        ],
        fallback: VisualizerMode::Bars,
    }
}

#[test]
fn test_ten_seconds_at_thirty_fps_is_three_hundred_frames() {
    let dir = tempfile::tempdir().unwrap();
    let factory = RecordingFactory::new();
    let pipeline = ExportPipeline::new(Arc::new(factory.clone()));
    let analyzer = ready_analyzer(12.0);

    let job = ExportJob::new(
        dir.path().join("out.mp4"),
        small_settings(30),
        ModeSelection::Fixed(VisualizerMode::Waveform),
    )
    .with_duration(10.0);
    let handle = pipeline.start(&analyzer, job).unwrap();
    let events = handle.events().clone();
    assert_eq!(handle.join(), ExportOutcome::Completed);

    let frames = factory.frames();
    assert_eq!(frames.len(), 300);
    assert!(frames.windows(2).all(|w| w[0] < w[1]));

    let recording = factory.recording.lock().unwrap();
    assert!(recording.finished);
    assert!(!recording.aborted);
    assert_eq!(recording.specs[0].fps, 30);
    drop(recording);

    let progress: Vec<f32> = events
        .try_iter()
        .filter_map(|e| match e {
            ExportEvent::Progress(p) => Some(p),
            ExportEvent::Finished(_) => None,
        })
        .collect();
    assert_eq!(progress.len(), 301);
    assert!(progress[..300].windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*progress.last().unwrap(), 100.0);
    assert!(dir.path().join("out.mp4").exists());
}

#[test]
fn test_cancel_before_frame_150_stops_and_removes_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("cancelled.mp4");
    let job = ExportJob::new(
        &output,
        small_settings(30),
        ModeSelection::Fixed(VisualizerMode::Bars),
    )
    .with_duration(10.0);

    let factory = RecordingFactory::cancelling_after(150, job.cancel_token());
    let pipeline = ExportPipeline::new(Arc::new(factory.clone()));
    let analyzer = ready_analyzer(10.0);

    // Leftover intermediates from the encoder must go too
    for temp in temp_artifacts(&output) {
        std::fs::write(temp, b"partial").unwrap();
    }

    let handle = pipeline.start(&analyzer, job).unwrap();
    assert_eq!(handle.join(), ExportOutcome::Cancelled);
    assert_eq!(pipeline.status(), ExportStatus::Cancelled);

    let frames = factory.frames();
    assert_eq!(frames.len(), 150);
    assert!(frames.iter().all(|&i| i < 150));

    let recording = factory.recording.lock().unwrap();
    assert!(recording.aborted);
    assert!(!recording.finished);
    assert!(!output.exists());
    assert!(temp_artifacts(&output).iter().all(|p| !p.exists()));
}

#[test]
fn test_cancel_before_start_encodes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let factory = RecordingFactory::new();
    let pipeline = ExportPipeline::new(Arc::new(factory.clone()));
    let job = ExportJob::new(
        dir.path().join("never.mp4"),
        small_settings(30),
        ModeSelection::Fixed(VisualizerMode::Bars),
    );
    job.cancel_token().cancel();

    let handle = pipeline.start(&ready_analyzer(2.0), job).unwrap();
    assert_eq!(handle.join(), ExportOutcome::Cancelled);
    assert!(factory.frames().is_empty());
}

#[test]
fn test_second_start_rejected_while_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let factory = RecordingFactory::new();
    let pipeline = ExportPipeline::new(Arc::new(factory));
    let analyzer = ready_analyzer(30.0);

    let long = ExportJob::new(
        dir.path().join("long.mp4"),
        small_settings(60),
        ModeSelection::Fixed(VisualizerMode::Kaleidoscope),
    );
    let handle = pipeline.start(&analyzer, long).unwrap();

    let second = ExportJob::new(
        dir.path().join("second.mp4"),
        small_settings(30),
        ModeSelection::default(),
    );
    if !handle.is_finished() {
        assert!(matches!(
            pipeline.start(&analyzer, second),
            Err(ExportError::AlreadyRendering)
        ));
    }

    handle.cancel();
    assert_eq!(handle.join(), ExportOutcome::Cancelled);
    assert!(!pipeline.is_rendering());
}

#[test]
fn test_same_seed_renders_identical_frames() {
    let analyzer = ready_analyzer(20.0);
    let run = |seed: u64| {
        let dir = tempfile::tempdir().unwrap();
        let factory = RecordingFactory::new();
        let pipeline = ExportPipeline::new(Arc::new(factory.clone()));
        let job = ExportJob::new(dir.path().join("det.mp4"), small_settings(10), rotating_pool())
            .with_duration(20.0)
            .with_seed(seed);
        assert_eq!(
            pipeline.start(&analyzer, job).unwrap().join(),
            ExportOutcome::Completed
        );
        factory.hashes()
    };

    let first = run(5);
    assert_eq!(first.len(), 200);
    assert_eq!(first, run(5));
}

#[test]
fn test_rotation_never_repeats_back_to_back() {
    let pool = [
        VisualizerMode::Bars,
        VisualizerMode::Waveform,
        VisualizerMode::Hyperwarp,
        VisualizerMode::AudioMatrix,
    ];
    for seed in 0..20 {
        let mut rotation =
            ModeRotation::new(&pool, VisualizerMode::Bars, RotationConfig::default(), seed);
        let mut sequence = vec![rotation.current()];
        for frame in 0..(300 * 30) {
            let mode = rotation.mode_at(frame as f64 / 30.0);
            if *sequence.last().unwrap() != mode {
                sequence.push(mode);
            }
        }
        // Intervals are under 10s, so 300s holds at least 29 switches
        assert!(sequence.len() >= 30, "seed {}", seed);
        assert!(sequence.windows(2).all(|w| w[0] != w[1]));
    }
}

#[test]
fn test_rotation_with_two_modes_alternates() {
    let pool = [VisualizerMode::Bars, VisualizerMode::Waveform];
    let mut rotation = ModeRotation::new(&pool, VisualizerMode::Bars, RotationConfig::default(), 9);
    let mut previous = rotation.current();
    for _ in 0..50 {
        let at = rotation.next_switch();
        let mode = rotation.mode_at(at);
        assert_ne!(mode, previous);
        previous = mode;
    }
}

#[test]
fn test_empty_pool_renders_fallback_mode() {
    let dir = tempfile::tempdir().unwrap();
    let factory = RecordingFactory::new();
    let pipeline = ExportPipeline::new(Arc::new(factory.clone()));
    let job = ExportJob::new(
        dir.path().join("fallback.mp4"),
        small_settings(10),
        ModeSelection::Rotating {
            pool: Vec::new(),
            fallback: VisualizerMode::CirclePulse,
        },
    )
    .with_duration(12.0);
    assert_eq!(
        pipeline.start(&ready_analyzer(12.0), job).unwrap().join(),
        ExportOutcome::Completed
    );
    assert_eq!(factory.frames().len(), 120);
}
