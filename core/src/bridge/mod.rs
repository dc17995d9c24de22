//! Cross-thread access to the single-threaded GPU context.
//!
//! The GPU context lives on one thread. Workers that need a GPU frame hold a
//! [`BridgeProducer`], the owning thread holds the [`BridgeConsumer`]:
//!
//! ```text
//! worker                              context thread
//!   request() ── GpuRequest ──► [cap 1] ──► drain() renders
//!      ▲                                        │
//!      └───────── per-request reply ◄───────────┘
//! ```
//!
//! Producers take a shared permit before sending and keep it until their
//! reply arrives, so at most one request is outstanding at any time. Every
//! request carries its own reply channel; a reply can only ever reach the
//! producer that asked for it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use image::RgbaImage;

use crate::config::BridgeConfig;
use crate::modes::VisualizerMode;
use crate::render::{RenderBackend, RenderError};

/// Why a producer did not get its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("GPU thread did not answer within the timeout")]
    Timeout,
    #[error("GPU thread has shut down")]
    Disconnected,
    #[error("Request cancelled")]
    Cancelled,
}

impl From<BridgeError> for RenderError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Timeout => RenderError::BridgeTimeout,
            BridgeError::Disconnected => RenderError::BridgeDisconnected,
            BridgeError::Cancelled => RenderError::Cancelled,
        }
    }
}

/// One GPU frame to render on the context thread.
#[derive(Debug)]
pub struct GpuRequest {
    pub id: u64,
    pub mode: VisualizerMode,
    pub spectrum: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub time: f32,
    reply: Sender<RgbaImage>,
    abandoned: Arc<AtomicBool>,
}

impl GpuRequest {
    /// Whether the producer already gave up on this request.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }
}

/// Create a connected producer/consumer pair.
pub fn gpu_bridge(config: BridgeConfig) -> (BridgeProducer, BridgeConsumer) {
    let (tx, rx) = bounded(1);
    let producer = BridgeProducer {
        tx,
        permit: Arc::new(Mutex::new(())),
        next_id: Arc::new(AtomicU64::new(0)),
        config,
    };
    (producer, BridgeConsumer { rx })
}

/// Sending side, cloned freely across worker threads.
#[derive(Debug, Clone)]
pub struct BridgeProducer {
    tx: Sender<GpuRequest>,
    permit: Arc<Mutex<()>>,
    next_id: Arc<AtomicU64>,
    config: BridgeConfig,
}

impl BridgeProducer {
    /// Ask the context thread for a frame and block until it arrives.
    ///
    /// Gives up with [`BridgeError::Timeout`] after the configured timeout
    /// and with [`BridgeError::Cancelled`] soon after `cancel` is set; the
    /// flag is checked every poll slice while waiting.
    pub fn request(
        &self,
        mode: VisualizerMode,
        spectrum: &[f32],
        width: u32,
        height: u32,
        time: f32,
        cancel: &AtomicBool,
    ) -> Result<RgbaImage, BridgeError> {
        let _permit = self.permit.lock().unwrap_or_else(PoisonError::into_inner);

        if cancel.load(Ordering::Acquire) {
            return Err(BridgeError::Cancelled);
        }

        let deadline = Instant::now() + self.config.timeout();
        let (reply_tx, reply_rx) = bounded(1);
        let abandoned = Arc::new(AtomicBool::new(false));
        let request = GpuRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            mode,
            spectrum: spectrum.to_vec(),
            width,
            height,
            time,
            reply: reply_tx,
            abandoned: Arc::clone(&abandoned),
        };
        let id = request.id;

        // Only blocks when the consumer has not yet picked up an abandoned request
        match self.tx.send_timeout(request, self.config.timeout()) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                log::warn!("GPU request {} could not be queued in time", id);
                return Err(BridgeError::Timeout);
            }
            Err(SendTimeoutError::Disconnected(_)) => return Err(BridgeError::Disconnected),
        }

        let result = loop {
            if cancel.load(Ordering::Acquire) {
                break Err(BridgeError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                break Err(BridgeError::Timeout);
            }
            let slice = self.config.poll_slice().min(deadline - now);
            match reply_rx.recv_timeout(slice) {
                Ok(frame) => break Ok(frame),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break Err(BridgeError::Disconnected),
            }
        };

        if let Err(e) = &result {
            abandoned.store(true, Ordering::Release);
            if *e == BridgeError::Timeout {
                log::warn!(
                    "GPU request {} timed out after {:?}",
                    id,
                    self.config.timeout()
                );
            }
        }
        result
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

/// Receiving side, owned by the thread that owns the GPU context.
#[derive(Debug)]
pub struct BridgeConsumer {
    rx: Receiver<GpuRequest>,
}

impl BridgeConsumer {
    /// Handle every request queued right now, rendering each with `render`.
    ///
    /// Returns the number of frames rendered. Requests whose producer has
    /// already given up are skipped.
    pub fn drain<F>(&self, mut render: F) -> usize
    where
        F: FnMut(&GpuRequest) -> RgbaImage,
    {
        let mut rendered = 0;
        // Bounded by the queue length at entry so a busy producer cannot
        // keep this call from returning.
        for _ in 0..self.rx.len() {
            let Ok(request) = self.rx.try_recv() else {
                break;
            };
            if self.handle(request, &mut render) {
                rendered += 1;
            }
        }
        rendered
    }

    /// Wait up to `timeout` for a request, then drain.
    pub fn wait_and_drain<F>(&self, timeout: Duration, mut render: F) -> usize
    where
        F: FnMut(&GpuRequest) -> RgbaImage,
    {
        match self.rx.recv_timeout(timeout) {
            Ok(request) => {
                let first = usize::from(self.handle(request, &mut render));
                first + self.drain(render)
            }
            Err(_) => 0,
        }
    }

    /// Drain using a render backend, with fallback frames on render errors.
    pub fn drain_with(&self, backend: &mut dyn RenderBackend) -> usize {
        self.drain(|req| backend.render(req.mode, &req.spectrum, req.width, req.height, req.time))
    }

    /// Requests waiting to be picked up.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    fn handle<F>(&self, request: GpuRequest, render: &mut F) -> bool
    where
        F: FnMut(&GpuRequest) -> RgbaImage,
    {
        if request.is_abandoned() {
            log::debug!("Skipping abandoned GPU request {}", request.id);
            return false;
        }
        let frame = render(&request);
        if request.reply.send(frame).is_err() {
            log::warn!("GPU request {} was abandoned before its reply", request.id);
        }
        true
    }
}

/// [`RenderBackend`] that forwards every frame through the bridge.
///
/// Lets a worker thread render GPU modes without touching the context.
pub struct BridgedRenderer {
    producer: BridgeProducer,
    cancel: Arc<AtomicBool>,
}

impl BridgedRenderer {
    pub fn new(producer: BridgeProducer, cancel: Arc<AtomicBool>) -> Self {
        Self { producer, cancel }
    }
}

impl RenderBackend for BridgedRenderer {
    fn try_render(
        &mut self,
        mode: VisualizerMode,
        spectrum: &[f32],
        width: u32,
        height: u32,
        time: f32,
    ) -> Result<RgbaImage, RenderError> {
        self.producer
            .request(mode, spectrum, width, height, time, &self.cancel)
            .map_err(RenderError::from)
    }
}
