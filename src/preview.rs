// src/preview.rs
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use image::RgbImage;
use log::debug;

pub type PreviewFrame = Arc<RgbImage>;

/// Wakes the shell's event loop from a background thread.
pub type RepaintHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Delivered,
    /// Queue full; the frame was discarded.
    Dropped,
    /// The surface is gone; the producer should stop.
    Disconnected,
}

/// Producer half handed to the capture session's output leg.
#[derive(Clone)]
pub struct PreviewSink {
    tx: Sender<PreviewFrame>,
    dropped: Arc<AtomicU64>,
    repaint: Option<RepaintHook>,
}

impl PreviewSink {
    pub fn submit(&self, frame: PreviewFrame) -> SubmitOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => {
                if let Some(repaint) = &self.repaint {
                    repaint();
                }
                SubmitOutcome::Delivered
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => SubmitOutcome::Disconnected,
        }
    }
}

/// Live preview target the shell binds to.
pub struct PreviewSurface {
    rx: Receiver<PreviewFrame>,
    sink: PreviewSink,
    frames_received: u64,
}

impl PreviewSurface {
    pub fn new(queue_depth: usize) -> Self {
        let (tx, rx) = bounded(queue_depth.max(1));
        Self {
            rx,
            sink: PreviewSink {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
                repaint: None,
            },
            frames_received: 0,
        }
    }

    /// Every delivered frame calls `hook`, so the shell redraws per frame.
    pub fn with_repaint_hook(mut self, hook: RepaintHook) -> Self {
        self.sink.repaint = Some(hook);
        self
    }

    pub fn sink(&self) -> PreviewSink {
        self.sink.clone()
    }

    /// Drains queued frames and returns the newest one, if any arrived since
    /// the last call.
    pub fn take_new_frame(&mut self) -> Option<PreviewFrame> {
        let mut newest = None;
        loop {
            match self.rx.try_recv() {
                Ok(frame) => {
                    self.frames_received += 1;
                    newest = Some(frame);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if let Some(frame) = &newest {
            debug!("Preview frame {}x{}", frame.width(), frame.height());
        }
        newest
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn frames_dropped(&self) -> u64 {
        self.sink.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> PreviewFrame {
        Arc::new(RgbImage::new(width, height))
    }

    #[test]
    fn test_newest_frame_wins() {
        let mut surface = PreviewSurface::new(4);
        let sink = surface.sink();
        assert_eq!(sink.submit(frame(2, 2)), SubmitOutcome::Delivered);
        assert_eq!(sink.submit(frame(4, 4)), SubmitOutcome::Delivered);

        let newest = surface.take_new_frame().unwrap();
        assert_eq!(newest.width(), 4);
        assert_eq!(surface.frames_received(), 2);
        assert!(surface.take_new_frame().is_none());
    }

    #[test]
    fn test_full_queue_drops_frames() {
        let surface = PreviewSurface::new(1);
        let sink = surface.sink();
        assert_eq!(sink.submit(frame(1, 1)), SubmitOutcome::Delivered);
        assert_eq!(sink.submit(frame(1, 1)), SubmitOutcome::Dropped);
        assert_eq!(surface.frames_dropped(), 1);
    }

    #[test]
    fn test_only_delivered_frames_request_repaint() {
        let repaints = Arc::new(AtomicU64::new(0));
        let counter = repaints.clone();
        let surface = PreviewSurface::new(1).with_repaint_hook(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        let sink = surface.sink();

        assert_eq!(sink.submit(frame(1, 1)), SubmitOutcome::Delivered);
        assert_eq!(sink.submit(frame(1, 1)), SubmitOutcome::Dropped);
        assert_eq!(repaints.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_dropped_surface_disconnects_sink() {
        let surface = PreviewSurface::new(1);
        let sink = surface.sink();
        drop(surface);
        // The sink still holds a sender, but no receiver remains.
        assert_eq!(sink.submit(frame(1, 1)), SubmitOutcome::Disconnected);
    }
}
