// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Exclusive owner of the camera stream for one capture session
//!
//! Invariant: at most one stream is active. `acquire` releases every stream
//! opened so far before opening a new one, and `release` stops all streams
//! this controller ever opened, not only the current one.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::device::{CameraAccessError, CameraConstraints, CameraDevice, CameraStream, CaptureError};
use crate::vision::RawFrame;

/// Identifies the stream opened by `CameraController::acquire`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub stream_id: String,
    pub device: String,
}

pub struct CameraController {
    device: Arc<dyn CameraDevice>,
    /// Streams not yet confirmed stopped, in opening order
    streams: Vec<Box<dyn CameraStream>>,
    /// Index of the active stream in `streams`
    active: Option<usize>,
    acquisitions: u64,
}

impl std::fmt::Debug for CameraController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraController")
            .field("device", &self.device.name())
            .field("streams", &self.streams.len())
            .field("active", &self.active)
            .field("acquisitions", &self.acquisitions)
            .finish()
    }
}

impl CameraController {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self {
            device,
            streams: Vec::new(),
            active: None,
            acquisitions: 0,
        }
    }

    /// Open a stream, releasing any previous one first
    ///
    /// Safe to call again after `release`, or twice in a row.
    pub async fn acquire(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<StreamHandle, CameraAccessError> {
        self.release();

        let stream = self.device.open(constraints).await.map_err(|e| {
            warn!(device = self.device.name(), "Camera acquisition failed: {}", e);
            e
        })?;

        self.acquisitions += 1;
        let handle = StreamHandle {
            stream_id: stream.id().to_string(),
            device: self.device.name().to_string(),
        };
        info!(
            device = %handle.device,
            stream_id = %handle.stream_id,
            acquisition = self.acquisitions,
            "Camera stream acquired"
        );

        self.streams.push(stream);
        self.active = Some(self.streams.len() - 1);
        Ok(handle)
    }

    /// Sample the active stream into a `RawFrame`
    pub fn capture_frame(&mut self) -> Result<RawFrame, CaptureError> {
        let idx = self.active.ok_or(CaptureError::NoActiveStream)?;
        let stream = &mut self.streams[idx];
        if !stream.is_live() {
            return Err(CaptureError::StreamEnded(stream.id().to_string()));
        }
        let frame = stream.sample()?;
        debug!(
            stream_id = stream.id(),
            bytes = frame.byte_size(),
            width = frame.width(),
            height = frame.height(),
            "Captured frame"
        );
        Ok(frame)
    }

    /// Stop every stream this controller opened
    ///
    /// Idempotent and infallible: stop failures are logged and the stream is
    /// kept so a later release can try again.
    pub fn release(&mut self) {
        self.active = None;
        if self.streams.is_empty() {
            return;
        }

        for stream in self.streams.iter_mut().filter(|s| s.is_live()) {
            match stream.stop() {
                Ok(()) => debug!(stream_id = stream.id(), "Camera stream stopped"),
                Err(e) => warn!(stream_id = stream.id(), "Failed to stop camera stream: {}", e),
            }
        }
        self.streams.retain(|s| s.is_live());
    }

    pub fn is_active(&self) -> bool {
        self.active
            .and_then(|idx| self.streams.get(idx))
            .map_or(false, |s| s.is_live())
    }

    /// Streams still open (normally 0 or 1)
    pub fn open_stream_count(&self) -> usize {
        self.streams.iter().filter(|s| s.is_live()).count()
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.release();
    }
}
