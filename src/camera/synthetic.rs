// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Synthetic camera for headless runs and tests
//!
//! Produces deterministic gradient frames encoded as JPEG. A mounted
//! orientation can be set to emulate sensors that report EXIF rotation.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::device::{CameraAccessError, CameraConstraints, CameraDevice, CameraStream, CaptureError};
use crate::vision::exif::{self, Orientation};
use crate::vision::RawFrame;

const FRAME_QUALITY: u8 = 90;

/// Failure the synthetic device reports on `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticFailure {
    PermissionDenied,
    NoDevice,
    DeviceBusy,
}

#[derive(Debug)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    orientation: Option<Orientation>,
    failure: Option<SyntheticFailure>,
    live: Arc<AtomicUsize>,
    opened: AtomicUsize,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            orientation: None,
            failure: None,
            live: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
        }
    }

    /// Tag every frame with this EXIF orientation
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn failing_with(mut self, failure: SyntheticFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Streams opened and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Streams opened over the device's lifetime
    pub fn total_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for SyntheticCamera {
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, CameraAccessError> {
        match self.failure {
            Some(SyntheticFailure::PermissionDenied) => return Err(CameraAccessError::PermissionDenied),
            Some(SyntheticFailure::NoDevice) => return Err(CameraAccessError::NoDevice),
            Some(SyntheticFailure::DeviceBusy) => {
                return Err(CameraAccessError::DeviceBusy("synthetic".to_string()))
            }
            None => {}
        }

        let width = constraints.ideal_width.unwrap_or(self.width).min(self.width).max(1);
        let height = constraints.ideal_height.unwrap_or(self.height).min(self.height).max(1);

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SyntheticStream {
            id: Uuid::new_v4().to_string(),
            width,
            height,
            orientation: self.orientation,
            live: self.live.clone(),
            stopped: false,
            frame_no: 0,
        }))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct SyntheticStream {
    id: String,
    width: u32,
    height: u32,
    orientation: Option<Orientation>,
    live: Arc<AtomicUsize>,
    stopped: bool,
    frame_no: u32,
}

impl SyntheticStream {
    fn render(&self) -> RgbImage {
        let shift = self.frame_no;
        let (w, h) = (self.width.max(1), self.height.max(1));
        RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                ((x * 255) / w) as u8,
                ((y * 255) / h) as u8,
                ((x + y + shift) % 256) as u8,
            ])
        })
    }
}

impl CameraStream for SyntheticStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn sample(&mut self) -> Result<RawFrame, CaptureError> {
        if self.stopped {
            return Err(CaptureError::StreamEnded(self.id.clone()));
        }
        self.frame_no = self.frame_no.wrapping_add(1);

        let mut jpeg = Vec::new();
        self.render()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, FRAME_QUALITY))
            .map_err(|e| CaptureError::Sample(e.to_string()))?;

        if let Some(orientation) = self.orientation {
            jpeg = exif::embed_segment(&jpeg, &exif::orientation_segment(orientation))
                .map_err(|e| CaptureError::Sample(e.to_string()))?;
        }

        Ok(RawFrame::from_camera(
            jpeg,
            "image/jpeg",
            self.width,
            self.height,
            self.orientation,
        ))
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        !self.stopped
    }
}
