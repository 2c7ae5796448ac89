//! RTSP frame source backed by GStreamer.
//!
//! Pipeline: `rtspsrc ! decodebin ! videoconvert ! appsink` with RGB caps and a
//! one-buffer drop-oldest sink, so a slow consumer always sees the newest frame.

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;

use super::{FrameSource, SourceSettings};
use crate::frame::{Frame, RGB_CHANNELS};

pub struct RtspSource {
    url: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    pull_timeout: gstreamer::ClockTime,
}

impl RtspSource {
    /// Build the pipeline and set it to Playing.
    pub fn open(url: &str, settings: &SourceSettings) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let timeout_us = settings.connect_timeout.as_micros();
        let pipeline_description = format!(
            "rtspsrc location={} latency=0 tcp-timeout={} ! decodebin ! videoconvert ! \
             video/x-raw,format=RGB ! appsink name=appsink sync=false max-buffers=1 drop=true",
            url, timeout_us
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;
        log::info!("RtspSource: playing {}", url);

        Ok(Self {
            url: url.to_string(),
            pipeline,
            appsink,
            pull_timeout: gstreamer::ClockTime::from_mseconds(
                settings.read_timeout.as_millis() as u64,
            ),
        })
    }

    fn check_bus(&self) -> Result<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(message) = bus.pop() {
            if let gstreamer::MessageView::Error(err) = message.view() {
                return Err(anyhow!(
                    "gstreamer error from {:?}: {}",
                    err.src().map(|s| s.path_string()),
                    err.error()
                ));
            }
        }
        Ok(())
    }
}

impl FrameSource for RtspSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.check_bus()?;
        match self.appsink.try_pull_sample(self.pull_timeout) {
            Some(sample) => {
                let (pixels, width, height) = sample_to_pixels(&sample)?;
                Frame::new(pixels, width, height).map(Some)
            }
            None if self.appsink.is_eos() => Ok(None),
            None => {
                self.check_bus()?;
                Err(anyhow!("RTSP stream {} stalled", self.url))
            }
        }
    }
}

impl Drop for RtspSource {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::debug!("RtspSource: failed to stop pipeline for {}: {}", self.url, err);
        }
    }
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * RGB_CHANNELS;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data.get(..len).context("RTSP buffer is truncated")?;
        return Ok((pixels.to_vec(), width, height));
    }

    // Rows are padded; repack them tightly.
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("RTSP buffer row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}
