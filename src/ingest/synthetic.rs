//! Synthetic frame source for `stub://` urls.
//!
//! `stub://<name>?width=W&height=H&fps=F&frames=N`
//! - `width`/`height`: frame size (default 640x480)
//! - `fps`: pacing; 0 disables pacing (default 10)
//! - `frames`: end the stream after N frames (default: never)

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::frame::{Frame, RGB_CHANNELS};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 10;
/// Largest frame side accepted from a url.
pub const MAX_SIDE: u32 = 8192;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: Option<u64>,
}

impl SyntheticConfig {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or_else(|| anyhow!("stub url '{}' has no scheme", url))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        if name.is_empty() {
            return Err(anyhow!("stub url '{}' is missing a name", url));
        }

        let mut config = Self {
            name: name.trim_end_matches('/').to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            frames: None,
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub url parameter '{}' has no value", pair))?;
            match key {
                "width" => config.width = parse_param(key, value)?,
                "height" => config.height = parse_param(key, value)?,
                "fps" => config.fps = parse_param(key, value)?,
                "frames" => config.frames = Some(parse_param(key, value)?),
                other => return Err(anyhow!("unknown stub url parameter '{}'", other)),
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("stub frame size must be non-zero"));
        }
        if config.width > MAX_SIDE || config.height > MAX_SIDE {
            return Err(anyhow!(
                "stub frame size {}x{} exceeds {}x{}",
                config.width,
                config.height,
                MAX_SIDE,
                MAX_SIDE
            ));
        }
        Ok(config)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| anyhow!("stub url parameter '{}' is not a valid integer: '{}'", key, value))
}

/// Generates a slowly changing test pattern.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    scene_state: u8,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn open(url: &str) -> Result<Self> {
        let config = SyntheticConfig::parse(url)?;
        log::debug!("SyntheticSource: opened {}", config.name);
        Ok(Self::new(config))
    }

    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            next_due: None,
        }
    }

    fn pace(&mut self) {
        if self.config.fps == 0 {
            return;
        }
        let interval = Duration::from_millis((1000 / self.config.fps as u64).max(1));
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + interval);
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let len = self.config.width as usize * self.config.height as usize * RGB_CHANNELS;
        // Shift the scene every 50 frames to simulate motion.
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let offset = self.frame_count + self.scene_state as u64;
        (0..len)
            .map(|i| ((i as u64 + offset) % 256) as u8)
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .frames
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(pixels, self.config.width, self.config.height).map(Some)
    }
}
