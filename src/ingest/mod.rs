//! Video sources.
//!
//! A camera url is opened into a `FrameSource` by a `SourceOpener`. The
//! production opener, `SourceFactory`, dispatches on the url scheme:
//! - `stub://` synthetic frames (testing, demos)
//! - `http(s)://` MJPEG streams or polled JPEG snapshots (feature: ingest-http)
//! - `rtsp(s)://` IP cameras through GStreamer (feature: rtsp-gstreamer)
//!
//! Every source decodes to packed RGB8 `Frame`s. Dropping a source releases its
//! connection.

#[cfg(feature = "ingest-http")]
pub mod http;
#[cfg(feature = "rtsp-gstreamer")]
pub mod rtsp;
pub mod synthetic;

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use crate::frame::Frame;

#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
#[cfg(feature = "rtsp-gstreamer")]
pub use rtsp::RtspSource;
pub use synthetic::SyntheticSource;

/// An open connection to one camera.
pub trait FrameSource: Send {
    /// Block until the next decoded frame is available.
    ///
    /// `Ok(None)` means the stream ended cleanly; errors mean the read failed.
    /// Either way the caller is expected to drop the source and reconnect.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens camera urls. Shared by every capture worker.
pub trait SourceOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn FrameSource>>;
}

/// Network settings applied to every source the factory opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    pub connect_timeout: Duration,
    /// Bounds a blocking read so a hung camera eventually surfaces as a read
    /// failure instead of stalling its worker forever.
    pub read_timeout: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Scheme-dispatching opener used by the daemon.
#[derive(Clone, Debug, Default)]
pub struct SourceFactory {
    settings: SourceSettings,
}

impl SourceFactory {
    pub fn new(settings: SourceSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }
}

impl SourceOpener for SourceFactory {
    fn open(&self, url: &str) -> Result<Box<dyn FrameSource>> {
        let scheme = url_scheme(url)?;
        match scheme.as_str() {
            "stub" => Ok(Box::new(SyntheticSource::open(url)?)),
            "http" | "https" => {
                #[cfg(feature = "ingest-http")]
                {
                    Ok(Box::new(HttpSource::open(url, &self.settings)?))
                }
                #[cfg(not(feature = "ingest-http"))]
                {
                    Err(anyhow!("http cameras require the ingest-http feature"))
                }
            }
            "rtsp" | "rtsps" => {
                #[cfg(feature = "rtsp-gstreamer")]
                {
                    Ok(Box::new(RtspSource::open(url, &self.settings)?))
                }
                #[cfg(not(feature = "rtsp-gstreamer"))]
                {
                    Err(anyhow!("RTSP requires the rtsp-gstreamer feature"))
                }
            }
            other => Err(anyhow!("unsupported camera url scheme '{}'", other)),
        }
    }
}

/// Lowercased scheme of an absolute camera url.
fn url_scheme(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("invalid camera url '{}'", url))?;
    if parsed.cannot_be_a_base() {
        return Err(anyhow!("camera url '{}' is incomplete", url));
    }
    Ok(parsed.scheme().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_schemes_and_missing_scheme() {
        let factory = SourceFactory::default();
        let err = factory.open("bad://host").err().unwrap();
        assert!(err.to_string().contains("unsupported camera url scheme"));
        assert!(factory.open("just-a-host").is_err());
        assert!(factory.open("stub://").is_err());
        assert!(factory.open("mailto:ops@example.com").is_err());
    }

    #[test]
    fn scheme_is_lowercased() -> Result<()> {
        assert_eq!(url_scheme("RTSP://cam.local:554/live")?, "rtsp");
        assert_eq!(url_scheme("http://10.0.0.5/video")?, "http");
        assert!(url_scheme("cam.local/live").is_err());
        Ok(())
    }

    #[test]
    fn opens_stub_sources() -> Result<()> {
        let factory = SourceFactory::default();
        let mut source = factory.open("STUB://lobby?width=8&height=6&fps=0")?;
        let frame = source.next_frame()?.expect("synthetic frame");
        assert_eq!((frame.width, frame.height), (8, 6));
        Ok(())
    }
}
