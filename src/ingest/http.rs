//! HTTP camera source.
//!
//! Handles the two shapes phone and ESP32-class cameras serve over HTTP:
//! - `multipart/x-mixed-replace` MJPEG streams, split on JPEG SOI/EOI markers
//! - single-JPEG snapshot endpoints, polled
//!
//! Frames are decoded in memory and never written anywhere.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use super::{FrameSource, SourceSettings};
use crate::codec;
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

pub struct HttpSource {
    url: String,
    agent: ureq::Agent,
    stream: HttpStream,
    last_fetch_at: Option<Instant>,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    /// The body fetched while connecting is served first.
    Snapshot(Option<Vec<u8>>),
}

impl HttpSource {
    /// Connect and sniff the content type.
    pub fn open(url: &str, settings: &SourceSettings) -> Result<Self> {
        let parsed = Url::parse(url).context("parse camera url")?;
        if parsed.host_str().is_none() {
            return Err(anyhow!("camera url '{}' has no host", url));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(settings.connect_timeout)
            .timeout_read(settings.read_timeout)
            .build();
        let response = agent
            .get(url)
            .call()
            .with_context(|| format!("connect to http camera {}", url))?;
        let content_type = response
            .header("Content-Type")
            .unwrap_or("")
            .to_ascii_lowercase();

        let stream = if content_type.contains("multipart") {
            HttpStream::Mjpeg(MjpegStream::new(response.into_reader()))
        } else {
            HttpStream::Snapshot(Some(read_body(response.into_reader())?))
        };
        Ok(Self {
            url: url.to_string(),
            agent,
            stream,
            last_fetch_at: Some(Instant::now()),
        })
    }

    fn fetch_snapshot(&mut self) -> Result<Vec<u8>> {
        if let Some(last) = self.last_fetch_at {
            let since = last.elapsed();
            if since < SNAPSHOT_INTERVAL {
                std::thread::sleep(SNAPSHOT_INTERVAL - since);
            }
        }
        self.last_fetch_at = Some(Instant::now());
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", self.url))?;
        read_body(response.into_reader())
    }
}

impl FrameSource for HttpSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let jpeg = match &mut self.stream {
            HttpStream::Mjpeg(stream) => match stream.read_next_jpeg()? {
                Some(jpeg) => jpeg,
                None => return Ok(None),
            },
            HttpStream::Snapshot(pending) => match pending.take() {
                Some(jpeg) => jpeg,
                None => self.fetch_snapshot()?,
            },
        };
        codec::decode(&jpeg).map(Some)
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next complete JPEG, or `None` once the server closes the stream.
    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let jpeg = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(jpeg));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            // Garbage with no EOI in sight; keep the tail in case it holds a
            // marker split across reads.
            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let drain_len = self.buffer.len() - 2;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn read_body(reader: Box<dyn Read + Send>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .take(MAX_JPEG_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    if bytes.len() > MAX_JPEG_BYTES {
        return Err(anyhow!("jpeg snapshot exceeds {} bytes", MAX_JPEG_BYTES));
    }
    Ok(bytes)
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finds_jpeg_between_multipart_headers() {
        let mut buf = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        let header_len = buf.len();
        buf.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        buf.extend_from_slice(b"\r\n--frame");
        assert_eq!(find_jpeg_bounds(&buf), Some((header_len, header_len + 7)));
    }

    #[test]
    fn incomplete_jpeg_is_not_returned() {
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 1, 2]), None);
        assert_eq!(find_jpeg_bounds(&[1, 2, 0xFF, 0xD9]), None);
    }

    #[test]
    fn mjpeg_stream_yields_each_part_then_ends() -> Result<()> {
        let mut body = Vec::new();
        for payload in [7u8, 8u8] {
            body.extend_from_slice(b"--frame\r\n\r\n");
            body.extend_from_slice(&[0xFF, 0xD8, payload, 0xFF, 0xD9]);
        }
        let mut stream = MjpegStream::new(Box::new(Cursor::new(body)));
        assert_eq!(stream.read_next_jpeg()?, Some(vec![0xFF, 0xD8, 7, 0xFF, 0xD9]));
        assert_eq!(stream.read_next_jpeg()?, Some(vec![0xFF, 0xD8, 8, 0xFF, 0xD9]));
        assert_eq!(stream.read_next_jpeg()?, None);
        Ok(())
    }

    #[test]
    fn refuses_urls_without_host() {
        let settings = SourceSettings::default();
        assert!(HttpSource::open("http://", &settings).is_err());
    }
}
