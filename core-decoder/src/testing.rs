//! Deterministic engine for tests.
//!
//! [`FixtureEngine`] decodes a toy container that is just rich enough to
//! exercise real byte flow through a session:
//!
//! ```text
//! "FIXT" | width u16 | height u16 | fps u8 | total u32 (0 = absent) | name_len u8 | name
//! frame:  'F' | time_on_ms u32 | width * height samples (u16)
//! empty:  'E' | time_on_ms u32
//! ```
//!
//! All integers are little endian. [`FixtureClip`] writes such containers.

use std::sync::Arc;

use bridge_traits::{
    CptvFrame, CptvFrameHeader, CptvHeader, DecodingEngine, EngineError, EngineFactory,
    EngineStep, FrameStep, ImageData,
};

const MAGIC: &[u8; 4] = b"FIXT";
const FIXED_HEADER_LEN: usize = 14;
const FRAME_PREFIX_LEN: usize = 5;

/// Engine over the fixture container.
#[derive(Debug, Default)]
pub struct FixtureEngine {
    buf: Vec<u8>,
    pos: usize,
    header: Option<CptvHeader>,
    frames_decoded: u32,
    total: Option<u32>,
    eof: bool,
    released: bool,
}

impl FixtureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory producing a fresh engine per session.
    pub fn factory() -> Arc<dyn EngineFactory> {
        Arc::new(|| Box::new(FixtureEngine::new()) as Box<dyn DecodingEngine>)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn magic_ok(&self) -> bool {
        let n = self.buf.len().min(MAGIC.len());
        self.buf[..n] == MAGIC[..n]
    }

    fn u16_at(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.buf[at], self.buf[at + 1]])
    }

    fn u32_at(&self, at: usize) -> u32 {
        u32::from_le_bytes([
            self.buf[at],
            self.buf[at + 1],
            self.buf[at + 2],
            self.buf[at + 3],
        ])
    }

    fn ensure_header(&mut self) -> Result<EngineStep<CptvHeader>, EngineError> {
        if let Some(header) = &self.header {
            return Ok(EngineStep::Ready(header.clone()));
        }
        if !self.magic_ok() {
            return Err(EngineError::new("Unable to parse header"));
        }

        let complete = self.buf.len() >= FIXED_HEADER_LEN
            && self.buf.len() >= FIXED_HEADER_LEN + self.buf[FIXED_HEADER_LEN - 1] as usize;
        if !complete {
            return if self.eof {
                Err(EngineError::new("Unable to parse header"))
            } else {
                Ok(EngineStep::NeedMoreData)
            };
        }

        let name_len = self.buf[FIXED_HEADER_LEN - 1] as usize;
        let name = &self.buf[FIXED_HEADER_LEN..FIXED_HEADER_LEN + name_len];
        let embedded_total = self.u32_at(9);
        let header = CptvHeader {
            timestamp: 1_600_000_000_000_000,
            width: self.u16_at(4) as u32,
            height: self.u16_at(6) as u32,
            fps: self.buf[8],
            device_name: String::from_utf8_lossy(name).into_owned(),
            total_frames: (embedded_total > 0).then_some(embedded_total),
            ..Default::default()
        };

        self.pos = FIXED_HEADER_LEN + name_len;
        self.header = Some(header.clone());
        Ok(EngineStep::Ready(header))
    }

    fn next_frame(&mut self) -> Result<EngineStep<FrameStep>, EngineError> {
        let header = match self.ensure_header()? {
            EngineStep::Ready(header) => header,
            EngineStep::NeedMoreData => return Ok(EngineStep::NeedMoreData),
        };
        if self.total.is_some() {
            return Ok(EngineStep::Ready(FrameStep::EndOfStream));
        }

        if self.pos == self.buf.len() {
            if self.eof {
                self.total = Some(self.frames_decoded);
                return Ok(EngineStep::Ready(FrameStep::EndOfStream));
            }
            return Ok(EngineStep::NeedMoreData);
        }

        let marker = self.buf[self.pos];
        let samples = match marker {
            b'F' => (header.width * header.height) as usize,
            b'E' => 0,
            other => {
                return Err(EngineError::new(format!(
                    "Unknown frame marker 0x{:02x} at byte {}",
                    other, self.pos
                )))
            }
        };

        let frame_len = FRAME_PREFIX_LEN + samples * 2;
        if self.buf.len() - self.pos < frame_len {
            return if self.eof {
                Err(EngineError::new("Truncated frame"))
            } else {
                Ok(EngineStep::NeedMoreData)
            };
        }

        let time_on_ms = self.u32_at(self.pos + 1);
        let data_start = self.pos + FRAME_PREFIX_LEN;
        let data: Vec<u16> = (0..samples)
            .map(|i| self.u16_at(data_start + i * 2))
            .collect();
        self.pos += frame_len;

        if marker == b'F' {
            self.frames_decoded += 1;
        }

        let meta = CptvFrameHeader {
            time_on_ms,
            image_data: ImageData {
                width: if samples == 0 { 0 } else { header.width },
                height: if samples == 0 { 0 } else { header.height },
                min: data.iter().copied().min().unwrap_or(0),
                max: data.iter().copied().max().unwrap_or(0),
            },
            ..Default::default()
        };

        Ok(EngineStep::Ready(FrameStep::Frame(CptvFrame { data, meta })))
    }
}

impl DecodingEngine for FixtureEngine {
    fn ingest(&mut self, chunk: &[u8]) -> bool {
        if self.released {
            return false;
        }
        self.buf.extend_from_slice(chunk);
        self.magic_ok()
    }

    fn end_of_input(&mut self) {
        self.eof = true;
    }

    fn parse_header(&mut self) -> Result<EngineStep<CptvHeader>, EngineError> {
        self.ensure_header()
    }

    fn decode_next_frame(&mut self) -> Result<EngineStep<FrameStep>, EngineError> {
        self.next_frame()
    }

    fn scan_to_end(&mut self) -> Result<EngineStep<u32>, EngineError> {
        loop {
            match self.next_frame()? {
                EngineStep::NeedMoreData => return Ok(EngineStep::NeedMoreData),
                EngineStep::Ready(FrameStep::EndOfStream) => {
                    return Ok(EngineStep::Ready(self.frames_decoded))
                }
                EngineStep::Ready(FrameStep::Frame(_)) => {}
            }
        }
    }

    fn total_frames(&self) -> Option<u32> {
        self.total
    }

    fn release(&mut self) {
        self.buf = Vec::new();
        self.released = true;
    }
}

/// Writer for fixture containers.
#[derive(Debug, Clone)]
pub struct FixtureClip {
    width: u16,
    height: u16,
    fps: u8,
    device_name: String,
    embed_total: bool,
    frames: Vec<(u8, u32)>,
}

impl FixtureClip {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            fps: 9,
            device_name: "fixture".to_string(),
            embed_total: false,
            frames: Vec::new(),
        }
    }

    pub fn fps(mut self, fps: u8) -> Self {
        self.fps = fps;
        self
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Record the frame count in the header.
    pub fn embed_total(mut self) -> Self {
        self.embed_total = true;
        self
    }

    /// Append `count` frames with strictly increasing time-on values.
    pub fn frames(mut self, count: u32) -> Self {
        for _ in 0..count {
            let time_on = self.frames.last().map_or(1_000, |(_, t)| t + 111);
            self.frames.push((b'F', time_on));
        }
        self
    }

    /// Append a frame reusing the previous frame's time-on value.
    pub fn repeated_frame(mut self) -> Self {
        let time_on = self.frames.last().map_or(1_000, |(_, t)| *t);
        self.frames.push((b'F', time_on));
        self
    }

    /// Append a frame without samples.
    pub fn empty_frame(mut self) -> Self {
        let time_on = self.frames.last().map_or(1_000, |(_, t)| t + 111);
        self.frames.push((b'E', time_on));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let real_frames = self.frames.iter().filter(|(m, _)| *m == b'F').count() as u32;
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.push(self.fps);
        let total = if self.embed_total { real_frames } else { 0 };
        out.extend_from_slice(&total.to_le_bytes());
        out.push(self.device_name.len() as u8);
        out.extend_from_slice(self.device_name.as_bytes());

        let samples = self.width as usize * self.height as usize;
        for (index, (marker, time_on)) in self.frames.iter().enumerate() {
            out.push(*marker);
            out.extend_from_slice(&time_on.to_le_bytes());
            if *marker == b'F' {
                for s in 0..samples {
                    let value = 2_800 + ((index + s) % 600) as u16;
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        out
    }
}
