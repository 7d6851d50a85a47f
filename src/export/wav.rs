//! WAV encoding of captured audio chunks

use crate::config::AudioFormat;
use crate::utils::CaptureResult;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Ordered raw chunks produced by the audio worker
#[derive(Debug, Default)]
pub struct AudioBuffer {
    chunks: Vec<Vec<u8>>,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Vec<u8>) {
        self.chunks.push(chunk);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Interleaved 16-bit little-endian samples across all chunks
    fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.chunks_exact(2))
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }
}

/// Write the buffer as a PCM WAV file
pub fn write_wav(buffer: &AudioBuffer, format: &AudioFormat, path: &Path) -> CaptureResult<()> {
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for sample in buffer.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    tracing::info!(
        "Wrote {} audio chunks ({} bytes) to {:?}",
        buffer.chunk_count(),
        buffer.byte_len(),
        path
    );
    Ok(())
}
