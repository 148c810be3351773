//! Value compression for warmed entries
//!
//! Every value the orchestrator writes is framed with a one-byte header
//! naming its encoding, so readers can decode without knowing whether the
//! writer compressed it.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

use crate::core::{OrchestratorError, Result};

const FRAME_RAW: u8 = 0;
const FRAME_LZ4: u8 = 1;
const FRAME_ZSTD: u8 = 2;

/// Compression algorithm selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// LZ4 - Fast compression/decompression (default)
    #[default]
    Lz4,
    /// Zstandard - Better compression ratio
    Zstd,
}

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub algorithm: CompressionAlgorithm,
    /// Zstd compression level (1-22)
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: CompressionAlgorithm::Lz4,
            zstd_level: 3,
        }
    }
}

/// Frames values and compresses those at or above a size threshold
#[derive(Debug, Clone)]
pub struct ValueCodec {
    config: CompressionConfig,
}

impl ValueCodec {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn should_compress(&self, len: usize, threshold: usize) -> bool {
        self.config.enabled && threshold > 0 && len >= threshold
    }

    /// Frame `data`, compressing it when it reaches `threshold` bytes
    pub fn encode(&self, data: &[u8], threshold: usize) -> Result<Vec<u8>> {
        if !self.should_compress(data.len(), threshold) {
            let mut framed = Vec::with_capacity(data.len() + 1);
            framed.push(FRAME_RAW);
            framed.extend_from_slice(data);
            return Ok(framed);
        }

        let (tag, body) = match self.config.algorithm {
            CompressionAlgorithm::Lz4 => (FRAME_LZ4, compress_lz4(data)?),
            CompressionAlgorithm::Zstd => {
                (FRAME_ZSTD, zstd::encode_all(data, self.config.zstd_level)?)
            }
        };

        debug!(
            "Compressed value {} -> {} bytes ({:?})",
            data.len(),
            body.len(),
            self.config.algorithm
        );

        let mut framed = Vec::with_capacity(body.len() + 1);
        framed.push(tag);
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    /// Strip the frame header and decompress if needed
    pub fn decode(&self, framed: &[u8]) -> Result<Vec<u8>> {
        let (tag, body) = framed
            .split_first()
            .ok_or_else(|| OrchestratorError::Compression("empty frame".to_string()))?;

        match *tag {
            FRAME_RAW => Ok(body.to_vec()),
            FRAME_LZ4 => decompress_lz4(body),
            FRAME_ZSTD => Ok(zstd::decode_all(body)?),
            other => Err(OrchestratorError::Compression(format!(
                "unknown frame tag {}",
                other
            ))),
        }
    }
}

fn compress_lz4(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = lz4::EncoderBuilder::new()
        .level(4) // Fast compression
        .build(Vec::new())?;

    encoder.write_all(data)?;
    let (compressed, result) = encoder.finish();
    result?;
    Ok(compressed)
}

fn decompress_lz4(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = lz4::Decoder::new(data)?;
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
