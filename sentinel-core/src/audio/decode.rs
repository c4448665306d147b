//! 音频负载解码
//!
//! - RIFF/WAV：完整片段，走批量模式
//! - 其他：原始 little-endian f32 PCM，走流式模式

use crate::error::{SentinelError, SentinelResult};
use std::io::Cursor;

/// 解码后的音频负载
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPayload {
    /// 完整片段（来自 WAV）
    Clip(Vec<f32>),
    /// 连续流中的一块
    Chunk(Vec<f32>),
}

/// 判断是否为 WAV 容器
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// 按格式解码
pub fn decode_payload(bytes: &[u8], expected_rate: u32) -> SentinelResult<AudioPayload> {
    if is_wav(bytes) {
        decode_wav(bytes, expected_rate).map(AudioPayload::Clip)
    } else {
        decode_f32le(bytes).map(AudioPayload::Chunk)
    }
}

/// 解码 WAV 并下混为单声道
pub fn decode_wav(bytes: &[u8], expected_rate: u32) -> SentinelResult<Vec<f32>> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| SentinelError::SensorDecode(format!("invalid WAV: {}", e)))?;
    let spec = reader.spec();

    if spec.sample_rate != expected_rate {
        return Err(SentinelError::SensorDecode(format!(
            "WAV sample rate {} Hz does not match expected {} Hz",
            spec.sample_rate, expected_rate
        )));
    }
    if spec.channels == 0 {
        return Err(SentinelError::SensorDecode("WAV has zero channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| SentinelError::SensorDecode(format!("WAV read error: {}", e)))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| SentinelError::SensorDecode(format!("WAV read error: {}", e)))?
        }
    };

    let channels = spec.channels as usize;
    if channels == 1 {
        return Ok(interleaved);
    }

    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

/// 解码原始 f32le PCM
pub fn decode_f32le(bytes: &[u8]) -> SentinelResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(SentinelError::SensorDecode(format!(
            "raw f32 payload length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    if samples.iter().any(|s| !s.is_finite()) {
        return Err(SentinelError::SensorDecode(
            "raw f32 payload contains non-finite samples".to_string(),
        ));
    }
    Ok(samples)
}
