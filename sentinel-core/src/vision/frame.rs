//! 视频帧与帧差运动检测

use crate::error::{SentinelError, SentinelResult};
use image::{DynamicImage, GrayImage, RgbImage};

/// 解码后的视频帧（RGB + 灰度）
#[derive(Debug, Clone)]
pub struct Frame {
    rgb: RgbImage,
    gray: GrayImage,
}

impl Frame {
    /// 从已解码的 RGB 图像构造
    pub fn from_rgb(rgb: RgbImage) -> Self {
        let gray = DynamicImage::ImageRgb8(rgb.clone()).to_luma8();
        Self { rgb, gray }
    }

    /// 解码 PNG / JPEG 等编码图像
    pub fn decode(bytes: &[u8]) -> SentinelResult<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| SentinelError::SensorDecode(format!("invalid image: {}", e)))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(SentinelError::SensorDecode("empty image".to_string()));
        }
        Ok(Self::from_rgb(image.to_rgb8()))
    }

    /// 从 rgb24 原始像素构造（摄像头 rawvideo 输出）
    pub fn from_raw_rgb(width: u32, height: u32, pixels: Vec<u8>) -> SentinelResult<Self> {
        let rgb = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            SentinelError::SensorDecode(format!("raw frame does not match {}x{} rgb24", width, height))
        })?;
        Ok(Self::from_rgb(rgb))
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }
}

/// 帧差运动量：灰度绝对差之和 / 255
///
/// 尺寸不同的两帧无法比较，返回 None。
pub fn motion_score(previous: &Frame, current: &Frame) -> Option<f64> {
    if previous.gray.dimensions() != current.gray.dimensions() {
        return None;
    }

    let total: u64 = previous
        .gray
        .as_raw()
        .iter()
        .zip(current.gray.as_raw())
        .map(|(a, b)| a.abs_diff(*b) as u64)
        .sum();

    Some(total as f64 / 255.0)
}
