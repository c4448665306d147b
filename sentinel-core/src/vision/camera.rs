//! 摄像头采集（ffmpeg 子进程）
//!
//! ffmpeg 从 v4l2 设备读取并输出固定尺寸的 rgb24 原始帧到 stdout。

use super::frame::Frame;
use crate::capture::SensorSource;
use crate::error::{SentinelError, SentinelResult};
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

/// 摄像头配置
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// 设备路径
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// 输出帧率
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 10,
        }
    }
}

/// 基于 ffmpeg 的摄像头数据源
pub struct FfmpegCameraSource {
    config: CameraConfig,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegCameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            child: None,
            stdout: None,
        }
    }

    fn frame_bytes(&self) -> usize {
        self.config.width as usize * self.config.height as usize * 3
    }
}

impl SensorSource for FfmpegCameraSource {
    type Item = Frame;

    fn name(&self) -> &str {
        &self.config.device
    }

    fn open(&mut self) -> SentinelResult<()> {
        if self.child.is_some() {
            return Ok(());
        }
        if !std::path::Path::new(&self.config.device).exists() {
            return Err(SentinelError::DeviceUnavailable(format!(
                "摄像头不存在: {}",
                self.config.device
            )));
        }

        let size = format!("{}x{}", self.config.width, self.config.height);
        let mut child = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-f", "v4l2", "-i"])
            .arg(&self.config.device)
            .arg("-vf")
            .arg(format!("scale={}:{}", self.config.width, self.config.height))
            .arg("-r")
            .arg(self.config.fps.to_string())
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SentinelError::DeviceUnavailable(format!("启动 ffmpeg 失败: {}", e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SentinelError::DeviceUnavailable(
                    "无法获取 ffmpeg stdout".to_string(),
                ));
            }
        };

        tracing::info!("摄像头已打开: {} ({}, PID {})", self.config.device, size, child.id());
        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    fn read(&mut self) -> SentinelResult<Option<Frame>> {
        let frame_bytes = self.frame_bytes();
        let stdout = match self.stdout.as_mut() {
            Some(stdout) => stdout,
            None => return Ok(None),
        };

        let mut pixels = vec![0u8; frame_bytes];
        match stdout.read_exact(&mut pixels) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        Frame::from_raw_rgb(self.config.width, self.config.height, pixels).map(Some)
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            tracing::info!("关闭摄像头: {}", self.config.device);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        self.close();
    }
}
