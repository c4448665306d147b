//! Vision 视觉处理模块
//!
//! 摄像头 / 上传图像 → 人数 + 姿态 + 帧差运动 → StatusStore

pub mod camera;
pub mod config;
pub mod detector;
pub mod frame;
pub mod processor;

pub use camera::{CameraConfig, FfmpegCameraSource};
pub use config::VisionConfig;
pub use detector::{pose_risk, Keypoint, PoseKeypoints, VisionDetector};
pub use frame::{motion_score, Frame};
pub use processor::{VisionFrameProcessor, VisionStats};
