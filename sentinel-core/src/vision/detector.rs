//! 视觉检测接口与姿态判定

use super::frame::Frame;
use crate::error::SentinelResult;

/// COCO 关键点下标
pub const LEFT_SHOULDER: usize = 5;
pub const RIGHT_SHOULDER: usize = 6;
pub const LEFT_WRIST: usize = 9;
pub const RIGHT_WRIST: usize = 10;

/// 单个关键点（图像坐标，y 轴向下）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            confidence: 1.0,
        }
    }
}

/// 一个人的关键点集合（COCO 17 点顺序，未检出的点为 None）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseKeypoints {
    pub points: Vec<Option<Keypoint>>,
}

impl PoseKeypoints {
    pub fn new(points: Vec<Option<Keypoint>>) -> Self {
        Self { points }
    }

    /// 取已解析的关键点；y <= 0 视为未解析
    fn resolved(&self, index: usize) -> Option<Keypoint> {
        self.points
            .get(index)
            .copied()
            .flatten()
            .filter(|kp| kp.y > 0.0)
    }

    /// 同侧手腕高于肩膀（两点都解析时）
    fn wrist_above_shoulder(&self, wrist: usize, shoulder: usize) -> bool {
        matches!(
            (self.resolved(wrist), self.resolved(shoulder)),
            (Some(w), Some(s)) if w.y < s.y
        )
    }

    /// 举手/防御姿态：任一侧手腕高于同侧肩膀
    ///
    /// 两侧分别判断，一侧未检出不影响另一侧。
    pub fn hands_raised(&self) -> bool {
        self.wrist_above_shoulder(LEFT_WRIST, LEFT_SHOULDER)
            || self.wrist_above_shoulder(RIGHT_WRIST, RIGHT_SHOULDER)
    }
}

/// 视觉检测器
pub trait VisionDetector: Send + Sync {
    /// 画面中类别为 person 的检测数
    fn detect_people(&self, frame: &Frame) -> SentinelResult<usize>;

    /// 姿态关键点；检测器不支持姿态时返回 `Ok(None)`
    fn detect_pose(&self, frame: &Frame) -> SentinelResult<Option<Vec<PoseKeypoints>>> {
        let _ = frame;
        Ok(None)
    }
}

/// 任一姿态为举手姿态
pub fn pose_risk(poses: &[PoseKeypoints]) -> bool {
    poses.iter().any(PoseKeypoints::hands_raised)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(shoulder_y: f32, left_wrist_y: f32, right_wrist_y: f32) -> PoseKeypoints {
        let mut points = vec![None; 17];
        points[LEFT_SHOULDER] = Some(Keypoint::new(40.0, shoulder_y));
        points[RIGHT_SHOULDER] = Some(Keypoint::new(60.0, shoulder_y));
        points[LEFT_WRIST] = Some(Keypoint::new(35.0, left_wrist_y));
        points[RIGHT_WRIST] = Some(Keypoint::new(65.0, right_wrist_y));
        PoseKeypoints::new(points)
    }

    #[test]
    fn test_hands_raised() {
        assert!(pose(100.0, 50.0, 150.0).hands_raised());
        assert!(pose(100.0, 150.0, 80.0).hands_raised());
        assert!(!pose(100.0, 150.0, 150.0).hands_raised());
    }

    #[test]
    fn test_unresolved_keypoints_are_ignored() {
        // 右肩缺失，只看左侧
        let mut p = pose(100.0, 150.0, 50.0);
        p.points[RIGHT_SHOULDER] = None;
        assert!(!p.hands_raised());

        // y = 0 表示模型未检出
        let p = pose(100.0, 0.0, 150.0);
        assert!(!p.hands_raised());

        assert!(!PoseKeypoints::default().hands_raised());
    }

    #[test]
    fn test_one_side_resolved_is_enough() {
        let mut points = vec![None; 17];
        points[LEFT_SHOULDER] = Some(Keypoint::new(40.0, 100.0));
        points[LEFT_WRIST] = Some(Keypoint::new(35.0, 30.0));
        points[RIGHT_SHOULDER] = Some(Keypoint::new(60.0, 0.0));
        points[RIGHT_WRIST] = Some(Keypoint::new(65.0, 0.0));
        assert!(PoseKeypoints::new(points.clone()).hands_raised());

        points[LEFT_WRIST] = Some(Keypoint::new(35.0, 140.0));
        assert!(!PoseKeypoints::new(points).hands_raised());
    }

    #[test]
    fn test_pose_risk_any() {
        assert!(pose_risk(&[pose(100.0, 150.0, 150.0), pose(100.0, 20.0, 150.0)]));
        assert!(!pose_risk(&[]));
    }
}
