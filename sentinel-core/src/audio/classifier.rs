//! 音频情绪分类接口
//!
//! 处理器只依赖 `AudioClassifier` trait；具体模型由调用方注入。
//! 启用 `onnx` feature 时提供基于 ONNX Runtime 的实现。

use crate::error::{SentinelError, SentinelResult};

/// 一次分类的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// 情绪标签
    pub label: String,
    /// 置信度 [0, 1]
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// 校验模型输出：NaN 视为推理失败，其余截断到 [0, 1]
    pub fn sanitized(self) -> SentinelResult<Self> {
        if self.confidence.is_nan() {
            return Err(SentinelError::ModelInference(format!(
                "classifier returned NaN confidence for '{}'",
                self.label
            )));
        }
        Ok(Self {
            confidence: self.confidence.clamp(0.0, 1.0),
            ..self
        })
    }
}

/// 音频分类器
pub trait AudioClassifier: Send + Sync {
    /// 对一段单声道样本 (f32, [-1.0, 1.0]) 做一次分类
    fn infer(&self, window: &[f32]) -> SentinelResult<Classification>;
}

impl<F> AudioClassifier for F
where
    F: Fn(&[f32]) -> SentinelResult<Classification> + Send + Sync,
{
    fn infer(&self, window: &[f32]) -> SentinelResult<Classification> {
        self(window)
    }
}

/// 零均值、单位方差归一化（wav2vec2 类模型的输入要求）
pub fn normalize_waveform(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let var = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / n;
    let std = (var + 1e-7).sqrt();
    samples.iter().map(|s| (s - mean) / std).collect()
}

/// softmax 后取最大项，返回 (下标, 概率)
pub fn softmax_argmax(logits: &[f32]) -> Option<(usize, f32)> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return None;
    }
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, e)| (i, e / sum))
}

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxEmotionClassifier, OnnxEmotionConfig};

#[cfg(feature = "onnx")]
mod onnx {
    use super::{normalize_waveform, softmax_argmax, AudioClassifier, Classification};
    use crate::error::{SentinelError, SentinelResult};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Value;
    use parking_lot::Mutex;

    /// ONNX 情绪分类器配置
    #[derive(Debug, Clone)]
    pub struct OnnxEmotionConfig {
        /// 模型文件路径
        pub model_path: String,
        /// 输出下标对应的标签
        pub labels: Vec<String>,
        /// 推理线程数
        pub intra_threads: usize,
    }

    impl Default for OnnxEmotionConfig {
        fn default() -> Self {
            Self {
                model_path: "models/emotion/model.onnx".to_string(),
                labels: ["angry", "disgust", "fearful", "happy", "neutral", "sad", "surprised"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                intra_threads: 1,
            }
        }
    }

    /// 基于 ONNX Runtime 的情绪分类器
    ///
    /// 输入 `[1, N]` 归一化波形，输出 `[1, labels]` logits。
    pub struct OnnxEmotionClassifier {
        session: Mutex<Session>,
        labels: Vec<String>,
    }

    impl OnnxEmotionClassifier {
        pub fn new(config: OnnxEmotionConfig) -> SentinelResult<Self> {
            tracing::info!("加载情绪分类模型: {}", config.model_path);

            let load_err = |reason: String| SentinelError::ModelLoad {
                path: config.model_path.clone(),
                reason,
            };

            let model_bytes = std::fs::read(&config.model_path)
                .map_err(|e| load_err(format!("failed to read model file: {}", e)))?;

            let session = Session::builder()
                .map_err(|e| load_err(format!("failed to create session builder: {}", e)))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| load_err(format!("failed to set optimization level: {}", e)))?
                .with_intra_threads(config.intra_threads)
                .map_err(|e| load_err(format!("failed to set intra threads: {}", e)))?
                .commit_from_memory(&model_bytes)
                .map_err(|e| load_err(format!("failed to load model: {}", e)))?;

            for (i, input) in session.inputs().iter().enumerate() {
                tracing::debug!("情绪模型 input[{}]: name='{}'", i, input.name());
            }

            Ok(Self {
                session: Mutex::new(session),
                labels: config.labels,
            })
        }
    }

    impl AudioClassifier for OnnxEmotionClassifier {
        fn infer(&self, window: &[f32]) -> SentinelResult<Classification> {
            use ort::inputs;

            let input = normalize_waveform(window);
            let input_tensor = Value::from_array((vec![1usize, input.len()], input)).map_err(|e| {
                SentinelError::ModelInference(format!("failed to create input tensor: {}", e))
            })?;

            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![input_tensor])
                .map_err(|e| SentinelError::ModelInference(format!("inference failed: {}", e)))?;

            let (_shape, logits) = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
                SentinelError::ModelInference(format!("failed to extract logits: {}", e))
            })?;

            let (index, prob) = softmax_argmax(logits)
                .ok_or_else(|| SentinelError::ModelInference("empty or non-finite logits".to_string()))?;
            let label = self
                .labels
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("label_{}", index));

            tracing::trace!("情绪推理: {} ({:.3})", label, prob);
            Ok(Classification::new(label, prob as f64))
        }
    }
}
