//! 麦克风采集（pw-record 子进程）
//!
//! pw-record 以 f32 单声道输出原始 PCM 到 stdout，这里按块读取并转换为样本。

use crate::capture::SensorSource;
use crate::error::{SentinelError, SentinelResult};
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

/// pw-record 采集配置
#[derive(Debug, Clone)]
pub struct PwRecordConfig {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 目标节点（None = 默认音频源）
    pub target: Option<String>,
    /// 每次读取的样本数
    pub chunk_samples: usize,
}

impl Default for PwRecordConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            target: None,
            // 64ms @ 16kHz
            chunk_samples: 1024,
        }
    }
}

/// 把新读到的字节接到上次的尾部后面，转换出所有完整的 f32le 样本
///
/// 不足 4 字节的尾部留在 `pending` 中等待下一次读取。
fn take_samples(pending: &mut Vec<u8>, bytes: &[u8]) -> Vec<f32> {
    pending.extend_from_slice(bytes);
    let whole = pending.len() - pending.len() % 4;
    let samples = pending[..whole]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    pending.drain(..whole);
    samples
}

/// 基于 pw-record 的麦克风数据源
pub struct PwRecordSource {
    config: PwRecordConfig,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    buffer: Vec<u8>,
    /// 上次读取未凑满 4 字节的尾部
    pending: Vec<u8>,
}

impl PwRecordSource {
    pub fn new(config: PwRecordConfig) -> Self {
        let buffer = vec![0u8; config.chunk_samples.max(1) * std::mem::size_of::<f32>()];
        Self {
            config,
            child: None,
            stdout: None,
            buffer,
            pending: Vec::with_capacity(4),
        }
    }
}

impl SensorSource for PwRecordSource {
    type Item = Vec<f32>;

    fn name(&self) -> &str {
        "pw-record"
    }

    fn open(&mut self) -> SentinelResult<()> {
        if self.child.is_some() {
            return Ok(());
        }

        let mut command = Command::new("pw-record");
        command
            .arg("--rate")
            .arg(self.config.sample_rate.to_string())
            .arg("--channels")
            .arg("1")
            .arg("--format")
            .arg("f32");
        if let Some(target) = &self.config.target {
            command.arg("--target").arg(target);
        }

        let mut child = command
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SentinelError::DeviceUnavailable(format!("启动 pw-record 失败: {}", e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SentinelError::DeviceUnavailable(
                    "无法获取 pw-record stdout".to_string(),
                ));
            }
        };

        tracing::info!("pw-record 子进程已启动 (PID: {})", child.id());
        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    fn read(&mut self) -> SentinelResult<Option<Vec<f32>>> {
        let stdout = match self.stdout.as_mut() {
            Some(stdout) => stdout,
            None => return Ok(None),
        };

        let bytes_read = stdout.read(&mut self.buffer)?;
        if bytes_read == 0 {
            return Ok(None);
        }

        Ok(Some(take_samples(&mut self.pending, &self.buffer[..bytes_read])))
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            tracing::info!("停止 pw-record 进程");
            let _ = child.kill();
            let _ = child.wait();
        }
        self.pending.clear();
    }
}

impl Drop for PwRecordSource {
    fn drop(&mut self) {
        self.close();
    }
}
