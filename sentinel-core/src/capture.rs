//! 传感器采集线程与处理循环
//!
//! - `CaptureStream`: 在独立线程中从设备读取数据并交给下游队列
//! - `Worker`: 基于运行标志的协作式处理循环

use crate::error::{SentinelError, SentinelResult};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 传感器数据源（麦克风、摄像头等）
pub trait SensorSource: Send {
    /// 采集到的数据单元
    type Item: Send + 'static;

    /// 设备名称（用于日志）
    fn name(&self) -> &str;

    /// 打开设备，设备不存在时返回 `DeviceUnavailable`
    fn open(&mut self) -> SentinelResult<()>;

    /// 读取下一块数据，`Ok(None)` 表示设备流结束
    fn read(&mut self) -> SentinelResult<Option<Self::Item>>;

    /// 关闭设备，可重复调用
    fn close(&mut self);
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    type Item = S::Item;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&mut self) -> SentinelResult<()> {
        (**self).open()
    }

    fn read(&mut self) -> SentinelResult<Option<Self::Item>> {
        (**self).read()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// 麦克风数据源（单声道 f32 样本块）
pub type AudioSource = Box<dyn SensorSource<Item = Vec<f32>>>;

/// 摄像头数据源（已解码的帧）
pub type FrameSource = Box<dyn SensorSource<Item = crate::vision::Frame>>;

/// 设备采集流
pub struct CaptureStream {
    name: String,
    running: Arc<AtomicBool>,
    quit_signal: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CaptureStream {
    /// 打开设备并启动采集线程
    ///
    /// 设备在调用线程上打开，打开失败直接返回错误，不会启动线程。
    pub fn start<S, F>(mut source: S, mut sink: F) -> SentinelResult<Self>
    where
        S: SensorSource + 'static,
        F: FnMut(S::Item) + Send + 'static,
    {
        let name = source.name().to_string();
        source.open()?;
        tracing::info!("采集设备已打开: {}", name);

        let running = Arc::new(AtomicBool::new(true));
        let quit_signal = Arc::new(AtomicBool::new(false));

        let running_clone = running.clone();
        let quit_clone = quit_signal.clone();
        let thread_name = format!("capture-{}", name);

        let thread_handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let mut chunks = 0u64;
                while !quit_clone.load(Ordering::Acquire) {
                    match source.read() {
                        Ok(Some(item)) => {
                            chunks += 1;
                            sink(item);
                        }
                        Ok(None) => {
                            tracing::warn!("采集设备数据流结束: {}", source.name());
                            break;
                        }
                        Err(e) => {
                            tracing::error!("读取采集设备失败: {}", e);
                            break;
                        }
                    }
                }

                source.close();
                running_clone.store(false, Ordering::Release);
                tracing::info!("采集线程停止: {}, 共 {} 块数据", source.name(), chunks);
            })?;

        Ok(Self {
            name,
            running,
            quit_signal,
            thread_handle: Some(thread_handle),
        })
    }

    /// 采集线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 停止采集并等待线程退出（设备在线程退出前关闭）
    pub fn stop(&mut self) {
        self.quit_signal.store(true, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            tracing::info!("请求停止采集: {}", self.name);
            if handle.join().is_err() {
                tracing::error!("采集线程 panic: {}", self.name);
            }
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 协作式处理循环
///
/// 每轮迭代开始时检查运行标志；stop() 可从任意线程调用，可重复调用。
#[derive(Default)]
pub struct Worker {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动处理循环；已在运行时返回 false 且不做任何事
    pub fn start<F>(&self, name: &str, interval: Duration, mut tick: F) -> SentinelResult<bool>
    where
        F: FnMut() + Send + 'static,
    {
        let mut handle = self.handle.lock();
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::warn!("{} 已经在运行", name);
            return Ok(false);
        }

        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    tick();
                    thread::sleep(interval);
                }
            });

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                tracing::info!("{} 处理线程启动", name);
                Ok(true)
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(SentinelError::Io(e))
            }
        }
    }

    /// 清除运行标志并等待线程退出
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("处理线程 panic");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
