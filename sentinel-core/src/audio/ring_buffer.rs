//! 有界环形队列
//!
//! 采集端与处理循环之间的缓冲。写满时丢弃最旧的数据（drop-oldest），
//! 保证持续过载时内存有上限，且写入永不阻塞在处理逻辑上。

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// 环形队列（生产者 + 消费者对）
pub struct RingBuffer<T> {
    buffer: Arc<Mutex<VecDeque<T>>>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

/// 音频样本队列
pub type AudioRingBuffer = RingBuffer<f32>;
pub type AudioRingProducer = RingProducer<f32>;
pub type AudioRingConsumer = RingConsumer<f32>;

impl<T> RingBuffer<T> {
    /// 创建容量为 `capacity` 的队列（至少为 1）
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 分离为生产者和消费者
    pub fn split(self) -> (RingProducer<T>, RingConsumer<T>) {
        (
            RingProducer {
                buffer: self.buffer.clone(),
                capacity: self.capacity,
                dropped: self.dropped.clone(),
            },
            RingConsumer {
                buffer: self.buffer,
                capacity: self.capacity,
                dropped: self.dropped,
            },
        )
    }
}

/// 生产者（设备线程或外部调用者），可克隆
pub struct RingProducer<T> {
    buffer: Arc<Mutex<VecDeque<T>>>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for RingProducer<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            capacity: self.capacity,
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> RingProducer<T> {
    /// 写入单个元素，返回被挤掉的旧元素数 (0 或 1)
    pub fn push(&self, item: T) -> usize {
        let mut buffer = self.buffer.lock();
        let mut lost = 0;
        if buffer.len() >= self.capacity {
            buffer.pop_front();
            lost = 1;
        }
        buffer.push_back(item);
        drop(buffer);

        if lost > 0 {
            self.dropped.fetch_add(lost as u64, Ordering::Relaxed);
        }
        lost
    }

    /// 累计丢弃数
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Copy> RingProducer<T> {
    /// 批量写入，返回被丢弃的元素数
    ///
    /// 输入本身超过容量时只保留其尾部。
    pub fn write(&self, items: &[T]) -> usize {
        if items.is_empty() {
            return 0;
        }

        let (skipped, tail) = if items.len() > self.capacity {
            let skip = items.len() - self.capacity;
            (skip, &items[skip..])
        } else {
            (0, items)
        };

        let mut buffer = self.buffer.lock();
        let overflow = (buffer.len() + tail.len()).saturating_sub(self.capacity);
        buffer.drain(..overflow);
        buffer.extend(tail.iter().copied());
        drop(buffer);

        let lost = skipped + overflow;
        if lost > 0 {
            self.dropped.fetch_add(lost as u64, Ordering::Relaxed);
            tracing::debug!("队列已满，丢弃 {} 个最旧元素", lost);
        }
        lost
    }
}

/// 消费者（处理循环）
pub struct RingConsumer<T> {
    buffer: Arc<Mutex<VecDeque<T>>>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl<T> RingConsumer<T> {
    /// 非阻塞读取当前可用的所有数据
    pub fn drain_all(&self) -> Vec<T> {
        let mut buffer = self.buffer.lock();
        buffer.drain(..).collect()
    }

    /// 追加当前可用的所有数据到 `out`，返回追加数量
    pub fn drain_into(&self, out: &mut Vec<T>) -> usize {
        let mut buffer = self.buffer.lock();
        let n = buffer.len();
        out.extend(buffer.drain(..));
        n
    }

    /// 当前可读元素数
    #[inline]
    pub fn available(&self) -> usize {
        self.buffer.lock().len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_basic() {
        let (producer, consumer) = AudioRingBuffer::new(1024).split();

        let samples = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(producer.write(&samples), 0);
        assert_eq!(consumer.available(), 4);
        assert_eq!(consumer.drain_all(), samples);
        assert_eq!(consumer.available(), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let (producer, consumer) = RingBuffer::<f32>::new(10).split();

        producer.write(&[0.0; 6]);
        let lost = producer.write(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(lost, 2);

        let data = consumer.drain_all();
        assert_eq!(data.len(), 10);
        assert_eq!(&data[..4], &[0.0; 4]);
        assert_eq!(&data[4..], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(consumer.dropped_count(), 2);
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let (producer, consumer) = RingBuffer::<f32>::new(3).split();

        let samples: Vec<f32> = (0..8).map(|i| i as f32).collect();
        assert_eq!(producer.write(&samples), 5);
        assert_eq!(consumer.drain_all(), vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_push_drops_oldest_item() {
        let (producer, consumer) = RingBuffer::new(2).split();

        producer.push("a");
        producer.push("b");
        assert_eq!(producer.push("c"), 1);

        assert_eq!(consumer.drain_all(), vec!["b", "c"]);
        assert!(consumer.drain_all().is_empty());
        assert_eq!(producer.dropped_count(), 1);
    }
}
