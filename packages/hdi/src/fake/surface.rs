//! Fake graphic buffer queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    AcquiredBuffer, BufferFlushConfig, BufferListener, BufferRequestConfig, HdiError, HdiResult,
    SharedMemory, Surface, SurfaceAllocator, SurfaceBuffer, TransformType,
};

const DEFAULT_QUEUE_SIZE: u32 = 3;

type Listener = Arc<dyn Fn() + Send + Sync>;

struct Queue {
    capacity: u32,
    allocated: u32,
    next_seq: u32,
    free: VecDeque<Arc<SurfaceBuffer>>,
    queued: VecDeque<(Arc<SurfaceBuffer>, i64)>,
    transform: TransformType,
    rendered: Vec<i64>,
    release_listener: Option<Listener>,
    consumer_listener: Option<Listener>,
    /// Display mode: flushed buffers are consumed and released at once.
    auto_consume: bool,
}

struct BufferQueue {
    queue: Mutex<Queue>,
}

impl BufferQueue {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One end of an in-process buffer queue.
pub struct FakeSurface {
    queue: Arc<BufferQueue>,
    consumer: bool,
}

impl FakeSurface {
    /// Create a queue and return its `(consumer, producer)` ends.
    ///
    /// With `auto_consume`, every flushed buffer is immediately acquired and
    /// released again, like a display that shows frames as they arrive.
    #[must_use]
    pub fn pair(auto_consume: bool) -> (Arc<FakeSurface>, Arc<FakeSurface>) {
        let queue = Arc::new(BufferQueue {
            queue: Mutex::new(Queue {
                capacity: DEFAULT_QUEUE_SIZE,
                allocated: 0,
                next_seq: 0,
                free: VecDeque::new(),
                queued: VecDeque::new(),
                transform: TransformType::RotateNone,
                rendered: Vec::new(),
                release_listener: None,
                consumer_listener: None,
                auto_consume,
            }),
        });
        (
            Arc::new(FakeSurface {
                queue: queue.clone(),
                consumer: true,
            }),
            Arc::new(FakeSurface {
                queue,
                consumer: false,
            }),
        )
    }

    /// Producer end of a display queue.
    #[must_use]
    pub fn display() -> Arc<FakeSurface> {
        Self::pair(true).1
    }

    /// Current display transform.
    #[must_use]
    pub fn transform(&self) -> TransformType {
        self.queue.lock().transform
    }

    /// Timestamps of every buffer flushed so far.
    #[must_use]
    pub fn rendered(&self) -> Vec<i64> {
        self.queue.lock().rendered.clone()
    }

    /// Capacity set through [`Surface::set_queue_size`].
    #[must_use]
    pub fn queue_size(&self) -> u32 {
        self.queue.lock().capacity
    }

    fn producer_only(&self) -> HdiResult {
        if self.consumer {
            Err(HdiError::NotSupported)
        } else {
            Ok(())
        }
    }

    fn consumer_only(&self) -> HdiResult {
        if self.consumer {
            Ok(())
        } else {
            Err(HdiError::NotSupported)
        }
    }
}

impl Surface for FakeSurface {
    fn is_consumer(&self) -> bool {
        self.consumer
    }

    fn request_buffer(&self, config: &BufferRequestConfig) -> HdiResult<Arc<SurfaceBuffer>> {
        self.producer_only()?;
        let mut q = self.queue.lock();
        while let Some(buffer) = q.free.pop_front() {
            if buffer.width() == config.width
                && buffer.height() == config.height
                && buffer.format() == config.format
            {
                return Ok(buffer);
            }
            q.allocated -= 1;
        }
        if q.allocated >= q.capacity {
            return Err(HdiError::Failure);
        }
        let align = config.stride_alignment.max(1);
        let stride = config.width.div_ceil(align) * align;
        let size = config.format.frame_size(stride, config.height).max(1);
        let memory = SharedMemory::create(size, "FakeSurfaceBuffer")?;
        q.next_seq += 1;
        q.allocated += 1;
        Ok(Arc::new(SurfaceBuffer::new(q.next_seq, config, stride, memory)))
    }

    fn flush_buffer(&self, buffer: &Arc<SurfaceBuffer>, config: &BufferFlushConfig) -> HdiResult {
        self.producer_only()?;
        let listener = {
            let mut q = self.queue.lock();
            q.rendered.push(config.timestamp);
            if q.auto_consume {
                q.free.push_back(buffer.clone());
                q.release_listener.clone()
            } else {
                q.queued.push_back((buffer.clone(), config.timestamp));
                q.consumer_listener.clone()
            }
        };
        if let Some(listener) = listener {
            listener();
        }
        Ok(())
    }

    fn cancel_buffer(&self, buffer: &Arc<SurfaceBuffer>) -> HdiResult {
        self.producer_only()?;
        self.queue.lock().free.push_back(buffer.clone());
        Ok(())
    }

    fn set_queue_size(&self, size: u32) -> HdiResult {
        if size == 0 {
            return Err(HdiError::InvalidParam);
        }
        self.queue.lock().capacity = size;
        Ok(())
    }

    fn set_transform(&self, transform: TransformType) -> HdiResult {
        self.producer_only()?;
        self.queue.lock().transform = transform;
        Ok(())
    }

    fn register_release_listener(&self, listener: BufferListener) -> HdiResult {
        self.producer_only()?;
        self.queue.lock().release_listener = Some(Arc::from(listener));
        Ok(())
    }

    fn acquire_buffer(&self) -> HdiResult<AcquiredBuffer> {
        self.consumer_only()?;
        let (buffer, timestamp) = self.queue.lock().queued.pop_front().ok_or(HdiError::Failure)?;
        Ok(AcquiredBuffer {
            buffer,
            fence_fd: -1,
            timestamp,
        })
    }

    fn release_buffer(&self, buffer: &Arc<SurfaceBuffer>, _fence_fd: i32) -> HdiResult {
        self.consumer_only()?;
        let listener = {
            let mut q = self.queue.lock();
            q.free.push_back(buffer.clone());
            q.release_listener.clone()
        };
        if let Some(listener) = listener {
            listener();
        }
        Ok(())
    }

    fn register_consumer_listener(&self, listener: BufferListener) -> HdiResult {
        self.consumer_only()?;
        self.queue.lock().consumer_listener = Some(Arc::from(listener));
        Ok(())
    }
}

/// Allocator handing out fresh [`FakeSurface`] pairs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeSurfaceAllocator;

impl SurfaceAllocator for FakeSurfaceAllocator {
    fn create_surface_pair(&self, name: &str) -> HdiResult<(Arc<dyn Surface>, Arc<dyn Surface>)> {
        tracing::debug!("creating surface pair {}", name);
        let (consumer, producer) = FakeSurface::pair(false);
        Ok((consumer, producer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphicPixelFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> BufferRequestConfig {
        BufferRequestConfig {
            width: 64,
            height: 32,
            stride_alignment: 32,
            format: GraphicPixelFormat::Ycbcr420Sp,
            ..Default::default()
        }
    }

    #[test]
    fn test_request_respects_queue_size() {
        let (_, producer) = FakeSurface::pair(false);
        producer.set_queue_size(2).unwrap();
        let a = producer.request_buffer(&config()).unwrap();
        let b = producer.request_buffer(&config()).unwrap();
        assert!(!a.same_handle(&b));
        assert!(producer.request_buffer(&config()).is_err());
        producer.cancel_buffer(&a).unwrap();
        let c = producer.request_buffer(&config()).unwrap();
        assert!(c.same_handle(&a));
    }

    #[test]
    fn test_display_releases_flushed_buffers() {
        let producer = FakeSurface::display();
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        producer
            .register_release_listener(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        let buffer = producer.request_buffer(&config()).unwrap();
        let flush = BufferFlushConfig {
            timestamp: 42,
            ..Default::default()
        };
        producer.flush_buffer(&buffer, &flush).unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(producer.rendered(), vec![42]);
        let again = producer.request_buffer(&config()).unwrap();
        assert!(again.same_handle(&buffer));
    }

    #[test]
    fn test_consumer_acquires_in_order() {
        let (consumer, producer) = FakeSurface::pair(false);
        let a = producer.request_buffer(&config()).unwrap();
        let b = producer.request_buffer(&config()).unwrap();
        for (buffer, ts) in [(&a, 1), (&b, 2)] {
            let flush = BufferFlushConfig {
                timestamp: ts,
                ..Default::default()
            };
            producer.flush_buffer(buffer, &flush).unwrap();
        }
        let first = consumer.acquire_buffer().unwrap();
        assert!(first.buffer.same_handle(&a));
        assert_eq!(first.timestamp, 1);
        consumer.release_buffer(&first.buffer, -1).unwrap();
        assert_eq!(consumer.acquire_buffer().unwrap().timestamp, 2);
        assert!(consumer.acquire_buffer().is_err());
    }

    #[test]
    fn test_wrong_end_is_rejected() {
        let (consumer, producer) = FakeSurface::pair(false);
        assert!(consumer.is_consumer());
        assert_eq!(
            consumer.request_buffer(&config()).unwrap_err(),
            HdiError::NotSupported
        );
        assert_eq!(producer.acquire_buffer().unwrap_err(), HdiError::NotSupported);
    }
}
