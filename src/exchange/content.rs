//! Pooled-segment body storage for exchanges.
//!
//! Bodies are buffered in fixed-size segments drawn from a shared pool so
//! that request handling does not allocate per exchange. A body is either
//! `Absent` (no body at all) or a bounded sequence of segments; the two
//! states are distinct and a zero-length buffered body is not absent.

use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ContentError;

/// Shared pool of fixed-size buffer segments. Segments are handed out as
/// RAII guards that return their buffer on drop, so every exit path of an
/// exchange releases what it acquired.
pub struct BufferPool {
    segment_size: usize,
    max_segments: usize,
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub fn new(segment_size: usize, max_segments: usize) -> Arc<Self> {
        Arc::new(Self {
            segment_size,
            max_segments,
            free: Mutex::new(Vec::new()),
        })
    }

    /// Total bytes a single exchange may buffer.
    pub fn capacity(&self) -> usize {
        self.segment_size * self.max_segments
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    fn acquire(self: &Arc<Self>) -> PooledSegment {
        let buf = self
            .free
            .lock()
            .expect("buffer pool lock poisoned")
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.segment_size));
        PooledSegment {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let mut free = self.free.lock().expect("buffer pool lock poisoned");
        if free.len() < self.max_segments {
            free.push(buf);
        }
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.free.lock().expect("buffer pool lock poisoned").len()
    }
}

/// One pooled segment. Dropping it returns the buffer to its pool.
pub struct PooledSegment {
    buf: Option<BytesMut>,
    pool: Arc<BufferPool>,
}

impl PooledSegment {
    fn bytes(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    fn len(&self) -> usize {
        self.bytes().len()
    }

    fn put(&mut self, chunk: &[u8]) {
        if let Some(buf) = self.buf.as_mut() {
            buf.put_slice(chunk);
        }
    }
}

impl Drop for PooledSegment {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

enum ContentState {
    Absent,
    Buffered(Vec<PooledSegment>),
}

/// Body storage for one side of an exchange.
pub struct ExchangeContent {
    pool: Arc<BufferPool>,
    state: ContentState,
}

impl ExchangeContent {
    pub fn absent(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            state: ContentState::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.state, ContentState::Absent)
    }

    /// Bytes currently buffered; 0 when absent.
    pub fn len(&self) -> usize {
        match &self.state {
            ContentState::Absent => 0,
            ContentState::Buffered(segments) => segments.iter().map(PooledSegment::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the segments into one contiguous buffer. Repeatable: the
    /// segments themselves are left untouched.
    pub fn read(&self) -> Bytes {
        match &self.state {
            ContentState::Absent => Bytes::new(),
            ContentState::Buffered(segments) => {
                let mut out = BytesMut::with_capacity(self.len());
                for segment in segments {
                    out.put_slice(segment.bytes());
                }
                out.freeze()
            }
        }
    }

    /// Replaces the buffered body. `None` transitions to absent and
    /// releases every held segment. Returns the number of bytes copied;
    /// the caller must update its declared content length to match.
    ///
    /// A body larger than the pool's per-exchange budget is refused before
    /// any segment is touched, so the previous body stays observable and
    /// nothing is ever silently truncated.
    pub fn write(&mut self, content: Option<&[u8]>) -> Result<usize, ContentError> {
        let Some(bytes) = content else {
            self.state = ContentState::Absent;
            return Ok(0);
        };

        if bytes.len() > self.pool.capacity() {
            return Err(ContentError::Overflow {
                requested: bytes.len(),
                capacity: self.pool.capacity(),
            });
        }

        let mut segments = Vec::with_capacity(bytes.len().div_ceil(self.pool.segment_size().max(1)));
        let mut copied = 0;
        for chunk in bytes.chunks(self.pool.segment_size()) {
            let mut segment = self.pool.acquire();
            segment.put(chunk);
            copied += chunk.len();
            segments.push(segment);
        }
        self.state = ContentState::Buffered(segments);
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<BufferPool> {
        BufferPool::new(8, 4)
    }

    #[test]
    fn starts_absent() {
        let content = ExchangeContent::absent(pool());
        assert!(content.is_absent());
        assert_eq!(content.len(), 0);
        assert!(content.read().is_empty());
    }

    #[test]
    fn round_trips_within_capacity() {
        let mut content = ExchangeContent::absent(pool());
        let payload = b"spans more than one eight byte segment";
        let copied = content.write(Some(payload)).unwrap();
        assert_eq!(copied, payload.len());
        assert_eq!(content.read().as_ref(), payload);
        // reads are repeatable
        assert_eq!(content.read().as_ref(), payload);
        assert_eq!(content.len(), payload.len());
    }

    #[test]
    fn empty_body_is_not_absent() {
        let mut content = ExchangeContent::absent(pool());
        content.write(Some(b"")).unwrap();
        assert!(!content.is_absent());
        assert_eq!(content.len(), 0);
        assert!(content.read().is_empty());
    }

    #[test]
    fn writing_none_transitions_to_absent() {
        let mut content = ExchangeContent::absent(pool());
        content.write(Some(b"previous body")).unwrap();
        let copied = content.write(None).unwrap();
        assert_eq!(copied, 0);
        assert!(content.is_absent());
        assert!(content.read().is_empty());
    }

    #[test]
    fn overflow_is_refused_and_previous_body_survives() {
        let mut content = ExchangeContent::absent(pool());
        content.write(Some(b"kept")).unwrap();

        let oversized = vec![0u8; 8 * 4 + 1];
        let err = content.write(Some(&oversized)).unwrap_err();
        assert!(matches!(
            err,
            ContentError::Overflow {
                requested: 33,
                capacity: 32
            }
        ));
        assert_eq!(content.read().as_ref(), b"kept");
    }

    #[test]
    fn exact_capacity_fits() {
        let mut content = ExchangeContent::absent(pool());
        let payload = vec![7u8; 32];
        assert_eq!(content.write(Some(&payload)).unwrap(), 32);
        assert_eq!(content.read().as_ref(), payload.as_slice());
    }

    #[test]
    fn segments_return_to_the_pool() {
        let pool = pool();
        {
            let mut content = ExchangeContent::absent(pool.clone());
            content.write(Some(&[1u8; 20])).unwrap();
            assert_eq!(pool.pooled(), 0);
        }
        // three 8-byte segments held the 20 bytes; all came back
        assert_eq!(pool.pooled(), 3);

        let mut content = ExchangeContent::absent(pool.clone());
        content.write(Some(&[2u8; 8])).unwrap();
        assert_eq!(pool.pooled(), 2);
        content.write(None).unwrap();
        assert_eq!(pool.pooled(), 3);
    }
}
