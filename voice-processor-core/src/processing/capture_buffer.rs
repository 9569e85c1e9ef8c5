/// Samples per storage chunk (~1 s of 16 kHz mono).
pub const DEFAULT_CHUNK_SAMPLES: usize = 16 * 1024;

/// Append-only capture store for processed samples.
///
/// Storage is a list of fixed-size chunks reserved up front by `reset`.
/// `append` runs on the real-time thread: while the reservation lasts it only
/// copies, and past it each new chunk is one bounded allocation. Filled
/// chunks are never moved or copied again.
///
/// Not synchronized itself: the owner wraps it in a `parking_lot::Mutex`,
/// and the callback side should only ever `try_lock`.
#[derive(Debug)]
pub struct CaptureBuffer {
    chunks: Vec<Box<[i16]>>,
    chunk_size: usize,
    len: usize,
    limit: Option<usize>,
    dropped: u64,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SAMPLES)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_size: chunk_size.max(1),
            len: 0,
            limit: None,
            dropped: 0,
        }
    }

    /// Clear recorded data, set the sample cap and reserve storage.
    ///
    /// Existing chunks are reused. Only called while no stream is running.
    pub fn reset(&mut self, reserve_samples: usize, limit: Option<usize>) {
        self.len = 0;
        self.dropped = 0;
        self.limit = limit;

        let reserve = limit.map_or(reserve_samples, |l| reserve_samples.min(l));
        let needed = reserve.div_ceil(self.chunk_size);
        // Room in the chunk table for growth, so pushing a chunk is pointer-sized work.
        self.chunks.reserve(needed.max(16) * 4);
        while self.chunks.len() < needed {
            self.chunks.push(self.new_chunk());
        }
    }

    /// Append a processed block. Returns how many samples were accepted;
    /// the rest (past the cap) are counted as dropped.
    pub fn append(&mut self, block: &[i16]) -> usize {
        let room = self.limit.map_or(usize::MAX, |l| l.saturating_sub(self.len));
        let accepted = block.len().min(room);

        let mut remaining = &block[..accepted];
        while !remaining.is_empty() {
            let index = self.len / self.chunk_size;
            let offset = self.len % self.chunk_size;
            if index == self.chunks.len() {
                let chunk = self.new_chunk();
                self.chunks.push(chunk);
            }

            let n = (self.chunk_size - offset).min(remaining.len());
            self.chunks[index][offset..offset + n].copy_from_slice(&remaining[..n]);
            self.len += n;
            remaining = &remaining[n..];
        }

        self.dropped += (block.len() - accepted) as u64;
        accepted
    }

    /// Copy out the full recorded sequence without consuming it.
    pub fn to_vec(&self) -> Vec<i16> {
        let mut out = Vec::with_capacity(self.len);
        let mut remaining = self.len;
        for chunk in &self.chunks {
            if remaining == 0 {
                break;
            }
            let n = remaining.min(self.chunk_size);
            out.extend_from_slice(&chunk[..n]);
            remaining -= n;
        }
        out
    }

    /// Take the full recorded sequence, leaving the buffer empty.
    ///
    /// Chunks stay allocated for the next session.
    pub fn drain(&mut self) -> Vec<i16> {
        let out = self.to_vec();
        self.len = 0;
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples that fit without allocating.
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.chunk_size
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|l| self.len >= l)
    }

    fn new_chunk(&self) -> Box<[i16]> {
        vec![0i16; self.chunk_size].into_boxed_slice()
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_drain_preserves_order() {
        let mut buf = CaptureBuffer::with_chunk_size(4);
        buf.reset(8, None);

        buf.append(&[1, 2, 3]);
        buf.append(&[4, 5, 6, 7]);

        assert_eq!(buf.len(), 7);
        assert_eq!(buf.drain(), vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(buf.is_empty());
    }

    #[test]
    fn n_blocks_yield_n_times_b_samples() {
        let mut buf = CaptureBuffer::with_chunk_size(100);
        buf.reset(1000, None);

        for i in 0..250 {
            let block = [i as i16; 48];
            assert_eq!(buf.append(&block), 48);
        }

        let data = buf.to_vec();
        assert_eq!(data.len(), 250 * 48);
        assert_eq!(data[47], 0);
        assert_eq!(data[48], 1);
        assert_eq!(data[data.len() - 1], 249);
    }

    #[test]
    fn grows_past_reservation_without_losing_data() {
        let mut buf = CaptureBuffer::with_chunk_size(4);
        buf.reset(4, None);
        assert_eq!(buf.capacity(), 4);

        let samples: Vec<i16> = (0..10).collect();
        buf.append(&samples);

        assert_eq!(buf.capacity(), 12);
        assert_eq!(buf.to_vec(), samples);
        assert_eq!(buf.dropped_samples(), 0);
    }

    #[test]
    fn limit_drops_excess_samples() {
        let mut buf = CaptureBuffer::with_chunk_size(4);
        buf.reset(100, Some(5));
        assert_eq!(buf.capacity(), 8); // reservation clamped to the limit

        assert_eq!(buf.append(&[1, 2, 3]), 3);
        assert_eq!(buf.append(&[4, 5, 6]), 2);
        assert_eq!(buf.append(&[7]), 0);

        assert!(buf.is_full());
        assert_eq!(buf.dropped_samples(), 2);
        assert_eq!(buf.to_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn to_vec_is_repeatable() {
        let mut buf = CaptureBuffer::with_chunk_size(3);
        buf.reset(0, None);
        buf.append(&[9, 8, 7, 6, 5]);

        assert_eq!(buf.to_vec(), buf.to_vec());
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn reset_clears_and_reuses_chunks() {
        let mut buf = CaptureBuffer::with_chunk_size(4);
        buf.reset(0, Some(2));
        buf.append(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.dropped_samples(), 4);

        buf.reset(8, None);
        assert!(buf.is_empty());
        assert_eq!(buf.dropped_samples(), 0);
        assert_eq!(buf.limit(), None);
        assert_eq!(buf.capacity(), 8);
        assert!(buf.to_vec().is_empty());
    }

    #[test]
    fn empty_operations() {
        let mut buf = CaptureBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.append(&[]), 0);
        assert!(buf.drain().is_empty());
        assert!(!buf.is_full());
    }
}
