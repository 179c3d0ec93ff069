// BufferPool - lock-free block transfer with dual SPSC queues
//
// Moves fixed-size sample blocks from the capture callback to the processing
// thread without allocating on either side. Two rtrb ring buffers carry the
// same set of pre-allocated blocks around a loop:
//
// - data queue: capture side pushes filled blocks, processing side pops them
// - pool queue: processing side returns empty blocks, capture side reuses them
//
// When the pool is exhausted (processing fell behind) the capture side drops
// the incoming samples and counts an overrun instead of blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

/// Configuration constants for buffer pool
pub const DEFAULT_BUFFER_COUNT: usize = 64;
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Pre-allocated block; `len` samples of `samples` are valid
#[derive(Debug)]
pub struct AudioBlock {
    samples: Vec<f32>,
    len: usize,
}

impl AudioBlock {
    fn with_capacity(size: usize) -> Self {
        Self {
            samples: vec![0.0; size],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples[..self.len]
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }
}

/// Drop counters shared by both sides
#[derive(Debug, Default)]
pub struct PoolStats {
    overruns: AtomicU64,
    blocks_delivered: AtomicU64,
}

impl PoolStats {
    /// Blocks lost because no empty block was available
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn blocks_delivered(&self) -> u64 {
        self.blocks_delivered.load(Ordering::Relaxed)
    }
}

/// Capture-thread half: fills blocks
pub struct CaptureChannels {
    data_producer: Producer<AudioBlock>,
    pool_consumer: Consumer<AudioBlock>,
    block_size: usize,
    stats: Arc<PoolStats>,
}

impl CaptureChannels {
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Whether the next `write` of one block would find an empty block
    pub fn has_free_block(&self) -> bool {
        !self.pool_consumer.is_empty()
    }

    /// Copy `samples` into as many blocks as needed; returns blocks queued
    ///
    /// Never allocates. Samples that find no free block are dropped.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let mut queued = 0;
        for chunk in samples.chunks(self.block_size) {
            let Ok(mut block) = self.pool_consumer.pop() else {
                self.stats.overruns.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            block.samples[..chunk.len()].copy_from_slice(chunk);
            block.len = chunk.len();
            if self.data_producer.push(block).is_err() {
                // Unreachable while both queues share one block set
                self.stats.overruns.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            queued += 1;
        }
        queued
    }

    /// Write the first channel of interleaved frames
    pub fn write_interleaved(&mut self, data: &[f32], channels: usize) -> usize {
        if channels <= 1 {
            return self.write(data);
        }
        let mut queued = 0;
        for frames in data.chunks(self.block_size * channels) {
            let Ok(mut block) = self.pool_consumer.pop() else {
                self.stats.overruns.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            let mut len = 0;
            for frame in frames.chunks(channels) {
                block.samples[len] = frame[0];
                len += 1;
            }
            block.len = len;
            if self.data_producer.push(block).is_ok() {
                queued += 1;
            } else {
                self.stats.overruns.fetch_add(1, Ordering::Relaxed);
            }
        }
        queued
    }
}

/// Processing-thread half: consumes blocks and recycles them
pub struct ProcessingChannels {
    data_consumer: Consumer<AudioBlock>,
    pool_producer: Producer<AudioBlock>,
    stats: Arc<PoolStats>,
}

impl ProcessingChannels {
    /// Hand every queued block to `f` in arrival order; returns blocks seen
    pub fn drain<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&[f32]),
    {
        let mut count = 0;
        while let Ok(block) = self.data_consumer.pop() {
            f(block.as_slice());
            count += 1;
            if self.pool_producer.push(block).is_err() {
                tracing::warn!("[BufferPool] Pool queue full, dropping block");
            }
        }
        self.stats
            .blocks_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.data_consumer.is_empty()
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
pub struct BufferPool;

impl BufferPool {
    /// Allocate `buffer_count` blocks of `block_size` samples and split the
    /// queues into their capture and processing halves
    ///
    /// Zero counts or sizes are raised to 1.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        buffer_count: usize,
        block_size: usize,
    ) -> (CaptureChannels, ProcessingChannels, Arc<PoolStats>) {
        let buffer_count = buffer_count.max(1);
        let block_size = block_size.max(1);

        let (mut pool_producer, pool_consumer) = RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = RingBuffer::new(buffer_count);

        // The only allocation of blocks
        for _ in 0..buffer_count {
            if pool_producer.push(AudioBlock::with_capacity(block_size)).is_err() {
                break;
            }
        }

        let stats = Arc::new(PoolStats::default());
        (
            CaptureChannels {
                data_producer,
                pool_consumer,
                block_size,
                stats: Arc::clone(&stats),
            },
            ProcessingChannels {
                data_consumer,
                pool_producer,
                stats: Arc::clone(&stats),
            },
            stats,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_splits_into_blocks() {
        let (mut capture, mut processing, stats) = BufferPool::new(8, 4);
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        assert_eq!(capture.write(&samples), 3);

        let mut seen = Vec::new();
        let count = processing.drain(|block| seen.push(block.to_vec()));
        assert_eq!(count, 3);
        assert_eq!(seen[0], vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(seen[2], vec![8.0, 9.0]);
        assert_eq!(stats.blocks_delivered(), 3);
        assert_eq!(stats.overruns(), 0);
    }

    #[test]
    fn test_blocks_are_recycled() {
        let (mut capture, mut processing, stats) = BufferPool::new(2, 4);
        for round in 0..10 {
            assert_eq!(capture.write(&[round as f32; 8]), 2);
            let mut total = 0.0;
            processing.drain(|block| total += block.iter().sum::<f32>());
            assert_eq!(total, round as f32 * 8.0);
        }
        assert_eq!(stats.overruns(), 0);
    }

    #[test]
    fn test_exhausted_pool_counts_overruns() {
        let (mut capture, mut processing, stats) = BufferPool::new(2, 4);
        assert_eq!(capture.write(&[1.0; 16]), 2);
        assert_eq!(stats.overruns(), 2);

        assert_eq!(processing.drain(|_| {}), 2);
        assert!(processing.is_empty());
        assert_eq!(capture.write(&[1.0; 4]), 1);
    }

    #[test]
    fn test_interleaved_takes_first_channel() {
        let (mut capture, mut processing, _) = BufferPool::new(4, 4);
        let stereo = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        assert_eq!(capture.write_interleaved(&stereo, 2), 1);
        let mut seen = Vec::new();
        processing.drain(|block| seen.extend_from_slice(block));
        assert_eq!(seen, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_halves_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CaptureChannels>();
        assert_send::<ProcessingChannels>();
    }

    #[test]
    fn test_zero_sizes_are_raised() {
        let (capture, _processing, _) = BufferPool::new(0, 0);
        assert_eq!(capture.block_size(), 1);
    }
}
