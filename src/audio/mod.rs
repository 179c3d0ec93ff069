// Audio module - lock-free transfer of captured blocks to the processing thread

pub mod buffer_pool;

pub use buffer_pool::{
    AudioBlock, BufferPool, CaptureChannels, PoolStats, ProcessingChannels, DEFAULT_BLOCK_SIZE,
    DEFAULT_BUFFER_COUNT,
};
