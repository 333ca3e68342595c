//! # Buffer Pool
//!
//! Bounded recycler for fixed-size packet buffers, so the send and receive
//! paths do not allocate once the pool is warm.
//!
//! ## Behaviour
//! - Buffers are kept on a LIFO stack: the most recently released buffer is
//!   handed out first while it is still warm in cache.
//! - An empty pool allocates a fresh buffer. Allocating past `max_pool_size`
//!   logs a warning but still succeeds.
//! - Releasing into a full pool frees the buffer immediately and lowers the
//!   created count, so the pool never grows past its bound.
//! - Contents are not cleared between uses unless `clear_on_take` is set.
//!
//! ## Usage
//! ```rust
//! use peer_link::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(1300, 10, 100).unwrap();
//! let mut buffer = pool.take();
//! buffer[0] = 42;
//! // Returned to the pool on release or drop
//! buffer.release();
//! assert_eq!(pool.available(), 10);
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::config::PoolConfig;
use crate::error::constants::{ERR_START_EXCEEDS_MAX, ERR_ZERO_BUFFER_SIZE};
use crate::error::{LinkError, Result};
use crate::utils::metrics::global_metrics;

/// A fixed-size buffer on loan from a [`BufferPool`]
///
/// The buffer goes back to its pool when released or dropped, exactly once.
pub struct ByteBuffer {
    array: Box<[u8]>,
    pool: Arc<PoolShared>,
}

impl ByteBuffer {
    /// Return the buffer to its pool
    pub fn release(self) {
        // Drop does the work
    }

    /// The whole fixed-size array
    pub fn as_slice(&self) -> &[u8] {
        &self.array
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.array
    }

    /// Copy `payload` to the front of the buffer after `offset` bytes
    ///
    /// Returns the end of the written region, or `None` if it does not fit.
    pub fn write_at(&mut self, offset: usize, payload: &[u8]) -> Option<usize> {
        let end = offset.checked_add(payload.len())?;
        self.array.get_mut(offset..end)?.copy_from_slice(payload);
        Some(end)
    }
}

impl Drop for ByteBuffer {
    fn drop(&mut self) {
        let array = std::mem::take(&mut self.array);
        self.pool.put(array);
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

impl DerefMut for ByteBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.array
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.array
    }
}

impl AsMut<[u8]> for ByteBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.array
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.array.len())
            .finish()
    }
}

struct PoolState {
    /// Available buffers, top of the stack is the last element
    stack: Vec<Box<[u8]>>,
    /// Buffers allocated and not yet freed
    created: usize,
}

struct PoolShared {
    buffer_size: usize,
    max_pool_size: usize,
    clear_on_take: bool,
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_new(&self, state: &mut PoolState) -> Box<[u8]> {
        if state.created >= self.max_pool_size {
            warn!(
                created = state.created,
                max = self.max_pool_size,
                "Buffer max size reached"
            );
        }
        state.created += 1;
        global_metrics().buffer_allocated();
        vec![0u8; self.buffer_size].into_boxed_slice()
    }

    fn take(&self) -> Box<[u8]> {
        let mut state = self.lock();
        match state.stack.pop() {
            Some(mut array) => {
                drop(state);
                if self.clear_on_take {
                    array.fill(0);
                }
                array
            }
            None => self.create_new(&mut state),
        }
    }

    fn put(&self, array: Box<[u8]>) {
        let mut state = self.lock();
        if state.stack.len() < self.max_pool_size {
            state.stack.push(array);
        } else {
            state.created = state.created.saturating_sub(1);
            let created = state.created;
            drop(state);
            warn!(created, max = self.max_pool_size, "Can't put buffer into full pool, freeing it");
            global_metrics().buffer_discarded();
            // array is freed here
        }
    }
}

/// Bounded LIFO pool of fixed-size [`ByteBuffer`]s
///
/// Cloning yields another handle to the same pool. Access is serialised
/// internally, so handles may be shared between threads.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool of `buffer_size` byte buffers
    ///
    /// `start_pool_size` buffers are allocated up front. At most
    /// `max_pool_size` idle buffers are kept.
    pub fn new(buffer_size: usize, start_pool_size: usize, max_pool_size: usize) -> Result<Self> {
        Self::build(buffer_size, start_pool_size, max_pool_size, false)
    }

    /// Create a pool from configuration
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Self::build(
            config.buffer_size,
            config.start_pool_size,
            config.max_pool_size,
            config.clear_on_take,
        )
    }

    fn build(
        buffer_size: usize,
        start_pool_size: usize,
        max_pool_size: usize,
        clear_on_take: bool,
    ) -> Result<Self> {
        if start_pool_size > max_pool_size {
            return Err(LinkError::ConfigError(format!(
                "{ERR_START_EXCEEDS_MAX} (start: {start_pool_size}, max: {max_pool_size})"
            )));
        }
        if buffer_size == 0 {
            return Err(LinkError::ConfigError(ERR_ZERO_BUFFER_SIZE.to_string()));
        }

        let shared = Arc::new(PoolShared {
            buffer_size,
            max_pool_size,
            clear_on_take,
            state: Mutex::new(PoolState {
                stack: Vec::with_capacity(max_pool_size),
                created: 0,
            }),
        });

        {
            let mut state = shared.lock();
            for _ in 0..start_pool_size {
                let array = shared.create_new(&mut state);
                state.stack.push(array);
            }
        }

        trace!(buffer_size, start_pool_size, max_pool_size, "Buffer pool created");
        Ok(Self { shared })
    }

    /// Take a buffer, allocating one if the pool is empty
    pub fn take(&self) -> ByteBuffer {
        ByteBuffer {
            array: self.shared.take(),
            pool: self.shared.clone(),
        }
    }

    /// Number of idle buffers ready to be taken
    pub fn available(&self) -> usize {
        self.shared.lock().stack.len()
    }

    /// Number of buffers allocated and not yet freed
    pub fn created(&self) -> usize {
        self.shared.lock().created
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    pub fn max_pool_size(&self) -> usize {
        self.shared.max_pool_size
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.shared.buffer_size)
            .field("max_pool_size", &self.shared.max_pool_size)
            .field("available", &state.stack.len())
            .field("created", &state.created)
            .finish()
    }
}
