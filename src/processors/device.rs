//! Data-parallel device model used by the device backend.
//!
//! A [`Device`] owns a dedicated rayon thread pool and a memory budget.
//! Buffers are allocated against that budget and give their bytes back when
//! dropped. Work is issued as kernel launches on a [`Stream`]: each launch
//! runs one kernel body per index of its grid, split into blocks of
//! `block_size` indices across the pool.
//!
//! The host may only read a buffer back after the stream has been
//! synchronized. Launches run eagerly, but the stream keeps count of the ones
//! not yet fenced and refuses host reads until [`Stream::synchronize`] is
//! called, so every stage boundary is explicit in the calling code.

use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::DeviceConfig;

/// Errors raised by the device runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("kernel '{kernel}' failed to launch: {reason}")]
    LaunchFailed { kernel: &'static str, reason: String },

    #[error("host read issued with {pending} unsynchronized kernel launch(es)")]
    Unsynchronized { pending: usize },

    #[error("failed to create device thread pool: {0}")]
    ThreadPool(String),
}

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// A compute device with its own worker pool and memory budget.
pub struct Device {
    pool: rayon::ThreadPool,
    memory_limit: usize,
    allocated: Arc<AtomicUsize>,
    block_size: usize,
}

impl Device {
    /// Creates a device from its configuration.
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("device-{}", i))
            .build()
            .map_err(|e| DeviceError::ThreadPool(e.to_string()))?;

        log::debug!(
            "device ready: {} threads, {} bytes of memory, block size {}",
            pool.current_num_threads(),
            config.memory_limit_bytes,
            config.block_size
        );

        Ok(Self {
            pool,
            memory_limit: config.memory_limit_bytes,
            allocated: Arc::new(AtomicUsize::new(0)),
            block_size: config.block_size.max(1),
        })
    }

    /// Bytes currently held by live buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    pub fn available_bytes(&self) -> usize {
        self.memory_limit.saturating_sub(self.allocated_bytes())
    }

    /// Charges `bytes` against the budget.
    fn reserve(&self, bytes: usize) -> Result<()> {
        let mut current = self.allocated.load(Ordering::Acquire);
        loop {
            let next = current
                .checked_add(bytes)
                .filter(|&total| total <= self.memory_limit)
                .ok_or(DeviceError::OutOfMemory {
                    requested: bytes,
                    available: self.memory_limit.saturating_sub(current),
                })?;
            match self.allocated.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn allocate<T>(&self, len: usize) -> Result<(Vec<T>, usize)> {
        let bytes = len.checked_mul(size_of::<T>()).ok_or(DeviceError::OutOfMemory {
            requested: usize::MAX,
            available: self.available_bytes(),
        })?;
        self.reserve(bytes)?;
        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            self.allocated.fetch_sub(bytes, Ordering::AcqRel);
            return Err(DeviceError::OutOfMemory {
                requested: bytes,
                available: self.available_bytes(),
            });
        }
        Ok((data, bytes))
    }

    /// Allocates a buffer of `len` copies of `value`.
    ///
    /// Only `size_of::<T>()` per element is charged; heap memory owned by
    /// the elements themselves is not.
    pub fn alloc_filled<T: Clone>(&self, len: usize, value: T) -> Result<DeviceBuffer<T>> {
        let (mut data, bytes) = self.allocate::<T>(len)?;
        data.resize(len, value);
        Ok(DeviceBuffer {
            data,
            bytes,
            ledger: Arc::clone(&self.allocated),
        })
    }

    /// Allocates a zero-initialized buffer.
    pub fn alloc_zeros<T: Clone + Default>(&self, len: usize) -> Result<DeviceBuffer<T>> {
        self.alloc_filled(len, T::default())
    }

    /// Copies a host slice to a new device buffer.
    pub fn to_device<T: Clone>(&self, host: &[T]) -> Result<DeviceBuffer<T>> {
        let (mut data, bytes) = self.allocate::<T>(host.len())?;
        data.extend_from_slice(host);
        Ok(DeviceBuffer {
            data,
            bytes,
            ledger: Arc::clone(&self.allocated),
        })
    }

    /// Opens a stream for kernel launches.
    pub fn stream(&self) -> Stream<'_> {
        Stream {
            device: self,
            pending: 0,
            launches: 0,
        }
    }
}

/// Memory owned by the device.
pub struct DeviceBuffer<T> {
    data: Vec<T>,
    bytes: usize,
    ledger: Arc<AtomicUsize>,
}

impl<T> DeviceBuffer<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Device-side view, for use as a kernel argument.
    #[inline]
    pub fn view(&self) -> &[T] {
        &self.data
    }
}

// Contents stay on the device; only the shape is printed.
impl<T> std::fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.len())
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        self.ledger.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// An ordered queue of kernel launches.
pub struct Stream<'d> {
    device: &'d Device,
    pending: usize,
    launches: usize,
}

impl Stream<'_> {
    /// Launches `body` once per index in `0..grid`, writing `out[i]`.
    pub fn launch<T, K>(
        &mut self,
        kernel: &'static str,
        grid: usize,
        out: &mut DeviceBuffer<T>,
        body: K,
    ) -> Result<()>
    where
        T: Send,
        K: Fn(usize) -> T + Sync,
    {
        if grid > out.len() {
            return Err(DeviceError::LaunchFailed {
                kernel,
                reason: format!("grid of {} exceeds output buffer of {}", grid, out.len()),
            });
        }
        let block = self.device.block_size;
        self.device.pool.install(|| {
            out.data[..grid]
                .par_chunks_mut(block)
                .enumerate()
                .for_each(|(b, chunk)| {
                    let base = b * block;
                    for (k, slot) in chunk.iter_mut().enumerate() {
                        *slot = body(base + k);
                    }
                });
        });
        self.record(kernel, grid);
        Ok(())
    }

    /// Launches `body` once per row of a row-major `rows x row_len` buffer.
    pub fn launch_rows<T, K>(
        &mut self,
        kernel: &'static str,
        rows: usize,
        row_len: usize,
        out: &mut DeviceBuffer<T>,
        body: K,
    ) -> Result<()>
    where
        T: Send,
        K: Fn(usize, &mut [T]) + Sync,
    {
        let needed = rows.checked_mul(row_len).filter(|&n| n <= out.len());
        let Some(needed) = needed else {
            return Err(DeviceError::LaunchFailed {
                kernel,
                reason: format!(
                    "{} rows of {} exceed output buffer of {}",
                    rows,
                    row_len,
                    out.len()
                ),
            });
        };
        if row_len == 0 {
            self.record(kernel, rows);
            return Ok(());
        }
        self.device.pool.install(|| {
            out.data[..needed]
                .par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(r, row)| body(r, row));
        });
        self.record(kernel, rows);
        Ok(())
    }

    fn record(&mut self, kernel: &'static str, grid: usize) {
        self.pending += 1;
        self.launches += 1;
        log::trace!("launch #{} {}: grid {}", self.launches, kernel, grid);
    }

    /// Waits for every launch issued so far.
    pub fn synchronize(&mut self) -> Result<()> {
        if self.pending > 0 {
            log::trace!("synchronize: {} launch(es) complete", self.pending);
        }
        self.pending = 0;
        Ok(())
    }

    /// Copies a buffer back to the host; requires a synchronized stream.
    pub fn copy_to_host<T: Clone>(&self, buffer: &DeviceBuffer<T>) -> Result<Vec<T>> {
        if self.pending > 0 {
            return Err(DeviceError::Unsynchronized {
                pending: self.pending,
            });
        }
        Ok(buffer.data.clone())
    }

    /// Launches not yet synchronized.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Total launches issued on this stream.
    pub fn launches(&self) -> usize {
        self.launches
    }
}
