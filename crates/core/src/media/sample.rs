//! Sample buffers moved through a track pipe.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use thiserror::Error;

use super::types::{FormatDescription, PixelFormat, Timestamp, TrackId};

/// Status code reported when the backing memory is locked elsewhere.
pub const LOCK_STATUS_BUSY: i32 = -6660;

/// Status code reported when a previous holder panicked while locked.
pub const LOCK_STATUS_POISONED: i32 = -6661;

/// Failure to acquire exclusive access to a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pixel buffer lock failed with status {status}")]
pub struct LockError {
    pub status: i32,
}

/// A frame of pixels addressed by row stride.
///
/// Clones share the same backing memory; all mutation goes through
/// [`PixelBuffer::lock`].
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    bytes_per_row: usize,
    pixel_format: PixelFormat,
    storage: Arc<Mutex<Vec<u8>>>,
}

impl PixelBuffer {
    /// Creates a tightly packed buffer filled with `fill`.
    pub fn filled(width: usize, height: usize, pixel_format: PixelFormat, fill: u8) -> Self {
        let bytes_per_row = width * pixel_format.bytes_per_pixel();
        Self {
            width,
            height,
            bytes_per_row,
            pixel_format,
            storage: Arc::new(Mutex::new(vec![fill; bytes_per_row * height])),
        }
    }

    /// Wraps existing bytes laid out with the given row stride.
    ///
    /// Returns `None` when `data` is too small for `height` rows.
    pub fn from_bytes(
        width: usize,
        height: usize,
        bytes_per_row: usize,
        pixel_format: PixelFormat,
        data: Vec<u8>,
    ) -> Option<Self> {
        if data.len() < bytes_per_row * height {
            return None;
        }
        Some(Self {
            width,
            height,
            bytes_per_row,
            pixel_format,
            storage: Arc::new(Mutex::new(data)),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Locks the backing memory for exclusive access.
    ///
    /// The lock is released when the returned guard is dropped. Never blocks:
    /// a buffer that is already locked fails with [`LOCK_STATUS_BUSY`].
    pub fn lock(&self) -> Result<PixelLock<'_>, LockError> {
        let guard = match self.storage.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(LockError {
                    status: LOCK_STATUS_BUSY,
                })
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(LockError {
                    status: LOCK_STATUS_POISONED,
                })
            }
        };

        Ok(PixelLock {
            width: self.width,
            height: self.height,
            bytes_per_row: self.bytes_per_row,
            data: guard,
        })
    }

    /// Copies the current contents out of the buffer.
    pub fn snapshot(&self) -> Result<Vec<u8>, LockError> {
        let lock = self.lock()?;
        Ok(lock.data.to_vec())
    }
}

/// Exclusive access to a pixel buffer's memory.
pub struct PixelLock<'a> {
    width: usize,
    height: usize,
    bytes_per_row: usize,
    data: MutexGuard<'a, Vec<u8>>,
}

impl PixelLock<'_> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }
}

/// Payload of a sample.
#[derive(Debug, Clone)]
pub enum SamplePayload {
    /// Compressed or otherwise opaque bytes.
    Encoded(Arc<Vec<u8>>),
    /// A decoded frame.
    Pixels(PixelBuffer),
}

/// One timestamped unit of media data.
#[derive(Debug, Clone)]
pub struct Sample {
    pub track: TrackId,
    pub pts: Timestamp,
    pub duration: Timestamp,
    pub format: Option<Arc<FormatDescription>>,
    pub payload: SamplePayload,
}

impl Sample {
    /// Returns the pixel buffer if this sample carries a decoded frame.
    pub fn pixel_buffer(&self) -> Option<&PixelBuffer> {
        match &self.payload {
            SamplePayload::Pixels(buffer) => Some(buffer),
            SamplePayload::Encoded(_) => None,
        }
    }

    pub fn format_description(&self) -> Option<&FormatDescription> {
        self.format.as_deref()
    }
}
