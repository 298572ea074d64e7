//! Shared output buffer between the shell task and the output relay.
//!
//! The remote shell produces output continuously; the WebSocket side wants
//! discrete frames.  [`OutputBuffer`] sits between the two: the task pumping
//! the SSH channel appends every chunk it receives, and the output relay
//! drains the whole accumulation once per flush tick and ships it as a single
//! frame.
//!
//! # Concurrency contract
//!
//! Writes and drains come from different Tokio tasks, so every operation
//! takes the internal mutex.  The lock is held only for the duration of a
//! memcpy, never across an `.await`, so a `std::sync::Mutex` is the right
//! tool here, not the async `tokio::sync::Mutex` (see the tokio docs:
//! prefer the std mutex for short, non-async critical sections).
//!
//! Guarantees:
//!
//! - Each `write` appends atomically: concurrent writes never interleave the
//!   bytes *within* one call, and no write is ever dropped.
//! - [`OutputBuffer::take`] drains atomically: a write linearizes either
//!   entirely before the drain (and is included in the returned bytes) or
//!   entirely after it (and is left for the next tick).  The linearization
//!   point is the mutex acquisition.

use std::sync::Mutex;

/// A thread-safe append-only byte sink, cleared on each flush.
///
/// Cheap to share: wrap it in an `Arc` and hand clones to the shell task and
/// the output relay.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    buf: Mutex<Vec<u8>>,
}

impl OutputBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` to the accumulation.
    ///
    /// The append is atomic with respect to concurrent `write`/`snapshot`/
    /// `take` calls.
    pub fn write(&self, bytes: &[u8]) {
        // Mutex poisoning can only occur if another thread panicked while
        // holding the lock; at that point the session is already lost, so
        // propagating the panic is acceptable.
        self.buf.lock().unwrap().extend_from_slice(bytes);
    }

    /// Returns a copy of the current contents without clearing them.
    pub fn snapshot(&self) -> Vec<u8> {
        self.buf.lock().unwrap().clone()
    }

    /// Clears the buffer to empty.
    pub fn reset(&self) {
        self.buf.lock().unwrap().clear();
    }

    /// Atomically drains the buffer, returning everything written so far.
    ///
    /// Equivalent to `snapshot` followed by `reset` under one lock, which is
    /// what the flush tick needs: a write that lands between a separate
    /// snapshot and reset would be silently discarded, whereas with `take`
    /// it is either in the returned frame or still in the buffer.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buf.lock().unwrap())
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.lock().unwrap().is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_writes_concatenate_in_call_order() {
        // Arrange
        let buf = OutputBuffer::new();

        // Act
        buf.write(b"hello ");
        buf.write(b"world");

        // Assert
        assert_eq!(buf.snapshot(), b"hello world");
    }

    #[test]
    fn test_new_buffer_is_empty() {
        let buf = OutputBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.snapshot(), Vec::<u8>::new());
    }

    #[test]
    fn test_snapshot_does_not_clear() {
        let buf = OutputBuffer::new();
        buf.write(b"abc");

        let first = buf.snapshot();
        let second = buf.snapshot();

        assert_eq!(first, b"abc");
        assert_eq!(second, b"abc");
    }

    #[test]
    fn test_reset_clears_contents() {
        let buf = OutputBuffer::new();
        buf.write(b"abc");

        buf.reset();

        assert!(buf.is_empty());
    }

    #[test]
    fn test_take_returns_contents_and_empties() {
        // Arrange
        let buf = OutputBuffer::new();
        buf.write(b"w1");
        buf.write(b"w2");

        // Act
        let taken = buf.take();

        // Assert: snapshot-equivalent contents, then empty
        assert_eq!(taken, b"w1w2");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_take_on_empty_buffer_returns_empty() {
        let buf = OutputBuffer::new();
        assert_eq!(buf.take(), Vec::<u8>::new());
    }

    #[test]
    fn test_writes_after_take_accumulate_fresh() {
        let buf = OutputBuffer::new();
        buf.write(b"old");
        let _ = buf.take();

        buf.write(b"new");

        assert_eq!(buf.snapshot(), b"new");
    }

    #[test]
    fn test_concurrent_writers_lose_no_bytes() {
        // Arrange: several threads each append their marker many times while
        // a drainer repeatedly takes.  Every written byte must end up in
        // exactly one drain.
        let buf = Arc::new(OutputBuffer::new());
        const WRITERS: usize = 4;
        const WRITES_PER_THREAD: usize = 500;
        const CHUNK: &[u8] = b"0123456789";

        let writers: Vec<_> = (0..WRITERS)
            .map(|_| {
                let buf = Arc::clone(&buf);
                std::thread::spawn(move || {
                    for _ in 0..WRITES_PER_THREAD {
                        buf.write(CHUNK);
                    }
                })
            })
            .collect();

        let drainer = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || {
                let mut collected = 0usize;
                for _ in 0..1000 {
                    collected += buf.take().len();
                    std::thread::yield_now();
                }
                collected
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        let drained = drainer.join().unwrap();

        // Act: final drain picks up whatever the background drainer missed
        let remainder = buf.take().len();

        // Assert: total bytes drained equals total bytes written
        assert_eq!(
            drained + remainder,
            WRITERS * WRITES_PER_THREAD * CHUNK.len()
        );
    }

    #[test]
    fn test_single_write_is_never_split_across_drains() {
        // With chunked writes of a fixed size, every drain must observe a
        // multiple of the chunk size: a partial chunk would mean a write
        // interleaved with a take.
        let buf = Arc::new(OutputBuffer::new());
        const CHUNK: &[u8] = b"ABCD";

        let writer = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    buf.write(CHUNK);
                }
            })
        };

        let mut all_multiples = true;
        for _ in 0..500 {
            let n = buf.take().len();
            if n % CHUNK.len() != 0 {
                all_multiples = false;
            }
            std::thread::yield_now();
        }
        writer.join().unwrap();

        assert!(all_multiples, "a drain observed a torn write");
    }
}
