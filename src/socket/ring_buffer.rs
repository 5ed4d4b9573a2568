//! A fixed-capacity FIFO byte ring.
//!
//! Buffers socket payload between delivery by the modem and consumption by
//! the application. Producer and consumer run on the same logical thread,
//! so there is no synchronization, only index arithmetic.

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Exhausted,
}

type Result<O> = core::result::Result<O, Error>;

#[derive(Debug)]
pub struct RingBuffer<const N: usize> {
    storage: [u8; N],
    read_at: usize,
    length: usize,
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        Self {
            storage: [0; N],
            read_at: 0,
            length: 0,
        }
    }

    pub fn clear(&mut self) {
        self.read_at = 0;
        self.length = 0;
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.length
    }

    /// Number of bytes that can still be enqueued.
    pub fn window(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.window() == 0
    }

    fn get_idx(&self, idx: usize) -> usize {
        (self.read_at + idx) % N
    }

    /// Enqueue one byte, or `Err(Error::Exhausted)` when full. A full ring
    /// keeps its existing contents; it is the newest byte that is lost.
    pub fn enqueue(&mut self, byte: u8) -> Result<()> {
        if self.is_full() {
            return Err(Error::Exhausted);
        }
        let idx = self.get_idx(self.length);
        self.storage[idx] = byte;
        self.length += 1;
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.storage[self.read_at];
        self.read_at = self.get_idx(1);
        self.length -= 1;
        Some(byte)
    }

    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        Some(self.storage[self.read_at])
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_full_states() {
        let mut ring: RingBuffer<2> = RingBuffer::new();
        assert!(ring.is_empty());
        assert!(!ring.is_full());
        assert_eq!(ring.capacity(), 2);
        assert_eq!(ring.window(), 2);

        ring.enqueue(1).unwrap();
        assert!(!ring.is_empty());
        assert!(!ring.is_full());
        assert_eq!(ring.window(), 1);

        ring.enqueue(2).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.window(), 0);
    }

    #[test]
    fn fifo_order() {
        let mut ring: RingBuffer<8> = RingBuffer::new();
        for b in b"hello" {
            ring.enqueue(*b).unwrap();
        }
        assert_eq!(ring.len(), 5);
        let mut out = std::vec::Vec::new();
        while let Some(b) = ring.dequeue() {
            out.push(b);
        }
        assert_eq!(out, b"hello");
        assert_eq!(ring.dequeue(), None);
    }

    #[test]
    fn full_ring_rejects_without_corruption() {
        let mut ring: RingBuffer<3> = RingBuffer::new();
        for b in [1, 2, 3] {
            ring.enqueue(b).unwrap();
        }
        assert_eq!(ring.enqueue(9), Err(Error::Exhausted));
        assert_eq!(ring.dequeue(), Some(1));
        assert_eq!(ring.dequeue(), Some(2));
        assert_eq!(ring.dequeue(), Some(3));
    }

    #[test]
    fn occupancy_tracks_pushes_minus_pops() {
        let mut ring: RingBuffer<4> = RingBuffer::new();
        for round in 0..10 {
            ring.enqueue(round).unwrap();
            ring.enqueue(round).unwrap();
            assert_eq!(ring.len(), 2);
            assert_eq!(ring.dequeue(), Some(round));
            assert_eq!(ring.dequeue(), Some(round));
            assert!(ring.is_empty());
        }
    }

    #[test]
    fn wraps_around_storage_boundary() {
        let mut ring: RingBuffer<4> = RingBuffer::new();
        for b in [1, 2, 3] {
            ring.enqueue(b).unwrap();
        }
        assert_eq!(ring.dequeue(), Some(1));
        assert_eq!(ring.dequeue(), Some(2));
        ring.enqueue(4).unwrap();
        ring.enqueue(5).unwrap();
        ring.enqueue(6).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.dequeue(), Some(3));
        assert_eq!(ring.dequeue(), Some(4));
        assert_eq!(ring.dequeue(), Some(5));
        assert_eq!(ring.dequeue(), Some(6));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut ring: RingBuffer<4> = RingBuffer::new();
        assert_eq!(ring.peek(), None);
        ring.enqueue(7).unwrap();
        assert_eq!(ring.peek(), Some(7));
        assert_eq!(ring.peek(), Some(7));
        assert_eq!(ring.dequeue(), Some(7));
    }
}
