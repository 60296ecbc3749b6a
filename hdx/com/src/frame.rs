//! Data-link frames and the buffers they are assembled in
//!
//! ```text
//! PREAMBLE(1) | LENGTH(1) | PAYLOAD(LENGTH) | CRC16(2, big-endian)
//! ```
//!
//! The CRC covers `LENGTH` and `PAYLOAD`.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::{crc::Crc16, FrameError};

/// Frame start sentinel
pub const PREAMBLE: u8 = 0xA5;
/// Preamble and length bytes
pub const HEADER_LEN: usize = 2;
pub const CRC_LEN: usize = 2;
/// Bytes a frame adds around its payload
pub const OVERHEAD: usize = HEADER_LEN + CRC_LEN;
/// Largest payload the length byte can describe
pub const MAX_PAYLOAD: usize = u8::MAX as usize;
/// Depth of the UART hardware FIFOs
pub const FIFO_DEPTH: usize = 16;

/// Fixed-capacity frame storage shared between a driver and its user.
///
/// For reception, `len` is the payload length of a complete frame and zero
/// while the buffer is free; the receiver also stores the CRC bytes, so a
/// frame needs `LENGTH + 2` bytes of capacity. For transmission, `len` is the
/// payload to send and `pos` the next byte to go out.
#[derive(Debug, Clone)]
pub struct FrameBuffer<const N: usize> {
    data: [u8; N],
    len: usize,
    pos: usize,
}

impl<const N: usize> FrameBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: [0; N],
            len: 0,
            pos: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// No received frame is waiting to be consumed
    pub fn is_free(&self) -> bool {
        self.len == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Release a consumed frame
    pub fn clear(&mut self) {
        self.len = 0;
        self.pos = 0;
    }

    /// Prepare `payload` for transmission
    pub fn load(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > N || payload.len() > MAX_PAYLOAD {
            return Err(FrameError::TooLong(payload.len()));
        }
        self.data[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
        self.pos = 0;
        Ok(())
    }

    /// Mark the loaded payload unsent so the next `GO` sends it again
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Payload bytes not yet transmitted
    pub fn pending(&self) -> usize {
        self.len.saturating_sub(self.pos)
    }

    pub(crate) fn begin(&mut self) {
        self.pos = 0;
    }

    pub(crate) fn push_byte(&mut self, byte: u8) -> bool {
        match self.data.get_mut(self.pos) {
            Some(slot) => {
                *slot = byte;
                self.pos += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_byte(&mut self) -> Option<u8> {
        if self.pos < self.len {
            let byte = self.data[self.pos];
            self.pos += 1;
            Some(byte)
        } else {
            None
        }
    }

    pub(crate) fn commit(&mut self, len: usize) {
        self.len = len.min(N);
    }
}

impl<const N: usize> Default for FrameBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A frame buffer shared with interrupt-driven drivers
pub type SharedBuffer<const N: usize> = Mutex<RefCell<FrameBuffer<N>>>;

/// An empty shared buffer, usable in `static` items
pub const fn shared_buffer<const N: usize>() -> SharedBuffer<N> {
    Mutex::new(RefCell::new(FrameBuffer::new()))
}

/// Run `f` on the buffer inside a critical section
pub fn with_buffer<const N: usize, R>(buf: &SharedBuffer<N>, f: impl FnOnce(&mut FrameBuffer<N>) -> R) -> R {
    critical_section::with(|cs| f(&mut buf.borrow_ref_mut(cs)))
}

/// Write `payload` as a complete frame into `out`, returning the frame size.
pub fn encode(payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::TooLong(payload.len()));
    }
    let total = payload.len() + OVERHEAD;
    if out.len() < total {
        return Err(FrameError::BufferTooSmall(total));
    }
    let len = payload.len() as u8;
    let mut crc = Crc16::new();
    crc.update(len);
    crc.update_slice(payload);

    out[0] = PREAMBLE;
    out[1] = len;
    out[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    out[total - 2..total].copy_from_slice(&crc.value().to_be_bytes());
    Ok(total)
}

/// Validate a complete frame and return its payload.
pub fn decode(frame: &[u8]) -> Result<&[u8], FrameError> {
    match frame.first() {
        Some(&PREAMBLE) => {}
        Some(&other) => return Err(FrameError::Preamble(other)),
        None => return Err(FrameError::Truncated),
    }
    let len = *frame.get(1).ok_or(FrameError::Truncated)? as usize;
    let body = frame
        .get(1..HEADER_LEN + len + CRC_LEN)
        .ok_or(FrameError::Truncated)?;
    let mut crc = Crc16::new();
    crc.update_slice(body);
    if !crc.is_valid() {
        return Err(FrameError::Crc);
    }
    Ok(&body[1..1 + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_drain() {
        let mut buf = FrameBuffer::<8>::new();
        buf.load(b"abc").unwrap();
        assert_eq!(buf.pending(), 3);
        assert_eq!(buf.take_byte(), Some(b'a'));
        assert_eq!(buf.pending(), 2);
        buf.rewind();
        assert_eq!(buf.pending(), 3);
        assert_eq!(buf.load(&[0; 9]), Err(FrameError::TooLong(9)));
        assert_eq!(buf.payload(), b"abc");
    }

    #[test]
    fn test_push_stops_at_capacity() {
        let mut buf = FrameBuffer::<2>::new();
        buf.begin();
        assert!(buf.push_byte(1));
        assert!(buf.push_byte(2));
        assert!(!buf.push_byte(3));
        buf.commit(2);
        assert_eq!(buf.payload(), &[1, 2]);
        assert!(!buf.is_free());
        buf.clear();
        assert!(buf.is_free());
    }
}
