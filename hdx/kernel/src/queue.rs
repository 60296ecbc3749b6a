//! Bounded event mailbox
//!
//! A ring buffer over caller-provided storage. The most significant bit of the
//! head index doubles as the "full" flag, so `head == tail` always means empty
//! and no slot is wasted. That limits capacity to [`MAX_CAPACITY`] slots.
//!
//! The mailbox itself is not interrupt-safe; the kernel only touches it inside
//! a critical section.

use core::fmt;

use hdx_core::Event;

/// Largest supported capacity
pub const MAX_CAPACITY: usize = 0x7F;

const FULL: u8 = 0x80;
const INDEX: u8 = 0x7F;

/// Mailbox errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    /// Push on a full mailbox
    Full,
    /// Pop or peek on an empty mailbox
    Empty,
    /// Zero-length storage
    NoStorage,
    /// Storage longer than [`MAX_CAPACITY`]
    TooLarge(usize),
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxError::Full => write!(f, "Mailbox is full"),
            MailboxError::Empty => write!(f, "Mailbox is empty"),
            MailboxError::NoStorage => write!(f, "Mailbox has no storage"),
            MailboxError::TooLarge(n) => {
                write!(f, "Mailbox capacity {} exceeds {}", n, MAX_CAPACITY)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MailboxError {}

#[cfg(feature = "defmt")]
impl defmt::Format for MailboxError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            MailboxError::Full => defmt::write!(fmt, "Full"),
            MailboxError::Empty => defmt::write!(fmt, "Empty"),
            MailboxError::NoStorage => defmt::write!(fmt, "NoStorage"),
            MailboxError::TooLarge(n) => defmt::write!(fmt, "TooLarge({=usize})", n),
        }
    }
}

/// FIFO of events belonging to one active object.
pub struct Mailbox<'a> {
    slots: &'a mut [Event],
    head: u8,
    tail: u8,
}

impl<'a> Mailbox<'a> {
    /// Wrap `slots` as an empty mailbox
    pub fn new(slots: &'a mut [Event]) -> Result<Self, MailboxError> {
        match slots.len() {
            0 => Err(MailboxError::NoStorage),
            n if n > MAX_CAPACITY => Err(MailboxError::TooLarge(n)),
            _ => Ok(Self { slots, head: 0, tail: 0 }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.head & FULL != 0
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        if self.is_full() {
            return self.capacity();
        }
        let (head, tail) = (self.head as usize, self.tail as usize);
        if head >= tail {
            head - tail
        } else {
            self.capacity() - tail + head
        }
    }

    fn advance(&self, index: u8) -> u8 {
        let next = index as usize + 1;
        if next == self.capacity() {
            0
        } else {
            next as u8
        }
    }

    /// Append an event. A full mailbox is left untouched.
    pub fn push(&mut self, event: Event) -> Result<(), MailboxError> {
        if self.is_full() {
            return Err(MailboxError::Full);
        }
        self.slots[self.head as usize] = event;
        self.head = self.advance(self.head);
        if self.head == self.tail {
            self.head |= FULL;
        }
        Ok(())
    }

    /// Append an event unless one with the same signal is already queued.
    ///
    /// Returns `Ok(false)` when a duplicate was found.
    pub fn push_unique(&mut self, event: Event) -> Result<bool, MailboxError> {
        if self.iter().any(|queued| queued.signal == event.signal) {
            return Ok(false);
        }
        self.push(event).map(|()| true)
    }

    /// Oldest event, left in place
    pub fn peek(&self) -> Result<Event, MailboxError> {
        if self.is_empty() {
            Err(MailboxError::Empty)
        } else {
            Ok(self.slots[self.tail as usize])
        }
    }

    /// Drop the oldest event after a [`peek`](Self::peek)
    pub fn consume(&mut self) -> Result<(), MailboxError> {
        if self.is_empty() {
            return Err(MailboxError::Empty);
        }
        self.tail = self.advance(self.tail);
        self.head &= INDEX;
        Ok(())
    }

    /// Remove and return the oldest event
    pub fn pop(&mut self) -> Result<Event, MailboxError> {
        let event = self.peek()?;
        self.consume()?;
        Ok(event)
    }

    /// Discard everything
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    /// Queued events, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        let cap = self.capacity();
        let tail = self.tail as usize;
        (0..self.len()).map(move |i| &self.slots[(tail + i) % cap])
    }
}

impl fmt::Debug for Mailbox<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
