//! CRC16-CCITT, polynomial 0x1021, initial value 0x0000, no final XOR.
//!
//! Feeding a frame's own CRC (high byte first) after its data brings the
//! running value back to zero, which is how the receiver validates frames.

const POLY: u16 = 0x1021;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u16; 256] = build_table();

/// Running CRC16-CCITT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Crc16(u16);

impl Crc16 {
    pub const fn new() -> Self {
        Crc16(0)
    }

    pub fn update(&mut self, byte: u8) {
        self.0 = (self.0 << 8) ^ TABLE[((self.0 >> 8) as u8 ^ byte) as usize];
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update(b);
        }
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    /// True once data followed by its CRC has been fed
    pub const fn is_valid(self) -> bool {
        self.0 == 0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// CRC16-CCITT of `bytes`
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update_slice(bytes);
    crc.value()
}
