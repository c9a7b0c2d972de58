//! # CRC Implementations
//!
//! Table driven checksums used on the handset link.
//!
//! - [`Crc8`]: 8-bit CRC built from any polynomial. CRSF uses
//!   CRC-8-DVB-S2 (**Polynomial**: 0xD5, **Initial Value**: 0x00), available
//!   at compile time as [`CRSF_CRC`].
//! - [`Crc2Byte`]: parametric 9..=16 bit CRC whose table is rebuilt only when
//!   the (bits, polynomial) pair changes.

/// CRC-8-DVB-S2 polynomial
pub const CRSF_CRC_POLY: u8 = 0xD5;

/// CRC calculator for the CRSF wire format
pub static CRSF_CRC: Crc8 = Crc8::new(CRSF_CRC_POLY);

/// 8-bit table CRC
#[derive(Debug, Clone)]
pub struct Crc8 {
    table: [u8; 256],
}

impl Crc8 {
    /// Build the 256-entry lookup table for `poly`
    ///
    /// A polynomial of 0 produces a degenerate table and meaningless
    /// checksums.
    pub const fn new(poly: u8) -> Self {
        let mut table = [0u8; 256];
        let mut i = 0;

        while i < 256 {
            let mut crc = i as u8;
            let mut j = 0;

            while j < 8 {
                if (crc & 0x80) != 0 {
                    crc = (crc << 1) ^ poly;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }

            table[i] = crc;
            i += 1;
        }

        Self { table }
    }

    /// Table value for a single byte
    pub fn calc_byte(&self, data: u8) -> u8 {
        self.table[data as usize]
    }

    /// Fold `data` into `seed`
    ///
    /// Chaining calls with the previous result as seed is equivalent to one
    /// call over the concatenated input.
    ///
    /// # Examples
    ///
    /// ```
    /// use crsf_handset::crsf::crc::CRSF_CRC;
    ///
    /// let whole = CRSF_CRC.calc(&[0x16, 0x01, 0x02], 0);
    /// let split = CRSF_CRC.calc(&[0x01, 0x02], CRSF_CRC.calc(&[0x16], 0));
    /// assert_eq!(whole, split);
    /// ```
    pub fn calc(&self, data: &[u8], seed: u8) -> u8 {
        data.iter()
            .fold(seed, |crc, &byte| self.table[(crc ^ byte) as usize])
    }
}

/// Parametric N-bit CRC (N in 9..=16)
#[derive(Debug, Clone)]
pub struct Crc2Byte {
    table: [u16; 256],
    bits: u8,
    poly: u16,
    bitmask: u16,
}

impl Crc2Byte {
    /// Create a calculator initialised for `bits`/`poly`
    ///
    /// `bits` is clamped to 9..=16.
    pub fn new(bits: u8, poly: u16) -> Self {
        let mut crc = Self {
            table: [0u16; 256],
            bits: 0,
            poly: 0,
            bitmask: 0,
        };
        crc.init(bits, poly);
        crc
    }

    /// (Re)build the table; a no-op when the configuration is unchanged
    pub fn init(&mut self, bits: u8, poly: u16) {
        let bits = bits.clamp(9, 16);
        if bits == self.bits && poly == self.poly {
            return;
        }

        self.bits = bits;
        self.poly = poly;
        self.bitmask = ((1u32 << bits) - 1) as u16;
        let highbit = 1u16 << (bits - 1);

        for (i, entry) in self.table.iter_mut().enumerate() {
            let mut crc = (i as u16) << (bits - 8);
            for _ in 0..8 {
                crc = (crc << 1) ^ if crc & highbit != 0 { poly } else { 0 };
            }
            *entry = crc;
        }
    }

    /// Configured width in bits
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Fold `data` into `seed`, masked to the configured width
    pub fn calc(&self, data: &[u8], seed: u16) -> u16 {
        let shift = self.bits - 8;
        let crc = data.iter().fold(seed, |crc, &byte| {
            let idx = ((crc >> shift) ^ byte as u16) & 0x00FF;
            (crc << 8) ^ self.table[idx as usize]
        });
        crc & self.bitmask
    }
}
