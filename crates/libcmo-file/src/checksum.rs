//! Adler-32 accumulator used for file integrity checks
//!
//! The saving engine computes its file checksum with zlib's `adler32()`
//! seeded with `0` rather than the conventional `1`. Seeding with zero means
//! both running sums start at zero, so the result differs from the textbook
//! Adler-32 of the same bytes. [`Adler32::new`] uses the engine's seed;
//! [`Adler32::from_checksum`] allows resuming from any previous value.

/// Largest prime smaller than 65536
const MOD_ADLER: u32 = 65521;

/// Largest n such that 255n(n+1)/2 + (n+1)(MOD_ADLER-1) fits in a u32.
/// Reductions only need to happen once per block of this many bytes.
const NMAX: usize = 5552;

/// Streaming Adler-32 state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    /// State seeded the way composition files are checksummed (seed `0`)
    pub const fn new() -> Self {
        Self { a: 0, b: 0 }
    }

    /// Resume from a previously finalized checksum
    pub const fn from_checksum(checksum: u32) -> Self {
        Self {
            a: checksum & 0xFFFF,
            b: checksum >> 16,
        }
    }

    /// Feed bytes into the running checksum
    pub fn update(&mut self, data: &[u8]) {
        let mut a = self.a;
        let mut b = self.b;

        for block in data.chunks(NMAX) {
            for &byte in block {
                a += u32::from(byte);
                b += a;
            }
            a %= MOD_ADLER;
            b %= MOD_ADLER;
        }

        self.a = a;
        self.b = b;
    }

    /// Current checksum value
    pub const fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold `data` into a running checksum value
///
/// Equivalent to zlib's `adler32(state, data, len)`.
///
/// # Examples
///
/// ```
/// use libcmo_file::checksum::{accumulate, finalize};
///
/// let header = *b"Nemo Fi\0";
/// let body = [0u8; 24];
///
/// let state = accumulate(0, &header);
/// let state = accumulate(state, &body);
///
/// let whole: Vec<u8> = header.iter().chain(body.iter()).copied().collect();
/// assert_eq!(finalize(state), accumulate(0, &whole));
/// ```
pub fn accumulate(state: u32, data: &[u8]) -> u32 {
    let mut adler = Adler32::from_checksum(state);
    adler.update(data);
    adler.finish()
}

/// Turn a running state into the final checksum
///
/// Adler-32 has no finalization step; the running state already is the
/// checksum. This exists so callers read symmetrically with [`accumulate`].
pub const fn finalize(state: u32) -> u32 {
    state
}
