// Rolling Adler-style checksum for block matching.
//
// Two accumulators modulo 2^16: `s1` is the running byte sum and `s2` the
// running sum of `s1`.  Sliding the window by one byte removes the
// outgoing byte from both and adds the incoming one, so scanning a target
// costs O(1) per position.

/// Checksum state over a fixed-width window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingChecksum {
    s1: u32,
    s2: u32,
    len: u32,
}

impl RollingChecksum {
    /// Checksum of `block`; the window width is `block.len()`.
    pub fn new(block: &[u8]) -> Self {
        let mut s1: u32 = 0;
        let mut s2: u32 = 0;
        for &b in block {
            s1 = s1.wrapping_add(u32::from(b));
            s2 = s2.wrapping_add(s1);
        }
        Self {
            s1,
            s2,
            len: block.len() as u32,
        }
    }

    /// Slide the window: drop `out` (first byte), append `incoming`.
    #[inline(always)]
    pub fn roll(&mut self, out: u8, incoming: u8) {
        let out = u32::from(out);
        self.s1 = self.s1.wrapping_sub(out).wrapping_add(u32::from(incoming));
        self.s2 = self
            .s2
            .wrapping_sub(self.len.wrapping_mul(out))
            .wrapping_add(self.s1);
    }

    /// The 32-bit checksum: `s2` in the high half, `s1` in the low half.
    #[inline(always)]
    pub fn value(&self) -> u32 {
        ((self.s2 & 0xFFFF) << 16) | (self.s1 & 0xFFFF)
    }
}

/// One-shot checksum of `block`.
#[inline]
pub fn checksum(block: &[u8]) -> u32 {
    RollingChecksum::new(block).value()
}
