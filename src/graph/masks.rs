// Copyright 2025 Lars Brubaker
// Node mask bits and the scratch-bit pool.

/// Bit set carried by every node.
pub type Mask = u32;

/// Persistent mask bits.
pub mod mask {
    use super::Mask;

    /// Edge of an input polygon (set on both sides).
    pub const BOUNDARY: Mask = 1 << 0;
    /// Outside side of an input polygon edge.
    pub const OUTSIDE: Mask = 1 << 1;
    /// Outside side of a polygon ingested with the alternate outside bit.
    pub const OUTSIDE_ALT: Mask = 1 << 2;
    /// Face is not covered by any valid plane.
    pub const EXTERIOR: Mask = 1 << 3;
    /// Crossing this edge changes the active plane set.
    pub const PRIMARY: Mask = 1 << 4;
    /// Edge survives intraplane collapse even when both sides match.
    pub const BARRIER: Mask = 1 << 5;
    /// Edge between exterior and interior regions kept by the base weld.
    pub const WELD: Mask = 1 << 6;
    /// Edge joining a nested component to its container.
    pub const BRIDGE: Mask = 1 << 7;
    /// Node pair is on the free list.
    pub const DELETED: Mask = 1 << 15;

    /// Bits copied onto the pieces of a split edge.
    pub const PERSISTENT: Mask = 0x7fff;

    /// Bits that must agree for two collinear edges to be healed into one.
    pub const HEAL: Mask = BOUNDARY | OUTSIDE | OUTSIDE_ALT | PRIMARY | BARRIER | WELD | BRIDGE;

    /// Bits reserved for scoped scratch use.
    pub const SCRATCH: Mask = 0x00ff_0000;
}

/// Pool of scratch bits handed out to passes that need per-node marks.
#[derive(Clone, Debug)]
pub struct MaskPool {
    free: Mask,
}

impl MaskPool {
    pub fn new() -> Self {
        MaskPool {
            free: mask::SCRATCH,
        }
    }

    /// Take the lowest free bit.
    pub fn acquire(&mut self) -> Option<Mask> {
        if self.free == 0 {
            return None;
        }
        let bit = self.free & self.free.wrapping_neg();
        self.free &= !bit;
        Some(bit)
    }

    pub fn release(&mut self, bit: Mask) {
        debug_assert!(bit & mask::SCRATCH == bit && bit.count_ones() == 1);
        self.free |= bit;
    }

    pub fn available(&self) -> u32 {
        self.free.count_ones()
    }
}

impl Default for MaskPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_hands_out_distinct_scratch_bits() {
        let mut pool = MaskPool::new();
        let total = pool.available();
        assert_eq!(total, 8);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert_eq!(a & mask::SCRATCH, a);
        assert_eq!(a & mask::PERSISTENT, 0);
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), total);
    }

    #[test]
    fn pool_runs_dry() {
        let mut pool = MaskPool::new();
        while pool.acquire().is_some() {}
        assert_eq!(pool.available(), 0);
        assert!(pool.acquire().is_none());
    }
}
