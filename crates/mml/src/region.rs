//! Region descriptor: one interval of address space with its metadata.

use core::fmt;

use crate::{RegionProperties, RegionType};

/// Describes one contiguous interval of an address space.
///
/// A block records its classification ([`RegionType`]), an opaque
/// caller-assigned attribute tag, and optionally the corresponding address
/// in the other address space (physical↔virtual) for linearly mapped
/// memory. Blocks are plain data owned by exactly one region tree.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RegionBlock {
    address: usize,
    size: usize,
    pair_address: Option<usize>,
    attr: u32,
    region_type: RegionType,
}

impl RegionBlock {
    /// Creates a new region block.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or the interval's last address would wrap
    /// around the address space; a descriptor describing either is a boot
    /// configuration error.
    pub fn new(
        address: usize,
        size: usize,
        pair_address: Option<usize>,
        attr: u32,
        region_type: RegionType,
    ) -> Self {
        assert!(size > 0, "region block must not be empty");
        assert!(
            address.checked_add(size - 1).is_some(),
            "region block wraps the address space"
        );
        Self {
            address,
            size,
            pair_address,
            attr,
            region_type,
        }
    }

    /// Returns the first address of the interval.
    #[inline]
    pub const fn address(&self) -> usize {
        self.address
    }

    /// Returns the size of the interval in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the address one past the interval.
    ///
    /// This may be one past the top of the address space; use
    /// [`RegionBlock::last_address`] when a representable bound is needed.
    #[inline]
    pub const fn end_address(&self) -> usize {
        self.address.wrapping_add(self.size)
    }

    /// Returns the last address contained in the interval.
    #[inline]
    pub const fn last_address(&self) -> usize {
        self.address + (self.size - 1)
    }

    /// Returns the corresponding address in the other address space, if
    /// this block is part of a linearly mapped pairing.
    #[inline]
    pub const fn pair_address(&self) -> Option<usize> {
        self.pair_address
    }

    /// Returns the opaque attribute tag.
    #[inline]
    pub const fn attr(&self) -> u32 {
        self.attr
    }

    /// Returns the region classification.
    #[inline]
    pub const fn region_type(&self) -> RegionType {
        self.region_type
    }

    /// Returns true if `address` falls inside this interval.
    #[inline]
    pub const fn contains(&self, address: usize) -> bool {
        self.address <= address && address <= self.last_address()
    }

    /// Returns true if this block's type derives from `ancestor`.
    #[inline]
    pub fn is_derived_from(&self, ancestor: RegionType) -> bool {
        self.region_type.is_derived_from(ancestor)
    }

    /// Returns true if this block may be re-typed to `new_type`.
    #[inline]
    pub fn can_derive(&self, new_type: RegionType) -> bool {
        self.region_type.can_derive(new_type)
    }

    /// Returns true if this block's type carries the given property.
    #[inline]
    pub fn has_property(&self, properties: RegionProperties) -> bool {
        self.region_type.has_property(properties)
    }
}

impl fmt::Display for RegionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:#x}..{:#x}) {:?} attr={}",
            self.address,
            self.end_address(),
            self.region_type,
            self.attr
        )?;
        if let Some(pair) = self.pair_address {
            write!(f, " pair={pair:#x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds() {
        let block = RegionBlock::new(0x1000, 0x2000, None, 0, RegionType::None);
        assert_eq!(block.address(), 0x1000);
        assert_eq!(block.size(), 0x2000);
        assert_eq!(block.end_address(), 0x3000);
        assert_eq!(block.last_address(), 0x2fff);
    }

    #[test]
    fn containment() {
        let block = RegionBlock::new(0x1000, 0x1000, None, 0, RegionType::None);
        assert!(!block.contains(0xfff));
        assert!(block.contains(0x1000));
        assert!(block.contains(0x1fff));
        assert!(!block.contains(0x2000));
    }

    #[test]
    fn block_at_the_top_of_the_address_space() {
        let block = RegionBlock::new(usize::MAX - 0xfff, 0x1000, None, 0, RegionType::None);
        assert_eq!(block.last_address(), usize::MAX);
        assert!(block.contains(usize::MAX));
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn rejects_empty_block() {
        let _ = RegionBlock::new(0x1000, 0, None, 0, RegionType::None);
    }

    #[test]
    #[should_panic(expected = "wraps the address space")]
    fn rejects_wrapping_block() {
        let _ = RegionBlock::new(usize::MAX - 0xfff, 0x2000, None, 0, RegionType::None);
    }

    #[test]
    fn display_includes_pairing() {
        let block = RegionBlock::new(0x1000, 0x1000, Some(0x8000), 3, RegionType::Dram);
        assert_eq!(format!("{block}"), "[0x1000..0x2000) Dram attr=3 pair=0x8000");
    }
}
