//! Region type hierarchy.
//!
//! Region purposes form a fixed tree rooted at the unassigned type: a
//! region may only be re-typed to a descendant of its current type, which
//! is what makes boot-time carving monotonic (space is refined, never
//! reinterpreted). The derivation relation is precomputed into a lookup
//! table at compile time so the hot-path checks are array indexing.

use bitflags::bitflags;

/// Classification of an address-space region.
///
/// The variants form a hierarchy via [`RegionType::parent`]:
/// [`RegionType::None`] is the universal unassigned root, the DRAM pool
/// types descend from [`RegionType::DramPoolPartition`], and the
/// virtual-space pool types descend from [`RegionType::VirtualDram`]
/// (which itself descends from [`RegionType::Dram`], so the linearly
/// mapped virtual window is DRAM-derived like its physical counterpart).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[repr(u8)]
pub enum RegionType {
    /// Unassigned address space; the root every other type derives from.
    None,
    /// Kernel image and miscellaneous kernel windows.
    Kernel,
    /// Physical DRAM.
    Dram,
    /// Kernel carveout at the start of DRAM.
    DramKernel,
    /// The DRAM range subdivided into managed pools.
    DramPoolPartition,
    /// Pool backing application memory.
    DramApplicationPool,
    /// Pool backing applet memory.
    DramAppletPool,
    /// Pool backing system memory.
    DramSystemPool,
    /// Pool backing non-secure system memory.
    DramSystemNonSecurePool,
    /// Pool holding the management bookkeeping for the other pools.
    DramMetadataPool,
    /// Linearly mapped DRAM window in the virtual space.
    VirtualDram,
    /// Virtual window of the application pool.
    VirtualDramApplicationPool,
    /// Virtual window of the applet pool.
    VirtualDramAppletPool,
    /// Virtual window of the system pool.
    VirtualDramSystemPool,
    /// Virtual window of the non-secure system pool.
    VirtualDramSystemNonSecurePool,
    /// Virtual window of the metadata pool.
    VirtualDramMetadataPool,
    /// Per-core local data region.
    CoreLocal,
}

/// Number of region type variants; bounds the derivation table.
pub(crate) const REGION_TYPE_COUNT: usize = 17;

/// All variants in discriminant order, for table construction and tests.
const ALL_TYPES: [RegionType; REGION_TYPE_COUNT] = [
    RegionType::None,
    RegionType::Kernel,
    RegionType::Dram,
    RegionType::DramKernel,
    RegionType::DramPoolPartition,
    RegionType::DramApplicationPool,
    RegionType::DramAppletPool,
    RegionType::DramSystemPool,
    RegionType::DramSystemNonSecurePool,
    RegionType::DramMetadataPool,
    RegionType::VirtualDram,
    RegionType::VirtualDramApplicationPool,
    RegionType::VirtualDramAppletPool,
    RegionType::VirtualDramSystemPool,
    RegionType::VirtualDramSystemNonSecurePool,
    RegionType::VirtualDramMetadataPool,
    RegionType::CoreLocal,
];

bitflags! {
    /// Static properties attached to a region type.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct RegionProperties: u32 {
        /// The region participates in the linear physical↔virtual mapping.
        const LINEAR_MAPPED = 1 << 0;
    }
}

impl RegionType {
    /// Returns the immediate ancestor in the hierarchy, or `Option::None`
    /// for the root type.
    pub const fn parent(self) -> Option<RegionType> {
        match self {
            RegionType::None => Option::None,
            RegionType::Kernel | RegionType::Dram | RegionType::CoreLocal => {
                Some(RegionType::None)
            }
            RegionType::DramKernel
            | RegionType::DramPoolPartition
            | RegionType::VirtualDram => Some(RegionType::Dram),
            RegionType::DramApplicationPool
            | RegionType::DramAppletPool
            | RegionType::DramSystemPool
            | RegionType::DramSystemNonSecurePool
            | RegionType::DramMetadataPool => Some(RegionType::DramPoolPartition),
            RegionType::VirtualDramApplicationPool
            | RegionType::VirtualDramAppletPool
            | RegionType::VirtualDramSystemPool
            | RegionType::VirtualDramSystemNonSecurePool
            | RegionType::VirtualDramMetadataPool => Some(RegionType::VirtualDram),
        }
    }

    /// Returns true if `self` equals `ancestor` or is reachable from it
    /// via hierarchy edges.
    #[inline]
    pub fn is_derived_from(self, ancestor: RegionType) -> bool {
        DERIVATION[self as usize][ancestor as usize]
    }

    /// Returns true if a region of type `self` may be re-typed to
    /// `new_type`, i.e. `new_type` is a refinement of `self`.
    #[inline]
    pub fn can_derive(self, new_type: RegionType) -> bool {
        new_type.is_derived_from(self)
    }

    /// Returns the static properties of this type.
    pub const fn properties(self) -> RegionProperties {
        match self {
            RegionType::Dram
            | RegionType::DramKernel
            | RegionType::DramPoolPartition
            | RegionType::DramApplicationPool
            | RegionType::DramAppletPool
            | RegionType::DramSystemPool
            | RegionType::DramSystemNonSecurePool
            | RegionType::DramMetadataPool
            | RegionType::VirtualDram
            | RegionType::VirtualDramApplicationPool
            | RegionType::VirtualDramAppletPool
            | RegionType::VirtualDramSystemPool
            | RegionType::VirtualDramSystemNonSecurePool
            | RegionType::VirtualDramMetadataPool => RegionProperties::LINEAR_MAPPED,
            RegionType::None | RegionType::Kernel | RegionType::CoreLocal => {
                RegionProperties::empty()
            }
        }
    }

    /// Returns true if this type carries the given property.
    #[inline]
    pub fn has_property(self, properties: RegionProperties) -> bool {
        self.properties().contains(properties)
    }
}

/// Reachability table: `DERIVATION[child][ancestor]`.
static DERIVATION: [[bool; REGION_TYPE_COUNT]; REGION_TYPE_COUNT] = build_derivation_table();

const fn build_derivation_table() -> [[bool; REGION_TYPE_COUNT]; REGION_TYPE_COUNT] {
    let mut table = [[false; REGION_TYPE_COUNT]; REGION_TYPE_COUNT];
    let mut child = 0;
    while child < REGION_TYPE_COUNT {
        // Walk the parent chain from `child` up to the root, marking every
        // type on the way as an ancestor.
        let mut cursor = ALL_TYPES[child];
        loop {
            table[child][cursor as usize] = true;
            match cursor.parent() {
                Some(parent) => cursor = parent,
                Option::None => break,
            }
        }
        child += 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_reflexive() {
        for ty in ALL_TYPES {
            assert!(ty.is_derived_from(ty), "{ty:?} should derive from itself");
        }
    }

    #[test]
    fn every_type_derives_from_the_unassigned_root() {
        for ty in ALL_TYPES {
            assert!(ty.is_derived_from(RegionType::None));
        }
    }

    #[test]
    fn pool_chain() {
        assert!(RegionType::DramApplicationPool.is_derived_from(RegionType::DramPoolPartition));
        assert!(RegionType::DramApplicationPool.is_derived_from(RegionType::Dram));
        assert!(!RegionType::DramApplicationPool.is_derived_from(RegionType::DramKernel));
        assert!(!RegionType::Dram.is_derived_from(RegionType::DramPoolPartition));
    }

    #[test]
    fn virtual_window_is_dram_derived() {
        assert!(RegionType::VirtualDram.is_derived_from(RegionType::Dram));
        assert!(RegionType::VirtualDramSystemPool.is_derived_from(RegionType::Dram));
        assert!(!RegionType::VirtualDramSystemPool.is_derived_from(RegionType::DramPoolPartition));
    }

    #[test]
    fn can_derive_refinements_only() {
        assert!(RegionType::None.can_derive(RegionType::Dram));
        assert!(RegionType::None.can_derive(RegionType::CoreLocal));
        assert!(RegionType::Dram.can_derive(RegionType::DramKernel));
        assert!(RegionType::DramPoolPartition.can_derive(RegionType::DramSystemPool));
        // Re-tagging at the same type is a legal (attribute-only) change.
        assert!(RegionType::Dram.can_derive(RegionType::Dram));
        // Widening or crossing branches is not.
        assert!(!RegionType::DramKernel.can_derive(RegionType::Dram));
        assert!(!RegionType::Kernel.can_derive(RegionType::Dram));
        assert!(!RegionType::DramApplicationPool.can_derive(RegionType::DramAppletPool));
    }

    #[test]
    fn linear_mapped_property() {
        assert!(RegionType::Dram.has_property(RegionProperties::LINEAR_MAPPED));
        assert!(RegionType::DramMetadataPool.has_property(RegionProperties::LINEAR_MAPPED));
        assert!(RegionType::VirtualDram.has_property(RegionProperties::LINEAR_MAPPED));
        assert!(!RegionType::None.has_property(RegionProperties::LINEAR_MAPPED));
        assert!(!RegionType::CoreLocal.has_property(RegionProperties::LINEAR_MAPPED));
    }
}
