//! Platform services consumed by the layout builder.
//!
//! The tracker treats randomness, physical page allocation, and page-table
//! manipulation as opaque services supplied by the embedding kernel.
//! Implement these traits on the platform's boot facilities; tests use
//! deterministic mocks.

use bitflags::bitflags;

use crate::{PhysicalAddress, VirtualAddress};

/// Source of uniformly distributed random integers.
///
/// The randomized placement routines only require the distribution to be
/// unbiased enough for address-space-layout randomization; the hardware
/// implementation lives in [`crate::arch`].
pub trait EntropySource {
    /// Returns the next raw random value.
    fn next_u64(&mut self) -> u64;

    /// Returns a uniformly distributed value in `[low, high]` (inclusive).
    ///
    /// The default implementation rejects raw values from the biased tail
    /// of the modulus, so it inherits uniformity from [`Self::next_u64`].
    fn generate_random_range(&mut self, low: usize, high: usize) -> usize {
        debug_assert!(low <= high);
        let span = ((high - low) as u64).wrapping_add(1);
        if span == 0 {
            // [low, high] covers every representable value.
            return self.next_u64() as usize;
        }
        let unbiased_limit = (u64::MAX / span) * span;
        loop {
            let value = self.next_u64();
            if value < unbiased_limit {
                return low + (value % span) as usize;
            }
        }
    }
}

/// Boot-time allocator handing out single zeroed physical pages.
///
/// Implementations abort on exhaustion; page allocation during boot is
/// not a recoverable condition.
pub trait InitialPageAllocator {
    /// Allocates one zero-initialized page.
    fn allocate(&mut self) -> PhysicalAddress;
}

bitflags! {
    /// Access permissions for a mapping.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct MapPermissions: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        /// Accessible from user mode.
        const USER = 1 << 3;
    }
}

/// Memory type of a mapping.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemoryKind {
    /// Normal cacheable memory.
    Normal,
    /// Device memory.
    Device,
}

/// Shareability domain of a mapping.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Shareability {
    NonShareable,
    InnerShareable,
    OuterShareable,
}

/// Attributes applied to a page-table mapping.
///
/// Opaque to the tracker beyond being passed through to
/// [`CorePlatform::map`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MapAttributes {
    pub permissions: MapPermissions,
    pub memory: MemoryKind,
    pub shareability: Shareability,
}

impl MapAttributes {
    /// Kernel read-write data: normal memory, inner-shareable.
    pub const KERNEL_RW_DATA: Self = Self {
        permissions: MapPermissions::READ.union(MapPermissions::WRITE),
        memory: MemoryKind::Normal,
        shareability: Shareability::InnerShareable,
    };
}

/// Early-boot arguments recorded for one core.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InitArguments {
    /// Physical address of the core's local data page.
    pub core_local_page: PhysicalAddress,
    /// Physical address of the core's translation-table root.
    pub table_root: PhysicalAddress,
}

/// Page-table and early-boot services for the core-local region setup.
pub trait CorePlatform {
    /// Returns the physical address of the currently active
    /// translation-table root (the boot core's tables).
    fn active_table_root(&self) -> PhysicalAddress;

    /// Copies one page of physical memory; used to clone the boot core's
    /// table root for secondary cores.
    fn copy_page(&mut self, dst: PhysicalAddress, src: PhysicalAddress);

    /// Maps `size` bytes at `virt` to `phys` in the table rooted at
    /// `root`, allocating intermediate tables from `allocator` as needed.
    fn map(
        &mut self,
        root: PhysicalAddress,
        virt: VirtualAddress,
        size: usize,
        phys: PhysicalAddress,
        attributes: MapAttributes,
        allocator: &mut dyn InitialPageAllocator,
    );

    /// Records the early-boot arguments for `core`.
    fn set_init_arguments(&mut self, core: usize, arguments: InitArguments);

    /// Flushes the recorded arguments to the point of coherency so cores
    /// coming out of reset observe them.
    fn store_init_arguments(&mut self);
}
