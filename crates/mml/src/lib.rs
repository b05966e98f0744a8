#![cfg_attr(not(test), no_std)]

//! # Meridian Memory Layout (MML)
//!
//! MML is the boot-time tracker of the machine's physical and virtual
//! address space for the Meridian kernel. It provides:
//!
//! - Interval-based region trees cataloguing every byte of both address
//!   spaces with a semantic type, an attribute tag, and the
//!   physical↔virtual pairing of linearly mapped memory.
//! - A closed region-type hierarchy governing which re-typings a region
//!   admits.
//! - Randomized, type-constrained region placement for address-space
//!   layout randomization.
//! - The boot procedures carving DRAM into managed pools and placing the
//!   per-core local region.
//!
//! The trees are built once during single-threaded boot, without a heap
//! (all storage is fixed-capacity), and can afterwards be published for
//! read-only runtime queries. Platform services (randomness, page
//! allocation, page-table mapping) are consumed through the
//! [`EntropySource`], [`InitialPageAllocator`], and [`CorePlatform`]
//! traits, so the whole crate is testable on a hosted target.

pub mod arch;

mod address;
mod align;
mod arena;
mod boot;
mod human_size;
mod layout;
mod platform;
mod region;
mod region_type;
mod tree;

pub use address::{PhysicalAddress, VirtualAddress};
pub use arena::{MAX_REGION_NODES, NodeHandle, RegionArena};
pub use boot::{
    CARVEOUT_ALIGNMENT, CARVEOUT_SIZE_MAX, CORE_LOCAL_BOUNDS_ALIGN, CORE_LOCAL_REGION_ALIGN,
    MAX_CORES, PoolConfig, calculate_management_overhead_size, core_local_region_size,
    setup_core_local_regions, setup_pool_partition_regions,
};
pub use human_size::HumanSize;
pub use layout::MemoryLayout;
pub use platform::{
    CorePlatform, EntropySource, InitArguments, InitialPageAllocator, MapAttributes,
    MapPermissions, MemoryKind, Shareability,
};
pub use region::RegionBlock;
pub use region_type::{RegionProperties, RegionType};
pub use tree::{RegionExtents, RegionTree};

pub use arch::PAGE_SIZE;
