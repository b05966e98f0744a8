//! Boot-time layout construction.
//!
//! These procedures carve the registered DRAM range into the managed
//! pools and place the randomized core-local region. They run exactly
//! once, single-threaded, before the kernel becomes schedulable; every
//! invariant violation here is a static configuration error and panics.

use core::cmp;

use crate::arch::PAGE_SIZE;
use crate::platform::{
    CorePlatform, EntropySource, InitArguments, InitialPageAllocator, MapAttributes,
};
use crate::{HumanSize, MemoryLayout, PhysicalAddress, RegionType, VirtualAddress, align};

/// Alignment of the kernel DRAM carveout and the non-secure system pool.
pub const CARVEOUT_ALIGNMENT: usize = 0x20000;

/// Maximum distance the kernel-owned carveout may extend from the start
/// of kernel DRAM.
pub const CARVEOUT_SIZE_MAX: usize = (512 << 20) - CARVEOUT_ALIGNMENT;

/// Alignment of the core-local region itself.
pub const CORE_LOCAL_REGION_ALIGN: usize = PAGE_SIZE;

/// The core-local region must not cross a boundary of this alignment.
pub const CORE_LOCAL_BOUNDS_ALIGN: usize = 1 << 30;

/// Upper bound on supported cores; sizes the fixed boot-time arrays.
pub const MAX_CORES: usize = 16;

/// Attempts before a randomized core-local placement is declared
/// infeasible. The search is rejection sampling, so a correct geometry
/// converges in a handful of draws; exhausting this bound means the
/// configured layout admits no placement at all.
const MAX_PLACEMENT_ATTEMPTS: usize = 0x10000;

/// Size of the core-local region: one page per core plus a shared header
/// page.
pub const fn core_local_region_size(num_cores: usize) -> usize {
    PAGE_SIZE * (1 + num_cores)
}

const fn core_local_region_size_with_guards(num_cores: usize) -> usize {
    core_local_region_size(num_cores) + 2 * PAGE_SIZE
}

/// Pool sizing configuration, supplied by the platform's system control.
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Size of the application pool.
    pub application_pool_size: usize,
    /// Size of the applet pool.
    pub applet_pool_size: usize,
    /// Minimum size of the non-secure system pool.
    pub minimum_nonsecure_system_pool_size: usize,
}

/// Returns the bookkeeping overhead needed to manage `region_size` bytes
/// of pooled memory: one 16-bit reference count per page plus a 64-ary
/// occupancy bitmap hierarchy, rounded up to whole pages.
pub fn calculate_management_overhead_size(region_size: usize) -> usize {
    let pages = region_size / PAGE_SIZE;
    let refcount_size = pages * core::mem::size_of::<u16>();

    let mut bitmap_size = 0;
    let mut remaining = pages;
    while remaining > 1 {
        remaining = remaining.div_ceil(u64::BITS as usize);
        bitmap_size += remaining * core::mem::size_of::<u64>();
    }

    align::align_up(refcount_size + bitmap_size, PAGE_SIZE)
}

/// Carves the DRAM pool-partition range into the managed pools.
///
/// Pools are placed from the top of DRAM downward: application, applet,
/// non-secure system (at least its configured minimum, but never
/// extending the kernel-owned carveout past [`CARVEOUT_SIZE_MAX`]),
/// metadata (sized to the bookkeeping overhead of all other pools), and
/// finally the system pool absorbing the remainder. If the application
/// pool straddles the DRAM midpoint it is split into two sub-pools at
/// the midpoint, each sized and accounted separately.
///
/// Every pool is inserted into both trees with a shared increasing
/// attribute tag; the metadata pool's tag restarts from zero.
///
/// # Panics
///
/// Panics if the kernel DRAM carveout is misaligned, if any pool does
/// not fit the configured geometry, or if any insertion is rejected.
pub fn setup_pool_partition_regions(layout: &mut MemoryLayout, config: &PoolConfig) {
    let (dram_start, dram_end) = {
        let extents = layout.physical_tree().derived_extents(RegionType::Dram);
        (extents.first.address(), extents.last.end_address())
    };

    let kernel_dram_start = layout
        .physical_tree()
        .find_first_derived(RegionType::DramKernel)
        .address();
    assert!(
        align::is_aligned(kernel_dram_start, CARVEOUT_ALIGNMENT),
        "kernel DRAM carveout start is misaligned"
    );

    let pool_partitions_start = layout
        .physical_tree()
        .find_first_by_type_attr(RegionType::DramPoolPartition, 0)
        .address();

    let application_pool_start = dram_end
        .checked_sub(config.application_pool_size)
        .expect("application pool larger than DRAM");
    let applet_pool_start = application_pool_start
        .checked_sub(config.applet_pool_size)
        .expect("applet pool does not fit below the application pool");
    let unsafe_system_pool_start = cmp::min(
        kernel_dram_start + CARVEOUT_SIZE_MAX,
        align::align_down(
            applet_pool_start
                .checked_sub(config.minimum_nonsecure_system_pool_size)
                .expect("non-secure system pool does not fit below the applet pool"),
            CARVEOUT_ALIGNMENT,
        ),
    );
    let unsafe_system_pool_size = applet_pool_start - unsafe_system_pool_start;

    let dram_midpoint = dram_start + (dram_end - dram_start) / 2;
    let mut pool_attr: u32 = 0;
    let mut total_overhead_size = 0;

    if dram_end <= dram_midpoint || dram_midpoint <= application_pool_start {
        insert_pool_partition_region(
            layout,
            application_pool_start,
            config.application_pool_size,
            RegionType::DramApplicationPool,
            RegionType::VirtualDramApplicationPool,
            &mut pool_attr,
        );
        total_overhead_size += calculate_management_overhead_size(config.application_pool_size);
    } else {
        // The application pool straddles the DRAM midpoint; split it
        // there rather than let one pool cross the boundary.
        let first_size = dram_midpoint - application_pool_start;
        let second_size = application_pool_start + config.application_pool_size - dram_midpoint;
        insert_pool_partition_region(
            layout,
            application_pool_start,
            first_size,
            RegionType::DramApplicationPool,
            RegionType::VirtualDramApplicationPool,
            &mut pool_attr,
        );
        insert_pool_partition_region(
            layout,
            dram_midpoint,
            second_size,
            RegionType::DramApplicationPool,
            RegionType::VirtualDramApplicationPool,
            &mut pool_attr,
        );
        total_overhead_size += calculate_management_overhead_size(first_size);
        total_overhead_size += calculate_management_overhead_size(second_size);
    }

    insert_pool_partition_region(
        layout,
        applet_pool_start,
        config.applet_pool_size,
        RegionType::DramAppletPool,
        RegionType::VirtualDramAppletPool,
        &mut pool_attr,
    );
    total_overhead_size += calculate_management_overhead_size(config.applet_pool_size);

    insert_pool_partition_region(
        layout,
        unsafe_system_pool_start,
        unsafe_system_pool_size,
        RegionType::DramSystemNonSecurePool,
        RegionType::VirtualDramSystemNonSecurePool,
        &mut pool_attr,
    );
    total_overhead_size += calculate_management_overhead_size(unsafe_system_pool_size);

    // The metadata pool must also cover the overhead of the system pool
    // that will absorb the remaining partition space below it.
    total_overhead_size += calculate_management_overhead_size(
        (unsafe_system_pool_start - pool_partitions_start) - total_overhead_size,
    );
    let metadata_pool_start = unsafe_system_pool_start - total_overhead_size;
    let metadata_pool_size = total_overhead_size;
    // The metadata pool's attribute tags restart from zero.
    let mut metadata_pool_attr: u32 = 0;
    insert_pool_partition_region(
        layout,
        metadata_pool_start,
        metadata_pool_size,
        RegionType::DramMetadataPool,
        RegionType::VirtualDramMetadataPool,
        &mut metadata_pool_attr,
    );

    let system_pool_size = metadata_pool_start - pool_partitions_start;
    insert_pool_partition_region(
        layout,
        pool_partitions_start,
        system_pool_size,
        RegionType::DramSystemPool,
        RegionType::VirtualDramSystemPool,
        &mut pool_attr,
    );
}

/// Inserts one pool into both trees under the next attribute tag.
///
/// The physical block is inserted first; its pair address (propagated
/// from the linearly mapped DRAM registration) then gives the virtual
/// insertion point, so pairing stays consistent without recomputing
/// offsets in each tree.
fn insert_pool_partition_region(
    layout: &mut MemoryLayout,
    start: usize,
    size: usize,
    phys_type: RegionType,
    virt_type: RegionType,
    attr: &mut u32,
) {
    let attr_value = *attr;
    *attr += 1;

    assert!(
        layout
            .physical_tree_mut()
            .insert(start, size, phys_type, attr_value, 0),
        "physical insertion of {phys_type:?} at {start:#x} rejected"
    );
    let pair = layout
        .physical_tree()
        .find_first_by_type_attr(phys_type, attr_value)
        .pair_address()
        .expect("pool partition region is not linearly mapped");
    assert!(
        layout
            .virtual_tree_mut()
            .insert(pair, size, virt_type, attr_value, 0),
        "virtual insertion of {virt_type:?} at {pair:#x} rejected"
    );

    log::info!(
        "pool {phys_type:?} attr={attr_value}: {} at {start:#x} (virtual {pair:#x})",
        HumanSize(size)
    );
}

/// Places and wires up the per-core local region.
///
/// Finds a randomized page-aligned virtual placement whose guard-padded
/// span stays inside one unassigned block and inside one
/// [`CORE_LOCAL_BOUNDS_ALIGN`] window which that block fully covers;
/// inserts it as [`RegionType::CoreLocal`]; allocates a local data page
/// per core and a translation-table root per secondary core (copies of
/// the boot core's root); maps, in every core's tables, the core's own
/// page at offset 0 and every core's page at the following offsets; and
/// records each core's [`InitArguments`] before flushing them for
/// early-boot consumption.
///
/// Returns the virtual address of the region (past the leading guard
/// page).
///
/// # Panics
///
/// Panics if `num_cores` is zero or exceeds [`MAX_CORES`], if no
/// placement satisfies the constraints, or if the region insertion is
/// rejected.
pub fn setup_core_local_regions(
    layout: &mut MemoryLayout,
    num_cores: usize,
    entropy: &mut dyn EntropySource,
    allocator: &mut dyn InitialPageAllocator,
    platform: &mut dyn CorePlatform,
) -> VirtualAddress {
    assert!(
        num_cores > 0 && num_cores <= MAX_CORES,
        "core count out of range"
    );

    let region_size = core_local_region_size(num_cores);
    let region_start = core_local_region_address(layout, num_cores, entropy);
    assert!(
        layout
            .virtual_tree_mut()
            .insert(region_start, region_size, RegionType::CoreLocal, 0, 0),
        "core-local region insertion rejected"
    );
    let virt_start = VirtualAddress::new(region_start);
    log::info!(
        "core-local region for {num_cores} cores at {virt_start} ({})",
        HumanSize(region_size)
    );

    let mut core_local_pages = [PhysicalAddress::new(0); MAX_CORES];
    for page in core_local_pages.iter_mut().take(num_cores) {
        *page = allocator.allocate();
    }

    let mut table_roots = [PhysicalAddress::new(0); MAX_CORES];
    table_roots[0] = platform.active_table_root().align_down(PAGE_SIZE);
    for i in 1..num_cores {
        table_roots[i] = allocator.allocate();
        platform.copy_page(table_roots[i], table_roots[0]);
    }

    for i in 0..num_cores {
        // Offset 0 is the core's private view of its own page; offsets
        // 1..=num_cores expose every core's page.
        platform.map(
            table_roots[i],
            virt_start,
            PAGE_SIZE,
            core_local_pages[i],
            MapAttributes::KERNEL_RW_DATA,
            allocator,
        );
        for j in 0..num_cores {
            platform.map(
                table_roots[i],
                virt_start + (j + 1) * PAGE_SIZE,
                PAGE_SIZE,
                core_local_pages[j],
                MapAttributes::KERNEL_RW_DATA,
                allocator,
            );
        }

        platform.set_init_arguments(
            i,
            InitArguments {
                core_local_page: core_local_pages[i],
                table_root: table_roots[i],
            },
        );
    }

    platform.store_init_arguments();
    virt_start
}

/// Randomized placement for the core-local region, guard pages included.
///
/// Returns the region start (one page past the sampled guard-padded
/// placement).
fn core_local_region_address(
    layout: &MemoryLayout,
    num_cores: usize,
    entropy: &mut dyn EntropySource,
) -> usize {
    let size_with_guards = core_local_region_size_with_guards(num_cores);

    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        let candidate_start = layout.virtual_tree().random_aligned_region(
            entropy,
            size_with_guards,
            CORE_LOCAL_REGION_ALIGN,
            RegionType::None,
        );
        let candidate_last = candidate_start + size_with_guards - 1;

        // The guarded span must not cross a bounds-alignment boundary.
        let window_start = align::align_down(candidate_start, CORE_LOCAL_BOUNDS_ALIGN);
        if window_start != align::align_down(candidate_last, CORE_LOCAL_BOUNDS_ALIGN) {
            continue;
        }

        // The containing block must cover the whole boundary window, so
        // the region's neighborhood is unassigned up to the boundary.
        let containing = layout.virtual_tree().find_containing(candidate_start);
        if containing.address() > window_start {
            continue;
        }
        if align::window_last(candidate_last, CORE_LOCAL_BOUNDS_ALIGN) > containing.last_address() {
            continue;
        }

        return candidate_start + PAGE_SIZE;
    }

    panic!("no feasible core-local region placement");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::RegionTree;

    const PHYS_SPAN: usize = 0x1_0000_0000;
    const VIRT_SPAN: usize = 0x1_0000_0000;
    const DRAM_PHYS: usize = 0x8000_0000;
    const DRAM_VIRT: usize = 0x4000_0000;
    const KERNEL_CARVEOUT_SIZE: usize = 0x200_0000;

    struct SequenceEntropy {
        values: Vec<u64>,
        index: usize,
    }

    impl SequenceEntropy {
        fn new(values: &[u64]) -> Self {
            Self {
                values: values.to_vec(),
                index: 0,
            }
        }
    }

    impl EntropySource for SequenceEntropy {
        fn next_u64(&mut self) -> u64 {
            let value = self.values[self.index % self.values.len()];
            self.index += 1;
            value
        }
    }

    struct BumpAllocator {
        next: usize,
    }

    impl InitialPageAllocator for BumpAllocator {
        fn allocate(&mut self) -> PhysicalAddress {
            let address = self.next;
            self.next += PAGE_SIZE;
            PhysicalAddress::new(address)
        }
    }

    #[derive(Default)]
    struct RecordingPlatform {
        active_root: usize,
        copies: Vec<(usize, usize)>,
        maps: Vec<(usize, usize, usize, usize, MapAttributes)>,
        init_arguments: Vec<(usize, InitArguments)>,
        stored: bool,
    }

    impl CorePlatform for RecordingPlatform {
        fn active_table_root(&self) -> PhysicalAddress {
            PhysicalAddress::new(self.active_root)
        }

        fn copy_page(&mut self, dst: PhysicalAddress, src: PhysicalAddress) {
            self.copies.push((dst.as_usize(), src.as_usize()));
        }

        fn map(
            &mut self,
            root: PhysicalAddress,
            virt: VirtualAddress,
            size: usize,
            phys: PhysicalAddress,
            attributes: MapAttributes,
            _allocator: &mut dyn InitialPageAllocator,
        ) {
            self.maps.push((
                root.as_usize(),
                virt.as_usize(),
                size,
                phys.as_usize(),
                attributes,
            ));
        }

        fn set_init_arguments(&mut self, core: usize, arguments: InitArguments) {
            self.init_arguments.push((core, arguments));
        }

        fn store_init_arguments(&mut self) {
            self.stored = true;
        }
    }

    fn assert_total_coverage(tree: &RegionTree, start: usize, size: usize) {
        let mut cursor = start;
        for block in tree.iter() {
            assert_eq!(block.address(), cursor, "gap or overlap before {block}");
            cursor = block.end_address();
        }
        assert_eq!(cursor, start + size);
    }

    /// Layout with registered DRAM, kernel carveout, and pool partition.
    fn boot_layout(dram_size: usize) -> MemoryLayout {
        let mut layout = MemoryLayout::new(
            PhysicalAddress::new(0),
            PHYS_SPAN,
            VirtualAddress::new(0),
            VIRT_SPAN,
        );
        layout.register_linear_dram(
            PhysicalAddress::new(DRAM_PHYS),
            dram_size,
            VirtualAddress::new(DRAM_VIRT),
        );
        assert!(layout.physical_tree_mut().insert(
            DRAM_PHYS,
            KERNEL_CARVEOUT_SIZE,
            RegionType::DramKernel,
            0,
            0
        ));
        assert!(layout.physical_tree_mut().insert(
            DRAM_PHYS + KERNEL_CARVEOUT_SIZE,
            dram_size - KERNEL_CARVEOUT_SIZE,
            RegionType::DramPoolPartition,
            0,
            0
        ));
        layout
    }

    fn pool(layout: &MemoryLayout, region_type: RegionType, attr: u32) -> (usize, usize) {
        let block = layout.physical_tree().find_first_by_type_attr(region_type, attr);
        (block.address(), block.size())
    }

    /// Checks the virtual counterpart of a physical pool block.
    fn assert_pool_paired(
        layout: &MemoryLayout,
        phys_type: RegionType,
        virt_type: RegionType,
        attr: u32,
    ) {
        let phys_block = layout.physical_tree().find_first_by_type_attr(phys_type, attr);
        let virt_block = layout.virtual_tree().find_first_by_type_attr(virt_type, attr);
        assert_eq!(Some(virt_block.address()), phys_block.pair_address());
        assert_eq!(virt_block.pair_address(), Some(phys_block.address()));
        assert_eq!(virt_block.size(), phys_block.size());
    }

    mod pool_partition {
        use super::*;

        const DRAM_SIZE: usize = 0x1000_0000;

        fn config() -> PoolConfig {
            PoolConfig {
                application_pool_size: 0x400_0000,
                applet_pool_size: 0x200_0000,
                minimum_nonsecure_system_pool_size: 0x100_0000,
            }
        }

        #[test]
        fn carves_pools_from_the_top_down() {
            let mut layout = boot_layout(DRAM_SIZE);
            setup_pool_partition_regions(&mut layout, &config());

            let dram_end = DRAM_PHYS + DRAM_SIZE;
            let (application, application_size) =
                pool(&layout, RegionType::DramApplicationPool, 0);
            assert_eq!(application, dram_end - 0x400_0000);
            assert_eq!(application_size, 0x400_0000);

            let (applet, applet_size) = pool(&layout, RegionType::DramAppletPool, 1);
            assert_eq!(applet, application - 0x200_0000);
            assert_eq!(applet_size, 0x200_0000);

            // The minimum fits well inside the carveout cap, so the
            // non-secure pool lands on the aligned minimum placement.
            let (unsafe_pool, unsafe_size) =
                pool(&layout, RegionType::DramSystemNonSecurePool, 2);
            assert_eq!(unsafe_pool, align::align_down(applet - 0x100_0000, CARVEOUT_ALIGNMENT));
            assert_eq!(unsafe_size, applet - unsafe_pool);

            let (metadata, metadata_size) = pool(&layout, RegionType::DramMetadataPool, 0);
            assert_eq!(metadata + metadata_size, unsafe_pool);

            let (system, system_size) = pool(&layout, RegionType::DramSystemPool, 3);
            assert_eq!(system, DRAM_PHYS + KERNEL_CARVEOUT_SIZE);
            assert_eq!(system + system_size, metadata);

            assert_total_coverage(layout.physical_tree(), 0, PHYS_SPAN);
            assert_total_coverage(layout.virtual_tree(), 0, VIRT_SPAN);
        }

        #[test]
        fn metadata_pool_accounts_for_every_pool() {
            let mut layout = boot_layout(DRAM_SIZE);
            setup_pool_partition_regions(&mut layout, &config());

            let (_, application_size) = pool(&layout, RegionType::DramApplicationPool, 0);
            let (_, applet_size) = pool(&layout, RegionType::DramAppletPool, 1);
            let (unsafe_start, unsafe_size) =
                pool(&layout, RegionType::DramSystemNonSecurePool, 2);
            let (system_start, _) = pool(&layout, RegionType::DramSystemPool, 3);
            let (_, metadata_size) = pool(&layout, RegionType::DramMetadataPool, 0);

            // Overheads of the sized pools, then of the space left for the
            // system pool, in the same order the carving accumulates them.
            let mut expected = calculate_management_overhead_size(application_size)
                + calculate_management_overhead_size(applet_size)
                + calculate_management_overhead_size(unsafe_size);
            expected +=
                calculate_management_overhead_size((unsafe_start - system_start) - expected);
            assert_eq!(metadata_size, expected);
        }

        #[test]
        fn pools_are_mirrored_into_the_virtual_tree() {
            let mut layout = boot_layout(DRAM_SIZE);
            setup_pool_partition_regions(&mut layout, &config());

            assert_pool_paired(
                &layout,
                RegionType::DramApplicationPool,
                RegionType::VirtualDramApplicationPool,
                0,
            );
            assert_pool_paired(
                &layout,
                RegionType::DramAppletPool,
                RegionType::VirtualDramAppletPool,
                1,
            );
            assert_pool_paired(
                &layout,
                RegionType::DramSystemNonSecurePool,
                RegionType::VirtualDramSystemNonSecurePool,
                2,
            );
            assert_pool_paired(
                &layout,
                RegionType::DramMetadataPool,
                RegionType::VirtualDramMetadataPool,
                0,
            );
            assert_pool_paired(
                &layout,
                RegionType::DramSystemPool,
                RegionType::VirtualDramSystemPool,
                3,
            );
        }

        #[test]
        fn application_pool_straddling_the_midpoint_is_split() {
            let mut layout = boot_layout(DRAM_SIZE);
            // 144 MiB of application pool starts below the midpoint of
            // the 256 MiB DRAM.
            let config = PoolConfig {
                application_pool_size: 0x900_0000,
                applet_pool_size: 0x200_0000,
                minimum_nonsecure_system_pool_size: 0x100_0000,
            };
            setup_pool_partition_regions(&mut layout, &config);

            let midpoint = DRAM_PHYS + DRAM_SIZE / 2;
            let (first, first_size) = pool(&layout, RegionType::DramApplicationPool, 0);
            let (second, second_size) = pool(&layout, RegionType::DramApplicationPool, 1);
            assert_eq!(first, DRAM_PHYS + DRAM_SIZE - 0x900_0000);
            assert_eq!(first + first_size, midpoint);
            assert_eq!(second, midpoint);
            assert_eq!(second + second_size, DRAM_PHYS + DRAM_SIZE);

            // The attribute counter advanced past both halves.
            let (applet, _) = pool(&layout, RegionType::DramAppletPool, 2);
            assert_eq!(applet, first - 0x200_0000);
            let _ = pool(&layout, RegionType::DramSystemNonSecurePool, 3);
            let _ = pool(&layout, RegionType::DramSystemPool, 4);

            assert_total_coverage(layout.physical_tree(), 0, PHYS_SPAN);
        }

        #[test]
        fn nonsecure_pool_is_capped_by_the_carveout_limit() {
            // With 1 GiB of DRAM the aligned minimum placement would put
            // the carveout end past the cap, so the pool grows down to it.
            let dram_size = 0x4000_0000;
            let mut layout = boot_layout(dram_size);
            setup_pool_partition_regions(&mut layout, &config());

            let (unsafe_pool, unsafe_size) =
                pool(&layout, RegionType::DramSystemNonSecurePool, 2);
            assert_eq!(unsafe_pool, DRAM_PHYS + CARVEOUT_SIZE_MAX);

            let (applet, _) = pool(&layout, RegionType::DramAppletPool, 1);
            assert_eq!(unsafe_pool + unsafe_size, applet);
        }

        #[test]
        #[should_panic(expected = "carveout start is misaligned")]
        fn misaligned_kernel_carveout_is_fatal() {
            let mut layout = MemoryLayout::new(
                PhysicalAddress::new(0),
                PHYS_SPAN,
                VirtualAddress::new(0),
                VIRT_SPAN,
            );
            layout.register_linear_dram(
                PhysicalAddress::new(DRAM_PHYS),
                0x1000_0000,
                VirtualAddress::new(DRAM_VIRT),
            );
            // Carveout at a page-aligned but not carveout-aligned start.
            assert!(layout.physical_tree_mut().insert(
                DRAM_PHYS + 0x1000,
                0x100_0000,
                RegionType::DramKernel,
                0,
                0
            ));
            setup_pool_partition_regions(&mut layout, &config());
        }
    }

    mod core_local {
        use super::*;

        const DRAM_SIZE: usize = 0x1000_0000;
        const NUM_CORES: usize = 4;
        /// Lands in unassigned space away from any 1 GiB boundary.
        const GOOD_CANDIDATE: u64 = 0xc800_0000;

        #[test]
        fn places_and_wires_the_region() {
            let mut layout = boot_layout(DRAM_SIZE);
            let mut entropy = SequenceEntropy::new(&[GOOD_CANDIDATE]);
            let mut allocator = BumpAllocator { next: 0x10_0000 };
            let mut platform = RecordingPlatform {
                active_root: 0x7123,
                ..Default::default()
            };

            let virt_start = setup_core_local_regions(
                &mut layout,
                NUM_CORES,
                &mut entropy,
                &mut allocator,
                &mut platform,
            );

            // Region starts one page past the sampled guard page.
            assert_eq!(virt_start.as_usize(), GOOD_CANDIDATE as usize + PAGE_SIZE);
            let region = layout.virtual_tree().find_containing(virt_start.as_usize());
            assert_eq!(region.region_type(), RegionType::CoreLocal);
            assert_eq!(region.size(), core_local_region_size(NUM_CORES));

            // The guard pages on both sides stay unassigned.
            let before = layout
                .virtual_tree()
                .find_containing(virt_start.as_usize() - 1);
            assert_eq!(before.region_type(), RegionType::None);
            let after = layout
                .virtual_tree()
                .find_containing(region.end_address());
            assert_eq!(after.region_type(), RegionType::None);

            // One local page per core, then one table root per secondary
            // core, all from the bump allocator in order.
            let local_pages: Vec<usize> = (0..NUM_CORES).map(|i| 0x10_0000 + i * PAGE_SIZE).collect();
            let roots: Vec<usize> = core::iter::once(0x7000)
                .chain((1..NUM_CORES).map(|i| 0x10_0000 + (NUM_CORES + i - 1) * PAGE_SIZE))
                .collect();

            // Secondary roots are copies of the boot core's root.
            assert_eq!(
                platform.copies,
                (1..NUM_CORES).map(|i| (roots[i], 0x7000)).collect::<Vec<_>>()
            );

            // Core i maps its own page at offset 0 and every page above.
            let mut expected_maps = Vec::new();
            for i in 0..NUM_CORES {
                expected_maps.push((
                    roots[i],
                    virt_start.as_usize(),
                    PAGE_SIZE,
                    local_pages[i],
                    MapAttributes::KERNEL_RW_DATA,
                ));
                for (j, page) in local_pages.iter().enumerate() {
                    expected_maps.push((
                        roots[i],
                        virt_start.as_usize() + (j + 1) * PAGE_SIZE,
                        PAGE_SIZE,
                        *page,
                        MapAttributes::KERNEL_RW_DATA,
                    ));
                }
            }
            assert_eq!(platform.maps, expected_maps);

            // Init arguments recorded per core and flushed.
            for (i, (core, arguments)) in platform.init_arguments.iter().enumerate() {
                assert_eq!(*core, i);
                assert_eq!(arguments.core_local_page.as_usize(), local_pages[i]);
                assert_eq!(arguments.table_root.as_usize(), roots[i]);
            }
            assert_eq!(platform.init_arguments.len(), NUM_CORES);
            assert!(platform.stored);
        }

        #[test]
        fn rejects_placements_crossing_the_bounds_boundary() {
            let mut layout = boot_layout(DRAM_SIZE);
            // First candidate's guarded span crosses the 0xc000_0000
            // boundary; the second is clean.
            let mut entropy =
                SequenceEntropy::new(&[0xbfff_d000, GOOD_CANDIDATE]);
            let mut allocator = BumpAllocator { next: 0x10_0000 };
            let mut platform = RecordingPlatform::default();

            let virt_start = setup_core_local_regions(
                &mut layout,
                NUM_CORES,
                &mut entropy,
                &mut allocator,
                &mut platform,
            );

            assert_eq!(virt_start.as_usize(), GOOD_CANDIDATE as usize + PAGE_SIZE);
        }

        #[test]
        fn rejects_blocks_not_covering_the_whole_window() {
            let mut layout = boot_layout(DRAM_SIZE);
            // 0x6000_0000 sits in the unassigned block that starts at
            // 0x5000_0000, which does not reach back to the window start
            // at 0x4000_0000.
            let mut entropy =
                SequenceEntropy::new(&[0x6000_0000, GOOD_CANDIDATE]);
            let mut allocator = BumpAllocator { next: 0x10_0000 };
            let mut platform = RecordingPlatform::default();

            let virt_start = setup_core_local_regions(
                &mut layout,
                NUM_CORES,
                &mut entropy,
                &mut allocator,
                &mut platform,
            );

            assert_eq!(virt_start.as_usize(), GOOD_CANDIDATE as usize + PAGE_SIZE);
        }

        #[test]
        #[should_panic(expected = "no feasible core-local region placement")]
        fn exhausting_placement_attempts_is_fatal() {
            let mut layout = boot_layout(DRAM_SIZE);
            // Every candidate crosses the boundary, so the search never
            // converges and must abort.
            let mut entropy = SequenceEntropy::new(&[0xbfff_d000]);
            let mut allocator = BumpAllocator { next: 0x10_0000 };
            let mut platform = RecordingPlatform::default();

            let _ = setup_core_local_regions(
                &mut layout,
                NUM_CORES,
                &mut entropy,
                &mut allocator,
                &mut platform,
            );
        }

        #[test]
        #[should_panic(expected = "core count out of range")]
        fn too_many_cores_is_fatal() {
            let mut layout = boot_layout(DRAM_SIZE);
            let mut entropy = SequenceEntropy::new(&[GOOD_CANDIDATE]);
            let mut allocator = BumpAllocator { next: 0x10_0000 };
            let mut platform = RecordingPlatform::default();

            let _ = setup_core_local_regions(
                &mut layout,
                MAX_CORES + 1,
                &mut entropy,
                &mut allocator,
                &mut platform,
            );
        }
    }
}
