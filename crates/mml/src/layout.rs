//! The machine's memory layout: four region trees plus pairing offsets.
//!
//! A [`MemoryLayout`] owns the physical and virtual base trees and the two
//! derived linear trees. It is constructed once by the boot entry point
//! and threaded by `&mut` through the builder procedures in
//! [`crate::boot`]; afterwards it can be published for read-only runtime
//! queries via [`MemoryLayout::publish`].

use crate::tree::RegionTree;
use crate::{
    HumanSize, PhysicalAddress, RegionProperties, RegionType, VirtualAddress,
};

/// Constant offsets of the linearly mapped relationship, recorded once the
/// base trees have stabilized. Stored as wrapping differences so either
/// direction is a single wrapping add.
struct LinearOffsets {
    phys_to_virt: usize,
    virt_to_phys: usize,
}

/// Region trees for the physical and virtual address spaces.
pub struct MemoryLayout {
    phys: RegionTree,
    virt: RegionTree,
    phys_linear: RegionTree,
    virt_linear: RegionTree,
    linear_offsets: Option<LinearOffsets>,
}

impl MemoryLayout {
    /// Creates a layout tracking `[phys_start, phys_start + phys_size)`
    /// and `[virt_start, virt_start + virt_size)`, each fully covered by
    /// a single unassigned block.
    pub fn new(
        phys_start: PhysicalAddress,
        phys_size: usize,
        virt_start: VirtualAddress,
        virt_size: usize,
    ) -> Self {
        log::debug!(
            "tracking physical span {phys_start}+{} and virtual span {virt_start}+{}",
            HumanSize(phys_size),
            HumanSize(virt_size)
        );
        Self {
            phys: RegionTree::covering(phys_start.as_usize(), phys_size),
            virt: RegionTree::covering(virt_start.as_usize(), virt_size),
            phys_linear: RegionTree::new(),
            virt_linear: RegionTree::new(),
            linear_offsets: None,
        }
    }

    /// Returns the physical-space tree.
    pub fn physical_tree(&self) -> &RegionTree {
        &self.phys
    }

    /// Returns the physical-space tree for mutation during boot.
    pub fn physical_tree_mut(&mut self) -> &mut RegionTree {
        &mut self.phys
    }

    /// Returns the virtual-space tree.
    pub fn virtual_tree(&self) -> &RegionTree {
        &self.virt
    }

    /// Returns the virtual-space tree for mutation during boot.
    pub fn virtual_tree_mut(&mut self) -> &mut RegionTree {
        &mut self.virt
    }

    /// Returns the linear snapshot of the physical tree.
    pub fn physical_linear_tree(&self) -> &RegionTree {
        &self.phys_linear
    }

    /// Returns the linear snapshot of the virtual tree.
    pub fn virtual_linear_tree(&self) -> &RegionTree {
        &self.virt_linear
    }

    /// Registers a linearly mapped DRAM window in both trees.
    ///
    /// The physical block is typed [`RegionType::Dram`] and paired to
    /// `virt`; the virtual block is typed [`RegionType::VirtualDram`] and
    /// paired to `phys`. This is the point where pairing enters the
    /// system; every later split propagates it.
    ///
    /// # Panics
    ///
    /// Panics if either insertion is rejected; the window must fall in
    /// unassigned space on both sides.
    pub fn register_linear_dram(
        &mut self,
        phys: PhysicalAddress,
        size: usize,
        virt: VirtualAddress,
    ) {
        log::info!(
            "registering {} of linearly mapped DRAM: {phys} -> {virt}",
            HumanSize(size)
        );
        assert!(
            self.phys.insert_paired(
                phys.as_usize(),
                size,
                virt.as_usize(),
                RegionType::Dram,
                0,
                0,
            ),
            "physical DRAM window overlaps an assigned region"
        );
        assert!(
            self.virt.insert_paired(
                virt.as_usize(),
                size,
                phys.as_usize(),
                RegionType::VirtualDram,
                0,
                0,
            ),
            "virtual DRAM window overlaps an assigned region"
        );
    }

    /// Builds the linear trees and records the pairing offsets.
    ///
    /// Copies every physical block with the
    /// [`RegionProperties::LINEAR_MAPPED`] property and every virtual
    /// block derived from [`RegionType::Dram`] into the respective linear
    /// tree, giving restricted iteration over the linearly mapped subset
    /// without rescanning the base trees. Called once, after the base
    /// trees have stabilized.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn initialize_linear_trees(
        &mut self,
        aligned_phys_start: PhysicalAddress,
        virt_start: VirtualAddress,
    ) {
        assert!(
            self.linear_offsets.is_none(),
            "linear trees already initialized"
        );
        self.linear_offsets = Some(LinearOffsets {
            phys_to_virt: virt_start.as_usize().wrapping_sub(aligned_phys_start.as_usize()),
            virt_to_phys: aligned_phys_start.as_usize().wrapping_sub(virt_start.as_usize()),
        });

        for block in self.phys.iter() {
            if !block.has_property(RegionProperties::LINEAR_MAPPED) {
                continue;
            }
            self.phys_linear.insert_block(*block);
        }

        for block in self.virt.iter() {
            if !block.is_derived_from(RegionType::Dram) {
                continue;
            }
            self.virt_linear.insert_block(*block);
        }

        log::debug!(
            "linear trees initialized: {} physical, {} virtual blocks",
            self.phys_linear.len(),
            self.virt_linear.len()
        );
    }

    /// Translates a physical address through the linear mapping.
    ///
    /// # Panics
    ///
    /// Panics if [`MemoryLayout::initialize_linear_trees`] has not run.
    pub fn linear_phys_to_virt(&self, phys: PhysicalAddress) -> VirtualAddress {
        let offsets = self
            .linear_offsets
            .as_ref()
            .expect("linear mapping offsets not initialized");
        VirtualAddress::new(phys.as_usize().wrapping_add(offsets.phys_to_virt))
    }

    /// Translates a virtual address through the linear mapping.
    ///
    /// # Panics
    ///
    /// Panics if [`MemoryLayout::initialize_linear_trees`] has not run.
    pub fn linear_virt_to_phys(&self, virt: VirtualAddress) -> PhysicalAddress {
        let offsets = self
            .linear_offsets
            .as_ref()
            .expect("linear mapping offsets not initialized");
        PhysicalAddress::new(virt.as_usize().wrapping_add(offsets.virt_to_phys))
    }

    /// Publishes the finished layout for read-only runtime access.
    ///
    /// After boot the trees are never mutated again, so a one-shot
    /// publication gives later consumers a shared `&'static` view.
    ///
    /// # Panics
    ///
    /// Panics if a layout has already been published.
    pub fn publish(self) {
        if ACTIVE_LAYOUT.get().is_some() {
            panic!("memory layout already published");
        }
        ACTIVE_LAYOUT.call_once(|| self);
    }

    /// Returns the published layout.
    ///
    /// # Panics
    ///
    /// Panics if no layout has been published yet.
    pub fn active() -> &'static MemoryLayout {
        ACTIVE_LAYOUT
            .get()
            .expect("memory layout not published; call MemoryLayout::publish during boot")
    }
}

/// The published post-boot layout.
static ACTIVE_LAYOUT: spin::Once<MemoryLayout> = spin::Once::new();
