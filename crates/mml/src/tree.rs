//! Ordered region tree.
//!
//! A tree tracks one address space as a sorted sequence of
//! [`RegionBlock`]s over an embedded node arena. Base trees are seeded
//! with a single unassigned block covering their whole tracked span and
//! keep **total coverage** invariant from then on: every mutation splits
//! an existing block into pieces that exactly reconstitute its interval,
//! so the blocks always tile the span with no gap and no overlap.
//! Derived "linear" trees are restricted snapshots and start empty.

use crate::align;
use crate::arena::{MAX_REGION_NODES, NodeHandle, RegionArena};
use crate::platform::EntropySource;
use crate::{RegionBlock, RegionType};

/// The lowest- and highest-addressed blocks matching a derivation query.
pub struct RegionExtents<'a> {
    pub first: &'a RegionBlock,
    pub last: &'a RegionBlock,
}

/// Ordered collection of region blocks covering one address space.
pub struct RegionTree {
    arena: RegionArena,
    /// Handles sorted by block address; `entries[..count]` are occupied.
    entries: [Option<NodeHandle>; MAX_REGION_NODES],
    count: usize,
}

impl RegionTree {
    /// Creates an empty tree (used for the derived linear trees).
    pub const fn new() -> Self {
        Self {
            arena: RegionArena::new(),
            entries: [None; MAX_REGION_NODES],
            count: 0,
        }
    }

    /// Creates a tree whose tracked span `[start, start + size)` is
    /// covered by a single unassigned block.
    pub fn covering(start: usize, size: usize) -> Self {
        let mut tree = Self::new();
        tree.insert_block(RegionBlock::new(start, size, None, 0, RegionType::None));
        tree
    }

    /// Returns the number of blocks in the tree.
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the tree holds no blocks.
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterates over the blocks in address order.
    pub fn iter(&self) -> impl Iterator<Item = &RegionBlock> {
        self.entries[..self.count]
            .iter()
            .copied()
            .flatten()
            .map(|handle| self.arena.get(handle))
    }

    /// Returns the block whose interval contains `address`.
    ///
    /// # Panics
    ///
    /// Panics if `address` lies outside the tracked span; callers must
    /// ensure range membership.
    pub fn find_containing(&self, address: usize) -> &RegionBlock {
        let position = self
            .position_of_containing(address)
            .unwrap_or_else(|| panic!("address {address:#x} is outside the tracked range"));
        self.block_at(position)
    }

    /// Splits the containing block to re-type `[address, address + size)`.
    ///
    /// Fails (returning `false`, with the tree untouched) if the
    /// containing block's attribute is not `expected_old_attr`, if the
    /// requested interval does not fit entirely inside the containing
    /// block, or if `new_type` is not a refinement of the containing
    /// block's type. On success the new block's pair address is the
    /// containing block's pair offset by the same amount as the address.
    ///
    /// # Panics
    ///
    /// Panics if `address` lies outside the tracked span.
    pub fn insert(
        &mut self,
        address: usize,
        size: usize,
        new_type: RegionType,
        new_attr: u32,
        expected_old_attr: u32,
    ) -> bool {
        self.insert_impl(address, size, None, new_type, new_attr, expected_old_attr)
    }

    /// Like [`RegionTree::insert`], but the new block's pair address is
    /// given explicitly instead of being derived from the containing
    /// block. This is how the physical↔virtual pairing is established
    /// when the linearly mapped ranges are first registered; ordinary
    /// inserts only propagate it.
    pub fn insert_paired(
        &mut self,
        address: usize,
        size: usize,
        pair_address: usize,
        new_type: RegionType,
        new_attr: u32,
        expected_old_attr: u32,
    ) -> bool {
        self.insert_impl(
            address,
            size,
            Some(pair_address),
            new_type,
            new_attr,
            expected_old_attr,
        )
    }

    fn insert_impl(
        &mut self,
        address: usize,
        size: usize,
        pair_override: Option<usize>,
        new_type: RegionType,
        new_attr: u32,
        expected_old_attr: u32,
    ) -> bool {
        if size == 0 {
            return false;
        }
        // An interval whose last address wraps cannot fit in any block.
        let Some(inserted_last) = address.checked_add(size - 1) else {
            return false;
        };

        let position = self
            .position_of_containing(address)
            .unwrap_or_else(|| panic!("address {address:#x} is outside the tracked range"));
        let containing = *self.block_at(position);

        if containing.attr() != expected_old_attr {
            return false;
        }
        if inserted_last > containing.last_address() {
            return false;
        }
        if !containing.can_derive(new_type) {
            return false;
        }

        log::trace!(
            "splitting {containing} for [{address:#x}..{:#x}) {new_type:?} attr={new_attr}",
            inserted_last.wrapping_add(1),
        );

        // Erase the containing block. The arena free-list is LIFO, so the
        // first piece reinserted below recycles its slot; the remaining
        // pieces (at most two) take fresh slots.
        let handle = self.entries[position].expect("occupied entry");
        self.remove_at(position);
        self.arena.release(handle);

        let old_address = containing.address();
        let old_pair = containing.pair_address();
        let delta = address - old_address;

        // Front remainder keeps the containing block's type, attribute,
        // and pair address.
        if address != old_address {
            self.insert_block(RegionBlock::new(
                old_address,
                delta,
                old_pair,
                containing.attr(),
                containing.region_type(),
            ));
        }

        let new_pair = pair_override.or_else(|| old_pair.map(|pair| pair + delta));
        self.insert_block(RegionBlock::new(address, size, new_pair, new_attr, new_type));

        // Back remainder, with a correspondingly offset pair address.
        if inserted_last != containing.last_address() {
            let back_address = inserted_last + 1;
            let back_size = containing.last_address() - inserted_last;
            let back_pair = old_pair.map(|pair| pair + (back_address - old_address));
            self.insert_block(RegionBlock::new(
                back_address,
                back_size,
                back_pair,
                containing.attr(),
                containing.region_type(),
            ));
        }

        true
    }

    /// Returns the first block (in address order) with exactly the given
    /// type and attribute.
    ///
    /// # Panics
    ///
    /// Panics if no such block exists; the callers look up blocks they
    /// just inserted, so a miss is a boot invariant violation.
    pub fn find_first_by_type_attr(&self, region_type: RegionType, attr: u32) -> &RegionBlock {
        self.iter()
            .find(|block| block.region_type() == region_type && block.attr() == attr)
            .unwrap_or_else(|| panic!("no {region_type:?} block with attr {attr}"))
    }

    /// Returns the first block (in address order) whose type derives from
    /// `region_type`.
    ///
    /// # Panics
    ///
    /// Panics if no such block exists.
    pub fn find_first_derived(&self, region_type: RegionType) -> &RegionBlock {
        self.iter()
            .find(|block| block.is_derived_from(region_type))
            .unwrap_or_else(|| panic!("no block derived from {region_type:?}"))
    }

    /// Returns the lowest- and highest-addressed blocks whose type
    /// derives from `region_type`.
    ///
    /// # Panics
    ///
    /// Panics if no such block exists.
    pub fn derived_extents(&self, region_type: RegionType) -> RegionExtents<'_> {
        let mut first = None;
        let mut last = None;
        for block in self.iter() {
            if block.is_derived_from(region_type) {
                first.get_or_insert(block);
                last = Some(block);
            }
        }
        match (first, last) {
            (Some(first), Some(last)) => RegionExtents { first, last },
            _ => panic!("no block derived from {region_type:?}"),
        }
    }

    /// Picks a uniformly random `alignment`-aligned placement of `size`
    /// bytes that lies entirely inside a single block of exactly
    /// `region_type`.
    ///
    /// Candidates are drawn over the whole extents of the derived type
    /// and rejected if they miss an exact-type block, so fragmented
    /// spans (blocks of the type interleaved with others) are handled
    /// by resampling.
    ///
    /// # Panics
    ///
    /// Panics if the derived extents do not start aligned to `alignment`
    /// (a layout configuration invariant) or if no block of the type can
    /// fit the request at all, since sampling would then never terminate;
    /// such a request indicates a statically wrong geometry.
    pub fn random_aligned_region(
        &self,
        entropy: &mut dyn EntropySource,
        size: usize,
        alignment: usize,
        region_type: RegionType,
    ) -> usize {
        assert!(size > 0, "cannot place an empty region");
        let extents = self.derived_extents(region_type);
        let first_address = extents.first.address();
        let last_address = extents.last.last_address();
        assert!(
            align::is_aligned(first_address, alignment),
            "derived extents of {region_type:?} start misaligned to {alignment:#x}"
        );

        let feasible = self.iter().any(|block| {
            if block.region_type() != region_type {
                return false;
            }
            let Some(padded) = block.address().checked_add(alignment - 1) else {
                return false;
            };
            let start = padded & !(alignment - 1);
            match start.checked_add(size - 1) {
                Some(last) => last <= block.last_address(),
                None => false,
            }
        });
        assert!(
            feasible,
            "no feasible aligned placement of {size:#x} bytes in {region_type:?}"
        );

        loop {
            let candidate = align::align_down(
                entropy.generate_random_range(first_address, last_address),
                alignment,
            );

            let Some(candidate_last) = candidate.checked_add(size - 1) else {
                continue;
            };
            if candidate_last > last_address {
                continue;
            }

            let block = self.find_containing(candidate);
            if candidate_last > block.last_address() {
                continue;
            }
            if block.region_type() != region_type {
                continue;
            }

            return candidate;
        }
    }

    /// Adds a block to the tree, keeping the entries sorted by address.
    ///
    /// # Panics
    ///
    /// Panics if the tree or its arena is full.
    pub(crate) fn insert_block(&mut self, block: RegionBlock) {
        assert!(self.count < MAX_REGION_NODES, "region tree is full");
        let position = self.entries[..self.count]
            .partition_point(|handle| self.arena.get(handle.expect("occupied entry")).address() < block.address());
        let handle = self.arena.adopt(block);
        let mut i = self.count;
        while i > position {
            self.entries[i] = self.entries[i - 1];
            i -= 1;
        }
        self.entries[position] = Some(handle);
        self.count += 1;
    }

    fn remove_at(&mut self, position: usize) {
        for i in position..self.count - 1 {
            self.entries[i] = self.entries[i + 1];
        }
        self.entries[self.count - 1] = None;
        self.count -= 1;
    }

    fn block_at(&self, position: usize) -> &RegionBlock {
        self.arena.get(self.entries[position].expect("occupied entry"))
    }

    /// Index of the block containing `address`, if any.
    fn position_of_containing(&self, address: usize) -> Option<usize> {
        let after = self.entries[..self.count]
            .partition_point(|handle| self.arena.get(handle.expect("occupied entry")).address() <= address);
        if after == 0 {
            return None;
        }
        let position = after - 1;
        self.block_at(position).contains(address).then_some(position)
    }
}

impl Default for RegionTree {
    fn default() -> Self {
        Self::new()
    }
}
