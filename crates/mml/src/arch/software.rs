//! Software fallback for tests and unsupported targets.

/// Page size in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of bits in a physical address.
pub const MAX_PHYSICAL_BITS: usize = 52;

/// Validates a physical address against the maximum address width.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    addr <= (1usize << MAX_PHYSICAL_BITS) - 1
}

/// Hosted targets impose no canonicality requirement.
#[inline]
pub const fn validate_virtual(_addr: usize) -> bool {
    true
}
