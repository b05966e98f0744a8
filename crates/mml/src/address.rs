//! Address types for physical and virtual memory.
//!
//! These newtypes wrap the architecture-dependent representation of an
//! address and are used at the layout and platform-service boundaries.
//! The region trees themselves operate on raw `usize` values, since the
//! same tree type tracks both address spaces.

use core::fmt;
use core::ops::{Add, Sub};

/// Macro to define functionality common to both address types.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                crate::align::is_aligned(self.0, align)
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                Self(crate::align::align_down(self.0, align))
            }

            /// Aligns the address up to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two or the result
            /// overflows.
            #[inline]
            pub const fn align_up(self, align: usize) -> Self {
                Self(crate::align::align_up(self.0, align))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(addr: usize) -> Self {
                Self::new(addr)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Newtype wrapper validated against the architecture's maximum physical\n\
     address width."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the architecture's maximum physical
    /// address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            crate::arch::validate_physical(addr),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     Newtype wrapper validated for canonical form on architectures that\n\
     require it."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address is not canonical for the architecture.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            crate::arch::validate_virtual(addr),
            "address is not canonical"
        );
        Self(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod physical_address {
        use super::*;

        #[test]
        fn round_trips_raw_value() {
            let addr = PhysicalAddress::new(0x8000_0000);
            assert_eq!(addr.as_usize(), 0x8000_0000);
        }

        #[test]
        fn alignment() {
            let addr = PhysicalAddress::new(0x8000_0123);
            assert!(!addr.is_aligned(0x1000));
            assert_eq!(addr.align_down(0x1000).as_usize(), 0x8000_0000);
            assert_eq!(addr.align_up(0x1000).as_usize(), 0x8000_1000);
        }

        #[test]
        fn arithmetic() {
            let addr = PhysicalAddress::new(0x1000);
            assert_eq!((addr + 0x234).as_usize(), 0x1234);
            assert_eq!((addr - 0x800).as_usize(), 0x800);
            assert_eq!(addr + 0x1000 - addr, 0x1000);
        }

        #[test]
        #[should_panic(expected = "maximum width")]
        fn rejects_out_of_width_address() {
            let _ = PhysicalAddress::new(usize::MAX);
        }
    }

    mod virtual_address {
        use super::*;

        #[test]
        fn round_trips_raw_value() {
            let addr = VirtualAddress::new(0x4000_1000);
            assert_eq!(addr.as_usize(), 0x4000_1000);
        }

        #[test]
        fn formatting() {
            let addr = VirtualAddress::new(0xdead_b000);
            assert_eq!(format!("{addr}"), "0xdeadb000");
            assert_eq!(format!("{addr:?}"), "VirtualAddress(0xdeadb000)");
        }
    }
}
