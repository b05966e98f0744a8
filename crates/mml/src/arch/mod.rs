//! Architecture-specific constants and services.
//!
//! This module conditionally selects the hardware implementation for the
//! target architecture, or a permissive software variant for tests and
//! unsupported targets.

// Use the x86_64 hardware implementation when targeting x86_64 outside of
// tests. NOTE: the module is included during tests too so that
// rust-analyzer can see it.
#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(test)))]
pub use x86_64::*;

#[cfg(any(test, not(target_arch = "x86_64")))]
mod software;
#[cfg(any(test, not(target_arch = "x86_64")))]
pub use software::*;
