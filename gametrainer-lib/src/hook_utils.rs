mod hook_registry;
mod intercepted_slot;

use std::io;

pub use hook_registry::{HookRegistry, HookToken};
pub use intercepted_slot::InterceptedSlot;

/// `PAGE_EXECUTE_READWRITE`
pub const PAGE_EXECUTE_READWRITE: u32 = 0x40;

/// Changes the protection of a range in the calling process.
pub trait PageProtection {
    /// Applies `flags` and returns the flags that were in effect before.
    fn protect(&self, address: usize, size: usize, flags: u32) -> io::Result<u32>;
}

impl<T: PageProtection + ?Sized> PageProtection for &T {
    fn protect(&self, address: usize, size: usize, flags: u32) -> io::Result<u32> {
        (**self).protect(address, size, flags)
    }
}
