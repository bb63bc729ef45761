use std::{marker::PhantomData, mem::size_of, ptr::NonNull};

use tracing::debug;

use super::{PageProtection, PAGE_EXECUTE_READWRITE};
use crate::error::HookInstallError;

/// Unprotects one pointer-sized slot, stores `value`, and puts the previous
/// protection back. If the protection cannot be put back the slot gets
/// `rollback` again. Returns the protection flags that were restored.
///
/// # Safety
/// `slot` must be aligned and point into mapped memory of the calling process.
unsafe fn write_slot(
    slot: NonNull<usize>,
    value: usize,
    rollback: usize,
    protection: &impl PageProtection,
) -> Result<u32, HookInstallError> {
    let address = slot.as_ptr() as usize;
    let size = size_of::<usize>();
    let old = protection
        .protect(address, size, PAGE_EXECUTE_READWRITE)
        .map_err(|source| HookInstallError::Protect { address, source })?;
    slot.as_ptr().write_volatile(value);
    if let Err(source) = protection.protect(address, size, old) {
        slot.as_ptr().write_volatile(rollback);
        return Err(HookInstallError::Protect { address, source });
    }
    Ok(old)
}

/// A dispatch table slot redirected to a replacement function.
///
/// This is the only place that writes into table memory. The saved original
/// is taken once, when the slot is patched, and is what `restore` writes back.
pub struct InterceptedSlot<'table> {
    slot: NonNull<usize>,
    original: usize,
    protection: u32,
    patched: bool,
    _table: PhantomData<&'table mut usize>,
}

impl<'table> InterceptedSlot<'table> {
    /// # Safety
    /// `slot` must be an aligned function-pointer slot of the calling process
    /// that stays mapped for `'table`.
    pub unsafe fn patch(
        slot: NonNull<usize>,
        replacement: usize,
        protection: &impl PageProtection,
    ) -> Result<Self, HookInstallError> {
        let original = slot.as_ptr().read_volatile();
        let restored = write_slot(slot, replacement, original, protection)?;
        debug!(
            "patched slot {:#x}: {:#x} -> {:#x}",
            slot.as_ptr() as usize,
            original,
            replacement
        );
        Ok(Self {
            slot,
            original,
            protection: restored,
            patched: true,
            _table: PhantomData,
        })
    }

    pub fn address(&self) -> usize {
        self.slot.as_ptr() as usize
    }

    pub fn original(&self) -> usize {
        self.original
    }

    /// Protection flags the slot's page had outside of our writes.
    pub fn protection(&self) -> u32 {
        self.protection
    }

    pub fn is_patched(&self) -> bool {
        self.patched
    }

    pub fn current(&self) -> usize {
        unsafe { self.slot.as_ptr().read_volatile() }
    }

    /// Writes the saved original back. Does nothing once restored.
    pub fn restore(&mut self, protection: &impl PageProtection) -> Result<(), HookInstallError> {
        if !self.patched {
            return Ok(());
        }
        let current = self.current();
        self.protection = unsafe { write_slot(self.slot, self.original, current, protection) }?;
        self.patched = false;
        debug!("restored slot {:#x} to {:#x}", self.address(), self.original);
        Ok(())
    }
}
