use std::{
    ptr::NonNull,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tracing::error;

use super::{InterceptedSlot, PageProtection};
use crate::error::HookInstallError;

/// Process-wide bookkeeping for one hookable entry point.
///
/// At most one [`HookToken`] exists per registry. The saved original is kept
/// here as well so that a trampoline without any context can forward to it.
pub struct HookRegistry {
    installed: AtomicBool,
    original: AtomicUsize,
}

impl HookRegistry {
    pub const fn new() -> Self {
        Self {
            installed: AtomicBool::new(false),
            original: AtomicUsize::new(0),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// The entry point saved by the most recent install, 0 if none happened yet.
    pub fn original(&self) -> usize {
        self.original.load(Ordering::Acquire)
    }

    /// Redirects `slot` to `hook` and hands out the ownership token.
    ///
    /// # Safety
    /// `slot` must be an aligned function-pointer slot of the calling process
    /// that stays mapped for `'table`, and `hook` must have the signature of
    /// the function the slot points to.
    pub unsafe fn install<'table, P: PageProtection>(
        &'static self,
        slot: NonNull<usize>,
        hook: usize,
        protection: P,
    ) -> Result<HookToken<'table, P>, HookInstallError> {
        if self
            .installed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HookInstallError::AlreadyInstalled);
        }

        let current = slot.as_ptr().read_volatile();
        if current == hook {
            self.installed.store(false, Ordering::Release);
            return Err(HookInstallError::AlreadyPatched {
                address: slot.as_ptr() as usize,
            });
        }
        // published before the slot is patched so the hook can forward right away
        self.original.store(current, Ordering::Release);

        match InterceptedSlot::patch(slot, hook, &protection) {
            Ok(slot) => Ok(HookToken {
                registry: self,
                slot,
                protection,
            }),
            Err(err) => {
                self.installed.store(false, Ordering::Release);
                Err(err)
            }
        }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of owning the installed hook of a [`HookRegistry`].
///
/// Dropping the token restores the slot and releases the registry.
pub struct HookToken<'table, P: PageProtection> {
    registry: &'static HookRegistry,
    slot: InterceptedSlot<'table>,
    protection: P,
}

impl<'table, P: PageProtection> HookToken<'table, P> {
    pub fn slot(&self) -> &InterceptedSlot<'table> {
        &self.slot
    }

    pub fn original(&self) -> usize {
        self.slot.original()
    }

    pub fn restore(&mut self) -> Result<(), HookInstallError> {
        self.slot.restore(&self.protection)
    }
}

impl<'table, P: PageProtection> Drop for HookToken<'table, P> {
    fn drop(&mut self) {
        if let Err(err) = self.slot.restore(&self.protection) {
            // the slot still routes through the hook, so the registry stays claimed
            error!("Failed to restore slot {:#x}: {}", self.slot.address(), err);
            return;
        }
        self.registry.installed.store(false, Ordering::Release);
    }
}
