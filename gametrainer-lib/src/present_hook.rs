use std::{
    ffi::c_void,
    mem::transmute,
    panic::{self, AssertUnwindSafe},
    ptr::NonNull,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use tracing::{error, info};

#[cfg(target_os = "windows")]
use crate::{swap_chain_probe::ProbeSession, win_api_wrappers::VirtualProtection};
use crate::{
    error::HookInstallError,
    hook_utils::{HookRegistry, HookToken, PageProtection},
};

/// Slot of `IDXGISwapChain::Present`: 3 `IUnknown`, 4 `IDXGIObject` and
/// 1 `IDXGIDeviceSubObject` methods come first.
pub const PRESENT_VTABLE_INDEX: usize = 8;

/// `DXGI_ERROR_INVALID_CALL`
const DXGI_ERROR_INVALID_CALL: i32 = 0x887A0001_u32 as i32;

pub type PresentFn =
    unsafe extern "system" fn(swap_chain: *mut c_void, sync_interval: u32, flags: u32) -> i32;

/// Arguments of one intercepted `Present`.
#[derive(Clone, Copy, Debug)]
pub struct PresentCall {
    pub swap_chain: *mut c_void,
    pub sync_interval: u32,
    pub flags: u32,
    /// 1-based count of frames seen by the hook.
    pub frame: u64,
}

/// Per-frame logic. Runs on the render thread, so it must return quickly.
pub type FrameCallback = fn(&PresentCall);

static PRESENT_HOOK: HookRegistry = HookRegistry::new();
static FRAME_CALLBACK: AtomicUsize = AtomicUsize::new(0);
static PRESENTED_FRAMES: AtomicU64 = AtomicU64::new(0);

pub fn set_frame_callback(callback: Option<FrameCallback>) {
    FRAME_CALLBACK.store(callback.map_or(0, |f| f as usize), Ordering::Release);
}

pub fn has_frame_callback() -> bool {
    FRAME_CALLBACK.load(Ordering::Acquire) != 0
}

pub fn presented_frames() -> u64 {
    PRESENTED_FRAMES.load(Ordering::Relaxed)
}

fn run_frame_callback(call: &PresentCall) {
    let raw = FRAME_CALLBACK.load(Ordering::Acquire);
    if raw == 0 {
        return;
    }
    let callback = unsafe { transmute::<usize, FrameCallback>(raw) };
    if panic::catch_unwind(AssertUnwindSafe(|| callback(call))).is_err() {
        let _ = FRAME_CALLBACK.compare_exchange(raw, 0, Ordering::AcqRel, Ordering::Acquire);
        error!("Frame callback panicked on frame {} and was removed", call.frame);
    }
}

/// Replacement for `IDXGISwapChain::Present`.
///
/// # Safety
/// Only meant to be reached through a patched dispatch table slot.
pub unsafe extern "system" fn hooked_present(
    swap_chain: *mut c_void,
    sync_interval: u32,
    flags: u32,
) -> i32 {
    let frame = PRESENTED_FRAMES.fetch_add(1, Ordering::Relaxed) + 1;
    run_frame_callback(&PresentCall {
        swap_chain,
        sync_interval,
        flags,
        frame,
    });

    let original = PRESENT_HOOK.original();
    if original == 0 {
        return DXGI_ERROR_INVALID_CALL;
    }
    let original = transmute::<usize, PresentFn>(original);
    original(swap_chain, sync_interval, flags)
}

/// Owner of the `Present` interception.
///
/// The borrow on the probed table keeps the probe session alive for as long
/// as the hook is installed.
pub struct PresentHook<'probe, P: PageProtection> {
    token: Option<HookToken<'probe, P>>,
}

impl<'probe, P: PageProtection> PresentHook<'probe, P> {
    pub fn new() -> Self {
        Self { token: None }
    }

    pub fn is_installed(&self) -> bool {
        self.token.is_some()
    }

    /// The entry point calls are forwarded to while installed.
    pub fn original(&self) -> Option<usize> {
        self.token.as_ref().map(|token| token.original())
    }

    /// # Safety
    /// `vtable` must be the dispatch table of a swap chain of the calling
    /// process, or any table whose slot [`PRESENT_VTABLE_INDEX`] holds a
    /// [`PresentFn`], and must stay mapped for `'probe`.
    pub unsafe fn install_into(
        &mut self,
        vtable: NonNull<usize>,
        protection: P,
    ) -> Result<(), HookInstallError> {
        if self.token.is_some() {
            return Err(HookInstallError::AlreadyInstalled);
        }
        let slot = NonNull::new_unchecked(vtable.as_ptr().add(PRESENT_VTABLE_INDEX));
        let token = PRESENT_HOOK.install(slot, hooked_present as PresentFn as usize, protection)?;
        info!(
            "Present hook installed at {:#x} (original {:#x})",
            token.slot().address(),
            token.original()
        );
        self.token = Some(token);
        Ok(())
    }

    /// Puts the original entry point back. Succeeds without doing anything
    /// when nothing is installed.
    pub fn remove(&mut self) -> Result<(), HookInstallError> {
        let Some(token) = self.token.as_mut() else {
            return Ok(());
        };
        token.restore()?;
        self.token = None;
        info!("Present hook removed");
        Ok(())
    }
}

#[cfg(target_os = "windows")]
impl<'probe> PresentHook<'probe, VirtualProtection> {
    pub fn install(&mut self, probe: &'probe ProbeSession) -> Result<(), HookInstallError> {
        unsafe { self.install_into(probe.vtable(), VirtualProtection) }
    }
}

impl<'probe, P: PageProtection> Default for PresentHook<'probe, P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes the tests that go through the process-wide hook.
#[cfg(test)]
pub(crate) fn lock_hook_for_test() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::hook_utils::testing::RecordingProtection;

    /// `DXGI_STATUS_OCCLUDED`
    const OCCLUDED: i32 = 0x087A0001;

    static FAKE_CALLS: AtomicU32 = AtomicU32::new(0);
    static CALLBACK_CALLS: AtomicU32 = AtomicU32::new(0);

    unsafe extern "system" fn fake_present(
        swap_chain: *mut c_void,
        sync_interval: u32,
        flags: u32,
    ) -> i32 {
        assert_eq!(swap_chain as usize, 0x1234);
        assert_eq!((sync_interval, flags), (1, 0));
        FAKE_CALLS.fetch_add(1, Ordering::SeqCst);
        OCCLUDED
    }

    fn counting_callback(call: &PresentCall) {
        assert_eq!(call.sync_interval, 1);
        CALLBACK_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn panicking_callback(_: &PresentCall) {
        panic!("callback failure");
    }

    fn present_through(vtable: NonNull<usize>) -> i32 {
        unsafe {
            let entry = vtable.as_ptr().add(PRESENT_VTABLE_INDEX).read_volatile();
            let present = transmute::<usize, PresentFn>(entry);
            present(0x1234 as *mut c_void, 1, 0)
        }
    }

    fn snapshot(vtable: NonNull<usize>, len: usize) -> Vec<usize> {
        (0..len)
            .map(|i| unsafe { vtable.as_ptr().add(i).read() })
            .collect()
    }

    #[test]
    fn test_present_hook_lifecycle() {
        let _guard = lock_hook_for_test();
        let mut table: Box<[usize; 18]> = Box::new(std::array::from_fn(|i| 0x1000 + i));
        table[PRESENT_VTABLE_INDEX] = fake_present as PresentFn as usize;
        let vtable = NonNull::new(table.as_mut_ptr()).unwrap();
        let before = snapshot(vtable, 18);

        let mut hook = PresentHook::new();
        unsafe { hook.install_into(vtable, RecordingProtection::default()) }.unwrap();
        assert!(hook.is_installed());
        assert_eq!(hook.original(), Some(fake_present as PresentFn as usize));

        // rejected both through the same owner and through another one
        let again = unsafe { hook.install_into(vtable, RecordingProtection::default()) };
        assert!(matches!(again, Err(HookInstallError::AlreadyInstalled)));
        let mut other = PresentHook::new();
        let other_result = unsafe { other.install_into(vtable, RecordingProtection::default()) };
        assert!(matches!(other_result, Err(HookInstallError::AlreadyInstalled)));
        assert_eq!(hook.original(), Some(fake_present as PresentFn as usize));

        let frames = presented_frames();
        assert_eq!(present_through(vtable), OCCLUDED);
        assert_eq!(FAKE_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(presented_frames(), frames + 1);

        set_frame_callback(Some(counting_callback));
        assert_eq!(present_through(vtable), OCCLUDED);
        assert_eq!(CALLBACK_CALLS.load(Ordering::SeqCst), 1);

        set_frame_callback(Some(panicking_callback));
        assert_eq!(present_through(vtable), OCCLUDED);
        assert!(!has_frame_callback());
        assert_eq!(FAKE_CALLS.load(Ordering::SeqCst), 3);

        hook.remove().unwrap();
        assert!(!hook.is_installed());
        assert_eq!(snapshot(vtable, 18), before);
        hook.remove().unwrap();

        assert_eq!(present_through(vtable), OCCLUDED);
        assert_eq!(FAKE_CALLS.load(Ordering::SeqCst), 4);
        assert_eq!(presented_frames(), frames + 3);

        // the registry is free again
        unsafe { other.install_into(vtable, RecordingProtection::default()) }.unwrap();
        other.remove().unwrap();
        assert_eq!(snapshot(vtable, 18), before);
    }

    #[test]
    fn test_remove_without_install_is_noop() {
        let mut hook = PresentHook::<RecordingProtection>::new();
        assert!(hook.remove().is_ok());
        assert!(!hook.is_installed());
    }
}
