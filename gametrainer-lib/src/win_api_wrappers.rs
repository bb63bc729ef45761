use std::{ffi::c_void, io, mem::size_of};

use tracing::warn;
use windows::Win32::{
    Foundation::{CloseHandle, BOOL, ERROR_NO_MORE_FILES, FALSE, HANDLE},
    System::{
        Diagnostics::{
            Debug::{ReadProcessMemory, WriteProcessMemory},
            ToolHelp::{
                CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, Process32FirstW,
                Process32NextW, MODULEENTRY32W, PROCESSENTRY32W, TH32CS_SNAPMODULE,
                TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
            },
        },
        Memory::{VirtualProtect, PAGE_PROTECTION_FLAGS},
        Threading::{
            GetProcessId, IsWow64Process, OpenProcess, PROCESS_QUERY_INFORMATION,
            PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
        },
    },
};

use crate::{
    hook_utils::PageProtection,
    process_api::{ProcessApi, ProcessEntry},
};

const FACILITY_WIN32_MASK: u32 = 0xFFFF_0000;
const FACILITY_WIN32_PREFIX: u32 = 0x8007_0000;

/// Maps a Win32-facility HRESULT back to its OS error code so the
/// `io::ErrorKind` survives (access denied, invalid parameter, ...).
pub(crate) fn to_io_error(err: windows::core::Error) -> io::Error {
    let code = err.code().0 as u32;
    if code & FACILITY_WIN32_MASK == FACILITY_WIN32_PREFIX {
        io::Error::from_raw_os_error((code & 0xFFFF) as i32)
    } else {
        io::Error::other(err)
    }
}

/// An owned kernel handle, closed on drop.
pub struct SafeHandle(HANDLE);

impl SafeHandle {
    pub(crate) fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for SafeHandle {
    fn drop(&mut self) {
        if let Err(err) = unsafe { CloseHandle(self.0) } {
            warn!("CloseHandle failed: {}", err);
        }
    }
}

fn from_wide(chars: &[u16]) -> String {
    let len = chars.iter().position(|&c| c == 0).unwrap_or(chars.len());
    String::from_utf16_lossy(&chars[..len])
}

/// `Ok(false)` once a ToolHelp walk runs out of entries.
fn next_entry(result: windows::core::Result<()>) -> io::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.code() == ERROR_NO_MORE_FILES.to_hresult() => Ok(false),
        Err(err) => Err(to_io_error(err)),
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WinProcessApi;

impl ProcessApi for WinProcessApi {
    type Handle = SafeHandle;

    fn process_entries(&self) -> io::Result<Vec<ProcessEntry>> {
        let snapshot = SafeHandle(
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }.map_err(to_io_error)?,
        );
        let mut pe = PROCESSENTRY32W {
            dwSize: size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut entries = Vec::new();
        let mut more = next_entry(unsafe { Process32FirstW(snapshot.raw(), &mut pe) })?;
        while more {
            entries.push(ProcessEntry::new(pe.th32ProcessID, from_wide(&pe.szExeFile)));
            more = next_entry(unsafe { Process32NextW(snapshot.raw(), &mut pe) })?;
        }
        Ok(entries)
    }

    fn open_process(&self, process_id: u32) -> io::Result<SafeHandle> {
        let handle = unsafe {
            OpenProcess(
                PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION,
                FALSE,
                process_id,
            )
        }
        .map_err(to_io_error)?;
        Ok(SafeHandle(handle))
    }

    fn is_wow64(&self, handle: &SafeHandle) -> io::Result<bool> {
        let mut wow64 = BOOL::default();
        unsafe { IsWow64Process(handle.raw(), &mut wow64) }.map_err(to_io_error)?;
        Ok(wow64.as_bool())
    }

    /// Walks a ToolHelp module snapshot, which lists the 32-bit modules of a
    /// WOW64 target as well.
    fn module_base(&self, handle: &SafeHandle, module_name: &str) -> io::Result<Option<usize>> {
        let process_id = unsafe { GetProcessId(handle.raw()) };
        if process_id == 0 {
            return Err(io::Error::last_os_error());
        }
        let snapshot = SafeHandle(
            unsafe {
                CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, process_id)
            }
            .map_err(to_io_error)?,
        );
        let mut me = MODULEENTRY32W {
            dwSize: size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };
        let mut more = next_entry(unsafe { Module32FirstW(snapshot.raw(), &mut me) })?;
        while more {
            if from_wide(&me.szModule).eq_ignore_ascii_case(module_name) {
                return Ok(Some(me.modBaseAddr as usize));
            }
            more = next_entry(unsafe { Module32NextW(snapshot.raw(), &mut me) })?;
        }
        Ok(None)
    }

    fn read_memory(&self, handle: &SafeHandle, address: usize, buffer: &mut [u8]) -> io::Result<usize> {
        let mut read = 0;
        unsafe {
            ReadProcessMemory(
                handle.raw(),
                address as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                buffer.len(),
                Some(&mut read),
            )
        }
        .map_err(to_io_error)?;
        Ok(read)
    }

    fn write_memory(&self, handle: &SafeHandle, address: usize, buffer: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        unsafe {
            WriteProcessMemory(
                handle.raw(),
                address as *const c_void,
                buffer.as_ptr() as *const c_void,
                buffer.len(),
                Some(&mut written),
            )
        }
        .map_err(to_io_error)?;
        Ok(written)
    }
}

/// `VirtualProtect` on the calling process.
#[derive(Clone, Copy, Debug, Default)]
pub struct VirtualProtection;

impl PageProtection for VirtualProtection {
    fn protect(&self, address: usize, size: usize, flags: u32) -> io::Result<u32> {
        let mut old = PAGE_PROTECTION_FLAGS::default();
        unsafe {
            VirtualProtect(
                address as *const c_void,
                size,
                PAGE_PROTECTION_FLAGS(flags),
                &mut old,
            )
        }
        .map_err(to_io_error)?;
        Ok(old.0)
    }
}

#[cfg(test)]
mod tests {
    use std::{process, ptr::NonNull};

    use windows::{
        core::w,
        Win32::{
            Foundation::E_ACCESSDENIED,
            System::{
                LibraryLoader::GetModuleHandleW,
                Memory::{
                    VirtualAlloc, VirtualFree, VirtualQuery, MEMORY_BASIC_INFORMATION, MEM_COMMIT,
                    MEM_RELEASE, MEM_RESERVE, PAGE_READONLY, PAGE_READWRITE,
                },
            },
        },
    };

    use super::*;
    use crate::{
        error::{HookInstallError, TransferError},
        hook_utils::PageProtection,
        memory_accessors::MemoryAccessor,
        present_hook::{
            hooked_present, lock_hook_for_test, PresentFn, PresentHook, PRESENT_VTABLE_INDEX,
        },
        process_session::{AddressWidth, ProcessSession},
    };

    #[test]
    fn test_process_entries_contains_current_process() {
        let entries = WinProcessApi.process_entries().unwrap();
        assert!(entries.iter().any(|e| e.process_id == process::id()));
    }

    #[test]
    fn test_to_io_error_keeps_access_denied() {
        let err = windows::core::Error::from(E_ACCESSDENIED);
        assert_eq!(to_io_error(err).kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_attach_to_current_process() {
        let mut target = Box::new(0x1234_5678u32);
        let address = &mut *target as *mut u32 as usize;
        let session = ProcessSession::attach(WinProcessApi, process::id()).unwrap();
        assert_eq!(
            session.address_width(),
            if cfg!(target_pointer_width = "64") {
                AddressWidth::Bits64
            } else {
                AddressWidth::Bits32
            }
        );

        assert_eq!(session.read_u32(address).unwrap(), 0x1234_5678);
        session.write_u32(address, 0xcafe_f00d).unwrap();
        assert_eq!(unsafe { (address as *const u32).read_volatile() }, 0xcafe_f00d);
        assert!(matches!(session.read_u8(0), Err(TransferError::Os { .. })));
    }

    #[test]
    fn test_module_base_of_current_executable() {
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_str().unwrap().to_uppercase();
        let session = ProcessSession::attach(WinProcessApi, process::id()).unwrap();
        assert_ne!(session.module_base(&name).unwrap(), 0);
    }

    #[test]
    fn test_module_base_finds_loaded_dll() {
        let kernel32 = unsafe { GetModuleHandleW(w!("kernel32.dll")) }.unwrap();
        let session = ProcessSession::attach(WinProcessApi, process::id()).unwrap();
        assert_eq!(session.module_base("KERNEL32.DLL").unwrap(), kernel32.0 as usize);
        assert!(session.module_base("no-such-module.dll").is_err());
    }

    #[test]
    fn test_snapshot_walk_errors() {
        let end = windows::core::Error::from(ERROR_NO_MORE_FILES.to_hresult());
        assert!(!next_entry(Err(end)).unwrap());
        assert!(next_entry(Ok(())).unwrap());
        let denied = next_entry(Err(windows::core::Error::from(E_ACCESSDENIED)));
        assert_eq!(denied.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }

    fn protection_of(address: usize) -> u32 {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        let len = unsafe {
            VirtualQuery(
                Some(address as *const c_void),
                &mut info,
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        assert_ne!(len, 0);
        info.Protect.0
    }

    unsafe extern "system" fn table_present(_: *mut c_void, _: u32, _: u32) -> i32 {
        0
    }

    #[test]
    fn test_install_into_read_only_table() {
        let _guard = lock_hook_for_test();
        let page = unsafe { VirtualAlloc(None, 0x1000, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
        let vtable = NonNull::new(page as *mut usize).unwrap();
        for i in 0..16 {
            unsafe { vtable.as_ptr().add(i).write(0x1000 + i) };
        }
        let original = table_present as PresentFn as usize;
        unsafe { vtable.as_ptr().add(PRESENT_VTABLE_INDEX).write(original) };
        let before: Vec<usize> = (0..16).map(|i| unsafe { vtable.as_ptr().add(i).read() }).collect();
        let slot = unsafe { vtable.as_ptr().add(PRESENT_VTABLE_INDEX) } as usize;
        VirtualProtection
            .protect(page as usize, 0x1000, PAGE_READONLY.0)
            .unwrap();

        let mut hook = PresentHook::new();
        unsafe { hook.install_into(vtable, VirtualProtection) }.unwrap();
        assert_eq!(
            unsafe { (slot as *const usize).read_volatile() },
            hooked_present as PresentFn as usize
        );
        assert_eq!(protection_of(slot), PAGE_READONLY.0);
        assert!(matches!(
            unsafe { hook.install_into(vtable, VirtualProtection) },
            Err(HookInstallError::AlreadyInstalled)
        ));
        assert_eq!(hook.original(), Some(original));

        hook.remove().unwrap();
        let after: Vec<usize> = (0..16).map(|i| unsafe { vtable.as_ptr().add(i).read() }).collect();
        assert_eq!(after, before);
        assert_eq!(protection_of(slot), PAGE_READONLY.0);

        unsafe { VirtualFree(page, 0, MEM_RELEASE) }.unwrap();
    }
}
