use std::io::ErrorKind;

use tracing::{debug, warn};

#[cfg(target_os = "windows")]
use crate::win_api_wrappers::WinProcessApi;
use crate::{
    error::{AttachError, ResolveError, TransferError},
    find_process_id::find_process_id,
    process_api::ProcessApi,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressWidth {
    Bits32,
    Bits64,
}

impl AddressWidth {
    pub fn pointer_size(self) -> usize {
        match self {
            AddressWidth::Bits32 => 4,
            AddressWidth::Bits64 => 8,
        }
    }
}

/// Exclusive access to another process.
///
/// The handle lives exactly as long as the session is attached. Sessions are
/// never cloned; moving one moves the handle with it.
pub struct ProcessSession<A: ProcessApi> {
    api: A,
    handle: Option<A::Handle>,
    process_id: u32,
    address_width: AddressWidth,
}

impl<A: ProcessApi> ProcessSession<A> {
    pub fn attach_by_name(api: A, exe_file: &str) -> Result<Self, AttachError> {
        let process_id = find_process_id(&api, exe_file)?
            .ok_or_else(|| AttachError::ProcessNotFound(exe_file.to_owned()))?;
        Self::attach(api, process_id)
    }

    pub fn attach(api: A, process_id: u32) -> Result<Self, AttachError> {
        if process_id == 0 {
            return Err(AttachError::ProcessNotFound("process id 0".to_owned()));
        }
        let handle = api
            .open_process(process_id)
            .map_err(|source| match source.kind() {
                ErrorKind::PermissionDenied => AttachError::AccessDenied { process_id },
                ErrorKind::InvalidInput | ErrorKind::NotFound => {
                    AttachError::ProcessNotFound(format!("process id {}", process_id))
                }
                _ => AttachError::OpenFailed { process_id, source },
            })?;

        let address_width = match api.is_wow64(&handle) {
            Ok(true) => AddressWidth::Bits32,
            Ok(false) => AddressWidth::Bits64,
            Err(err) => {
                warn!("Failed to query bitness of {}: {}", process_id, err);
                AddressWidth::Bits32
            }
        };
        debug!("attached to {} ({:?})", process_id, address_width);

        Ok(Self {
            api,
            handle: Some(handle),
            process_id,
            address_width,
        })
    }

    /// Releases the handle. Calling it again does nothing.
    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle);
            debug!("detached from {}", self.process_id);
        }
        self.process_id = 0;
        self.address_width = AddressWidth::Bits32;
    }

    /// 0 once detached.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn address_width(&self) -> AddressWidth {
        self.address_width
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    pub fn module_base(&self, module_name: &str) -> Result<usize, ResolveError> {
        let handle = self.handle()?;
        self.api
            .module_base(handle, module_name)
            .map_err(ResolveError::Modules)?
            .ok_or_else(|| ResolveError::ModuleNotFound(module_name.to_owned()))
    }

    pub(crate) fn api(&self) -> &A {
        &self.api
    }

    pub(crate) fn handle(&self) -> Result<&A::Handle, TransferError> {
        self.handle.as_ref().ok_or(TransferError::Detached)
    }
}

impl<A: ProcessApi> Drop for ProcessSession<A> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(target_os = "windows")]
pub type ExternalProcess = ProcessSession<WinProcessApi>;

#[cfg(target_os = "windows")]
impl ProcessSession<WinProcessApi> {
    pub fn open(process_id: u32) -> Result<Self, AttachError> {
        Self::attach(WinProcessApi, process_id)
    }

    pub fn open_by_name(exe_file: &str) -> Result<Self, AttachError> {
        Self::attach_by_name(WinProcessApi, exe_file)
    }
}
