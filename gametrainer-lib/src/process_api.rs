use std::io;

/// One row of the OS process table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessEntry {
    pub process_id: u32,
    pub exe_file: String,
}

impl ProcessEntry {
    pub fn new(process_id: u32, exe_file: impl Into<String>) -> Self {
        Self {
            process_id,
            exe_file: exe_file.into(),
        }
    }
}

/// The operating system primitives a trainer needs from the host.
///
/// Handles close when dropped, so a session only has to let go of its handle
/// to release it.
pub trait ProcessApi {
    type Handle;

    fn process_entries(&self) -> io::Result<Vec<ProcessEntry>>;

    /// Opens `process_id` with VM read, VM write, VM operation and query rights.
    fn open_process(&self, process_id: u32) -> io::Result<Self::Handle>;

    /// Whether the process is a 32-bit process running under a 64-bit OS.
    fn is_wow64(&self, handle: &Self::Handle) -> io::Result<bool>;

    fn module_base(&self, handle: &Self::Handle, module_name: &str) -> io::Result<Option<usize>>;

    /// Returns the number of bytes the OS reports as transferred.
    fn read_memory(&self, handle: &Self::Handle, address: usize, buffer: &mut [u8])
        -> io::Result<usize>;

    /// Returns the number of bytes the OS reports as transferred.
    fn write_memory(&self, handle: &Self::Handle, address: usize, buffer: &[u8])
        -> io::Result<usize>;
}

impl<T: ProcessApi + ?Sized> ProcessApi for &T {
    type Handle = T::Handle;

    fn process_entries(&self) -> io::Result<Vec<ProcessEntry>> {
        (**self).process_entries()
    }

    fn open_process(&self, process_id: u32) -> io::Result<Self::Handle> {
        (**self).open_process(process_id)
    }

    fn is_wow64(&self, handle: &Self::Handle) -> io::Result<bool> {
        (**self).is_wow64(handle)
    }

    fn module_base(&self, handle: &Self::Handle, module_name: &str) -> io::Result<Option<usize>> {
        (**self).module_base(handle, module_name)
    }

    fn read_memory(
        &self,
        handle: &Self::Handle,
        address: usize,
        buffer: &mut [u8],
    ) -> io::Result<usize> {
        (**self).read_memory(handle, address, buffer)
    }

    fn write_memory(&self, handle: &Self::Handle, address: usize, buffer: &[u8]) -> io::Result<usize> {
        (**self).write_memory(handle, address, buffer)
    }
}
