//! In-memory stand-in for the OS process primitives.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashSet},
    io,
    rc::Rc,
};

use crate::process_api::{ProcessApi, ProcessEntry};

pub const PAGE_SIZE: usize = 0x1000;

fn page_of(address: usize) -> usize {
    address & !(PAGE_SIZE - 1)
}

fn partial_copy() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "only part of a request was completed")
}

pub struct FakeHandle {
    pub process_id: u32,
    closed: Rc<Cell<u32>>,
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.closed.set(self.closed.get() + 1);
    }
}

/// A single fake address space shared by every process of the table.
#[derive(Default)]
pub struct FakeProcessApi {
    entries: Vec<ProcessEntry>,
    snapshot_fails: bool,
    denied: HashSet<u32>,
    wow64: HashSet<u32>,
    wow64_query_fails: bool,
    modules: Vec<(String, usize)>,
    pages: RefCell<BTreeMap<usize, Vec<u8>>>,
    short_transfer: Option<usize>,
    opened: Cell<u32>,
    closed: Rc<Cell<u32>>,
    memory_calls: Cell<u32>,
}

impl FakeProcessApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, process_id: u32, exe_file: &str) -> Self {
        self.entries.push(ProcessEntry::new(process_id, exe_file));
        self
    }

    pub fn with_snapshot_failure(mut self) -> Self {
        self.snapshot_fails = true;
        self
    }

    pub fn with_denied(mut self, process_id: u32) -> Self {
        self.denied.insert(process_id);
        self
    }

    pub fn with_wow64(mut self, process_id: u32) -> Self {
        self.wow64.insert(process_id);
        self
    }

    pub fn with_wow64_query_failure(mut self) -> Self {
        self.wow64_query_fails = true;
        self
    }

    pub fn with_module(mut self, name: &str, base: usize) -> Self {
        self.modules.push((name.to_owned(), base));
        self
    }

    /// Maps zeroed pages covering `address..address + len`.
    pub fn with_mapped(self, address: usize, len: usize) -> Self {
        {
            let mut pages = self.pages.borrow_mut();
            let mut page = page_of(address);
            while page < address + len {
                pages.entry(page).or_insert_with(|| vec![0; PAGE_SIZE]);
                page += PAGE_SIZE;
            }
        }
        self
    }

    pub fn with_memory(self, address: usize, bytes: &[u8]) -> Self {
        let this = self.with_mapped(address, bytes.len());
        this.poke(address, bytes);
        this
    }

    /// Every transfer reports success but moves at most `limit` bytes.
    pub fn with_short_transfers(mut self, limit: usize) -> Self {
        self.short_transfer = Some(limit);
        self
    }

    pub fn open_count(&self) -> u32 {
        self.opened.get()
    }

    pub fn close_count(&self) -> u32 {
        self.closed.get()
    }

    pub fn memory_calls(&self) -> u32 {
        self.memory_calls.get()
    }

    pub fn peek(&self, address: usize, len: usize) -> Vec<u8> {
        let pages = self.pages.borrow();
        (address..address + len)
            .map(|a| pages[&page_of(a)][a - page_of(a)])
            .collect()
    }

    pub fn poke(&self, address: usize, bytes: &[u8]) {
        let mut pages = self.pages.borrow_mut();
        for (i, &byte) in bytes.iter().enumerate() {
            let a = address + i;
            pages.get_mut(&page_of(a)).unwrap()[a - page_of(a)] = byte;
        }
    }

    fn is_mapped(&self, address: usize, len: usize) -> bool {
        let pages = self.pages.borrow();
        (address..address + len).all(|a| pages.contains_key(&page_of(a)))
    }
}

impl ProcessApi for FakeProcessApi {
    type Handle = FakeHandle;

    fn process_entries(&self) -> io::Result<Vec<ProcessEntry>> {
        if self.snapshot_fails {
            return Err(io::Error::new(io::ErrorKind::Other, "snapshot failed"));
        }
        Ok(self.entries.clone())
    }

    fn open_process(&self, process_id: u32) -> io::Result<FakeHandle> {
        if self.denied.contains(&process_id) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if !self.entries.iter().any(|e| e.process_id == process_id) {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        self.opened.set(self.opened.get() + 1);
        Ok(FakeHandle {
            process_id,
            closed: self.closed.clone(),
        })
    }

    fn is_wow64(&self, handle: &FakeHandle) -> io::Result<bool> {
        if self.wow64_query_fails {
            return Err(io::Error::from(io::ErrorKind::Other));
        }
        Ok(self.wow64.contains(&handle.process_id))
    }

    fn module_base(&self, _handle: &FakeHandle, module_name: &str) -> io::Result<Option<usize>> {
        Ok(self
            .modules
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(module_name))
            .map(|&(_, base)| base))
    }

    fn read_memory(&self, _handle: &FakeHandle, address: usize, buffer: &mut [u8]) -> io::Result<usize> {
        self.memory_calls.set(self.memory_calls.get() + 1);
        let len = self.short_transfer.map_or(buffer.len(), |limit| limit.min(buffer.len()));
        let pages = self.pages.borrow();
        for (i, byte) in buffer[..len].iter_mut().enumerate() {
            let a = address + i;
            let Some(page) = pages.get(&page_of(a)) else {
                return Err(partial_copy());
            };
            *byte = page[a - page_of(a)];
        }
        Ok(len)
    }

    fn write_memory(&self, _handle: &FakeHandle, address: usize, buffer: &[u8]) -> io::Result<usize> {
        self.memory_calls.set(self.memory_calls.get() + 1);
        let len = self.short_transfer.map_or(buffer.len(), |limit| limit.min(buffer.len()));
        if !self.is_mapped(address, len) {
            return Err(partial_copy());
        }
        self.poke(address, &buffer[..len]);
        Ok(len)
    }
}
