use tracing::trace;

use crate::{
    error::ResolveError, memory_accessors::MemoryAccessor, process_api::ProcessApi,
    process_session::ProcessSession,
};

fn offset_address(base: usize, offset: u64) -> Result<usize, ResolveError> {
    usize::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or(ResolveError::Overflow { base, offset })
}

/// `[[module + base_offset] + offsets[0]] + ...`, dereferenced at every step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerChain {
    pub module: String,
    pub base_offset: u64,
    pub offsets: Vec<u64>,
}

impl PointerChain {
    pub fn new(module: impl Into<String>, base_offset: u64, offsets: Vec<u64>) -> Self {
        Self {
            module: module.into(),
            base_offset,
            offsets,
        }
    }

    pub fn resolve_from(
        &self,
        module_base: usize,
        accessor: &impl MemoryAccessor,
    ) -> Result<usize, ResolveError> {
        let mut address = accessor.read_pointer(offset_address(module_base, self.base_offset)?)?;
        for &offset in &self.offsets {
            address = accessor.read_pointer(offset_address(address, offset)?)?;
        }
        trace!("{}+{:#x} -> {:#x}", self.module, self.base_offset, address);
        Ok(address)
    }

    pub fn resolve<A: ProcessApi>(&self, session: &ProcessSession<A>) -> Result<usize, ResolveError> {
        let module_base = session.module_base(&self.module)?;
        self.resolve_from(module_base, session)
    }
}
