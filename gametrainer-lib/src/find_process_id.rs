use tracing::debug;

use crate::{
    error::ScanError,
    process_api::{ProcessApi, ProcessEntry},
};

/// First entry, in enumeration order, whose executable name equals
/// `exe_file` exactly (case-sensitive).
pub fn find_process_id_in_entries<'a>(
    entries: impl IntoIterator<Item = &'a ProcessEntry>,
    exe_file: &str,
) -> Option<u32> {
    entries
        .into_iter()
        .find(|entry| entry.exe_file == exe_file)
        .map(|entry| entry.process_id)
}

pub fn find_process_id(api: &impl ProcessApi, exe_file: &str) -> Result<Option<u32>, ScanError> {
    let entries = api.process_entries().map_err(ScanError::Snapshot)?;
    let process_id = find_process_id_in_entries(&entries, exe_file);
    debug!("{} -> {:?} ({} processes)", exe_file, process_id, entries.len());
    Ok(process_id)
}
