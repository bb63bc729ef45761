pub mod error;
mod find_process_id;
pub mod hook_utils;
mod memory_accessors;
#[cfg(test)]
mod mock;
mod pointer_chain;
pub mod present_hook;
mod process_api;
mod process_session;
mod profile;
#[cfg(target_os = "windows")]
mod swap_chain_probe;
mod value;
#[cfg(target_os = "windows")]
mod win_api_wrappers;

pub use crate::{
    find_process_id::{find_process_id, find_process_id_in_entries},
    memory_accessors::MemoryAccessor,
    pointer_chain::PointerChain,
    process_api::{ProcessApi, ProcessEntry},
    process_session::{AddressWidth, ProcessSession},
    profile::{ProcessTarget, TrainerProfile, ValueEntry},
    value::{read_value, write_value, Value, ValueKind},
};
#[cfg(target_os = "windows")]
pub use crate::{
    process_session::ExternalProcess,
    swap_chain_probe::{probe_vtable, ProbeSession},
    win_api_wrappers::{SafeHandle, VirtualProtection, WinProcessApi},
};
