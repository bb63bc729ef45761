use std::path::Path;

use anyhow::{bail, Context, Result};
use gametrainer_lib::{
    find_process_id,
    present_hook::{
        presented_frames, set_frame_callback, PresentCall, PresentHook, PRESENT_VTABLE_INDEX,
    },
    probe_vtable, read_value, write_value, ExternalProcess, ProbeSession, TrainerProfile, Value,
    ValueKind, VirtualProtection, WinProcessApi,
};
use tracing::{info, trace, warn};

use crate::Target;

fn attach(target: &Target) -> Result<ExternalProcess> {
    let session = match (&target.process, target.pid) {
        (Some(name), _) => ExternalProcess::open_by_name(name),
        (None, Some(pid)) => ExternalProcess::open(pid),
        (None, None) => bail!("No target process given"),
    };
    let session = session.context("Failed to attach")?;
    info!(
        "Attached to {} ({:?})",
        session.process_id(),
        session.address_width()
    );
    Ok(session)
}

fn load_profile(path: &Path) -> Result<(TrainerProfile, ExternalProcess)> {
    let profile = TrainerProfile::load(path)?;
    let session = ExternalProcess::open_by_name(&profile.process.name)
        .with_context(|| format!("Failed to attach to {}", profile.process.name))?;
    Ok((profile, session))
}

pub fn find(name: &str) -> Result<()> {
    match find_process_id(&WinProcessApi, name)? {
        Some(process_id) => {
            println!("{}", process_id);
            Ok(())
        }
        None => bail!("{} is not running", name),
    }
}

pub fn read(profile: &Path, value: &str) -> Result<()> {
    let (profile, session) = load_profile(profile)?;
    let (chain, kind) = profile.pointer_chain(value)?;
    let address = chain
        .resolve(&session)
        .with_context(|| format!("Failed to resolve {}", value))?;
    let current = read_value(&session, address, kind)
        .with_context(|| format!("Failed to read {}", value))?;
    println!("{} = {} ({} at {:#x})", value, current, kind, address);
    Ok(())
}

pub fn write(profile: &Path, value: &str, text: &str) -> Result<()> {
    let (profile, session) = load_profile(profile)?;
    let (chain, kind) = profile.pointer_chain(value)?;
    let new_value = Value::parse(kind, text)?;
    let address = chain
        .resolve(&session)
        .with_context(|| format!("Failed to resolve {}", value))?;
    write_value(&session, address, new_value)
        .with_context(|| format!("Failed to write {}", value))?;
    info!("{} <- {} at {:#x}", value, new_value, address);
    Ok(())
}

pub fn peek(target: &Target, address: usize, kind: ValueKind) -> Result<()> {
    let session = attach(target)?;
    let current = read_value(&session, address, kind)?;
    println!("{:#x}: {}", address, current);
    Ok(())
}

pub fn poke(target: &Target, address: usize, kind: ValueKind, text: &str) -> Result<()> {
    let session = attach(target)?;
    let new_value = Value::parse(kind, text)?;
    write_value(&session, address, new_value)?;
    info!("{:#x} <- {}", address, new_value);
    Ok(())
}

pub fn probe() -> Result<()> {
    let (probe, vtable) = probe_vtable().context("Failed to create the probe swap chain")?;
    let present = unsafe { probe.vtable().as_ptr().add(PRESENT_VTABLE_INDEX).read() };
    println!("vtable:  {:#x}", vtable);
    println!("Present: {:#x}", present);
    Ok(())
}

fn trace_frame(call: &PresentCall) {
    trace!(
        "frame {} sync_interval={} flags={:#x}",
        call.frame,
        call.sync_interval,
        call.flags
    );
}

pub fn hook_selftest(frames: u32) -> Result<()> {
    let probe = ProbeSession::new().context("Failed to create the probe swap chain")?;
    let mut hook = PresentHook::<VirtualProtection>::new();
    hook.install(&probe)?;
    set_frame_callback(Some(trace_frame));

    let before = presented_frames();
    for _ in 0..frames {
        if let Err(err) = probe.present().ok() {
            warn!("Present failed: {}", err);
        }
    }
    let counted = presented_frames() - before;

    set_frame_callback(None);
    hook.remove()?;

    println!("{} of {} frames intercepted", counted, frames);
    if counted != u64::from(frames) {
        bail!("Hook counted {} frames instead of {}", counted, frames);
    }
    Ok(())
}
