use std::ptr::NonNull;

use tracing::{debug, warn};
use windows::{
    core::{w, Interface, HRESULT},
    Win32::{
        Foundation::{HINSTANCE, HMODULE, HWND},
        Graphics::{
            Direct3D::D3D_DRIVER_TYPE_HARDWARE,
            Direct3D11::{
                D3D11CreateDeviceAndSwapChain, ID3D11Device, ID3D11DeviceContext,
                D3D11_CREATE_DEVICE_FLAG, D3D11_SDK_VERSION,
            },
            Dxgi::{
                Common::{DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_MODE_DESC, DXGI_SAMPLE_DESC},
                IDXGIAdapter, IDXGISwapChain, DXGI_PRESENT, DXGI_SWAP_CHAIN_DESC,
                DXGI_SWAP_EFFECT_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
            },
        },
        System::Console::GetConsoleWindow,
        UI::WindowsAndMessaging::{
            CreateWindowExW, DestroyWindow, HMENU, WINDOW_EX_STYLE, WS_OVERLAPPED,
        },
    },
};

use crate::{error::DeviceCreationError, win_api_wrappers::to_io_error};

/// Output window of the probe: the console if there is one, otherwise a
/// hidden window owned by the probe.
enum PlaceholderWindow {
    Console(HWND),
    Hidden(HWND),
}

impl PlaceholderWindow {
    fn new() -> Result<Self, DeviceCreationError> {
        let console = unsafe { GetConsoleWindow() };
        if !console.0.is_null() {
            return Ok(Self::Console(console));
        }
        // never shown, so the predefined STATIC class is enough
        let hidden = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                w!("STATIC"),
                w!("gametrainer probe"),
                WS_OVERLAPPED,
                0,
                0,
                8,
                8,
                HWND::default(),
                HMENU::default(),
                HINSTANCE::default(),
                None,
            )
        }
        .map_err(|err| DeviceCreationError::Create(to_io_error(err)))?;
        Ok(Self::Hidden(hidden))
    }

    fn hwnd(&self) -> HWND {
        match self {
            Self::Console(hwnd) | Self::Hidden(hwnd) => *hwnd,
        }
    }
}

impl Drop for PlaceholderWindow {
    fn drop(&mut self) {
        if let Self::Hidden(hwnd) = self {
            if let Err(err) = unsafe { DestroyWindow(*hwnd) } {
                warn!("DestroyWindow failed: {}", err);
            }
        }
    }
}

/// A throwaway device and swap chain whose only use is its dispatch table.
///
/// Every `IDXGISwapChain` of the process shares that table, so the table stays
/// valid only while this session is alive.
pub struct ProbeSession {
    swap_chain: IDXGISwapChain,
    _device: ID3D11Device,
    _context: ID3D11DeviceContext,
    // dropped after the swap chain that presents into it
    _window: PlaceholderWindow,
}

impl ProbeSession {
    pub fn new() -> Result<Self, DeviceCreationError> {
        let window = PlaceholderWindow::new()?;
        let desc = DXGI_SWAP_CHAIN_DESC {
            BufferDesc: DXGI_MODE_DESC {
                Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                ..Default::default()
            },
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: 1,
            OutputWindow: window.hwnd(),
            Windowed: true.into(),
            SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
            Flags: 0,
        };

        let mut swap_chain: Option<IDXGISwapChain> = None;
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDeviceAndSwapChain(
                None::<&IDXGIAdapter>,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_FLAG(0),
                None,
                D3D11_SDK_VERSION,
                Some(&desc),
                Some(&mut swap_chain),
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|err| DeviceCreationError::Create(to_io_error(err)))?;

        let probe = Self {
            swap_chain: swap_chain.ok_or(DeviceCreationError::MissingInterface("swap chain"))?,
            _device: device.ok_or(DeviceCreationError::MissingInterface("device"))?,
            _context: context.ok_or(DeviceCreationError::MissingInterface("device context"))?,
            _window: window,
        };
        debug!("probe swap chain vtable at {:#x}", probe.vtable().as_ptr() as usize);
        Ok(probe)
    }

    /// Base of the swap chain's first-level dispatch table.
    pub fn vtable(&self) -> NonNull<usize> {
        // a live COM object always starts with its vtable pointer
        let object = self.swap_chain.as_raw() as *const *mut usize;
        unsafe { NonNull::new_unchecked(*object) }
    }

    pub fn swap_chain(&self) -> &IDXGISwapChain {
        &self.swap_chain
    }

    /// Presents one frame through whatever the table currently points to.
    pub fn present(&self) -> HRESULT {
        unsafe { self.swap_chain.Present(0, DXGI_PRESENT(0)) }
    }
}

pub fn probe_vtable() -> Result<(ProbeSession, usize), DeviceCreationError> {
    let probe = ProbeSession::new()?;
    let vtable = probe.vtable().as_ptr() as usize;
    Ok((probe, vtable))
}
