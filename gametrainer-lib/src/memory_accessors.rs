use std::io;

use tracing::debug;

use crate::{
    error::{TransferError, TransferKind},
    process_api::ProcessApi,
    process_session::{AddressWidth, ProcessSession},
};

macro_rules! le_accessors {
    ($type:ty, $getter:ident, $setter:ident) => {
        fn $getter(&self, address: usize) -> Result<$type, TransferError> {
            let mut buffer = [0; std::mem::size_of::<$type>()];
            self.read(address, &mut buffer)?;
            Ok(<$type>::from_le_bytes(buffer))
        }

        fn $setter(&self, address: usize, value: $type) -> Result<(), TransferError> {
            self.write(address, &value.to_le_bytes())
        }
    };
}

/// Exact-length access to a foreign address space.
pub trait MemoryAccessor {
    /// Fills all of `buffer` or fails. On failure `buffer` is zeroed.
    fn read(&self, address: usize, buffer: &mut [u8]) -> Result<(), TransferError>;

    /// Writes all of `buffer` or fails.
    fn write(&self, address: usize, buffer: &[u8]) -> Result<(), TransferError>;

    fn address_width(&self) -> AddressWidth;

    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>, TransferError> {
        let mut buffer = vec![0; len];
        self.read(address, &mut buffer)?;
        Ok(buffer)
    }

    le_accessors!(u8, read_u8, write_u8);
    le_accessors!(u16, read_u16, write_u16);
    le_accessors!(u32, read_u32, write_u32);
    le_accessors!(u64, read_u64, write_u64);
    le_accessors!(i32, read_i32, write_i32);
    le_accessors!(i64, read_i64, write_i64);
    le_accessors!(f32, read_f32, write_f32);
    le_accessors!(f64, read_f64, write_f64);

    /// Reads a pointer of the target's width.
    fn read_pointer(&self, address: usize) -> Result<usize, TransferError> {
        match self.address_width() {
            AddressWidth::Bits32 => Ok(self.read_u32(address)? as usize),
            AddressWidth::Bits64 => Ok(self.read_u64(address)? as usize),
        }
    }
}

fn check_transfer(
    kind: TransferKind,
    address: usize,
    requested: usize,
    result: io::Result<usize>,
) -> Result<(), TransferError> {
    match result {
        Err(source) => Err(TransferError::Os {
            kind,
            address,
            requested,
            source,
        }),
        Ok(transferred) if transferred != requested => Err(TransferError::Incomplete {
            kind,
            address,
            requested,
            transferred,
        }),
        Ok(_) => Ok(()),
    }
}

impl<A: ProcessApi> MemoryAccessor for ProcessSession<A> {
    fn read(&self, address: usize, buffer: &mut [u8]) -> Result<(), TransferError> {
        let handle = self.handle()?;
        let requested = buffer.len();
        let result = self.api().read_memory(handle, address, buffer);
        check_transfer(TransferKind::Read, address, requested, result).inspect_err(|err| {
            buffer.fill(0);
            debug!("{}", err);
        })
    }

    fn write(&self, address: usize, buffer: &[u8]) -> Result<(), TransferError> {
        let handle = self.handle()?;
        let result = self.api().write_memory(handle, address, buffer);
        check_transfer(TransferKind::Write, address, buffer.len(), result)
            .inspect_err(|err| debug!("{}", err))
    }

    fn address_width(&self) -> AddressWidth {
        self.address_width()
    }
}
