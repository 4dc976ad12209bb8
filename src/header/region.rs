use std::fs;
use std::io;
use std::ops::{
	Deref,
	DerefMut,
};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::DriverError;

use super::layout::REGION_LEN;

/// Byte addressed non-volatile memory guarded by a write-enable gate.
///
/// Writes with the gate closed (write protected) must fail with
/// `DriverError::HeaderLocked` and leave the content untouched.
pub trait ProtectedRegion {
	fn len(&self) -> usize;

	fn read_byte(&self, offset: usize) -> crate::AResult<u8>;
	fn write_byte(&mut self, offset: usize, data: u8) -> crate::AResult<()>;

	fn is_write_protected(&self) -> bool;
	fn set_write_protect(&mut self, protect: bool) -> crate::AResult<()>;

	// header fields are stored big endian
	fn read_u16(&self, offset: usize) -> crate::AResult<u16> {
		let hi = self.read_byte(offset)?;
		let lo = self.read_byte(offset + 1)?;
		Ok((hi as u16) << 8 | lo as u16)
	}

	fn write_u16(&mut self, offset: usize, data: u16) -> crate::AResult<()> {
		self.write_byte(offset, (data >> 8) as u8)?;
		self.write_byte(offset + 1, data as u8)
	}

	/// open the gate until the returned guard is dropped
	fn unlock(&mut self) -> crate::AResult<ScopedUnlock<Self>> {
		self.set_write_protect(false)?;
		Ok(ScopedUnlock(self))
	}
}

impl<'a, R: ?Sized + ProtectedRegion> ProtectedRegion for &'a mut R {
	fn len(&self) -> usize {
		R::len(&**self)
	}
	fn read_byte(&self, offset: usize) -> crate::AResult<u8> {
		R::read_byte(&**self, offset)
	}
	fn write_byte(&mut self, offset: usize, data: u8) -> crate::AResult<()> {
		R::write_byte(*self, offset, data)
	}
	fn is_write_protected(&self) -> bool {
		R::is_write_protected(&**self)
	}
	fn set_write_protect(&mut self, protect: bool) -> crate::AResult<()> {
		R::set_write_protect(*self, protect)
	}
}

/// Write access to a `ProtectedRegion`; closes the gate again when
/// dropped, whichever way the scope is left.
pub struct ScopedUnlock<'a, R: ?Sized + ProtectedRegion + 'a>(&'a mut R);

impl<'a, R: ?Sized + ProtectedRegion> Drop for ScopedUnlock<'a, R> {
	fn drop(&mut self) {
		if let Err(e) = self.0.set_write_protect(true) {
			error!("Couldn't write protect header region: {}", e);
		}
	}
}

impl<'a, R: ?Sized + ProtectedRegion> Deref for ScopedUnlock<'a, R> {
	type Target = R;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, R: ?Sized + ProtectedRegion> DerefMut for ScopedUnlock<'a, R> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

fn check_offset(len: usize, offset: usize) -> crate::AResult<()> {
	ensure!(offset < len, "header offset {} out of range (region has {} bytes)", offset, len);
	Ok(())
}

/// RAM backed region; starts zeroed and write protected.
#[derive(Clone, Debug)]
pub struct MemoryRegion {
	data: Vec<u8>,
	protected: bool,
}

impl Default for MemoryRegion {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryRegion {
	pub fn new() -> Self {
		MemoryRegion {
			data: vec![0u8; REGION_LEN],
			protected: true,
		}
	}

	pub fn bytes(&self) -> &[u8] {
		&self.data
	}
}

impl ProtectedRegion for MemoryRegion {
	fn len(&self) -> usize {
		self.data.len()
	}

	fn read_byte(&self, offset: usize) -> crate::AResult<u8> {
		check_offset(self.data.len(), offset)?;
		Ok(self.data[offset])
	}

	fn write_byte(&mut self, offset: usize, data: u8) -> crate::AResult<()> {
		check_offset(self.data.len(), offset)?;
		if self.protected {
			return Err(DriverError::HeaderLocked { offset }.into());
		}
		self.data[offset] = data;
		Ok(())
	}

	fn is_write_protected(&self) -> bool {
		self.protected
	}

	fn set_write_protect(&mut self, protect: bool) -> crate::AResult<()> {
		self.protected = protect;
		Ok(())
	}
}

/// File backed region, standing in for the FRAM block on a host.
///
/// Closing the gate syncs the file, so a protected region is also a
/// durable one.
pub struct FileRegion {
	file: fs::File,
	protected: bool,
}

impl FileRegion {
	/// open (or create zeroed) the region file
	pub fn open(path: &Path) -> crate::AResult<Self> {
		with_context!(("couldn't open header region {}", path.display()), {
			let file = fs::OpenOptions::new()
				.read(true)
				.write(true)
				.create(true)
				.open(path)?;
			let size = file.metadata()?.len();
			if size < REGION_LEN as u64 {
				file.set_len(REGION_LEN as u64)?;
			}
			Ok(FileRegion {
				file,
				protected: true,
			})
		})
	}
}

impl ProtectedRegion for FileRegion {
	fn len(&self) -> usize {
		REGION_LEN
	}

	fn read_byte(&self, offset: usize) -> crate::AResult<u8> {
		check_offset(REGION_LEN, offset)?;
		let mut buf = [0u8];
		let l = self.file.read_at(&mut buf, offset as u64)?;
		if l != 1 {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "header region truncated").into());
		}
		Ok(buf[0])
	}

	fn write_byte(&mut self, offset: usize, data: u8) -> crate::AResult<()> {
		check_offset(REGION_LEN, offset)?;
		if self.protected {
			return Err(DriverError::HeaderLocked { offset }.into());
		}
		let l = self.file.write_at(&[data], offset as u64)?;
		if l != 1 {
			return Err(io::Error::new(io::ErrorKind::Other, "failed to write header byte").into());
		}
		Ok(())
	}

	fn is_write_protected(&self) -> bool {
		self.protected
	}

	fn set_write_protect(&mut self, protect: bool) -> crate::AResult<()> {
		if protect && !self.protected {
			self.file.sync_data()?;
		}
		self.protected = protect;
		Ok(())
	}
}
