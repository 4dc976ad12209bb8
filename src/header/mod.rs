//! Progress record of the circular log, kept in a protected
//! non-volatile region next to the EEPROM.
//!
//! Layout (big endian):
//! - 7..=8: comm pointer, where the consumer continues reading
//! - 9..=10: write pointer, next free EEPROM address
//! - 11..=12: size of the last write batch
//! - 13..=14: overwrite count
//! - 15: status flag
//! - 16..=21: trailer (last record timestamp of the application), only
//!   ever cleared here
//!
//! Bytes before offset 7 belong to the application and are never touched.

use std::fmt;

use crate::eeprom::OverwriteTracker;
use crate::DriverError;

mod region;

pub use self::region::{
	FileRegion,
	MemoryRegion,
	ProtectedRegion,
	ScopedUnlock,
};

pub mod layout {
	pub const COMM_POINTER: usize = 7;
	pub const WRITE_POINTER: usize = 9;
	pub const BYTES_WRITTEN: usize = 11;
	pub const OVERWRITE_COUNT: usize = 13;
	pub const STATUS_FLAG: usize = 15;
	pub const TRAILER_END: usize = 21;

	/// size of the protected block holding the header
	pub const REGION_LEN: usize = 512;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusFlag {
	Normal,
	/// writes overtook the consumer; comm pointer follows the write pointer
	DataLost,
	/// set by the consumer after a successful transmission
	AckPending,
	/// set externally to restart the log
	ResetRequested,
	/// EEPROM stopped responding; only the availability monitor sets this
	Unavailable,
}

impl StatusFlag {
	pub fn from_byte(value: u8) -> Option<Self> {
		match value {
			0 => Some(StatusFlag::Normal),
			1 => Some(StatusFlag::DataLost),
			2 => Some(StatusFlag::AckPending),
			3 => Some(StatusFlag::ResetRequested),
			4 => Some(StatusFlag::Unavailable),
			_ => None,
		}
	}

	pub fn as_byte(self) -> u8 {
		match self {
			StatusFlag::Normal => 0,
			StatusFlag::DataLost => 1,
			StatusFlag::AckPending => 2,
			StatusFlag::ResetRequested => 3,
			StatusFlag::Unavailable => 4,
		}
	}
}

impl Default for StatusFlag {
	fn default() -> Self {
		StatusFlag::Normal
	}
}

impl fmt::Display for StatusFlag {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let name = match self {
			StatusFlag::Normal => "normal",
			StatusFlag::DataLost => "data lost",
			StatusFlag::AckPending => "ack pending",
			StatusFlag::ResetRequested => "reset requested",
			StatusFlag::Unavailable => "unavailable",
		};
		write!(f, "{} ({})", name, self.as_byte())
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Header {
	pub comm_pointer: u16,
	pub write_pointer: u16,
	pub bytes_written: u16,
	pub overwrite_count: u16,
	pub status: StatusFlag,
}

impl Header {
	pub fn read_from<R: ProtectedRegion + ?Sized>(region: &R) -> crate::AResult<Self> {
		let flag = region.read_byte(layout::STATUS_FLAG)?;
		let status = match StatusFlag::from_byte(flag) {
			Some(status) => status,
			None => bail!("invalid header status flag 0x{:02x}", flag),
		};
		Ok(Header {
			comm_pointer: region.read_u16(layout::COMM_POINTER)?,
			write_pointer: region.read_u16(layout::WRITE_POINTER)?,
			bytes_written: region.read_u16(layout::BYTES_WRITTEN)?,
			overwrite_count: region.read_u16(layout::OVERWRITE_COUNT)?,
			status,
		})
	}

	pub fn write_to<R: ProtectedRegion + ?Sized>(&self, region: &mut R) -> crate::AResult<()> {
		region.write_u16(layout::COMM_POINTER, self.comm_pointer)?;
		region.write_u16(layout::WRITE_POINTER, self.write_pointer)?;
		region.write_u16(layout::BYTES_WRITTEN, self.bytes_written)?;
		region.write_u16(layout::OVERWRITE_COUNT, self.overwrite_count)?;
		region.write_byte(layout::STATUS_FLAG, self.status.as_byte())
	}

	/// Header after a completed write batch ending at `write_cursor`.
	///
	/// `tracked` is the current overwrite count of the writer. Returns
	/// `true` as second value if the log restarted, in which case the
	/// tracker has to start from zero again.
	pub fn after_batch(&self, write_cursor: u16, batch_size: u16, tracked: u16) -> crate::AResult<(Header, bool)> {
		if self.status == StatusFlag::Unavailable {
			return Err(DriverError::DeviceUnavailable.into());
		}

		let mut next = *self;
		let mut restarted = false;

		next.write_pointer = write_cursor;
		next.bytes_written = batch_size;

		match self.status {
			StatusFlag::Normal | StatusFlag::DataLost => {
				if tracked > self.overwrite_count {
					next.overwrite_count = tracked;
					if self.comm_pointer <= write_cursor {
						next.status = StatusFlag::DataLost;
					}
				}
			},
			// the ack wins over the loss check, the wrap is still counted
			StatusFlag::AckPending => {
				next.overwrite_count = tracked.max(self.overwrite_count);
			},
			StatusFlag::ResetRequested | StatusFlag::Unavailable => (),
		}

		match next.status {
			StatusFlag::DataLost => {
				next.comm_pointer = write_cursor;
			},
			StatusFlag::AckPending => {
				// consumer got everything up to the previous write pointer
				next.comm_pointer = self.write_pointer;
				next.status = StatusFlag::Normal;
			},
			StatusFlag::ResetRequested => {
				next.comm_pointer = 0;
				next.write_pointer = 0;
				next.overwrite_count = 0;
				next.status = StatusFlag::Normal;
				restarted = true;
			},
			StatusFlag::Normal | StatusFlag::Unavailable => (),
		}

		Ok((next, restarted))
	}
}

impl fmt::Display for Header {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f,
			"comm 0x{:04x}, write 0x{:04x}, last batch {}, overwrites {}, status {}",
			self.comm_pointer,
			self.write_pointer,
			self.bytes_written,
			self.overwrite_count,
			self.status,
		)
	}
}

/// Sole owner of the header record.
///
/// Every mutation happens while holding a `ScopedUnlock`; the region is
/// write protected again before any method returns.
pub struct HeaderManager<R: ProtectedRegion> {
	region: R,
}

impl<R: ProtectedRegion> HeaderManager<R> {
	pub fn new(region: R) -> Self {
		HeaderManager { region }
	}

	pub fn region(&self) -> &R {
		&self.region
	}

	pub fn into_inner(self) -> R {
		self.region
	}

	pub fn header(&self) -> crate::AResult<Header> {
		Header::read_from(&self.region)
	}

	pub fn status(&self) -> crate::AResult<StatusFlag> {
		Ok(self.header()?.status)
	}

	/// Clear all tracking fields (and the trailer) before first use or to
	/// restart the log right away.
	pub fn initialize(&mut self, tracker: &mut OverwriteTracker) -> crate::AResult<()> {
		{
			let mut region = self.region.unlock()?;
			for offset in layout::COMM_POINTER..=layout::TRAILER_END {
				region.write_byte(offset, 0)?;
			}
		}
		tracker.reset();
		info!("header initialized");
		Ok(())
	}

	/// Record a completed write batch.
	///
	/// Must not be called while the header says the device is unavailable;
	/// that returns `DriverError::DeviceUnavailable` without touching it.
	pub fn update(&mut self, write_cursor: u16, batch_size: u16, tracker: &mut OverwriteTracker) -> crate::AResult<()> {
		let current = self.header()?;
		let (next, restarted) = current.after_batch(write_cursor, batch_size, tracker.count())?;

		next.write_to(&mut *self.region.unlock()?)?;

		if restarted {
			tracker.reset();
			info!("log restarted on request");
		}
		if next.status != current.status {
			if next.status == StatusFlag::DataLost {
				warn!("unread log data overwritten (overwrite count {})", next.overwrite_count);
			} else {
				debug!("header status {} -> {}", current.status, next.status);
			}
		}
		trace!("header: {}", next);
		Ok(())
	}

	/// consumer confirms it transmitted everything up to the write pointer
	pub fn request_ack(&mut self) -> crate::AResult<()> {
		self.request(StatusFlag::AckPending)
	}

	/// restart the log with the next update
	pub fn request_reset(&mut self) -> crate::AResult<()> {
		self.request(StatusFlag::ResetRequested)
	}

	fn request(&mut self, status: StatusFlag) -> crate::AResult<()> {
		if self.status()? == StatusFlag::Unavailable {
			return Err(DriverError::DeviceUnavailable.into());
		}
		self.set_status(status)
	}

	/// Switch to `Unavailable`; returns the status that was active before.
	pub fn mark_unavailable(&mut self) -> crate::AResult<StatusFlag> {
		let previous = self.status()?;
		if previous != StatusFlag::Unavailable {
			self.set_status(StatusFlag::Unavailable)?;
		}
		Ok(previous)
	}

	/// leave `Unavailable`, going back to `status`
	pub fn restore(&mut self, status: StatusFlag) -> crate::AResult<()> {
		ensure!(status != StatusFlag::Unavailable, "can't restore header status to {}", status);
		let current = self.status()?;
		ensure!(current == StatusFlag::Unavailable, "header status is {}, not unavailable", current);
		self.set_status(status)
	}

	fn set_status(&mut self, status: StatusFlag) -> crate::AResult<()> {
		self.region.unlock()?.write_byte(layout::STATUS_FLAG, status.as_byte())
	}
}
