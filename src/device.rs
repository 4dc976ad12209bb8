use crate::eeprom::{
	OverwriteTracker,
	PagedWriter,
	Transport,
};
use crate::header::{
	Header,
	HeaderManager,
	ProtectedRegion,
	StatusFlag,
};
use crate::monitor::AvailabilityMonitor;
use crate::DriverError;

/// The EEPROM as a circular log: writer, header and availability
/// monitor sharing one bus.
pub struct LogDevice<T: Transport, R: ProtectedRegion> {
	writer: PagedWriter<T>,
	header: HeaderManager<R>,
	monitor: AvailabilityMonitor,
}

impl<T: Transport, R: ProtectedRegion> LogDevice<T, R> {
	/// Attach to an existing header; the overwrite tracker continues from
	/// the persisted count.
	pub fn open(transport: T, region: R) -> crate::AResult<Self> {
		Self::with_monitor(transport, region, AvailabilityMonitor::default())
	}

	pub fn with_monitor(transport: T, region: R, monitor: AvailabilityMonitor) -> crate::AResult<Self> {
		let header = HeaderManager::new(region);
		let current = with_context!("couldn't read log header", header.header())?;
		debug!("opened log: {}", current);
		Ok(LogDevice {
			writer: PagedWriter::with_tracker(transport, OverwriteTracker::resume(current.overwrite_count)),
			header,
			monitor,
		})
	}

	pub fn transport(&mut self) -> &mut T {
		self.writer.transport()
	}

	pub fn tracker(&self) -> &OverwriteTracker {
		self.writer.tracker()
	}

	pub fn header_manager(&self) -> &HeaderManager<R> {
		&self.header
	}

	pub fn header(&self) -> crate::AResult<Header> {
		self.header.header()
	}

	pub fn into_parts(self) -> (T, R) {
		(self.writer.into_inner(), self.header.into_inner())
	}

	/// write `data` at `cursor` without touching the header
	pub fn paged_write(&mut self, cursor: u16, data: &[u8]) -> crate::AResult<u16> {
		self.writer.write(cursor, data)
	}

	pub fn header_update(&mut self, cursor: u16, size: u16) -> crate::AResult<()> {
		self.header.update(cursor, size, self.writer.tracker_mut())
	}

	/// clear the header and the overwrite tracker
	pub fn header_reset(&mut self) -> crate::AResult<()> {
		self.header.initialize(self.writer.tracker_mut())
	}

	pub fn probe_availability(&mut self) -> crate::AResult<bool> {
		let availability = self.monitor.probe(self.writer.transport(), &mut self.header)?;
		Ok(availability.is_responding())
	}

	pub fn request_ack(&mut self) -> crate::AResult<()> {
		self.header.request_ack()
	}

	pub fn request_reset(&mut self) -> crate::AResult<()> {
		self.header.request_reset()
	}

	/// Append a record at the persisted write pointer and record it in
	/// the header; returns the new write pointer.
	///
	/// Refused while the header marks the device unavailable. On a
	/// transport failure the header is left as it was; probe the device
	/// before trying again.
	pub fn append(&mut self, data: &[u8]) -> crate::AResult<u16> {
		ensure!(data.len() <= u16::max_value() as usize, "record of {} bytes too large", data.len());
		let current = self.header.header()?;
		if current.status == StatusFlag::Unavailable {
			return Err(DriverError::DeviceUnavailable.into());
		}
		let cursor = self.writer.write(current.write_pointer, data)?;
		self.header_update(cursor, data.len() as u16)?;
		Ok(cursor)
	}

	/// Data written but not yet acknowledged by the consumer:
	/// `[comm pointer, write pointer)`, wrapping at the top.
	pub fn unconsumed(&mut self) -> crate::AResult<Vec<u8>> {
		let h = self.header.header()?;
		let len = h.write_pointer.wrapping_sub(h.comm_pointer) as usize;
		if 0 == len {
			return Ok(Vec::new());
		}
		self.writer.transport().read_sequential(h.comm_pointer, len)
	}
}
