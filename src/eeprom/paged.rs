use super::consts::*;
use super::Transport;

const PAGE: u32 = PAGE_SIZE as u32;
// first address past the end of the memory
const TOP: u32 = CAPACITY as u32;

/// one physical write transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Chunk {
	pub address: u16,
	pub len: usize,
	/// chunk ends at the last address; the cursor continues at 0
	pub wraps: bool,
}

impl Chunk {
	/// address following the chunk
	pub fn next_address(&self) -> u16 {
		if self.wraps {
			0
		} else {
			self.address + self.len as u16
		}
	}
}

/// Splits a write of `len` bytes starting at a cursor into chunks that
/// neither cross a page boundary nor the end of the memory.
#[derive(Clone, Debug)]
pub struct PageChunks {
	position: u32,
	boundary: u32,
	remaining: usize,
}

impl PageChunks {
	pub fn new(cursor: u16, len: usize) -> Self {
		assert!(len <= CAPACITY);
		PageChunks {
			position: cursor as u32,
			boundary: first_boundary(cursor),
			remaining: len,
		}
	}

	/// next page boundary the current position must not cross
	pub fn boundary(&self) -> u32 {
		self.boundary
	}
}

// smallest multiple of the page size strictly above `cursor`; a cursor
// sitting on a boundary gets a full page
fn first_boundary(cursor: u16) -> u32 {
	(cursor as u32 / PAGE + 1) * PAGE
}

impl Iterator for PageChunks {
	type Item = Chunk;

	fn next(&mut self) -> Option<Chunk> {
		if 0 == self.remaining {
			return None;
		}

		let mut len = self.remaining
			.min(PAGE_SIZE)
			.min((self.boundary - self.position) as usize);
		let mut end = self.position + len as u32;

		let wraps = end > TOP - 1;
		if wraps {
			// clamp to end exactly at the last address
			len = (TOP - self.position) as usize;
			end = TOP;
		}
		if end == self.boundary {
			self.boundary += PAGE;
		}

		let chunk = Chunk {
			address: self.position as u16,
			len,
			wraps,
		};

		self.remaining -= len;
		if wraps {
			self.position = 0;
			self.boundary = PAGE;
		} else {
			self.position = end;
		}

		Some(chunk)
	}
}

/// Counts how often the write cursor wrapped past the end of the memory
/// and started overwriting older log data.
///
/// Never decreases; only a header reset clears it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverwriteTracker {
	count: u16,
}

impl OverwriteTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// continue counting from a persisted value
	pub fn resume(count: u16) -> Self {
		OverwriteTracker { count }
	}

	pub fn count(&self) -> u16 {
		self.count
	}

	pub fn record_wrap(&mut self) {
		self.count = self.count.saturating_add(1);
	}

	pub fn reset(&mut self) {
		self.count = 0;
	}
}

/// Writes arbitrary length buffers into the circular log, one page-safe
/// chunk per transaction.
pub struct PagedWriter<T: Transport> {
	transport: T,
	tracker: OverwriteTracker,
}

impl<T: Transport> PagedWriter<T> {
	pub fn new(transport: T) -> Self {
		Self::with_tracker(transport, OverwriteTracker::new())
	}

	pub fn with_tracker(transport: T, tracker: OverwriteTracker) -> Self {
		PagedWriter {
			transport,
			tracker,
		}
	}

	pub fn transport(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn tracker(&self) -> &OverwriteTracker {
		&self.tracker
	}

	pub fn tracker_mut(&mut self) -> &mut OverwriteTracker {
		&mut self.tracker
	}

	pub fn into_inner(self) -> T {
		self.transport
	}

	/// Write `data` starting at `cursor`; returns the cursor after the
	/// last byte written.
	///
	/// Each chunk waits for the device write cycle before the next one is
	/// sent. If the device stops acknowledging the write is abandoned and
	/// the error returned; chunks already sent stay written.
	pub fn write(&mut self, cursor: u16, data: &[u8]) -> crate::AResult<u16> {
		ensure!(!data.is_empty(), "empty write at 0x{:04x}", cursor);
		ensure!(data.len() <= CAPACITY, "write of {} bytes exceeds EEPROM capacity", data.len());

		let mut next = cursor;
		let mut offset = 0usize;
		for chunk in PageChunks::new(cursor, data.len()) {
			let bytes = &data[offset..offset + chunk.len];
			trace!("page write 0x{:04x}+{}", chunk.address, chunk.len);

			let transport = &mut self.transport;
			with_context!(("page write of {} bytes at 0x{:04x}", chunk.len, chunk.address), {
				transport.write_page(chunk.address, bytes)?;
				transport.await_write_complete()
			})?;

			if chunk.wraps {
				self.tracker.record_wrap();
				debug!("write cursor wrapped (overwrite count {})", self.tracker.count());
			}
			offset += chunk.len;
			next = chunk.next_address();
		}

		Ok(next)
	}
}
