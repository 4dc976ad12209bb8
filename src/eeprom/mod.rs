//! Microchip 24LC512, a 512-kbit I²C EEPROM (organized as 64K x 8bit)
//!
//! Every transaction starts with the control byte (bus address 0x50 plus
//! R/W bit) and, for writes and random reads, a two byte address (high
//! byte first).
//!
//! Instructions:
//! - byte write: address, one data byte
//! - page write: address, up to 128 data bytes. The internal address
//!   counter only increments the lower 7 bits, so data running past the
//!   end of a page wraps to the start of the *same* page and overwrites
//!   what was sent before.
//! - current address read: one byte from the internal address counter
//! - random read: address (write transaction without data), then read
//! - sequential read: keep reading; the counter rolls over from 0xffff
//!   to 0x0000
//!
//! After a write the device starts its internal write cycle (up to 5ms)
//! and does not acknowledge its address until it is finished ("ack
//! polling").

mod paged;
mod simulated;
mod transport;

pub use self::paged::{
	Chunk,
	OverwriteTracker,
	PageChunks,
	PagedWriter,
};

pub use self::simulated::{
	SimulatedEeprom,
	WriteRecord,
};

pub use self::transport::{
	Transport,
	check_page_write,
	reliable_sleep,
};

pub mod consts {
	use std::time::Duration;

	/// 7-bit bus address with A0..A2 tied low
	pub const BUS_ADDRESS: u16 = 0x50;

	pub const CAPACITY: usize = 0x1_0000;
	pub const PAGE_SIZE: usize = 128;

	// one write cycle is at most 5ms; give it twice that
	pub const ACK_POLL_ATTEMPTS: usize = 50;
	pub const ACK_POLL_DELAY: Duration = Duration::from_micros(200);

	pub const PROBE_ATTEMPTS: usize = 3;
	pub const PROBE_BACKOFF: Duration = Duration::from_millis(1);
}
