use std::thread;
use std::time::{
	Duration,
	Instant,
};

use crate::DriverError;

use super::consts::*;

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// make sure `len` bytes starting at `address` stay within one page
pub fn check_page_write(address: u16, len: usize) -> crate::AResult<()> {
	let in_page = (address as usize) % PAGE_SIZE;
	if len > PAGE_SIZE || in_page + len > PAGE_SIZE {
		return Err(DriverError::PageOverflow { address, len }.into());
	}
	Ok(())
}

/// Blocking access to the EEPROM on the bus.
///
/// Every call is a complete start-to-stop transaction; none of them may
/// be interleaved with another one.
pub trait Transport {
	fn write_byte(&mut self, address: u16, data: u8) -> crate::AResult<()>;

	// `data` must not cross a page boundary; see `check_page_write`
	fn write_page(&mut self, address: u16, data: &[u8]) -> crate::AResult<()>;

	fn read_byte(&mut self, address: u16) -> crate::AResult<u8>;

	// read at the internal address counter (last accessed address + 1)
	fn read_current(&mut self) -> crate::AResult<u8>;

	fn read_sequential(&mut self, address: u16, len: usize) -> crate::AResult<Vec<u8>>;

	/// single presence check: `true` if the device acknowledged its address
	fn probe_ack(&mut self) -> bool;

	fn ack_poll_budget(&self) -> (usize, Duration) {
		(ACK_POLL_ATTEMPTS, ACK_POLL_DELAY)
	}

	/// wait for the internal write cycle of the last write to finish
	fn await_write_complete(&mut self) -> crate::AResult<()> {
		let (attempts, delay) = self.ack_poll_budget();
		for attempt in 0..attempts {
			if self.probe_ack() {
				if attempt > 0 {
					trace!("write cycle finished after {} polls", attempt);
				}
				return Ok(());
			}
			reliable_sleep(delay);
		}
		Err(DriverError::WriteCycleTimeout.into())
	}
}

impl<'a, T: ?Sized + Transport> Transport for &'a mut T {
	fn write_byte(&mut self, address: u16, data: u8) -> crate::AResult<()> {
		T::write_byte(*self, address, data)
	}
	fn write_page(&mut self, address: u16, data: &[u8]) -> crate::AResult<()> {
		T::write_page(*self, address, data)
	}
	fn read_byte(&mut self, address: u16) -> crate::AResult<u8> {
		T::read_byte(*self, address)
	}
	fn read_current(&mut self) -> crate::AResult<u8> {
		T::read_current(*self)
	}
	fn read_sequential(&mut self, address: u16, len: usize) -> crate::AResult<Vec<u8>> {
		T::read_sequential(*self, address, len)
	}
	fn probe_ack(&mut self) -> bool {
		T::probe_ack(*self)
	}
	fn ack_poll_budget(&self) -> (usize, Duration) {
		T::ack_poll_budget(&**self)
	}
	fn await_write_complete(&mut self) -> crate::AResult<()> {
		T::await_write_complete(*self)
	}
}
