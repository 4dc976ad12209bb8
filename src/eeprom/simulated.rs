use std::fs;
use std::io;
use std::path::Path;

use crate::DriverError;

use super::consts::*;
use super::Transport;

/// page write as seen by the device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WriteRecord {
	pub address: u16,
	pub len: usize,
}

/// 24LC512 in memory.
///
/// Behaves like the real chip where the driver depends on it: page writes
/// wrap inside their page, sequential reads roll over at the top, and
/// after a write the device stays busy (not acknowledging) for a
/// configurable number of polls.
pub struct SimulatedEeprom {
	memory: Vec<u8>,
	pointer: u16,
	write_cycle: usize,
	busy: usize,
	connected: bool,
	writes: Vec<WriteRecord>,
}

impl Default for SimulatedEeprom {
	fn default() -> Self {
		Self::new()
	}
}

impl SimulatedEeprom {
	/// erased device (all 0xff), write cycle finishes immediately
	pub fn new() -> Self {
		Self::with_write_cycle(0)
	}

	/// device needing `polls` unacknowledged polls after each write
	pub fn with_write_cycle(polls: usize) -> Self {
		SimulatedEeprom {
			memory: vec![0xff; CAPACITY],
			pointer: 0,
			write_cycle: polls,
			busy: 0,
			connected: true,
			writes: Vec::new(),
		}
	}

	pub fn from_image(image: Vec<u8>) -> crate::AResult<Self> {
		ensure!(image.len() == CAPACITY, "EEPROM image must be {} bytes, got {}", CAPACITY, image.len());
		let mut sim = Self::new();
		sim.memory = image;
		Ok(sim)
	}

	/// load an image file; a missing file gives an erased device
	pub fn load(path: &Path) -> crate::AResult<Self> {
		with_context!(("couldn't load EEPROM image {}", path.display()), {
			match fs::read(path) {
				Ok(image) => Self::from_image(image),
				Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
				Err(e) => Err(e.into()),
			}
		})
	}

	pub fn save(&self, path: &Path) -> crate::AResult<()> {
		with_context!(("couldn't save EEPROM image {}", path.display()), {
			fs::write(path, &self.memory)?;
			Ok(())
		})
	}

	pub fn memory(&self) -> &[u8] {
		&self.memory
	}

	pub fn writes(&self) -> &[WriteRecord] {
		&self.writes
	}

	/// a disconnected device never acknowledges anything
	pub fn set_connected(&mut self, connected: bool) {
		self.connected = connected;
	}

	fn ready(&self, operation: &'static str, address: u16) -> crate::AResult<()> {
		if !self.connected || self.busy > 0 {
			return Err(DriverError::TransportTimeout { operation, address }.into());
		}
		Ok(())
	}

	fn start_write_cycle(&mut self) {
		self.busy = self.write_cycle;
	}
}

impl Transport for SimulatedEeprom {
	fn write_byte(&mut self, address: u16, data: u8) -> crate::AResult<()> {
		self.ready("byte write", address)?;
		self.memory[address as usize] = data;
		self.pointer = address.wrapping_add(1);
		self.writes.push(WriteRecord { address, len: 1 });
		self.start_write_cycle();
		Ok(())
	}

	fn write_page(&mut self, address: u16, data: &[u8]) -> crate::AResult<()> {
		self.ready("page write", address)?;
		// only the lower 7 bits of the address counter increment
		let base = address as usize & !(PAGE_SIZE - 1);
		let mut offset = address as usize % PAGE_SIZE;
		for &b in data {
			self.memory[base + offset] = b;
			offset = (offset + 1) % PAGE_SIZE;
		}
		self.pointer = (base + offset) as u16;
		self.writes.push(WriteRecord { address, len: data.len() });
		self.start_write_cycle();
		Ok(())
	}

	fn read_byte(&mut self, address: u16) -> crate::AResult<u8> {
		self.ready("random read", address)?;
		self.pointer = address.wrapping_add(1);
		Ok(self.memory[address as usize])
	}

	fn read_current(&mut self) -> crate::AResult<u8> {
		self.ready("current address read", self.pointer)?;
		let data = self.memory[self.pointer as usize];
		self.pointer = self.pointer.wrapping_add(1);
		Ok(data)
	}

	fn read_sequential(&mut self, address: u16, len: usize) -> crate::AResult<Vec<u8>> {
		self.ready("sequential read", address)?;
		let result = (0..len)
			.map(|i| self.memory[(address as usize + i) % CAPACITY])
			.collect();
		self.pointer = ((address as usize + len) % CAPACITY) as u16;
		Ok(result)
	}

	fn probe_ack(&mut self) -> bool {
		if !self.connected {
			return false;
		}
		if self.busy > 0 {
			self.busy -= 1;
			return false;
		}
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn page_write_wraps_inside_page() {
		let mut sim = SimulatedEeprom::new();
		let data: Vec<u8> = (1..=30).collect();
		// 28 bytes fit until 128, the rest lands at the start of the page
		sim.write_page(100, &data).unwrap();
		assert_eq!(&sim.memory()[100..128], &data[..28]);
		assert_eq!(&sim.memory()[0..2], &data[28..]);
		assert_eq!(sim.memory()[128], 0xff);
	}

	#[test]
	fn sequential_read_rolls_over() {
		let mut sim = SimulatedEeprom::new();
		sim.write_byte(0xffff, 0x11).unwrap();
		sim.write_byte(0x0000, 0x22).unwrap();
		assert_eq!(sim.read_sequential(0xffff, 2).unwrap(), vec![0x11, 0x22]);
		assert_eq!(sim.read_current().unwrap(), 0xff);
	}

	#[test]
	fn current_read_follows_random_read() {
		let mut sim = SimulatedEeprom::new();
		sim.write_page(0xf9ff, &[0x88]).unwrap();
		sim.write_page(0xfa00, &[0x96, 0x57]).unwrap();
		assert_eq!(sim.read_byte(0xf9ff).unwrap(), 0x88);
		assert_eq!(sim.read_current().unwrap(), 0x96);
		assert_eq!(sim.read_current().unwrap(), 0x57);
	}

	#[test]
	fn busy_after_write_until_polled() {
		let mut sim = SimulatedEeprom::with_write_cycle(2);
		sim.write_byte(5, 1).unwrap();
		assert!(sim.write_byte(6, 2).is_err());
		assert!(!sim.probe_ack());
		assert!(!sim.probe_ack());
		assert!(sim.probe_ack());
		sim.write_byte(6, 2).unwrap();
		sim.await_write_complete().unwrap();
		assert_eq!(sim.read_sequential(5, 2).unwrap(), vec![1, 2]);
	}

	#[test]
	fn ack_polling_times_out_when_disconnected() {
		let mut sim = SimulatedEeprom::new();
		sim.set_connected(false);
		assert!(!sim.probe_ack());
		let e = sim.await_write_complete().unwrap_err();
		assert_eq!(DriverError::find(&e), Some(DriverError::WriteCycleTimeout));
		assert_eq!(format!("{}", e), "EEPROM write cycle did not finish");
	}

	#[test]
	fn image_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("eeprom.bin");

		let sim = SimulatedEeprom::load(&path).unwrap();
		assert!(sim.memory().iter().all(|&b| b == 0xff));

		let mut sim = sim;
		sim.write_page(0x0064, b"log").unwrap();
		sim.save(&path).unwrap();

		let sim = SimulatedEeprom::load(&path).unwrap();
		assert_eq!(&sim.memory()[0x64..0x67], b"log");
	}

	#[test]
	fn rejects_short_image() {
		assert!(SimulatedEeprom::from_image(vec![0; 100]).is_err());
	}
}
