use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use libc::{
	EIO,
	ENXIO,
	EREMOTEIO,
	c_ulong,
	ioctl,
};

use crate::eeprom::{
	Transport,
	check_page_write,
	reliable_sleep,
};
use crate::DriverError;

use super::I2cConfig;

// from linux/i2c-dev.h and linux/i2c.h
const I2C_RDWR: c_ulong = 0x0707;
const I2C_M_RD: u16 = 0x0001;

// the kernel refuses longer messages
const MAX_READ: usize = 4096;

#[repr(C)]
struct I2cMsg {
	addr: u16,
	flags: u16,
	len: u16,
	buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
	msgs: *mut I2cMsg,
	nmsgs: u32,
}

// not acknowledged (or lost on the bus); anything else is a real error
fn is_nack(e: &io::Error) -> bool {
	match e.raw_os_error() {
		Some(ENXIO) | Some(EIO) | Some(EREMOTEIO) => true,
		_ => false,
	}
}

/// 24LC512 on a Linux i2c-dev bus; each operation is a single
/// `I2C_RDWR` transfer (combined messages use a repeated start).
pub struct I2cTransport {
	file: fs::File,
	config: I2cConfig,
}

pub fn open_i2c(config: I2cConfig) -> crate::AResult<I2cTransport> {
	let bus = &config.bus;
	let file = with_context!(("couldn't open I2C bus {}", bus.display()), {
		Ok(fs::OpenOptions::new()
			.read(true)
			.write(true)
			.open(bus)?)
	})?;
	Ok(I2cTransport { file, config })
}

impl I2cTransport {
	fn write_msg(&self, buf: &[u8]) -> I2cMsg {
		I2cMsg {
			addr: self.config.address,
			flags: 0,
			len: buf.len() as u16,
			// the kernel doesn't write to buffers of write messages
			buf: buf.as_ptr() as *mut u8,
		}
	}

	fn read_msg(&self, buf: &mut [u8]) -> I2cMsg {
		I2cMsg {
			addr: self.config.address,
			flags: I2C_M_RD,
			len: buf.len() as u16,
			buf: buf.as_mut_ptr(),
		}
	}

	fn transfer(&self, msgs: &mut [I2cMsg]) -> io::Result<()> {
		let mut data = I2cRdwrIoctlData {
			msgs: msgs.as_mut_ptr(),
			nmsgs: msgs.len() as u32,
		};
		let res = unsafe {
			ioctl(self.file.as_raw_fd(), I2C_RDWR as _, &mut data as *mut I2cRdwrIoctlData)
		};
		if res < 0 {
			Err(io::Error::last_os_error())
		} else {
			Ok(())
		}
	}

	// repeat `f` while the device doesn't acknowledge, up to the retry budget
	fn with_retry<F, V>(&mut self, operation: &'static str, address: u16, mut f: F) -> crate::AResult<V>
	where
		F: FnMut(&mut Self) -> io::Result<V>,
	{
		for attempt in 0..self.config.retries.max(1) {
			if attempt > 0 {
				reliable_sleep(self.config.retry_delay);
			}
			match f(self) {
				Ok(v) => return Ok(v),
				Err(ref e) if is_nack(e) => {
					debug!("{} at 0x{:04x} not acknowledged (attempt {}): {}", operation, address, attempt + 1, e);
				},
				Err(e) => {
					let msg = format!("I2C {} at 0x{:04x}", operation, address);
					return Err(failure::Error::from(e).context(msg).into());
				},
			}
		}
		Err(DriverError::TransportTimeout { operation, address }.into())
	}

	fn send(&mut self, operation: &'static str, address: u16, data: &[u8]) -> crate::AResult<()> {
		let mut buf = Vec::with_capacity(2 + data.len());
		buf.push((address >> 8) as u8);
		buf.push(address as u8);
		buf.extend_from_slice(data);

		self.with_retry(operation, address, |t| {
			let mut msgs = [t.write_msg(&buf)];
			t.transfer(&mut msgs)
		})
	}
}

impl Transport for I2cTransport {
	fn write_byte(&mut self, address: u16, data: u8) -> crate::AResult<()> {
		self.send("byte write", address, &[data])
	}

	fn write_page(&mut self, address: u16, data: &[u8]) -> crate::AResult<()> {
		check_page_write(address, data.len())?;
		self.send("page write", address, data)
	}

	fn read_byte(&mut self, address: u16) -> crate::AResult<u8> {
		let addr = [(address >> 8) as u8, address as u8];
		self.with_retry("random read", address, |t| {
			let mut data = [0u8];
			let mut msgs = [t.write_msg(&addr), t.read_msg(&mut data)];
			t.transfer(&mut msgs)?;
			Ok(data[0])
		})
	}

	fn read_current(&mut self) -> crate::AResult<u8> {
		self.with_retry("current address read", 0, |t| {
			let mut data = [0u8];
			let mut msgs = [t.read_msg(&mut data)];
			t.transfer(&mut msgs)?;
			Ok(data[0])
		})
	}

	fn read_sequential(&mut self, address: u16, len: usize) -> crate::AResult<Vec<u8>> {
		let mut result = vec![0u8; len];
		let addr = [(address >> 8) as u8, address as u8];
		for (i, chunk) in result.chunks_mut(MAX_READ).enumerate() {
			// only the first message sets the address; afterwards the
			// internal counter continues (rolling over at the top)
			self.with_retry("sequential read", address, |t| {
				if 0 == i {
					let mut msgs = [t.write_msg(&addr), t.read_msg(chunk)];
					t.transfer(&mut msgs)
				} else {
					let mut msgs = [t.read_msg(chunk)];
					t.transfer(&mut msgs)
				}
			})?;
		}
		Ok(result)
	}

	fn probe_ack(&mut self) -> bool {
		// address only, no data: doesn't touch the internal address counter
		let mut msgs = [self.write_msg(&[])];
		match self.transfer(&mut msgs) {
			Ok(()) => true,
			Err(ref e) if is_nack(e) => false,
			Err(e) => {
				warn!("I2C probe on {} failed: {}", self.config.bus.display(), e);
				false
			},
		}
	}

	fn ack_poll_budget(&self) -> (usize, Duration) {
		(self.config.ack_poll_attempts, self.config.ack_poll_delay)
	}
}
