use std::path::PathBuf;
use std::time::Duration;

use crate::eeprom::consts::{
	ACK_POLL_ATTEMPTS,
	ACK_POLL_DELAY,
	BUS_ADDRESS,
};

mod linux;

// OS-specific. for now linux only.
pub use self::linux::{
	I2cTransport,
	open_i2c,
};

/// where to find the EEPROM; fixed for a given board
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct I2cConfig {
	pub bus: PathBuf,
	/// 7-bit slave address
	pub address: u16,
	/// attempts for a transaction the device doesn't acknowledge
	pub retries: usize,
	pub retry_delay: Duration,
	pub ack_poll_attempts: usize,
	pub ack_poll_delay: Duration,
}

impl Default for I2cConfig {
	fn default() -> Self {
		I2cConfig {
			bus: PathBuf::from("/dev/i2c-1"),
			address: BUS_ADDRESS,
			retries: 3,
			retry_delay: Duration::from_millis(1),
			ack_poll_attempts: ACK_POLL_ATTEMPTS,
			ack_poll_delay: ACK_POLL_DELAY,
		}
	}
}

impl I2cConfig {
	pub fn new<P: Into<PathBuf>>(bus: P, address: u16) -> Self {
		I2cConfig {
			bus: bus.into(),
			address,
			..Self::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_24lc512() {
		let config = I2cConfig::default();
		assert_eq!(config.address, 0x50);
		assert_eq!(config.retries, 3);

		let config = I2cConfig::new("/dev/i2c-0", 0x57);
		assert_eq!(config.bus, PathBuf::from("/dev/i2c-0"));
		assert_eq!(config.address, 0x57);
		assert_eq!(config.ack_poll_attempts, ACK_POLL_ATTEMPTS);
	}

	#[test]
	fn missing_bus_device() {
		let dir = tempfile::tempdir().unwrap();
		let bus = dir.path().join("i2c-404");
		let e = match open_i2c(I2cConfig::new(bus.clone(), 0x50)) {
			Ok(_) => panic!("opened missing bus"),
			Err(e) => e,
		};
		assert!(format!("{}", e).starts_with(&format!("couldn't open I2C bus {}", bus.display())));
	}
}
