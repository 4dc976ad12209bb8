use failure::Fail;

/// Failures the driver reports with a stable identity, so callers can
/// decide between retrying, probing the device, or giving up.
///
/// Data loss is not in here: it is never a failure of a call, only the
/// persisted `StatusFlag::DataLost`.
#[derive(Clone, Copy, Debug, Fail, PartialEq, Eq)]
pub enum DriverError {
	/// device did not acknowledge within the bounded retry budget
	#[fail(display = "EEPROM did not acknowledge {} at 0x{:04x}", operation, address)]
	TransportTimeout {
		operation: &'static str,
		address: u16,
	},

	/// ack polling ran out of attempts while the write cycle was pending
	#[fail(display = "EEPROM write cycle did not finish")]
	WriteCycleTimeout,

	/// availability probe exhausted its attempts, or the header says so
	#[fail(display = "EEPROM not responding")]
	DeviceUnavailable,

	#[fail(display = "page write of {} bytes at 0x{:04x} crosses a page boundary", len, address)]
	PageOverflow {
		address: u16,
		len: usize,
	},

	#[fail(display = "header region is write protected (offset {})", offset)]
	HeaderLocked {
		offset: usize,
	},
}

impl DriverError {
	/// find a `DriverError` anywhere in the cause chain of `e` (errors
	/// usually arrive wrapped in context messages)
	pub fn find(e: &failure::Error) -> Option<DriverError> {
		e.iter_chain()
			.filter_map(|cause| cause.downcast_ref::<DriverError>())
			.next()
			.cloned()
	}

	pub fn is(e: &failure::Error, kind: DriverError) -> bool {
		Self::find(e) == Some(kind)
	}
}
