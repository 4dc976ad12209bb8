use std::time::Duration;

use crate::eeprom::consts::{
	PROBE_ATTEMPTS,
	PROBE_BACKOFF,
};
use crate::eeprom::{
	Transport,
	reliable_sleep,
};
use crate::header::{
	HeaderManager,
	ProtectedRegion,
	StatusFlag,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Availability {
	Responding,
	NotResponding,
}

impl Availability {
	pub fn is_responding(self) -> bool {
		self == Availability::Responding
	}
}

/// Probes the EEPROM and moves the header in and out of
/// `StatusFlag::Unavailable`, remembering the status it had before the
/// outage.
#[derive(Clone, Debug)]
pub struct AvailabilityMonitor {
	attempts: usize,
	backoff: Duration,
	saved: Option<StatusFlag>,
}

impl Default for AvailabilityMonitor {
	fn default() -> Self {
		Self::new(PROBE_ATTEMPTS, PROBE_BACKOFF)
	}
}

impl AvailabilityMonitor {
	pub fn new(attempts: usize, backoff: Duration) -> Self {
		assert!(attempts > 0);
		AvailabilityMonitor {
			attempts,
			backoff,
			saved: None,
		}
	}

	/// status to go back to once the device responds again
	pub fn saved(&self) -> Option<StatusFlag> {
		self.saved
	}

	fn device_responds<T: Transport + ?Sized>(&self, transport: &mut T) -> bool {
		for attempt in 0..self.attempts {
			if attempt > 0 {
				reliable_sleep(self.backoff);
			}
			if transport.probe_ack() {
				return true;
			}
			debug!("EEPROM probe {}/{} not acknowledged", attempt + 1, self.attempts);
		}
		false
	}

	pub fn probe<T, R>(&mut self, transport: &mut T, header: &mut HeaderManager<R>) -> crate::AResult<Availability>
	where
		T: Transport + ?Sized,
		R: ProtectedRegion,
	{
		let responding = self.device_responds(transport);
		let status = header.status()?;

		if responding {
			if status == StatusFlag::Unavailable {
				// header may have been unavailable before we started (restart
				// during an outage); nothing to remember then
				let restore = self.saved.take().unwrap_or(StatusFlag::Normal);
				header.restore(restore)?;
				info!("EEPROM responding again, header status back to {}", restore);
			}
			Ok(Availability::Responding)
		} else {
			if status != StatusFlag::Unavailable {
				self.saved = Some(header.mark_unavailable()?);
				warn!("EEPROM not responding after {} attempts (header status was {})", self.attempts, status);
			}
			Ok(Availability::NotResponding)
		}
	}
}
