//! End-to-end behaviour of the circular log on a simulated 24LC512

use m24lc512_log::eeprom::consts::{
	CAPACITY,
	PAGE_SIZE,
};
use m24lc512_log::eeprom::{
	PagedWriter,
	SimulatedEeprom,
};
use m24lc512_log::header::{
	FileRegion,
	MemoryRegion,
	ProtectedRegion,
};
use m24lc512_log::{
	AvailabilityMonitor,
	DriverError,
	Header,
	LogDevice,
	StatusFlag,
};

use std::time::Duration;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
	(0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

fn device_with(header: Header) -> LogDevice<SimulatedEeprom, MemoryRegion> {
	let mut region = MemoryRegion::new();
	header.write_to(&mut *region.unlock().unwrap()).unwrap();
	let monitor = AvailabilityMonitor::new(3, Duration::from_micros(10));
	LogDevice::with_monitor(SimulatedEeprom::with_write_cycle(1), region, monitor).unwrap()
}

/// Writes land exactly where requested; the simulated device would
/// scramble any chunk crossing a page, so intact data means no chunk did.
#[test]
fn paged_writes_cover_exact_range() {
	let cases: &[(u16, usize)] = &[
		(0, 1),
		(100, 60),
		(127, 2),
		(128, 128),
		(4000, 1000),
		(65407, 300),
		(65500, 40),
		(65535, 1),
		(12345, CAPACITY),
	];
	for &(cursor, len) in cases {
		let data = pattern(len, cursor as u8);
		let mut writer = PagedWriter::new(SimulatedEeprom::new());
		let end = writer.write(cursor, &data).unwrap();
		assert_eq!(end as usize, (cursor as usize + len) % CAPACITY);

		let sim = writer.transport();
		for (i, &b) in data.iter().enumerate() {
			assert_eq!(sim.memory()[(cursor as usize + i) % CAPACITY], b, "cursor {} len {} byte {}", cursor, len, i);
		}
		for w in sim.writes() {
			assert!(w.len <= PAGE_SIZE);
			assert_eq!(w.address as usize / PAGE_SIZE, (w.address as usize + w.len - 1) / PAGE_SIZE);
		}
	}
}

#[test]
fn scenario_page_split() {
	let mut dev = device_with(Header::default());
	let cursor = dev.paged_write(100, &pattern(60, 0)).unwrap();
	assert_eq!(cursor, 160);
	let writes: Vec<(u16, usize)> = dev.transport().writes().iter().map(|w| (w.address, w.len)).collect();
	assert_eq!(writes, vec![(100, 28), (128, 32)]);
}

#[test]
fn scenario_wrap_loses_data() {
	let mut dev = device_with(Header {
		comm_pointer: 0,
		write_pointer: 65500,
		..Header::default()
	});
	let cursor = dev.append(&pattern(40, 1)).unwrap();
	assert_eq!(cursor, 4);

	let writes: Vec<(u16, usize)> = dev.transport().writes().iter().map(|w| (w.address, w.len)).collect();
	assert_eq!(writes, vec![(65500, 36), (0, 4)]);

	let h = dev.header().unwrap();
	assert_eq!(h.overwrite_count, 1);
	assert_eq!(h.status, StatusFlag::DataLost);
	assert_eq!(h.comm_pointer, 4);
	assert_eq!(h.write_pointer, 4);
	assert_eq!(h.bytes_written, 40);
}

/// Two wraps within one batch are counted twice.
#[test]
fn overwrite_count_matches_wrap_events() {
	let mut dev = device_with(Header {
		comm_pointer: 10,
		write_pointer: 100,
		..Header::default()
	});
	let end = dev.paged_write(65000, &pattern(CAPACITY, 2)).unwrap();
	assert_eq!(end, 65000);
	let end = dev.paged_write(end, &pattern(1000, 3)).unwrap();
	dev.header_update(end, 1000).unwrap();

	let h = dev.header().unwrap();
	assert_eq!(h.overwrite_count, 2);
	assert_eq!(h.status, StatusFlag::DataLost);
}

#[test]
fn ack_and_reset_requests() {
	let mut dev = device_with(Header::default());
	dev.append(&pattern(300, 4)).unwrap();
	dev.request_ack().unwrap();
	assert_eq!(dev.header().unwrap().status, StatusFlag::AckPending);
	dev.append(&pattern(20, 5)).unwrap();

	let h = dev.header().unwrap();
	assert_eq!((h.comm_pointer, h.write_pointer, h.status), (300, 320, StatusFlag::Normal));
	assert_eq!(dev.unconsumed().unwrap(), pattern(20, 5));

	dev.request_reset().unwrap();
	dev.append(&pattern(8, 6)).unwrap();
	let h = dev.header().unwrap();
	assert_eq!((h.comm_pointer, h.write_pointer, h.overwrite_count), (0, 0, 0));
	assert_eq!(h.status, StatusFlag::Normal);

	// the log restarts at the beginning of the EEPROM
	assert_eq!(dev.append(&pattern(8, 7)).unwrap(), 8);
}

#[test]
fn header_reset_zeroes_everything() {
	let mut dev = device_with(Header {
		comm_pointer: 1,
		write_pointer: 2,
		bytes_written: 3,
		overwrite_count: 4,
		status: StatusFlag::DataLost,
	});
	assert_eq!(dev.tracker().count(), 4);
	dev.header_reset().unwrap();
	assert_eq!(dev.header().unwrap(), Header::default());
	assert_eq!(dev.tracker().count(), 0);
	assert!(dev.header_manager().region().is_write_protected());
}

#[test]
fn outage_and_recovery() {
	let mut dev = device_with(Header {
		status: StatusFlag::AckPending,
		..Header::default()
	});

	dev.transport().set_connected(false);
	assert!(!dev.probe_availability().unwrap());
	assert_eq!(dev.header().unwrap().status, StatusFlag::Unavailable);

	let e = dev.append(b"lost?").unwrap_err();
	assert!(DriverError::is(&e, DriverError::DeviceUnavailable));
	let e = dev.header_update(5, 5).unwrap_err();
	assert!(DriverError::is(&e, DriverError::DeviceUnavailable));

	dev.transport().set_connected(true);
	assert!(dev.probe_availability().unwrap());
	assert_eq!(dev.header().unwrap().status, StatusFlag::AckPending);
}

#[test]
fn write_failure_is_reported_as_timeout() {
	let mut dev = device_with(Header::default());
	dev.transport().set_connected(false);
	let e = dev.append(b"abc").unwrap_err();
	match DriverError::find(&e) {
		Some(DriverError::TransportTimeout { address, .. }) => assert_eq!(address, 0),
		other => panic!("unexpected error {:?}", other),
	}
}

/// Header survives a restart through its file; the tracker picks up
/// where it left.
#[test]
fn file_backed_header_across_restart() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("header.bin");

	let sim = {
		let mut dev = LogDevice::open(SimulatedEeprom::new(), FileRegion::open(&path).unwrap()).unwrap();
		dev.header_reset().unwrap();
		dev.paged_write(65530, &pattern(6, 8)).unwrap();
		dev.header_update(0, 6).unwrap();
		assert_eq!(dev.header().unwrap().status, StatusFlag::DataLost);
		// consumer picked everything up
		dev.request_ack().unwrap();
		dev.append(&pattern(50, 9)).unwrap();
		dev.into_parts().0
	};

	let mut dev = LogDevice::open(sim, FileRegion::open(&path).unwrap()).unwrap();
	let h = dev.header().unwrap();
	assert_eq!(h.write_pointer, 50);
	assert_eq!(h.overwrite_count, 1);
	assert_eq!(dev.tracker().count(), 1);
	assert_eq!(dev.unconsumed().unwrap(), pattern(50, 9));
}
