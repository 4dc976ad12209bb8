#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate m24lc512_log;
use m24lc512_log::*;

use std::fs;
use std::io::{
	self,
	Read,
	Write,
};
use std::path::PathBuf;
use std::process::exit;

use m24lc512_log::eeprom::{
	PagedWriter,
	SimulatedEeprom,
	Transport,
};
use m24lc512_log::header::FileRegion;
use m24lc512_log::i2c::{
	I2cConfig,
	open_i2c,
};

fn parse_number(s: &str) -> AResult<u16> {
	let value = if s.starts_with("0x") {
		u16::from_str_radix(&s[2..], 16)
	} else {
		s.parse::<u16>()
	};
	value.map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid number {:?}: {}", s, e);
		e.context(msg).into()
	})
}

fn hexdump(start: u16, data: &[u8]) {
	for i in 0..data.len() {
		if 0 == i % 16 {
			print!("{:04x} ", start.wrapping_add(i as u16));
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", data[i]);
		if 15 == i % 16 {
			println!("");
		}
	}
	if 0 != data.len() % 16 {
		println!("");
	}
}

fn status<T: Transport>(device: &mut LogDevice<T, FileRegion>) -> AResult<()> {
	let header = device.header()?;
	println!("comm pointer:    0x{:04x}", header.comm_pointer);
	println!("write pointer:   0x{:04x}", header.write_pointer);
	println!("last batch:      {} bytes", header.bytes_written);
	println!("overwrite count: {}", header.overwrite_count);
	println!("status:          {}", header.status);
	Ok(())
}

fn append<T: Transport>(device: &mut LogDevice<T, FileRegion>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let data = match sub_m.value_of("FILE") {
		None | Some("-") => {
			let mut data = Vec::new();
			io::stdin().read_to_end(&mut data)?;
			data
		},
		Some(path) => fs::read(path).map_err(|e| {
			let msg = format!("couldn't read record {}: {}", path, e);
			failure::Error::from(e).context(msg)
		})?,
	};
	ensure!(!data.is_empty(), "empty record");

	if !device.probe_availability()? {
		return Err(DriverError::DeviceUnavailable.into());
	}
	let cursor = device.append(&data)?;
	info!("appended {} bytes, write pointer now 0x{:04x}", data.len(), cursor);
	Ok(())
}

fn dump<T: Transport>(device: &mut LogDevice<T, FileRegion>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let header = device.header()?;
	let data = device.unconsumed()?;
	if sub_m.is_present("raw") {
		io::stdout().write_all(&data)?;
	} else {
		hexdump(header.comm_pointer, &data);
	}
	Ok(())
}

fn probe<T: Transport>(device: &mut LogDevice<T, FileRegion>) -> AResult<()> {
	if device.probe_availability()? {
		println!("EEPROM responding");
	} else {
		println!("EEPROM not responding");
		exit(2);
	}
	Ok(())
}

// bring-up check: single byte writes and reads around 0xfa00, then a
// 60 byte page write at 0x0064 read back sequentially
fn demo<T: Transport>(transport: &mut T) -> AResult<()> {
	const BYTES: [(u16, u8); 6] = [
		(0xf9ff, 0x88), (0xfa00, 0x96), (0xfa01, 0x57),
		(0xfa02, 0x75), (0xfa03, 0x9b), (0xfa04, 0xba),
	];

	for &(address, data) in BYTES.iter() {
		transport.write_byte(address, data)?;
		transport.await_write_complete()?;
	}

	let mut read = vec![transport.read_byte(BYTES[0].0)?];
	for _ in 1..BYTES.len() {
		read.push(transport.read_current()?);
	}
	for (&(address, expected), &data) in BYTES.iter().zip(read.iter()) {
		ensure!(data == expected,
			"Verify failed at {:04x}: expected {:02x}, EEPROM has {:02x}", address, expected, data
		);
	}
	info!("byte write / read verified");

	let page: Vec<u8> = (0..60).collect();
	let start = 0x0064;
	let end = PagedWriter::new(&mut *transport).write(start, &page)?;
	let back = transport.read_sequential(start, page.len())?;
	ensure!(back == page, "Verify failed for page write at {:04x}", start);
	info!("page write 0x{:04x}..0x{:04x} verified", start, end);

	hexdump(start, &back);
	Ok(())
}

fn run<T: Transport>(device: &mut LogDevice<T, FileRegion>, matches: &clap::ArgMatches) -> AResult<()> {
	match matches.subcommand() {
		("status", _) => {
			status(device)
		},
		("init", _) => {
			device.header_reset()
		},
		("append", Some(sub_m)) => {
			append(device, sub_m)
		},
		("dump", Some(sub_m)) => {
			dump(device, sub_m)
		},
		("ack", _) => {
			device.request_ack()?;
			info!("transmission acknowledged, applied with the next append");
			Ok(())
		},
		("reset", _) => {
			device.request_reset()?;
			info!("log reset requested, applied with the next append");
			Ok(())
		},
		("probe", _) => {
			probe(device)
		},
		("demo", _) => {
			demo(device.transport())
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg bus: -b --bus +takes_value "I2C bus device (default: /dev/i2c-1)")
		(@arg address: -a --address +takes_value "7-bit bus address of the EEPROM (default: 0x50)")
		(@arg header: --header +takes_value "file holding the log header (default: m24lc512-header.bin)")
		(@arg simulate: --simulate +takes_value "use a simulated EEPROM stored in the given image file")
		(@subcommand status =>
			(about: "show log header")
		)
		(@subcommand init =>
			(about: "clear log header")
		)
		(@subcommand append =>
			(about: "append a record to the log")
			(@arg FILE: "file with record data (default: stdin)")
		)
		(@subcommand dump =>
			(about: "show data not yet acknowledged by the consumer")
			(@arg raw: -r --raw "write binary data to stdout")
		)
		(@subcommand ack =>
			(about: "acknowledge transmission of all unread data")
		)
		(@subcommand reset =>
			(about: "restart the log with the next append")
		)
		(@subcommand probe =>
			(about: "check whether the EEPROM responds")
		)
		(@subcommand demo =>
			(about: "write and verify test patterns (overwrites data at 0x0064 and 0xf9ff)")
		)
	).get_matches();

	let header_path = PathBuf::from(matches.value_of("header").unwrap_or("m24lc512-header.bin"));
	let region = FileRegion::open(&header_path)?;

	if let Some(image) = matches.value_of("simulate") {
		let image = PathBuf::from(image);
		let mut device = LogDevice::open(SimulatedEeprom::load(&image)?, region)?;
		let res = run(&mut device, &matches);
		let (sim, _) = device.into_parts();
		sim.save(&image)?;
		return res;
	}

	let mut config = I2cConfig::default();
	if let Some(bus) = matches.value_of("bus") {
		config.bus = PathBuf::from(bus);
	}
	if let Some(address) = matches.value_of("address") {
		config.address = parse_number(address)?;
		ensure!(config.address < 0x80, "not a 7-bit address: 0x{:x}", config.address);
	}
	let mut device = LogDevice::open(open_i2c(config)?, region)?;
	run(&mut device, &matches)
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
