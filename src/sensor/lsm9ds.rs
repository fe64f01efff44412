//! LSM9DS0 / LSM9DS1 over Linux `/dev/i2c-N`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use super::{ImuBus, SensorVariant};
use crate::error::SensorError;
use crate::types::{AccelData, GyroData, MagData, RawTriple};

/// `ioctl` request selecting the slave address for subsequent transfers
const I2C_SLAVE: u64 = 0x0703;
/// Register address bit enabling auto-increment on multi-byte reads
const AUTO_INCREMENT: u8 = 0x80;
const WHO_AM_I: u8 = 0x0F;

mod ds0 {
    pub const ACC_MAG_ADDRESS: u16 = 0x1E;
    pub const GYR_ADDRESS: u16 = 0x6A;
    pub const WHO_AM_I_XM: u8 = 0x49;
    pub const WHO_AM_I_G: u8 = 0xD4;

    pub const OUT_X_L_A: u8 = 0x28;
    pub const OUT_X_L_M: u8 = 0x08;
    pub const OUT_X_L_G: u8 = 0x28;

    /// (address, register, value)
    pub const ENABLE: &[(u16, u8, u8)] = &[
        // 100 Hz, all axes, continuous update
        (ACC_MAG_ADDRESS, 0x20, 0b0110_0111),
        // ±16 g
        (ACC_MAG_ADDRESS, 0x21, 0b0010_0000),
        // temperature on, mag 50 Hz
        (ACC_MAG_ADDRESS, 0x24, 0b1111_0000),
        // ±12 gauss
        (ACC_MAG_ADDRESS, 0x25, 0b0110_0000),
        // continuous conversion
        (ACC_MAG_ADDRESS, 0x26, 0b0000_0000),
        // normal power, all axes
        (GYR_ADDRESS, 0x20, 0b0000_1111),
        // 2000 dps
        (GYR_ADDRESS, 0x23, 0b0011_0000),
    ];
}

mod ds1 {
    pub const ACC_GYR_ADDRESS: u16 = 0x6A;
    pub const MAG_ADDRESS: u16 = 0x1C;
    pub const WHO_AM_I_XG: u8 = 0x68;
    pub const WHO_AM_I_M: u8 = 0x3D;

    pub const OUT_X_L_XL: u8 = 0x28;
    pub const OUT_X_L_G: u8 = 0x18;
    pub const OUT_X_L_M: u8 = 0x28;

    pub const ENABLE: &[(u16, u8, u8)] = &[
        // gyro axes
        (ACC_GYR_ADDRESS, 0x1E, 0b0011_1000),
        // gyro 476 Hz, 2000 dps
        (ACC_GYR_ADDRESS, 0x10, 0b1011_1000),
        (ACC_GYR_ADDRESS, 0x13, 0b1011_1000),
        // accel axes
        (ACC_GYR_ADDRESS, 0x1F, 0b0011_1000),
        // ±16 g
        (ACC_GYR_ADDRESS, 0x20, 0b0010_1000),
        // temp compensation, 80 Hz
        (MAG_ADDRESS, 0x20, 0b1001_1100),
        // ±12 gauss
        (MAG_ADDRESS, 0x21, 0b0100_0000),
        (MAG_ADDRESS, 0x22, 0b0000_0000),
        (MAG_ADDRESS, 0x23, 0b0000_0000),
    ];
}

/// Decide which package answered the WHO_AM_I probes.
///
/// `probe(address, register)` returns the byte read, or `None` when nothing
/// answered.
pub fn detect_variant<F>(mut probe: F) -> Option<SensorVariant>
where
    F: FnMut(u16, u8) -> Option<u8>,
{
    let xm = probe(ds0::ACC_MAG_ADDRESS, WHO_AM_I);
    let g = probe(ds0::GYR_ADDRESS, WHO_AM_I);
    if xm == Some(ds0::WHO_AM_I_XM) && g == Some(ds0::WHO_AM_I_G) {
        return Some(SensorVariant::Lsm9ds0);
    }

    let m = probe(ds1::MAG_ADDRESS, WHO_AM_I);
    let xg = probe(ds1::ACC_GYR_ADDRESS, WHO_AM_I);
    if xg == Some(ds1::WHO_AM_I_XG) && m == Some(ds1::WHO_AM_I_M) {
        return Some(SensorVariant::Lsm9ds1);
    }
    None
}

pub struct Lsm9dsBus {
    file: File,
    variant: SensorVariant,
    selected: Option<u16>,
}

impl Lsm9dsBus {
    /// Open `/dev/i2c-<bus>`, detect the sensor and enable it.
    pub fn open(bus: u8) -> Result<Self, SensorError> {
        let path = format!("/dev/i2c-{}", bus);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut selected = None;
        let variant = {
            let mut raw = RawI2c {
                file: &file,
                selected: &mut selected,
            };
            detect_variant(|addr, reg| raw.read_byte(addr, reg).ok())
                .ok_or(SensorError::UnknownDevice)?
        };
        log::info!("[orientation] {} detected on {}", variant.name(), path);

        let mut bus = Lsm9dsBus {
            file,
            variant,
            selected,
        };
        bus.enable()?;
        Ok(bus)
    }

    fn enable(&mut self) -> Result<(), SensorError> {
        let table = match self.variant {
            SensorVariant::Lsm9ds0 => ds0::ENABLE,
            SensorVariant::Lsm9ds1 => ds1::ENABLE,
        };
        for &(addr, reg, value) in table {
            self.raw().write_byte(addr, reg, value)?;
        }
        Ok(())
    }

    fn raw(&mut self) -> RawI2c<'_> {
        RawI2c {
            file: &self.file,
            selected: &mut self.selected,
        }
    }

    fn read_triple(&mut self, addr: u16, reg: u8) -> Result<RawTriple, SensorError> {
        let block = self.raw().read_block(addr, reg | AUTO_INCREMENT)?;
        Ok(RawTriple::from_le_bytes(&block))
    }
}

impl ImuBus for Lsm9dsBus {
    fn variant(&self) -> SensorVariant {
        self.variant
    }

    fn read_acc(&mut self) -> Result<AccelData, SensorError> {
        match self.variant {
            SensorVariant::Lsm9ds0 => self.read_triple(ds0::ACC_MAG_ADDRESS, ds0::OUT_X_L_A),
            SensorVariant::Lsm9ds1 => self.read_triple(ds1::ACC_GYR_ADDRESS, ds1::OUT_X_L_XL),
        }
    }

    fn read_gyro(&mut self) -> Result<GyroData, SensorError> {
        match self.variant {
            SensorVariant::Lsm9ds0 => self.read_triple(ds0::GYR_ADDRESS, ds0::OUT_X_L_G),
            SensorVariant::Lsm9ds1 => self.read_triple(ds1::ACC_GYR_ADDRESS, ds1::OUT_X_L_G),
        }
    }

    fn read_mag(&mut self) -> Result<MagData, SensorError> {
        match self.variant {
            SensorVariant::Lsm9ds0 => self.read_triple(ds0::ACC_MAG_ADDRESS, ds0::OUT_X_L_M),
            SensorVariant::Lsm9ds1 => self.read_triple(ds1::MAG_ADDRESS, ds1::OUT_X_L_M),
        }
    }
}

/// Register-level transfers on an open bus, tracking the selected slave.
struct RawI2c<'a> {
    file: &'a File,
    selected: &'a mut Option<u16>,
}

impl RawI2c<'_> {
    fn select(&mut self, addr: u16) -> Result<(), SensorError> {
        if *self.selected == Some(addr) {
            return Ok(());
        }
        // SAFETY: fd is an open i2c-dev node; I2C_SLAVE takes the address by value
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SLAVE as _,
                addr as libc::c_ulong,
            )
        };
        if rc < 0 {
            *self.selected = None;
            return Err(SensorError::Bus(std::io::Error::last_os_error()));
        }
        *self.selected = Some(addr);
        Ok(())
    }

    fn write_byte(&mut self, addr: u16, reg: u8, value: u8) -> Result<(), SensorError> {
        self.select(addr)?;
        let mut file = self.file;
        file.write_all(&[reg, value])?;
        Ok(())
    }

    fn read_byte(&mut self, addr: u16, reg: u8) -> Result<u8, SensorError> {
        self.select(addr)?;
        let mut file = self.file;
        file.write_all(&[reg])?;
        let mut buf = [0u8; 1];
        let got = file.read(&mut buf)?;
        if got != 1 {
            return Err(SensorError::ShortRead { expected: 1, got });
        }
        Ok(buf[0])
    }

    fn read_block(&mut self, addr: u16, reg: u8) -> Result<[u8; 6], SensorError> {
        self.select(addr)?;
        let mut file = self.file;
        file.write_all(&[reg])?;
        let mut block = [0u8; 6];
        let got = file.read(&mut block)?;
        if got != block.len() {
            return Err(SensorError::ShortRead {
                expected: block.len(),
                got,
            });
        }
        Ok(block)
    }
}
