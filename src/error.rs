use thiserror::Error;

/// Reasons a framed sentence is rejected before any field is read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Empty sentence")]
    Empty,

    #[error("Sentence is not ASCII")]
    NotAscii,

    #[error("Missing checksum marker")]
    NoChecksum,

    #[error("Checksum mismatch: sentence says {expected:02X}, computed {computed:02X}")]
    ChecksumInvalid { expected: u8, computed: u8 },
}

/// Orientation bus failures
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("I2C bus error: {0}")]
    Bus(#[from] std::io::Error),

    #[error("No supported IMU answered on the bus")]
    UnknownDevice,

    #[error("Short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("Sensor bus is held by another task")]
    Busy,
}

/// Failures while setting the system clock from a GPS fix
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClockError {
    #[error("Incomplete GPS time/date: '{time}' '{date}'")]
    Incomplete { time: String, date: String },

    #[error("Invalid GPS time/date: '{0}'")]
    Invalid(String),

    #[error("GPS time is {0} seconds behind system time")]
    MovingBackwards(i64),

    #[error("settimeofday failed: {0}")]
    SetFailed(String),
}
