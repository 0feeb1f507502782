//! Virtual Marlin serial port for the Dremel 3D45.
//!
//! Print hosts that only speak serial GCode talk to a [`session::Session`],
//! which translates their commands into calls on the printer's REST command
//! endpoint and answers in Marlin's response vocabulary.

pub mod client;
pub mod config;
pub mod file_manager;
pub mod gcode;
pub mod print_job;
pub mod protocol;
pub mod session;
pub mod temperature;

pub use client::{ClientError, PrinterClient};
pub use config::{load_config, Config, ConfigError};
pub use file_manager::{SdIndex, SdIndexEntry, SdIndexError};
pub use session::{Session, SessionError, SessionStatus};
