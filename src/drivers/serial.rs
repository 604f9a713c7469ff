// GestureGate - Serial Link Driver
//
// Raw tty access configured through termios. The read half is handed to the
// reader task; the write half stays in the shared link so the device
// commander can send while the reader blocks. Whoever sees an error closes
// the link; commands sent while it is closed are refused, not queued.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::{Arc, Mutex, MutexGuard};

use nix::sys::termios::{self, BaudRate, ControlFlags, SetArg, SpecialCharacterIndices};

use crate::config::SerialConfig;
use crate::error::TransportError;

/// Anything the device commander can write command lines to.
pub trait CommandSink: Send {
    fn is_open(&self) -> bool;

    /// Write one command followed by a newline.
    fn write_line(&mut self, line: &str) -> Result<(), TransportError>;
}

fn baud_rate(baud: u32) -> Option<BaudRate> {
    let rate = match baud {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        _ => return None,
    };
    Some(rate)
}

/// Open `port` and put it in raw 8N1 mode at `baud`. Reads block until at
/// least one byte arrives.
pub fn open_port(port: &str, baud: u32) -> Result<File, TransportError> {
    let rate = baud_rate(baud).ok_or(TransportError::UnsupportedBaud(baud))?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(port)?;

    let mut tty = termios::tcgetattr(&file).map_err(io::Error::from)?;
    termios::cfmakeraw(&mut tty);
    termios::cfsetspeed(&mut tty, rate).map_err(io::Error::from)?;
    tty.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    tty.control_flags &= !ControlFlags::CSTOPB;
    tty.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    tty.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    termios::tcsetattr(&file, SetArg::TCSANOW, &tty).map_err(io::Error::from)?;
    termios::tcflush(&file, termios::FlushArg::TCIOFLUSH).map_err(io::Error::from)?;

    Ok(file)
}

fn write_command(file: &mut File, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()
}

/// Shared handle to the link's write half.
#[derive(Debug, Clone)]
pub struct SerialLink {
    config: SerialConfig,
    writer: Arc<Mutex<Option<File>>>,
}

impl SerialLink {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn writer(&self) -> MutexGuard<'_, Option<File>> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the port, keep the write half and return the read half.
    pub fn open(&self) -> Result<File, TransportError> {
        let file = open_port(&self.config.port, self.config.baud)?;
        let reader = file.try_clone()?;
        *self.writer() = Some(file);
        Ok(reader)
    }

    /// Install an already open write half (pipes, pseudo-terminals in tests).
    pub fn attach(&self, writer: File) {
        *self.writer() = Some(writer);
    }

    pub fn close(&self) {
        if self.writer().take().is_some() {
            log::info!("Serial link {} closed", self.config.port);
        }
    }
}

impl CommandSink for SerialLink {
    fn is_open(&self) -> bool {
        self.writer().is_some()
    }

    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let mut guard = self.writer();
        let file = guard.as_mut().ok_or(TransportError::Unavailable)?;

        if let Err(e) = write_command(file, line) {
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }
}
