use std::{
    io::{self, Read, Write},
    path::Path,
    time::Duration,
};

use linkbridge_tlv::UartPort;

/// The on-host [`UartPort`]: a real serial device opened via `serialport`.
///
/// `try_read` and `poll_byte` both rely on the port's configured read
/// timeout rather than the OS's non-blocking mode (`serialport` has no
/// portable non-blocking mode across its backends), so every read is
/// bounded by `timeout` regardless of which of the two callers invoked it.
pub struct DeviceUart {
    port: Box<dyn serialport::SerialPort>,
}

impl DeviceUart {
    pub fn open(path: &Path, baud: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(path.to_string_lossy(), baud)
            .timeout(Duration::from_millis(10))
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()?;
        Ok(Self { port })
    }
}

impl UartPort for DeviceUart {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.set_timeout(Duration::ZERO).ok();
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn poll_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        self.port.set_timeout(timeout).ok();
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
