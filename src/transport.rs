use log::{debug, trace, warn};
use serialport::SerialPort;
use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::error::TransportError;

/// Clocked serial byte line the strip is attached to
pub trait Transport: Send {
    /// Limit the line clock to `hz`
    fn set_max_clock_rate(&mut self, hz: u32) -> Result<(), TransportError>;

    /// Shift `bytes` out on the line. Whatever is clocked back in is returned;
    /// write-only lines return an empty vector.
    fn transfer(&mut self, bytes: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// Serial adapter (USB to SPI bridge or similar) driving the strip
pub struct SerialTransport {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` with the line clocked at `clock_hz`
    pub fn open(port_name: &str, clock_hz: u32) -> Result<Self, TransportError> {
        let mut port = serialport::new(port_name, clock_hz)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|source| TransportError::Open {
                port: port_name.to_string(),
                source,
            })?;

        // Write timeout so a wedged adapter cannot block a show forever
        port.set_timeout(Duration::from_millis(1000))
            .map_err(|source| TransportError::Open {
                port: port_name.to_string(),
                source,
            })?;

        if let Err(e) = port.write_data_terminal_ready(true) {
            warn!("Failed to set DTR on {}: {}", port_name, e);
        }

        // Allow the adapter to initialize
        thread::sleep(Duration::from_millis(100));

        debug!("Opened {} at {} Hz", port_name, clock_hz);

        Ok(SerialTransport {
            port_name: port_name.to_string(),
            port,
        })
    }
}

impl Transport for SerialTransport {
    fn set_max_clock_rate(&mut self, hz: u32) -> Result<(), TransportError> {
        self.port
            .set_baud_rate(hz)
            .map_err(|source| TransportError::ClockRate { hz, source })
    }

    fn transfer(&mut self, bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        trace!("[{}] sent {} bytes", self.port_name, bytes.len());
        Ok(Vec::new())
    }
}

#[cfg(target_os = "linux")]
pub use spi::SpidevTransport;

#[cfg(target_os = "linux")]
mod spi {
    use log::{debug, trace};
    use spidev::{SpiModeFlags, Spidev, SpidevOptions};
    use std::io::Write;

    use super::Transport;
    use crate::error::TransportError;

    /// Default spidev `bufsiz`; longer writes are rejected by the kernel
    const MAX_TRANSFER: usize = 4096;

    pub fn spidev_path(bus: u32, device: u32) -> String {
        format!("/dev/spidev{}.{}", bus, device)
    }

    /// Strip wired straight to a Linux SPI controller
    pub struct SpidevTransport {
        path: String,
        spi: Spidev,
    }

    impl SpidevTransport {
        /// Open `/dev/spidev{bus}.{device}` in mode 0 with the clock capped
        /// at `clock_hz`
        pub fn open(bus: u32, device: u32, clock_hz: u32) -> Result<Self, TransportError> {
            let path = spidev_path(bus, device);
            let mut spi = Spidev::open(&path).map_err(|source| TransportError::Spi {
                path: path.clone(),
                source,
            })?;
            let options = SpidevOptions::new()
                .bits_per_word(8)
                .max_speed_hz(clock_hz)
                .mode(SpiModeFlags::SPI_MODE_0)
                .build();
            spi.configure(&options)
                .map_err(|source| TransportError::Spi {
                    path: path.clone(),
                    source,
                })?;

            debug!("Opened {} at {} Hz", path, clock_hz);

            Ok(SpidevTransport { path, spi })
        }
    }

    impl Transport for SpidevTransport {
        fn set_max_clock_rate(&mut self, hz: u32) -> Result<(), TransportError> {
            let options = SpidevOptions::new().max_speed_hz(hz).build();
            self.spi
                .configure(&options)
                .map_err(|source| TransportError::Spi {
                    path: self.path.clone(),
                    source,
                })
        }

        fn transfer(&mut self, bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
            // APA102 latches nothing on a clock pause, so chunking is safe
            for chunk in bytes.chunks(MAX_TRANSFER) {
                self.spi.write_all(chunk)?;
            }
            trace!("[{}] sent {} bytes", self.path, bytes.len());
            Ok(Vec::new())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_spidev_path() {
            assert_eq!(spidev_path(0, 1), "/dev/spidev0.1");
            assert_eq!(spidev_path(1, 0), "/dev/spidev1.0");
        }

        #[test]
        fn test_open_missing_device() {
            match SpidevTransport::open(250, 250, 1_000_000) {
                Err(TransportError::Spi { path, .. }) => assert_eq!(path, "/dev/spidev250.250"),
                Err(e) => panic!("unexpected error: {}", e),
                Ok(_) => panic!("opened a device that should not exist"),
            }
        }
    }
}

/// Transport that sends nothing and logs every transfer
#[derive(Debug, Default)]
pub struct DryRunTransport {
    clock_hz: u32,
    bytes_sent: u64,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

impl Transport for DryRunTransport {
    fn set_max_clock_rate(&mut self, hz: u32) -> Result<(), TransportError> {
        debug!("[dry-run] clock rate {} Hz", hz);
        self.clock_hz = hz;
        Ok(())
    }

    fn transfer(&mut self, bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "[dry-run @ {} Hz] {} bytes: {}",
                self.clock_hz,
                bytes.len(),
                hex_dump(bytes)
            );
        }
        self.bytes_sent += bytes.len() as u64;
        Ok(Vec::new())
    }
}

/// Space separated lowercase hex, as printed by the frame debug output
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Everything a `RecordingTransport` has seen, shared with the test
    #[derive(Debug, Default)]
    pub struct Recording {
        pub clock_hz: Option<u32>,
        pub transfers: Vec<Vec<u8>>,
        pub dropped: bool,
    }

    impl Recording {
        /// All transferred bytes concatenated, i.e. what went out on the wire
        pub fn wire(&self) -> Vec<u8> {
            self.transfers.concat()
        }
    }

    /// In-memory transport for tests. Fails every transfer after
    /// `fail_after` successful ones when set.
    pub struct RecordingTransport {
        pub log: Arc<Mutex<Recording>>,
        pub fail_after: Option<usize>,
    }

    impl RecordingTransport {
        pub fn new() -> (Self, Arc<Mutex<Recording>>) {
            let log = Arc::new(Mutex::new(Recording::default()));
            let transport = RecordingTransport {
                log: Arc::clone(&log),
                fail_after: None,
            };
            (transport, log)
        }

        pub fn failing_after(transfers: usize) -> (Self, Arc<Mutex<Recording>>) {
            let (mut transport, log) = Self::new();
            transport.fail_after = Some(transfers);
            (transport, log)
        }
    }

    impl Transport for RecordingTransport {
        fn set_max_clock_rate(&mut self, hz: u32) -> Result<(), TransportError> {
            self.log.lock().unwrap().clock_hz = Some(hz);
            Ok(())
        }

        fn transfer(&mut self, bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
            let mut log = self.log.lock().unwrap();
            if let Some(limit) = self.fail_after {
                if log.transfers.len() >= limit {
                    return Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "line unplugged",
                    )));
                }
            }
            log.transfers.push(bytes.to_vec());
            Ok(Vec::new())
        }
    }

    impl Drop for RecordingTransport {
        fn drop(&mut self) {
            if let Ok(mut log) = self.log.lock() {
                log.dropped = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x00, 0xff, 0x1a]), "00 ff 1a");
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn test_dry_run_counts_bytes() {
        let mut transport = DryRunTransport::new();
        transport.set_max_clock_rate(1_000_000).unwrap();
        assert!(transport.transfer(&[0, 0, 0, 0]).unwrap().is_empty());
        transport.transfer(&[0xFF, 1, 2, 3]).unwrap();
        assert_eq!(transport.bytes_sent(), 8);
    }

    #[test]
    fn test_recording_transport_fails_after_limit() {
        let (mut transport, log) = testing::RecordingTransport::failing_after(1);
        transport.transfer(&[1]).unwrap();
        assert!(matches!(transport.transfer(&[2]), Err(TransportError::Io(_))));
        assert_eq!(log.lock().unwrap().transfers.len(), 1);
        drop(transport);
        assert!(log.lock().unwrap().dropped);
    }
}
