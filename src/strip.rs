use log::{debug, trace};

use crate::color;
use crate::error::{ConfigurationError, MirrorError, TransportError};
use crate::mirror::{Mirror, SharedMirror};
use crate::protocol::{self, BYTES_PER_LED, MAX_LEDS};
use crate::transport::{hex_dump, Transport};

/// What an animation can do with an LED strip.
///
/// Pixel writes only touch the buffer; nothing changes on the strip until
/// `show` is called.
pub trait Strip {
    fn num_leds(&self) -> usize;

    /// Buffer a color. Indices outside the strip are silently ignored so
    /// animations can paint without bounds checks.
    fn set_pixel(&mut self, index: isize, red: u8, green: u8, blue: u8);

    /// Buffered (not necessarily shown) color of a pixel.
    ///
    /// # Panics
    ///
    /// If `index` is not on the strip.
    fn get_pixel(&self, index: usize) -> (u8, u8, u8);

    /// Buffer a brightness of 0-100. Out-of-range indices are ignored.
    fn set_brightness(&mut self, index: isize, brightness: u8);

    /// Send the buffer to the LEDs
    fn show(&mut self) -> Result<(), TransportError>;

    /// Turn every pixel off in the buffer, keeping brightness
    fn clear_buffer(&mut self);

    /// Copy the buffer into the mirror
    fn sync_up(&mut self) -> Result<(), MirrorError>;

    /// Copy the mirror into the buffer
    fn sync_down(&mut self) -> Result<(), MirrorError>;

    /// Rotate pixels as a ring. Positive moves pixel `n` to `n - positions`.
    fn rotate(&mut self, positions: isize);

    /// Release the transport. Later `show` calls fail.
    fn close(&mut self);

    /// Buffer a packed `0xRRGGBB` color
    fn set_pixel_rgb(&mut self, index: isize, rgb: u32) {
        let (red, green, blue) = color::unpack(rgb);
        self.set_pixel(index, red, green, blue);
    }

    fn fill(&mut self, red: u8, green: u8, blue: u8) {
        for index in 0..self.num_leds() {
            self.set_pixel(index as isize, red, green, blue);
        }
    }

    fn set_global_brightness(&mut self, brightness: u8) {
        for index in 0..self.num_leds() {
            self.set_brightness(index as isize, brightness);
        }
    }

    /// Clear the buffer and show it
    fn clear_strip(&mut self) -> Result<(), TransportError> {
        self.clear_buffer();
        self.show()
    }
}

/// APA102 ("DotStar") strip on a clocked serial line.
///
/// Per LED the line carries one 4-byte record `[prefix, blue, green, red]`,
/// preceded by a 32-bit zero start frame and followed by a flush of zero
/// bytes. The buffer holds the records in wire order.
pub struct Apa102Strip<T: Transport> {
    num_leds: usize,
    leds: Vec<u8>,
    mirror: Box<dyn Mirror>,
    transport: Option<T>,
    frames_shown: u64,
}

impl<T: Transport> Apa102Strip<T> {
    /// Set up a strip of `num_leds` LEDs on `transport`
    pub fn new(
        mut transport: T,
        num_leds: usize,
        max_clock_speed_hz: u32,
        initial_brightness: u8,
    ) -> Result<Self, ConfigurationError> {
        if num_leds > MAX_LEDS {
            return Err(ConfigurationError::TooManyLeds {
                requested: num_leds,
                max: MAX_LEDS,
            });
        }

        // Clock limit is advisory; a line that cannot change speed keeps its own
        if let Err(e) = transport.set_max_clock_rate(max_clock_speed_hz) {
            log::warn!("Could not set clock rate: {}", e);
        }

        let mut strip = Apa102Strip {
            num_leds,
            leds: vec![0; num_leds * BYTES_PER_LED],
            mirror: Box::new(SharedMirror::new(num_leds * BYTES_PER_LED)),
            transport: Some(transport),
            frames_shown: 0,
        };
        strip.set_global_brightness(initial_brightness);
        strip.sync_up()?;

        debug!(
            "APA102 strip: {} LEDs, {} Hz, brightness {}",
            num_leds, max_clock_speed_hz, initial_brightness
        );

        Ok(strip)
    }

    /// Replace the default in-process mirror, e.g. with a file other
    /// processes can open. The mirror is seeded with the current buffer.
    pub fn with_mirror(mut self, mirror: Box<dyn Mirror>) -> Result<Self, ConfigurationError> {
        if mirror.len() != self.leds.len() {
            return Err(ConfigurationError::MirrorLength {
                expected: self.leds.len(),
                actual: mirror.len(),
            });
        }
        self.mirror = mirror;
        self.sync_up()?;
        Ok(self)
    }

    /// Raw buffer in wire order
    #[allow(dead_code)]
    pub fn buffer(&self) -> &[u8] {
        &self.leds
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    #[allow(dead_code)]
    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    fn offset(&self, index: isize) -> Option<usize> {
        if index < 0 || index as usize >= self.num_leds {
            return None; // invisible pixel
        }
        Some(index as usize * BYTES_PER_LED)
    }
}

impl<T: Transport> Strip for Apa102Strip<T> {
    fn num_leds(&self) -> usize {
        self.num_leds
    }

    fn set_pixel(&mut self, index: isize, red: u8, green: u8, blue: u8) {
        let Some(start) = self.offset(index) else {
            return;
        };
        self.leds[start + 3] = red;
        self.leds[start + 2] = green;
        self.leds[start + 1] = blue;
    }

    fn get_pixel(&self, index: usize) -> (u8, u8, u8) {
        let start = index * BYTES_PER_LED;
        let record = &self.leds[start..start + BYTES_PER_LED];
        (record[3], record[2], record[1])
    }

    fn set_brightness(&mut self, index: isize, brightness: u8) {
        if let Some(start) = self.offset(index) {
            self.leds[start] = protocol::prefix(brightness);
        }
    }

    fn show(&mut self) -> Result<(), TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "Frame: {}",
                hex_dump(&protocol::build_frame(&self.leds, self.num_leds))
            );
        }

        transport.transfer(&protocol::start_frame())?;
        transport.transfer(&self.leds)?;
        transport.transfer(&protocol::end_frame(self.num_leds))?;

        self.frames_shown += 1;
        Ok(())
    }

    fn clear_buffer(&mut self) {
        for record in self.leds.chunks_exact_mut(BYTES_PER_LED) {
            record[1..].fill(0);
        }
    }

    fn sync_up(&mut self) -> Result<(), MirrorError> {
        trace!("Writing buffer to mirror");
        self.mirror.publish(&self.leds)
    }

    fn sync_down(&mut self) -> Result<(), MirrorError> {
        trace!("Reading buffer from mirror");
        self.mirror.fetch(&mut self.leds)?;
        // Another writer may have left garbage in the fixed prefix bits
        for record in self.leds.chunks_exact_mut(BYTES_PER_LED) {
            record[0] |= 0b1110_0000;
        }
        Ok(())
    }

    fn rotate(&mut self, positions: isize) {
        if self.num_leds == 0 {
            return;
        }
        let cutoff = BYTES_PER_LED * positions.rem_euclid(self.num_leds as isize) as usize;
        self.leds.rotate_left(cutoff);
    }

    fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("Transport released after {} frames", self.frames_shown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;

    fn strip(num_leds: usize) -> Apa102Strip<RecordingTransport> {
        let (transport, _) = RecordingTransport::new();
        Apa102Strip::new(transport, num_leds, 4_000_000, 100).unwrap()
    }

    #[test]
    fn test_new_rejects_oversized_strip() {
        let (transport, _) = RecordingTransport::new();
        let result = Apa102Strip::new(transport, 1025, 4_000_000, 100);
        assert!(matches!(
            result,
            Err(ConfigurationError::TooManyLeds { requested: 1025, max: 1024 })
        ));
    }

    #[test]
    fn test_new_initializes_buffer() {
        let (transport, log) = RecordingTransport::new();
        let strip = Apa102Strip::new(transport, 1024, 8_000_000, 50).unwrap();
        assert_eq!(strip.buffer().len(), 4 * 1024);
        assert_eq!(log.lock().unwrap().clock_hz, Some(8_000_000));
        for record in strip.buffer().chunks(4) {
            assert_eq!(record, &[protocol::prefix(50), 0, 0, 0]);
        }
        assert!(log.lock().unwrap().transfers.is_empty());
    }

    #[test]
    fn test_set_get_pixel() {
        let mut strip = strip(5);
        strip.set_pixel(2, 10, 20, 30);
        strip.set_pixel(1, 1, 1, 1);
        strip.set_pixel(3, 2, 2, 2);
        assert_eq!(strip.get_pixel(2), (10, 20, 30));
        assert_eq!(&strip.buffer()[8..12], &[0xFF, 30, 20, 10]);
    }

    #[test]
    fn test_set_pixel_out_of_range_is_noop() {
        let mut strip = strip(3);
        strip.set_pixel(0, 9, 9, 9);
        let before = strip.buffer().to_vec();
        strip.set_pixel(-1, 255, 255, 255);
        strip.set_pixel(3, 255, 255, 255);
        strip.set_pixel(isize::MAX, 255, 255, 255);
        strip.set_brightness(-4, 0);
        strip.set_brightness(3, 0);
        assert_eq!(strip.buffer(), &before[..]);
    }

    #[test]
    #[should_panic]
    fn test_get_pixel_out_of_range_panics() {
        strip(2).get_pixel(2);
    }

    #[test]
    fn test_set_brightness_keeps_color() {
        let mut strip = strip(2);
        strip.set_pixel(1, 1, 2, 3);
        strip.set_brightness(1, 0);
        assert_eq!(&strip.buffer()[4..8], &[0xE0, 3, 2, 1]);
        assert_eq!(strip.buffer()[0], 0xFF);
    }

    #[test]
    fn test_show_three_led_frame() {
        let (transport, log) = RecordingTransport::new();
        let mut strip = Apa102Strip::new(transport, 3, 4_000_000, 100).unwrap();
        strip.set_pixel(0, 255, 0, 0);
        strip.set_pixel(1, 0, 255, 0);
        strip.set_pixel(2, 0, 0, 255);
        strip.show().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.transfers.len(), 3);
        assert_eq!(log.transfers[0], vec![0, 0, 0, 0]);
        assert_eq!(log.transfers[2], vec![0]);
        assert_eq!(
            log.wire(),
            vec![0, 0, 0, 0, 0xFF, 0, 0, 255, 0xFF, 0, 255, 0, 0xFF, 255, 0, 0, 0]
        );
        assert_eq!(strip.frames_shown(), 1);
    }

    #[test]
    fn test_show_propagates_transport_error() {
        let (transport, _) = RecordingTransport::failing_after(1);
        let mut strip = Apa102Strip::new(transport, 2, 4_000_000, 100).unwrap();
        assert!(matches!(strip.show(), Err(TransportError::Io(_))));
        assert_eq!(strip.frames_shown(), 0);
    }

    #[test]
    fn test_close_releases_transport() {
        let (transport, log) = RecordingTransport::new();
        let mut strip = Apa102Strip::new(transport, 2, 4_000_000, 100).unwrap();
        strip.close();
        assert!(strip.is_closed());
        assert!(log.lock().unwrap().dropped);
        assert!(matches!(strip.show(), Err(TransportError::Closed)));
        strip.close();
    }

    #[test]
    fn test_clear_buffer_keeps_prefix() {
        let mut strip = strip(3);
        strip.fill(1, 2, 3);
        strip.set_brightness(1, 10);
        strip.clear_buffer();
        assert_eq!(
            strip.buffer(),
            &[0xFF, 0, 0, 0, protocol::prefix(10), 0, 0, 0, 0xFF, 0, 0, 0]
        );
    }

    #[test]
    fn test_clear_strip_shows() {
        let (transport, log) = RecordingTransport::new();
        let mut strip = Apa102Strip::new(transport, 1, 4_000_000, 100).unwrap();
        strip.set_pixel_rgb(0, 0x123456);
        assert_eq!(strip.get_pixel(0), (0x12, 0x34, 0x56));
        strip.clear_strip().unwrap();
        assert_eq!(log.lock().unwrap().wire(), vec![0, 0, 0, 0, 0xFF, 0, 0, 0, 0]);
    }

    #[test]
    fn test_rotate() {
        let mut strip = strip(4);
        for i in 0..4 {
            strip.set_pixel(i, i as u8, 0, 0);
        }
        strip.rotate(1);
        let reds: Vec<u8> = (0..4).map(|i| strip.get_pixel(i).0).collect();
        assert_eq!(reds, vec![1, 2, 3, 0]);

        strip.rotate(-2);
        let reds: Vec<u8> = (0..4).map(|i| strip.get_pixel(i).0).collect();
        assert_eq!(reds, vec![3, 0, 1, 2]);
    }

    #[test]
    fn test_rotate_inverse_restores() {
        for num_leds in [1usize, 2, 7, 60] {
            let mut strip = strip(num_leds);
            for i in 0..num_leds {
                strip.set_pixel(i as isize, i as u8, (i * 3) as u8, 255 - i as u8);
                strip.set_brightness(i as isize, (i % 101) as u8);
            }
            let original = strip.buffer().to_vec();
            for p in [-130isize, -61, -1, 0, 1, 5, 59, 60, 1000] {
                strip.rotate(p);
                strip.rotate(-p);
                assert_eq!(strip.buffer(), &original[..], "leds {} p {}", num_leds, p);
            }
        }
    }

    #[test]
    fn test_rotate_empty_strip() {
        let mut strip = strip(0);
        strip.rotate(3);
        assert!(strip.buffer().is_empty());
    }

    #[test]
    fn test_sync_round_trip_is_noop() {
        let mut strip = strip(4);
        strip.set_pixel(0, 1, 2, 3);
        strip.set_pixel(3, 4, 5, 6);
        let before = strip.buffer().to_vec();
        strip.sync_up().unwrap();
        strip.sync_down().unwrap();
        assert_eq!(strip.buffer(), &before[..]);
    }

    #[test]
    fn test_sync_down_reads_foreign_writes() {
        let (transport, _) = RecordingTransport::new();
        let mirror = SharedMirror::new(8);
        let mut strip = Apa102Strip::new(transport, 2, 4_000_000, 100)
            .unwrap()
            .with_mirror(Box::new(mirror.clone()))
            .unwrap();
        assert_eq!(mirror.snapshot(), strip.buffer());

        mirror.publish(&[0x00, 3, 2, 1, 0xE1, 6, 5, 4]).unwrap();
        strip.sync_down().unwrap();
        assert_eq!(strip.get_pixel(0), (1, 2, 3));
        assert_eq!(strip.get_pixel(1), (4, 5, 6));
        assert_eq!(strip.buffer()[0], 0xE0);
        assert_eq!(strip.buffer()[4], 0xE1);
    }

    #[test]
    fn test_with_mirror_rejects_wrong_length() {
        let result = strip(2).with_mirror(Box::new(SharedMirror::new(7)));
        assert!(matches!(
            result,
            Err(ConfigurationError::MirrorLength { expected: 8, actual: 7 })
        ));
    }
}
