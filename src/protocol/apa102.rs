/// Longest strip the driver accepts
pub const MAX_LEDS: usize = 1024;

/// Clock rate used when the configuration does not name one
pub const DEFAULT_CLOCK_HZ: u32 = 4_000_000;

/// Bytes per pixel record: prefix, blue, green, red
pub const BYTES_PER_LED: usize = 4;

/// Build the brightness prefix byte of a pixel record.
///
/// Brightness 0..=100 is mapped onto the 5-bit hardware range 0..=31.
/// The top three bits are always set: `1 1 1 b4 b3 b2 b1 b0`.
pub fn prefix(brightness: u8) -> u8 {
    let brightness = brightness.min(100) as f32;
    let level = (brightness / 100.0 * 31.0).round() as u8;
    (level & 0b0001_1111) | 0b1110_0000
}

/// 32 zero bits tell the first LED that a color record follows
pub fn start_frame() -> [u8; 4] {
    [0; 4]
}

/// Trailing flush for a strip of `num_leds` LEDs.
///
/// Every LED delays the data by half a clock edge, so the last record needs
/// `num_leds / 2` extra clock pulses to arrive. Those bits are rounded up to
/// whole zero bytes.
pub fn end_frame(num_leds: usize) -> Vec<u8> {
    vec![0x00; num_leds.div_ceil(16)]
}

/// Build the complete wire frame: start frame, pixel records, end frame
pub fn build_frame(buffer: &[u8], num_leds: usize) -> Vec<u8> {
    let end = end_frame(num_leds);
    let mut frame = Vec::with_capacity(4 + buffer.len() + end.len());

    frame.extend_from_slice(&start_frame());
    frame.extend_from_slice(buffer);
    frame.extend_from_slice(&end);

    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_fixed_bits() {
        for brightness in 0..=100u8 {
            assert_eq!(prefix(brightness) & 0xE0, 0xE0, "brightness {}", brightness);
        }
    }

    #[test]
    fn test_prefix_quantization() {
        for brightness in 0..=100u8 {
            let expected = (brightness as f64 * 31.0 / 100.0).round() as u8;
            assert_eq!(prefix(brightness) & 0x1F, expected, "brightness {}", brightness);
        }
        assert_eq!(prefix(0), 0xE0);
        assert_eq!(prefix(50), 0xF0); // 15.5 rounds up to 16
        assert_eq!(prefix(100), 0xFF);
    }

    #[test]
    fn test_prefix_clamps_overrange() {
        assert_eq!(prefix(200), prefix(100));
    }

    #[test]
    fn test_start_frame() {
        assert_eq!(start_frame(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_end_frame_length() {
        for num_leds in 1..=MAX_LEDS {
            let expected = (num_leds + 15) / 16;
            let frame = end_frame(num_leds);
            assert_eq!(frame.len(), expected, "num_leds {}", num_leds);
            assert!(frame.iter().all(|&b| b == 0));
        }
        assert_eq!(end_frame(16).len(), 1);
        assert_eq!(end_frame(17).len(), 2);
        assert_eq!(end_frame(300).len(), 19);
    }

    #[test]
    fn test_build_frame() {
        let buffer = [0xFF, 1, 2, 3];
        let frame = build_frame(&buffer, 1);
        assert_eq!(&frame[..], &[0, 0, 0, 0, 0xFF, 1, 2, 3, 0]);
    }
}
