use serde_json::Value;

/// Split packed `0xRRGGBB` into channels
pub fn unpack(rgb: u32) -> (u8, u8, u8) {
    ((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

/// Pack channels into `0xRRGGBB`
#[allow(dead_code)]
pub fn pack(red: u8, green: u8, blue: u8) -> u32 {
    (red as u32) << 16 | (green as u32) << 8 | blue as u32
}

/// Color wheel: 0 is red, 85 green, 170 blue, wrapping back to red at 255
pub fn wheel(position: u8) -> (u8, u8, u8) {
    match position {
        0..=84 => (255 - position * 3, position * 3, 0),
        85..=169 => {
            let p = position - 85;
            (0, 255 - p * 3, p * 3)
        }
        _ => {
            let p = position - 170;
            (p * 3, 0, 255 - p * 3)
        }
    }
}

/// Read a color parameter: `[r, g, b]`, `"#rrggbb"` or integer `0xRRGGBB`
pub fn parse(value: &Value) -> Option<(u8, u8, u8)> {
    match value {
        Value::Array(channels) if channels.len() == 3 => {
            let mut rgb = [0u8; 3];
            for (slot, channel) in rgb.iter_mut().zip(channels) {
                *slot = u8::try_from(channel.as_u64()?).ok()?;
            }
            Some((rgb[0], rgb[1], rgb[2]))
        }
        Value::String(s) => {
            let hex = s.strip_prefix('#')?;
            // from_str_radix alone would accept a leading sign
            if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            u32::from_str_radix(hex, 16).ok().map(unpack)
        }
        Value::Number(n) => {
            let rgb = n.as_u64()?;
            if rgb > 0xFF_FFFF {
                return None;
            }
            Some(unpack(rgb as u32))
        }
        _ => None,
    }
}
