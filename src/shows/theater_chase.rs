use serde_json::Value;

use crate::color;
use crate::engine::Animation;
use crate::error::ParameterError;
use crate::strip::Strip;

/// Every third pixel lit, marching one pixel per step
pub struct TheaterChase {
    color: (u8, u8, u8),
}

impl Default for TheaterChase {
    fn default() -> Self {
        TheaterChase {
            color: (255, 255, 255),
        }
    }
}

impl Animation for TheaterChase {
    fn name(&self) -> &str {
        "theater_chase"
    }

    fn configure(&mut self, name: &str, value: &Value) -> Result<(), ParameterError> {
        match name {
            "color" => {
                self.color = color::parse(value).ok_or_else(|| {
                    ParameterError::invalid(name, "expected [r, g, b], \"#rrggbb\" or 0xRRGGBB")
                })?;
                Ok(())
            }
            _ => Err(ParameterError::Unrecognized(name.to_string())),
        }
    }

    fn update(&mut self, strip: &mut dyn Strip, current_step: u64, _current_cycle: u64) -> bool {
        let (red, green, blue) = self.color;
        strip.clear_buffer();
        let first = (current_step % 3) as usize;
        for index in (first..strip.num_leds()).step_by(3) {
            strip.set_pixel(index as isize, red, green, blue);
        }
        true
    }
}
