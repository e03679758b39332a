use crate::color;
use crate::engine::Animation;
use crate::strip::Strip;

/// Full color wheel spread over the strip, turning one wheel position per
/// step. 256 steps per cycle make one complete turn.
pub struct Rainbow;

impl Animation for Rainbow {
    fn name(&self) -> &str {
        "rainbow"
    }

    fn update(&mut self, strip: &mut dyn Strip, current_step: u64, _current_cycle: u64) -> bool {
        let num_leds = strip.num_leds().max(1);
        for index in 0..strip.num_leds() {
            let position = (index * 256 / num_leds) as u64 + current_step % 256;
            let (red, green, blue) = color::wheel((position % 256) as u8);
            strip.set_pixel(index as isize, red, green, blue);
        }
        true
    }
}
