use log::debug;

use crate::color;
use crate::engine::Animation;
use crate::strip::Strip;

/// Paints a wheel gradient once and rotates it around the strip
#[derive(Default)]
pub struct Spin {
    turns: u64,
}

impl Animation for Spin {
    fn name(&self) -> &str {
        "spin"
    }

    fn init(&mut self, strip: &mut dyn Strip) {
        let num_leds = strip.num_leds().max(1);
        for index in 0..strip.num_leds() {
            let (red, green, blue) = color::wheel((index * 256 / num_leds) as u8);
            strip.set_pixel(index as isize, red, green, blue);
        }
    }

    fn update(&mut self, strip: &mut dyn Strip, _current_step: u64, _current_cycle: u64) -> bool {
        strip.rotate(1);
        self.turns += 1;
        true
    }

    fn shutdown(&mut self, _strip: &mut dyn Strip) {
        debug!("spin stopped after {} rotations", self.turns);
    }
}
