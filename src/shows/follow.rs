use log::warn;

use crate::engine::Animation;
use crate::strip::Strip;

/// Shows whatever other processes write into the mirror buffer
pub struct Follow;

impl Animation for Follow {
    fn name(&self) -> &str {
        "follow"
    }

    fn update(&mut self, strip: &mut dyn Strip, _current_step: u64, _current_cycle: u64) -> bool {
        match strip.sync_down() {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not read mirror: {}", e);
                false
            }
        }
    }
}
