//! Built-in light shows

mod follow;
mod rainbow;
mod spin;
mod theater_chase;

pub use follow::Follow;
pub use rainbow::Rainbow;
pub use spin::Spin;
pub use theater_chase::TheaterChase;

use crate::engine::Animation;

/// Names accepted by `by_name`
pub const NAMES: &[&str] = &["rainbow", "theater_chase", "spin", "follow"];

pub fn by_name(name: &str) -> Option<Box<dyn Animation>> {
    match name {
        "rainbow" => Some(Box::new(Rainbow)),
        "theater_chase" => Some(Box::new(TheaterChase::default())),
        "spin" => Some(Box::new(Spin::default())),
        "follow" => Some(Box::new(Follow)),
        _ => None,
    }
}
