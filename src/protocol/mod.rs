pub mod apa102;

pub use apa102::{
    build_frame, end_frame, prefix, start_frame, BYTES_PER_LED, DEFAULT_CLOCK_HZ, MAX_LEDS,
};
