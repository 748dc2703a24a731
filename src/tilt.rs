//! Conversion between the processor's 0-100 tilt scale and consumer-facing
//! degrees.
//!
//! The device reports tilt as a percentage where 0 is fully tilted one way,
//! 50 is flat, and 100 is fully tilted the other way. Consumers work in
//! -90..90 degrees with 0 as flat. Both maps are linear; composing them on
//! any integer input lands within one unit of the original.

/// Convert a device-scale tilt level (0-100) to degrees (-90..90).
pub fn device_to_consumer(level: f64) -> i16 {
    let angle = (level - 50.0) * (90.0 / 50.0);
    (angle.round() as i16).clamp(-90, 90)
}

/// Convert a consumer tilt angle (-90..90 degrees) to the device scale
/// (0-100), rounded to the nearest integer.
pub fn consumer_to_device(angle: i16) -> u8 {
    let level = (f64::from(angle) + 90.0) * (50.0 / 90.0);
    (level.round() as i64).clamp(0, 100) as u8
}
