// Husky differential-drive base: joint-level hardware interface over the
// Horizon motor controller, plus a zenoh runtime that drives it.

pub mod config;
pub mod hardware;
pub mod messages;
pub mod motor;
pub mod runtime;
