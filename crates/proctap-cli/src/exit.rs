//! Exit code table (spec §6). Most codes are reached via
//! [`proctap_core::ErrorKind::exit_code`]; the two below are CLI-only
//! conditions that never pass through a [`proctap_core::CaptureError`].

pub const SUCCESS: i32 = 0;
pub const INVALID_ARGS: i32 = 1;
pub const TARGET_NOT_FOUND: i32 = 3;
