pub mod stacktrace;

pub use stacktrace::{capture_frames, parse_backtrace};
