//! Parsing of rendered Rust backtraces into [`StackFrame`]s.

use lazy_static::lazy_static;
use regex::Regex;
use std::backtrace::Backtrace;

use crate::types::StackFrame;

lazy_static! {
    /// `  12: crate::module::function`
    static ref FRAME_LINE: Regex = Regex::new(r"^\s*(\d+):\s+(.+?)\s*$").unwrap();
    /// `        at ./src/lib.rs:10:5`
    static ref LOCATION_LINE: Regex = Regex::new(r"^\s*at\s+(.+?):(\d+)(?::(\d+))?\s*$").unwrap();
    /// Legacy mangling hash suffix, e.g. `::h0123456789abcdef`.
    static ref HASH_SUFFIX: Regex = Regex::new(r"::h[0-9a-f]{16}$").unwrap();
}

const SYSTEM_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "<std::",
    "<core::",
    "<alloc::",
    "tokio::",
    "<tokio::",
    "futures::",
    "<futures::",
    "async_trait::",
    "backtrace::",
    "rust_begin_unwind",
    "__rust_",
    "_start",
    "__libc_start",
];

/// Capture the current thread's stack and parse it.
pub fn capture_frames() -> Vec<StackFrame> {
    let backtrace = Backtrace::force_capture();
    parse_backtrace(&backtrace.to_string())
}

/// Parse the `Display` output of a [`Backtrace`].
///
/// Frame lines open a new frame; an `at file:line:col` line that follows
/// fills in its location. Unrecognized lines are skipped.
pub fn parse_backtrace(rendered: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in rendered.lines() {
        if let Some(caps) = FRAME_LINE.captures(line) {
            let symbol = HASH_SUFFIX.replace(&caps[2], "").into_owned();
            frames.push(frame_for_symbol(symbol));
            continue;
        }

        if let Some(caps) = LOCATION_LINE.captures(line) {
            if let Some(frame) = frames.last_mut() {
                if frame.filename.is_none() {
                    frame.filename = Some(caps[1].to_string());
                    frame.lineno = caps[2].parse().ok();
                    frame.colno = caps.get(3).and_then(|m| m.as_str().parse().ok());
                }
            }
        }
    }

    frames
}

fn frame_for_symbol(function: String) -> StackFrame {
    let module = module_of(&function);
    let in_app = is_in_app(&function);

    StackFrame {
        function: Some(function),
        module,
        filename: None,
        lineno: None,
        colno: None,
        in_app,
    }
}

fn module_of(function: &str) -> Option<String> {
    // Generic impls like `<T as Trait>::method` have no useful module path.
    if function.starts_with('<') {
        return None;
    }
    function.rfind("::").map(|idx| function[..idx].to_string())
}

fn is_in_app(function: &str) -> bool {
    !SYSTEM_PREFIXES.iter().any(|prefix| function.starts_with(prefix))
}
