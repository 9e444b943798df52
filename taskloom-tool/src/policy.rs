//! Sandbox policy defaults for `shell`/`network` tools (§4.3).

use serde::{Deserialize, Serialize};

/// Resource limits applied to a sandboxed (`shell`) tool invocation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// Wall-clock timeout, in seconds. Default 120.
    pub timeout_secs: u64,
    /// Memory cap, in MiB. Default 1024 (1 GiB). Enforcement is the
    /// sandboxing `Environment` implementation's responsibility; the
    /// executor only carries the number through.
    pub memory_cap_mib: u64,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            memory_cap_mib: 1024,
        }
    }
}

/// How many bytes of a tool's stdout/stderr/return value are kept
/// before the rest is clipped (§4.3 step 4). Default 256 KiB.
pub const DEFAULT_OUTPUT_CLIP_BYTES: usize = 256 * 1024;

/// Clip a string to `max_bytes`, respecting UTF-8 boundaries, appending
/// a marker noting how many bytes were dropped.
pub fn clip_output(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = text.len() - cut;
    text.truncate(cut);
    text.push_str(&format!("\n...[clipped {dropped} bytes]"));
    text
}
