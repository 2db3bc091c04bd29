//! Process exit codes. Scripts wrapping `quanta` rely on these.

pub const SUCCESS: i32 = 0;
/// Analysis run ended in `failed`.
pub const RUN_FAILED: i32 = 1;
/// Bad config, missing endpoint or unreadable subject.
pub const CONFIG_ERROR: i32 = 2;
/// A recent run exists and neither `--force` nor `--reuse` was given.
pub const NEEDS_CONFIRMATION: i32 = 3;
