//! Process-wide configuration: the `root` directory under which
//! discovery operates.
//!
//! Read-once: supplied at startup and not re-read on every call, the
//! same shape as an `OnceCell`-backed process-wide static guarded behind
//! a getter function. `root` is set explicitly once at startup rather
//! than lazily defaulted on first use, so callers that never configure
//! it fall back to `"db"`.
//!
//! Every `discovery` function also takes `root` as an explicit `&Path`
//! parameter — this module is a convenience default, never the only way
//! to reach that code, so tests can inject their own root without
//! touching global state.

use once_cell::sync::OnceCell;
use std::path::PathBuf;

pub const DEFAULT_ROOT: &str = "db";

static ROOT: OnceCell<PathBuf> = OnceCell::new();

/// Set the process-wide `root` directory. Intended to be called once at
/// startup (e.g. from `main`); subsequent calls are no-ops and return
/// `false` so callers can detect a late/duplicate configuration attempt.
pub fn set_root(root: impl Into<PathBuf>) -> bool {
    ROOT.set(root.into()).is_ok()
}

/// The configured `root`, or `"db"` if `set_root` was never called.
pub fn root() -> PathBuf {
    ROOT.get().cloned().unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
}
