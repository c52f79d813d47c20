// ── Zenith Atoms: Constants ────────────────────────────────────────────────
// Named constants for the engine live here.

// ── Sandbox rendering surface ──────────────────────────────────────────────
// Fixed desktop viewport for screenshot capture. The model reasons about
// layout at this size; changing it silently shifts what the agent "sees".
pub(crate) const SCREENSHOT_WIDTH: u32 = 1280;
pub(crate) const SCREENSHOT_HEIGHT: u32 = 800;

// Delay after navigation before capturing or running a test script, so
// styles apply and fonts load. Mirrored by the in-page test wrapper, which
// defers by the same amount to let the project's own script finish setup.
pub(crate) const RENDER_SETTLE_MS: u64 = 500;

// ── Test execution ─────────────────────────────────────────────────────────
// Hard ceiling for a validate_functionality run. The sandboxed script cannot
// be killed mid-execution; on timeout its tab is destroyed and abandoned.
pub(crate) const TEST_TIMEOUT_SECS: u64 = 5;
pub(crate) const TEST_POLL_INTERVAL_MS: u64 = 100;

// ── Console log capture ────────────────────────────────────────────────────
pub(crate) const MAX_CONSOLE_LOGS: usize = 1000;
pub(crate) const PREVIEW_PUMP_INTERVAL_MS: u64 = 250;

// ── Agent loop ─────────────────────────────────────────────────────────────
// Cap on model→tools→model rounds within one turn, preventing runaway
// tool-calling loops from burning API budget unattended.
pub(crate) const DEFAULT_MAX_TOOL_ROUNDS: u32 = 12;
