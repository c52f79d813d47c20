// Zenith Agent Engine — Sandbox Runtime
// Disposable rendering/execution surfaces on headless Chrome. Two
// independent capabilities: static screenshot capture of the current
// HTML+CSS, and dynamic test execution against the live HTML+CSS+JS with
// error trapping and a hard timeout. Each operation gets a fresh tab and
// tears it down unconditionally — stale DOM or script state never leaks
// between calls.

use crate::atoms::constants::{
    RENDER_SETTLE_MS, SCREENSHOT_HEIGHT, SCREENSHOT_WIDTH, TEST_POLL_INTERVAL_MS,
    TEST_TIMEOUT_SECS,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::project::Project;
use crate::engine::types::{SandboxMessage, TestStatus};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ── Document composition ───────────────────────────────────────────────

/// Combine HTML and CSS for a static render: the style tag lands before
/// the closing head marker, or is prepended when the document has none.
pub fn compose_screenshot_document(project: &Project) -> String {
    let style_tag = format!("<style>{}</style>", project.css);
    if project.html.contains("</head>") {
        project
            .html
            .replacen("</head>", &format!("{style_tag}</head>"), 1)
    } else {
        format!("{style_tag}{}", project.html)
    }
}

/// Escape closing script tags so arbitrary project code can be inlined.
pub(crate) fn escape_script(javascript: &str) -> String {
    javascript.replace("</script>", "<\\/script>")
}

/// Build the test document: project markup and styles, an error-trapping /
/// console-silencing preamble, the project's own script, then a deferred
/// wrapper that runs the test script in a function scope. Exactly one
/// TEST_RESULT is published — the `||` guards keep the first outcome.
pub fn compose_test_document(project: &Project, test_script: &str) -> String {
    format!(
        "{html}\n\
         <style>{css}</style>\n\
         <script>\n\
         window.onerror = (msg) => {{ window.__TEST_RESULT = window.__TEST_RESULT || {{ type: 'TEST_RESULT', status: 'error', message: String(msg) }}; }};\n\
         console.log = () => {{}};\n\
         </script>\n\
         <script>{js}</script>\n\
         <script>\n\
         setTimeout(() => {{\n\
           try {{\n\
             (function() {{\n\
         {test}\n\
             }})();\n\
             window.__TEST_RESULT = window.__TEST_RESULT || {{ type: 'TEST_RESULT', status: 'success' }};\n\
           }} catch (e) {{\n\
             window.__TEST_RESULT = window.__TEST_RESULT || {{ type: 'TEST_RESULT', status: 'error', message: e.message }};\n\
           }}\n\
         }}, {settle});\n\
         </script>",
        html = project.html,
        css = project.css,
        js = escape_script(&project.javascript),
        test = escape_script(test_script),
        settle = RENDER_SETTLE_MS,
    )
}

pub(crate) fn data_url(document: &str) -> String {
    format!("data:text/html;base64,{}", BASE64.encode(document))
}

// ── Runtime ────────────────────────────────────────────────────────────

pub struct ScreenshotCapture {
    /// PNG bitmap as a data URI, ready to cross the tool boundary.
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

/// Lazily-launched headless Chrome shared by all sandbox operations.
/// Tabs are disposable; the browser process is reused and relaunched if
/// it dies between calls.
#[derive(Clone)]
pub struct SandboxRuntime {
    browser: Arc<Mutex<Option<Arc<Browser>>>>,
}

impl Default for SandboxRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxRuntime {
    pub fn new() -> Self {
        SandboxRuntime {
            browser: Arc::new(Mutex::new(None)),
        }
    }

    fn browser(&self) -> EngineResult<Arc<Browser>> {
        let mut guard = self.browser.lock();
        if let Some(browser) = guard.as_ref() {
            if browser.get_version().is_ok() {
                return Ok(Arc::clone(browser));
            }
            warn!("[sandbox] Browser process dead, relaunching");
        }

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false) // Required in containers / CI
            .idle_browser_timeout(Duration::from_secs(300))
            .window_size(Some((SCREENSHOT_WIDTH, SCREENSHOT_HEIGHT)))
            .build()
            .map_err(|e| EngineError::RenderingUnavailable(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| {
            EngineError::RenderingUnavailable(format!(
                "{e}. Ensure Chrome/Chromium is installed."
            ))
        })?;
        info!("[sandbox] Headless Chrome launched");

        let arc = Arc::new(browser);
        *guard = Some(Arc::clone(&arc));
        Ok(arc)
    }

    /// A raw tab from the shared browser, for surfaces managed elsewhere
    /// (the live preview).
    pub(crate) fn new_raw_tab(&self) -> EngineResult<Arc<Tab>> {
        let browser = self.browser()?;
        browser
            .new_tab()
            .map_err(|e| EngineError::RenderingUnavailable(e.to_string()))
    }

    // ── Screenshot ─────────────────────────────────────────────────────

    /// Render the project's HTML+CSS offscreen at 1280×800 and rasterize
    /// it to a PNG data URI.
    pub async fn screenshot(&self, project: &Project) -> EngineResult<ScreenshotCapture> {
        let document = compose_screenshot_document(project);
        let runtime = self.clone();
        tokio::task::spawn_blocking(move || runtime.screenshot_blocking(&document))
            .await
            .map_err(|e| EngineError::CaptureFailed(e.to_string()))?
    }

    fn screenshot_blocking(&self, document: &str) -> EngineResult<ScreenshotCapture> {
        let browser = self.browser()?;
        let tab = browser
            .new_tab()
            .map_err(|e| EngineError::CaptureFailed(e.to_string()))?;
        let result = Self::capture_tab(&tab, document);
        // Teardown happens on every path, success or failure.
        let _ = tab.close(true);
        result
    }

    fn capture_tab(tab: &Tab, document: &str) -> EngineResult<ScreenshotCapture> {
        tab.set_bounds(Bounds::Normal {
            left: Some(0),
            top: Some(0),
            width: Some(SCREENSHOT_WIDTH as f64),
            height: Some(SCREENSHOT_HEIGHT as f64),
        })
        .ok();

        tab.navigate_to(&data_url(document))
            .map_err(|e| EngineError::CaptureFailed(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| EngineError::CaptureFailed(e.to_string()))?;

        // Let styles apply and fonts load.
        std::thread::sleep(Duration::from_millis(RENDER_SETTLE_MS));

        let png = tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| EngineError::CaptureFailed(e.to_string()))?;

        info!("[sandbox] Screenshot captured ({} bytes)", png.len());
        Ok(ScreenshotCapture {
            data_uri: format!("data:image/png;base64,{}", BASE64.encode(&png)),
            width: SCREENSHOT_WIDTH,
            height: SCREENSHOT_HEIGHT,
        })
    }

    // ── Validate ───────────────────────────────────────────────────────

    /// Run a test script against the live project. Resolves `Ok(())` when
    /// the script completes without throwing, `TestScript` when it throws,
    /// and `TestTimeout` when no result arrives within the 5-second
    /// deadline — the page cannot be killed mid-run beyond destroying its
    /// tab, which happens on every path.
    pub async fn validate(&self, project: &Project, test_script: &str) -> EngineResult<()> {
        let document = compose_test_document(project, test_script);
        let runtime = self.clone();
        tokio::task::spawn_blocking(move || runtime.validate_blocking(&document))
            .await
            .map_err(|e| EngineError::Transport(format!("Test runner error: {e}")))?
    }

    fn validate_blocking(&self, document: &str) -> EngineResult<()> {
        let browser = self.browser()?;
        let tab = browser
            .new_tab()
            .map_err(|e| EngineError::RenderingUnavailable(e.to_string()))?;
        // Keep CDP waits inside the test budget so a busy page cannot pin us.
        tab.set_default_timeout(Duration::from_secs(TEST_TIMEOUT_SECS));
        let result = Self::await_test_result(&tab, document);
        let _ = tab.close(true);
        result
    }

    fn await_test_result(tab: &Tab, document: &str) -> EngineResult<()> {
        tab.navigate_to(&data_url(document))
            .map_err(|e| EngineError::Transport(format!("Test runner error: {e}")))?;
        tab.wait_until_navigated()
            .map_err(|e| EngineError::Transport(format!("Test runner error: {e}")))?;

        const DRAIN: &str = "JSON.stringify(window.__TEST_RESULT || null)";
        let deadline = Instant::now() + Duration::from_secs(TEST_TIMEOUT_SECS);

        loop {
            if Instant::now() >= deadline {
                warn!("[sandbox] Test timed out after {TEST_TIMEOUT_SECS}s, abandoning tab");
                return Err(EngineError::TestTimeout(TEST_TIMEOUT_SECS));
            }

            if let Ok(remote) = tab.evaluate(DRAIN, false) {
                if let Some(serde_json::Value::String(raw)) = remote.value {
                    if raw != "null" {
                        if let Ok(SandboxMessage::TestResult { status, message }) =
                            serde_json::from_str(&raw)
                        {
                            return match status {
                                TestStatus::Success => Ok(()),
                                TestStatus::Error => Err(EngineError::TestScript(
                                    message.unwrap_or_else(|| "unknown error".into()),
                                )),
                            };
                        }
                    }
                }
            }

            std::thread::sleep(Duration::from_millis(TEST_POLL_INTERVAL_MS));
        }
    }
}
