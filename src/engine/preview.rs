// Zenith Agent Engine — Live Preview Surface
// A long-lived tab rendering the current project with its console
// monkey-patched: every log/warn/error/info call and uncaught error is
// queued as a CONSOLE_LOG message that the host pump drains into the
// Console Log Buffer. The patch preserves the original console behavior.
// Distinct from the ephemeral validate surface — this one stays up between
// turns and is swapped wholesale on refresh.

use crate::atoms::constants::PREVIEW_PUMP_INTERVAL_MS;
use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::console::{ConsoleLog, ConsoleLogBuffer};
use crate::engine::project::Project;
use crate::engine::sandbox::{data_url, escape_script, SandboxRuntime};
use crate::engine::types::SandboxMessage;
use headless_chrome::Tab;
use log::{info, warn};
use parking_lot::Mutex;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const CONSOLE_INTERCEPTOR: &str = r#"<script>
(function() {
  const originalLog = console.log;
  const originalError = console.error;
  const originalWarn = console.warn;
  const originalInfo = console.info;
  window.__CONSOLE_MESSAGES = [];

  function sendLog(type, args) {
    try {
      const message = args.map(arg => {
        if (typeof arg === 'object') return JSON.stringify(arg);
        return String(arg);
      }).join(' ');
      window.__CONSOLE_MESSAGES.push({ type: 'CONSOLE_LOG', logType: type, message: message });
    } catch (e) {}
  }

  console.log = function(...args) { sendLog('log', args); originalLog.apply(console, args); };
  console.error = function(...args) { sendLog('error', args); originalError.apply(console, args); };
  console.warn = function(...args) { sendLog('warn', args); originalWarn.apply(console, args); };
  console.info = function(...args) { sendLog('info', args); originalInfo.apply(console, args); };
})();

window.onerror = function(msg, url, line) {
  window.__CONSOLE_MESSAGES = window.__CONSOLE_MESSAGES || [];
  window.__CONSOLE_MESSAGES.push({ type: 'CONSOLE_LOG', logType: 'error', message: msg + ' (Line: ' + line + ')' });
};
</script>"#;

/// The page queues messages; the host drains and clears in one evaluate.
const DRAIN_SCRIPT: &str = "(() => { const b = window.__CONSOLE_MESSAGES || []; \
     window.__CONSOLE_MESSAGES = []; return JSON.stringify(b); })()";

static SCRIPT_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<script src="script\.js".*?></script>"#).expect("script-src pattern")
});

/// Compose the preview document: interceptor and styles into the head,
/// external script.js references stripped, and the project script inlined
/// before the closing body tag.
pub fn compose_preview_document(project: &Project) -> String {
    let head_inject = format!("{CONSOLE_INTERCEPTOR}<style>{}</style>", project.css);
    let html = if project.html.contains("</head>") {
        project
            .html
            .replacen("</head>", &format!("{head_inject}</head>"), 1)
    } else {
        format!("{head_inject}{}", project.html)
    };

    let html = SCRIPT_SRC_RE.replace_all(&html, "").into_owned();

    let script_tag = format!("<script>{}</script>", escape_script(&project.javascript));
    if html.contains("</body>") {
        html.replacen("</body>", &format!("{script_tag}</body>"), 1)
    } else {
        format!("{html}{script_tag}")
    }
}

/// Host side of the preview: owns the current tab and feeds the buffer.
/// Cheap to clone; clones share the same tab slot and buffer.
#[derive(Clone)]
pub struct PreviewSurface {
    runtime: SandboxRuntime,
    console: ConsoleLogBuffer,
    tab: Arc<Mutex<Option<Arc<Tab>>>>,
}

impl PreviewSurface {
    pub fn new(runtime: SandboxRuntime, console: ConsoleLogBuffer) -> Self {
        PreviewSurface {
            runtime,
            console,
            tab: Arc::new(Mutex::new(None)),
        }
    }

    /// Render the given project in a fresh tab and swap it in; the old tab
    /// is closed. Surfaces are disposable — no DOM state survives refresh.
    pub async fn refresh(&self, project: &Project) -> EngineResult<()> {
        let document = compose_preview_document(project);
        let surface = self.clone();
        tokio::task::spawn_blocking(move || {
            let tab = surface.runtime.new_raw_tab()?;
            tab.navigate_to(&data_url(&document))
                .map_err(|e| EngineError::RenderingUnavailable(e.to_string()))?;
            tab.wait_until_navigated()
                .map_err(|e| EngineError::RenderingUnavailable(e.to_string()))?;
            let old = surface.tab.lock().replace(tab);
            if let Some(old_tab) = old {
                let _ = old_tab.close(true);
            }
            info!("[preview] Surface refreshed");
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Other(e.to_string()))?
    }

    /// Drain pending CONSOLE_LOG messages into the buffer. Returns how
    /// many entries were appended.
    pub fn pump(&self) -> usize {
        let tab = self.tab.lock().clone();
        let Some(tab) = tab else { return 0 };

        let raw = match tab.evaluate(DRAIN_SCRIPT, false) {
            Ok(remote) => match remote.value {
                Some(serde_json::Value::String(raw)) => raw,
                _ => return 0,
            },
            Err(e) => {
                warn!("[preview] Console pump failed: {e}");
                return 0;
            }
        };

        let Ok(messages) = serde_json::from_str::<Vec<SandboxMessage>>(&raw) else {
            return 0;
        };

        let mut appended = 0;
        for message in messages {
            if let SandboxMessage::ConsoleLog { log_type, message } = message {
                self.console.push(ConsoleLog::new(log_type, message));
                appended += 1;
            }
        }
        appended
    }

    /// Background drain loop. Runs until the returned handle is aborted.
    pub fn spawn_pump(&self) -> tokio::task::JoinHandle<()> {
        let surface = self.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(PREVIEW_PUMP_INTERVAL_MS));
            loop {
                ticker.tick().await;
                let inner = surface.clone();
                let _ = tokio::task::spawn_blocking(move || inner.pump()).await;
            }
        })
    }

    pub fn close(&self) {
        if let Some(tab) = self.tab.lock().take() {
            let _ = tab.close(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project {
            html: "<!DOCTYPE html><html><head><title>t</title></head><body><p>hi</p>\
                   <script src=\"script.js\" defer></script></body></html>"
                .into(),
            css: "p { color: blue; }".into(),
            javascript: "console.log('ready');".into(),
        }
    }

    #[test]
    fn preview_injects_interceptor_before_styles() {
        let doc = compose_preview_document(&project());
        let interceptor = doc.find("__CONSOLE_MESSAGES").unwrap();
        let style = doc.find("<style>p { color: blue; }</style>").unwrap();
        let head_close = doc.find("</head>").unwrap();
        assert!(interceptor < style && style < head_close);
    }

    #[test]
    fn preview_strips_external_script_and_inlines_project_js() {
        let doc = compose_preview_document(&project());
        assert!(!doc.contains("script.js"));
        let inline = doc.find("<script>console.log('ready');</script>").unwrap();
        let body_close = doc.find("</body>").unwrap();
        assert!(inline < body_close);
    }

    #[test]
    fn preview_handles_fragment_markup() {
        let mut p = project();
        p.html = "<p>no head or body</p>".into();
        let doc = compose_preview_document(&p);
        assert!(doc.starts_with("<script>"));
        assert!(doc.ends_with("<script>console.log('ready');</script>"));
    }

    #[test]
    fn interceptor_preserves_original_console() {
        // the patched methods must still call through to the originals
        assert!(CONSOLE_INTERCEPTOR.contains("originalLog.apply(console, args)"));
        assert!(CONSOLE_INTERCEPTOR.contains("originalError.apply(console, args)"));
    }
}
