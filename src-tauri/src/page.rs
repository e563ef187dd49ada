//! Evaluating script in the loaded page and awaiting its completion value.
//!
//! Webview `eval` is fire-and-forget, so every evaluation is tagged with an id
//! and the page reports the outcome back through the `page_eval_settled`
//! command. The preload installs the page half of the bridge before any page
//! script runs.

use crate::constants::EVAL_TIMEOUT;
use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tauri::{Runtime, WebviewWindow};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Result reported by the page: the completion value or the thrown error text.
pub type Outcome = Result<Value, String>;

/// Companion preload, registered as the window's initialization script.
pub const PRELOAD_SCRIPT: &str = r#"(function() {
  // Only run in main frame, not iframes
  if (window !== window.top) return;
  if (window.__mk48Desktop) return;

  function decodeBase64(str) {
    return decodeURIComponent(atob(str).split('').map(function(c) {
      return '%' + ('00' + c.charCodeAt(0).toString(16)).slice(-2);
    }).join(''));
  }

  function report(id, value, error) {
    if (!window.__TAURI__ || !window.__TAURI__.core) {
      console.error('[mk48 Desktop] Tauri core API not available');
      return;
    }
    window.__TAURI__.core.invoke('page_eval_settled', { id: id, value: value, error: error })
      .catch(function(e) { console.error('[mk48 Desktop] Failed to report result:', e); });
  }

  window.__mk48Desktop = {
    decodeBase64: decodeBase64,
    settle: function(id, thunk) {
      Promise.resolve()
        .then(thunk)
        .then(function(value) {
          if (value === undefined) value = null;
          try {
            JSON.stringify(value);
          } catch (e) {
            report(id, null, 'Result is not serializable: ' + e);
            return;
          }
          report(id, value, null);
        }, function(e) {
          report(id, null, String((e && e.stack) || e));
        });
    },
    // Classic script: top-level bindings stay visible to later scripts
    runScript: function(id, encoded) {
      var failure = null;
      var onError = function(event) { failure = event.error || event.message; };
      window.addEventListener('error', onError);
      try {
        var script = document.createElement('script');
        script.textContent = decodeBase64(encoded);
        script.setAttribute('data-mk48-desktop', id);
        (document.head || document.documentElement).appendChild(script);
        script.remove();
      } catch (e) {
        failure = e;
      } finally {
        window.removeEventListener('error', onError);
      }
      if (failure !== null) {
        report(id, null, String((failure && failure.stack) || failure));
      } else {
        report(id, null, null);
      }
    }
  };
})();
"#;

/// Builds the script that evaluates `code` in the page's global scope and
/// reports its completion value under `id`.
///
/// The code travels base64-encoded so no escaping is needed, and runs through
/// indirect `eval` so statement scripts still produce a completion value.
pub fn wrap_script(id: &str, code: &str) -> String {
    format!(
        "window.__mk48Desktop.settle('{}', function() {{ return (0, eval)(window.__mk48Desktop.decodeBase64('{}')); }});",
        id,
        BASE64.encode(code.as_bytes())
    )
}

/// Builds the script that runs `code` as a classic `<script>` element and
/// reports completion under `id`. Unlike [`wrap_script`] there is no
/// completion value, but top-level `let`/`const`/`class` declarations persist
/// in the page's global scope.
pub fn wrap_classic_script(id: &str, code: &str) -> String {
    format!(
        "window.__mk48Desktop.runScript('{}', '{}');",
        id,
        BASE64.encode(code.as_bytes())
    )
}

/// Pending evaluations waiting for the page to report back.
#[derive(Default)]
pub struct PageBridge {
    pending: Mutex<HashMap<String, oneshot::Sender<Outcome>>>,
}

impl PageBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Outcome>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("PageBridge: pending mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Allocates a request id and the receiver its outcome will arrive on.
    pub fn register(&self) -> (String, oneshot::Receiver<Outcome>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id.clone(), tx);
        (id, rx)
    }

    /// Delivers an outcome. Returns `false` for ids nobody is waiting on.
    pub fn settle(&self, id: &str, outcome: Outcome) -> bool {
        match self.lock_pending().remove(id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn forget(&self, id: &str) {
        self.lock_pending().remove(id);
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Waits for the outcome of `id`, giving up after `limit`.
    pub async fn wait(
        &self,
        id: &str,
        rx: oneshot::Receiver<Outcome>,
        limit: Duration,
    ) -> Result<Value, AppError> {
        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(AppError::PageScript(message)),
            Ok(Err(_)) => Err(AppError::BridgeClosed),
            Err(_) => {
                self.forget(id);
                Err(AppError::PageTimeout)
            }
        }
    }
}

/// Something that can run script in the game page and hand back the result.
pub trait Page {
    /// Evaluates `code` and returns its completion value.
    fn eval(&self, code: &str) -> impl Future<Output = Result<Value, AppError>> + Send;

    /// Executes `code` as a script file of the page.
    fn run_script(&self, code: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// The main window's page, reached through the bridge.
pub struct LivePage<'a, R: Runtime> {
    window: WebviewWindow<R>,
    bridge: &'a PageBridge,
}

impl<'a, R: Runtime> LivePage<'a, R> {
    pub fn new(window: WebviewWindow<R>, bridge: &'a PageBridge) -> Self {
        Self { window, bridge }
    }
}

impl<R: Runtime> LivePage<'_, R> {
    async fn dispatch(&self, wrap: fn(&str, &str) -> String, code: &str) -> Result<Value, AppError> {
        let (id, rx) = self.bridge.register();
        if let Err(e) = self.window.eval(&wrap(&id, code)) {
            self.bridge.forget(&id);
            return Err(e.into());
        }
        self.bridge.wait(&id, rx, EVAL_TIMEOUT).await
    }
}

impl<R: Runtime> Page for LivePage<'_, R> {
    async fn eval(&self, code: &str) -> Result<Value, AppError> {
        self.dispatch(wrap_script, code).await
    }

    async fn run_script(&self, code: &str) -> Result<(), AppError> {
        self.dispatch(wrap_classic_script, code).await.map(|_| ())
    }
}

/// Called by the preload when an evaluation settles.
#[tauri::command]
pub fn page_eval_settled(
    id: String,
    value: Option<Value>,
    error: Option<String>,
    state: tauri::State<'_, crate::AppContext>,
) {
    let outcome = match error {
        Some(message) => Err(message),
        None => Ok(value.unwrap_or(Value::Null)),
    };
    if !state.bridge.settle(&id, outcome) {
        debug!("[Page] Result for unknown or expired request {}", id);
    }
}
