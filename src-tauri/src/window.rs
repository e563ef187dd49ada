//! The game window: creation, reachability gate, script injection.

use crate::constants::{
    GAME_URL, INJECTION_DELAY, MAIN_WINDOW, UNREACHABLE_MESSAGE, WINDOW_HEIGHT, WINDOW_TITLE,
    WINDOW_WIDTH,
};
use crate::error::AppError;
use crate::injector::inject_scripts;
use crate::page::{LivePage, Page, PRELOAD_SCRIPT};
use crate::{reachability, settings, AppContext};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tauri::{AppHandle, Manager, Runtime, WebviewUrl, WebviewWindow, WebviewWindowBuilder};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Operations the loader needs from a window.
pub trait GameWindow {
    /// Blocks until the user dismisses the error.
    fn alert_unreachable(&self);
    fn close_window(&self) -> Result<(), AppError>;
    fn load_url(&self, url: Url) -> Result<(), AppError>;
}

impl<R: Runtime> GameWindow for WebviewWindow<R> {
    fn alert_unreachable(&self) {
        self.dialog()
            .message(UNREACHABLE_MESSAGE)
            .title(WINDOW_TITLE)
            .kind(MessageDialogKind::Error)
            .parent(self)
            .blocking_show();
    }

    fn close_window(&self) -> Result<(), AppError> {
        self.close()?;
        Ok(())
    }

    fn load_url(&self, url: Url) -> Result<(), AppError> {
        self.navigate(url)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Unreachable,
}

/// Navigates to `url` if it was reachable. Otherwise shows the error dialog
/// and closes the window without loading anything.
pub fn load_game<W: GameWindow>(window: &W, reachable: bool, url: &Url) -> Result<LoadOutcome, AppError> {
    if !reachable {
        window.alert_unreachable();
        window.close_window()?;
        return Ok(LoadOutcome::Unreachable);
    }

    window.load_url(url.clone())?;
    Ok(LoadOutcome::Loaded)
}

/// Whether the process should outlive its last window.
pub fn keep_alive_without_windows() -> bool {
    cfg!(target_os = "macos")
}

/// Builds the main window and starts loading the game in the background.
pub fn create_window<R: Runtime>(app: &AppHandle<R>) -> Result<(), AppError> {
    let window = WebviewWindowBuilder::new(app, MAIN_WINDOW, WebviewUrl::External(Url::parse("about:blank")?))
        .title(WINDOW_TITLE)
        .inner_size(WINDOW_WIDTH, WINDOW_HEIGHT)
        .resizable(true)
        .initialization_script(PRELOAD_SCRIPT)
        .build()?;

    window.remove_menu()?;

    if settings::is_enabled("debugmenu") {
        window.open_devtools();
    }

    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        start_game(app, window).await;
    });

    Ok(())
}

async fn start_game<R: Runtime>(app: AppHandle<R>, window: WebviewWindow<R>) {
    let ctx = app.state::<AppContext>();

    let url = match Url::parse(GAME_URL) {
        Ok(url) => url,
        Err(e) => {
            error!("[Window] Invalid game URL {}: {}", GAME_URL, e);
            return;
        }
    };

    let reachable = reachability::is_reachable(GAME_URL).await;
    match load_game(&window, reachable, &url) {
        Ok(LoadOutcome::Loaded) => info!("[Window] Loading {}", GAME_URL),
        Ok(LoadOutcome::Unreachable) => {
            warn!("[Window] {} is unreachable, window closed", GAME_URL);
            return;
        }
        Err(e) => {
            error!("[Window] Failed to load {}: {}", GAME_URL, e);
            return;
        }
    }

    ctx.page_loaded.send_replace(true);

    let page = LivePage::new(window, &ctx.bridge);
    match inject_after_delay(&page, &ctx.script_paths, INJECTION_DELAY, &ctx.shutdown).await {
        Some(Ok(count)) => info!("[Injector] Injected {} script(s)", count),
        Some(Err(e)) => error!("[Injector] Script injection aborted: {}", e),
        None => {}
    }
}

/// Waits `delay`, then injects `paths` into `page`.
///
/// Returns `None` when `shutdown` fires first; nothing is injected then.
pub async fn inject_after_delay<P: Page>(
    page: &P,
    paths: &[PathBuf],
    delay: Duration,
    shutdown: &CancellationToken,
) -> Option<Result<usize, AppError>> {
    tokio::select! {
        _ = shutdown.cancelled() => return None,
        _ = tokio::time::sleep(delay) => {}
    }

    if paths.is_empty() {
        return Some(Ok(0));
    }
    Some(inject_scripts(page, paths).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::cell::RefCell;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};
    use tokio::time::Instant;

    /// Remembers when each script ran, relative to `origin`.
    struct TimedPage {
        origin: Instant,
        runs: Mutex<Vec<(String, Duration)>>,
    }

    impl TimedPage {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
                runs: Mutex::new(Vec::new()),
            }
        }

        fn run_count(&self) -> usize {
            self.runs.lock().unwrap().len()
        }
    }

    impl Page for TimedPage {
        async fn eval(&self, _code: &str) -> Result<Value, AppError> {
            Ok(Value::Null)
        }

        async fn run_script(&self, code: &str) -> Result<(), AppError> {
            self.runs
                .lock()
                .unwrap()
                .push((code.to_string(), self.origin.elapsed()));
            Ok(())
        }
    }

    fn setup_scripts() -> (TempDir, Vec<PathBuf>) {
        let dir = tempdir().unwrap();
        let paths: Vec<PathBuf> = [("a.js", "A"), ("b.js", "B")]
            .iter()
            .map(|(name, code)| {
                let path = dir.path().join(name);
                std::fs::write(&path, code).unwrap();
                path
            })
            .collect();
        (dir, paths)
    }

    #[derive(Default)]
    struct FakeWindow {
        calls: RefCell<Vec<String>>,
    }

    impl GameWindow for FakeWindow {
        fn alert_unreachable(&self) {
            self.calls.borrow_mut().push("alert".to_string());
        }

        fn close_window(&self) -> Result<(), AppError> {
            self.calls.borrow_mut().push("close".to_string());
            Ok(())
        }

        fn load_url(&self, url: Url) -> Result<(), AppError> {
            self.calls.borrow_mut().push(format!("load {}", url));
            Ok(())
        }
    }

    fn game_url() -> Url {
        Url::parse(GAME_URL).unwrap()
    }

    #[test]
    fn test_unreachable_alerts_then_closes_without_loading() {
        let window = FakeWindow::default();

        let outcome = load_game(&window, false, &game_url()).unwrap();

        assert_eq!(outcome, LoadOutcome::Unreachable);
        assert_eq!(*window.calls.borrow(), vec!["alert", "close"]);
    }

    #[test]
    fn test_reachable_loads_game() {
        let window = FakeWindow::default();

        let outcome = load_game(&window, true, &game_url()).unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded);
        assert_eq!(*window.calls.borrow(), vec!["load https://mk48.io/"]);
    }

    #[test]
    fn test_keep_alive_only_on_macos() {
        assert_eq!(keep_alive_without_windows(), cfg!(target_os = "macos"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_injection_waits_for_delay() {
        let (_dir, paths) = setup_scripts();
        let page = TimedPage::new();
        let shutdown = CancellationToken::new();
        let page_ref = &page;

        let inject = inject_after_delay(page_ref, &paths, INJECTION_DELAY, &shutdown);
        let observe = async move {
            tokio::time::sleep(Duration::from_millis(999)).await;
            assert_eq!(page_ref.run_count(), 0);
            tokio::time::sleep(Duration::from_millis(2)).await;
            assert_eq!(page_ref.run_count(), 2);
        };
        let (result, ()) = tokio::join!(inject, observe);

        assert_eq!(result.unwrap().unwrap(), 2);
        let runs = page.runs.lock().unwrap();
        assert_eq!(runs[0].0, "A");
        assert_eq!(runs[1].0, "B");
        assert_eq!(runs[0].1.as_millis(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_delay_skips_injection() {
        let (_dir, paths) = setup_scripts();
        let page = TimedPage::new();
        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();

        let inject = inject_after_delay(&page, &paths, INJECTION_DELAY, &shutdown);
        let cancel = async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        };
        let (result, ()) = tokio::join!(inject, cancel);

        assert!(result.is_none());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(page.run_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_scripts_after_delay() {
        let page = TimedPage::new();
        let shutdown = CancellationToken::new();

        let result = inject_after_delay(&page, &[], INJECTION_DELAY, &shutdown).await;

        assert_eq!(result.unwrap().unwrap(), 0);
        assert_eq!(page.run_count(), 0);
    }
}
