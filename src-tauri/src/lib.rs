pub mod constants;
pub mod error;
pub mod injector;
pub mod page;
pub mod presence;
pub mod reachability;
pub mod settings;
pub mod window;

use chrono::{DateTime, Utc};
use discord_rich_presence::{DiscordIpc, DiscordIpcClient};
use log::{info, warn};
use page::PageBridge;
use std::path::PathBuf;
use std::sync::Mutex;
use tauri::Manager;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Everything the window and presence tasks share for the app's lifetime.
///
/// The window itself is not held here; it is looked up by label when needed
/// and may be gone at any time.
pub struct AppContext {
    pub bridge: PageBridge,
    pub presence: Mutex<Option<DiscordIpcClient>>,
    pub started_at: DateTime<Utc>,
    pub script_paths: Vec<PathBuf>,
    /// Flips to true once the game page has been navigated to
    pub page_loaded: watch::Sender<bool>,
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(script_paths: Vec<PathBuf>) -> Self {
        AppContext {
            bridge: PageBridge::new(),
            presence: Mutex::new(None),
            started_at: Utc::now(),
            script_paths,
            page_loaded: watch::Sender::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stops pending timers and closes the presence connection.
    fn tear_down(&self) {
        self.shutdown.cancel();

        let client = match self.presence.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut client) = client {
            match client.close() {
                Ok(()) => info!("[Discord] Disconnected from Discord RPC"),
                Err(e) => warn!("[Discord] Failed to disconnect from Discord: {}", e),
            }
        }
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(AppContext::new(injector::script_paths_from_env()))
        .invoke_handler(tauri::generate_handler![page::page_eval_settled])
        .setup(|app| {
            window::create_window(app.handle())?;
            presence::spawn(app.handle().clone());
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| match event {
            #[cfg(target_os = "macos")]
            tauri::RunEvent::Reopen { .. } => {
                // Dock click with no windows open
                if app.webview_windows().is_empty() {
                    if let Err(e) = window::create_window(app) {
                        log::error!("[Window] Failed to recreate window: {}", e);
                    }
                }
            }
            tauri::RunEvent::ExitRequested { code, api, .. } => {
                // `code` is None when the last window closed on its own
                if code.is_none() && window::keep_alive_without_windows() {
                    api.prevent_exit();
                }
            }
            tauri::RunEvent::Exit => app.state::<AppContext>().tear_down(),
            _ => {}
        });
}
