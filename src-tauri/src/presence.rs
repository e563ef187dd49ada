//! Discord Rich Presence fed from the game page.
//!
//! The client starts out registered; once login succeeds it is ready and the
//! page is polled immediately and then on a fixed interval until shutdown.

use crate::constants::{DISCORD_APP_ID, LARGE_IMAGE_KEY, MAIN_WINDOW, PRESENCE_INTERVAL};
use crate::error::AppError;
use crate::page::{LivePage, Page};
use crate::{settings, AppContext};
use chrono::{DateTime, Utc};
use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};
use log::{debug, error, info, warn};
use serde_json::{Number, Value};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tauri::{AppHandle, Manager, Runtime};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const NAME_SCRIPT: &str = "window.localStorage.name;";
const SERVER_ID_SCRIPT: &str = "Number(localStorage.serverId);";
const SHIP_STATUS_SCRIPT: &str =
    r#"try{document.getElementById("ship_status").firstChild.innerText;}catch(e){}"#;
const DEATH_REASON_SCRIPT: &str =
    r#"try{document.getElementsByClassName("reason")[0].innerText;}catch(e){}"#;

pub const UNKNOWN_NAME: &str = "Unknown/Invalid Name!";
pub const COORDS_FALLBACK: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// Client constructed, login not (yet) successful
    Registered,
    /// Login succeeded; updates are flowing
    Ready,
}

/// What one poll read out of the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    pub player_name: String,
    pub server_id: Option<Number>,
    pub coords: String,
    pub death_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresencePayload {
    pub details: String,
    pub state: String,
    pub start_timestamp: DateTime<Utc>,
    pub instance: bool,
    pub large_image_key: String,
}

/// Pulls the coordinates out of the ship status line.
///
/// The line reads like `Ship — Speed — Heading — (12,34)` followed by more
/// lines; the fourth em-dash segment up to the newline holds the position.
pub fn extract_coords(text: &str) -> Option<String> {
    let segment = text.split('—').nth(3)?;
    let line = segment.split('\n').next().unwrap_or_default();
    let coords = line.replacen('(', "", 1).replacen(')', "", 1);
    let coords = coords.trim();
    if coords.is_empty() {
        None
    } else {
        Some(coords.to_string())
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// Zero and NaN (null over the bridge) both mean "no server".
fn server_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.clone()),
        _ => None,
    }
}

/// Reads the current player, server, position and death state from the page.
pub async fn scrape<P: Page>(page: &P) -> Result<PageSnapshot, AppError> {
    let player_name = text_value(&page.eval(NAME_SCRIPT).await?)
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());
    let server_id = server_number(&page.eval(SERVER_ID_SCRIPT).await?);

    let coords = match page.eval(SHIP_STATUS_SCRIPT).await {
        Ok(value) => text_value(&value).and_then(|text| extract_coords(&text)),
        Err(e) => {
            debug!("[Presence] Ship status unavailable: {}", e);
            None
        }
    }
    .unwrap_or_else(|| COORDS_FALLBACK.to_string());
    debug!("[Presence] Coordinates: {}", coords);

    let death_reason =
        text_value(&page.eval(DEATH_REASON_SCRIPT).await?).filter(|reason| !reason.is_empty());

    Ok(PageSnapshot {
        player_name,
        server_id,
        coords,
        death_reason,
    })
}

/// Formats the presence for a snapshot. A death reason replaces the status line.
pub fn build_payload(
    snapshot: &PageSnapshot,
    show_coords: bool,
    started_at: DateTime<Utc>,
) -> PresencePayload {
    let details = match (&snapshot.death_reason, &snapshot.server_id) {
        (Some(reason), _) => reason.clone(),
        (None, Some(server)) => format!("Playing mk48.io on Server {}", server),
        (None, None) => "Playing mk48.io".to_string(),
    };

    let state = if show_coords {
        format!("in-game location: {}", snapshot.coords)
    } else {
        format!("name: \"{}\"", snapshot.player_name)
    };

    PresencePayload {
        details,
        state,
        start_timestamp: started_at,
        instance: false,
        large_image_key: LARGE_IMAGE_KEY.to_string(),
    }
}

/// Destination for presence updates.
pub trait PresenceSink {
    fn publish(&mut self, payload: &PresencePayload) -> Result<(), AppError>;
}

impl PresenceSink for DiscordIpcClient {
    fn publish(&mut self, payload: &PresencePayload) -> Result<(), AppError> {
        // `instance` is always false, which is also what Discord assumes
        // when the field is left out.
        let act = activity::Activity::new()
            .details(&payload.details)
            .state(&payload.state)
            .timestamps(activity::Timestamps::new().start(payload.start_timestamp.timestamp()))
            .assets(activity::Assets::new().large_image(&payload.large_image_key));

        self.set_activity(act)
            .map_err(|e| AppError::Presence(format!("Failed to set activity: {}", e)))
    }
}

fn lock_slot<S>(slot: &Mutex<Option<S>>) -> MutexGuard<'_, Option<S>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("[Discord] presence mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Published,
    Skipped,
}

/// One presence cycle. Skips silently without a page or a ready client.
pub async fn update_once<P: Page, S: PresenceSink>(
    page: Option<&P>,
    slot: &Mutex<Option<S>>,
    show_coords: bool,
    started_at: DateTime<Utc>,
) -> Result<Tick, AppError> {
    let Some(page) = page else {
        return Ok(Tick::Skipped);
    };
    let ready = lock_slot(slot).is_some();
    if !ready {
        return Ok(Tick::Skipped);
    }

    let snapshot = scrape(page).await?;
    let payload = build_payload(&snapshot, show_coords, started_at);

    match lock_slot(slot).as_mut() {
        Some(client) => {
            client.publish(&payload)?;
            Ok(Tick::Published)
        }
        None => Ok(Tick::Skipped),
    }
}

/// Calls `tick` right away and then every `period` until `shutdown` fires.
/// Returns the number of completed ticks.
pub async fn run_presence_loop<F, Fut>(
    shutdown: &CancellationToken,
    period: Duration,
    mut tick: F,
) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    // A slow cycle pushes the schedule back instead of bursting to catch up
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                tick().await;
                ticks += 1;
            }
        }
    }
    ticks
}

/// Logs in, stores the client in `slot` and polls until shutdown.
///
/// A failed login is logged and leaves the client registered; no polling is
/// scheduled in that case. Polling starts once `page_ready` completes, so the
/// first update sees the game rather than a blank window.
pub async fn login_and_poll<S, L, W, F, Fut>(
    login: L,
    page_ready: W,
    slot: &Mutex<Option<S>>,
    shutdown: &CancellationToken,
    period: Duration,
    tick: F,
) -> PresenceState
where
    L: Future<Output = Result<S, AppError>>,
    W: Future<Output = ()>,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    match login.await {
        Ok(client) => {
            *lock_slot(slot) = Some(client);
            info!("[Discord] Connected to Discord RPC");
        }
        Err(e) => {
            error!("[Discord] Login failed: {}", e);
            return PresenceState::Registered;
        }
    }

    tokio::select! {
        _ = shutdown.cancelled() => return PresenceState::Ready,
        _ = page_ready => {}
    }

    run_presence_loop(shutdown, period, tick).await;
    PresenceState::Ready
}

async fn connect_discord() -> Result<DiscordIpcClient, AppError> {
    // Discord IPC connection is blocking
    tauri::async_runtime::spawn_blocking(|| {
        let mut client = DiscordIpcClient::new(DISCORD_APP_ID);
        client
            .connect()
            .map_err(|e| AppError::Presence(format!("Failed to connect to Discord: {}", e)))?;
        Ok::<_, AppError>(client)
    })
    .await
    .map_err(|e| AppError::Presence(format!("Task error: {}", e)))?
}

async fn publish_from_window<R: Runtime>(app: &AppHandle<R>, ctx: &AppContext) {
    let page = app
        .get_webview_window(MAIN_WINDOW)
        .map(|window| LivePage::new(window, &ctx.bridge));
    let show_coords = settings::is_enabled("discoords");

    if let Err(e) = update_once(page.as_ref(), &ctx.presence, show_coords, ctx.started_at).await {
        error!("[Discord] Presence update failed: {}", e);
    }
}

/// Starts the presence publisher for the lifetime of the app.
pub fn spawn<R: Runtime>(app: AppHandle<R>) {
    tauri::async_runtime::spawn(async move {
        let ctx = app.state::<AppContext>();
        let ctx: &AppContext = &ctx;
        let app_ref = &app;
        let mut loaded = ctx.page_loaded.subscribe();
        let page_ready = async move {
            let _ = loaded.wait_for(|loaded| *loaded).await;
        };

        login_and_poll(
            connect_discord(),
            page_ready,
            &ctx.presence,
            &ctx.shutdown,
            PRESENCE_INTERVAL,
            move || publish_from_window(app_ref, ctx),
        )
        .await;
    });
}
