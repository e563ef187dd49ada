use std::time::Duration;

/// Remote game loaded into the main window
pub const GAME_URL: &str = "https://mk48.io";

/// Label of the single game window
pub const MAIN_WINDOW: &str = "main";

pub const WINDOW_TITLE: &str = "mk48.io";
pub const WINDOW_WIDTH: f64 = 1280.0;
pub const WINDOW_HEIGHT: f64 = 720.0;

/// Prefix for environment-variable settings (`MK48_DEBUGMENU`, ...)
pub const SETTINGS_PREFIX: &str = "MK48_";

/// Value a setting reports when its variable is not defined
pub const SETTING_DISABLED: &str = "disabled";
pub const SETTING_ENABLED: &str = "enabled";

/// Runtime invocation name that shifts script arguments by one
pub const RUNTIME_TOKEN: &str = "electron";

/// Delay between navigating to the game and injecting user scripts
pub const INJECTION_DELAY: Duration = Duration::from_millis(1000);

/// Cadence of presence updates once the client is ready
pub const PRESENCE_INTERVAL: Duration = Duration::from_millis(15_000);

pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the page to report back an evaluated script
pub const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

// Discord Application ID registered for mk48.io
pub const DISCORD_APP_ID: &str = "869542716961345556";

pub const LARGE_IMAGE_KEY: &str = "mk48io3";

pub const UNREACHABLE_MESSAGE: &str =
    "Unable to connect to mk48.io. Is your network connection working?";
