pub const APP_NAME: &str = "fragvault";
pub const DAEMON_NAME: &str = "fragvaultd";

pub const DB_FILE_NAME: &str = "fragvault.sqlite3";

pub const ENV_DB_PATH: &str = "FRAGVAULT_DB_PATH";
pub const ENV_DEFAULT_VIEW_POLICY: &str = "FRAGVAULT_DEFAULT_VIEW_POLICY";
pub const ENV_DEFAULT_EDIT_POLICY: &str = "FRAGVAULT_DEFAULT_EDIT_POLICY";
pub const ENV_MAX_ARCHIVE_BYTES: &str = "FRAGVAULT_MAX_ARCHIVE_BYTES";
pub const ENV_MAX_EXPANDED_BYTES: &str = "FRAGVAULT_MAX_EXPANDED_BYTES";
pub const ENV_MAIL_CONFIG: &str = "FRAGVAULT_MAIL_CONFIG";

pub const SETTINGS_PANEL_URI_BASE: &str = "/settings/panel/";
