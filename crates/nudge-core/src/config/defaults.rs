//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "Nudge".to_string()
}

pub fn default_data_dir() -> String {
    "~/.nudge".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_db_path() -> String {
    "~/.nudge/data/nudge.db".to_string()
}

pub fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_api_port() -> u16 {
    3000
}

pub fn default_sweep_interval() -> u64 {
    300
}

pub fn default_sweep_window() -> u32 {
    crate::window::SWEEP_WINDOW_MINUTES
}

pub fn default_poll_interval() -> u64 {
    60
}

pub fn default_poll_window() -> u32 {
    crate::window::CLIENT_WINDOW_MINUTES
}

pub fn default_send_timeout_secs() -> u64 {
    10
}

pub fn default_link_ttl_minutes() -> i64 {
    30
}
