use crate::config::Config;
use crate::constants::{
    CONNECT_TIMEOUT_MS, DATA_DIR_NAME, DEFAULT_ENDPOINT_URL, DEFAULT_LOCATION_ID,
    DEFAULT_LOG_LEVEL, DEFAULT_READER_PATH, LINK_PROBE_INTERVAL_MS, LINK_PROBE_TIMEOUT_MS,
    QUEUE_CAPACITY, RECONCILE_INTERVAL_MS, REQUEST_TIMEOUT_MS, SCAN_DEBOUNCE_MS, STORE_FILE,
};
use std::path::PathBuf;

/// Per-user data directory, falling back to the working directory on hosts
/// without one.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            location_id: DEFAULT_LOCATION_ID.to_string(),
            store_path: data_dir.join(STORE_FILE),
            reader_path: DEFAULT_READER_PATH.to_string(),

            request_timeout_ms: REQUEST_TIMEOUT_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            link_probe_interval_ms: LINK_PROBE_INTERVAL_MS,
            link_probe_timeout_ms: LINK_PROBE_TIMEOUT_MS,
            reconcile_interval_ms: RECONCILE_INTERVAL_MS,
            scan_debounce_ms: SCAN_DEBOUNCE_MS,
            queue_capacity: QUEUE_CAPACITY,

            log_dir: data_dir,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}
