pub const DEFAULT_ENDPOINT_URL: &str = "http://127.0.0.1:5050/log_entry";
pub const DEFAULT_LOCATION_ID: &str = "loc_1";
pub const DEFAULT_READER_PATH: &str = "-";

pub const STORE_FILE: &str = "offline_logs.ndjson";
pub const LOG_FILE: &str = "scanrelay.log";
pub const DATA_DIR_NAME: &str = "scanrelay";

pub const REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const LINK_PROBE_INTERVAL_MS: u64 = 5_000;
pub const LINK_PROBE_TIMEOUT_MS: u64 = 2_000;
pub const RECONCILE_INTERVAL_MS: u64 = 60_000;
pub const SCAN_DEBOUNCE_MS: u64 = 2_000;
pub const QUEUE_CAPACITY: u64 = 10_000;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const ENV_PREFIX: &str = "SCANRELAY";
