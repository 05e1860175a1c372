//! Shared protocol constants for the tether line protocol

// Default endpoint
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_BIND: &str = "0.0.0.0:9090";

// On-disk layout, relative to the working directory
pub const FILES_DIR: &str = "server_files";
pub const SESSIONS_DIR: &str = "sessions";
pub const DOWNLOAD_DIR: &str = "downloads";

/// One chunk of a streaming transfer
pub const BUFFER_SIZE: usize = 4096;

/// Width of the big-endian total-size field that opens an UPLOAD body
pub const SIZE_HEADER_LEN: usize = 8;

// Upper bound on a single text line; a peer that never sends '\n' must not
// grow the buffer forever
pub const MAX_LINE_LEN: usize = 64 * 1024;

pub const LINE_END: &str = "\r\n";

pub const WELCOME: &str =
    "Hello! Commands: ECHO <text> | TIME | UPLOAD <file> | DOWNLOAD <file> | CLOSE";

// Command verbs (matched case-insensitively)
pub mod cmd {
    pub const ECHO: &str = "ECHO";
    pub const TIME: &str = "TIME";
    pub const CLOSE: &str = "CLOSE";
    pub const EXIT: &str = "EXIT";
    pub const QUIT: &str = "QUIT";
    pub const UPLOAD: &str = "UPLOAD";
    pub const DOWNLOAD: &str = "DOWNLOAD";
}

// Reply keywords and fixed reply texts
pub mod reply {
    pub const OFFSET: &str = "OFFSET";
    pub const SIZE: &str = "SIZE";
    pub const OK: &str = "OK";
    pub const ERROR: &str = "ERROR";
    pub const BYE: &str = "BYE";
    pub const EMPTY_ECHO: &str = "(empty)";
    pub const FILE_NOT_FOUND: &str = "ERROR: file not found";
    pub const MISSING_FILENAME: &str = "ERROR: missing filename";
    pub const INVALID_FILENAME: &str = "ERROR: invalid filename";
    pub const TRANSFER_BUSY: &str = "ERROR: transfer already in progress";

    pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn offset(n: u64) -> String {
        format!("{OFFSET} {n}")
    }

    pub fn size(n: u64) -> String {
        format!("{SIZE} {n}")
    }

    pub fn upload_ok(total: u64, rate_kbps: f64) -> String {
        format!("{OK} размер={total} скорость={rate_kbps:.1} КБ/с")
    }

    pub fn unknown_command(cmd: &str) -> String {
        format!("{ERROR}: unknown command '{cmd}'")
    }

    pub fn is_error(line: &str) -> bool {
        line.starts_with(ERROR)
    }

    /// Parse `<KEYWORD> <n>`; `None` when the keyword or number is wrong
    pub fn parse_keyword_u64(line: &str, keyword: &str) -> Option<u64> {
        let mut parts = line.split_whitespace();
        if parts.next()? != keyword {
            return None;
        }
        parts.next()?.parse().ok()
    }
}

// Centralized timing constants for the client reconnect loop and socket tuning
pub mod timeouts {
    // Wall-clock budget before the operator is asked whether to keep trying (s)
    pub const RECONNECT_TIMEOUT_SECS: u64 = 30;

    // Pause between reconnect attempts (s)
    pub const RECONNECT_DELAY_SECS: u64 = 3;

    // TCP keepalive: idle before first probe, interval between probes, probe count
    pub const KEEPALIVE_IDLE_SECS: u32 = 10;
    pub const KEEPALIVE_INTERVAL_SECS: u32 = 5;
    pub const KEEPALIVE_COUNT: u32 = 3;

    // Floor for elapsed time in throughput math, so instant transfers do not divide by zero
    pub const MIN_ELAPSED_SECS: f64 = 0.001;
}
