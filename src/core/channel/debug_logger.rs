use std::sync::{Arc, Mutex, OnceLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::io::{Write, BufReader};
use std::path::{Path, PathBuf};
use std::env;
use std::fs::{File, OpenOptions};
use std::collections::HashMap;

use serde::{Serialize, Deserialize};
use chrono::Local;
use uuid::Uuid;
use flate2::{write::GzEncoder, Compression};
use fs2::FileExt;
use regex::Regex;

// Hardcoded configuration - only the enable switch comes from the environment
const LOG_ROTATION_SIZE_MB: u64 = 8;
const MAX_ARCHIVES: u32 = 5;
const ROTATION_CHECK_INTERVAL: u32 = 200;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogEntry {
    pub timestamp: String,                                      // ISO-8601 with timezone
    pub level: String,                                          // DEBUG, ERROR, CHANNEL, SOCKET, PROBE
    pub component: String,                                      // Component name
    pub event: String,                                          // Event type
    pub message: String,                                        // Human readable message (redacted)
    pub correlation_id: Option<String>,                         // For tracking multi-step operations
    pub fields: HashMap<String, serde_json::Value>,            // Structured data
}

struct RotatingLogger {
    log_path: PathBuf,
    write_count: AtomicU32,
}

impl RotatingLogger {
    pub fn new(log_path: PathBuf) -> Self {
        // Ensure parent directory exists
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        Self {
            log_path,
            write_count: AtomicU32::new(0),
        }
    }

    pub fn write_with_rotation(&self, json_line: &str) -> Result<(), std::io::Error> {
        // Check for rotation every ROTATION_CHECK_INTERVAL writes
        if self.write_count.fetch_add(1, Ordering::Relaxed) % ROTATION_CHECK_INTERVAL == 0 {
            let _ = self.rotate_if_needed(); // Don't let rotation errors stop logging
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        writeln!(file, "{}", json_line)?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<(), std::io::Error> {
        if !self.needs_rotation()? {
            return Ok(());
        }

        // File locking to prevent concurrent rotation
        let lock_path = self.log_path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {
                // Double-check if rotation is still needed after acquiring lock
                if self.needs_rotation()? {
                    self.perform_rotation()?;
                }
                let _ = std::fs::remove_file(&lock_path);
                Ok(())
            }
            Err(_) => {
                // Another process is rotating, skip this time
                Ok(())
            }
        }
    }

    fn needs_rotation(&self) -> Result<bool, std::io::Error> {
        if !self.log_path.exists() {
            return Ok(false);
        }

        let metadata = std::fs::metadata(&self.log_path)?;
        Ok(metadata.len() >= LOG_ROTATION_SIZE_MB * 1024 * 1024)
    }

    fn log_parts(&self) -> Result<(&Path, String), std::io::Error> {
        let invalid = || std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid log path");
        let dir = self.log_path.parent().ok_or_else(invalid)?;
        let base_name = self
            .log_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(invalid)?
            .to_string();
        Ok((dir, base_name))
    }

    fn perform_rotation(&self) -> Result<(), std::io::Error> {
        let (log_dir, base_name) = self.log_parts()?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let archive_path = log_dir.join(format!("{}.{}.gz", base_name, timestamp));

        // Atomic rotation: move current log to temp, compress, cleanup
        let temp_path = self.log_path.with_extension("rotating");
        std::fs::rename(&self.log_path, &temp_path)?;

        let source_file = File::open(&temp_path)?;
        let target_file = File::create(&archive_path)?;
        let mut encoder = GzEncoder::new(target_file, Compression::default());
        std::io::copy(&mut BufReader::new(source_file), &mut encoder)?;
        encoder.finish()?;

        std::fs::remove_file(&temp_path)?;

        // Cleanup old archives (keep last MAX_ARCHIVES)
        let _ = self.cleanup_old_archives();

        Ok(())
    }

    fn cleanup_old_archives(&self) -> Result<(), std::io::Error> {
        let (log_dir, base_name) = self.log_parts()?;

        let mut archives = Vec::new();
        for entry in std::fs::read_dir(log_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            if name.starts_with(&format!("{}.", base_name)) && name.ends_with(".gz") {
                archives.push((entry.path(), entry.metadata()?.modified()?));
            }
        }

        archives.sort_by_key(|(_, modified)| *modified);
        if archives.len() > MAX_ARCHIVES as usize {
            let to_remove = archives.len() - MAX_ARCHIVES as usize;
            for (path, _) in archives.iter().take(to_remove) {
                let _ = std::fs::remove_file(path); // Ignore individual cleanup errors
            }
        }

        Ok(())
    }
}

/// JSON-lines debug logger for channel negotiation and socket lifecycle
///
/// Disabled unless `BCHANNEL_DEBUG` is set. Writing never fails the caller:
/// logging errors are swallowed.
pub struct ChannelDebugLogger {
    enabled: bool,
    rotating_logger: Option<Arc<Mutex<RotatingLogger>>>,
    session_id: String, // Correlation ID for this session
    redaction_patterns: Vec<Regex>,
}

impl ChannelDebugLogger {
    pub fn new() -> Self {
        let enabled = Self::parse_debug_enabled();
        Self::build(enabled, Self::get_log_path())
    }

    /// Logger writing to an explicit path, bypassing the environment switch
    pub fn with_log_path(log_path: PathBuf) -> Self {
        Self::build(true, log_path)
    }

    fn build(enabled: bool, log_path: PathBuf) -> Self {
        let session_id = Uuid::new_v4().to_string()[..8].to_string();

        let rotating_logger = if enabled {
            Some(Arc::new(Mutex::new(RotatingLogger::new(log_path))))
        } else {
            None
        };

        Self {
            enabled,
            rotating_logger,
            session_id,
            redaction_patterns: Self::compile_redaction_patterns(),
        }
    }

    /// Parse debug enabled status from BCHANNEL_DEBUG environment variable only
    /// Supports: true/false, 1/0, yes/no, on/off (case insensitive)
    fn parse_debug_enabled() -> bool {
        env::var("BCHANNEL_DEBUG")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(false)
    }

    fn get_log_path() -> PathBuf {
        let mut log_path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        log_path.push(".bchannel");
        log_path.push("bchannel-debug.log");
        log_path
    }

    fn compile_redaction_patterns() -> Vec<Regex> {
        let patterns = [
            r"(?i)authorization[:\s]+[^\s\n]+",
            r"(?i)bearer[:\s]+[^\s\n]+",
            r"(?i)token[:\s]+[^\s\n]+",
            r"(?i)cookie[:\s]+[^\s\n]+",
            r"(?i)(sid|session)=[^&\s]+",
        ];

        patterns
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    }

    /// Redaction guardrails for channel URLs and headers
    pub fn redact_sensitive_data(&self, text: &str) -> String {
        let mut redacted = text.to_string();

        for regex in &self.redaction_patterns {
            redacted = regex.replace_all(&redacted, "[REDACTED]").to_string();
        }

        // Redact suspiciously long strings (potential tokens)
        if redacted.len() > 100 && !redacted.contains(' ') && redacted.chars().all(|c| c.is_ascii_alphanumeric() || "-_".contains(c)) {
            redacted = format!("[REDACTED_LONG_STRING_{}chars]", redacted.len());
        }

        redacted
    }

    /// Core synchronous logging method with JSON Lines format
    fn log_sync(
        &self,
        level: &str,
        component: &str,
        event: &str,
        message: &str,
        correlation_id: Option<String>,
        fields: HashMap<String, serde_json::Value>
    ) {
        if !self.enabled {
            return;
        }

        let entry = LogEntry {
            timestamp: Local::now().to_rfc3339(),
            level: level.to_string(),
            component: component.to_string(),
            event: event.to_string(),
            message: self.redact_sensitive_data(message),
            correlation_id: correlation_id.or_else(|| Some(self.session_id.clone())),
            fields,
        };

        if let Some(logger) = &self.rotating_logger {
            if let Ok(logger) = logger.lock() {
                if let Ok(json_line) = serde_json::to_string(&entry) {
                    let _ = logger.write_with_rotation(&json_line); // Don't crash on logging errors
                }
            }
        }
    }

    pub fn debug_sync(&self, component: &str, event: &str, message: &str) {
        self.log_sync("DEBUG", component, event, message, None, HashMap::new());
    }

    pub fn error_sync(&self, component: &str, event: &str, message: &str) {
        self.log_sync("ERROR", component, event, message, None, HashMap::new());
    }

    // Typed methods for test channel negotiation

    pub fn channel_stage_start(&self, stage: &str, uri: &str, correlation_id: String) {
        let mut fields = HashMap::new();
        fields.insert("stage".to_string(), serde_json::Value::String(stage.to_string()));
        fields.insert("uri".to_string(), serde_json::Value::String(self.redact_sensitive_data(uri)));

        self.log_sync("CHANNEL", "TestChannel", "stage_start",
                     &format!("TestConnection: starting {}", stage),
                     Some(correlation_id), fields);
    }

    pub fn channel_request_failed(&self, stage: &str, kind: &str, status_code: i32, correlation_id: String) {
        let mut fields = HashMap::new();
        fields.insert("stage".to_string(), serde_json::Value::String(stage.to_string()));
        fields.insert("error_kind".to_string(), serde_json::Value::String(kind.to_string()));
        fields.insert("status_code".to_string(), serde_json::Value::Number(status_code.into()));

        self.log_sync("CHANNEL", "TestChannel", "request_failed",
                     &format!("TestConnection: request failed in state {} ({})", stage, kind),
                     Some(correlation_id), fields);
    }

    pub fn channel_finished(&self, outcome: &str, elapsed_ms: u64, correlation_id: String) {
        let mut fields = HashMap::new();
        fields.insert("outcome".to_string(), serde_json::Value::String(outcome.to_string()));
        fields.insert("elapsed_ms".to_string(), serde_json::Value::Number(elapsed_ms.into()));

        self.log_sync("CHANNEL", "TestChannel", "test_finished",
                     &format!("Test connection finished: {} ({}ms)", outcome, elapsed_ms),
                     Some(correlation_id), fields);
    }

    // Typed methods for connection probes

    pub fn probe_attempt(&self, url: &str, attempt: u32, retries_remaining: u32) {
        let mut fields = HashMap::new();
        fields.insert("url".to_string(), serde_json::Value::String(self.redact_sensitive_data(url)));
        fields.insert("attempt".to_string(), serde_json::Value::Number(attempt.into()));
        fields.insert("retries_remaining".to_string(), serde_json::Value::Number(retries_remaining.into()));

        self.log_sync("PROBE", "ConnectionProbe", "attempt",
                     &format!("Probe attempt {} ({} retries left)", attempt, retries_remaining),
                     None, fields);
    }

    pub fn probe_result(&self, succeeded: bool, attempts: u32, duration_ms: u64) {
        let mut fields = HashMap::new();
        fields.insert("succeeded".to_string(), serde_json::Value::Bool(succeeded));
        fields.insert("attempts".to_string(), serde_json::Value::Number(attempts.into()));
        fields.insert("duration_ms".to_string(), serde_json::Value::Number(duration_ms.into()));

        self.log_sync("PROBE", "ConnectionProbe", "result",
                     &format!("Probe {} after {} attempt(s)", if succeeded { "succeeded" } else { "failed" }, attempts),
                     None, fields);
    }

    // Typed methods for socket lifecycle

    pub fn socket_opened(&self, url: &str) {
        let mut fields = HashMap::new();
        fields.insert("url".to_string(), serde_json::Value::String(self.redact_sensitive_data(url)));

        self.log_sync("SOCKET", "PersistentSocket", "opened", "WebSocket opened", None, fields);
    }

    pub fn socket_closed(&self, url: &str, code: u16, was_clean: bool, expected: bool) {
        let mut fields = HashMap::new();
        fields.insert("url".to_string(), serde_json::Value::String(self.redact_sensitive_data(url)));
        fields.insert("code".to_string(), serde_json::Value::Number(code.into()));
        fields.insert("was_clean".to_string(), serde_json::Value::Bool(was_clean));
        fields.insert("expected".to_string(), serde_json::Value::Bool(expected));

        let message = if expected {
            "The WebSocket closed normally".to_string()
        } else {
            format!("The WebSocket disconnected unexpectedly (code {})", code)
        };
        self.log_sync("SOCKET", "PersistentSocket", "closed", &message, None, fields);
    }

    pub fn socket_reconnect_scheduled(&self, delay_ms: u64, attempt: u32) {
        let mut fields = HashMap::new();
        fields.insert("delay_ms".to_string(), serde_json::Value::Number(delay_ms.into()));
        fields.insert("attempt".to_string(), serde_json::Value::Number(attempt.into()));

        self.log_sync("SOCKET", "PersistentSocket", "reconnect_scheduled",
                     &format!("Seconds until next reconnect attempt: {}", delay_ms / 1000),
                     None, fields);
    }

    pub fn consumer_panic(&self, component: &str, callback: &str, reason: &str) {
        let mut fields = HashMap::new();
        fields.insert("callback".to_string(), serde_json::Value::String(callback.to_string()));

        self.log_sync("ERROR", component, "consumer_panic",
                     &format!("Consumer callback {} panicked: {}", callback, reason),
                     None, fields);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get_session_id(&self) -> &str {
        &self.session_id
    }
}

impl Default for ChannelDebugLogger {
    fn default() -> Self {
        Self::new()
    }
}

static DEBUG_LOGGER: OnceLock<ChannelDebugLogger> = OnceLock::new();

/// Process-wide logger; `BCHANNEL_DEBUG` is read on first use
pub fn get_debug_logger() -> &'static ChannelDebugLogger {
    DEBUG_LOGGER.get_or_init(ChannelDebugLogger::new)
}
