/// Vulkan Debug Messenger - routes validation layer messages to the prism logger
///
/// The messenger is only installed when the `vulkan-validation` feature is
/// enabled. Messages are filtered by severity, counted and grouped by text,
/// then forwarded through the `prism_*` logging macros (source `prism::vulkan`).

use ash::vk;
use colored::*;
use prism_graphics::{prism_debug, prism_error, prism_info, prism_warn};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

const LOG_SOURCE: &str = "prism::vulkan";

/// Global debug configuration (shared across callbacks)
static DEBUG_CONFIG: Mutex<Option<DebugConfig>> = Mutex::new(None);

/// Global validation statistics (thread-safe atomic counters)
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrence count per message text
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Which validation severities are forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Debug configuration for the callback
#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub severity: DebugSeverity,
    pub show_performance: bool,
    pub enable_stats: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            severity: DebugSeverity::ErrorsAndWarnings,
            show_performance: false,
            enable_stats: true,
        }
    }
}

/// Validation message counts since the messenger was installed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Install the callback configuration and reset counters
pub fn init_debug_config(config: DebugConfig) {
    VALIDATION_STATS.reset();
    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = Some(FxHashMap::default());
    }
    if let Ok(mut guard) = DEBUG_CONFIG.lock() {
        *guard = Some(config);
    }
}

/// Remove the callback configuration (messages are ignored afterwards)
pub fn cleanup_debug_config() {
    if let Ok(mut guard) = DEBUG_CONFIG.lock() {
        *guard = None;
    }
    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = None;
    }
}

/// Current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Print a colored validation summary to stderr
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        eprintln!("\n{}", "No validation messages".green().bold());
        return;
    }

    eprintln!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());
    if stats.errors > 0 {
        eprintln!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        eprintln!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        eprintln!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        eprintln!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    eprintln!("  {} {}", "Total:".white().bold(), stats.total());

    if let Ok(tracker) = MESSAGE_TRACKER.lock() {
        let repeated = tracker
            .as_ref()
            .map(|messages| messages.values().filter(|&&count| count > 1).count())
            .unwrap_or(0);
        if repeated > 0 {
            eprintln!("  {} message(s) appeared multiple times", repeated);
        }
    }
    eprintln!("{}\n", "====================================".bright_blue().bold());
}

fn track_message(message: &str) -> u32 {
    let Ok(mut guard) = MESSAGE_TRACKER.lock() else {
        return 1;
    };
    let messages = guard.get_or_insert_with(FxHashMap::default);
    let count = messages.entry(message.to_string()).or_insert(0);
    *count += 1;
    *count
}

fn severity_passes(filter: DebugSeverity, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> bool {
    match filter {
        DebugSeverity::ErrorsOnly => severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
        DebugSeverity::ErrorsAndWarnings => {
            severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR)
                || severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING)
        }
        DebugSeverity::All => true,
    }
}

unsafe fn c_str_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed(fallback)
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

/// Vulkan debug messenger callback
///
/// Called by the validation layers. Never aborts the Vulkan call.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let config = match DEBUG_CONFIG.lock() {
        Ok(guard) => match guard.as_ref() {
            Some(config) => config.clone(),
            None => return vk::FALSE,
        },
        Err(_) => return vk::FALSE,
    };

    if !severity_passes(config.severity, message_severity) {
        return vk::FALSE;
    }
    let performance = message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE);
    if performance && !config.show_performance {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message_id_name = unsafe { c_str_or(callback_data.p_message_id_name, "Unknown") };
    let message = unsafe { c_str_or(callback_data.p_message, "No message") };

    let repeat = if config.enable_stats { track_message(&message) } else { 1 };
    let repeat_indicator = if repeat > 1 { format!(" [x{}]", repeat) } else { String::new() };

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if performance {
        "Performance"
    } else {
        "General"
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        if config.enable_stats {
            VALIDATION_STATS.errors.fetch_add(1, Ordering::Relaxed);
        }
        prism_error!(LOG_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        if config.enable_stats {
            VALIDATION_STATS.warnings.fetch_add(1, Ordering::Relaxed);
        }
        prism_warn!(LOG_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        if config.enable_stats {
            VALIDATION_STATS.info.fetch_add(1, Ordering::Relaxed);
        }
        prism_info!(LOG_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);
    } else {
        if config.enable_stats {
            VALIDATION_STATS.verbose.fetch_add(1, Ordering::Relaxed);
        }
        prism_debug!(LOG_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_filter() {
        let error = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
        let warning = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
        let info = vk::DebugUtilsMessageSeverityFlagsEXT::INFO;

        assert!(severity_passes(DebugSeverity::ErrorsOnly, error));
        assert!(!severity_passes(DebugSeverity::ErrorsOnly, warning));
        assert!(severity_passes(DebugSeverity::ErrorsAndWarnings, warning));
        assert!(!severity_passes(DebugSeverity::ErrorsAndWarnings, info));
        assert!(severity_passes(DebugSeverity::All, info));
    }

    #[test]
    fn test_validation_stats_total() {
        let stats = ValidationStats { errors: 1, warnings: 2, info: 3, verbose: 4 };
        assert_eq!(stats.total(), 10);
        assert_eq!(ValidationStats::default().total(), 0);
    }
}
