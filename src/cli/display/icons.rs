//! Status icons for CLI output

/// Status icons for different states
pub struct StatusIcon;

impl StatusIcon {
    /// Success icon (ready, applied, deleted)
    pub const SUCCESS: &'static str = "✓";

    /// Warning icon (partially ready)
    pub const WARNING: &'static str = "⚠";

    /// Error icon (failed)
    pub const ERROR: &'static str = "✗";

    /// Pending icon (waiting)
    pub const PENDING: &'static str = "⏳";

    /// Unknown icon
    pub const UNKNOWN: &'static str = "?";

    /// Current context marker
    pub const CURRENT: &'static str = "*";

    /// Get status icon based on ready/total counts
    pub fn get_replica_icon(ready: u32, total: u32) -> &'static str {
        if total == 0 {
            Self::UNKNOWN
        } else if ready == total {
            Self::SUCCESS
        } else if ready > 0 {
            Self::WARNING
        } else {
            Self::ERROR
        }
    }

    /// Get status icon for a pod phase
    pub fn get_phase_icon(phase: &str) -> &'static str {
        match phase {
            "Running" | "Succeeded" | "Active" => Self::SUCCESS,
            "Pending" => Self::PENDING,
            "Failed" => Self::ERROR,
            _ => Self::UNKNOWN,
        }
    }
}
