//! Color theme for CLI output

use comfy_table::Color as TableColor;

/// Color theme for terminal output
#[derive(Debug, Clone)]
pub struct ColorTheme {
    pub success: TableColor,
    pub warning: TableColor,
    pub error: TableColor,
    pub info: TableColor,
    pub muted: TableColor,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: TableColor::Green,
            warning: TableColor::Yellow,
            error: TableColor::Red,
            info: TableColor::Cyan,
            muted: TableColor::DarkGrey,
        }
    }
}

impl ColorTheme {
    /// Get color based on ready/total counts
    pub fn get_replica_color(&self, ready: u32, total: u32) -> TableColor {
        if total == 0 {
            self.muted
        } else if ready == total {
            self.success
        } else if ready > 0 {
            self.warning
        } else {
            self.error
        }
    }

    /// Get color for a pod phase or namespace status
    pub fn get_phase_color(&self, phase: &str) -> TableColor {
        match phase {
            "Running" | "Succeeded" | "Active" | "True" => self.success,
            "Pending" | "Terminating" | "ContainerCreating" => self.warning,
            "Failed" | "CrashLoopBackOff" | "False" => self.error,
            _ => self.muted,
        }
    }
}
