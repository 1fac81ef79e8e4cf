//! Display module for formatted CLI output

pub mod colors;
pub mod icons;
pub mod structured;
pub mod table;

pub use colors::ColorTheme;
pub use icons::StatusIcon;
pub use table::TableRenderer;
