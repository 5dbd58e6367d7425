//! # CLI UI Module
//!
//! Styling and formatting layer for `atelier` output.
//!
//! Every command prints either a human view (prefixed messages, key/value
//! blocks, tables) or, with `--json`, the resource representation and
//! nothing else.
//!
//! ## Module Structure
//!
//! - `color`: Color mode selection and terminal capability checks
//! - `style`: Message types, prefixes, and styling functions
//! - `format`: Time and text formatters
//! - `table`: Project and commit tables with comfy-table

pub mod color;
pub mod format;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use style::{MessageType, Style};
