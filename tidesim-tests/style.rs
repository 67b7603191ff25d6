//! Style Enforcement Tests
//!
//! Scans the workspace crates for patterns that clippy does not reject on
//! its own.
//!
//! - `dead_code_enforcement` - Prevents #[allow(dead_code)] in production code

#[path = "style/dead_code_enforcement.rs"]
mod dead_code_enforcement;
