//! Default constants for idlink configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Network Defaults
// =============================================================================

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

// =============================================================================
// Listing Defaults
// =============================================================================

/// Default page size when the request does not specify one
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Smallest accepted page size; smaller requests are clamped up
pub const MIN_PAGE_LIMIT: u32 = 1;

/// Largest accepted page size; larger requests are clamped down
pub const MAX_PAGE_LIMIT: u32 = 100;

// =============================================================================
// Validation Defaults
// =============================================================================

/// Minimum digits in a phone number after stripping separators
pub const MIN_PHONE_DIGITS: usize = 4;

/// Maximum digits in a phone number after stripping separators
pub const MAX_PHONE_DIGITS: usize = 15;
