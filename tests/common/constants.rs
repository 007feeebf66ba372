//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When test data changes (user credentials, seeded record IDs, etc.),
//! update only this file.
#![allow(dead_code)]

// ============================================================================
// Test User Credentials
// ============================================================================

/// Password shared by every test account
pub const TEST_PASS: &str = "testpass123";

pub const CUSTOMER_ID: &str = "customer-1";
pub const CUSTOMER_EMAIL: &str = "customer-1@salon.test";

pub const OTHER_CUSTOMER_ID: &str = "customer-2";
pub const OTHER_CUSTOMER_EMAIL: &str = "customer-2@salon.test";

pub const BARBER_ID: &str = "barber-1";
pub const BARBER_EMAIL: &str = "barber-1@salon.test";

pub const MANAGER_ID: &str = "manager-1";
pub const MANAGER_EMAIL: &str = "manager-1@salon.test";

pub const ADMIN_ID: &str = "admin-1";
pub const ADMIN_EMAIL: &str = "admin-1@salon.test";

/// API token of the admin account
pub const ADMIN_TOKEN: &str = "admin-token-123";

// ============================================================================
// Seeded Records
// ============================================================================

/// Appointment of customer-1 with barber-1
pub const APPOINTMENT_OF_BARBER_1: &str = "apt-1";

/// Appointment of customer-2 with barber-2
pub const APPOINTMENT_OF_BARBER_2: &str = "apt-2";

// ============================================================================
// Fixture Handler Methods
// ============================================================================

/// Always fails with [`FIXTURE_FAILURE_MESSAGE`]
pub const FAILING_METHOD: &str = "fixture_fail";

/// Sleeps longer than the test request timeout
pub const SLOW_METHOD: &str = "fixture_slow";

pub const FIXTURE_FAILURE_MESSAGE: &str = "fixture exploded";

// ============================================================================
// Timeouts
// ============================================================================

/// Max time to wait for the server to accept requests
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Max time to wait for a single response or event
pub const RESPONSE_TIMEOUT_MS: u64 = 5000;
