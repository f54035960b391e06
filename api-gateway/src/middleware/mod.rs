// ==============================================================================
// middleware/mod.rs - API Gateway Middleware Modules
// ==============================================================================
// Description: Caller authentication for the status API
// Author: Matt Barham
// Created: 2026-01-11
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

pub mod auth;

pub use auth::AuthUser;
