// ==============================================================================
// lib.rs - Clinical Genomics Core Library
// ==============================================================================
// Description: Library interface shared by the CLI, upload worker and gateway
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================

pub mod audit;
pub mod bundle;
pub mod config;
pub mod constants;
pub mod crunchy;
pub mod metrics;
pub mod models;
pub mod orderform;
pub mod petname;
pub mod process;
pub mod slurm;
pub mod stats;
pub mod status_view;
pub mod store;
pub mod upload;
