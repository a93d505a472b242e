//! Core module containing the main functionality of Silaprobe
//!
//! This module provides:
//! - Controller clients (SiLA2 over gRPC, in-process simulation)
//! - The connection tester that sequences the smoke-test steps
//! - Test reports
//! - Worklist parsing

pub mod controller;
pub mod report;
pub mod tester;
pub mod worklist;
