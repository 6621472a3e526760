// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Hive CLI library - exposes the daemon and command handlers for testing
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** HTTP daemon, its client, and the `hive` subcommands

pub mod commands;
pub mod daemon;
