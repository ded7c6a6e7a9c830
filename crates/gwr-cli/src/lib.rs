// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library surface of the `gwr` binary (command implementations).

#![deny(unsafe_code)]

/// Subcommand implementations and exit-code policy.
pub mod commands;
