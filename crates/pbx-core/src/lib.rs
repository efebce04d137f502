//! Core utilities for the PBX switch
//!
//! This crate provides cross-cutting primitives shared by every other crate in the
//! workspace: logging setup and the small value types that don't belong to any one
//! layer. No call-control logic lives here.

pub mod debug;

/// Extensions live in `[0, MAX_EXTENSIONS)`. The PBX registry is a dense array of
/// this size, so it also bounds how many TUs can be registered at once.
pub const DEFAULT_MAX_EXTENSIONS: u32 = 1024;

/// Every notification and command line on the wire ends with this sequence.
pub const LINE_TERMINATOR: &str = "\r\n";
