//! PBX configuration: the bind port, the registry size bound, and an optional
//! logfile path. These can be supplied directly (from CLI flags) or loaded from
//! a TOML overlay file, mirroring the teacher stack's split between
//! `stack_config` and `toml_config`.

pub mod config;
pub mod toml_config;

pub use config::PbxConfig;
