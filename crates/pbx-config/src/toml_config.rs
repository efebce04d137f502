use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::PbxConfig;

/// Raw shape of an optional TOML config file. Every field is optional since the
/// file only ever supplies *defaults*; CLI flags passed to `pbx-server` always
/// win over whatever is in here.
#[derive(Debug, Default, Deserialize)]
struct TomlConfigRoot {
    port: Option<u16>,
    max_extensions: Option<u32>,
    log_file: Option<String>,
}

/// Loads an optional config-file overlay and merges it under `base`: any field
/// set on `base` is kept, and fields left at their [`PbxConfig`] default are
/// filled in from the file if present there.
///
/// `base` is expected to reflect CLI-supplied values; `None` fields in the
/// caller's CLI parsing should be represented by leaving `base` at its
/// [`PbxConfig::new`] defaults before calling this. `port = 0` stands in for
/// "the CLI didn't supply one", letting the file fill it in; `validate()`
/// still rejects `port = 0` if neither source ever sets it.
pub fn apply_overlay(base: PbxConfig, path: &Path) -> Result<PbxConfig, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)?;
    let root: TomlConfigRoot = toml::from_str(&contents)?;

    Ok(PbxConfig {
        port: if base.port == 0 { root.port.unwrap_or(0) } else { base.port },
        max_extensions: root.max_extensions.unwrap_or(base.max_extensions),
        log_file: base.log_file.or(root.log_file),
    })
}
