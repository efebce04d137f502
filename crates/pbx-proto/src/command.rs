/// A parsed client command. Extension arguments to `dial` are carried as the raw
/// digit string; resolving them to a registered TU is the PBX's job, not the
/// parser's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pickup,
    Hangup,
    Dial { digits: String },
    Chat { text: String },
}

impl Command {
    /// Parses one line of client input (with the trailing `\r\n` already
    /// stripped by the caller). Matching is case-sensitive and strict: no
    /// trailing whitespace tolerance, no leading whitespace skipped. Unknown or
    /// malformed input yields `None`, which the adapter drops silently rather
    /// than surfacing as an error.
    pub fn parse(line: &str) -> Option<Command> {
        if line == "pickup" {
            return Some(Command::Pickup);
        }
        if line == "hangup" {
            return Some(Command::Hangup);
        }
        if let Some(rest) = line.strip_prefix("dial ") {
            if rest.is_empty() {
                return None;
            }
            return Some(Command::Dial { digits: rest.to_string() });
        }
        if let Some(rest) = line.strip_prefix("chat ") {
            if rest.is_empty() {
                return None;
            }
            return Some(Command::Chat { text: rest.to_string() });
        }
        None
    }
}
