//! Line commands for the interactive node.
//!
//! Parses text typed at the node's prompt (like "SET user:1 ana") into
//! structured commands. Only `SET` touches the cache's replicated state;
//! the rest are local reads or meta-commands.

use anyhow::{Result, anyhow};

/// Commands accepted at the node prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Set { key: String, value: String },
    Get { key: String },
    Status,
    Help,
    Exit,
}

pub const HELP: &str =
    "Commands: SET/s <key> <value>, GET/g <key>, STATUS/st, HELP/h, EXIT/e";

impl ConsoleCommand {
    /// Parses one line of input.
    ///
    /// Commands are case-insensitive and accept short aliases. A value may
    /// contain spaces: everything after the key is taken verbatim.
    pub fn parse(line: &str) -> Result<Self> {
        let (first, rest) = split_word(line.trim());
        if first.is_empty() {
            return Err(anyhow!("empty command"));
        }

        let cmd = first.to_uppercase();
        let normalized_cmd = match cmd.as_str() {
            "S" => "SET",
            "G" => "GET",
            "ST" => "STATUS",
            "H" => "HELP",
            "E" => "EXIT",
            other => other,
        };

        let (key, rest) = split_word(rest);
        let key = Some(key).filter(|key| !key.is_empty());
        let rest = Some(rest.trim_end()).filter(|rest| !rest.is_empty());

        match (normalized_cmd, key, rest) {
            ("EXIT", None, None) => Ok(ConsoleCommand::Exit),
            ("HELP", None, None) => Ok(ConsoleCommand::Help),
            ("STATUS", None, None) => Ok(ConsoleCommand::Status),
            ("GET", Some(key), None) => Ok(ConsoleCommand::Get {
                key: key.to_string(),
            }),
            ("SET", Some(key), Some(value)) => Ok(ConsoleCommand::Set {
                key: key.to_string(),
                value: value.to_string(),
            }),
            ("GET", _, _) => Err(anyhow!("GET requires exactly one argument: GET <key>")),
            ("SET", _, _) => Err(anyhow!("SET requires a key and a value: SET <key> <value>")),
            ("EXIT" | "HELP" | "STATUS", _, _) => {
                Err(anyhow!("{normalized_cmd} takes no arguments"))
            }
            _ => Err(anyhow!("invalid command. {HELP}")),
        }
    }
}

/// Splits off the first word, returning it and the remainder without its
/// leading whitespace.
fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}
