//! Command parsing and execution for the interactive surface.
//!
//! The wire format is one command per line: `p k v` (put), `g k` (get),
//! `r lo hi` (range over `[lo, hi)`), `d k` (delete), `l "path"` (load a
//! binary file). The library hands values back; only this layer prints. A
//! `get` miss prints an empty line, and a `range` prints space-separated
//! `k:v` pairs with no trailing separator.

use std::io::Write;

use itertools::Itertools;

use crate::entry::{Key, Value};
use crate::errinput;
use crate::error::Result;
use crate::tree::LsmTree;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Put { key: Key, value: Value },
    Get { key: Key },
    Range { start: Key, end: Key },
    Delete { key: Key },
    Load { path: String },
}

impl Command {
    /// Parses a command line. Blank lines parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        // Load takes the rest of the line as a path, optionally quoted, so
        // paths may contain spaces.
        if let Some(rest) = line.strip_prefix("l ") {
            let path = rest.trim().trim_matches('"');
            if path.is_empty() {
                return errinput!("load requires a path");
            }
            return Ok(Some(Command::Load {
                path: path.to_string(),
            }));
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let command = match parts.as_slice() {
            ["p", key, value] => Command::Put {
                key: key.parse()?,
                value: value.parse()?,
            },
            ["g", key] => Command::Get { key: key.parse()? },
            ["r", start, end] => Command::Range {
                start: start.parse()?,
                end: end.parse()?,
            },
            ["d", key] => Command::Delete { key: key.parse()? },
            _ => return errinput!("unknown command '{line}'"),
        };
        Ok(Some(command))
    }
}

/// Executes a command against a tree, writing any output to `out`.
pub fn execute(tree: &LsmTree, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Put { key, value } => tree.put(key, value)?,
        Command::Get { key } => match tree.get(key)? {
            Some(value) => writeln!(out, "{value}")?,
            None => writeln!(out)?,
        },
        Command::Range { start, end } => {
            let entries = tree.range(start, end)?;
            let line = entries
                .iter()
                .map(|entry| format!("{}:{}", entry.key, entry.value))
                .join(" ");
            writeln!(out, "{line}")?;
        }
        Command::Delete { key } => tree.del(key)?,
        Command::Load { path } => {
            tree.load(path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn parse(line: &str) -> Command {
        Command::parse(line)
            .expect("parse failed")
            .expect("expected a command")
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("p 1 10"), Command::Put { key: 1, value: 10 });
        assert_eq!(parse("g 7"), Command::Get { key: 7 });
        assert_eq!(parse("r 1 5"), Command::Range { start: 1, end: 5 });
        assert_eq!(parse("d -3"), Command::Delete { key: -3 });
        assert_eq!(
            parse("l \"/tmp/data file.bin\""),
            Command::Load {
                path: "/tmp/data file.bin".to_string()
            }
        );
        assert_eq!(
            parse("l /tmp/plain.bin"),
            Command::Load {
                path: "/tmp/plain.bin".to_string()
            }
        );
    }

    #[test]
    fn test_parse_blank_and_invalid() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert!(Command::parse("x 1").is_err());
        assert!(Command::parse("p 1").is_err());
        assert!(Command::parse("g one").is_err());
        assert!(Command::parse("l ").is_err());
    }

    fn output(tree: &LsmTree, line: &str) -> String {
        let mut out = Vec::new();
        execute(tree, parse(line), &mut out).expect("execute failed");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn test_execute_formatting() {
        let dir = TempDir::new().expect("temp dir");
        let tree = LsmTree::open(
            Config::new(dir.path())
                .buffer_capacity(4)
                .depth(3)
                .fanout(2)
                .threads(2),
        )
        .expect("failed to open tree");

        assert_eq!(output(&tree, "p 1 10"), "");
        assert_eq!(output(&tree, "p 2 20"), "");
        assert_eq!(output(&tree, "p 3 30"), "");

        assert_eq!(output(&tree, "g 3"), "30\n");
        assert_eq!(output(&tree, "g 9"), "\n");

        assert_eq!(output(&tree, "r 1 3"), "1:10 2:20\n");
        assert_eq!(output(&tree, "r 3 3"), "\n");

        assert_eq!(output(&tree, "d 3"), "");
        assert_eq!(output(&tree, "g 3"), "\n");
    }
}
