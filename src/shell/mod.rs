//! # Shell Module
//!
//! The line-oriented command boundary over the engine: parse a line into
//! a [`Command`], dispatch it, format the outcome. This is the single
//! point of runtime dispatch in the crate — engine methods themselves
//! are statically typed.
//!
//! ## Grammar
//!
//! Verbs are case-insensitive; arguments are whitespace-separated.
//!
//! | Command | Arity | Semantics |
//! |---|---|---|
//! | `PUT key value…` | key + ≥1 token | insert/update; remaining tokens joined by single spaces |
//! | `GET key` | 1 | point lookup, printed with its search path |
//! | `DELETE key` | 1 | tombstone insert |
//! | `COMPACT level` | 1 | compact level N into N+1 |
//! | `STATS` | 0 | statistics snapshot |
//! | `CLEAR` | 0 | reset engine state |
//! | `HELP` | 0 | command summary |
//!
//! A PUT value that parses as a self-describing structured literal (a
//! JSON object or array) is stored in canonical compact form; anything
//! else is stored as the raw string.
//!
//! Malformed input is a [`UsageError`] — reported, never applied.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fmt::Write as _;

use thiserror::Error;

use crate::engine::{Engine, EngineError, ReadLocation, ReadOutcome, WriteOutcome};
use crate::levels::ProbeOutcome;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Malformed command input. Reported to the caller; engine state is
/// never touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// The verb is not one of the known commands.
    #[error("unknown command {0:?} (try HELP)")]
    UnknownCommand(String),

    /// A required argument is missing.
    #[error("{verb} requires {what}")]
    MissingArgument {
        /// The command verb.
        verb: &'static str,
        /// Description of what is missing.
        what: &'static str,
    },

    /// The command takes fewer arguments than were given.
    #[error("{verb} takes no arguments")]
    UnexpectedArguments {
        /// The command verb.
        verb: &'static str,
    },

    /// COMPACT's level argument must be a non-negative integer.
    #[error("invalid level {0:?}: expected a non-negative integer")]
    InvalidLevel(String),
}

/// Everything a shell interaction can fail with.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The line did not parse.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The engine rejected the operation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ------------------------------------------------------------------------------------------------
// Command
// ------------------------------------------------------------------------------------------------

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Insert or update a key.
    Put {
        /// The key token.
        key: String,
        /// The value bytes to store (literal-normalised).
        value: Vec<u8>,
    },

    /// Point lookup.
    Get {
        /// The key token.
        key: String,
    },

    /// Tombstone insert.
    Delete {
        /// The key token.
        key: String,
    },

    /// Compact `level` into `level + 1`.
    Compact {
        /// The source level.
        level: u32,
    },

    /// Print the statistics snapshot.
    Stats,

    /// Reset the engine.
    Clear,

    /// Print the command summary.
    Help,
}

/// Parses one input line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, UsageError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_uppercase().as_str() {
        "PUT" => match args {
            [] => {
                return Err(UsageError::MissingArgument {
                    verb: "PUT",
                    what: "a key and a value",
                });
            }
            [_key] => {
                return Err(UsageError::MissingArgument {
                    verb: "PUT",
                    what: "a value",
                });
            }
            [key, value_tokens @ ..] => Command::Put {
                key: (*key).to_string(),
                value: normalize_value(&value_tokens.join(" ")),
            },
        },
        "GET" => Command::Get {
            key: single_key_arg("GET", args)?,
        },
        "DELETE" => Command::Delete {
            key: single_key_arg("DELETE", args)?,
        },
        "COMPACT" => match args {
            [] => {
                return Err(UsageError::MissingArgument {
                    verb: "COMPACT",
                    what: "a level number",
                });
            }
            [level] => Command::Compact {
                level: level
                    .parse::<u32>()
                    .map_err(|_| UsageError::InvalidLevel((*level).to_string()))?,
            },
            _ => return Err(UsageError::InvalidLevel(args.join(" "))),
        },
        "STATS" => zero_arg_command("STATS", args, Command::Stats)?,
        "CLEAR" => zero_arg_command("CLEAR", args, Command::Clear)?,
        "HELP" => zero_arg_command("HELP", args, Command::Help)?,
        _ => return Err(UsageError::UnknownCommand(verb.to_string())),
    };

    Ok(Some(command))
}

fn single_key_arg(verb: &'static str, args: &[&str]) -> Result<String, UsageError> {
    match args {
        [key] => Ok((*key).to_string()),
        [] => Err(UsageError::MissingArgument { verb, what: "a key" }),
        _ => Err(UsageError::MissingArgument {
            verb,
            what: "exactly one key",
        }),
    }
}

fn zero_arg_command(
    verb: &'static str,
    args: &[&str],
    command: Command,
) -> Result<Command, UsageError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(UsageError::UnexpectedArguments { verb })
    }
}

/// A value that parses as a self-describing structured literal (JSON
/// object or array) is stored in canonical compact form; everything
/// else is stored verbatim.
fn normalize_value(raw: &str) -> Vec<u8> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(literal @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
            literal.to_string().into_bytes()
        }
        _ => raw.as_bytes().to_vec(),
    }
}

// ------------------------------------------------------------------------------------------------
// Shell
// ------------------------------------------------------------------------------------------------

/// Owns an engine and runs parsed commands against it, producing
/// printable output.
pub struct Shell {
    engine: Engine,
}

impl Shell {
    /// Wraps an engine.
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Parses and executes one line. Blank lines produce empty output.
    pub fn handle_line(&mut self, line: &str) -> Result<String, ShellError> {
        match parse(line)? {
            Some(command) => self.execute(command),
            None => Ok(String::new()),
        }
    }

    /// Executes one parsed command.
    pub fn execute(&mut self, command: Command) -> Result<String, ShellError> {
        match command {
            Command::Put { key, value } => {
                let receipt = self.engine.put(key.as_bytes(), &value)?;
                let verb = match receipt.outcome {
                    WriteOutcome::Inserted => "inserted",
                    WriteOutcome::Updated => "updated",
                };
                let mut out = format!("{verb} {key} ({:.3} ms", receipt.elapsed_ms);
                if let Some(flush) = &receipt.flush {
                    let _ = write!(out, ", flushed {} records to table {}", flush.records, flush.table_id);
                }
                if !receipt.compactions.is_empty() {
                    let _ = write!(out, ", {} compactions", receipt.compactions.len());
                }
                out.push(')');
                Ok(out)
            }

            Command::Get { key } => {
                let receipt = self.engine.get(key.as_bytes())?;
                let mut out = match (&receipt.value, &receipt.outcome) {
                    (Some(value), _) => {
                        format!("{key} = {}", String::from_utf8_lossy(value))
                    }
                    (None, ReadOutcome::TombstoneMiss) => {
                        format!("{key}: not found (deleted)")
                    }
                    (None, _) => format!("{key}: not found"),
                };
                out.push('\n');
                out.push_str(&format_path(&receipt));
                Ok(out)
            }

            Command::Delete { key } => {
                let receipt = self.engine.delete(key.as_bytes())?;
                Ok(format!("deleted {key} ({:.3} ms)", receipt.elapsed_ms))
            }

            Command::Compact { level } => {
                let record = self.engine.compact(level, level + 1)?;
                Ok(format!(
                    "compacted L{} -> L{}: {}+{} tables -> {} records ({} duplicates removed, {} tombstones dropped, {:.3} ms)",
                    record.source_level,
                    record.target_level,
                    record.source_tables,
                    record.overlapping_tables,
                    record.output_records,
                    record.duplicates_removed,
                    record.tombstones_dropped,
                    record.elapsed_ms
                ))
            }

            Command::Stats => Ok(self.engine.stats().to_string()),

            Command::Clear => {
                self.engine.clear();
                Ok("engine cleared".to_string())
            }

            Command::Help => Ok(HELP_TEXT.to_string()),
        }
    }
}

/// Renders a read receipt's search path, one probe per line.
fn format_path(receipt: &crate::engine::ReadReceipt) -> String {
    let mut out = String::from("search path:");
    for step in &receipt.path {
        let location = match &step.location {
            ReadLocation::Memtable => "  memtable".to_string(),
            ReadLocation::Table { level, table_id } => {
                format!("  L{level} table {table_id}")
            }
        };
        let outcome = match step.outcome {
            ProbeOutcome::Hit => "hit",
            ProbeOutcome::TombstoneHit => "tombstone",
            ProbeOutcome::Miss => "miss",
        };
        out.push('\n');
        out.push_str(&location);
        out.push_str(": ");
        out.push_str(outcome);
        if step.bloom_saved {
            out.push_str(" (bloom saved the read)");
        }
    }
    out
}

const HELP_TEXT: &str = "\
commands:
  PUT key value...   insert or update a key (JSON objects/arrays stored canonically)
  GET key            point lookup, with the search path
  DELETE key         delete a key (tombstone insert)
  COMPACT level      compact level N into level N+1
  STATS              print the statistics snapshot
  CLEAR              reset the engine
  HELP               this summary";
