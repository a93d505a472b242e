//! Worklist reader
//!
//! Reads the simplified GWL record format: one `;`-separated record per line,
//! record type first.
//!
//! ```text
//! A;Source_96;A1;;50      aspirate 50 µL from Source_96 A1
//! D;Dest_96;A1;;50        dispense 50 µL into Dest_96 A1
//! M;Dest_96;A2;3;100      mix 3 cycles of 100 µL
//! W;                      wash / change tips
//! B;                      break
//! C;free text             comment
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Worklist error types
#[derive(Error, Debug)]
pub enum WorklistError {
    /// File could not be read
    #[error("Cannot read worklist {}: {source}", path.display())]
    Io {
        /// Worklist path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Malformed record
    #[error("Worklist line {line}: {reason}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },
}

/// One worklist record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorklistCommand {
    /// Aspirate from a well
    Aspirate {
        /// Labware label
        labware: String,
        /// Well name
        well: String,
        /// Volume in µL
        volume: f64,
    },
    /// Dispense into a well
    Dispense {
        /// Labware label
        labware: String,
        /// Well name
        well: String,
        /// Volume in µL
        volume: f64,
    },
    /// Mix in place
    Mix {
        /// Labware label
        labware: String,
        /// Well name
        well: String,
        /// Mix cycles
        cycles: u32,
        /// Volume per cycle in µL
        volume: f64,
    },
    /// Wash or change tips
    Wash,
    /// Execute pending commands before continuing
    Break,
}

impl WorklistCommand {
    /// Record letter as written in the file
    pub fn code(&self) -> char {
        match self {
            Self::Aspirate { .. } => 'A',
            Self::Dispense { .. } => 'D',
            Self::Mix { .. } => 'M',
            Self::Wash => 'W',
            Self::Break => 'B',
        }
    }
}

impl fmt::Display for WorklistCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aspirate { labware, well, volume } => {
                write!(f, "aspirate {volume} µL from {labware} {well}")
            }
            Self::Dispense { labware, well, volume } => {
                write!(f, "dispense {volume} µL to {labware} {well}")
            }
            Self::Mix { labware, well, cycles, volume } => {
                write!(f, "mix {cycles} cycles of {volume} µL in {labware} {well}")
            }
            Self::Wash => write!(f, "wash"),
            Self::Break => write!(f, "break"),
        }
    }
}

/// Parsed worklist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Worklist {
    /// Commands in file order
    pub commands: Vec<WorklistCommand>,
    /// Records skipped because their type is not handled
    pub skipped: usize,
}

impl Worklist {
    /// Parse worklist text
    pub fn parse(text: &str) -> Result<Self, WorklistError> {
        let mut worklist = Self::default();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let record = raw.trim();
            if record.is_empty() {
                continue;
            }

            let fields: Vec<&str> = record.split(';').map(str::trim).collect();
            let command = match fields[0] {
                "A" => WorklistCommand::Aspirate {
                    labware: field(&fields, 1, line, "labware")?.to_string(),
                    well: field(&fields, 2, line, "well")?.to_string(),
                    volume: volume(&fields, 4, line)?,
                },
                "D" => WorklistCommand::Dispense {
                    labware: field(&fields, 1, line, "labware")?.to_string(),
                    well: field(&fields, 2, line, "well")?.to_string(),
                    volume: volume(&fields, 4, line)?,
                },
                "M" => {
                    let cycles = field(&fields, 3, line, "cycles")?;
                    WorklistCommand::Mix {
                        labware: field(&fields, 1, line, "labware")?.to_string(),
                        well: field(&fields, 2, line, "well")?.to_string(),
                        cycles: cycles.parse().map_err(|_| WorklistError::Parse {
                            line,
                            reason: format!("invalid cycle count '{cycles}'"),
                        })?,
                        volume: volume(&fields, 4, line)?,
                    }
                }
                "W" => WorklistCommand::Wash,
                "B" => WorklistCommand::Break,
                "C" => continue,
                other => {
                    tracing::debug!("Skipping unsupported worklist record '{}' on line {}", other, line);
                    worklist.skipped += 1;
                    continue;
                }
            };
            worklist.commands.push(command);
        }

        Ok(worklist)
    }

    /// Read and parse a worklist file
    pub fn load(path: &Path) -> Result<Self, WorklistError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorklistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// No commands?
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Sum of all aspirated volumes in µL
    pub fn aspirated_volume(&self) -> f64 {
        self.commands
            .iter()
            .map(|c| match c {
                WorklistCommand::Aspirate { volume, .. } => *volume,
                _ => 0.0,
            })
            .sum()
    }
}

fn field<'a>(fields: &[&'a str], index: usize, line: usize, name: &str) -> Result<&'a str, WorklistError> {
    match fields.get(index) {
        Some(value) if !value.is_empty() => Ok(*value),
        _ => Err(WorklistError::Parse {
            line,
            reason: format!("missing {name} (field {})", index + 1),
        }),
    }
}

fn volume(fields: &[&str], index: usize, line: usize) -> Result<f64, WorklistError> {
    let raw = field(fields, index, line, "volume")?;
    let value: f64 = raw.parse().map_err(|_| WorklistError::Parse {
        line,
        reason: format!("invalid volume '{raw}'"),
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(WorklistError::Parse {
            line,
            reason: format!("volume must be a non-negative number, got {raw}"),
        });
    }
    Ok(value)
}
