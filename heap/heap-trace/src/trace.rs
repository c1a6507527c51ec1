//! Parses the line-oriented trace format this replayer consumes:
//!
//! ```text
//! a <id> <size>   allocate <size> bytes, remember the result under <id>
//! r <id> <size>   resize the block remembered under <id> to <size> bytes
//! f <id>          release the block remembered under <id>
//! ```
//!
//! One instruction per line; blank lines and lines starting with `#` are
//! ignored. This is a Rust-native re-expression of the trace grammar
//! `original_source/mymalloc/mdriver.c` reads (`trace->ops[i]` entries of
//! type `ALLOC`/`REALLOC`/`FREE`), not a transliteration of its binary
//! `.rep` format.

/// One parsed trace instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Allocate `size` bytes, remembering the result under `id`.
    Alloc { id: u32, size: usize },
    /// Resize the block remembered under `id` to `size` bytes.
    Resize { id: u32, size: usize },
    /// Release the block remembered under `id`.
    Free { id: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("line {line}: unrecognized opcode {opcode:?}")]
    UnknownOpcode { line: usize, opcode: String },
    #[error("line {line}: expected {expected} fields, got {got}")]
    WrongFieldCount {
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("line {line}: could not parse {field:?} as a number")]
    NotANumber { line: usize, field: String },
}

/// Parse an entire trace file's contents into a sequence of [`Op`]s.
///
/// # Errors
/// Returns the first malformed line encountered.
pub fn parse(contents: &str) -> Result<Vec<Op>, TraceError> {
    let mut ops = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        ops.push(parse_line(lineno + 1, line)?);
    }
    Ok(ops)
}

fn parse_line(line: usize, text: &str) -> Result<Op, TraceError> {
    let mut fields = text.split_whitespace();
    let opcode = fields.next().unwrap_or_default();

    let parse_u32 = |field: &str| -> Result<u32, TraceError> {
        field.parse().map_err(|_| TraceError::NotANumber {
            line,
            field: field.to_owned(),
        })
    };
    let parse_usize = |field: &str| -> Result<usize, TraceError> {
        field.parse().map_err(|_| TraceError::NotANumber {
            line,
            field: field.to_owned(),
        })
    };

    match opcode {
        "a" | "r" => {
            let rest: Vec<&str> = fields.collect();
            if rest.len() != 2 {
                return Err(TraceError::WrongFieldCount {
                    line,
                    expected: 3,
                    got: rest.len() + 1,
                });
            }
            let id = parse_u32(rest[0])?;
            let size = parse_usize(rest[1])?;
            Ok(if opcode == "a" {
                Op::Alloc { id, size }
            } else {
                Op::Resize { id, size }
            })
        }
        "f" => {
            let rest: Vec<&str> = fields.collect();
            if rest.len() != 1 {
                return Err(TraceError::WrongFieldCount {
                    line,
                    expected: 2,
                    got: rest.len() + 1,
                });
            }
            Ok(Op::Free {
                id: parse_u32(rest[0])?,
            })
        }
        other => Err(TraceError::UnknownOpcode {
            line,
            opcode: other.to_owned(),
        }),
    }
}
