//! Log event definitions
//!
//! Defines the structure of individual log records and their line encoding.

use std::fmt;

use crate::error::{KvError, Result};

/// Field delimiter inside a record
pub const FIELD_DELIMITER: char = '\t';

/// Record terminator
pub const RECORD_TERMINATOR: char = '\n';

/// Kind of mutation carried by an event.
///
/// There is deliberately no zero variant: `0` never decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    Put = 1,
    Delete = 2,
}

impl EventType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EventType {
    type Error = u8;

    fn try_from(tag: u8) -> std::result::Result<Self, Self::Error> {
        match tag {
            1 => Ok(EventType::Put),
            2 => Ok(EventType::Delete),
            other => Err(other),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Put => f.write_str("PUT"),
            EventType::Delete => f.write_str("DELETE"),
        }
    }
}

/// A single mutation in the transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Sequence number, assigned when the event is accepted
    pub sequence: u64,

    pub event_type: EventType,

    pub key: String,

    /// Empty for deletes
    pub value: String,
}

impl Event {
    pub fn put(sequence: u64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sequence,
            event_type: EventType::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(sequence: u64, key: impl Into<String>) -> Self {
        Self {
            sequence,
            event_type: EventType::Delete,
            key: key.into(),
            value: String::new(),
        }
    }

    /// Encode as one newline-terminated record:
    /// `sequence \t type \t key \t value \n`
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(24 + self.key.len() + self.value.len());
        line.push_str(&self.sequence.to_string());
        line.push(FIELD_DELIMITER);
        line.push_str(&self.event_type.as_u8().to_string());
        line.push(FIELD_DELIMITER);
        escape_into(&self.key, &mut line);
        line.push(FIELD_DELIMITER);
        if self.event_type == EventType::Put {
            escape_into(&self.value, &mut line);
        }
        line.push(RECORD_TERMINATOR);
        line
    }

    /// Decode one record. `line` must not include the terminator;
    /// `line_no` is 1-based and only used for error reporting.
    pub fn decode(line: &str, line_no: u64) -> Result<Self> {
        let malformed = |reason: String| KvError::MalformedRecord {
            line: line_no,
            reason,
        };

        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        if fields.len() != 4 {
            return Err(malformed(format!("expected 4 fields, found {}", fields.len())));
        }

        let sequence: u64 = fields[0]
            .parse()
            .map_err(|_| malformed(format!("invalid sequence {:?}", fields[0])))?;
        if sequence == 0 {
            return Err(malformed("sequence 0 is never assigned".into()));
        }

        let tag: u8 = fields[1]
            .parse()
            .map_err(|_| malformed(format!("invalid event type {:?}", fields[1])))?;
        let event_type = EventType::try_from(tag)
            .map_err(|tag| malformed(format!("unknown event type {}", tag)))?;

        let key = unescape(fields[2]).map_err(&malformed)?;
        if key.is_empty() {
            return Err(malformed("empty key".into()));
        }
        let value = unescape(fields[3]).map_err(&malformed)?;
        if event_type == EventType::Delete && !value.is_empty() {
            return Err(malformed("delete record carries a value".into()));
        }

        Ok(Self {
            sequence,
            event_type,
            key,
            value,
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event_type {
            EventType::Put => write!(f, "#{} PUT {:?} = {:?}", self.sequence, self.key, self.value),
            EventType::Delete => write!(f, "#{} DELETE {:?}", self.sequence, self.key),
        }
    }
}

fn escape_into(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

fn unescape(field: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(format!("unknown escape \\{}", other)),
            None => return Err("dangling escape at end of field".into()),
        }
    }
    Ok(out)
}
