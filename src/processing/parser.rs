use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Anchor report after parsing the textual `ESP:<id> | MAC:<mac> | RSSI:<dBm>` form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorReport {
    pub anchor_id: String,
    pub device_mac: String,
    pub rssi: i32,
}

/// Errors that can occur during report parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("report contains no '{marker}' marker")]
    MissingMarker { marker: &'static str },

    #[error("expected {expected} at offset {offset}")]
    Expected {
        expected: &'static str,
        offset: usize,
    },

    #[error("RSSI value '{value}' does not fit in 32 bits")]
    RssiOutOfRange { value: String },
}

impl FromStr for AnchorReport {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_report(s)
    }
}

const ANCHOR_MARKER: &str = "ESP:";

/// Parse an anchor report out of a message
///
/// The report may be embedded in surrounding text. Every `ESP:` marker is tried
/// in order and the first complete match wins; if none matches, the error from
/// the first attempt is returned.
pub fn parse_report(text: &str) -> Result<AnchorReport, ParseError> {
    let mut first_error = None;

    for (start, _) in text.match_indices(ANCHOR_MARKER) {
        let mut cursor = Cursor::new(text, start + ANCHOR_MARKER.len());
        match cursor.report() {
            Ok(report) => return Ok(report),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    Err(first_error.unwrap_or(ParseError::MissingMarker {
        marker: ANCHOR_MARKER,
    }))
}

/// Byte cursor over the report text, positioned just after `ESP:`
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn report(&mut self) -> Result<AnchorReport, ParseError> {
        self.skip_whitespace();
        let anchor_id = self.take_non_empty("anchor id", is_word_byte)?;

        self.separator()?;
        self.literal("MAC:")?;
        self.skip_whitespace();
        let device_mac = self.take_non_empty("MAC address", is_mac_byte)?;

        self.separator()?;
        self.literal("RSSI:")?;
        self.skip_whitespace();
        let rssi = self.rssi()?;

        Ok(AnchorReport {
            anchor_id: anchor_id.to_string(),
            device_mac: device_mac.to_string(),
            rssi,
        })
    }

    /// Optional whitespace, `|`, optional whitespace
    fn separator(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        self.literal("|")?;
        self.skip_whitespace();
        Ok(())
    }

    fn rssi(&mut self) -> Result<i32, ParseError> {
        let start = self.pos;
        if self.rest().starts_with('-') {
            self.pos += 1;
        }
        if self.take_while(|b| b.is_ascii_digit()).is_empty() {
            return Err(ParseError::Expected {
                expected: "RSSI digits",
                offset: self.pos,
            });
        }

        let value = &self.text[start..self.pos];
        value.parse().map_err(|_| ParseError::RssiOutOfRange {
            value: value.to_string(),
        })
    }

    fn literal(&mut self, literal: &'static str) -> Result<(), ParseError> {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            Ok(())
        } else {
            Err(ParseError::Expected {
                expected: literal,
                offset: self.pos,
            })
        }
    }

    fn take_non_empty(
        &mut self,
        expected: &'static str,
        pred: fn(u8) -> bool,
    ) -> Result<&'a str, ParseError> {
        let offset = self.pos;
        let token = self.take_while(pred);
        if token.is_empty() {
            Err(ParseError::Expected { expected, offset })
        } else {
            Ok(token)
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        let len = self.rest().bytes().take_while(|&b| pred(b)).count();
        self.pos += len;
        &self.text[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        let len: usize = self
            .rest()
            .chars()
            .take_while(|&c| is_space(c))
            .map(char::len_utf8)
            .sum();
        self.pos += len;
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }
}

/// Unicode white space, plus the byte-order mark
fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_mac_byte(b: u8) -> bool {
    b.is_ascii_hexdigit() || b == b':'
}
