//! Comma-separated field tokenizer for AT response lines.
//!
//! Response lines look like `+CREG: 1,"C3F0","08A9"` or
//! `+CLCC: 1,0,2,0,0,"+18005551212",145`. The tokenizer first skips the
//! `+XXX:` prefix, then yields one comma-separated field at a time.
//! String fields may be double-quoted; quotes are stripped. Integer
//! fields tolerate trailing junk the way `strtol` does, since real
//! firmware pads fields in creative ways.

use crate::error::ParseError;

/// Cursor over one response line
pub struct Tokenizer<'a> {
    rest: &'a str,
}

impl<'a> Tokenizer<'a> {
    /// Start after the `:` that ends the line's prefix.
    ///
    /// Fails when the line has no `:` at all.
    pub fn new(line: &'a str) -> Result<Tokenizer<'a>, ParseError> {
        match line.find(':') {
            Some(idx) => Ok(Tokenizer {
                rest: &line[idx + 1..],
            }),
            None => Err(ParseError::MissingPrefix(line.to_owned())),
        }
    }

    /// Tokenize a line with no prefix (bare comma-separated fields)
    pub fn bare(line: &'a str) -> Tokenizer<'a> {
        Tokenizer { rest: line }
    }

    /// Whether another field remains
    pub fn has_more(&self) -> bool {
        !self.rest.trim_start().is_empty()
    }

    /// Next raw field, trimmed, with surrounding double quotes stripped
    pub fn next_str(&mut self) -> Result<&'a str, ParseError> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            return Err(ParseError::MissingField);
        }

        // A quoted field may contain commas, so find its closing quote
        // before splitting.
        let (token, remainder) = if let Some(body) = trimmed.strip_prefix('"') {
            match body.find('"') {
                Some(end) => {
                    let after = &body[end + 1..];
                    let after = after.strip_prefix(',').unwrap_or(after);
                    (&body[..end], after)
                }
                // Unterminated quote: take the rest of the line.
                None => (body, ""),
            }
        } else {
            match trimmed.find(',') {
                Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
                None => (trimmed, ""),
            }
        };

        self.rest = remainder;
        Ok(token.trim())
    }

    /// Next field parsed as an integer.
    ///
    /// Parses the leading `[+-]?[0-9]+` run and ignores trailing junk.
    pub fn next_int(&mut self) -> Result<i64, ParseError> {
        let token = self.next_str()?;
        parse_leading_int(token).ok_or_else(|| ParseError::InvalidInt(token.to_owned()))
    }

    /// Next field parsed as a boolean: nonzero is true
    pub fn next_bool(&mut self) -> Result<bool, ParseError> {
        let token = self.next_str()?;
        match parse_leading_int(token) {
            Some(n) => Ok(n != 0),
            None => Err(ParseError::InvalidBool(token.to_owned())),
        }
    }
}

fn parse_leading_int(token: &str) -> Option<i64> {
    let bytes = token.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let digits = &token[..end];
    if digits.is_empty() || digits == "+" || digits == "-" {
        return None;
    }
    digits.parse::<i64>().ok()
}
