//! Octal escapes used by the Linux mount table
//!
//! The kernel writes space, tab, newline and backslash in mount-table columns
//! as `\NNN`. Decoding accepts one to three octal digits per escape.

use crate::error::{Error, Result};

/// Decode `\NNN` escapes
///
/// Each escape maps to the character with that code point (`\351` is `é`).
/// `\000` and anything above `\377` reject the whole input. A backslash that
/// is not followed by an octal digit, including a trailing one, is kept as is.
pub fn decode(text: &str) -> Result<String> {
    if !text.contains('\\') {
        return Ok(text.to_string());
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }

        let digits: String = chars[i + 1..]
            .iter()
            .take(3)
            .take_while(|d| d.is_digit(8))
            .collect();

        if digits.is_empty() {
            out.push('\\');
            i += 1;
            continue;
        }

        let value = u32::from_str_radix(&digits, 8)
            .map_err(|_| Error::InvalidEscape(format!("\\{}", digits)))?;
        if value == 0 || value > 0o377 {
            return Err(Error::InvalidEscape(format!("\\{}", digits)));
        }

        // value is 1..=255, always a valid scalar value
        out.push(char::from(value as u8));
        i += 1 + digits.len();
    }

    Ok(out)
}

/// Escape the characters that would break a whitespace-delimited column
///
/// Output always uses three digits, so `decode(&encode(s)) == s` holds for
/// any string.
pub fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c' | '\\' | '#' => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out
}
