//! Detach key sequences
//!
//! The daemon watches stdin for the detach sequence and closes the attach
//! stream when it sees it. The client only validates the sequence before
//! sending it along.

use crate::{DocksideError, Result};

/// Parse a comma separated key sequence such as `ctrl-p,ctrl-q` or `a,ctrl-@`
/// into the bytes the terminal sends for it.
pub fn parse_detach_keys(keys: &str) -> Result<Vec<u8>> {
    let mut codes = Vec::new();

    for key in keys.split(',') {
        let invalid = || DocksideError::InvalidDetachKeys(format!("Unknown character: '{}'", key));

        if key.len() > 1 {
            let ctrl = key.strip_prefix("ctrl-").ok_or_else(invalid)?;
            let mut chars = ctrl.chars();
            let c = match (chars.next(), chars.next()) {
                (Some(c), None) => c.to_ascii_lowercase(),
                _ => return Err(invalid()),
            };
            let code = match c {
                'a'..='z' => c as u8 - b'a' + 1,
                '@' => 0,
                '[' => 27,
                '\\' => 28,
                ']' => 29,
                '^' => 30,
                '_' => 31,
                _ => return Err(invalid()),
            };
            codes.push(code);
        } else {
            let c = key.chars().next().ok_or_else(invalid)?;
            codes.push(c as u8);
        }
    }

    Ok(codes)
}
