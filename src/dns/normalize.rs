//! Domain name normalization used as the cache key and the lookup input.

use crate::{Error, Result};

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalize a domain name to its lowercase ASCII-compatible form.
///
/// Surrounding whitespace and a single trailing dot are dropped, and
/// internationalized labels are converted with IDNA (UTS #46). Names that
/// are already plain lowercase ASCII come back unchanged.
///
/// # Errors
/// Returns [`Error::InvalidName`] if the name is empty, fails IDNA
/// processing, or breaks DNS length limits.
pub fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(Error::invalid_name(name, "empty name"));
    }

    let ascii = if trimmed.is_ascii() {
        trimmed.to_ascii_lowercase()
    } else {
        idna::domain_to_ascii(trimmed)
            .map_err(|e| Error::invalid_name(name, format!("IDNA conversion failed: {e}")))?
    };

    if ascii.len() > MAX_NAME_LEN {
        return Err(Error::invalid_name(
            name,
            format!("longer than {MAX_NAME_LEN} bytes"),
        ));
    }
    for label in ascii.split('.') {
        if label.is_empty() {
            return Err(Error::invalid_name(name, "empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::invalid_name(
                name,
                format!("label '{label}' longer than {MAX_LABEL_LEN} bytes"),
            ));
        }
        if label.contains(|c: char| c.is_ascii_whitespace() || c.is_ascii_control()) {
            return Err(Error::invalid_name(name, "whitespace or control character"));
        }
    }

    Ok(ascii)
}
