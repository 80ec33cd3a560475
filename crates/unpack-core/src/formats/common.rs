//! Helpers shared by the ZIP and TAR parsers.
//!
//! Both containers carry fixed-width header fields that a later record may
//! supersede: a Zip64 extra field replaces a 32-bit size that holds its
//! sentinel, and a PAX record replaces the USTAR column it names. Both are
//! the same operation, expressed once here.

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Replaces `field` with `replacement` when one is present.
///
/// Returns `true` if the field changed.
pub(crate) fn override_if_present<T>(field: &mut T, replacement: Option<T>) -> bool {
    match replacement {
        Some(value) => {
            *field = value;
            true
        }
        None => false,
    }
}

/// Replaces `field` with the value produced by `next` only while the field
/// still holds `sentinel`.
///
/// `next` is not called for fields that are already resolved, which is what
/// lets the Zip64 extra record list only the fields that overflowed.
pub(crate) fn resolve_if_sentinel<T, F>(field: &mut T, sentinel: T, next: F) -> bool
where
    T: PartialEq,
    F: FnOnce() -> Option<T>,
{
    if *field != sentinel {
        return false;
    }
    override_if_present(field, next())
}

/// Decodes an entry name.
///
/// Names flagged as UTF-8 are decoded as such (invalid sequences are
/// replaced). Unflagged names that happen to be pure ASCII or valid UTF-8
/// are kept; anything else is read as IBM code page 437, the default OEM
/// code page of the ZIP format.
pub fn decode_name(bytes: &[u8], is_utf8: bool) -> String {
    if is_utf8 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => decode_cp437(bytes),
    }
}

/// Decodes bytes as IBM code page 437.
pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                char::from(b)
            } else {
                CP437_HIGH[usize::from(b - 0x80)]
            }
        })
        .collect()
}

/// Converts seconds since the Unix epoch (possibly negative) to `SystemTime`.
pub(crate) fn unix_time(secs: i64, nanos: u32) -> SystemTime {
    let nanos = Duration::from_nanos(u64::from(nanos));
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs()) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

/// Upper half of code page 437.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}', //
];
