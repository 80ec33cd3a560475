//! PAX extended header records.
//!
//! A record is `"<len> <key>=<value>\n"`, where `len` counts the whole
//! record including its own digits and the trailing newline.

use std::collections::BTreeMap;
use std::time::SystemTime;

use super::header::RawHeader;
use crate::ExtractionError;
use crate::Result;
use crate::formats::common::override_if_present;
use crate::formats::common::unix_time;

pub(crate) const PATH: &str = "path";
pub(crate) const LINKPATH: &str = "linkpath";
pub(crate) const SIZE: &str = "size";
pub(crate) const MTIME: &str = "mtime";
pub(crate) const ATIME: &str = "atime";
pub(crate) const CTIME: &str = "ctime";
pub(crate) const UID: &str = "uid";
pub(crate) const GID: &str = "gid";
pub(crate) const UNAME: &str = "uname";
pub(crate) const GNAME: &str = "gname";
pub(crate) const XATTR_PREFIX: &str = "SCHILY.xattr.";

pub(crate) const GNU_SPARSE_MAJOR: &str = "GNU.sparse.major";
pub(crate) const GNU_SPARSE_MINOR: &str = "GNU.sparse.minor";
pub(crate) const GNU_SPARSE_NAME: &str = "GNU.sparse.name";
pub(crate) const GNU_SPARSE_MAP: &str = "GNU.sparse.map";
pub(crate) const GNU_SPARSE_SIZE: &str = "GNU.sparse.size";
pub(crate) const GNU_SPARSE_REALSIZE: &str = "GNU.sparse.realsize";
pub(crate) const GNU_SPARSE_OFFSET: &str = "GNU.sparse.offset";
pub(crate) const GNU_SPARSE_NUMBYTES: &str = "GNU.sparse.numbytes";

/// Parsed records of one extended header, later keys replacing earlier.
pub type PaxRecords = BTreeMap<String, String>;

/// Parses the body of an `x` or `g` header.
///
/// Repeated `GNU.sparse.offset`/`GNU.sparse.numbytes` pairs (format 0.0)
/// are folded into one `GNU.sparse.map` record.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidPax`] for a record with a bad length,
/// no `=`, an empty key, or a missing newline.
pub fn parse_records(mut data: &[u8]) -> Result<PaxRecords> {
    let mut records = PaxRecords::new();
    let mut sparse_map: Vec<String> = Vec::new();

    while !data.is_empty() {
        // Writers pad the block with NULs after the last record.
        if data[0] == 0 {
            break;
        }
        let (key, value, rest) = parse_record(data)?;
        data = rest;
        match key.as_str() {
            GNU_SPARSE_OFFSET | GNU_SPARSE_NUMBYTES => {
                let expects_offset = sparse_map.len() % 2 == 0;
                if expects_offset != (key == GNU_SPARSE_OFFSET) {
                    return Err(ExtractionError::InvalidPax(format!(
                        "unpaired {key} record"
                    )));
                }
                sparse_map.push(value);
            }
            _ => {
                records.insert(key, value);
            }
        }
    }

    if !sparse_map.is_empty() {
        records.insert(GNU_SPARSE_MAP.to_string(), sparse_map.join(","));
    }
    Ok(records)
}

fn parse_record(data: &[u8]) -> Result<(String, String, &[u8])> {
    let space = data
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ExtractionError::InvalidPax("missing length".to_string()))?;
    let len: usize = std::str::from_utf8(&data[..space])
        .ok()
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| ExtractionError::InvalidPax("invalid length".to_string()))?;
    if len <= space + 1 || len > data.len() {
        return Err(ExtractionError::InvalidPax(format!(
            "record length {len} does not fit"
        )));
    }

    let (record, rest) = data.split_at(len);
    let Some((&b'\n', body)) = record[space + 1..].split_last() else {
        return Err(ExtractionError::InvalidPax(
            "record does not end with a newline".to_string(),
        ));
    };
    let eq = body
        .iter()
        .position(|&b| b == b'=')
        .ok_or_else(|| ExtractionError::InvalidPax("record has no '='".to_string()))?;
    if eq == 0 {
        return Err(ExtractionError::InvalidPax("empty key".to_string()));
    }
    let key = String::from_utf8_lossy(&body[..eq]).into_owned();
    let value = String::from_utf8_lossy(&body[eq + 1..]).into_owned();
    Ok((key, value, rest))
}

/// Merges a `g` header into the persistent global records. An empty value
/// removes the key.
pub(crate) fn merge_global(global: &mut PaxRecords, records: PaxRecords) {
    for (key, value) in records {
        if value.is_empty() {
            global.remove(&key);
        } else {
            global.insert(key, value);
        }
    }
}

/// Combines global and per-entry records, per-entry winning. An empty
/// per-entry value suppresses the global one.
pub(crate) fn effective(global: &PaxRecords, local: PaxRecords) -> PaxRecords {
    let mut merged = global.clone();
    merge_global(&mut merged, local);
    merged
}

/// Overrides the fixed header fields named by recognized records.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidPax`] when a numeric or time record
/// does not parse.
pub(crate) fn apply(records: &PaxRecords, raw: &mut RawHeader) -> Result<()> {
    override_if_present(&mut raw.name, records.get(PATH).cloned());
    override_if_present(&mut raw.linkname, records.get(LINKPATH).cloned());
    override_if_present(&mut raw.uname, records.get(UNAME).cloned());
    override_if_present(&mut raw.gname, records.get(GNAME).cloned());
    override_if_present(&mut raw.size, number(records, SIZE)?);
    override_if_present(&mut raw.uid, number(records, UID)?);
    override_if_present(&mut raw.gid, number(records, GID)?);
    override_if_present(&mut raw.modified, time(records, MTIME)?);
    override_if_present(&mut raw.accessed, time(records, ATIME)?.map(Some));
    override_if_present(&mut raw.changed, time(records, CTIME)?.map(Some));
    Ok(())
}

/// Extended attributes keyed without their `SCHILY.xattr.` prefix.
pub(crate) fn xattrs(records: &PaxRecords) -> BTreeMap<String, String> {
    records
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(XATTR_PREFIX)
                .map(|name| (name.to_string(), value.clone()))
        })
        .collect()
}

/// Parses an unsigned decimal record, if present.
pub(crate) fn number(records: &PaxRecords, key: &str) -> Result<Option<u64>> {
    records
        .get(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ExtractionError::InvalidPax(format!("{key}={value:?} is not a number")))
        })
        .transpose()
}

fn time(records: &PaxRecords, key: &str) -> Result<Option<SystemTime>> {
    records
        .get(key)
        .map(|value| {
            parse_time(value)
                .ok_or_else(|| ExtractionError::InvalidPax(format!("{key}={value:?} is not a time")))
        })
        .transpose()
}

/// Parses `[-]seconds[.fraction]`, keeping nanosecond precision.
pub(crate) fn parse_time(value: &str) -> Option<SystemTime> {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    let negative = whole.starts_with('-');
    let digits = whole.strip_prefix('-').unwrap_or(whole);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = digits.parse().ok()?;

    let mut nanos: u32 = 0;
    for (i, digit) in fraction.bytes().take(9).enumerate() {
        nanos += u32::from(digit - b'0') * 10u32.pow(8 - i as u32);
    }

    Some(if negative && nanos > 0 {
        unix_time(-secs - 1, 1_000_000_000 - nanos)
    } else if negative {
        unix_time(-secs, 0)
    } else {
        unix_time(secs, nanos)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;
    use std::time::UNIX_EPOCH;

    /// Encodes one record with a correct length prefix.
    pub(crate) fn record(key: &str, value: &str) -> String {
        let body = format!(" {key}={value}\n");
        let mut len = body.len() + 1;
        while len.to_string().len() + body.len() != len {
            len += 1;
        }
        format!("{len}{body}")
    }

    #[test]
    fn test_record_helper_lengths() {
        assert_eq!(record("a", "b"), "6 a=b\n");
        assert_eq!(record("path", "x".repeat(90).as_str()).len(), 99);
    }

    #[test]
    fn test_parse_records() {
        let data = format!("{}{}", record("path", "long/name.txt"), record("size", "42"));
        let records = parse_records(data.as_bytes()).unwrap();
        assert_eq!(records.get("path").unwrap(), "long/name.txt");
        assert_eq!(records.get("size").unwrap(), "42");
    }

    #[test]
    fn test_value_may_contain_equals_and_newline() {
        let data = record("comment", "a=b\nc");
        let records = parse_records(data.as_bytes()).unwrap();
        assert_eq!(records.get("comment").unwrap(), "a=b\nc");
    }

    #[test]
    fn test_malformed_records() {
        assert!(parse_records(b"5 a=b\n").is_err());
        assert!(parse_records(b"6 ab \n").is_err());
        assert!(parse_records(b"6 =bc\n").is_err());
        assert!(parse_records(b"x a=b\n").is_err());
        assert!(parse_records(b"6 a=bc").is_err());
    }

    #[test]
    fn test_trailing_nul_padding() {
        let mut data = record("a", "b").into_bytes();
        data.extend_from_slice(&[0u8; 20]);
        assert_eq!(parse_records(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_sparse_offset_numbytes_fold_into_map() {
        let data = [
            record(GNU_SPARSE_OFFSET, "0"),
            record(GNU_SPARSE_NUMBYTES, "5"),
            record(GNU_SPARSE_OFFSET, "100"),
            record(GNU_SPARSE_NUMBYTES, "5"),
        ]
        .concat();
        let records = parse_records(data.as_bytes()).unwrap();
        assert_eq!(records.get(GNU_SPARSE_MAP).unwrap(), "0,5,100,5");

        let unpaired = record(GNU_SPARSE_NUMBYTES, "5");
        assert!(parse_records(unpaired.as_bytes()).is_err());
    }

    #[test]
    fn test_global_merge_and_delete() {
        let mut global = PaxRecords::new();
        merge_global(&mut global, PaxRecords::from([("uname".into(), "root".into())]));
        assert_eq!(global.get("uname").unwrap(), "root");

        let merged = effective(&global, PaxRecords::from([("uname".into(), String::new())]));
        assert!(merged.get("uname").is_none());
        assert_eq!(global.get("uname").unwrap(), "root");
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(
            parse_time("1350244992.023960108"),
            Some(UNIX_EPOCH + Duration::new(1_350_244_992, 23_960_108))
        );
        assert_eq!(parse_time("5"), Some(UNIX_EPOCH + Duration::from_secs(5)));
        assert_eq!(
            parse_time("-1.5"),
            Some(UNIX_EPOCH - Duration::from_millis(1500))
        );
        assert_eq!(parse_time("1.x"), None);
        assert_eq!(parse_time(""), None);
    }
}
