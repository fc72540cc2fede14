//! Key and partition name encoding for persistent media.
//!
//! Keys are arbitrary strings, so before they become file names or
//! composite database keys every segment is percent-encoded. Only ASCII
//! alphanumerics, `-` and `_` pass through, which rules out separators,
//! `.`/`..` traversal and reserved characters on every platform.
//!
//! Encoding can grow a segment up to nine times (`é` becomes `%C3%A9`), and
//! common filesystems cap a single name at 255 bytes. Names over that limit
//! are refused with [`KeyRejected`] instead of failing inside the OS call.

use super::{KeyRejected, Partition};
use anyhow::{Context, Result, bail};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::path::{Path, PathBuf};

const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Extension of record files in the filesystem medium.
pub(crate) const RECORD_EXTENSION: &str = "json";

/// Longest file or directory name, in bytes, the filesystem medium writes.
pub const MAX_FILE_NAME_LEN: usize = 255;

pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

pub(crate) fn decode_segment(encoded: &str) -> Result<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .with_context(|| format!("Invalid encoded segment: {encoded}"))
}

/// Rejects partitions with an empty database or container.
pub(crate) fn validate_partition(partition: &Partition) -> Result<()> {
    if partition.database().is_empty() {
        bail!("Partition database cannot be empty");
    }
    if partition.container().is_empty() {
        bail!("Partition container cannot be empty");
    }
    Ok(())
}

fn within_name_limit(name: String, what: &str) -> Result<String> {
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(KeyRejected::new(format!(
            "{what} encodes to {} bytes, over the {MAX_FILE_NAME_LEN} byte file name limit",
            name.len()
        ))
        .into());
    }
    Ok(name)
}

/// Directory holding a partition's record files.
pub(crate) fn partition_dir(base_dir: &Path, partition: &Partition) -> Result<PathBuf> {
    validate_partition(partition)?;
    let database = within_name_limit(encode_segment(partition.database()), "Partition database")?;
    let container =
        within_name_limit(encode_segment(partition.container()), "Partition container")?;
    Ok(base_dir.join(database).join(container))
}

/// File name for a key, e.g. `user%3A1.json`.
pub(crate) fn record_file_name(key: &str) -> Result<String> {
    within_name_limit(format!("{}.{RECORD_EXTENSION}", encode_segment(key)), "Key")
}

/// Recovers the key from a record file name; `None` for foreign files.
pub(crate) fn key_from_file_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(RECORD_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() {
        return None;
    }
    decode_segment(stem).ok()
}

/// Prefix shared by every composite key of a partition.
pub(crate) fn composite_prefix(partition: &Partition) -> Result<String> {
    validate_partition(partition)?;
    Ok(format!(
        "{}/{}/",
        encode_segment(partition.database()),
        encode_segment(partition.container())
    ))
}

/// `database/container/key` with every segment encoded.
pub(crate) fn composite_key(partition: &Partition, key: &str) -> Result<String> {
    Ok(format!("{}{}", composite_prefix(partition)?, encode_segment(key)))
}
