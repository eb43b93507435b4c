//! Appearance files: one sorted, newline-terminated line per record.

use std::{collections::BTreeSet, path::Path};

use crate::{
    errors::{IndexError, Result},
    types::AppearanceRecord,
};

/// Writes `records` to `path` through a temporary file and a rename, so readers never
/// see a partial file. Returns `false` without touching the disk when there is nothing
/// to write.
pub async fn write_appearance_file(
    path: &Path,
    records: &BTreeSet<AppearanceRecord>,
) -> Result<bool> {
    if records.is_empty() {
        return Ok(false);
    }

    let mut contents = String::with_capacity(records.len() * 58);
    for record in records {
        contents.push_str(&record.to_string());
        contents.push('\n');
    }

    let tmp = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| IndexError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| IndexError::io(path, e))?;
    Ok(true)
}

/// Reads an appearance file back, ascending
pub async fn read_appearance_file(path: &Path) -> Result<Vec<AppearanceRecord>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| IndexError::io(path, e))?;

    let mut records = contents
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<AppearanceRecord>()
                .map_err(|e| IndexError::corrupt_file(path, e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    records.sort();
    Ok(records)
}
