//! Mirror of the mapping store into a spreadsheet tab.
//!
//! Rows are keyed by the `Parchment ID` column. Rows the store does not
//! know about are kept, columns added by hand are left alone, and the whole
//! tab is written back sorted by identifier.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::remote::{RemoteError, SheetStore};
use crate::state::{MappingEntry, MappingStore};

pub const ID_HEADER: &str = "Parchment ID";
pub const SYNC_DATE_HEADER: &str = "Sync Date";

pub const HEADERS: [&str; 9] = [
    ID_HEADER,
    "Original Filename",
    "Captured Date",
    SYNC_DATE_HEADER,
    "Creator",
    "Camera",
    "Location",
    "Image Preview",
    "QR Preview",
];

const UNKNOWN: &str = "Unknown";

/// Outcome of merging the store into existing sheet rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetMerge {
    /// Header row followed by data rows sorted by identifier.
    pub rows: Vec<Vec<String>>,
    pub created: usize,
    pub updated: usize,
}

pub fn image_formula(remote_ref: Option<&str>) -> String {
    match remote_ref {
        Some(id) => format!("=IMAGE(\"https://drive.google.com/uc?id={}\")", id),
        None => String::new(),
    }
}

/// Mirrored cells of one entry, by header. `Sync Date` is filled in by the
/// merge.
fn entry_cells(identifier: &str, entry: &MappingEntry) -> [(&'static str, String); 8] {
    let text = |value: &Option<String>| value.clone().unwrap_or_else(|| UNKNOWN.to_string());
    [
        (ID_HEADER, identifier.to_string()),
        ("Original Filename", entry.filename.clone()),
        ("Captured Date", text(&entry.captured_at)),
        ("Creator", text(&entry.creator)),
        ("Camera", text(&entry.camera)),
        ("Location", text(&entry.location)),
        ("Image Preview", image_formula(entry.remote_thumb_ref.as_deref())),
        ("QR Preview", image_formula(entry.remote_qr_ref.as_deref())),
    ]
}

fn cell(row: &[String], column: usize) -> &str {
    row.get(column).map(String::as_str).unwrap_or("")
}

fn set_cell(row: &mut Vec<String>, column: usize, value: String) {
    if row.len() <= column {
        row.resize(column + 1, String::new());
    }
    row[column] = value;
}

/// Merge the store into existing rows. `sync_date` is written into rows
/// that are created or whose mirrored cells change.
pub fn merge_rows(existing: &[Vec<String>], store: &MappingStore, sync_date: &str) -> SheetMerge {
    let mut header: Vec<String> = existing.first().cloned().unwrap_or_default();
    for name in HEADERS {
        if !header.iter().any(|h| h == name) {
            header.push(name.to_string());
        }
    }
    let columns: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let id_column = columns.get(ID_HEADER).copied().unwrap_or(0);
    let sync_column = columns.get(SYNC_DATE_HEADER).copied();

    let mut data: Vec<Vec<String>> = existing.iter().skip(1).cloned().collect();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    for (index, row) in data.iter().enumerate() {
        let id = cell(row, id_column);
        if !id.is_empty() {
            by_id.entry(id.to_string()).or_insert(index);
        }
    }

    let mut created = 0;
    let mut updated = 0;
    for (identifier, entry) in store.iter() {
        let cells = entry_cells(identifier, entry);
        match by_id.get(identifier.as_str()) {
            Some(&index) => {
                let row = &mut data[index];
                let mut changed = false;
                for (name, value) in cells {
                    if let Some(&column) = columns.get(name) {
                        if cell(row, column) != value {
                            set_cell(row, column, value);
                            changed = true;
                        }
                    }
                }
                if changed {
                    if let Some(column) = sync_column {
                        set_cell(row, column, sync_date.to_string());
                    }
                    updated += 1;
                }
            }
            None => {
                let mut row = vec![String::new(); header.len()];
                for (name, value) in cells {
                    if let Some(&column) = columns.get(name) {
                        row[column] = value;
                    }
                }
                if let Some(column) = sync_column {
                    row[column] = sync_date.to_string();
                }
                by_id.insert(identifier.clone(), data.len());
                data.push(row);
                created += 1;
            }
        }
    }

    data.sort_by(|a, b| cell(a, id_column).cmp(cell(b, id_column)));
    let mut rows = Vec::with_capacity(data.len() + 1);
    rows.push(header);
    rows.extend(data);
    SheetMerge {
        rows,
        created,
        updated,
    }
}

/// Whether two sheets hold the same cells, ignoring trailing blanks.
fn same_cells(a: &[Vec<String>], b: &[Vec<String>]) -> bool {
    fn trimmed(row: &[String]) -> &[String] {
        let end = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
        &row[..end]
    }
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| trimmed(x) == trimmed(y))
}

/// Read the sheet, merge the store into it, and write it back when
/// anything differs. Returns the merge outcome.
pub async fn mirror(sheet: &dyn SheetStore, store: &MappingStore) -> Result<SheetMerge, RemoteError> {
    let existing = sheet.read_rows().await?;
    let sync_date = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
    let merge = merge_rows(&existing, store, &sync_date);

    if same_cells(&existing, &merge.rows) {
        info!("Sheet already up to date ({} entries)", store.len());
        return Ok(merge);
    }
    debug!(rows = merge.rows.len(), "Writing sheet");
    sheet.write_rows(&merge.rows).await?;
    info!(
        "Sheet synced: {} rows added, {} rows updated ({} entries)",
        merge.created,
        merge.updated,
        store.len()
    );
    Ok(merge)
}
