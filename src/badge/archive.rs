//! Batch badge export: one PNG per entity, packed into a ZIP for the print shop.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A single file inside the archive.
pub struct ArchiveEntry {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// `attendee_jane-doe_1a2b3c4d.png`. The id prefix keeps names unique when
/// two people share a name.
pub fn entry_name(kind: &str, label: &str, id: &uuid::Uuid) -> String {
    let slug = slugify(label);
    let id_hex = id.simple().to_string();
    let id_short = &id_hex[..8];
    if slug.is_empty() {
        format!("{}_{}.png", kind, id_short)
    } else {
        format!("{}_{}_{}.png", kind, slug, id_short)
    }
}

fn slugify(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_dash = true;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(48);
    out
}

pub fn build_zip(entries: &[ArchiveEntry]) -> anyhow::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    // PNG data is already deflated.
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for entry in entries {
        zip.start_file(entry.file_name.as_str(), options.clone())?;
        zip.write_all(&entry.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}
