//! Shared helpers for building synthetic executable images on disk.

#![allow(dead_code)]

use std::fs;

use sectweave::io::write_le_at;
use sectweave::pe::{SectionFlags, SectionHeader, SECTION_HEADER_LEN};

/// Header-table offset used by every synthetic image.
pub const HEADER_OFFSET: usize = 0x80;

/// Description of a synthetic image to lay out on disk.
pub struct ImageSpec {
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub sections: Vec<SectionHeader>,
    /// Total file size; must cover the header table and all raw data.
    pub size: usize,
}

/// Builds the byte image for a spec: DOS magic, header-table pointer,
/// PE signature, the header fields the composer reads, and the section
/// header array.
pub fn build_image(spec: &ImageSpec) -> Vec<u8> {
    let mut data = vec![0u8; spec.size];

    let mut offset = 0;
    write_le_at(&mut data, &mut offset, 0x5A4Du16).unwrap();
    let mut offset = 0x3c;
    write_le_at(&mut data, &mut offset, HEADER_OFFSET as u32).unwrap();

    let mut offset = HEADER_OFFSET;
    write_le_at(&mut data, &mut offset, 0x0000_4550u32).unwrap();
    let mut offset = HEADER_OFFSET + 0x06;
    write_le_at(&mut data, &mut offset, spec.sections.len() as u16).unwrap();
    let mut offset = HEADER_OFFSET + 0x34;
    write_le_at(&mut data, &mut offset, spec.image_base).unwrap();
    write_le_at(&mut data, &mut offset, spec.section_alignment).unwrap();
    write_le_at(&mut data, &mut offset, spec.file_alignment).unwrap();

    if let Some(last) = spec.sections.last() {
        let mut offset = HEADER_OFFSET + 0x50;
        write_le_at(
            &mut data,
            &mut offset,
            last.virtual_address + last.virtual_size,
        )
        .unwrap();
    }

    let mut offset = HEADER_OFFSET + 0xf8;
    for section in &spec.sections {
        data[offset..offset + SECTION_HEADER_LEN].copy_from_slice(&section.to_bytes());
        offset += SECTION_HEADER_LEN;
    }

    data
}

/// Builds one section header with the composer-relevant fields set.
pub fn section(
    name: &str,
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
    flags: SectionFlags,
) -> SectionHeader {
    let mut header = SectionHeader::new(name, flags);
    header.virtual_address = virtual_address;
    header.virtual_size = virtual_size;
    header.raw_offset = raw_offset;
    header.raw_size = raw_size;
    header
}

/// Writes image bytes into a fresh temp file and returns its guard.
pub fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    fs::write(file.path(), data).unwrap();
    file
}
