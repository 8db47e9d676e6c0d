//! Relocatable-object (COFF) symbol and section table parsing.
//!
//! Hook translation units are compiled to relocatable objects whose
//! hook-carrying sections follow a naming convention: their names begin with
//! the marker byte [`SECTION_MARKER`]. [`CoffObject::open`] recovers, for
//! every such section, its compiled size (from the auxiliary record that
//! follows the section's class symbol), the placement address the hook
//! declared (from the value field of the section's plain symbol), and the
//! file offset of its raw data (from the object's section header table).
//!
//! Sections that never appear in the symbol table are not discovered; the
//! placement planner simply never sees them.

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::{io::read_le_at, Result};

/// First byte of a hook-carrying section name.
pub const SECTION_MARKER: u8 = b'h';

/// File offset of the symbol table pointer in the object header.
const SYMBOL_TABLE_PTR_OFFSET: usize = 8;
/// File offset of the section count in the object header.
const SECTION_COUNT_OFFSET: usize = 2;
/// Start of the section header table (object header is 20 bytes, compiled
/// objects carry no optional header).
const SECTION_TABLE_OFFSET: usize = 20;
/// Size of one symbol record; auxiliary records share the size.
const SYMBOL_RECORD_LEN: usize = 18;
/// Size of one section header.
const SECTION_HEADER_LEN: usize = 40;
/// Offset of the raw-data pointer within a section header.
const RAW_PTR_OFFSET: usize = 20;

/// One hook-carrying section recovered from a relocatable object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoffSection {
    /// Section name, NUL padding removed.
    pub name: String,
    /// Compiled size of the section's contents.
    pub size: u32,
    /// Placement address the hook declared for this section.
    pub addr: u32,
    /// File offset of the section's raw data within the object.
    pub raw_offset: u32,
}

/// A parsed relocatable object; read-only after construction.
#[derive(Debug)]
pub struct CoffObject {
    /// Path of the object file, used in placement directives and logs.
    pub name: String,
    /// Hook-carrying sections in the order the symbol table revealed them.
    pub sections: Vec<CoffSection>,
}

impl CoffObject {
    /// Memory-maps and parses a relocatable object file.
    pub fn open(path: &Path) -> Result<CoffObject> {
        let file = fs::File::open(path)?;
        let data = unsafe { Mmap::map(&file) }?;
        Self::parse(path.display().to_string(), &data)
    }

    /// Parses an object image from a byte buffer.
    ///
    /// Pass 1 walks the symbol table collecting sizes and placement
    /// addresses; pass 2 walks the section header table filling in raw-data
    /// offsets for the sections pass 1 discovered.
    pub fn parse(name: String, data: &[u8]) -> Result<CoffObject> {
        let mut object = CoffObject {
            name,
            sections: Vec::new(),
        };

        let mut offset = SYMBOL_TABLE_PTR_OFFSET;
        let table: u32 = read_le_at(data, &mut offset)?;
        let count: u32 = read_le_at(data, &mut offset)?;

        let mut pos = table as usize;
        let mut index = 0u32;
        while index < count {
            if pos + SYMBOL_RECORD_LEN > data.len() {
                return Err(malformed_error!("symbol table truncated in {}", object.name));
            }
            let record = &data[pos..pos + SYMBOL_RECORD_LEN];
            pos += SYMBOL_RECORD_LEN;

            let aux = u32::from(record[17]);
            if record[0] != SECTION_MARKER {
                pos += SYMBOL_RECORD_LEN * aux as usize;
                index += 1 + aux;
                continue;
            }

            let section_name = fixed_name(&record[..8]);

            if aux > 0 {
                if pos + SYMBOL_RECORD_LEN > data.len() {
                    return Err(malformed_error!(
                        "auxiliary record truncated in {}",
                        object.name
                    ));
                }
                let mut aux_offset = pos;
                let size: u32 = read_le_at(data, &mut aux_offset)?;
                object.section_mut_or_insert(&section_name).size = size;
                pos += SYMBOL_RECORD_LEN;
                index += 2;
                continue;
            }

            let mut value_offset = 8;
            let addr: u32 = read_le_at(record, &mut value_offset)?;
            object.section_mut_or_insert(&section_name).addr = addr;
            index += 1;
        }

        let mut offset = SECTION_COUNT_OFFSET;
        let section_count: u16 = read_le_at(data, &mut offset)?;
        for i in 0..section_count as usize {
            let start = SECTION_TABLE_OFFSET + i * SECTION_HEADER_LEN;
            if start + SECTION_HEADER_LEN > data.len() {
                return Err(malformed_error!(
                    "section header table truncated in {}",
                    object.name
                ));
            }
            let header = &data[start..start + SECTION_HEADER_LEN];
            if header[0] != SECTION_MARKER {
                continue;
            }
            let section_name = fixed_name(&header[..8]);
            if let Some(section) = object
                .sections
                .iter_mut()
                .find(|s| s.name == section_name)
            {
                let mut ptr_offset = RAW_PTR_OFFSET;
                section.raw_offset = read_le_at(header, &mut ptr_offset)?;
            }
        }

        Ok(object)
    }

    /// Finds a section by name.
    pub fn section(&self, name: &str) -> Option<&CoffSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_mut_or_insert(&mut self, name: &str) -> &mut CoffSection {
        let index = match self.sections.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(CoffSection {
                    name: name.to_string(),
                    size: 0,
                    addr: 0,
                    raw_offset: 0,
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }
}

/// Decodes an 8-byte fixed-width name field, trimming NUL padding.
fn fixed_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::write_le_at;

    fn put_name(buf: &mut [u8], name: &str) {
        let bytes = name.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
    }

    /// Builds a minimal object: one hook section plus one unrelated symbol
    /// carrying an auxiliary record that must be skipped.
    fn sample_object() -> Vec<u8> {
        let section_count = 1u16;
        let symbol_table = SECTION_TABLE_OFFSET + SECTION_HEADER_LEN;
        let symbol_count = 5u32;

        let mut data = vec![0u8; symbol_table + SYMBOL_RECORD_LEN * symbol_count as usize];

        let mut offset = SECTION_COUNT_OFFSET;
        write_le_at(&mut data, &mut offset, section_count).unwrap();
        let mut offset = SYMBOL_TABLE_PTR_OFFSET;
        write_le_at(&mut data, &mut offset, symbol_table as u32).unwrap();
        write_le_at(&mut data, &mut offset, symbol_count).unwrap();

        // section header: name, then the raw-data pointer at +20
        let header = SECTION_TABLE_OFFSET;
        put_name(&mut data[header..header + 8], "htest");
        let mut offset = header + RAW_PTR_OFFSET;
        write_le_at(&mut data, &mut offset, 0x0200u32).unwrap();

        // symbol 0: section symbol with one auxiliary record carrying the size
        let sym = symbol_table;
        put_name(&mut data[sym..sym + 8], "htest");
        data[sym + 17] = 1;
        let mut offset = sym + SYMBOL_RECORD_LEN;
        write_le_at(&mut data, &mut offset, 0x10u32).unwrap();

        // symbol 2: unrelated symbol with one auxiliary record, both skipped
        let sym = symbol_table + SYMBOL_RECORD_LEN * 2;
        put_name(&mut data[sym..sym + 8], "main");
        data[sym + 17] = 1;

        // symbol 4: plain section symbol carrying the placement address
        let sym = symbol_table + SYMBOL_RECORD_LEN * 4;
        put_name(&mut data[sym..sym + 8], "htest");
        let mut offset = sym + 8;
        write_le_at(&mut data, &mut offset, 0x0040_2410u32).unwrap();

        data
    }

    #[test]
    fn recovers_size_addr_and_raw_offset() {
        let object = CoffObject::parse("test.o".into(), &sample_object()).unwrap();
        assert_eq!(object.sections.len(), 1);

        let section = object.section("htest").unwrap();
        assert_eq!(section.size, 0x10);
        assert_eq!(section.addr, 0x0040_2410);
        assert_eq!(section.raw_offset, 0x0200);
    }

    #[test]
    fn truncated_symbol_table_is_malformed() {
        let mut data = sample_object();
        data.truncate(data.len() - 4);
        assert!(CoffObject::parse("test.o".into(), &data).is_err());
    }

    #[test]
    fn empty_object_has_no_sections() {
        let mut data = vec![0u8; SECTION_TABLE_OFFSET];
        let mut offset = SYMBOL_TABLE_PTR_OFFSET;
        write_le_at(&mut data, &mut offset, SECTION_TABLE_OFFSET as u32).unwrap();
        write_le_at(&mut data, &mut offset, 0u32).unwrap();

        let object = CoffObject::parse("empty.o".into(), &data).unwrap();
        assert!(object.sections.is_empty());
    }
}
