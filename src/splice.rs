//! Section layout, hook placement and the final splice into the target.
//!
//! The composer runs four ordered phases, each a hard precondition of the
//! next: compute where a new section fits behind the target's existing
//! layout, plan a placement slot for every hook section found in the
//! compiled objects, copy the linked hook bytes into the target at the
//! slots' resolved offsets, and commit the new section itself: bytes,
//! header and rewritten image header fields. An optional post-patch pass
//! applies wildcard signature patches over the finished file.

use std::{fs, path::Path};

use crate::{
    coff::CoffObject,
    pe::{align_up, PeImage},
    sig, Error, Result,
};

/// Placement base for the appended section, derived from the target's
/// existing section layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Virtual offset of the new section, aligned to the section alignment.
    pub virtual_offset: u32,
    /// File offset of the new section's raw data, aligned to the file
    /// alignment.
    pub raw_offset: u32,
}

/// Computes the new section's placement behind every existing section.
pub fn compute_layout(image: &PeImage) -> Layout {
    let mut virtual_end = 0u32;
    let mut raw_end = 0u32;
    for section in image.sections() {
        virtual_end = virtual_end.max(section.virtual_address + section.virtual_size);
        raw_end = raw_end.max(section.raw_offset + section.raw_size);
    }
    Layout {
        virtual_offset: align_up(virtual_end, image.section_alignment),
        raw_offset: align_up(raw_end, image.file_alignment),
    }
}

/// One hook section's slot in the placement plan.
///
/// The slot name doubles as the section name the linker script assigns, so
/// the spliced artifact can be searched for it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementSlot {
    /// Sequential slot name, `.h0`, `.h1`, ...
    pub slot: String,
    /// Path of the object the hook section came from.
    pub object: String,
    /// Name of the hook section inside the object.
    pub section: String,
    /// Declared placement address.
    pub addr: u32,
    /// Compiled size of the hook section.
    pub size: u32,
}

/// Assigns a sequential placement slot to every hook section, in object
/// order and file order within each object.
pub fn plan_hooks(hooks: &[CoffObject]) -> Vec<PlacementSlot> {
    let mut slots = Vec::new();
    for hook in hooks {
        if hook.sections.is_empty() {
            log::info!("no hooks in {}", hook.name);
        }
        for section in &hook.sections {
            slots.push(PlacementSlot {
                slot: format!(".h{}", slots.len()),
                object: hook.name.clone(),
                section: section.name.clone(),
                addr: section.addr,
                size: section.size,
            });
        }
    }
    slots
}

/// Copies every planned hook from the linked artifact into the target.
///
/// Each slot is looked up by name in the artifact; its virtual address is
/// the file position inside the target to overwrite. Slots that are
/// missing, resolved negative, or would run past the end of the target are
/// reported and skipped. Returns the number of hooks spliced.
pub fn splice_hooks(
    target: &mut PeImage,
    artifact: &mut PeImage,
    slots: &[PlacementSlot],
) -> Result<usize> {
    let target_len = target.file_len()?;
    let mut spliced = 0;

    for slot in slots {
        let Some(section) = artifact.find_section(&slot.slot) else {
            log::warn!(
                "hook slot {} ({} {}) missing from artifact",
                slot.slot,
                slot.object,
                slot.section
            );
            continue;
        };
        let (destination, source) = (section.virtual_address, section.raw_offset);

        if (destination as i32) < 0
            || u64::from(destination) + u64::from(slot.size) > target_len
        {
            log::warn!(
                "hook {} {} resolved to invalid offset 0x{:x}",
                slot.object,
                slot.slot,
                destination
            );
            continue;
        }

        let mut buf = vec![0u8; slot.size as usize];
        artifact.read_at(u64::from(source), &mut buf)?;
        target.write_at(u64::from(destination), &buf)?;
        spliced += 1;
    }

    Ok(spliced)
}

/// Commits the new section: copies its bytes to the layout offsets,
/// appends the header and saves the target's header fields.
///
/// A non-zero `reserved_size` overrides the section's virtual and raw
/// size, reserving room beyond the compiled contents; it is a hard error
/// for it to be smaller than what the artifact actually produced.
pub fn commit_section(
    target: &mut PeImage,
    artifact: &mut PeImage,
    section_name: &str,
    layout: Layout,
    reserved_size: u32,
) -> Result<()> {
    let (mut header, source_offset, source_size) = {
        let Some(section) = artifact.find_section(section_name) else {
            return Err(Error::SectionNotFound(section_name.to_string()));
        };
        (section.clone(), section.raw_offset, section.raw_size)
    };

    header.virtual_address = layout.virtual_offset;
    header.raw_offset = layout.raw_offset;

    let copy_size = if reserved_size > 0 {
        if reserved_size < source_size {
            return Err(Error::SectionTooSmall {
                required: source_size,
                reserved: reserved_size,
            });
        }
        header.virtual_size = reserved_size;
        header.raw_size = reserved_size;
        reserved_size
    } else {
        source_size
    };

    let mut buf = vec![0u8; copy_size as usize];
    artifact.read_at(u64::from(source_offset), &mut buf[..source_size as usize])?;
    target.write_at(u64::from(layout.raw_offset), &buf)?;

    target.append_section(header);
    target.save()?;

    Ok(())
}

/// Applies a signature patch list over a committed image file.
///
/// The whole file is read into memory, every pair is applied in file
/// order, and the buffer is written back.
pub fn apply_patch_file(image_path: &Path, patch_path: &Path) -> Result<()> {
    let pairs = sig::load_patches(patch_path)?;
    if pairs.is_empty() {
        return Ok(());
    }

    let mut data = fs::read(image_path)?;
    for pair in &pairs {
        let patched = sig::apply(&mut data, &pair.signature, &pair.replacement);
        log::info!("signature: {}\tpatched: {} times", pair.text, patched);
    }
    fs::write(image_path, &data)?;

    Ok(())
}
