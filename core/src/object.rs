//! The DOLLY object format: header, section table and payload. Shared
//! unchanged by the assembler (writer), disassembler (reader) and emulator
//! (reader).

use std::io::{self, Write};

use log::debug;
use thiserror::Error;

pub const MAGIC: [u8; 6] = [0x7F, b'D', b'O', b'L', b'L', b'Y'];
pub const SECTION_NAME_LEN: usize = 32;
pub const VERSION: u8 = 1;
const SECTION_RECORD_LEN: usize = SECTION_NAME_LEN + 1 + 4 + 4 + 4;

/// The two-family error taxonomy's object/I/O half (spec.md §7).
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("not a dolly executable")]
    InvalidFormat,
    #[error("incomplete executable header")]
    IncompleteHeader,
    #[error("unexpected end of file in section table")]
    EofSectionTable,
    #[error("unexpected end of file in section")]
    EofSection,
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Mos6502 = 0,
    Wdc65816 = 1,
}

impl Architecture {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Architecture::Mos6502),
            1 => Some(Architecture::Wdc65816),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Text = 0,
    Data = 1,
    String = 2,
}

impl SectionType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(SectionType::Text),
            1 => Some(SectionType::Data),
            2 => Some(SectionType::String),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SectionType::Text => "text",
            SectionType::Data => "data",
            SectionType::String => "string",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub section_type: SectionType,
    pub offset: u32,
    pub size: u32,
    pub load_address: u32,
}

/// An in-memory DOLLY object: header, section table and concatenated
/// payload. `offset` values inside `sections` are monotone non-decreasing
/// and non-overlapping, maintained by [`Executable::add_section`].
#[derive(Debug, Clone, Default)]
pub struct Executable {
    pub arch: Option<Architecture>,
    pub version: u8,
    pub sections: Vec<Section>,
    pub program_data: Vec<u8>,
}

impl Executable {
    pub fn new(arch: Architecture) -> Self {
        Executable { arch: Some(arch), version: VERSION, sections: Vec::new(), program_data: Vec::new() }
    }

    /// Appends a new section, assigning it the next free payload offset
    /// (the current payload end) and extending the payload buffer.
    pub fn add_section(&mut self, name: &str, section_type: SectionType, load_address: u32, data: &[u8]) {
        let offset = self.program_data.len() as u32;
        self.sections.push(Section {
            name: name.to_string(),
            section_type,
            offset,
            size: data.len() as u32,
            load_address,
        });
        self.program_data.extend_from_slice(data);
    }

    pub fn section_data(&self, section: &Section) -> &[u8] {
        let start = section.offset as usize;
        let end = start + section.size as usize;
        &self.program_data[start..end]
    }

    /// Reads an object from bytes, failing with the taxonomy member
    /// matching where truncation occurred (spec.md §4.2).
    pub fn read(src: &[u8]) -> Result<Executable, ObjectError> {
        const HEADER_SIZE: usize = 1 + 1 + 1; // arch, version, section_count
        if src.len() < MAGIC.len() + HEADER_SIZE {
            return Err(ObjectError::IncompleteHeader);
        }
        if src[..MAGIC.len()] != MAGIC {
            return Err(ObjectError::InvalidFormat);
        }

        let mut pos = MAGIC.len();
        let arch = Architecture::from_byte(src[pos]);
        pos += 1;
        let version = src[pos];
        pos += 1;
        let section_count = src[pos] as usize;
        pos += 1;

        let mut sections = Vec::with_capacity(section_count);
        for _ in 0..section_count {
            if src.len() < pos + SECTION_RECORD_LEN {
                return Err(ObjectError::EofSectionTable);
            }
            let name_bytes = &src[pos..pos + SECTION_NAME_LEN];
            let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(SECTION_NAME_LEN);
            let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();
            pos += SECTION_NAME_LEN;

            let section_type = SectionType::from_byte(src[pos]).ok_or(ObjectError::EofSectionTable)?;
            pos += 1;
            let offset = u32::from_le_bytes(src[pos..pos + 4].try_into().unwrap());
            pos += 4;
            let size = u32::from_le_bytes(src[pos..pos + 4].try_into().unwrap());
            pos += 4;
            let load_address = u32::from_le_bytes(src[pos..pos + 4].try_into().unwrap());
            pos += 4;

            sections.push(Section { name, section_type, offset, size, load_address });
        }

        let program_size: u32 = sections.iter().map(|s| s.size).sum();
        let mut program_data = vec![0u8; program_size as usize];
        for section in &sections {
            let start = section.offset as usize;
            let end = start + section.size as usize;
            if src.len() < pos + section.size as usize {
                return Err(ObjectError::EofSection);
            }
            program_data[start..end].copy_from_slice(&src[pos..pos + section.size as usize]);
            pos += section.size as usize;
        }

        debug!("read object: {} section(s)", sections.len());
        Ok(Executable { arch, version, sections, program_data })
    }

    /// Writes the object's exact byte layout (spec.md §6).
    pub fn write<W: Write>(&self, mut out: W) -> io::Result<()> {
        out.write_all(&MAGIC)?;
        out.write_all(&[self.arch.map(|a| a as u8).unwrap_or(0)])?;
        out.write_all(&[self.version])?;
        out.write_all(&[self.sections.len() as u8])?;

        for section in &self.sections {
            let mut name_buf = [0u8; SECTION_NAME_LEN];
            let bytes = section.name.as_bytes();
            let len = bytes.len().min(SECTION_NAME_LEN);
            name_buf[..len].copy_from_slice(&bytes[..len]);
            out.write_all(&name_buf)?;
            out.write_all(&[section.section_type as u8])?;
            out.write_all(&section.offset.to_le_bytes())?;
            out.write_all(&section.size.to_le_bytes())?;
            out.write_all(&section.load_address.to_le_bytes())?;
        }

        out.write_all(&self.program_data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Executable {
        let mut exec = Executable::new(Architecture::Mos6502);
        exec.add_section("_start", SectionType::Text, 0x0600, &[0xA9, 0x05, 0x00]);
        exec.add_section("d", SectionType::Data, 0x0700, &[1, 2, 3, 4]);
        exec
    }

    #[test]
    fn round_trip() {
        let exec = sample();
        let mut buf = Vec::new();
        exec.write(&mut buf).unwrap();
        let read_back = Executable::read(&buf).unwrap();
        assert_eq!(read_back.sections.len(), 2);
        assert_eq!(read_back.sections[0].name, "_start");
        assert_eq!(read_back.section_data(&read_back.sections[0]), &[0xA9, 0x05, 0x00]);
        assert_eq!(read_back.sections[1].load_address, 0x0700);
        assert_eq!(read_back.version, VERSION);
    }

    #[test]
    fn round_trip_preserves_a_non_default_version() {
        let mut exec = sample();
        exec.version = 7;
        let mut buf = Vec::new();
        exec.write(&mut buf).unwrap();
        let read_back = Executable::read(&buf).unwrap();
        assert_eq!(read_back.version, 7);
    }

    #[test]
    fn write_len_matches_header_plus_sections() {
        let exec = sample();
        let mut buf = Vec::new();
        exec.write(&mut buf).unwrap();
        let expected = MAGIC.len() + 3 + exec.sections.len() * SECTION_RECORD_LEN
            + exec.program_data.len();
        assert_eq!(buf.len(), expected);
    }

    #[test]
    fn bad_magic_is_invalid_format() {
        let mut buf = vec![0u8; 16];
        buf[0] = 0x00;
        assert!(matches!(Executable::read(&buf), Err(ObjectError::InvalidFormat)));
    }

    #[test]
    fn truncated_header_is_incomplete() {
        let buf = vec![0x7F, b'D', b'O'];
        assert!(matches!(Executable::read(&buf), Err(ObjectError::IncompleteHeader)));
    }

    #[test]
    fn truncated_section_table() {
        let mut buf = MAGIC.to_vec();
        buf.push(0); // arch
        buf.push(VERSION);
        buf.push(1); // section_count = 1, but no record follows
        assert!(matches!(Executable::read(&buf), Err(ObjectError::EofSectionTable)));
    }

    #[test]
    fn truncated_payload() {
        let exec = sample();
        let mut buf = Vec::new();
        exec.write(&mut buf).unwrap();
        buf.truncate(buf.len() - 2);
        assert!(matches!(Executable::read(&buf), Err(ObjectError::EofSection)));
    }

    #[test]
    fn monotonic_non_overlapping_offsets() {
        let exec = sample();
        let mut last_end = 0u32;
        for section in &exec.sections {
            assert!(section.offset >= last_end);
            last_end = section.offset + section.size;
        }
    }
}
