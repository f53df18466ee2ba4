//! Helper functions for parsing ELF files

use std::fs;
use std::path::Path;

use object::elf;
use object::read::elf::{FileHeader, ProgramHeader};
use object::Endianness;

use crate::error::ElfError;

pub type ELFReaderType = elf::FileHeader64<Endianness>;
pub type Segment = elf::ProgramHeader64<Endianness>;

/// True if `data` starts with the ELF magic
pub fn is_elf(data: &[u8]) -> bool {
    data.starts_with(&elf::ELFMAG)
}

/// Returns the pair (ELF reader, binary data)
pub fn parse_elf_file(file_path: &Path) -> Result<(ELFReaderType, Vec<u8>), ElfError> {
    let data =
        fs::read(file_path).map_err(|e| ElfError::FileReadError(file_path.to_path_buf(), e))?;
    let elf = parse_elf_data(&data)?;
    Ok((elf, data))
}

/// Parses the 64-bit file header at the start of `data`
pub fn parse_elf_data(data: &[u8]) -> Result<ELFReaderType, ElfError> {
    let elf = ELFReaderType::parse(data).map_err(|e| ElfError::InvalidFormat(e.to_string()))?;
    Ok(*elf)
}

/// Returns the endianness
pub fn get_elf_endian(elf_reader: &ELFReaderType) -> Result<Endianness, ElfError> {
    elf_reader.endian().map_err(|e| ElfError::InvalidFormat(e.to_string()))
}

/// Returns the program entry address
pub fn get_elf_entry(elf_reader: &ELFReaderType) -> Result<u64, ElfError> {
    Ok(elf_reader.e_entry(get_elf_endian(elf_reader)?))
}

/// Returns the machine type; only AArch64 executables are accepted
pub fn get_elf_machine(elf_reader: &ELFReaderType) -> Result<u16, ElfError> {
    let machine = elf_reader.e_machine(get_elf_endian(elf_reader)?);
    if machine != elf::EM_AARCH64 {
        return Err(ElfError::InvalidMachine(machine));
    }
    Ok(machine)
}

/// Loadable segments, in file order
pub fn get_elf_segments(
    elf_reader: &ELFReaderType,
    elf_data: &[u8],
) -> Result<Vec<Segment>, ElfError> {
    let endian = get_elf_endian(elf_reader)?;
    let headers = elf_reader
        .program_headers(endian, elf_data)
        .map_err(|e| ElfError::InvalidFormat(e.to_string()))?;
    Ok(headers
        .iter()
        .filter(|segment| segment.p_type(endian) == elf::PT_LOAD)
        .copied()
        .collect())
}

/// Builds a minimal little-endian ELF64 executable with one PT_LOAD
/// segment holding `code` at `vaddr`.
#[cfg(test)]
pub(crate) fn tiny_elf(machine: u16, vaddr: u64, code: &[u8], memsz: u64) -> Vec<u8> {
    const EHDR: usize = 64;
    const PHDR: usize = 56;
    let offset = (EHDR + PHDR) as u64;

    let mut data = Vec::new();
    data.extend_from_slice(&elf::ELFMAG);
    data.extend_from_slice(&[elf::ELFCLASS64, elf::ELFDATA2LSB, elf::EV_CURRENT, 0]);
    data.extend_from_slice(&[0; 8]);
    data.extend_from_slice(&elf::ET_EXEC.to_le_bytes());
    data.extend_from_slice(&machine.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes()); // e_version
    data.extend_from_slice(&vaddr.to_le_bytes()); // e_entry
    data.extend_from_slice(&(EHDR as u64).to_le_bytes()); // e_phoff
    data.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    data.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    data.extend_from_slice(&(EHDR as u16).to_le_bytes());
    data.extend_from_slice(&(PHDR as u16).to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    data.extend_from_slice(&[0; 6]); // e_shentsize, e_shnum, e_shstrndx
    assert_eq!(data.len(), EHDR);

    data.extend_from_slice(&elf::PT_LOAD.to_le_bytes());
    data.extend_from_slice(&(elf::PF_R | elf::PF_X).to_le_bytes());
    data.extend_from_slice(&offset.to_le_bytes());
    data.extend_from_slice(&vaddr.to_le_bytes()); // p_vaddr
    data.extend_from_slice(&vaddr.to_le_bytes()); // p_paddr
    data.extend_from_slice(&(code.len() as u64).to_le_bytes());
    data.extend_from_slice(&memsz.to_le_bytes());
    data.extend_from_slice(&4u64.to_le_bytes()); // p_align
    assert_eq!(data.len(), EHDR + PHDR);

    data.extend_from_slice(code);
    data
}
