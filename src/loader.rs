//! Utility functions for preparing memory for execution
//!
//! A program file is either an ELF64 AArch64 executable or a text file of
//! hexadecimal instruction words, one per line.

use std::fs;
use std::path::Path;

use object::read::elf::ProgramHeader;
use tracing::{debug, info};

use crate::cpu::TEXT_START;
use crate::elf_helper::*;
use crate::error::{ElfError, SimulatorResult};
use crate::memory::MainMemory;

/// Loads the program at `path` into `mem` and returns the entry PC
pub fn load_program(path: &Path, mem: &mut MainMemory) -> SimulatorResult<u64> {
    let data = fs::read(path).map_err(|e| ElfError::FileReadError(path.to_path_buf(), e))?;
    let entry = if is_elf(&data) {
        let elf_reader = parse_elf_data(&data)?;
        load_elf(mem, &elf_reader, &data)?
    } else {
        let text = String::from_utf8(data)
            .map_err(|_| ElfError::ParseError(path.to_path_buf(), "not UTF-8 text".into()))?;
        let words = parse_hex_words(&text, path)?;
        if words.is_empty() {
            return Err(
                ElfError::ParseError(path.to_path_buf(), "no instruction words".into()).into()
            );
        }
        load_hex(mem, &words)?
    };
    info!("Loaded {}; entry PC: {:#010x}", path.display(), entry);
    Ok(entry)
}

/// Copies the loadable segments of an ELF file into memory.
/// Returns the entry PC
pub fn load_elf(
    mem: &mut MainMemory,
    elf_reader: &ELFReaderType,
    elf_data: &[u8],
) -> SimulatorResult<u64> {
    get_elf_machine(elf_reader)?;
    let endian = get_elf_endian(elf_reader)?;
    let entry = get_elf_entry(elf_reader)?;

    for segment in get_elf_segments(elf_reader, elf_data)? {
        let memory_size = segment.p_memsz(endian);
        let virtual_address = segment.p_vaddr(endian);
        let file_size = segment.p_filesz(endian);
        let offset = segment.p_offset(endian);

        if virtual_address.checked_add(memory_size).is_none() || file_size > memory_size {
            return Err(ElfError::AddressOutOfBounds(virtual_address).into());
        }
        debug!(
            "Loading segment at {:#010x}: {:#x} bytes ({:#x} from file)",
            virtual_address, memory_size, file_size
        );

        let bytes = offset
            .checked_add(file_size)
            .and_then(|end| elf_data.get(offset as usize..end as usize))
            .ok_or_else(|| {
                ElfError::InvalidFormat(format!("segment at {:#x} runs past end of file", offset))
            })?;
        mem.load_bytes(virtual_address, bytes)?;

        // The rest of the segment is zero-filled
        mem.clear_range(virtual_address + file_size, memory_size - file_size);
    }

    Ok(entry)
}

/// Places instruction words at `TEXT_START`. Returns the entry PC
pub fn load_hex(mem: &mut MainMemory, words: &[u32]) -> SimulatorResult<u64> {
    mem.load_words(TEXT_START, words)?;
    debug!("Loaded {} words at {:#010x}", words.len(), TEXT_START);
    Ok(TEXT_START)
}

/// Parses a hexadecimal program listing.
///
/// One word per line with an optional `0x` prefix. Blank lines and
/// anything after `#` are ignored.
pub fn parse_hex_words(text: &str, path: &Path) -> Result<Vec<u32>, ElfError> {
    let mut words = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let digits = line.strip_prefix("0x").or_else(|| line.strip_prefix("0X")).unwrap_or(line);
        let word = u32::from_str_radix(digits, 16).map_err(|_| {
            ElfError::ParseError(
                path.to_path_buf(),
                format!("Invalid instruction word '{}' at line {}", line, line_num + 1),
            )
        })?;
        words.push(word);
    }
    Ok(words)
}
