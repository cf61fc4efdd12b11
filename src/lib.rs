pub mod types {
    use thiserror::Error;

    pub type Byte = u8;
    pub type Word = u16;
    pub type SByte = i8;

    /// A decoded instruction: the text to emit and how many bytes it covers
    #[derive(PartialEq, Eq, Debug, Clone)]
    pub struct Instruction {
        pub mnm: String,
        pub len: u8, // bytes consumed, opcode included
    }

    impl Instruction {
        pub fn new(text: &str, len: u8) -> Self {
            Self {
                mnm: String::from(text),
                len,
            }
        }
    }

    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    pub enum DecodeErrorKind {
        UndefinedOpcode,
        TruncatedInstruction,
    }

    /// Why a byte sequence couldn't be turned into an instruction.
    ///
    /// `address` is always the absolute (file offset) address of the opcode byte.
    #[derive(Error, PartialEq, Eq, Debug, Clone, Copy)]
    pub enum DecodeError {
        #[error("undefined opcode ${opcode:02x} at address ${address:04x}")]
        UndefinedOpcode { opcode: Byte, address: u32 },
        #[error("truncated instruction ${opcode:02x} at address ${address:04x}")]
        TruncatedInstruction { opcode: Byte, address: u32 },
    }

    impl DecodeError {
        pub fn kind(&self) -> DecodeErrorKind {
            match self {
                DecodeError::UndefinedOpcode { .. } => DecodeErrorKind::UndefinedOpcode,
                DecodeError::TruncatedInstruction { .. } => DecodeErrorKind::TruncatedInstruction,
            }
        }

        pub fn opcode(&self) -> Byte {
            match *self {
                DecodeError::UndefinedOpcode { opcode, .. }
                | DecodeError::TruncatedInstruction { opcode, .. } => opcode,
            }
        }

        pub fn address(&self) -> u32 {
            match *self {
                DecodeError::UndefinedOpcode { address, .. }
                | DecodeError::TruncatedInstruction { address, .. } => address,
            }
        }
    }

    pub type DecodeOutcome = Result<Instruction, DecodeError>;

    #[cfg(test)]
    mod tests_types {
        use super::*;

        #[test]
        fn test_error_accessors() {
            let err = DecodeError::UndefinedOpcode {
                opcode: 0xD3,
                address: 0x4EDE,
            };
            assert_eq!(err.kind(), DecodeErrorKind::UndefinedOpcode);
            assert_eq!(err.opcode(), 0xD3);
            assert_eq!(err.address(), 0x4EDE);
            assert_eq!(err.to_string(), "undefined opcode $d3 at address $4ede");

            let err = DecodeError::TruncatedInstruction {
                opcode: 0xC3,
                address: 0x3FFF,
            };
            assert_eq!(err.kind(), DecodeErrorKind::TruncatedInstruction);
            assert_eq!(err.to_string(), "truncated instruction $c3 at address $3fff");
        }
    }
}

pub mod bits {
    use crate::types::{Byte, SByte, Word};

    /// Builds a word from its two halves, e.g. the operand bytes `$cd, $ab`
    /// of a 16-bit immediate are `combine(0xAB, 0xCD)` == `$abcd`
    pub const fn combine(high: Byte, low: Byte) -> Word {
        (high as Word) << Byte::BITS | (low as Word)
    }

    pub const fn signed(val: Byte) -> SByte {
        val as SByte
    }

    #[test]
    fn test_combine() {
        assert_eq!(combine(0xAB, 0xCD), 0xABCD);
        assert_eq!(combine(0x00, 0xFF), 0x00FF);
        assert_eq!(combine(0xFF, 0x00), 0xFF00);
    }

    #[test]
    fn test_signed() {
        assert_eq!(signed(0x00), 0);
        assert_eq!(signed(0x7F), 127);
        assert_eq!(signed(0x80), -128);
        assert_eq!(signed(0xF6), -10);
        assert_eq!(signed(0xFF), -1);
    }
}

pub mod memory {
    use crate::types::*;
    use std::{
        ops::{Index, Range},
        str::from_utf8,
    };

    // 0000-3FFF   16KB ROM Bank 00     (in cartridge, fixed at bank 00)
    pub const MEM_BANK_00: Word = 0x0000;
    // 4000-7FFF   16KB ROM Bank 01..NN (in cartridge, switchable bank number)
    pub const MEM_BANK_NN: Word = 0x4000;

    // sizes
    pub const BANK_SIZE: usize = 0x4000;

    // ROM Header
    pub const ROM_LOGO: usize = 0x0104;
    pub const ROM_TITLE: usize = 0x0134;
    pub const ROM_TITLE_END: usize = 0x0143 + 1;
    pub const ROM_TYPE: usize = 0x0147;
    pub const ROM_DESTINATION: usize = 0x014A;
    pub const ROM_HEADER_END: usize = 0x014F + 1;

    /// Immutable ROM contents plus the bank geometry needed to walk them.
    pub struct RomImage {
        data: Box<[Byte]>,
        has_header: bool,
    }

    impl RomImage {
        pub fn new(data: Vec<Byte>) -> RomImage {
            RomImage {
                data: data.into_boxed_slice(),
                has_header: true,
            }
        }

        /// Treat every byte as potential code, e.g. for snippets that aren't a full cartridge
        pub fn without_header(self) -> RomImage {
            RomImage {
                has_header: false,
                ..self
            }
        }

        pub fn data(&self) -> &[Byte] {
            &self.data
        }

        pub fn len(&self) -> usize {
            self.data.len()
        }

        pub fn is_empty(&self) -> bool {
            self.data.is_empty()
        }

        pub fn bank_size(&self) -> usize {
            BANK_SIZE
        }

        /// Whole banks in the image, anything smaller than a bank still counts as one
        pub fn bank_count(&self) -> usize {
            (self.data.len() / BANK_SIZE).max(1)
        }

        /// File offsets covered by `bank`, clipped to the end of the image
        pub fn bank_range(&self, bank: usize) -> Range<usize> {
            let start = (bank * BANK_SIZE).min(self.data.len());
            let end = (start + BANK_SIZE).min(self.data.len());
            start..end
        }

        /// Bytes past the last whole bank, these are never visited by the disassembler
        pub fn trailing_bytes(&self) -> usize {
            self.data.len() - self.bank_range(self.bank_count() - 1).end
        }

        pub fn header_range(&self) -> Option<Range<usize>> {
            if self.has_header && self.data.len() >= ROM_HEADER_END {
                Some(ROM_LOGO..ROM_HEADER_END)
            } else {
                None
            }
        }

        pub fn is_header_byte(&self, address: u32) -> bool {
            match self.header_range() {
                Some(range) => range.contains(&(address as usize)),
                None => false,
            }
        }

        pub fn title(&self) -> Option<&str> {
            self.header_range()?;
            let raw = &self.data[ROM_TITLE..ROM_TITLE_END];
            // the title is padded with zeroes, newer carts also reuse the tail for other codes
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            from_utf8(&raw[..end]).ok()
        }

        pub fn cartridge_type(&self) -> Option<&'static str> {
            self.header_range()?;
            Some(match self.data[ROM_TYPE] {
                0x00 => "ROM ONLY",
                0x01 => "MBC1",
                0x02 => "MBC1+RAM",
                0x03 => "MBC1+RAM+BATTERY",
                0x05 => "MBC2",
                0x06 => "MBC2+BATTERY",
                0x08 => "ROM+RAM",
                0x09 => "ROM+RAM+BATTERY",
                0x0B => "MMM01",
                0x0C => "MMM01+RAM",
                0x0D => "MMM01+RAM+BATTERY",
                0x0F => "MBC3+TIMER+BATTERY",
                0x10 => "MBC3+TIMER+RAM+BATTERY",
                0x11 => "MBC3",
                0x12 => "MBC3+RAM",
                0x13 => "MBC3+RAM+BATTERY",
                0x19 => "MBC5",
                0x1A => "MBC5+RAM",
                0x1B => "MBC5+RAM+BATTERY",
                0x1C => "MBC5+RUMBLE",
                0x1D => "MBC5+RUMBLE+RAM",
                0x1E => "MBC5+RUMBLE+RAM+BATTERY",
                0x20 => "MBC6",
                0x22 => "MBC7+SENSOR+RUMBLE+RAM+BATTERY",
                0xFC => "POCKET CAMERA",
                0xFD => "BANDAI TAMA5",
                0xFE => "HuC3",
                0xFF => "HuC1+RAM+BATTERY",
                _ => "???",
            })
        }

        pub fn destination(&self) -> Option<&'static str> {
            self.header_range()?;
            Some(match self.data[ROM_DESTINATION] {
                0x00 => "Japanese",
                0x01 => "Non-Japanese",
                _ => "???",
            })
        }
    }

    impl From<Vec<Byte>> for RomImage {
        fn from(data: Vec<Byte>) -> Self {
            RomImage::new(data)
        }
    }

    impl Index<usize> for RomImage {
        type Output = Byte;
        fn index(&self, index: usize) -> &Self::Output {
            &self.data[index]
        }
    }

    impl Index<Range<usize>> for RomImage {
        type Output = [Byte];
        fn index(&self, index: Range<usize>) -> &Self::Output {
            &self.data[index]
        }
    }

    /// Where a file offset shows up in the cpu's address space.
    ///
    /// Bank 00 is mapped 1:1, every other bank is paged into the same
    /// MEM_BANK_NN window. An offset sitting exactly on a bank boundary belongs
    /// to the end of the bank before it (it's the "one past the last byte"
    /// position of an instruction that ends the bank).
    pub fn banked_address(file_offset: u32) -> u32 {
        let bank_size = BANK_SIZE as u32;
        if file_offset <= bank_size {
            file_offset
        } else {
            (file_offset - 1) % bank_size + 1 + MEM_BANK_NN as u32
        }
    }

    /// Target of a relative jump, in the address space the cpu actually sees.
    ///
    /// `instruction_end` is the file offset of the byte right after the jump.
    /// Targets before $0000 clamp to $0000, targets past $ffff wrap around.
    // todo: the wrap past $ffff is what emulators do, confirm against real hardware
    pub fn resolve_relative_target(instruction_end: u32, offset: SByte) -> Word {
        let target = banked_address(instruction_end) as i64 + offset as i64;
        if target < 0 {
            MEM_BANK_00
        } else if target > Word::MAX as i64 {
            (target - 0x10000) as Word
        } else {
            target as Word
        }
    }

    #[cfg(test)]
    mod tests_memory {
        use super::*;

        fn header_rom(len: usize) -> RomImage {
            let mut data = vec![0; len];
            data[ROM_TITLE..ROM_TITLE + 5].copy_from_slice(b"ZELDA");
            data[ROM_TYPE] = 0x03;
            data[ROM_DESTINATION] = 0x01;
            RomImage::new(data)
        }

        #[test]
        fn test_bank_count() {
            assert_eq!(RomImage::new(vec![]).bank_count(), 1);
            assert_eq!(RomImage::new(vec![0; 6]).bank_count(), 1);
            assert_eq!(RomImage::new(vec![0; BANK_SIZE]).bank_count(), 1);
            assert_eq!(RomImage::new(vec![0; BANK_SIZE * 2]).bank_count(), 2);
            assert_eq!(RomImage::new(vec![0; BANK_SIZE * 64]).bank_count(), 64);
            assert_eq!(RomImage::new(vec![0; BANK_SIZE * 2 + 1]).bank_count(), 2);
        }

        #[test]
        fn test_bank_range() {
            let rom = RomImage::new(vec![0; 6]);
            assert_eq!(rom.bank_range(0), 0..6);
            assert_eq!(rom.trailing_bytes(), 0);

            let rom = RomImage::new(vec![0; BANK_SIZE * 2 + 0x10]);
            assert_eq!(rom.bank_range(0), 0..0x4000);
            assert_eq!(rom.bank_range(1), 0x4000..0x8000);
            assert_eq!(rom.trailing_bytes(), 0x10);
        }

        #[test]
        fn test_header_bytes() {
            let rom = header_rom(BANK_SIZE);
            assert!(!rom.is_header_byte(0x0103));
            assert!(rom.is_header_byte(0x0104));
            assert!(rom.is_header_byte(0x0134));
            assert!(rom.is_header_byte(0x014F));
            assert!(!rom.is_header_byte(0x0150));
            // only bank 00 has a header
            assert!(!rom.is_header_byte(0x4104));
        }

        #[test]
        fn test_header_disabled() {
            // too small to hold a header
            let rom = RomImage::new(vec![0; 0x14F]);
            assert_eq!(rom.header_range(), None);
            assert!(!rom.is_header_byte(0x0104));
            assert_eq!(rom.title(), None);

            let rom = header_rom(ROM_HEADER_END);
            assert_eq!(rom.header_range(), Some(0x104..0x150));
            let rom = rom.without_header();
            assert_eq!(rom.header_range(), None);
            assert!(!rom.is_header_byte(0x0104));
        }

        #[test]
        fn test_header_fields() {
            let rom = header_rom(BANK_SIZE * 2);
            assert_eq!(rom.title(), Some("ZELDA"));
            assert_eq!(rom.cartridge_type(), Some("MBC1+RAM+BATTERY"));
            assert_eq!(rom.destination(), Some("Non-Japanese"));
        }

        #[test]
        fn test_banked_address() {
            assert_eq!(banked_address(0x0000), 0x0000);
            assert_eq!(banked_address(0x0EE0), 0x0EE0);
            assert_eq!(banked_address(0x4000), 0x4000);
            assert_eq!(banked_address(0x4EE0), 0x4EE0);
            assert_eq!(banked_address(0x8EE0), 0x4EE0);
            assert_eq!(banked_address(0x1F_4EE0), 0x4EE0);
            assert_eq!(banked_address(0x8000), 0x8000);
            assert_eq!(banked_address(0x8001), 0x4001);
        }

        #[test]
        fn test_resolve_relative_target() {
            // jr -10 placed at $0ede, $4ede, $8ede (2 bytes long)
            assert_eq!(resolve_relative_target(0x0EE0, -10), 0x0ED6);
            assert_eq!(resolve_relative_target(0x4EE0, -10), 0x4ED6);
            assert_eq!(resolve_relative_target(0x8EE0, -10), 0x4ED6);
            // jr +10
            assert_eq!(resolve_relative_target(0x0EE0, 10), 0x0EEA);
            assert_eq!(resolve_relative_target(0x4EE0, 10), 0x4EEA);
            assert_eq!(resolve_relative_target(0x8EE0, 10), 0x4EEA);
            // jumping back over the start of a switchable bank window
            assert_eq!(resolve_relative_target(0x8002, -4), 0x3FFE);
            // last instruction of a switchable bank
            assert_eq!(resolve_relative_target(0x8000, -2), 0x7FFE);
        }

        #[test]
        fn test_resolve_relative_target_clamps() {
            assert_eq!(resolve_relative_target(0x0002, -128), 0x0000);
            assert_eq!(resolve_relative_target(0x0000, -1), 0x0000);
            assert_eq!(resolve_relative_target(0x0002, 127), 0x0081);
        }
    }
}

pub mod decode {
    use crate::bits::*;
    use crate::memory::resolve_relative_target;
    use crate::types::*;
    use const_format::concatcp;
    use std::fmt;

    // https://rgbds.gbdev.io/docs/gbz80.7
    // https://www.pastraiser.com/cpu/gameboy/gameboy_opcodes.html

    const COMMENT: &str = " ; ";
    pub const NOTE_UNKNOWN: &str = concatcp!(COMMENT, "unknown instruction");
    pub const NOTE_TRUNCATED: &str = concatcp!(COMMENT, "truncated instruction");
    pub const NOTE_CORRUPTED_STOP: &str = concatcp!(COMMENT, "corrupted stop");

    pub const OP_STOP: Byte = 0x10;
    pub const OP_PREFIX: Byte = 0xCB;

    /// What follows the opcode byte, and how it's spelled in the mnemonic template.
    ///
    /// Placeholder names follow the rgbds docs: n8/n16 immediates, a8/a16
    /// addresses, e8 signed jump offsets.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Arg {
        None,
        N8,
        A8, // offset into the $ff00 page
        E8,
        N16,
        A16,
        Prefix, // selects an entry of EXT_OPCODES
        Stop,   // must be followed by $00
        Undefined,
    }

    impl Arg {
        /// Instruction length in bytes, opcode included
        pub const fn len(self) -> usize {
            match self {
                Arg::None | Arg::Undefined => 1,
                Arg::N8 | Arg::A8 | Arg::E8 | Arg::Prefix | Arg::Stop => 2,
                Arg::N16 | Arg::A16 => 3,
            }
        }

        const fn token(self) -> &'static str {
            match self {
                Arg::N8 => "n8",
                Arg::A8 => "a8",
                Arg::E8 => "e8",
                Arg::N16 => "n16",
                Arg::A16 => "a16",
                _ => "",
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Opcode {
        pub mnm: &'static str,
        pub arg: Arg,
    }

    const fn op(mnm: &'static str, arg: Arg) -> Opcode {
        Opcode { mnm, arg }
    }

    const fn undef() -> Opcode {
        op("", Arg::Undefined)
    }

    #[rustfmt::skip]
    pub static OPCODES: [Opcode; 256] = [
        // 0x00
        op("nop", Arg::None),           op("ld bc, n16", Arg::N16),     op("ld [bc], a", Arg::None),    op("inc bc", Arg::None),
        op("inc b", Arg::None),         op("dec b", Arg::None),         op("ld b, n8", Arg::N8),        op("rlca", Arg::None),
        op("ld [a16], sp", Arg::A16),   op("add hl, bc", Arg::None),    op("ld a, [bc]", Arg::None),    op("dec bc", Arg::None),
        op("inc c", Arg::None),         op("dec c", Arg::None),         op("ld c, n8", Arg::N8),        op("rrca", Arg::None),
        // 0x10
        op("stop", Arg::Stop),          op("ld de, n16", Arg::N16),     op("ld [de], a", Arg::None),    op("inc de", Arg::None),
        op("inc d", Arg::None),         op("dec d", Arg::None),         op("ld d, n8", Arg::N8),        op("rla", Arg::None),
        op("jr e8", Arg::E8),           op("add hl, de", Arg::None),    op("ld a, [de]", Arg::None),    op("dec de", Arg::None),
        op("inc e", Arg::None),         op("dec e", Arg::None),         op("ld e, n8", Arg::N8),        op("rra", Arg::None),
        // 0x20
        op("jr nz, e8", Arg::E8),       op("ld hl, n16", Arg::N16),     op("ldi [hl], a", Arg::None),   op("inc hl", Arg::None),
        op("inc h", Arg::None),         op("dec h", Arg::None),         op("ld h, n8", Arg::N8),        op("daa", Arg::None),
        op("jr z, e8", Arg::E8),        op("add hl, hl", Arg::None),    op("ldi a, [hl]", Arg::None),   op("dec hl", Arg::None),
        op("inc l", Arg::None),         op("dec l", Arg::None),         op("ld l, n8", Arg::N8),        op("cpl", Arg::None),
        // 0x30
        op("jr nc, e8", Arg::E8),       op("ld sp, n16", Arg::N16),     op("ldd [hl], a", Arg::None),   op("inc sp", Arg::None),
        op("inc [hl]", Arg::None),      op("dec [hl]", Arg::None),      op("ld [hl], n8", Arg::N8),     op("scf", Arg::None),
        op("jr c, e8", Arg::E8),        op("add hl, sp", Arg::None),    op("ldd a, [hl]", Arg::None),   op("dec sp", Arg::None),
        op("inc a", Arg::None),         op("dec a", Arg::None),         op("ld a, n8", Arg::N8),        op("ccf", Arg::None),
        // 0x40
        op("ld b, b", Arg::None),       op("ld b, c", Arg::None),       op("ld b, d", Arg::None),       op("ld b, e", Arg::None),
        op("ld b, h", Arg::None),       op("ld b, l", Arg::None),       op("ld b, [hl]", Arg::None),    op("ld b, a", Arg::None),
        op("ld c, b", Arg::None),       op("ld c, c", Arg::None),       op("ld c, d", Arg::None),       op("ld c, e", Arg::None),
        op("ld c, h", Arg::None),       op("ld c, l", Arg::None),       op("ld c, [hl]", Arg::None),    op("ld c, a", Arg::None),
        // 0x50
        op("ld d, b", Arg::None),       op("ld d, c", Arg::None),       op("ld d, d", Arg::None),       op("ld d, e", Arg::None),
        op("ld d, h", Arg::None),       op("ld d, l", Arg::None),       op("ld d, [hl]", Arg::None),    op("ld d, a", Arg::None),
        op("ld e, b", Arg::None),       op("ld e, c", Arg::None),       op("ld e, d", Arg::None),       op("ld e, e", Arg::None),
        op("ld e, h", Arg::None),       op("ld e, l", Arg::None),       op("ld e, [hl]", Arg::None),    op("ld e, a", Arg::None),
        // 0x60
        op("ld h, b", Arg::None),       op("ld h, c", Arg::None),       op("ld h, d", Arg::None),       op("ld h, e", Arg::None),
        op("ld h, h", Arg::None),       op("ld h, l", Arg::None),       op("ld h, [hl]", Arg::None),    op("ld h, a", Arg::None),
        op("ld l, b", Arg::None),       op("ld l, c", Arg::None),       op("ld l, d", Arg::None),       op("ld l, e", Arg::None),
        op("ld l, h", Arg::None),       op("ld l, l", Arg::None),       op("ld l, [hl]", Arg::None),    op("ld l, a", Arg::None),
        // 0x70
        op("ld [hl], b", Arg::None),    op("ld [hl], c", Arg::None),    op("ld [hl], d", Arg::None),    op("ld [hl], e", Arg::None),
        op("ld [hl], h", Arg::None),    op("ld [hl], l", Arg::None),    op("halt", Arg::None),          op("ld [hl], a", Arg::None),
        op("ld a, b", Arg::None),       op("ld a, c", Arg::None),       op("ld a, d", Arg::None),       op("ld a, e", Arg::None),
        op("ld a, h", Arg::None),       op("ld a, l", Arg::None),       op("ld a, [hl]", Arg::None),    op("ld a, a", Arg::None),
        // 0x80
        op("add b", Arg::None),         op("add c", Arg::None),         op("add d", Arg::None),         op("add e", Arg::None),
        op("add h", Arg::None),         op("add l", Arg::None),         op("add [hl]", Arg::None),      op("add a", Arg::None),
        op("adc b", Arg::None),         op("adc c", Arg::None),         op("adc d", Arg::None),         op("adc e", Arg::None),
        op("adc h", Arg::None),         op("adc l", Arg::None),         op("adc [hl]", Arg::None),      op("adc a", Arg::None),
        // 0x90
        op("sub b", Arg::None),         op("sub c", Arg::None),         op("sub d", Arg::None),         op("sub e", Arg::None),
        op("sub h", Arg::None),         op("sub l", Arg::None),         op("sub [hl]", Arg::None),      op("sub a", Arg::None),
        op("sbc b", Arg::None),         op("sbc c", Arg::None),         op("sbc d", Arg::None),         op("sbc e", Arg::None),
        op("sbc h", Arg::None),         op("sbc l", Arg::None),         op("sbc [hl]", Arg::None),      op("sbc a", Arg::None),
        // 0xA0
        op("and b", Arg::None),         op("and c", Arg::None),         op("and d", Arg::None),         op("and e", Arg::None),
        op("and h", Arg::None),         op("and l", Arg::None),         op("and [hl]", Arg::None),      op("and a", Arg::None),
        op("xor b", Arg::None),         op("xor c", Arg::None),         op("xor d", Arg::None),         op("xor e", Arg::None),
        op("xor h", Arg::None),         op("xor l", Arg::None),         op("xor [hl]", Arg::None),      op("xor a", Arg::None),
        // 0xB0
        op("or b", Arg::None),          op("or c", Arg::None),          op("or d", Arg::None),          op("or e", Arg::None),
        op("or h", Arg::None),          op("or l", Arg::None),          op("or [hl]", Arg::None),       op("or a", Arg::None),
        op("cp b", Arg::None),          op("cp c", Arg::None),          op("cp d", Arg::None),          op("cp e", Arg::None),
        op("cp h", Arg::None),          op("cp l", Arg::None),          op("cp [hl]", Arg::None),       op("cp a", Arg::None),
        // 0xC0
        op("ret nz", Arg::None),        op("pop bc", Arg::None),        op("jp nz, a16", Arg::A16),     op("jp a16", Arg::A16),
        op("call nz, a16", Arg::A16),   op("push bc", Arg::None),       op("add a, n8", Arg::N8),       op("rst $00", Arg::None),
        op("ret z", Arg::None),         op("ret", Arg::None),           op("jp z, a16", Arg::A16),      op("", Arg::Prefix),
        op("call z, a16", Arg::A16),    op("call a16", Arg::A16),       op("adc a, n8", Arg::N8),       op("rst $08", Arg::None),
        // 0xD0
        op("ret nc", Arg::None),        op("pop de", Arg::None),        op("jp nc, a16", Arg::A16),     undef(),
        op("call nc, a16", Arg::A16),   op("push de", Arg::None),       op("sub a, n8", Arg::N8),       op("rst $10", Arg::None),
        op("ret c", Arg::None),         op("reti", Arg::None),          op("jp c, a16", Arg::A16),      undef(),
        op("call c, a16", Arg::A16),    undef(),                        op("sbc a, n8", Arg::N8),       op("rst $18", Arg::None),
        // 0xE0
        op("ldh [a8], a", Arg::A8),     op("pop hl", Arg::None),        op("ld [$ff00+c], a", Arg::None), undef(),
        undef(),                        op("push hl", Arg::None),       op("and a, n8", Arg::N8),       op("rst $20", Arg::None),
        op("add sp, n8", Arg::N8),      op("jp hl", Arg::None),         op("ld [a16], a", Arg::A16),    undef(),
        undef(),                        undef(),                        op("xor n8", Arg::N8),          op("rst $28", Arg::None),
        // 0xF0
        op("ldh a, [a8]", Arg::A8),     op("pop af", Arg::None),        op("ld a, [$ff00+c]", Arg::None), op("di", Arg::None),
        undef(),                        op("push af", Arg::None),       op("or n8", Arg::N8),           op("rst $30", Arg::None),
        op("ld hl, sp+n8", Arg::N8),    op("ld sp, hl", Arg::None),     op("ld a, [a16]", Arg::A16),    op("ei", Arg::None),
        undef(),                        undef(),                        op("cp n8", Arg::N8),           op("rst $38", Arg::None),
    ];

    // """
    // Upon establishing the opcode, the Z80's path of action is generally dictated by these values:

    // x = the opcode's 1st octal digit (i.e. bits 7-6)
    // y = the opcode's 2nd octal digit (i.e. bits 5-3)
    // z = the opcode's 3rd octal digit (i.e. bits 2-0)
    // """
    // https://gb-archive.github.io/salvage/decoding_gbz80_opcodes/Decoding%20Gamboy%20Z80%20Opcodes.html
    //
    // the CB page is completely regular so it's generated rather than written out

    const fn x(op: Byte) -> Byte {
        op >> 6
    }
    const fn y(op: Byte) -> Byte {
        op >> 3 & 0b111
    }
    const fn z(op: Byte) -> Byte {
        op & 0b111
    }

    const R: [&str; 8] = ["b", "c", "d", "e", "h", "l", "[hl]", "a"];
    const ROT: [&str; 8] = ["rlc", "rrc", "rl", "rr", "sla", "sra", "swap", "srl"];

    /// An entry of the CB-prefixed page, e.g. `bit 3, [hl]` is `{op: "bit", bit: Some(3), reg: "[hl]"}`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ExtOpcode {
        pub op: &'static str,
        pub bit: Option<Byte>,
        pub reg: &'static str,
    }

    impl fmt::Display for ExtOpcode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.bit {
                Some(bit) => write!(f, "{} {}, {}", self.op, bit, self.reg),
                None => write!(f, "{} {}", self.op, self.reg),
            }
        }
    }

    const fn decode_ext(op: Byte) -> ExtOpcode {
        let reg = R[z(op) as usize];
        let bit = Some(y(op));
        match x(op) {
            0 => ExtOpcode {
                op: ROT[y(op) as usize],
                bit: None,
                reg,
            },
            1 => ExtOpcode { op: "bit", bit, reg },
            2 => ExtOpcode { op: "res", bit, reg },
            _ => ExtOpcode { op: "set", bit, reg },
        }
    }

    const fn build_ext_table() -> [ExtOpcode; 256] {
        let mut table = [ExtOpcode {
            op: "",
            bit: None,
            reg: "",
        }; 256];
        let mut i = 0;
        while i < 256 {
            table[i] = decode_ext(i as Byte);
            i += 1;
        }
        table
    }

    pub static EXT_OPCODES: [ExtOpcode; 256] = build_ext_table();

    fn placeholder(opcode: Byte, note: &str) -> Instruction {
        Instruction {
            mnm: format!("db ${:02x}{}", opcode, note),
            len: 1,
        }
    }

    /// One-byte `db` line standing in for an instruction that couldn't be decoded
    pub fn placeholder_for(err: &DecodeError) -> Instruction {
        match err.kind() {
            DecodeErrorKind::UndefinedOpcode => placeholder(err.opcode(), NOTE_UNKNOWN),
            DecodeErrorKind::TruncatedInstruction => placeholder(err.opcode(), NOTE_TRUNCATED),
        }
    }

    /// Decodes the instruction at the start of `window`.
    ///
    /// At most `remaining_in_bank` bytes are read, `address` is the absolute
    /// (file offset) address of the opcode byte and only matters for relative
    /// jumps. An empty window reports a truncated `$00`.
    pub fn decode(window: &[Byte], remaining_in_bank: usize, address: u32) -> DecodeOutcome {
        let avail = window.len().min(remaining_in_bank);
        let opcode = if avail > 0 { window[0] } else { 0x00 };
        let truncated = DecodeError::TruncatedInstruction { opcode, address };
        if avail == 0 {
            return Err(truncated);
        }

        let entry = OPCODES[opcode as usize];
        let len = entry.arg.len();
        match entry.arg {
            Arg::Undefined => return Err(DecodeError::UndefinedOpcode { opcode, address }),
            // stop is always encoded as $10 $00, anything else has to be kept byte for byte
            Arg::Stop if avail < 2 || window[1] != 0x00 => {
                return Ok(placeholder(opcode, NOTE_CORRUPTED_STOP))
            }
            _ if avail < len => return Err(truncated),
            _ => (),
        }

        let args = &window[1..len];
        let mnm = match entry.arg {
            Arg::Prefix => EXT_OPCODES[args[0] as usize].to_string(),
            Arg::N8 => with_arg(entry, format!("${:02x}", args[0])),
            Arg::A8 => with_arg(entry, format!("${:04x}", combine(0xFF, args[0]))),
            Arg::E8 => {
                let end = address.saturating_add(len as u32);
                let target = resolve_relative_target(end, signed(args[0]));
                with_arg(entry, format!("${:04x}", target))
            }
            Arg::N16 | Arg::A16 => with_arg(entry, format!("${:04x}", combine(args[1], args[0]))),
            Arg::None | Arg::Stop | Arg::Undefined => String::from(entry.mnm),
        };
        Ok(Instruction {
            mnm,
            len: len as u8,
        })
    }

    fn with_arg(entry: Opcode, text: String) -> String {
        entry.mnm.replacen(entry.arg.token(), &text, 1)
    }

}

pub mod disasm {
    use crate::decode::{decode, placeholder_for};
    use crate::memory::RomImage;
    use crate::types::*;
    use log::{debug, warn};

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum UndefinedPolicy {
        /// Stop at the first undefined opcode
        Strict,
        /// Emit it as a `db` and keep going
        Lenient,
    }

    #[derive(Clone, Copy, Debug)]
    pub struct DisassemblyOptions {
        pub policy: UndefinedPolicy,
        /// Column the address comments are right-aligned to
        pub line_width: usize,
    }

    impl Default for DisassemblyOptions {
        fn default() -> Self {
            Self {
                policy: UndefinedPolicy::Lenient,
                line_width: 40,
            }
        }
    }

    /// `SECTION` directive opening a bank, bank 00 is the fixed one
    pub fn section_marker(bank: usize) -> String {
        let kind = if bank == 0 { "ROM0" } else { "ROMX" };
        format!("SECTION \"rom{}\", {}", bank, kind)
    }

    /// Pads `text` so its address comment ends at `width` (or right after the text if it doesn't fit)
    pub fn format_line(text: &str, address: u32, width: usize) -> String {
        let comment = format!(";${:04x}", address);
        let pad = width.saturating_sub(text.len() + comment.len());
        format!("{}{:pad$}{}", text, "", comment, pad = pad)
    }

    /// Disassembles the whole image into rgbds source, one section per bank.
    pub fn disassemble(rom: &RomImage, options: &DisassemblyOptions) -> Result<String, DecodeError> {
        disassemble_with(rom, decode, options)
    }

    /// Same as [`disassemble`] with a caller supplied instruction decoder
    pub fn disassemble_with<F>(
        rom: &RomImage,
        decoder: F,
        options: &DisassemblyOptions,
    ) -> Result<String, DecodeError>
    where
        F: Fn(&[Byte], usize, u32) -> DecodeOutcome,
    {
        if rom.trailing_bytes() > 0 {
            warn!(
                "{} bytes past the last whole bank are not disassembled",
                rom.trailing_bytes()
            );
        }

        let mut lines: Vec<String> = Vec::new();
        for bank in 0..rom.bank_count() {
            let range = rom.bank_range(bank);
            debug!("bank {:02x}: ${:06x}..${:06x}", bank, range.start, range.end);
            lines.push(section_marker(bank));

            let mut cursor = range.start;
            while cursor < range.end {
                let address = cursor as u32;
                let inst = if rom.is_header_byte(address) {
                    // the header is data, whatever it looks like
                    Instruction {
                        mnm: format!("db ${:02x}", rom[cursor]),
                        len: 1,
                    }
                } else {
                    match decoder(&rom[cursor..range.end], range.end - cursor, address) {
                        Ok(inst) => inst,
                        Err(err) => {
                            if err.kind() == DecodeErrorKind::UndefinedOpcode
                                && options.policy == UndefinedPolicy::Strict
                            {
                                return Err(err);
                            }
                            warn!("{}", err);
                            placeholder_for(&err)
                        }
                    }
                };
                lines.push(format_line(&inst.mnm, address, options.line_width));
                cursor += (inst.len as usize).max(1);
            }
        }
        Ok(lines.join("\n"))
    }

}

pub mod io {
    use crate::types::Byte;
    use std::{fmt::Write, fs, io, path::Path};

    pub fn read_bytes<P: AsRef<Path>>(path: P) -> io::Result<Vec<Byte>> {
        fs::read(path)
    }

    /// Classic hex dump of the first `limit` bytes (all of them if `None`)
    pub fn hex_dump(bytes: &[Byte], bytes_per_line: usize, limit: Option<usize>) -> String {
        let len = limit.unwrap_or(bytes.len()).min(bytes.len());
        let per_line = bytes_per_line.max(1);
        let mut out = String::new();
        for (i, b) in bytes[..len].iter().enumerate() {
            let _ = write!(out, "{:02X} ", b);
            if i % per_line == per_line - 1 {
                out.push('\n');
            }
        }
        out
    }

    #[test]
    fn test_hex_dump() {
        let bytes: Vec<Byte> = (0..6).collect();
        assert_eq!(hex_dump(&bytes, 4, None), "00 01 02 03 \n04 05 ");
        assert_eq!(hex_dump(&bytes, 2, Some(4)), "00 01 \n02 03 \n");
        assert_eq!(hex_dump(&bytes, 16, Some(100)), "00 01 02 03 04 05 ");
    }
}
