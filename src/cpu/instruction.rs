//! The 6-byte fixed-width instruction format: one opcode byte followed by
//! five operand bytes, interpreted according to the opcode.

use crate::error::SystemCode;

/// Width of every instruction, in bytes. SWIs that must retry rewind `pc`
/// by exactly this many bytes (§5, §9).
pub const INSTRUCTION_WIDTH: u32 = crate::config::INSTRUCTION_WIDTH;

/// The closed set of opcodes, numbered exactly as the assembler expects
/// (§6). A dense dispatch table indexed by this discriminant replaces the
/// dynamic dispatch-by-string-name the original source used (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Adr = 0,
    Mov = 1,
    Str = 2,
    Strb = 3,
    Ldr = 4,
    Ldrb = 5,
    Bx = 6,
    B = 7,
    Bne = 8,
    Bgt = 9,
    Blt = 10,
    Beq = 11,
    Cmp = 12,
    And = 13,
    Orr = 14,
    Eor = 15,
    Add = 16,
    Sub = 17,
    Mul = 18,
    Div = 19,
    Swi = 20,
    Bl = 21,
    Mvi = 22,
}

impl TryFrom<u8> for Opcode {
    type Error = SystemCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match value {
            0 => Adr,
            1 => Mov,
            2 => Str,
            3 => Strb,
            4 => Ldr,
            5 => Ldrb,
            6 => Bx,
            7 => B,
            8 => Bne,
            9 => Bgt,
            10 => Blt,
            11 => Beq,
            12 => Cmp,
            13 => And,
            14 => Orr,
            15 => Eor,
            16 => Add,
            17 => Sub,
            18 => Mul,
            19 => Div,
            20 => Swi,
            21 => Bl,
            22 => Mvi,
            _ => return Err(SystemCode::InvalidArgs),
        })
    }
}

/// A decoded instruction: the opcode plus its raw 5 operand bytes.
///
/// Operand layout depends on the opcode, not on a fixed schema: 3-register
/// arithmetic reads bytes 0,1,2 as register indices; `MVI`/`ADR` read byte
/// 0 as a register and bytes 1..5 as a little-endian `u32`; branches read
/// bytes 0..4 as a `u32` offset/address directly. The interpreter picks
/// the right accessor per opcode.
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub opcode: Opcode,
    operands: [u8; 5],
}

impl Instruction {
    /// Decode a 6-byte instruction word.
    pub fn decode(bytes: &[u8; 6]) -> Result<Self, SystemCode> {
        let opcode = Opcode::try_from(bytes[0])?;
        let mut operands = [0u8; 5];
        operands.copy_from_slice(&bytes[1..6]);
        Ok(Instruction { opcode, operands })
    }

    /// Operand byte `i` interpreted as a register index.
    pub fn reg(&self, i: usize) -> usize {
        self.operands[i] as usize
    }

    /// Four operand bytes starting at `start`, as a little-endian `u32`.
    pub fn u32_at(&self, start: usize) -> u32 {
        u32::from_le_bytes([
            self.operands[start],
            self.operands[start + 1],
            self.operands[start + 2],
            self.operands[start + 3],
        ])
    }

    /// Operand byte 0, used by `SWI n`.
    pub fn swi_code(&self) -> u16 {
        self.operands[0] as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_opcode_and_registers() {
        let raw = [16u8, 0, 1, 2, 0, 0]; // ADD R0 R1 R2
        let insn = Instruction::decode(&raw).unwrap();
        assert_eq!(insn.opcode, Opcode::Add);
        assert_eq!(insn.reg(0), 0);
        assert_eq!(insn.reg(1), 1);
        assert_eq!(insn.reg(2), 2);
    }

    #[test]
    fn decodes_immediate_after_leading_register_byte() {
        let raw = [22u8, 0, 0x2a, 0x00, 0x00, 0x00]; // MVI R0, 42
        let insn = Instruction::decode(&raw).unwrap();
        assert_eq!(insn.opcode, Opcode::Mvi);
        assert_eq!(insn.reg(0), 0);
        assert_eq!(insn.u32_at(1), 42);
    }

    #[test]
    fn decodes_branch_address_with_no_leading_register() {
        let raw = [7u8, 0x10, 0x00, 0x00, 0x00, 0]; // B 16
        let insn = Instruction::decode(&raw).unwrap();
        assert_eq!(insn.u32_at(0), 16);
    }

    #[test]
    fn rejects_unknown_opcode() {
        let raw = [200u8, 0, 0, 0, 0, 0];
        assert_eq!(Instruction::decode(&raw).unwrap_err(), SystemCode::InvalidArgs);
    }
}
