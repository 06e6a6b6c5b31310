use num::traits::{FromPrimitive, ToPrimitive};
use num_derive::{FromPrimitive, ToPrimitive};
use util::EnumParseError;

/// Instruction set of the virtual machine.
///
/// Every instruction is a fixed-shape record: one opcode byte plus the three
/// operand fields A, B and C (16 bits each in the program image). The
/// meaning of A/B/C is opcode-specific and listed per variant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, FromPrimitive, ToPrimitive)]
pub enum Opcode {
    //  Mnemonic     | Operands             | Effect
    //---------------+----------------------+--------------------------------------------------
    // Data & arithmetic (global registers)
    LOADC = 0x01,    // | A=reg, B=const      | regs[A] = pool[B]
    LOADL = 0x02,    // | A=reg, B=local      | regs[A] = locals[B]
    STOREL = 0x03,   // | A=local, B=reg      | locals[A] = regs[B]
    MOV = 0x04,      // | A=dst, B=src        | regs[A] = regs[B]
    ADD = 0x05,      // | A=dst, B, C         | regs[A] = regs[B] + regs[C]
    SUB = 0x06,      // | A=dst, B, C         | regs[A] = regs[B] - regs[C]
    MUL = 0x07,      // | A=dst, B, C         | regs[A] = regs[B] * regs[C]
    DIV = 0x08,      // | A=dst, B, C         | regs[A] = regs[B] / regs[C]
    NEG = 0x09,      // | A=dst, B=src        | regs[A] = -regs[B]
    CMP = 0x0A,      // | A=dst, B, C         | regs[A] = -1 / 0 / +1
    NOT = 0x0B,      // | A=dst, B=src        | regs[A] = !bool(regs[B])
    AND = 0x0C,      // | A=dst, B, C         | regs[A] = bool(regs[B]) && bool(regs[C])
    OR = 0x0D,       // | A=dst, B, C         | regs[A] = bool(regs[B]) || bool(regs[C])

    // Control flow
    JMP = 0x10,      // | A=target            | pc = A
    JZ = 0x11,       // | A=cond reg, B=target| pc = B if regs[A] == 0
    JNZ = 0x12,      // | A=cond reg, B=target| pc = B if regs[A] != 0
    JL = 0x13,       // | A=cond reg, B=target| pc = B if regs[A] < 0
    JG = 0x14,       // | A=cond reg, B=target| pc = B if regs[A] > 0
    JLZ = 0x15,      // | A=cond local, B     | local-register variant of JZ
    JLNZ = 0x16,     // | A=cond local, B     | local-register variant of JNZ
    JLL = 0x17,      // | A=cond local, B     | local-register variant of JL
    JLG = 0x18,      // | A=cond local, B     | local-register variant of JG

    // Function call & stack
    CALL = 0x20,     // | A=pc, B=argc, C=locals | push frame, marshal args, jump
    RET = 0x21,      // | A=local or 0xFF     | params[0] = locals[A], pop frame
    ENTER = 0x22,    // | B=argc, C=locals    | push a bare frame
    LEAVE = 0x23,    // | —                   | pop the current frame

    // Array & memory
    NEWARR = 0x30,   // | A=dst, C=len        | regs[A] = array of C empty values
    LOADARR = 0x31,  // | A=dst, B=arr, C=idx | regs[A] = regs[B][regs[C]]
    STOREARR = 0x32, // | A=arr, B=idx, C=val | regs[A][regs[B]] = regs[C]
    LEN = 0x33,      // | A=dst, B=arr        | regs[A] = len(regs[B])
    FREE = 0x34,     // | A=reg               | alias of RAIIDROP

    // Misc
    NOP = 0x50,      // | —                   | does nothing
    PRINT = 0x51,    // | A=reg, B=bank       | print the value to stdout
    HALT = 0x52,     // | —                   | stop execution
    LOADP = 0x53,    // | A=param, B=reg      | params[A] = regs[B]
    LOADLP = 0x54,   // | A=param, B=local    | params[A] = locals[B]

    // Ownership & borrowing
    OWN = 0x60,      // | A=dst, B=src        | owned copy, refcount reset to 1
    MOVE = 0x61,     // | A=dst, B=src        | relocate, src is cleared
    VIEW = 0x62,     // | A=dst, B=src        | shared view, refcount +1 on both
    EDIT = 0x63,     // | A=dst, B=src        | exclusive promotion, fails if shared
    CLONE = 0x64,    // | A=dst, B=src        | deep copy, refcount reset to 1
    DROP = 0x65,     // | A=reg               | decrement refcount, clear at zero

    // Refcount & safety (legacy aliases kept for image compatibility)
    INCREF = 0x70,   // | A=dst, B=src        | alias of VIEW
    DECREF = 0x71,   // | A=reg               | alias of RAIIDROP
    CHECKEXCL = 0x72,// | A=dst, B=src        | alias of EDIT
    CHECKLIVE = 0x73,// | A=dst, B=src        | alias of VIEW
    RAIIDROP = 0x74, // | A=reg               | deterministic drop at scope exit

    // Local arithmetic family (same contracts, frame locals instead of globals)
    ADDL = 0x80,     // | A=dst, B, C         |
    SUBL = 0x81,     // | A=dst, B, C         |
    MULL = 0x82,     // | A=dst, B, C         |
    DIVL = 0x83,     // | A=dst, B, C         |
    NEGL = 0x84,     // | A=dst, B=src        |
    CMPL = 0x85,     // | A=dst, B, C         |
    NOTL = 0x86,     // | A=dst, B=src        |
    ANDL = 0x87,     // | A=dst, B, C         |
    ORL = 0x88,      // | A=dst, B, C         |
    MOVL = 0x89,     // | A=dst, B=src        |
    LOADCL = 0x8A,   // | A=local, B=const    | locals[A] = pool[B]
    LOADARG = 0x8B,  // | A=local, B=arg      | locals[A] = frame.args[B]
}

/// Register bank addressed by the one-letter selector after `%`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum Bank {
    /// `%rN` — the global register file.
    Global = 0,
    /// `%lN` — the current frame's locals.
    Local = 1,
    /// `%aN` — incoming arguments of the current call.
    Arg = 2,
    /// `%pN` — the VM-wide parameter bank.
    Param = 3,
}

impl Bank {
    pub fn from_selector(selector: char) -> Option<Bank> {
        match selector {
            'r' => Some(Bank::Global),
            'l' => Some(Bank::Local),
            'a' => Some(Bank::Arg),
            'p' => Some(Bank::Param),
            _ => None,
        }
    }

    pub fn selector(self) -> char {
        match self {
            Bank::Global => 'r',
            Bank::Local => 'l',
            Bank::Arg => 'a',
            Bank::Param => 'p',
        }
    }

    pub fn from_code(code: u16) -> Option<Bank> {
        Bank::from_u16(code)
    }

    pub fn code(self) -> u16 {
        enum_to_u16(self)
    }
}

/// One decoded instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub a: u16,
    pub b: u16,
    pub c: u16,
}

#[inline]
pub fn make_instruction(opcode: Opcode, a: u16, b: u16, c: u16) -> Instruction {
    Instruction { opcode, a, b, c }
}

/// Constructs an [`Instruction`](struct.Instruction.html); unset operand
/// fields default to zero.
#[macro_export]
macro_rules! instr {
    ($opcode:ident) => {
        $crate::ops::make_instruction($crate::ops::Opcode::$opcode, 0, 0, 0)
    };
    ($opcode:ident, $a:expr) => {
        $crate::ops::make_instruction($crate::ops::Opcode::$opcode, $a, 0, 0)
    };
    ($opcode:ident, $a:expr, $b:expr) => {
        $crate::ops::make_instruction($crate::ops::Opcode::$opcode, $a, $b, 0)
    };
    ($opcode:ident, $a:expr, $b:expr, $c:expr) => {
        $crate::ops::make_instruction($crate::ops::Opcode::$opcode, $a, $b, $c)
    };
}

#[inline]
fn enum_to_u16<T: ToPrimitive + Copy>(val: T) -> u16 {
    val.to_u16().unwrap()
}

impl Opcode {
    /// Decodes an opcode byte from the wire.
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Opcode::from_u8(byte)
    }

    /// Encodes the opcode as its wire byte.
    #[inline]
    pub fn byte(self) -> u8 {
        self.to_u8().unwrap()
    }

    /// True for the opcodes whose resolved jump target lives in field B
    /// (conditional jumps); `JMP` and `CALL` carry theirs in field A.
    pub fn target_in_b(self) -> bool {
        match self {
            Opcode::JZ
            | Opcode::JNZ
            | Opcode::JL
            | Opcode::JG
            | Opcode::JLZ
            | Opcode::JLNZ
            | Opcode::JLL
            | Opcode::JLG => true,
            _ => false,
        }
    }

    /// True for every opcode that takes a symbolic jump/call target.
    pub fn takes_target(self) -> bool {
        match self {
            Opcode::JMP | Opcode::CALL => true,
            other => other.target_in_b(),
        }
    }
}

macro_rules! impl_enum_display {
    ($e:ty) => {
        impl std::fmt::Display for $e {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Debug::fmt(self, f)
            }
        }
    };
}

impl_enum_display!(Opcode);
impl_enum_display!(Bank);

macro_rules! impl_enum_from_str {
    ($e:ident as $what:expr, { $( $name:ident ),* $(,)* }) => {
        impl std::str::FromStr for $e {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( stringify!($name) => Ok($e::$name), )*
                    _ => Err(EnumParseError::new(s, $what)),
                }
            }
        }
    };
}

// The assembler-facing mnemonic table. The legacy refcount aliases
// (INCREF/DECREF/CHECKEXCL/CHECKLIVE) are decodable from images but not
// assemblable.
impl_enum_from_str!(Opcode as "mnemonic", {
    LOADC, LOADCL, LOADL, STOREL, MOV, MOVL,
    ADD, ADDL, SUB, SUBL, MUL, MULL, DIV, DIVL,
    NEG, NEGL, CMP, CMPL, NOT, NOTL, AND, ANDL, OR, ORL,
    LEN, NEWARR, LOADARR, STOREARR, FREE,
    JMP, JZ, JNZ, JL, JG, JLZ, JLNZ, JLL, JLG,
    CALL, RET, ENTER, LEAVE,
    LOADP, LOADLP, LOADARG,
    OWN, MOVE, VIEW, EDIT, CLONE, DROP, RAIIDROP,
    NOP, PRINT, HALT,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_byte_round_trip() {
        for &op in &[
            Opcode::LOADC,
            Opcode::JMP,
            Opcode::CALL,
            Opcode::NEWARR,
            Opcode::OWN,
            Opcode::RAIIDROP,
            Opcode::LOADARG,
        ] {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op));
        }
    }

    #[test]
    fn unknown_opcode_byte() {
        assert_eq!(Opcode::from_byte(0xFE), None);
        assert_eq!(Opcode::from_byte(0x00), None);
    }

    #[test]
    fn mnemonic_parsing() {
        assert_eq!("LOADC".parse(), Ok(Opcode::LOADC));
        assert_eq!("JLNZ".parse(), Ok(Opcode::JLNZ));
        assert_eq!("RAIIDROP".parse(), Ok(Opcode::RAIIDROP));
        assert!("INCREF".parse::<Opcode>().is_err());
        assert!("loadc".parse::<Opcode>().is_err());
    }

    #[test]
    fn target_fields() {
        assert!(!Opcode::JMP.target_in_b());
        assert!(!Opcode::CALL.target_in_b());
        assert!(Opcode::JZ.target_in_b());
        assert!(Opcode::JLG.target_in_b());
        assert!(Opcode::CALL.takes_target());
        assert!(!Opcode::ADD.takes_target());
    }

    #[test]
    fn bank_selectors() {
        assert_eq!(Bank::from_selector('r'), Some(Bank::Global));
        assert_eq!(Bank::from_selector('p'), Some(Bank::Param));
        assert_eq!(Bank::from_selector('x'), None);
        assert_eq!(Bank::from_code(1), Some(Bank::Local));
        assert_eq!(Bank::Arg.code(), 2);
    }
}
