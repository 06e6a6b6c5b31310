/// Default size of the global register file.
pub const DEFAULT_REG_COUNT: usize = 8;

/// Size of the parameter register bank.
pub const PARAM_REG_COUNT: usize = 8;

/// `RET` operand A meaning "no return value".
pub const RET_NO_VALUE: u16 = 0xFF;

/// Length of the opcode-indexed dispatch table.
pub const DISPATCH_SIZE: usize = 0x100;

/// Highest index encodable in a 16-bit operand field.
pub const MAX_OPERAND: usize = u16::max_value() as usize;
