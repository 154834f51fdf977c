use colored::Colorize;
use miette::Result;

use crate::error;
use crate::Program;

/// The LS-8 can address 256 bytes of memory.
pub const MEMORY_MAX: usize = 256;

/// Register reserved by convention as the stack pointer.
const SP: usize = 7;

/// Initial stack pointer value. The stack grows downward from here.
const STACK_INIT: u8 = 0xF4;

// Opcode bytes, as written in the instruction stream.
const LDI: u8 = 0b1000_0010;
const PRN: u8 = 0b0100_0111;
const MUL: u8 = 0b1010_0010;
const ADD: u8 = 0b1010_0000;
const PUSH: u8 = 0b0100_0101;
const POP: u8 = 0b0100_0110;
const CALL: u8 = 0b0101_0000;
const RET: u8 = 0b0001_0001;
const CMP: u8 = 0b1010_0111;
const JMP: u8 = 0b0101_0100;
const JEQ: u8 = 0b0101_0101;
const JNE: u8 = 0b0101_0110;
const HLT: u8 = 0b0000_0001;

/// Represents complete machine state during runtime.
pub struct RunState {
    /// System memory - 256 bytes in size.
    mem: [u8; MEMORY_MAX],
    /// Program counter
    pc: u8,
    /// 8x 8-bit registers, with R7 doubling as the stack pointer
    reg: [u8; 8],
    /// Equal flag. Written by CMP, read by JEQ/JNE.
    flag: bool,
    /// Set once HLT executes
    halted: bool,
}

/// One decoded instruction, operand fields included.
///
/// Register operands are validated during decode, so execution can index the
/// register file without further checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Instr {
    Ldi { dr: u8, imm: u8 },
    Prn { sr: u8 },
    Mul { dr: u8, sr: u8 },
    Add { dr: u8, sr: u8 },
    Push { sr: u8 },
    Pop { dr: u8 },
    Call { br: u8 },
    Ret,
    Cmp { sr1: u8, sr2: u8 },
    Jmp { br: u8 },
    Jeq { br: u8 },
    Jne { br: u8 },
    Hlt,
}

/// ALU operations. SUB is part of the ALU contract even though no opcode
/// currently dispatches to it.
#[derive(Clone, Copy, Debug)]
enum AluOp {
    Add,
    Sub,
    Mul,
    Cmp,
}

impl RunState {
    pub fn new() -> RunState {
        let mut reg = [0; 8];
        reg[SP] = STACK_INIT;
        RunState {
            mem: [0; MEMORY_MAX],
            pc: 0,
            reg,
            flag: false,
            halted: false,
        }
    }

    pub fn from_program(program: &Program) -> RunState {
        let mut state = RunState::new();
        // Program::parse guarantees the image fits in memory
        state.mem[..program.len()].copy_from_slice(program.bytes());
        state
    }

    pub fn pc(&self) -> u8 {
        self.pc
    }

    pub fn reg(&self, index: u8) -> u8 {
        self.reg[index as usize]
    }

    pub fn mem(&self, addr: u8) -> u8 {
        self.mem[addr as usize]
    }

    pub fn flag(&self) -> bool {
        self.flag
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Fetch and execute the instruction at PC.
    pub fn step(&mut self) -> Result<()> {
        let instr = self.decode()?;
        self.execute(instr);
        Ok(())
    }

    /// Decode the opcode at PC along with its operand bytes.
    fn decode(&self) -> Result<Instr> {
        let opcode = self.mem(self.pc);
        let instr = match opcode {
            LDI => Instr::Ldi {
                dr: self.reg_operand(1)?,
                imm: self.mem(self.pc.wrapping_add(2)),
            },
            PRN => Instr::Prn {
                sr: self.reg_operand(1)?,
            },
            MUL => Instr::Mul {
                dr: self.reg_operand(1)?,
                sr: self.reg_operand(2)?,
            },
            ADD => Instr::Add {
                dr: self.reg_operand(1)?,
                sr: self.reg_operand(2)?,
            },
            PUSH => Instr::Push {
                sr: self.reg_operand(1)?,
            },
            POP => Instr::Pop {
                dr: self.reg_operand(1)?,
            },
            CALL => Instr::Call {
                br: self.reg_operand(1)?,
            },
            RET => Instr::Ret,
            CMP => Instr::Cmp {
                sr1: self.reg_operand(1)?,
                sr2: self.reg_operand(2)?,
            },
            JMP => Instr::Jmp {
                br: self.reg_operand(1)?,
            },
            JEQ => Instr::Jeq {
                br: self.reg_operand(1)?,
            },
            JNE => Instr::Jne {
                br: self.reg_operand(1)?,
            },
            HLT => Instr::Hlt,
            _ => return Err(error::run_illegal_instr(opcode, self.pc)),
        };
        Ok(instr)
    }

    /// Read a register-index operand `offs` bytes past PC.
    fn reg_operand(&self, offs: u8) -> Result<u8> {
        let index = self.mem(self.pc.wrapping_add(offs));
        if index as usize >= self.reg.len() {
            return Err(error::run_bad_register(index, self.pc));
        }
        Ok(index)
    }

    /// Every instruction performs its own PC update: a fixed increment equal
    /// to its length, or a direct assignment for jumps, CALL and RET.
    fn execute(&mut self, instr: Instr) {
        match instr {
            Instr::Ldi { dr, imm } => {
                self.reg[dr as usize] = imm;
                self.pc = self.pc.wrapping_add(3);
            }
            Instr::Prn { sr } => {
                println!("{}", self.reg[sr as usize]);
                self.pc = self.pc.wrapping_add(2);
            }
            Instr::Mul { dr, sr } => {
                self.alu(AluOp::Mul, dr, sr);
                self.pc = self.pc.wrapping_add(3);
            }
            Instr::Add { dr, sr } => {
                self.alu(AluOp::Add, dr, sr);
                self.pc = self.pc.wrapping_add(3);
            }
            Instr::Push { sr } => {
                let val = self.reg[sr as usize];
                self.push_val(val);
                self.pc = self.pc.wrapping_add(2);
            }
            Instr::Pop { dr } => {
                let val = self.pop_val();
                self.reg[dr as usize] = val;
                self.pc = self.pc.wrapping_add(2);
            }
            Instr::Call { br } => {
                // Return address is the instruction following the CALL
                self.push_val(self.pc.wrapping_add(2));
                self.pc = self.reg[br as usize];
            }
            Instr::Ret => {
                self.pc = self.pop_val();
            }
            Instr::Cmp { sr1, sr2 } => {
                self.alu(AluOp::Cmp, sr1, sr2);
                self.pc = self.pc.wrapping_add(3);
            }
            Instr::Jmp { br } => {
                self.pc = self.reg[br as usize];
            }
            Instr::Jeq { br } => {
                if self.flag {
                    self.pc = self.reg[br as usize];
                } else {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Instr::Jne { br } => {
                if !self.flag {
                    self.pc = self.reg[br as usize];
                } else {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Instr::Hlt => {
                self.pc = self.pc.wrapping_add(1);
                self.halted = true;
            }
        }
    }

    /// Register arithmetic is 8-bit: results wrap modulo 256.
    fn alu(&mut self, op: AluOp, a: u8, b: u8) {
        let lhs = self.reg[a as usize];
        let rhs = self.reg[b as usize];
        match op {
            AluOp::Add => self.reg[a as usize] = lhs.wrapping_add(rhs),
            AluOp::Sub => self.reg[a as usize] = lhs.wrapping_sub(rhs),
            AluOp::Mul => self.reg[a as usize] = lhs.wrapping_mul(rhs),
            AluOp::Cmp => self.flag = lhs == rhs,
        }
    }

    fn push_val(&mut self, val: u8) {
        // Decrement stack
        self.reg[SP] = self.reg[SP].wrapping_sub(1);
        let sp = self.reg[SP];
        // Save onto stack
        self.mem[sp as usize] = val;
    }

    fn pop_val(&mut self) -> u8 {
        let sp = self.reg[SP];
        let val = self.mem[sp as usize];
        self.reg[SP] = sp.wrapping_add(1);
        val
    }

    /// One line of machine state in the classic LS-8 trace format: PC, the
    /// three bytes at PC, then every register, all in two-digit hex.
    pub fn trace_line(&self) -> String {
        let mut line = format!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} |",
            self.pc,
            self.mem(self.pc),
            self.mem(self.pc.wrapping_add(1)),
            self.mem(self.pc.wrapping_add(2)),
        );
        for reg in self.reg {
            line.push_str(&format!(" {:02X}", reg));
        }
        line
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives a [`RunState`] through the fetch-execute loop until HLT.
pub struct RunEnvironment {
    state: RunState,
    trace: bool,
    step_limit: Option<u64>,
}

impl RunEnvironment {
    pub fn new(program: &Program) -> RunEnvironment {
        RunEnvironment {
            state: RunState::from_program(program),
            trace: false,
            step_limit: None,
        }
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn set_step_limit(&mut self, step_limit: Option<u64>) {
        self.step_limit = step_limit;
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run with preset memory
    pub fn run(&mut self) -> Result<()> {
        let mut steps: u64 = 0;
        while !self.state.halted() {
            if let Some(limit) = self.step_limit {
                if steps >= limit {
                    return Err(error::run_step_limit(limit));
                }
            }
            if self.trace {
                let line = self.state.trace_line();
                eprintln!("{}", line.dimmed());
            }
            self.state.step()?;
            steps += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn state_with(bytes: &[u8]) -> RunState {
        let mut state = RunState::new();
        state.mem[..bytes.len()].copy_from_slice(bytes);
        state
    }

    fn run_to_halt(bytes: &[u8]) -> RunState {
        let mut state = state_with(bytes);
        while !state.halted() {
            state.step().unwrap();
        }
        state
    }

    #[test]
    fn ldi_loads_every_register_and_value() {
        for r in 0..8u8 {
            for v in 0..=255u8 {
                let state = run_to_halt(&[LDI, r, v, HLT]);
                assert_eq!(state.reg(r), v, "LDI R{r},{v}");
            }
        }
    }

    #[test]
    fn registers_and_flag_start_zeroed_except_sp() {
        let state = RunState::new();
        for r in 0..7 {
            assert_eq!(state.reg(r), 0);
        }
        assert_eq!(state.reg(7), STACK_INIT);
        assert!(!state.flag());
        assert_eq!(state.pc(), 0);
    }

    #[test]
    fn mul_multiplies_into_destination() {
        let state = run_to_halt(&[LDI, 0, 8, LDI, 1, 9, MUL, 0, 1, HLT]);
        assert_eq!(state.reg(0), 72);
        assert_eq!(state.reg(1), 9);
    }

    #[test]
    fn add_wraps_modulo_256() {
        let state = run_to_halt(&[LDI, 0, 200, LDI, 1, 100, ADD, 0, 1, HLT]);
        assert_eq!(state.reg(0), 44);
    }

    #[test]
    fn mul_wraps_modulo_256() {
        let state = run_to_halt(&[LDI, 0, 16, LDI, 1, 32, MUL, 0, 1, HLT]);
        assert_eq!(state.reg(0), 0);
    }

    #[test]
    fn sub_wraps_modulo_256() {
        // SUB has no opcode; exercise the ALU directly
        let mut state = RunState::new();
        state.reg[0] = 3;
        state.reg[1] = 5;
        state.alu(AluOp::Sub, 0, 1);
        assert_eq!(state.reg(0), 254);
    }

    #[test]
    fn cmp_sets_and_clears_flag() {
        let mut state = state_with(&[LDI, 0, 5, LDI, 1, 5, CMP, 0, 1, LDI, 1, 6, CMP, 0, 1, HLT]);
        for _ in 0..3 {
            state.step().unwrap();
        }
        assert!(state.flag());
        state.step().unwrap();
        state.step().unwrap();
        assert!(!state.flag());
    }

    #[test]
    fn jeq_falls_through_before_any_cmp() {
        // Flag starts defined as false, so JEQ must not branch
        let state = run_to_halt(&[LDI, 0, 50, JEQ, 0, HLT]);
        assert_eq!(state.pc(), 6);
    }

    #[test]
    fn jeq_branches_on_equal() {
        // R2 holds the address of the HLT at 14
        let state = run_to_halt(&[
            LDI, 0, 5, LDI, 1, 5, LDI, 2, 14, CMP, 0, 1, JEQ, 2, HLT,
        ]);
        assert!(state.halted());
        assert_eq!(state.pc(), 15);
    }

    #[test]
    fn jne_branches_on_unequal_after_jeq_falls_through() {
        // JEQ at 12 falls through to the JNE at 14, which takes the branch
        let state = run_to_halt(&[
            LDI, 0, 5, LDI, 1, 6, LDI, 2, 16, CMP, 0, 1, JEQ, 2, JNE, 2, HLT,
        ]);
        assert!(state.halted());
        assert_eq!(state.pc(), 17);
    }

    #[test]
    fn jmp_assigns_pc_from_register() {
        let state = run_to_halt(&[LDI, 0, 5, JMP, 0, HLT]);
        assert_eq!(state.pc(), 6);
    }

    #[test]
    fn push_decrements_before_writing() {
        let mut state = state_with(&[LDI, 0, 0xAB, PUSH, 0]);
        state.step().unwrap();
        state.step().unwrap();
        assert_eq!(state.reg(7), STACK_INIT - 1);
        assert_eq!(state.mem(STACK_INIT - 1), 0xAB);
    }

    #[test]
    fn stack_round_trip_restores_sp() {
        let state = run_to_halt(&[LDI, 0, 42, PUSH, 0, POP, 1, HLT]);
        assert_eq!(state.reg(1), 42);
        assert_eq!(state.reg(7), STACK_INIT);
    }

    #[test]
    fn call_pushes_following_address() {
        // Subroutine at 6 is a lone RET; HLT at 5 is the return target
        let mut state = state_with(&[LDI, 1, 6, CALL, 1, HLT, RET]);
        state.step().unwrap();
        state.step().unwrap();
        assert_eq!(state.pc(), 6);
        assert_eq!(state.mem(STACK_INIT - 1), 5);
    }

    #[test]
    fn call_ret_round_trip() {
        let state = run_to_halt(&[LDI, 1, 6, CALL, 1, HLT, RET]);
        assert!(state.halted());
        // RET resumed at the HLT, whose address was pushed by CALL
        assert_eq!(state.pc(), 6);
        assert_eq!(state.reg(7), STACK_INIT);
    }

    #[test]
    fn hlt_increments_pc_then_stops() {
        let state = run_to_halt(&[HLT]);
        assert!(state.halted());
        assert_eq!(state.pc(), 1);
    }

    #[test]
    fn illegal_opcode_is_fatal() {
        let mut state = state_with(&[0b1111_1111]);
        let err = state.step().unwrap_err();
        assert!(err.to_string().contains("Illegal instruction"));
    }

    #[test]
    fn register_operand_out_of_range_is_fatal() {
        let mut state = state_with(&[LDI, 8, 1]);
        let err = state.step().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn step_limit_stops_runaway_program() {
        // JMP R0 with R0 = 3 loops on itself forever
        let mut env = RunEnvironment {
            state: state_with(&[LDI, 0, 3, JMP, 0]),
            trace: false,
            step_limit: Some(10),
        };
        let err = env.run().unwrap_err();
        assert!(err.to_string().contains("step limit"));
    }

    #[test]
    fn trace_line_formats_hex_state() {
        let state = state_with(&[LDI, 0, 0xFF]);
        assert_eq!(
            state.trace_line(),
            "TRACE: 00 | 82 00 FF | 00 00 00 00 00 00 00 F4"
        );
    }
}
