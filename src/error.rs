use std::num::ParseIntError;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::loader::Span;

// Loader errors

pub fn load_bad_literal(span: Span, src: &str, e: ParseIntError) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::bad_literal",
        help = "each instruction byte is written as 8 binary digits, like 10000010",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid byte literal: {e}",
    )
    .with_source_code(src.to_string())
}

pub fn load_wrong_width(span: Span, src: &str, found: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::wrong_width",
        help = "pad the literal with leading zeroes to exactly 8 digits",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Expected a byte literal of exactly 8 binary digits, found {found}",
    )
    .with_source_code(src.to_string())
}

pub fn load_too_long(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::too_long",
        help = "the LS-8 has 256 bytes of memory, so a program cannot exceed 256 bytes",
        labels = vec![LabeledSpan::at(span, "does not fit in memory")],
        "Program is too long to fit in memory",
    )
    .with_source_code(src.to_string())
}

// Runtime errors

pub fn run_illegal_instr(opcode: u8, pc: u8) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::illegal_instr",
        help = "check that every jump and call target lands on an instruction boundary",
        "Illegal instruction 0b{opcode:08b} at address 0x{pc:02x}",
    )
}

pub fn run_bad_register(index: u8, pc: u8) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::bad_register",
        help = "register operands must name one of R0 to R7",
        "Register index {index} out of range in instruction at address 0x{pc:02x}",
    )
}

pub fn run_step_limit(limit: u64) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::step_limit",
        help = "the program may be missing a HLT; raise the limit with `--max-steps`",
        "Execution exceeded the step limit of {limit}",
    )
}
