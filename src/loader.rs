use miette::{Result, SourceSpan};

use crate::error;
use crate::runtime::MEMORY_MAX;

/// Location within program source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: usize,
    len: usize,
}

impl Span {
    pub fn new(offs: usize, len: usize) -> Self {
        Span { offs, len }
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs.into(), value.len)
    }
}

/// An LS-8 program image, as loaded from its textual encoding.
///
/// The encoding is one instruction byte per line, written as an 8-digit
/// binary literal. A `#` starts a comment which runs to the end of the line.
/// Blank and comment-only lines are skipped without consuming an address.
#[derive(Debug)]
pub struct Program {
    bytes: Vec<u8>,
}

impl Program {
    pub fn parse(src: &str) -> Result<Program> {
        let mut bytes = Vec::new();
        let mut offs = 0;

        for line in src.split_inclusive('\n') {
            let code = match line.split_once('#') {
                Some((code, _)) => code,
                None => line,
            };
            let lit = code.trim();
            if lit.is_empty() {
                offs += line.len();
                continue;
            }

            // Offset of the literal within the full source, for diagnostics
            let lit_offs = offs + code.find(lit).unwrap_or(0);
            let span = Span::new(lit_offs, lit.len());

            if lit.len() != 8 {
                return Err(error::load_wrong_width(span, src, lit.len()));
            }
            let byte =
                u8::from_str_radix(lit, 2).map_err(|e| error::load_bad_literal(span, src, e))?;

            if bytes.len() >= MEMORY_MAX {
                return Err(error::load_too_long(span, src));
            }
            bytes.push(byte);
            offs += line.len();
        }

        Ok(Program { bytes })
    }

    /// Instruction stream, placed in memory from address 0.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
