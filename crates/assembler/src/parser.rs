//! Parser: converts one tokenized line into a label and/or an instruction.

use crate::error::AsmError;
use crate::lexer::Token;
use blockvm_common::opcode::ALL_OPCODES;
use blockvm_common::{Instruction, Opcode};

/// What a single line contributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ParsedLine {
    pub(crate) label: Option<String>,
    pub(crate) instr: Option<Instruction>,
}

/// Look up an opcode by its mnemonic.
fn lookup_opcode(name: &str) -> Option<Opcode> {
    ALL_OPCODES.iter().copied().find(|op| op.mnemonic() == name)
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Ident(s) => s.clone(),
        Token::Number(n) => n.to_string(),
        Token::Label(name) => format!("@{name}:"),
    }
}

fn expect_word(token: &Token, line: usize) -> Result<u32, AsmError> {
    match token {
        Token::Number(n) => u32::try_from(*n).map_err(|_| AsmError::InvalidNumber {
            line,
            token: n.to_string(),
        }),
        other => Err(AsmError::UnexpectedToken {
            line,
            token: token_text(other),
        }),
    }
}

/// Parse a tokenized line. Blank lines parse to an empty [`ParsedLine`].
pub(crate) fn parse_line(tokens: &[Token], line: usize) -> Result<ParsedLine, AsmError> {
    let mut parsed = ParsedLine::default();
    let mut rest = tokens;
    if let Some((Token::Label(name), tail)) = rest.split_first() {
        parsed.label = Some(name.clone());
        rest = tail;
    }

    let Some((first, operands)) = rest.split_first() else {
        return Ok(parsed);
    };
    let name = match first {
        Token::Ident(name) => name,
        other => {
            return Err(AsmError::UnexpectedToken {
                line,
                token: token_text(other),
            })
        }
    };
    let opcode = lookup_opcode(name).ok_or_else(|| AsmError::UnknownOpcode {
        line,
        token: name.clone(),
    })?;

    let expected = opcode.operand_count();
    if operands.len() < expected {
        return Err(AsmError::MissingArgument {
            line,
            opcode: opcode.mnemonic(),
            expected,
        });
    }
    if let Some(extra) = operands.get(expected) {
        return Err(AsmError::UnexpectedToken {
            line,
            token: token_text(extra),
        });
    }

    let mut args = [0u32; 2];
    for (slot, token) in args.iter_mut().zip(operands) {
        *slot = expect_word(token, line)?;
    }
    parsed.instr = Some(Instruction { opcode, args });
    Ok(parsed)
}
