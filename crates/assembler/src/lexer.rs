//! Tokenizer for bytecode assembly text.

use crate::error::AsmError;

/// A single token from an assembly line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// An opcode mnemonic. Always uppercase.
    Ident(String),
    /// A numeric literal (decimal or hex).
    Number(u64),
    /// `@name:`, marking the word offset of the next instruction.
    Label(String),
}

/// Tokenize a single line of assembly text.
///
/// Returns an empty Vec for blank lines and comment-only lines.
/// Comments start with `;` and extend to end of line.
pub(crate) fn tokenize_line(line: &str, line_num: usize) -> Result<Vec<Token>, AsmError> {
    let line = match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    };

    let mut tokens = Vec::new();
    for word in line.split_whitespace() {
        let token = if let Some(rest) = word.strip_prefix('@') {
            match rest.strip_suffix(':') {
                Some(name) if is_label_name(name) => Token::Label(name.to_string()),
                _ => {
                    return Err(AsmError::UnexpectedToken {
                        line: line_num,
                        token: word.to_string(),
                    })
                }
            }
        } else if let Some(hex_str) = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
            let value = u64::from_str_radix(hex_str, 16).map_err(|_| AsmError::InvalidNumber {
                line: line_num,
                token: word.to_string(),
            })?;
            Token::Number(value)
        } else if word.as_bytes().first().is_some_and(|b| b.is_ascii_digit()) {
            let value: u64 = word.parse().map_err(|_| AsmError::InvalidNumber {
                line: line_num,
                token: word.to_string(),
            })?;
            Token::Number(value)
        } else {
            Token::Ident(word.to_uppercase())
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn is_label_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
