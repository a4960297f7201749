//! Position-annotated backtraces.
//!
//! When an error unwinds past a body, its env entry is frozen into a
//! [`Frame`]: the compilation unit plus the generic-bytecode offset of the
//! instruction that was running. Rendering maps that offset through the
//! unit's position tables to a source excerpt with a caret underline.

use crate::comp::Comp;
use blockvm_common::SourceLines;
use std::io::{self, Write};
use std::rc::Rc;

/// Stacks longer than this are shortened in the middle.
const ELIDE_ABOVE: usize = 30;

/// One unwound body evaluation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub comp: Rc<Comp>,
    /// Generic-bytecode offset.
    pub pos: usize,
}

impl Frame {
    /// Source span `[start, end)` of the frame's instruction.
    pub fn span(&self) -> Option<(usize, usize)> {
        let (cs, ce) = self.comp.span(self.pos)?;
        Some((cs, ce + 1))
    }
}

/// Frames of an unwound evaluation, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Backtrace {
    pub frames: Vec<Frame>,
}

impl Backtrace {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Write every frame, most recent first.
    ///
    /// More than 30 frames print the 9 most recent, an
    /// `(N entries omitted)` line, then the 11 oldest.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        let len = self.frames.len();
        let mut i = len;
        while i > 0 {
            i -= 1;
            if len > ELIDE_ABOVE && i == len - 10 {
                writeln!(out, "({} entries omitted)", len - 20)?;
                i = 10;
            }
            write_frame(out, &self.frames[i])?;
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}

fn write_frame(out: &mut impl Write, frame: &Frame) -> io::Result<()> {
    let (Some(source), Some((cs, ce))) = (frame.comp.source.as_deref(), frame.span()) else {
        return writeln!(out, "source unknown");
    };
    let mut text = String::new();
    if text.try_reserve(source.len() * 2 + 64).is_err() {
        return write_plain(out, source, cs, ce);
    }
    text.push_str(&format_point(source, frame.comp.path.as_deref(), cs, ce));
    writeln!(out, "{text}")
}

/// A source excerpt pointing at characters `[cs, ce)`.
///
/// With a path other than `.` the excerpt is headed `path:line:` and
/// indented; otherwise it starts with `at `. The underline is clipped to
/// the line containing `cs`, and tabs before the span are kept so the
/// carets line up.
pub fn format_point(source: &str, path: Option<&str>, cs: usize, ce: usize) -> String {
    let lines = SourceLines::new(source);
    let (line_start, line_end) = lines.line_bounds(cs);
    let ce = ce.min(line_end);
    let line_number = lines.line_of(line_start) + 1;

    let mut out = match path {
        Some(p) if !p.is_empty() && p != "." => format!("{p}:{line_number}:\n  "),
        _ => "at ".to_string(),
    };
    let pad = out.chars().rev().take_while(|&c| c != '\n').count();

    out.push_str(&lines.slice(line_start, line_end));
    out.push('\n');
    out.extend(std::iter::repeat(' ').take(pad));
    for i in line_start..cs.max(line_start) {
        out.push(if lines.char_at(i) == Some('\t') { '\t' } else { ' ' });
    }
    out.extend(std::iter::repeat('^').take(ce.saturating_sub(cs)));
    out
}

/// The renderer used when the excerpt can't be built in memory; it only
/// writes straight to `out`.
fn write_plain(out: &mut impl Write, source: &str, cs: usize, ce: usize) -> io::Result<()> {
    write!(out, "at ")?;
    let chars: Vec<char> = source.chars().collect();
    let mut line_start = cs.min(chars.len());
    while line_start > 0 && chars[line_start - 1] != '\n' {
        line_start -= 1;
    }
    let mut line_end = line_start;
    while line_end < chars.len() && chars[line_end] != '\n' {
        write!(out, "{}", chars[line_end])?;
        line_end += 1;
    }
    let ce = ce.min(line_end);
    writeln!(out)?;
    for _ in 0..(cs - line_start + 3) {
        write!(out, " ")?;
    }
    for _ in cs..ce {
        write!(out, "^")?;
    }
    writeln!(out)
}
