// SPDX-License-Identifier: MIT OR Apache-2.0
//! KeyValues text writer.

use crate::{KeyValues, Value};
use std::fmt::{self, Write};

/// Render a section as indented KeyValues text
pub fn to_string_pretty(kv: &KeyValues) -> String {
    kv.to_string()
}

pub(crate) fn write_section<W: Write>(out: &mut W, kv: &KeyValues, depth: usize) -> fmt::Result {
    for (key, value) in kv.iter() {
        indent(out, depth)?;
        write_quoted(out, key)?;
        match value {
            Value::String(s) => {
                out.write_str("\t\t")?;
                write_quoted(out, s)?;
                out.write_char('\n')?;
            }
            Value::Section(section) => {
                out.write_char('\n')?;
                indent(out, depth)?;
                out.write_str("{\n")?;
                write_section(out, section, depth + 1)?;
                indent(out, depth)?;
                out.write_str("}\n")?;
            }
        }
    }
    Ok(())
}

fn indent<W: Write>(out: &mut W, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        out.write_char('\t')?;
    }
    Ok(())
}

fn write_quoted<W: Write>(out: &mut W, text: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in text.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\t' => out.write_str("\\t")?,
            '\r' => out.write_str("\\r")?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}
