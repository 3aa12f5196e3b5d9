//! Command-line construction for external tools.
//!
//! A [`CommandLine`] keeps discrete arguments so the process runner can exec
//! with an argument vector. Its `Display` form shell-escapes every value and
//! is only used for logs and diagnostics.

use std::fmt;

use serde_json::Value;

use crate::config::Options;
use crate::error::{PdfError, Result};

/// One argument of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// A flag or keyword the builder produced itself (`--quiet`, `toc`, `-`).
    Literal(String),
    /// A caller-supplied value; always quoted in the display form.
    Value(String),
}

impl Arg {
    pub fn as_str(&self) -> &str {
        match self {
            Arg::Literal(s) | Arg::Value(s) => s,
        }
    }
}

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<Arg>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Arguments as plain strings, ready for exec.
    pub fn argv(&self) -> Vec<&str> {
        self.args.iter().map(Arg::as_str).collect()
    }

    pub fn literal(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(Arg::Literal(arg.into()));
        self
    }

    pub fn value(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(Arg::Value(arg.into()));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            match arg {
                Arg::Literal(s) => write!(f, " {s}")?,
                Arg::Value(s) => write!(f, " {}", shell_quote(s))?,
            }
        }
        Ok(())
    }
}

/// Quote a string for a POSIX shell: wrap in single quotes and splice
/// embedded single quotes as `'\''`.
pub fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Whether an option value is "empty" and therefore left off the command line.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty() || s == "0",
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Turns an option map into `--flag 'value'` arguments.
///
/// - `true` emits a bare `--key`
/// - a scalar emits `--key 'value'`
/// - a map emits `--key 'subkey' 'subvalue'` per entry
/// - a list emits `--key 'item'` per item
/// - `cover` and `toc` open positional sub-blocks with their own options
#[derive(Debug)]
pub struct CommandBuilder {
    line: CommandLine,
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            line: CommandLine::new(program),
        }
    }

    /// Append every non-empty option, in map order.
    pub fn options(mut self, options: &Options) -> Result<Self> {
        for (key, value) in options {
            self.option(key, value)?;
        }
        Ok(self)
    }

    /// Append a single option; empty values are skipped.
    pub fn option(&mut self, key: &str, value: &Value) -> Result<&mut Self> {
        if is_empty_value(value) {
            return Ok(self);
        }
        match (key, value) {
            ("toc", Value::Bool(true)) => {
                self.line.literal("toc");
            }
            ("toc", Value::Object(sub)) => {
                self.line.literal("toc");
                for (k, v) in sub {
                    self.option(k, v)?;
                }
            }
            ("cover", Value::Object(sub)) => {
                let url = sub
                    .get("url")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        PdfError::config("the url for the cover is missing, use the \"url\" key")
                    })?;
                self.line.literal("cover");
                self.line.value(scalar(key, url)?);
                for (k, v) in sub.iter().filter(|(k, _)| k.as_str() != "url") {
                    self.option(k, v)?;
                }
            }
            ("cover", v) => {
                self.line.literal("cover");
                self.line.value(scalar(key, v)?);
            }
            (_, Value::Bool(true)) => {
                self.line.literal(format!("--{key}"));
            }
            (_, Value::Object(pairs)) => {
                for (k, v) in pairs {
                    self.line.literal(format!("--{key}"));
                    self.line.value(k.clone());
                    self.line.value(scalar(key, v)?);
                }
            }
            (_, Value::Array(items)) => {
                for item in items {
                    self.line.literal(format!("--{key}"));
                    self.line.value(scalar(key, item)?);
                }
            }
            (_, v) => {
                self.line.literal(format!("--{key}"));
                self.line.value(scalar(key, v)?);
            }
        }
        Ok(self)
    }

    pub fn literal(&mut self, arg: impl Into<String>) -> &mut Self {
        self.line.literal(arg);
        self
    }

    pub fn value(&mut self, arg: impl Into<String>) -> &mut Self {
        self.line.value(arg);
        self
    }

    pub fn build(self) -> CommandLine {
        self.line
    }
}

fn scalar(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "1" } else { "" }.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(PdfError::config(format!(
            "option `{key}` nests too deeply for a command-line value"
        ))),
    }
}
