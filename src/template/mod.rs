//! Text templates.
//!
//! A small logic-bearing template language in the `{{ }}` family. Templates
//! are parsed once into a node tree and executed many times against a
//! [`Parameters`] set.
//!
//! ```text
//! Hello {{.Name}}!
//! {{if .Admin}}(admin){{else}}(user){{end}}
//! {{range .Tags}}#{{.}} {{end}}
//! {{- /* trims whitespace on the left */ -}}
//! {{ join .Tags ", " | print "tags: " }}
//! ```
//!
//! Builtins: `and`, `eq`, `index`, `join`, `len`, `ne`, `not`, `or`, `print`.
//! Referencing a parameter that is not present fails execution.

pub mod error;
mod exec;
mod lexer;
mod parser;

use std::fmt;

pub use error::{RenderError, SyntaxError};
pub use parser::MAX_NESTING_DEPTH;

use crate::cache::Compiler;
use crate::domain::Parameters;
use parser::Node;

/// A parsed template, ready to execute.
#[derive(Clone)]
pub struct Template {
    name: String,
    source: String,
    root: Vec<Node>,
}

impl Template {
    pub fn parse(name: &str, source: &str) -> Result<Self, SyntaxError> {
        let tokens = lexer::lex(name, source)?;
        let root = parser::parse(name, tokens)?;
        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            root,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The text this template was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn execute(&self, params: &Parameters) -> Result<String, RenderError> {
        exec::execute(&self.name, &self.root, params)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("source_len", &self.source.len())
            .finish()
    }
}

/// Compiles stored bytes into [`Template`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEngine;

impl Compiler for TemplateEngine {
    type Artifact = Template;
    type Error = SyntaxError;

    fn compile(&self, name: &str, source: &[u8]) -> Result<Template, SyntaxError> {
        let text = std::str::from_utf8(source).map_err(|e| {
            let line = 1 + source[..e.valid_up_to()]
                .iter()
                .filter(|&&b| b == b'\n')
                .count();
            SyntaxError::new(name, line, "template source is not valid UTF-8")
        })?;
        Template::parse(name, text)
    }
}
