//! `.proto` source rendering.
//!
//! [`ProtoRenderer`] turns a decoded [`FileDescriptor`] back into `.proto`
//! text. The output layout follows what a reverse engineer expects from a
//! recovered schema: `package`, imports, top-level enums, then messages with
//! their nested types written inline. Type references are stored
//! fully-qualified in descriptors and are shortened against the enclosing
//! scope with [`resolve_type`].
//!
//! Rendering only reads the tree, so the same descriptor can be rendered any
//! number of times with identical results.

mod highlight;
mod writer;

use crate::descriptor::{EnumDescriptor, FieldDescriptor, FieldKind, FileDescriptor, MessageDescriptor, Node};
use std::borrow::Cow;
use std::fmt::Write as FmtWrite;

pub use highlight::{highlight, highlight_line, HighlightedLine, Span, SpanKind};
pub use writer::{walk_file, ProtoWriter, StatsWriter};

/// Configuration for rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Indentation unit per nesting level (default: one space)
    pub indent_str: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent_str: " ".to_string(),
        }
    }
}

impl RenderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }
}

/// Renders decoded descriptors as `.proto` text
#[derive(Debug, Clone, Default)]
pub struct ProtoRenderer {
    config: RenderConfig,
}

impl ProtoRenderer {
    /// Creates a renderer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer with custom configuration
    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Render a file descriptor as a string
    pub fn render(&self, file: &FileDescriptor) -> String {
        let mut output = String::new();
        self.write_to(file, &mut output)
            .expect("String write cannot fail");
        output
    }

    /// Write the rendered file to a writer
    pub fn write_to(&self, file: &FileDescriptor, w: &mut impl FmtWrite) -> std::fmt::Result {
        TextWriter::new(w, &self.config).write_file(file)
    }
}

/// Shorten a qualified type name relative to `package`.
///
/// Components are compared pairwise; the name is cut at the first component
/// that differs or once `package` runs out. If every component of `qualified`
/// matches, only its last component is returned.
pub fn resolve_type(qualified: &str, package: &str) -> String {
    let nodes: Vec<&str> = qualified.split('.').collect();
    let scope: Vec<&str> = package.split('.').collect();

    let mut i = 0;
    for (idx, node) in nodes.iter().enumerate() {
        i = idx;
        match scope.get(idx) {
            Some(component) if component == node => continue,
            _ => return nodes[idx..].join("."),
        }
    }
    nodes[i..].join(".")
}

struct TextWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a RenderConfig,
    indent_level: usize,
}

impl<'a, W: FmtWrite> TextWriter<'a, W> {
    fn new(writer: &'a mut W, config: &'a RenderConfig) -> Self {
        Self {
            writer,
            config,
            indent_level: 0,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn write_file(&mut self, file: &FileDescriptor) -> std::fmt::Result {
        writeln!(self.writer, "package {};", file.package)?;
        writeln!(self.writer)?;

        if !file.dependencies.is_empty() {
            for dependency in &file.dependencies {
                writeln!(self.writer, "import \"{}\";", dependency)?;
            }
            writeln!(self.writer)?;
        }

        for node in file.top_level() {
            self.write_node(node, &file.package)?;
        }

        Ok(())
    }

    fn write_node(&mut self, node: Node<'_>, scope: &str) -> std::fmt::Result {
        match node {
            Node::Field(field) => self.write_field(field, scope),
            Node::Message(message) => self.write_message(message, scope),
            Node::Enum(enum_type) => self.write_enum(enum_type),
        }
    }

    fn write_message(&mut self, message: &MessageDescriptor, scope: &str) -> std::fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "message {} {{", message.name)?;

        let inner_scope = format!("{}.{}", scope, message.name);
        self.indent();
        for child in message.children() {
            self.write_node(child, &inner_scope)?;
        }
        self.dedent();

        self.write_indent()?;
        writeln!(self.writer, "}}")?;
        writeln!(self.writer)
    }

    fn write_enum(&mut self, enum_type: &EnumDescriptor) -> std::fmt::Result {
        writeln!(self.writer)?;
        self.write_indent()?;
        writeln!(self.writer, "enum {} {{", enum_type.name)?;

        self.indent();
        for value in &enum_type.values {
            self.write_indent()?;
            writeln!(self.writer, "{} = {};", value.name, value.number)?;
        }
        self.dedent();

        self.write_indent()?;
        writeln!(self.writer, "}}")
    }

    fn write_field(&mut self, field: &FieldDescriptor, scope: &str) -> std::fmt::Result {
        self.write_indent()?;

        if let Some(label) = field.label.keyword() {
            write!(self.writer, "{} ", label)?;
        }

        write!(
            self.writer,
            "{} {} = {}",
            field_type_name(field, scope),
            field.name,
            field.number
        )?;

        if let Some(default) = &field.default_value {
            match field.kind {
                FieldKind::String => write!(self.writer, " [default = \"{}\"]", default)?,
                _ => write!(self.writer, " [default = {}]", default)?,
            }
        }

        writeln!(self.writer, ";")
    }
}

fn field_type_name<'f>(field: &'f FieldDescriptor, scope: &str) -> Cow<'f, str> {
    match (&field.type_name, field.kind.is_reference()) {
        (Some(type_name), true) => {
            let qualified = type_name.strip_prefix('.').unwrap_or(type_name);
            Cow::Owned(resolve_type(qualified, scope))
        }
        _ => Cow::Borrowed(field.kind.keyword()),
    }
}
