//! Descriptor visiting.
//!
//! [`walk_file`] drives a [`ProtoWriter`] over every element of a decoded
//! tree in rendering order, so alternative outputs (statistics, indexes,
//! other formats) can reuse the same traversal as the `.proto` renderer.

use crate::descriptor::{EnumDescriptor, FieldDescriptor, FileDescriptor, MessageDescriptor, Node};
use std::fmt::Result;

/// Trait for receiving proto elements during a walk.
///
/// Every method has a no-op default, so implementors only override what
/// they care about. `scope` is the fully-qualified name of the enclosing
/// package or message.
pub trait ProtoWriter {
    /// Called once per file, before its contents
    fn write_file(&mut self, file: &FileDescriptor) -> Result {
        let _ = file;
        Ok(())
    }

    /// Called for each message, before its children
    fn write_message(&mut self, message: &MessageDescriptor, scope: &str) -> Result {
        let _ = (message, scope);
        Ok(())
    }

    /// Called for each field
    fn write_field(&mut self, field: &FieldDescriptor, scope: &str) -> Result {
        let _ = (field, scope);
        Ok(())
    }

    /// Called for each enum
    fn write_enum(&mut self, enum_type: &EnumDescriptor, scope: &str) -> Result {
        let _ = (enum_type, scope);
        Ok(())
    }
}

/// Walk `file`, handing every element to `writer`
pub fn walk_file<W: ProtoWriter + ?Sized>(file: &FileDescriptor, writer: &mut W) -> Result {
    writer.write_file(file)?;
    for node in file.top_level() {
        walk_node(node, &file.package, writer)?;
    }
    Ok(())
}

fn walk_node<W: ProtoWriter + ?Sized>(node: Node<'_>, scope: &str, writer: &mut W) -> Result {
    match node {
        Node::Field(field) => writer.write_field(field, scope),
        Node::Enum(enum_type) => writer.write_enum(enum_type, scope),
        Node::Message(message) => {
            writer.write_message(message, scope)?;
            let inner_scope = format!("{}.{}", scope, message.name);
            for child in message.children() {
                walk_node(child, &inner_scope, writer)?;
            }
            Ok(())
        }
    }
}

/// A writer that collects statistics about a proto file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsWriter {
    /// Number of messages, nested included
    pub message_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of enums, nested included
    pub enum_count: usize,
    /// Number of imports
    pub import_count: usize,
}

impl StatsWriter {
    /// Collect statistics for `file`
    pub fn collect(file: &FileDescriptor) -> Self {
        let mut stats = Self::default();
        walk_file(file, &mut stats).expect("StatsWriter cannot fail");
        stats
    }
}

impl ProtoWriter for StatsWriter {
    fn write_file(&mut self, file: &FileDescriptor) -> Result {
        self.import_count += file.dependencies.len();
        Ok(())
    }

    fn write_message(&mut self, _message: &MessageDescriptor, _scope: &str) -> Result {
        self.message_count += 1;
        Ok(())
    }

    fn write_field(&mut self, _field: &FieldDescriptor, _scope: &str) -> Result {
        self.field_count += 1;
        Ok(())
    }

    fn write_enum(&mut self, _enum_type: &EnumDescriptor, _scope: &str) -> Result {
        self.enum_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldKind, Label};

    fn field(name: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            number: 1,
            label: Label::Optional,
            kind: FieldKind::Int32,
            type_name: None,
            default_value: None,
        }
    }

    fn sample() -> FileDescriptor {
        FileDescriptor {
            name: "s.proto".to_string(),
            package: "pkg".to_string(),
            dependencies: vec!["a.proto".to_string()],
            enum_types: vec![EnumDescriptor::default()],
            message_types: vec![MessageDescriptor {
                name: "Outer".to_string(),
                nested_messages: vec![MessageDescriptor {
                    name: "Inner".to_string(),
                    fields: vec![field("x")],
                    ..Default::default()
                }],
                nested_enums: vec![EnumDescriptor::default()],
                fields: vec![field("y"), field("z")],
            }],
        }
    }

    #[test]
    fn test_stats_writer() {
        let stats = StatsWriter::collect(&sample());
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.field_count, 3);
        assert_eq!(stats.enum_count, 2);
        assert_eq!(stats.import_count, 1);
    }

    #[test]
    fn test_walk_scopes() {
        #[derive(Default)]
        struct Scopes(Vec<String>);

        impl ProtoWriter for Scopes {
            fn write_field(&mut self, field: &FieldDescriptor, scope: &str) -> Result {
                self.0.push(format!("{}.{}", scope, field.name));
                Ok(())
            }
        }

        let mut scopes = Scopes::default();
        walk_file(&sample(), &mut scopes).unwrap();
        assert_eq!(scopes.0, vec!["pkg.Outer.Inner.x", "pkg.Outer.y", "pkg.Outer.z"]);
    }
}
