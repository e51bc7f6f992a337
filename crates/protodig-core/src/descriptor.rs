//! Decoded descriptor model.
//!
//! A trimmed, immutable view of `FileDescriptorProto` holding only what the
//! renderer needs. Trees are built once from the `prost-types` decode and
//! are never modified afterwards.

use prost_types::{
    field_descriptor_proto, DescriptorProto, EnumDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto,
};
use tracing::trace;

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// `optional`
    Optional,
    /// `required`
    Required,
    /// `repeated`
    Repeated,
    /// Label value 0 or any other value outside the enum
    Unset,
}

impl Label {
    /// Maps the raw `label` field. An absent label is `Optional`.
    pub fn from_raw(raw: Option<i32>) -> Self {
        let Some(raw) = raw else {
            return Label::Optional;
        };
        match field_descriptor_proto::Label::try_from(raw) {
            Ok(field_descriptor_proto::Label::Optional) => Label::Optional,
            Ok(field_descriptor_proto::Label::Required) => Label::Required,
            Ok(field_descriptor_proto::Label::Repeated) => Label::Repeated,
            Err(_) => Label::Unset,
        }
    }

    /// The `.proto` keyword, `None` for [`Label::Unset`]
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Label::Optional => Some("optional"),
            Label::Required => Some("required"),
            Label::Repeated => Some("repeated"),
            Label::Unset => None,
        }
    }
}

/// Field value kind, one per `FieldDescriptorProto.Type`
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl FieldKind {
    /// Maps the raw `type` field, `None` if absent or unknown
    pub fn from_raw(raw: Option<i32>) -> Option<Self> {
        use field_descriptor_proto::Type;

        let kind = match Type::try_from(raw?).ok()? {
            Type::Double => FieldKind::Double,
            Type::Float => FieldKind::Float,
            Type::Int64 => FieldKind::Int64,
            Type::Uint64 => FieldKind::Uint64,
            Type::Int32 => FieldKind::Int32,
            Type::Fixed64 => FieldKind::Fixed64,
            Type::Fixed32 => FieldKind::Fixed32,
            Type::Bool => FieldKind::Bool,
            Type::String => FieldKind::String,
            Type::Group => FieldKind::Group,
            Type::Message => FieldKind::Message,
            Type::Bytes => FieldKind::Bytes,
            Type::Uint32 => FieldKind::Uint32,
            Type::Enum => FieldKind::Enum,
            Type::Sfixed32 => FieldKind::Sfixed32,
            Type::Sfixed64 => FieldKind::Sfixed64,
            Type::Sint32 => FieldKind::Sint32,
            Type::Sint64 => FieldKind::Sint64,
        };
        Some(kind)
    }

    /// The `.proto` keyword for this kind
    pub fn keyword(&self) -> &'static str {
        match self {
            FieldKind::Double => "double",
            FieldKind::Float => "float",
            FieldKind::Int64 => "int64",
            FieldKind::Uint64 => "uint64",
            FieldKind::Int32 => "int32",
            FieldKind::Fixed64 => "fixed64",
            FieldKind::Fixed32 => "fixed32",
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Group => "group",
            FieldKind::Message => "message",
            FieldKind::Bytes => "bytes",
            FieldKind::Uint32 => "uint32",
            FieldKind::Enum => "enum",
            FieldKind::Sfixed32 => "sfixed32",
            FieldKind::Sfixed64 => "sfixed64",
            FieldKind::Sint32 => "sint32",
            FieldKind::Sint64 => "sint64",
        }
    }

    /// Whether fields of this kind reference another type by name
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Message | FieldKind::Enum)
    }
}

/// A message field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Field number
    pub number: i32,
    /// Cardinality
    pub label: Label,
    /// Value kind
    pub kind: FieldKind,
    /// Fully-qualified type name, only for message and enum kinds
    pub type_name: Option<String>,
    /// Default value text as stored in the descriptor
    pub default_value: Option<String>,
}

/// A named enum constant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    /// Constant name
    pub name: String,
    /// Constant value
    pub number: i32,
}

/// An enum definition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumDescriptor {
    /// Enum name
    pub name: String,
    /// Constants in declaration order
    pub values: Vec<EnumValue>,
}

/// A message definition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageDescriptor {
    /// Message name
    pub name: String,
    /// Nested message definitions
    pub nested_messages: Vec<MessageDescriptor>,
    /// Nested enum definitions
    pub nested_enums: Vec<EnumDescriptor>,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
}

/// A whole `.proto` file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileDescriptor {
    /// File name, e.g. `google/protobuf/any.proto`
    pub name: String,
    /// Package, possibly empty
    pub package: String,
    /// Imported file names in order
    pub dependencies: Vec<String>,
    /// Top-level messages
    pub message_types: Vec<MessageDescriptor>,
    /// Top-level enums
    pub enum_types: Vec<EnumDescriptor>,
}

/// A reference to one element of a descriptor tree
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node<'a> {
    Field(&'a FieldDescriptor),
    Message(&'a MessageDescriptor),
    Enum(&'a EnumDescriptor),
}

impl MessageDescriptor {
    /// Children in declaration order: nested messages, nested enums, fields
    pub fn children(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        self.nested_messages
            .iter()
            .map(Node::Message)
            .chain(self.nested_enums.iter().map(Node::Enum))
            .chain(self.fields.iter().map(Node::Field))
    }
}

impl FileDescriptor {
    /// Top-level definitions in declaration order: enums, then messages
    pub fn top_level(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        self.enum_types
            .iter()
            .map(Node::Enum)
            .chain(self.message_types.iter().map(Node::Message))
    }
}

impl From<&FileDescriptorProto> for FileDescriptor {
    fn from(proto: &FileDescriptorProto) -> Self {
        Self {
            name: proto.name().to_string(),
            package: proto.package().to_string(),
            dependencies: proto.dependency.clone(),
            message_types: proto.message_type.iter().map(Into::into).collect(),
            enum_types: proto.enum_type.iter().map(Into::into).collect(),
        }
    }
}

impl From<&DescriptorProto> for MessageDescriptor {
    fn from(proto: &DescriptorProto) -> Self {
        Self {
            name: proto.name().to_string(),
            nested_messages: proto.nested_type.iter().map(Into::into).collect(),
            nested_enums: proto.enum_type.iter().map(Into::into).collect(),
            fields: proto
                .field
                .iter()
                .filter_map(|field| {
                    let converted = FieldDescriptor::from_proto(field);
                    if converted.is_none() {
                        trace!(
                            "Dropping field '{}' of '{}' with unknown type {:?}",
                            field.name(),
                            proto.name(),
                            field.r#type
                        );
                    }
                    converted
                })
                .collect(),
        }
    }
}

impl From<&EnumDescriptorProto> for EnumDescriptor {
    fn from(proto: &EnumDescriptorProto) -> Self {
        Self {
            name: proto.name().to_string(),
            values: proto
                .value
                .iter()
                .map(|value| EnumValue {
                    name: value.name().to_string(),
                    number: value.number(),
                })
                .collect(),
        }
    }
}

impl FieldDescriptor {
    /// Converts a decoded field, `None` if its type is absent or unknown
    pub fn from_proto(proto: &FieldDescriptorProto) -> Option<Self> {
        let kind = FieldKind::from_raw(proto.r#type)?;
        Some(Self {
            name: proto.name().to_string(),
            number: proto.number(),
            label: Label::from_raw(proto.label),
            kind,
            type_name: if kind.is_reference() {
                proto.type_name.clone()
            } else {
                None
            },
            default_value: proto.default_value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, r#type: Option<i32>, label: Option<i32>) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(1),
            r#type,
            label,
            type_name: Some(".pkg.Other".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_label_from_raw() {
        assert_eq!(Label::from_raw(None), Label::Optional);
        assert_eq!(Label::from_raw(Some(1)), Label::Optional);
        assert_eq!(Label::from_raw(Some(2)), Label::Required);
        assert_eq!(Label::from_raw(Some(3)), Label::Repeated);
        assert_eq!(Label::from_raw(Some(0)), Label::Unset);
        assert_eq!(Label::from_raw(Some(9)), Label::Unset);
        assert_eq!(Label::Unset.keyword(), None);
    }

    #[test]
    fn test_field_kind_covers_all_types() {
        let kinds: Vec<_> = (1..=18).filter_map(|t| FieldKind::from_raw(Some(t))).collect();
        assert_eq!(kinds.len(), 18);
        assert_eq!(FieldKind::from_raw(Some(9)), Some(FieldKind::String));
        assert_eq!(FieldKind::from_raw(Some(0)), None);
        assert_eq!(FieldKind::from_raw(None), None);
        assert_eq!(FieldKind::Sfixed64.keyword(), "sfixed64");
    }

    #[test]
    fn test_type_name_kept_only_for_references() {
        let scalar = FieldDescriptor::from_proto(&field("a", Some(5), Some(1))).unwrap();
        assert_eq!(scalar.kind, FieldKind::Int32);
        assert_eq!(scalar.type_name, None);

        let message = FieldDescriptor::from_proto(&field("b", Some(11), Some(3))).unwrap();
        assert_eq!(message.label, Label::Repeated);
        assert_eq!(message.type_name.as_deref(), Some(".pkg.Other"));
    }

    #[test]
    fn test_untyped_fields_are_dropped() {
        let proto = DescriptorProto {
            name: Some("M".to_string()),
            field: vec![field("typed", Some(9), None), field("untyped", None, None)],
            ..Default::default()
        };
        let message = MessageDescriptor::from(&proto);
        assert_eq!(message.fields.len(), 1);
        assert_eq!(message.fields[0].name, "typed");
    }

    #[test]
    fn test_children_order() {
        let message = MessageDescriptor {
            name: "M".to_string(),
            nested_messages: vec![MessageDescriptor::default()],
            nested_enums: vec![EnumDescriptor::default()],
            fields: vec![FieldDescriptor::from_proto(&field("f", Some(8), None)).unwrap()],
        };
        let tags: Vec<_> = message
            .children()
            .map(|node| match node {
                Node::Message(_) => 'm',
                Node::Enum(_) => 'e',
                Node::Field(_) => 'f',
            })
            .collect();
        assert_eq!(tags, vec!['m', 'e', 'f']);
    }
}
