//! Declarative schema tree for call payloads.
//!
//! Object nodes carry children; every other type is a leaf. Occurrence
//! bounds are explicit: an unset min means "required once", an unset max
//! means "at most once" (or unbounded for `array` leaves).

use serde::{Deserialize, Serialize};

use crate::soap::SoapError;

/// Type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    /// 64-bit integer.
    Long,
    Double,
    Boolean,
    /// Base64 encoded bytes.
    Buffer,
    Object,
    /// Repeated string leaf.
    Array,
}

impl DataType {
    /// XML Schema type name used in WSDL output.
    pub fn xsd_type(&self) -> &'static str {
        match self {
            DataType::String | DataType::Array => "string",
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::Boolean => "boolean",
            DataType::Buffer => "base64Binary",
            DataType::Object => "object",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::Boolean => "boolean",
            DataType::Buffer => "buffer",
            DataType::Object => "object",
            DataType::Array => "array",
        }
    }
}

/// Upper occurrence bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxOccurs {
    #[default]
    Unspecified,
    Exactly(u32),
    Unbounded,
}

/// One named, typed element of a call payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaNode {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub min_occurs: Option<u32>,
    #[serde(default)]
    pub max_occurs: MaxOccurs,
    #[serde(default)]
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            min_occurs: None,
            max_occurs: MaxOccurs::Unspecified,
            children: Vec::new(),
        }
    }

    /// Node that may be absent (`minOccurs="0"`).
    pub fn optional(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type).min_occurs(0)
    }

    pub fn min_occurs(mut self, min: u32) -> Self {
        self.min_occurs = Some(min);
        self
    }

    pub fn max_occurs(mut self, max: MaxOccurs) -> Self {
        self.max_occurs = max;
        self
    }

    /// Append a child and return the node for chaining.
    pub fn add(mut self, child: SchemaNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_object(&self) -> bool {
        self.data_type == DataType::Object
    }

    /// Minimum occurrences, defaulting to one.
    pub fn effective_min(&self) -> u32 {
        self.min_occurs.unwrap_or(1)
    }

    /// Maximum occurrences; `None` is unbounded.
    pub fn effective_max(&self) -> Option<u32> {
        match self.max_occurs {
            MaxOccurs::Exactly(n) => Some(n),
            MaxOccurs::Unbounded => None,
            MaxOccurs::Unspecified if self.data_type == DataType::Array => None,
            MaxOccurs::Unspecified => Some(1),
        }
    }

    /// True when values of this node are lists.
    pub fn is_repeated(&self) -> bool {
        self.effective_max() != Some(1)
    }

    /// Check the tree: names are set, only objects have children and
    /// occurrence bounds are consistent.
    pub fn validate(&self) -> Result<(), SoapError> {
        if self.name.trim().is_empty() {
            return Err(SoapError::InvalidSchema("node name must not be blank".into()));
        }
        if !self.is_object() && !self.children.is_empty() {
            return Err(SoapError::InvalidSchema(format!(
                "{} node '{}' cannot have children",
                self.data_type.name(),
                self.name
            )));
        }
        if let Some(max) = self.effective_max() {
            if max == 0 {
                return Err(SoapError::InvalidSchema(format!("node '{}' has maxOccurs 0", self.name)));
            }
            if self.effective_min() > max {
                return Err(SoapError::InvalidSchema(format!(
                    "node '{}' has minOccurs {} above maxOccurs {}",
                    self.name,
                    self.effective_min(),
                    max
                )));
            }
        }
        self.children.iter().try_for_each(SchemaNode::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> SchemaNode {
        SchemaNode::new("person", DataType::Object)
            .add(SchemaNode::new("firstName", DataType::String))
            .add(SchemaNode::new("age", DataType::Long))
            .add(SchemaNode::optional("emailAddress", DataType::String))
    }

    #[test]
    fn builder_chains_children() {
        let node = person();
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children[2].min_occurs, Some(0));
        assert!(node.validate().is_ok());
    }

    #[test]
    fn effective_bounds() {
        let leaf = SchemaNode::new("a", DataType::String);
        assert_eq!((leaf.effective_min(), leaf.effective_max()), (1, Some(1)));
        assert!(!leaf.is_repeated());

        let list = SchemaNode::new("tags", DataType::Array);
        assert_eq!(list.effective_max(), None);
        assert!(list.is_repeated());

        let many = SchemaNode::new("people", DataType::Object).max_occurs(MaxOccurs::Unbounded);
        assert!(many.is_repeated());
        let three = SchemaNode::new("x", DataType::Long).max_occurs(MaxOccurs::Exactly(3));
        assert_eq!(three.effective_max(), Some(3));
    }

    #[test]
    fn leaf_with_children_is_invalid() {
        let bad = SchemaNode::new("root", DataType::Object)
            .add(SchemaNode::new("leaf", DataType::String).add(SchemaNode::new("x", DataType::String)));
        assert!(matches!(bad.validate(), Err(SoapError::InvalidSchema(_))));
    }

    #[test]
    fn inconsistent_bounds_are_invalid() {
        let bad = SchemaNode::new("n", DataType::Long).min_occurs(3).max_occurs(MaxOccurs::Exactly(2));
        assert!(bad.validate().is_err());
        assert!(SchemaNode::new("n", DataType::Long)
            .max_occurs(MaxOccurs::Exactly(0))
            .validate()
            .is_err());
        assert!(SchemaNode::new(" ", DataType::Long).validate().is_err());
    }

    #[test]
    fn deserializes_from_toml() {
        let node: SchemaNode = toml::from_str(
            r#"
            name = "people"
            type = "object"
            max_occurs = "unbounded"

            [[children]]
            name = "firstName"
            type = "string"
            "#,
        )
        .unwrap();
        assert_eq!(node.max_occurs, MaxOccurs::Unbounded);
        assert_eq!(node.children[0].data_type, DataType::String);

        let unknown: Result<SchemaNode, _> = toml::from_str("name = \"a\"\ntype = \"long\"\noptional = true\n");
        assert!(unknown.is_err());
    }
}
