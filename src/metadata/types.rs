//! Object and field metadata.
//!
//! These types describe the tenant schema a query is checked against. They
//! deserialize from TOML or JSON so a provider can be loaded from a file.

use serde::{Deserialize, Serialize};

use crate::syntax::ast::LiteralType;

fn default_true() -> bool {
    true
}

fn default_id_column() -> String {
    "id".to_string()
}

/// Find an item by name: exact match first, then ASCII case-insensitive.
fn find_by_name<'a, T>(items: &'a [T], name: &str, key: impl Fn(&T) -> &str) -> Option<&'a T> {
    items
        .iter()
        .find(|item| key(item) == name)
        .or_else(|| items.iter().find(|item| key(item).eq_ignore_ascii_case(name)))
}

// ============================================================================
// Field types
// ============================================================================

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Id,
    String,
    Picklist,
    Reference,
    Integer,
    Float,
    Currency,
    Boolean,
    Date,
    #[serde(alias = "datetime")]
    DateTime,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Currency)
    }

    pub fn is_date(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateTime)
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            FieldType::Id | FieldType::String | FieldType::Picklist | FieldType::Reference
        )
    }

    /// Whether a constant of type `literal` can be compared with this field.
    ///
    /// `NULL` is comparable with every field.
    pub fn accepts(&self, literal: LiteralType) -> bool {
        match literal {
            LiteralType::Null => true,
            LiteralType::String => self.is_text(),
            LiteralType::Integer | LiteralType::Float => self.is_numeric(),
            LiteralType::Boolean => *self == FieldType::Boolean,
            LiteralType::Date => self.is_date(),
            LiteralType::DateTime => *self == FieldType::DateTime,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Id => "id",
            FieldType::String => "string",
            FieldType::Picklist => "picklist",
            FieldType::Reference => "reference",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Currency => "currency",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Fields
// ============================================================================

/// A queryable field of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    /// Physical column. Defaults to the lower-cased field name.
    #[serde(default)]
    pub column: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default = "default_true")]
    pub groupable: bool,
    #[serde(default = "default_true")]
    pub aggregatable: bool,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.to_ascii_lowercase(),
            name,
            field_type,
            filterable: true,
            sortable: true,
            groupable: true,
            aggregatable: true,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn not_filterable(mut self) -> Self {
        self.filterable = false;
        self
    }

    pub fn not_sortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    pub fn not_groupable(mut self) -> Self {
        self.groupable = false;
        self
    }

    pub fn not_aggregatable(mut self) -> Self {
        self.aggregatable = false;
        self
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// A child-to-parent relationship traversable with dotted paths.
///
/// `Contact.Account.Name` walks the `Account` lookup, whose foreign key is
/// stored in the `AccountId` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupMeta {
    /// Relationship name used in paths.
    pub name: String,
    /// Field on this object holding the foreign key.
    pub field: String,
    /// Objects the foreign key may point to. More than one makes the
    /// lookup polymorphic.
    pub targets: Vec<String>,
    /// Column recording the target object type of polymorphic lookups.
    #[serde(default)]
    pub type_field: Option<String>,
}

impl LookupMeta {
    pub fn new(name: impl Into<String>, field: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            targets: vec![target.into()],
            type_field: None,
        }
    }

    pub fn polymorphic(
        name: impl Into<String>,
        field: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<String>>,
        type_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            type_field: Some(type_field.into()),
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        self.targets.len() > 1
    }

    pub fn target(&self, name: &str) -> Option<&str> {
        find_by_name(&self.targets, name, |t| t.as_str()).map(String::as_str)
    }
}

/// A parent-to-children relationship usable as a subquery source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipMeta {
    /// Name used in `FROM` of a subquery, e.g. `Contacts`.
    pub name: String,
    pub child_object: String,
    /// Field on the child object holding the foreign key to the parent.
    pub child_field: String,
}

impl RelationshipMeta {
    pub fn new(
        name: impl Into<String>,
        child_object: impl Into<String>,
        child_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            child_object: child_object.into(),
            child_field: child_field.into(),
        }
    }
}

// ============================================================================
// Objects
// ============================================================================

/// A queryable object and its physical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    /// Physical table. Defaults to the lower-cased object name.
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default)]
    pub fields: Vec<FieldMeta>,
    #[serde(default)]
    pub lookups: Vec<LookupMeta>,
    #[serde(default)]
    pub relationships: Vec<RelationshipMeta>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            schema: None,
            id_column: default_id_column(),
            fields: Vec::new(),
            lookups: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_lookup(mut self, lookup: LookupMeta) -> Self {
        self.lookups.push(lookup);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipMeta) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        find_by_name(&self.fields, name, |f| f.name.as_str())
    }

    pub fn lookup(&self, name: &str) -> Option<&LookupMeta> {
        find_by_name(&self.lookups, name, |l| l.name.as_str())
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipMeta> {
        find_by_name(&self.relationships, name, |r| r.name.as_str())
    }

    /// Fill in defaulted physical names.
    pub(crate) fn normalize(&mut self) {
        if self.table.is_empty() {
            self.table = self.name.to_ascii_lowercase();
        }
        for field in &mut self.fields {
            if field.column.is_empty() {
                field.column = field.name.to_ascii_lowercase();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> ObjectMeta {
        ObjectMeta::new("Account", "accounts")
            .with_field(FieldMeta::new("Id", FieldType::Id))
            .with_field(FieldMeta::new("Name", FieldType::String))
            .with_field(FieldMeta::new("name", FieldType::String).column("legacy_name"))
    }

    #[test]
    fn test_field_lookup_prefers_exact_case() {
        let obj = account();
        assert_eq!(obj.field("name").map(|f| f.column.as_str()), Some("legacy_name"));
        assert_eq!(obj.field("Name").map(|f| f.column.as_str()), Some("name"));
        assert_eq!(obj.field("ID").map(|f| f.name.as_str()), Some("Id"));
        assert!(obj.field("Missing").is_none());
    }

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::String.accepts(LiteralType::String));
        assert!(!FieldType::String.accepts(LiteralType::Integer));
        assert!(FieldType::Currency.accepts(LiteralType::Float));
        assert!(FieldType::DateTime.accepts(LiteralType::Date));
        assert!(!FieldType::Date.accepts(LiteralType::DateTime));
        assert!(FieldType::Boolean.accepts(LiteralType::Null));
    }

    #[test]
    fn test_polymorphic_lookup() {
        let what = LookupMeta::polymorphic("What", "WhatId", ["Account", "Opportunity"], "what_type");
        assert!(what.is_polymorphic());
        assert_eq!(what.target("opportunity"), Some("Opportunity"));
        assert!(!LookupMeta::new("Owner", "OwnerId", "User").is_polymorphic());
    }

    #[test]
    fn test_normalize_defaults() {
        let mut obj: ObjectMeta = serde_json::from_str(
            r#"{"name": "Contact", "fields": [{"name": "LastName", "type": "string"}]}"#,
        )
        .unwrap();
        obj.normalize();
        assert_eq!(obj.table, "contact");
        assert_eq!(obj.id_column, "id");
        assert_eq!(obj.fields[0].column, "lastname");
        assert!(obj.fields[0].filterable);
    }
}
