//! MetadataProvider trait and the in-memory provider.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::types::*;

/// Errors loading metadata definitions.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to read metadata file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML metadata: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid metadata for {object}: {message}")]
    Invalid { object: String, message: String },
}

/// Source of object metadata for a tenant.
///
/// Implementations must be cheap to query; the validator calls
/// [`get_object`](Self::get_object) for every object a query touches.
pub trait MetadataProvider: Send + Sync {
    /// Look up an object by name. Exact match first, then case-insensitive.
    fn get_object(&self, name: &str) -> Option<Arc<ObjectMeta>>;

    /// Names of all known objects.
    fn list_objects(&self) -> Vec<String>;
}

/// File layout for metadata definitions: a list of `[[objects]]`.
#[derive(Debug, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    objects: Vec<ObjectMeta>,
}

/// Metadata held in memory, built in code or loaded from a file.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    objects: BTreeMap<String, Arc<ObjectMeta>>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object, replacing any object with the same name.
    pub fn with_object(mut self, object: ObjectMeta) -> Self {
        self.insert(object);
        self
    }

    pub fn insert(&mut self, mut object: ObjectMeta) {
        object.normalize();
        self.objects.insert(object.name.clone(), Arc::new(object));
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, MetadataError> {
        let file: MetadataFile = toml::from_str(content)?;
        Self::from_objects(file.objects)
    }

    pub fn from_json_str(content: &str) -> Result<Self, MetadataError> {
        let file: MetadataFile = serde_json::from_str(content)?;
        Self::from_objects(file.objects)
    }

    /// Load from a `.json` or `.toml` file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    fn from_objects(objects: Vec<ObjectMeta>) -> Result<Self, MetadataError> {
        let mut metadata = Self::new();
        for object in objects {
            check_object(&object)?;
            metadata.insert(object);
        }
        Ok(metadata)
    }
}

fn check_object(object: &ObjectMeta) -> Result<(), MetadataError> {
    let invalid = |message: String| MetadataError::Invalid {
        object: object.name.clone(),
        message,
    };
    for lookup in &object.lookups {
        if object.field(&lookup.field).is_none() {
            return Err(invalid(format!(
                "lookup {} refers to unknown field {}",
                lookup.name, lookup.field
            )));
        }
        if lookup.targets.is_empty() {
            return Err(invalid(format!("lookup {} has no target objects", lookup.name)));
        }
        if lookup.is_polymorphic() && lookup.type_field.is_none() {
            return Err(invalid(format!(
                "polymorphic lookup {} needs a type_field",
                lookup.name
            )));
        }
    }
    Ok(())
}

impl MetadataProvider for StaticMetadata {
    fn get_object(&self, name: &str) -> Option<Arc<ObjectMeta>> {
        self.objects.get(name).cloned().or_else(|| {
            self.objects
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, object)| Arc::clone(object))
        })
    }

    fn list_objects(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }
}

impl<T: MetadataProvider + ?Sized> MetadataProvider for Arc<T> {
    fn get_object(&self, name: &str) -> Option<Arc<ObjectMeta>> {
        (**self).get_object(name)
    }

    fn list_objects(&self) -> Vec<String> {
        (**self).list_objects()
    }
}
