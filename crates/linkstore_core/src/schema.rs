//! Per-record-type property schema.
//!
//! A schema says which properties are resource-backed and how host property
//! names map to backend field names. Properties not named in the schema are
//! stored inline under their own name.

use std::collections::{BTreeMap, HashMap};

use crate::error::{LinkError, LinkResult};
use crate::record::is_reserved;

/// How a property is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Stored inline in the record payload.
    Inline,
    /// Stored in the resource service; the payload carries a reference.
    Resource {
        /// Fixed content type, or `None` to detect it from the bytes.
        content_type: Option<String>,
    },
}

/// A single property declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    /// Name used by callers in [`crate::Record`].
    pub host_name: String,
    /// Name used in the serialized form.
    pub backend_name: String,
    /// Storage kind.
    pub kind: PropertyKind,
}

impl PropertySpec {
    /// Returns true if this property is resource-backed.
    pub fn is_resource(&self) -> bool {
        matches!(self.kind, PropertyKind::Resource { .. })
    }

    /// Declared content type, if fixed by the schema.
    pub fn content_type(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Resource { content_type } => content_type.as_deref(),
            PropertyKind::Inline => None,
        }
    }
}

/// Property schema for one record type. Build with [`SchemaBuilder`].
#[derive(Debug, Clone, Default)]
pub struct Schema {
    properties: BTreeMap<String, PropertySpec>,
    host_by_backend: HashMap<String, String>,
}

impl Schema {
    /// Starts building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Looks up a property by host name.
    pub fn property(&self, host_name: &str) -> Option<&PropertySpec> {
        self.properties.get(host_name)
    }

    /// Returns true if the host property is resource-backed.
    pub fn is_resource(&self, host_name: &str) -> bool {
        self.property(host_name).is_some_and(PropertySpec::is_resource)
    }

    /// Iterates over resource-backed properties.
    pub fn resource_properties(&self) -> impl Iterator<Item = &PropertySpec> {
        self.properties.values().filter(|p| p.is_resource())
    }

    /// Backend field name for a host property.
    pub fn backend_name<'a>(&'a self, host_name: &'a str) -> &'a str {
        self.property(host_name)
            .map_or(host_name, |p| p.backend_name.as_str())
    }

    /// Host property name for a backend field.
    pub fn host_name<'a>(&'a self, backend_name: &'a str) -> &'a str {
        self.host_by_backend
            .get(backend_name)
            .map_or(backend_name, String::as_str)
    }

    /// Number of declared properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    specs: Vec<PropertySpec>,
}

impl SchemaBuilder {
    /// Declares an inline property.
    pub fn inline(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.mapped(name.clone(), name, PropertyKind::Inline)
    }

    /// Declares a resource-backed property with a detected content type.
    pub fn resource(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.mapped(name.clone(), name, PropertyKind::Resource { content_type: None })
    }

    /// Declares a resource-backed property with a fixed content type.
    pub fn resource_with_content_type(
        self,
        name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.mapped(
            name.clone(),
            name,
            PropertyKind::Resource {
                content_type: Some(content_type.into()),
            },
        )
    }

    /// Declares a property whose backend field name differs from its host name.
    pub fn mapped(
        mut self,
        host_name: impl Into<String>,
        backend_name: impl Into<String>,
        kind: PropertyKind,
    ) -> Self {
        self.specs.push(PropertySpec {
            host_name: host_name.into(),
            backend_name: backend_name.into(),
            kind,
        });
        self
    }

    /// Validates the declarations and builds the schema.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Validation`] for empty or reserved names and for
    /// duplicate host or backend names.
    pub fn build(self) -> LinkResult<Schema> {
        let mut schema = Schema::default();
        for spec in self.specs {
            for name in [&spec.host_name, &spec.backend_name] {
                if name.is_empty() {
                    return Err(LinkError::validation("property names must not be empty"));
                }
                if is_reserved(name) {
                    return Err(LinkError::validation(format!(
                        "property name {name:?} is reserved"
                    )));
                }
            }
            if schema.properties.contains_key(&spec.host_name) {
                return Err(LinkError::validation(format!(
                    "property {:?} declared twice",
                    spec.host_name
                )));
            }
            if schema.host_by_backend.contains_key(&spec.backend_name) {
                return Err(LinkError::validation(format!(
                    "backend field {:?} mapped twice",
                    spec.backend_name
                )));
            }
            schema
                .host_by_backend
                .insert(spec.backend_name.clone(), spec.host_name.clone());
            schema.properties.insert(spec.host_name.clone(), spec);
        }
        Ok(schema)
    }
}
