//! Struct metadata: the ordered, bound field table of one struct type.
//!
//! A [`Schema`] is produced once by [`SchemaBuilder::build`] and shared through `Arc` by
//! every [`Struct`](crate::structure::Struct) of that type.
//!
//! ## Binding
//!
//! 1. At most one parent schema (`extends`); fields, validators and options are copied from it.
//! 2. The running byte offset starts at the parent's static size, or is unknown if that
//!    size isn't fixed.
//! 3. Declared fields are bound in order: index continues from the parent's field count,
//!    offset continues from the running total and stays unknown after the first
//!    variable-size or conditionally present field.
//! 4. Compute functions and validators are attached to their fields by name.
//! 5. Size and count references must name a field of the schema.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use crate::codec::{Endian, TextEncoding};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::hooks::{Compute, MethodValidator, StructValidator};
use crate::structure::Struct;
use crate::value::{Value, Values};

/// Struct-level defaults for fields that don't choose for themselves.
///
/// Options are resolved into fields when their schema is built. A child's options reach
/// the fields it declares; inherited fields keep the byte order and encoding they were
/// bound with in the parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options {
    pub endian: Option<Endian>,
    pub encoding: Option<TextEncoding>,
}

impl Options {
    pub fn endian(endian: Endian) -> Self {
        Options {
            endian: Some(endian),
            ..Options::default()
        }
    }

    /// `overrides` wins wherever it sets something.
    pub fn merge(self, overrides: Options) -> Options {
        Options {
            endian: overrides.endian.or(self.endian),
            encoding: overrides.encoding.or(self.encoding),
        }
    }

    pub fn resolved_endian(&self) -> Endian {
        self.endian.unwrap_or_else(Endian::native)
    }

    pub fn resolved_encoding(&self) -> TextEncoding {
        self.encoding.unwrap_or_default()
    }
}

pub struct Schema {
    name: String,
    components: IndexMap<String, Field>,
    field_validators: IndexMap<String, Vec<Arc<dyn MethodValidator>>>,
    struct_validators: Vec<Arc<dyn StructValidator>>,
    num_own_fields: usize,
    options: Options,
    parent: Option<Arc<Schema>>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.components.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.components.get(name)
    }

    /// Fields in declaration order, inherited ones first.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.components.values()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Fields declared on this schema rather than inherited.
    pub fn num_own_fields(&self) -> usize {
        self.num_own_fields
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn parent(&self) -> Option<&Arc<Schema>> {
        self.parent.as_ref()
    }

    pub(crate) fn validators_for(&self, name: &str) -> &[Arc<dyn MethodValidator>] {
        self.field_validators.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn struct_validators(&self) -> &[Arc<dyn StructValidator>] {
        &self.struct_validators
    }

    /// Total byte size if every field has a static size and is always present.
    pub fn size(&self) -> Option<usize> {
        self.fields()
            .map(|field| if field.has_presence() { None } else { field.static_size() })
            .sum()
    }

    /// Total byte size resolved against `values`, or `None` if some field's size
    /// still can't be determined.
    pub fn size_with(&self, values: &Values) -> Option<usize> {
        self.fields()
            .map(|field| match field.is_present(values, None) {
                Ok(true) => field.expected_size(values).ok(),
                Ok(false) => Some(0),
                Err(_) => None,
            })
            .sum()
    }

    /// Names given in `values` that aren't fields of this schema, sorted.
    pub(crate) fn unknown_names<'a>(&self, names: impl Iterator<Item = &'a String>) -> Vec<String> {
        let mut unknown: Vec<String> = names
            .filter(|n| !self.components.contains_key(n.as_str()))
            .cloned()
            .collect();
        unknown.sort();
        unknown
    }
}

/// Collects a struct's declaration, then binds it in [`SchemaBuilder::build`].
pub struct SchemaBuilder {
    name: String,
    parents: Vec<Arc<Schema>>,
    options: Options,
    fields: Vec<(String, Field)>,
    computes: Vec<(String, Arc<dyn Compute>)>,
    field_validators: Vec<(Vec<String>, Arc<dyn MethodValidator>)>,
    struct_validators: Vec<Arc<dyn StructValidator>>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        SchemaBuilder {
            name: name.into(),
            parents: Vec::new(),
            options: Options::default(),
            fields: Vec::new(),
            computes: Vec::new(),
            field_validators: Vec::new(),
            struct_validators: Vec::new(),
        }
    }

    /// Inherit fields, validators and options. Only one parent is allowed.
    pub fn extends(mut self, parent: &Arc<Schema>) -> Self {
        self.parents.push(Arc::clone(parent));
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = self.options.merge(options);
        self
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.options.endian = Some(endian);
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.options.encoding = Some(encoding);
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Derive `name`'s dump value from sibling values when it isn't set explicitly.
    pub fn computes(
        mut self,
        name: impl Into<String>,
        compute: impl Fn(&Values) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.computes.push((name.into(), Arc::new(compute)));
        self
    }

    /// Validator for one or more fields; it also sees the whole struct.
    pub fn validates<F>(mut self, names: &[&str], check: F) -> Self
    where
        F: Fn(&Struct, &Field, &Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.field_validators
            .push((names.iter().map(|n| n.to_string()).collect(), Arc::new(check)));
        self
    }

    pub fn validates_struct(mut self, check: impl Fn(&Struct) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.struct_validators.push(Arc::new(check));
        self
    }

    pub fn validates_struct_with(mut self, check: impl StructValidator + 'static) -> Self {
        self.struct_validators.push(Arc::new(check));
        self
    }

    pub fn build(self) -> Result<Arc<Schema>> {
        if self.parents.len() > 1 {
            return Err(Error::MultipleInheritance { schema: self.name });
        }
        let parent = self.parents.into_iter().next();

        let mut components = IndexMap::new();
        let mut field_validators: IndexMap<String, Vec<Arc<dyn MethodValidator>>> = IndexMap::new();
        let mut struct_validators = Vec::new();
        let mut options = self.options;
        let mut offset = Some(0usize);

        if let Some(parent) = &parent {
            components = parent.components.clone();
            field_validators = parent.field_validators.clone();
            struct_validators = parent.struct_validators.clone();
            options = parent.options.merge(self.options);
            offset = parent.size();
        }

        let endian = options.resolved_endian();
        let encoding = options.resolved_encoding();
        let mut declared = HashSet::new();
        let num_own_fields = self.fields.len();

        for (name, mut field) in self.fields {
            if components.contains_key(&name) {
                return Err(if declared.contains(&name) {
                    Error::config(format!("{}: field {name:?} is declared twice", self.name))
                } else {
                    Error::FieldRedefined {
                        schema: self.name,
                        field: name,
                    }
                });
            }
            field.check_config()?;
            field.apply_options(endian, encoding);
            field.bind(&name, components.len(), offset)?;
            offset = if field.has_presence() {
                None
            } else {
                offset.and_then(|o| field.static_size().map(|size| o + size))
            };
            declared.insert(name.clone());
            field_validators.entry(name.clone()).or_default();
            components.insert(name, field);
        }

        for (name, compute) in self.computes {
            let field = components
                .get_mut(&name)
                .ok_or_else(|| Error::config(format!("{}: can't compute unknown field {name:?}", self.name)))?;
            field.set_compute(compute)?;
        }

        for (names, check) in self.field_validators {
            if names.is_empty() {
                return Err(Error::config(format!(
                    "{}: a field validator needs at least one field name",
                    self.name
                )));
            }
            for name in names {
                let slot = field_validators
                    .get_mut(&name)
                    .ok_or_else(|| Error::config(format!("{}: can't validate unknown field {name:?}", self.name)))?;
                slot.push(Arc::clone(&check));
            }
        }
        struct_validators.extend(self.struct_validators);

        for field in components.values() {
            for reference in field.references() {
                if !components.contains_key(reference) {
                    return Err(Error::config(format!(
                        "{}: field {:?} refers to {reference:?}, which isn't a field of this struct",
                        self.name,
                        field.display_name()
                    )));
                }
            }
        }

        let schema = Schema {
            name: self.name,
            components,
            field_validators,
            struct_validators,
            num_own_fields,
            options,
            parent,
        };
        debug!(
            "built schema {} ({} fields, {} own, size {:?})",
            schema.name,
            schema.len(),
            schema.num_own_fields,
            schema.size()
        );
        Ok(Arc::new(schema))
    }
}
