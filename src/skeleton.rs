//! Skeletons: the reconstruction plan of each resource.
//!
//! A [`Skeleton`] is the ordered list of pieces needed to rebuild the part of
//! the original document a resource came from: verbatim text captured from
//! the input, and placeholders resolved at write time (a property value, the
//! content of a text unit, the whole output of another resource).
//!
//! Placeholders never hold pointers. They name their referent by id, and the
//! writer resolves ids against the [`ReferenceTable`] of the document being
//! written.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    locale::LocaleId,
    resource::{Nameable, PropertyBearer, Resource, SkeletonBearer},
    traits::ContentEncoder,
};

/// Which resource a placeholder points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRef {
    /// The resource owning the skeleton.
    SelfRef,
    /// A referent resource stored earlier in the same document.
    Id(String),
}

/// Which variant of a property a placeholder reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyScope {
    /// The resource-level value.
    Resource,
    /// The value for the output locale, falling back to the resource-level value.
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonPart {
    /// Text captured verbatim from the input.
    Text(String),
    /// The current value of a property.
    Property {
        target: ResourceRef,
        name: String,
        scope: PropertyScope,
    },
    /// The rendered content of a resource.
    Content { target: ResourceRef },
}

impl SkeletonPart {
    pub fn is_reference(&self) -> bool {
        !matches!(self, SkeletonPart::Text(_))
    }
}

/// Ordered reconstruction plan. Parts cannot be reordered once built.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Skeleton {
    parts: Vec<SkeletonPart>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// A skeleton made of a single verbatim span.
    pub fn from_text(text: &str) -> Self {
        let mut builder = SkeletonBuilder::new();
        builder.append(text);
        builder.build()
    }

    pub fn parts(&self) -> &[SkeletonPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// `true` if there is no placeholder and only white space is captured.
    pub fn is_blank(&self) -> bool {
        self.parts.iter().all(|part| match part {
            SkeletonPart::Text(text) => text.chars().all(char::is_whitespace),
            _ => false,
        })
    }

    /// Ids of the referents this skeleton points at.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            SkeletonPart::Property {
                target: ResourceRef::Id(id),
                ..
            }
            | SkeletonPart::Content {
                target: ResourceRef::Id(id),
            } => Some(id.as_str()),
            _ => None,
        })
    }
}

/// Incremental construction of a [`Skeleton`], used by filters while parsing.
///
/// ```rust
/// use skeletext::skeleton::{PropertyScope, SkeletonBuilder};
///
/// let mut builder = SkeletonBuilder::new();
/// builder
///     .append("name=\"")
///     .add_value_placeholder("value", PropertyScope::Resource)
///     .append("\"");
/// let skeleton = builder.build();
/// assert_eq!(skeleton.parts().len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SkeletonBuilder {
    parts: Vec<SkeletonPart>,
}

impl SkeletonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends verbatim text, extending the last part when it is text too.
    pub fn append(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(SkeletonPart::Text(last)) => last.push_str(text),
            _ => self.parts.push(SkeletonPart::Text(text.to_string())),
        }
        self
    }

    /// Placeholder for the content of the text unit owning the skeleton.
    pub fn add_content_placeholder(&mut self) -> &mut Self {
        self.parts.push(SkeletonPart::Content {
            target: ResourceRef::SelfRef,
        });
        self
    }

    /// Placeholder for a property of the resource owning the skeleton.
    pub fn add_value_placeholder(&mut self, name: &str, scope: PropertyScope) -> &mut Self {
        self.parts.push(SkeletonPart::Property {
            target: ResourceRef::SelfRef,
            name: name.to_string(),
            scope,
        });
        self
    }

    /// Placeholder for the whole output of the referent `id`.
    pub fn add_reference(&mut self, id: &str) -> &mut Self {
        self.parts.push(SkeletonPart::Content {
            target: ResourceRef::Id(id.to_string()),
        });
        self
    }

    /// Placeholder for a property of the referent `id`.
    pub fn add_property_reference(
        &mut self,
        id: &str,
        name: &str,
        scope: PropertyScope,
    ) -> &mut Self {
        self.parts.push(SkeletonPart::Property {
            target: ResourceRef::Id(id.to_string()),
            name: name.to_string(),
            scope,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Takes the parts collected so far, leaving the builder empty.
    pub fn build(&mut self) -> Skeleton {
        Skeleton {
            parts: std::mem::take(&mut self.parts),
        }
    }
}

/// A resource kept aside until another skeleton references it.
#[derive(Debug, Clone, PartialEq)]
pub enum Referent {
    Resource(Resource),
    /// A group and everything received between its start and its end.
    Group {
        start: Resource,
        children: Vec<Resource>,
        end: Option<Resource>,
    },
}

/// Per-document table of referents, keyed by resource id.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: HashMap<String, Referent>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: Resource) {
        self.entries
            .insert(resource.id().to_string(), Referent::Resource(resource));
    }

    pub fn open_group(&mut self, start: Resource) {
        self.entries.insert(
            start.id().to_string(),
            Referent::Group {
                start,
                children: Vec::new(),
                end: None,
            },
        );
    }

    /// Adds a child to an open referent group. Returns `false` if `group_id`
    /// is not a group.
    pub fn push_child(&mut self, group_id: &str, child: Resource) -> bool {
        match self.entries.get_mut(group_id) {
            Some(Referent::Group { children, .. }) => {
                children.push(child);
                true
            }
            _ => false,
        }
    }

    pub fn close_group(&mut self, group_id: &str, ending: Option<Resource>) -> bool {
        match self.entries.get_mut(group_id) {
            Some(Referent::Group { end, .. }) => {
                *end = ending;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Referent> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Resolves skeletons into output text.
pub struct SkeletonResolver<'a> {
    table: &'a ReferenceTable,
    locale: Option<&'a LocaleId>,
    encoder: &'a dyn ContentEncoder,
    visiting: Vec<String>,
}

impl<'a> SkeletonResolver<'a> {
    pub fn new(
        table: &'a ReferenceTable,
        locale: Option<&'a LocaleId>,
        encoder: &'a dyn ContentEncoder,
    ) -> Self {
        Self {
            table,
            locale,
            encoder,
            visiting: Vec::new(),
        }
    }

    /// Resolves the skeleton of `resource`.
    ///
    /// Parts are written in order. Property and content placeholders read
    /// the values current at the time of the call.
    pub fn resolve(&mut self, resource: &Resource) -> Result<String, Error> {
        let mut out = String::new();
        self.write_resource(resource, &mut out)?;
        Ok(out)
    }

    fn write_resource(&mut self, resource: &Resource, out: &mut String) -> Result<(), Error> {
        let id = resource.id();
        if self.visiting.iter().any(|v| v == id) {
            return Err(Error::CyclicSkeletonReference(id.to_string()));
        }
        self.visiting.push(id.to_string());

        // A text unit without skeleton stands for its bare content.
        if resource.skeleton().is_empty() && matches!(resource, Resource::TextUnit(_)) {
            self.write_own_content(resource, out)?;
        }
        for part in resource.skeleton().parts() {
            match part {
                SkeletonPart::Text(text) => out.push_str(text),
                SkeletonPart::Property {
                    target,
                    name,
                    scope,
                } => {
                    let holder = Self::lookup(self.table, resource, target)?.head();
                    out.push_str(&self.property_value(holder, name, *scope)?);
                }
                SkeletonPart::Content {
                    target: ResourceRef::SelfRef,
                } => self.write_own_content(resource, out)?,
                SkeletonPart::Content { target } => {
                    match Self::lookup(self.table, resource, target)? {
                        Holder::Single(referent) => self.write_resource(referent, out)?,
                        Holder::Group {
                            start,
                            children,
                            end,
                        } => {
                            self.write_resource(start, out)?;
                            for child in children {
                                self.write_resource(child, out)?;
                            }
                            if let Some(end) = end {
                                self.write_resource(end, out)?;
                            }
                        }
                    }
                }
            }
        }

        self.visiting.pop();
        Ok(())
    }

    fn write_own_content(&self, resource: &Resource, out: &mut String) -> Result<(), Error> {
        match resource {
            Resource::TextUnit(unit) => {
                let content = unit.content_for(self.locale);
                out.push_str(&content.render(|text| self.encoder.encode_text(text)));
                Ok(())
            }
            other => Err(Error::unresolved(other.id(), "$self$ content")),
        }
    }

    fn property_value(
        &self,
        holder: &Resource,
        name: &str,
        scope: PropertyScope,
    ) -> Result<String, Error> {
        let value = match scope {
            PropertyScope::Resource => holder.property(name),
            PropertyScope::Target => self
                .locale
                .and_then(|locale| holder.target_property(locale, name))
                .or_else(|| holder.property(name)),
        };
        match value {
            Some(value) => Ok(value.to_string()),
            None if holder.is_required(name) => Err(Error::unresolved(holder.id(), name)),
            None => Ok(String::new()),
        }
    }

    fn lookup<'r>(
        table: &'r ReferenceTable,
        current: &'r Resource,
        target: &ResourceRef,
    ) -> Result<Holder<'r>, Error> {
        match target {
            ResourceRef::SelfRef => Ok(Holder::Single(current)),
            ResourceRef::Id(id) => match table.get(id) {
                Some(Referent::Resource(resource)) => Ok(Holder::Single(resource)),
                Some(Referent::Group {
                    start,
                    children,
                    end,
                }) => Ok(Holder::Group {
                    start,
                    children,
                    end: end.as_ref(),
                }),
                None => Err(Error::unresolved(current.id(), format!("#{}", id))),
            },
        }
    }
}

enum Holder<'r> {
    Single(&'r Resource),
    Group {
        start: &'r Resource,
        children: &'r [Resource],
        end: Option<&'r Resource>,
    },
}

impl<'r> Holder<'r> {
    fn head(&self) -> &'r Resource {
        match self {
            Holder::Single(resource) => resource,
            Holder::Group { start, .. } => start,
        }
    }
}
