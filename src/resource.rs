//! Resources carried by events.
//!
//! Every event payload is one variant of [`Resource`]. The variants share a
//! common state ([`ResourceBase`]: identity, properties, annotations,
//! skeleton) exposed through the capability traits [`Nameable`],
//! [`PropertyBearer`], [`SkeletonBearer`] and [`Annotatable`], which are
//! implemented for each variant struct and for `Resource` itself.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{error::Error, fragment::TextFragment, locale::LocaleId, skeleton::Skeleton};

/// A named value attached to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub value: String,
    /// Read-only properties carry information that tools should not change
    /// (an encoding declaration, a tool id, ...).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[serde(default)]
    pub read_only: bool,
}

impl Property {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            read_only: false,
        }
    }

    pub fn read_only(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            read_only: true,
        }
    }
}

/// State shared by every resource variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceBase {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[serde(default)]
    properties: BTreeMap<String, Property>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[serde(default)]
    target_properties: BTreeMap<LocaleId, BTreeMap<String, Property>>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    #[serde(default)]
    required: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[serde(default)]
    annotations: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Skeleton::is_empty")]
    #[serde(default)]
    skeleton: Skeleton,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[serde(default)]
    referent: bool,
}

impl ResourceBase {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Access to the [`ResourceBase`] of a resource. The capability traits are
/// implemented for every type providing it.
pub trait AsResourceBase {
    fn base(&self) -> &ResourceBase;
    fn base_mut(&mut self) -> &mut ResourceBase;
}

pub trait Nameable {
    /// Id, unique within the document.
    fn id(&self) -> &str;
    fn name(&self) -> Option<&str>;
    fn set_name(&mut self, name: &str);
    fn resource_type(&self) -> Option<&str>;
    fn set_resource_type(&mut self, resource_type: &str);
}

pub trait PropertyBearer {
    fn property(&self, name: &str) -> Option<&str>;
    fn property_info(&self, name: &str) -> Option<&Property>;
    /// Sets the value of a property, keeping its read-only flag.
    fn set_property(&mut self, name: &str, value: &str);
    fn set_read_only_property(&mut self, name: &str, value: &str);
    fn remove_property(&mut self, name: &str) -> Option<Property>;
    fn property_names(&self) -> Vec<&str>;

    fn target_property(&self, locale: &LocaleId, name: &str) -> Option<&str>;
    fn set_target_property(&mut self, locale: &LocaleId, name: &str, value: &str);
    fn remove_target_property(&mut self, locale: &LocaleId, name: &str) -> Option<Property>;
    fn has_target_properties(&self, locale: &LocaleId) -> bool;

    /// Declares a property mandatory: resolving a skeleton placeholder for
    /// it while it is absent is an error instead of an empty string.
    fn require_property(&mut self, name: &str);
    fn is_required(&self, name: &str) -> bool;
}

pub trait SkeletonBearer {
    fn skeleton(&self) -> &Skeleton;
    /// A referent is written where another skeleton references it rather
    /// than in place.
    fn is_referent(&self) -> bool;
    fn set_referent(&mut self, referent: bool);
}

pub trait Annotatable {
    fn annotation(&self, key: &str) -> Option<&Value>;
    fn set_annotation(&mut self, key: &str, value: Value);
    fn remove_annotation(&mut self, key: &str) -> Option<Value>;
    fn annotation_keys(&self) -> Vec<&str>;

    /// Reads an annotation into a typed value.
    fn annotation_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.annotation(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    fn set_annotation_as<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), Error> {
        self.set_annotation(key, serde_json::to_value(value)?);
        Ok(())
    }
}

impl<T: AsResourceBase> Nameable for T {
    fn id(&self) -> &str {
        &self.base().id
    }

    fn name(&self) -> Option<&str> {
        self.base().name.as_deref()
    }

    fn set_name(&mut self, name: &str) {
        self.base_mut().name = Some(name.to_string());
    }

    fn resource_type(&self) -> Option<&str> {
        self.base().resource_type.as_deref()
    }

    fn set_resource_type(&mut self, resource_type: &str) {
        self.base_mut().resource_type = Some(resource_type.to_string());
    }
}

impl<T: AsResourceBase> PropertyBearer for T {
    fn property(&self, name: &str) -> Option<&str> {
        self.base().properties.get(name).map(|p| p.value.as_str())
    }

    fn property_info(&self, name: &str) -> Option<&Property> {
        self.base().properties.get(name)
    }

    fn set_property(&mut self, name: &str, value: &str) {
        self.base_mut()
            .properties
            .entry(name.to_string())
            .and_modify(|p| p.value = value.to_string())
            .or_insert_with(|| Property::new(value));
    }

    fn set_read_only_property(&mut self, name: &str, value: &str) {
        self.base_mut()
            .properties
            .insert(name.to_string(), Property::read_only(value));
    }

    fn remove_property(&mut self, name: &str) -> Option<Property> {
        self.base_mut().properties.remove(name)
    }

    fn property_names(&self) -> Vec<&str> {
        self.base().properties.keys().map(String::as_str).collect()
    }

    fn target_property(&self, locale: &LocaleId, name: &str) -> Option<&str> {
        self.base()
            .target_properties
            .get(locale)
            .and_then(|props| props.get(name))
            .map(|p| p.value.as_str())
    }

    fn set_target_property(&mut self, locale: &LocaleId, name: &str, value: &str) {
        self.base_mut()
            .target_properties
            .entry(locale.clone())
            .or_default()
            .entry(name.to_string())
            .and_modify(|p| p.value = value.to_string())
            .or_insert_with(|| Property::new(value));
    }

    fn remove_target_property(&mut self, locale: &LocaleId, name: &str) -> Option<Property> {
        let props = self.base_mut().target_properties.get_mut(locale)?;
        let removed = props.remove(name);
        if props.is_empty() {
            self.base_mut().target_properties.remove(locale);
        }
        removed
    }

    fn has_target_properties(&self, locale: &LocaleId) -> bool {
        self.base().target_properties.contains_key(locale)
    }

    fn require_property(&mut self, name: &str) {
        self.base_mut().required.insert(name.to_string());
    }

    fn is_required(&self, name: &str) -> bool {
        self.base().required.contains(name)
    }
}

impl<T: AsResourceBase> SkeletonBearer for T {
    fn skeleton(&self) -> &Skeleton {
        &self.base().skeleton
    }

    fn is_referent(&self) -> bool {
        self.base().referent
    }

    fn set_referent(&mut self, referent: bool) {
        self.base_mut().referent = referent;
    }
}

impl<T: AsResourceBase> Annotatable for T {
    fn annotation(&self, key: &str) -> Option<&Value> {
        self.base().annotations.get(key)
    }

    fn set_annotation(&mut self, key: &str, value: Value) {
        self.base_mut().annotations.insert(key.to_string(), value);
    }

    fn remove_annotation(&mut self, key: &str) -> Option<Value> {
        self.base_mut().annotations.remove(key)
    }

    fn annotation_keys(&self) -> Vec<&str> {
        self.base().annotations.keys().map(String::as_str).collect()
    }
}

macro_rules! resource_struct {
    ($($ty:ident),* $(,)?) => {$(
        impl AsResourceBase for $ty {
            fn base(&self) -> &ResourceBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut ResourceBase {
                &mut self.base
            }
        }

        impl $ty {
            pub fn with_skeleton(mut self, skeleton: Skeleton) -> Self {
                self.base.skeleton = skeleton;
                self
            }

            pub fn with_name(mut self, name: &str) -> Self {
                self.base.name = Some(name.to_string());
                self
            }

            pub fn with_type(mut self, resource_type: &str) -> Self {
                self.base.resource_type = Some(resource_type.to_string());
                self
            }

            pub fn with_property(mut self, name: &str, value: &str) -> Self {
                self.set_property(name, value);
                self
            }

            pub fn as_referent(mut self) -> Self {
                self.base.referent = true;
                self
            }
        }
    )*};
}

resource_struct!(
    StartDocument,
    StartSubDocument,
    StartGroup,
    TextUnit,
    DocumentPart,
    Ending
);

/// Opens a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartDocument {
    #[serde(flatten)]
    base: ResourceBase,
    /// Source locale.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub locale: Option<LocaleId>,
    /// Target locales declared by a multilingual input.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    #[serde(default)]
    pub target_locales: BTreeSet<LocaleId>,
    /// Encoding the input was read with.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub has_bom: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Line break used by the input.
    #[serde(default = "default_line_break")]
    pub line_break: String,
    #[serde(default)]
    pub multilingual: bool,
    /// Id of the filter that produced the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub filter_id: Option<String>,
}

fn default_line_break() -> String {
    "\n".to_string()
}

impl StartDocument {
    pub fn new(id: &str) -> Self {
        Self {
            base: ResourceBase::new(id),
            locale: None,
            target_locales: BTreeSet::new(),
            encoding: None,
            has_bom: false,
            mime_type: None,
            line_break: default_line_break(),
            multilingual: false,
            filter_id: None,
        }
    }

    pub fn with_locale(mut self, locale: LocaleId) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn with_encoding(mut self, encoding: &str, has_bom: bool) -> Self {
        self.encoding = Some(encoding.to_string());
        self.has_bom = has_bom;
        self
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_string());
        self
    }

    pub fn with_line_break(mut self, line_break: &str) -> Self {
        self.line_break = line_break.to_string();
        self
    }

    pub fn with_filter_id(mut self, filter_id: &str) -> Self {
        self.filter_id = Some(filter_id.to_string());
        self
    }

    /// Declares a target locale present in the input and marks the
    /// document multilingual.
    pub fn with_target_locale(mut self, locale: LocaleId) -> Self {
        self.target_locales.insert(locale);
        self.multilingual = true;
        self
    }

    pub fn declares_target(&self, locale: &LocaleId) -> bool {
        self.target_locales.contains(locale)
    }
}

/// Opens a document embedded in another one (an archive entry, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSubDocument {
    #[serde(flatten)]
    base: ResourceBase,
    pub parent_id: String,
}

impl StartSubDocument {
    pub fn new(id: &str, parent_id: &str) -> Self {
        Self {
            base: ResourceBase::new(id),
            parent_id: parent_id.to_string(),
        }
    }
}

/// Opens a group of related resources (a list, a table, a dialog, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartGroup {
    #[serde(flatten)]
    base: ResourceBase,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl StartGroup {
    pub fn new(id: &str) -> Self {
        Self {
            base: ResourceBase::new(id),
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }
}

/// How [`TextUnit::create_target`] builds a new target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetCreation {
    /// Replace an existing target.
    pub overwrite: bool,
    /// Start from a copy of the source instead of an empty fragment.
    pub copy_content: bool,
    /// Copy resource-level properties as target properties of the locale.
    pub copy_properties: bool,
}

impl Default for TargetCreation {
    fn default() -> Self {
        Self {
            overwrite: false,
            copy_content: true,
            copy_properties: false,
        }
    }
}

impl TargetCreation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_copy_content(mut self, copy_content: bool) -> Self {
        self.copy_content = copy_content;
        self
    }

    pub fn with_copy_properties(mut self, copy_properties: bool) -> Self {
        self.copy_properties = copy_properties;
        self
    }
}

/// Translatable content: a source fragment and its per-locale targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    #[serde(flatten)]
    base: ResourceBase,
    source: TextFragment,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[serde(default)]
    targets: BTreeMap<LocaleId, TextFragment>,
    #[serde(default = "default_true")]
    pub translatable: bool,
    #[serde(default)]
    pub preserve_whitespace: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub mime_type: Option<String>,
}

fn default_true() -> bool {
    true
}

impl TextUnit {
    pub fn new(id: &str, source: TextFragment) -> Self {
        Self {
            base: ResourceBase::new(id),
            source,
            targets: BTreeMap::new(),
            translatable: true,
            preserve_whitespace: false,
            mime_type: None,
        }
    }

    pub fn with_translatable(mut self, translatable: bool) -> Self {
        self.translatable = translatable;
        self
    }

    pub fn with_preserve_whitespace(mut self, preserve: bool) -> Self {
        self.preserve_whitespace = preserve;
        self
    }

    pub fn source(&self) -> &TextFragment {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut TextFragment {
        &mut self.source
    }

    pub fn set_source(&mut self, source: TextFragment) {
        self.source = source;
    }

    pub fn target(&self, locale: &LocaleId) -> Option<&TextFragment> {
        self.targets.get(locale)
    }

    pub fn target_mut(&mut self, locale: &LocaleId) -> Option<&mut TextFragment> {
        self.targets.get_mut(locale)
    }

    pub fn set_target(&mut self, locale: &LocaleId, target: TextFragment) {
        self.targets.insert(locale.clone(), target);
    }

    pub fn remove_target(&mut self, locale: &LocaleId) -> Option<TextFragment> {
        self.targets.remove(locale)
    }

    pub fn has_target(&self, locale: &LocaleId) -> bool {
        self.targets.contains_key(locale)
    }

    pub fn target_locales(&self) -> impl Iterator<Item = &LocaleId> {
        self.targets.keys()
    }

    /// The target for `locale` when there is one, the source otherwise.
    pub fn content_for(&self, locale: Option<&LocaleId>) -> &TextFragment {
        locale
            .and_then(|locale| self.targets.get(locale))
            .unwrap_or(&self.source)
    }

    /// Returns the target for `locale`, creating it first if needed.
    ///
    /// Calling this twice with the same options is a no-op the second time:
    /// an existing target is only replaced when `options.overwrite` is set.
    /// Copied content keeps the source code ids so that source and target
    /// codes stay aligned.
    pub fn create_target(
        &mut self,
        locale: &LocaleId,
        options: TargetCreation,
    ) -> &mut TextFragment {
        let exists = self.targets.contains_key(locale);
        if !exists || options.overwrite {
            let content = if options.copy_content {
                self.source.clone()
            } else {
                TextFragment::new()
            };
            if options.copy_properties {
                let copied: Vec<(String, String)> = self
                    .base
                    .properties
                    .iter()
                    .filter(|(_, p)| !p.read_only)
                    .map(|(name, p)| (name.clone(), p.value.clone()))
                    .collect();
                for (name, value) in copied {
                    if options.overwrite || self.target_property(locale, &name).is_none() {
                        self.set_target_property(locale, &name, &value);
                    }
                }
            }
            self.targets.insert(locale.clone(), content);
        }
        self.targets.entry(locale.clone()).or_default()
    }
}

/// Non-translatable content that may still carry properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPart {
    #[serde(flatten)]
    base: ResourceBase,
}

impl DocumentPart {
    pub fn new(id: &str) -> Self {
        Self {
            base: ResourceBase::new(id),
        }
    }
}

/// Closes a document, sub-document or group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ending {
    #[serde(flatten)]
    base: ResourceBase,
}

impl Ending {
    pub fn new(id: &str) -> Self {
        Self {
            base: ResourceBase::new(id),
        }
    }
}

/// The payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    StartDocument(StartDocument),
    StartSubDocument(StartSubDocument),
    StartGroup(StartGroup),
    TextUnit(TextUnit),
    DocumentPart(DocumentPart),
    Ending(Ending),
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::StartDocument(_) => "start document",
            Resource::StartSubDocument(_) => "start subdocument",
            Resource::StartGroup(_) => "start group",
            Resource::TextUnit(_) => "text unit",
            Resource::DocumentPart(_) => "document part",
            Resource::Ending(_) => "ending",
        }
    }

    pub fn same_variant(&self, other: &Resource) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn as_text_unit(&self) -> Option<&TextUnit> {
        match self {
            Resource::TextUnit(unit) => Some(unit),
            _ => None,
        }
    }

    pub fn as_text_unit_mut(&mut self) -> Option<&mut TextUnit> {
        match self {
            Resource::TextUnit(unit) => Some(unit),
            _ => None,
        }
    }

    pub fn as_start_document(&self) -> Option<&StartDocument> {
        match self {
            Resource::StartDocument(doc) => Some(doc),
            _ => None,
        }
    }
}

impl AsResourceBase for Resource {
    fn base(&self) -> &ResourceBase {
        match self {
            Resource::StartDocument(r) => r.base(),
            Resource::StartSubDocument(r) => r.base(),
            Resource::StartGroup(r) => r.base(),
            Resource::TextUnit(r) => r.base(),
            Resource::DocumentPart(r) => r.base(),
            Resource::Ending(r) => r.base(),
        }
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        match self {
            Resource::StartDocument(r) => r.base_mut(),
            Resource::StartSubDocument(r) => r.base_mut(),
            Resource::StartGroup(r) => r.base_mut(),
            Resource::TextUnit(r) => r.base_mut(),
            Resource::DocumentPart(r) => r.base_mut(),
            Resource::Ending(r) => r.base_mut(),
        }
    }
}

impl From<StartDocument> for Resource {
    fn from(value: StartDocument) -> Self {
        Resource::StartDocument(value)
    }
}

impl From<StartSubDocument> for Resource {
    fn from(value: StartSubDocument) -> Self {
        Resource::StartSubDocument(value)
    }
}

impl From<StartGroup> for Resource {
    fn from(value: StartGroup) -> Self {
        Resource::StartGroup(value)
    }
}

impl From<TextUnit> for Resource {
    fn from(value: TextUnit) -> Self {
        Resource::TextUnit(value)
    }
}

impl From<DocumentPart> for Resource {
    fn from(value: DocumentPart) -> Self {
        Resource::DocumentPart(value)
    }
}

impl From<Ending> for Resource {
    fn from(value: Ending) -> Self {
        Resource::Ending(value)
    }
}
