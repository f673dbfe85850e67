//! Typed label model.
//!
//! Each diagnostic category is its own variant with its own fields. On disk a
//! label's conditions are a JSON object keyed by category name, e.g.
//! `{"Cataract": {"type": "Nuclear", "severity": "Mild"}}`.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

/// Defines a closed set of display-named values with serde and `Display`
macro_rules! value_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }

            /// Look a value up by its display name
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.as_str() == name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

value_enum! {
    /// Eye designation of a label
    Laterality { Left => "Left", Right => "Right", Indeterminate => "Indeterminate" }
}

value_enum! {
    /// Top-level diagnostic grouping
    ConditionCategory {
        DryEye => "Dry Eye Disease",
        Cataract => "Cataract",
        Infectious => "Infectious Keratitis/Conjunctivitis",
        Tumor => "Ocular Surface Tumors",
        Hemorrhage => "Subconjunctival Hemorrhage",
    }
}

value_enum! {
    Severity { Mild => "Mild", Moderate => "Moderate", Severe => "Severe" }
}

value_enum! {
    CataractType {
        Nuclear => "Nuclear",
        Cortical => "Cortical",
        Psc => "PSC",
        Mixed => "Mixed",
        Pseudophakia => "Pseudophakia",
        Aphakia => "Aphakia",
        Other => "Other",
    }
}

value_enum! {
    InfectiousType {
        Keratitis => "Infectious Keratitis",
        Conjunctivitis => "Infectious Conjunctivitis",
        NonInfectious => "Non-infectious",
        Scar => "Scar",
        Unclear => "Unclear",
    }
}

value_enum! {
    Etiology {
        Bacterial => "Bacterial",
        Fungal => "Fungal",
        Viral => "Viral",
        Acanthamoeba => "Acanthamoeba",
        Unknown => "Unknown",
    }
}

value_enum! {
    /// Size bucket of an infectious keratitis lesion
    LesionSize { Small => "<2mm", Medium => "2-5mm", Large => ">5mm" }
}

value_enum! {
    TumorType {
        NoLesion => "No lesion",
        Unclear => "Unclear",
        Pterygium => "Pterygium",
        Pinguecula => "Pinguecula",
        Nevus => "Nevus",
        Ossn => "OSSN",
        Papilloma => "Papilloma",
        Melanoma => "Melanoma",
        Other => "Other",
    }
}

value_enum! {
    Malignancy {
        Benign => "Benign",
        Premalignant => "Premalignant",
        Malignant => "Malignant",
        Uncertain => "Uncertain",
    }
}

value_enum! {
    TumorLocation {
        Conjunctiva => "Conjunctiva",
        Limbus => "Limbus",
        Cornea => "Cornea",
        Caruncle => "Caruncle",
        Eyelid => "Eyelid",
    }
}

value_enum! {
    Presence { Present => "Present", Absent => "Absent" }
}

value_enum! {
    HemorrhageExtent { Focal => "Focal", Sectoral => "Sectoral", Diffuse => "Diffuse" }
}

/// Image quality verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    Usable,
    #[serde(rename = "Not Usable", alias = "Non Usable", alias = "Non-usable")]
    NotUsable,
}

impl Quality {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usable => "Usable",
            Self::NotUsable => "Not Usable",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryEye {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cataract {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub cataract_type: Option<CataractType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infectious {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub infection_type: Option<InfectiousType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etiology: Option<Etiology>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<LesionSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tumor {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tumor_type: Option<TumorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malignancy: Option<Malignancy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<TumorLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hemorrhage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<Presence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<HemorrhageExtent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// One attached diagnostic category with its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    DryEye(DryEye),
    Cataract(Cataract),
    Infectious(Infectious),
    Tumor(Tumor),
    Hemorrhage(Hemorrhage),
}

/// `(sub-field, value)` pairs of one condition, one pair per selected value
pub type Tallies<'a> = SmallVec<[(&'static str, &'a str); 6]>;

impl Condition {
    #[must_use]
    pub fn category(&self) -> ConditionCategory {
        match self {
            Self::DryEye(_) => ConditionCategory::DryEye,
            Self::Cataract(_) => ConditionCategory::Cataract,
            Self::Infectious(_) => ConditionCategory::Infectious,
            Self::Tumor(_) => ConditionCategory::Tumor,
            Self::Hemorrhage(_) => ConditionCategory::Hemorrhage,
        }
    }

    /// Every set sub-field value. Multi-valued fields yield one pair per entry.
    #[must_use]
    pub fn tallies(&self) -> Tallies<'_> {
        let mut out = Tallies::new();
        match self {
            Self::DryEye(c) => {
                push_set(&mut out, "severity", c.severity.map(Severity::as_str));
                out.extend(c.signs.iter().map(|s| ("signs", s.as_str())));
            }
            Self::Cataract(c) => {
                push_set(&mut out, "type", c.cataract_type.map(CataractType::as_str));
                push_set(&mut out, "severity", c.severity.map(Severity::as_str));
                out.extend(c.features.iter().map(|f| ("features", f.as_str())));
            }
            Self::Infectious(c) => {
                push_set(&mut out, "type", c.infection_type.map(InfectiousType::as_str));
                push_set(&mut out, "etiology", c.etiology.map(Etiology::as_str));
                push_set(&mut out, "size", c.size.map(LesionSize::as_str));
            }
            Self::Tumor(c) => {
                push_set(&mut out, "type", c.tumor_type.map(TumorType::as_str));
                push_set(&mut out, "malignancy", c.malignancy.map(Malignancy::as_str));
                push_set(&mut out, "location", c.location.map(TumorLocation::as_str));
            }
            Self::Hemorrhage(c) => {
                push_set(&mut out, "presence", c.presence.map(Presence::as_str));
                push_set(&mut out, "extent", c.extent.map(HemorrhageExtent::as_str));
            }
        }
        out
    }
}

fn push_set(out: &mut Tallies<'_>, field: &'static str, value: Option<&'static str>) {
    if let Some(value) = value {
        out.push((field, value));
    }
}

/// The conditions attached to a label, at most one per category, in
/// insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a condition, replacing any existing one of the same category
    pub fn insert(&mut self, condition: Condition) {
        let category = condition.category();
        match self.0.iter_mut().find(|c| c.category() == category) {
            Some(slot) => *slot = condition,
            None => self.0.push(condition),
        }
    }

    /// Builder form of [`Conditions::insert`]
    #[must_use]
    pub fn with(mut self, condition: Condition) -> Self {
        self.insert(condition);
        self
    }

    #[must_use]
    pub fn get(&self, category: ConditionCategory) -> Option<&Condition> {
        self.0.iter().find(|c| c.category() == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Category names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|c| c.category().as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl Serialize for Conditions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for condition in &self.0 {
            let name = condition.category().as_str();
            match condition {
                Condition::DryEye(c) => map.serialize_entry(name, c)?,
                Condition::Cataract(c) => map.serialize_entry(name, c)?,
                Condition::Infectious(c) => map.serialize_entry(name, c)?,
                Condition::Tumor(c) => map.serialize_entry(name, c)?,
                Condition::Hemorrhage(c) => map.serialize_entry(name, c)?,
            }
        }
        map.end()
    }
}

const CATEGORY_NAMES: &[&str] = &[
    "Dry Eye Disease",
    "Cataract",
    "Infectious Keratitis/Conjunctivitis",
    "Ocular Surface Tumors",
    "Subconjunctival Hemorrhage",
];

struct ConditionsVisitor;

impl<'de> Visitor<'de> for ConditionsVisitor {
    type Value = Conditions;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map from condition category to its fields")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut conditions = Conditions::new();
        while let Some(name) = access.next_key::<String>()? {
            let category = ConditionCategory::from_name(&name).ok_or_else(|| {
                de::Error::unknown_variant(&name, CATEGORY_NAMES)
            })?;
            let condition = match category {
                ConditionCategory::DryEye => Condition::DryEye(access.next_value()?),
                ConditionCategory::Cataract => Condition::Cataract(access.next_value()?),
                ConditionCategory::Infectious => Condition::Infectious(access.next_value()?),
                ConditionCategory::Tumor => Condition::Tumor(access.next_value()?),
                ConditionCategory::Hemorrhage => Condition::Hemorrhage(access.next_value()?),
            };
            conditions.insert(condition);
        }
        Ok(conditions)
    }
}

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ConditionsVisitor)
    }
}

/// Record context captured when a label is saved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMetadata {
    #[serde(rename = "maskedid_studyid", default)]
    pub study_id: Option<String>,
    #[serde(default)]
    pub exam_date: Option<NaiveDate>,
    #[serde(rename = "pat_mrn", default)]
    pub patient_id: Option<String>,
}

/// What a reviewer submits for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInput {
    pub laterality: Laterality,
    pub quality: Quality,
    pub conditions: Conditions,
    pub image_path: Option<String>,
    pub metadata: LabelMetadata,
}

impl LabelInput {
    #[must_use]
    pub fn new(laterality: Laterality, quality: Quality) -> Self {
        Self {
            laterality,
            quality,
            conditions: Conditions::new(),
            image_path: None,
            metadata: LabelMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.insert(condition);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: LabelMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_image_path(mut self, image_path: impl Into<String>) -> Self {
        self.image_path = Some(image_path.into());
        self
    }
}

pub(crate) mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::config::DATETIME_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(DATETIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// One saved version of a label, without its history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub laterality: Laterality,
    pub quality: Quality,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub metadata: LabelMetadata,
    pub labeled_by: String,
    #[serde(with = "timestamp")]
    pub labeled_at: NaiveDateTime,
    #[serde(default)]
    pub is_edit: bool,
}

impl LabelSnapshot {
    /// Input that reproduces this version
    #[must_use]
    pub fn to_input(&self) -> LabelInput {
        LabelInput {
            laterality: self.laterality,
            quality: self.quality,
            conditions: self.conditions.clone(),
            image_path: self.image_path.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A superseded version and when it was replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub snapshot: LabelSnapshot,
    #[serde(with = "timestamp")]
    pub edited_at: NaiveDateTime,
}

/// The current version of a label plus its append-only edit history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    #[serde(flatten)]
    pub current: LabelSnapshot,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edit_history: Vec<HistoryEntry>,
}
