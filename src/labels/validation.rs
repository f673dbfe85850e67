//! Label validation, run before anything is persisted.

use crate::labels::model::{
    Cataract, CataractType, Condition, ConditionCategory, Hemorrhage, Infectious, InfectiousType,
    LabelInput, Presence, Quality, Tumor, TumorType,
};

/// Why a label was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A field the category needs in its current state is unset
    #[error("{category}: {field} is required")]
    MissingField {
        category: ConditionCategory,
        field: &'static str,
    },

    /// Usable images need at least one condition category
    #[error("At least one condition is required for a usable image")]
    NoConditions,
}

fn require<T>(value: Option<T>, category: ConditionCategory, field: &'static str) -> Result<(), ValidationError> {
    match value {
        Some(_) => Ok(()),
        None => Err(ValidationError::MissingField { category, field }),
    }
}

fn validate_cataract(c: &Cataract) -> Result<(), ValidationError> {
    let category = ConditionCategory::Cataract;
    require(c.cataract_type, category, "type")?;
    if matches!(
        c.cataract_type,
        Some(CataractType::Nuclear | CataractType::Cortical | CataractType::Psc)
    ) {
        require(c.severity, category, "severity")?;
    }
    Ok(())
}

fn validate_infectious(c: &Infectious) -> Result<(), ValidationError> {
    let category = ConditionCategory::Infectious;
    require(c.infection_type, category, "type")?;
    if matches!(
        c.infection_type,
        Some(InfectiousType::Keratitis | InfectiousType::Conjunctivitis)
    ) {
        require(c.etiology, category, "etiology")?;
    }
    if c.infection_type == Some(InfectiousType::Keratitis) {
        require(c.size, category, "size")?;
    }
    Ok(())
}

fn validate_tumor(c: &Tumor) -> Result<(), ValidationError> {
    let category = ConditionCategory::Tumor;
    require(c.tumor_type, category, "type")?;
    if !matches!(c.tumor_type, Some(TumorType::NoLesion | TumorType::Unclear)) {
        require(c.malignancy, category, "malignancy")?;
        require(c.location, category, "location")?;
    }
    Ok(())
}

fn validate_hemorrhage(c: &Hemorrhage) -> Result<(), ValidationError> {
    let category = ConditionCategory::Hemorrhage;
    require(c.presence, category, "presence")?;
    if c.presence == Some(Presence::Present) {
        require(c.extent, category, "extent")?;
    }
    Ok(())
}

impl Condition {
    /// Check required and conditionally required fields
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::DryEye(c) => require(c.severity, ConditionCategory::DryEye, "severity"),
            Self::Cataract(c) => validate_cataract(c),
            Self::Infectious(c) => validate_infectious(c),
            Self::Tumor(c) => validate_tumor(c),
            Self::Hemorrhage(c) => validate_hemorrhage(c),
        }
    }
}

impl LabelInput {
    /// Reject incomplete labels. Non-usable images need no conditions.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quality == Quality::NotUsable {
            return Ok(());
        }
        if self.conditions.is_empty() {
            return Err(ValidationError::NoConditions);
        }
        self.conditions.iter().try_for_each(Condition::validate)
    }

    /// The form that gets stored: non-usable labels carry no conditions
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.quality == Quality::NotUsable {
            self.conditions.clear();
        }
        self
    }
}
