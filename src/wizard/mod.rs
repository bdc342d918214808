//! Four-step token creation wizard
//!
//! The wizard walks an operator through category selection, basic
//! information, category-specific fields and a final review. Moving forward
//! is gated by each step's completion predicate; moving back is always
//! allowed and never discards input.

use crate::models::TokenCategory;
use crate::schema::{self, FieldDescriptor, FieldValue, ValidationError};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    Category,
    BasicInfo,
    Fields,
    Review,
}

impl WizardStep {
    /// 1-based position in the flow
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::Category => 1,
            WizardStep::BasicInfo => 2,
            WizardStep::Fields => 3,
            WizardStep::Review => 4,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::Category => "Select Token Category",
            WizardStep::BasicInfo => "Basic Information",
            WizardStep::Fields => "Configure Token",
            WizardStep::Review => "Review & Create",
        }
    }

    fn following(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Category => Some(WizardStep::BasicInfo),
            WizardStep::BasicInfo => Some(WizardStep::Fields),
            WizardStep::Fields => Some(WizardStep::Review),
            WizardStep::Review => None,
        }
    }

    fn preceding(&self) -> WizardStep {
        match self {
            WizardStep::Category | WizardStep::BasicInfo => WizardStep::Category,
            WizardStep::Fields => WizardStep::BasicInfo,
            WizardStep::Review => WizardStep::Fields,
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.title())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("Cannot leave {step}: {reason}")]
    StepIncomplete {
        step: WizardStep,
        reason: ValidationError,
    },

    #[error("Category can only be changed on the category step")]
    CategoryLocked,

    #[error("Already on the final step")]
    NoNextStep,

    #[error(transparent)]
    Field(#[from] ValidationError),
}

/// Operator input collected by the wizard
///
/// `dynamic_fields` only ever holds keys from the active category's schema:
/// values are checked against the schema on entry and cleared when the
/// category changes.
#[derive(Debug, Clone)]
pub struct WizardState {
    category: Option<TokenCategory>,
    token_name: String,
    description: String,
    dynamic_fields: BTreeMap<&'static str, FieldValue>,
    step: WizardStep,
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardState {
    pub fn new() -> Self {
        WizardState {
            category: None,
            token_name: String::new(),
            description: String::new(),
            dynamic_fields: BTreeMap::new(),
            step: WizardStep::Category,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn category(&self) -> Option<TokenCategory> {
        self.category
    }

    pub fn token_name(&self) -> &str {
        &self.token_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Schema of the selected category; empty until a category is chosen
    pub fn schema(&self) -> &'static [FieldDescriptor] {
        self.category.map(schema::fields_for).unwrap_or(&[])
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.dynamic_fields.get(name)
    }

    /// Entered values paired with their descriptors, in schema order
    pub fn fields(&self) -> impl Iterator<Item = (&'static FieldDescriptor, &FieldValue)> + '_ {
        self.schema()
            .iter()
            .filter_map(move |d| self.dynamic_fields.get(d.name).map(|v| (d, v)))
    }

    pub fn field_count(&self) -> usize {
        self.dynamic_fields.len()
    }

    /// Choose the token category. Only allowed on the first step; switching
    /// to a different category drops the previous category's field values.
    pub fn select_category(&mut self, category: TokenCategory) -> Result<(), WizardError> {
        if self.step != WizardStep::Category {
            return Err(WizardError::CategoryLocked);
        }
        if self.category != Some(category) && !self.dynamic_fields.is_empty() {
            log::debug!(
                "Category changed to {}, discarding {} field value(s)",
                category,
                self.dynamic_fields.len()
            );
            self.dynamic_fields.clear();
        }
        self.category = Some(category);
        Ok(())
    }

    pub fn set_token_name(&mut self, name: impl Into<String>) {
        self.token_name = name.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Enter a value for one of the active category's fields
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), WizardError> {
        let category = self.category.ok_or(ValidationError::MissingCategory)?;
        let descriptor =
            schema::find_field(category, name).ok_or_else(|| ValidationError::UnknownField {
                category,
                name: name.to_string(),
            })?;
        descriptor.check_value(&value)?;
        self.dynamic_fields.insert(descriptor.name, value);
        Ok(())
    }

    pub fn clear_field(&mut self, name: &str) -> Option<FieldValue> {
        self.dynamic_fields.remove(name)
    }

    /// Completion predicate of a step
    pub fn check_step(&self, step: WizardStep) -> Result<(), ValidationError> {
        match step {
            WizardStep::Category => self.category.map(|_| ()).ok_or(ValidationError::MissingCategory),
            WizardStep::BasicInfo => {
                if self.token_name.trim().is_empty() || self.description.trim().is_empty() {
                    Err(ValidationError::MissingBasicInfo)
                } else {
                    Ok(())
                }
            }
            // Required fields are enforced when the token is submitted
            WizardStep::Fields | WizardStep::Review => Ok(()),
        }
    }

    pub fn can_advance(&self) -> bool {
        self.step.following().is_some() && self.check_step(self.step).is_ok()
    }

    pub fn next(&mut self) -> Result<WizardStep, WizardError> {
        let following = self.step.following().ok_or(WizardError::NoNextStep)?;
        self.check_step(self.step)
            .map_err(|reason| WizardError::StepIncomplete {
                step: self.step,
                reason,
            })?;
        self.step = following;
        Ok(self.step)
    }

    pub fn back(&mut self) -> WizardStep {
        self.step = self.step.preceding();
        self.step
    }

    /// Rough completion percentage shown alongside the steps
    pub fn progress(&self) -> u8 {
        if self.category.is_none() {
            25
        } else if self.token_name.trim().is_empty() || self.description.trim().is_empty() {
            50
        } else if self.dynamic_fields.is_empty() {
            75
        } else {
            100
        }
    }

    pub fn review(&self) -> ReviewSummary {
        ReviewSummary {
            category: self.category.map(|c| c.label()).unwrap_or("None"),
            token_name: self.token_name.clone(),
            description: self.description.clone(),
            fields: self
                .fields()
                .map(|(d, v)| (d.label, v.display().to_string()))
                .collect(),
        }
    }
}

/// What the operator confirms on the review step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSummary {
    pub category: &'static str,
    pub token_name: String,
    pub description: String,
    pub fields: Vec<(&'static str, String)>,
}

impl fmt::Display for ReviewSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Basic Information")?;
        writeln!(f, "  Name: {}", self.token_name)?;
        writeln!(f, "  Category: {}", self.category)?;
        writeln!(f, "  Description: {}", self.description)?;
        writeln!(f, "Configuration")?;
        for (label, value) in &self.fields {
            writeln!(f, "  {}: {}", label, value)?;
        }
        Ok(())
    }
}
