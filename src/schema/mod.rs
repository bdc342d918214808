//! Per-category field schemas for token creation
//!
//! Each [`TokenCategory`] maps to an ordered, compile-time list of
//! [`FieldDescriptor`]s. Adding a category is a new enum variant plus one arm
//! in [`fields_for`]; the exhaustive match catches a forgotten table.

use crate::models::TokenCategory;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// One entry of a select field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Input kind of a field, carrying only the data that kind needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text { placeholder: Option<&'static str> },
    Select { options: &'static [SelectOption] },
    File { accept: &'static str },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text { .. } => "text",
            FieldKind::Select { .. } => "select",
            FieldKind::File { .. } => "file",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// Unique key within the category; also the multipart part name
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

/// A binary attachment for a file field
#[derive(Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileBlob {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = guess_content_type(&file_name).map(String::from);
        FileBlob {
            file_name,
            content_type,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl fmt::Debug for FileBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBlob")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Value entered for a dynamic field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    /// The `value` of a select option
    Choice(String),
    File(FileBlob),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => s.trim().is_empty(),
            FieldValue::File(blob) => blob.file_name.is_empty(),
        }
    }

    /// Short human-readable form; files show their name
    pub fn display(&self) -> &str {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => s,
            FieldValue::File(blob) => &blob.file_name,
        }
    }
}

/// A wizard field failed validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Category is required")]
    MissingCategory,

    #[error("Token name and description are required")]
    MissingBasicInfo,

    #[error("{label} is required")]
    MissingField { label: &'static str },

    #[error("Field '{name}' is not defined for {category} tokens")]
    UnknownField { category: TokenCategory, name: String },

    #[error("{label} expects a {expected} value")]
    KindMismatch { label: &'static str, expected: &'static str },

    #[error("'{value}' is not a valid option for {label}")]
    InvalidOption { label: &'static str, value: String },

    #[error("{label} only accepts {accept}")]
    UnacceptedFile { label: &'static str, accept: &'static str },
}

impl FieldDescriptor {
    pub fn options(&self) -> &'static [SelectOption] {
        match self.kind {
            FieldKind::Select { options } => options,
            _ => &[],
        }
    }

    /// Check that a value fits this field's kind and constraints
    pub fn check_value(&self, value: &FieldValue) -> Result<(), ValidationError> {
        match (self.kind, value) {
            (FieldKind::Text { .. }, FieldValue::Text(_)) => Ok(()),
            (FieldKind::Select { options }, FieldValue::Choice(choice)) => {
                if choice.is_empty() || options.iter().any(|o| o.value == choice.as_str()) {
                    Ok(())
                } else {
                    Err(ValidationError::InvalidOption {
                        label: self.label,
                        value: choice.clone(),
                    })
                }
            }
            (FieldKind::File { accept }, FieldValue::File(blob)) => {
                if accept_matches(accept, blob.content_type.as_deref(), &blob.file_name) {
                    Ok(())
                } else {
                    Err(ValidationError::UnacceptedFile {
                        label: self.label,
                        accept,
                    })
                }
            }
            (kind, _) => Err(ValidationError::KindMismatch {
                label: self.label,
                expected: kind.name(),
            }),
        }
    }
}

const AWS_REGIONS: &[SelectOption] = &[
    SelectOption { value: "us-east-1", label: "US East (N. Virginia)" },
    SelectOption { value: "us-west-2", label: "US West (Oregon)" },
    SelectOption { value: "eu-west-1", label: "EU (Ireland)" },
    SelectOption { value: "ap-south-1", label: "Asia Pacific (Mumbai)" },
];

const AWS_SERVICES: &[SelectOption] = &[
    SelectOption { value: "s3", label: "S3" },
    SelectOption { value: "ec2", label: "EC2" },
    SelectOption { value: "lambda", label: "Lambda" },
    SelectOption { value: "dynamodb", label: "DynamoDB" },
];

const FINANCIAL_TYPES: &[SelectOption] = &[
    SelectOption { value: "credit_card", label: "Credit Card" },
    SelectOption { value: "bank_account", label: "Bank Account" },
    SelectOption { value: "api_key", label: "Payment Gateway API Key" },
    SelectOption { value: "crypto", label: "Cryptocurrency" },
];

const TRANSACTION_TYPES: &[SelectOption] = &[
    SelectOption { value: "payment", label: "Payment Processing" },
    SelectOption { value: "refund", label: "Refund Processing" },
    SelectOption { value: "subscription", label: "Subscription Management" },
];

const HEALTHCARE_SYSTEMS: &[SelectOption] = &[
    SelectOption { value: "ehr", label: "Electronic Health Records" },
    SelectOption { value: "pms", label: "Patient Management System" },
    SelectOption { value: "lab", label: "Laboratory System" },
    SelectOption { value: "imaging", label: "Medical Imaging" },
];

const ACCESS_LEVELS: &[SelectOption] = &[
    SelectOption { value: "read", label: "Read Only" },
    SelectOption { value: "write", label: "Read/Write" },
    SelectOption { value: "admin", label: "Administrative" },
];

static IMAGE_FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
    name: "file",
    label: "Upload Image",
    required: true,
    kind: FieldKind::File { accept: "image/*" },
}];

static AWS_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "awsRegion",
        label: "AWS Region",
        required: true,
        kind: FieldKind::Select { options: AWS_REGIONS },
    },
    FieldDescriptor {
        name: "awsService",
        label: "AWS Service",
        required: true,
        kind: FieldKind::Select { options: AWS_SERVICES },
    },
];

static FINANCIAL_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "financialType",
        label: "Financial Type",
        required: true,
        kind: FieldKind::Select { options: FINANCIAL_TYPES },
    },
    FieldDescriptor {
        name: "transactionType",
        label: "Transaction Type",
        required: true,
        kind: FieldKind::Select { options: TRANSACTION_TYPES },
    },
];

static HEALTHCARE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "healthcareSystem",
        label: "Healthcare System",
        required: true,
        kind: FieldKind::Select { options: HEALTHCARE_SYSTEMS },
    },
    FieldDescriptor {
        name: "patientIdFormat",
        label: "Patient ID Format",
        required: true,
        kind: FieldKind::Text {
            placeholder: Some("Enter patient ID format (e.g., MRN-####)"),
        },
    },
    FieldDescriptor {
        name: "accessLevel",
        label: "Access Level",
        required: true,
        kind: FieldKind::Select { options: ACCESS_LEVELS },
    },
];

/// Ordered field list for a category
pub fn fields_for(category: TokenCategory) -> &'static [FieldDescriptor] {
    match category {
        TokenCategory::Image => IMAGE_FIELDS,
        TokenCategory::Aws => AWS_FIELDS,
        TokenCategory::Financial => FINANCIAL_FIELDS,
        TokenCategory::Healthcare => HEALTHCARE_FIELDS,
    }
}

/// Field list by wire name; unknown names have no fields
pub fn fields_for_name(category: &str) -> &'static [FieldDescriptor] {
    category.parse().map(fields_for).unwrap_or(&[])
}

pub fn find_field(category: TokenCategory, name: &str) -> Option<&'static FieldDescriptor> {
    fields_for(category).iter().find(|f| f.name == name)
}

/// Evaluate an HTML-style accept list (`image/*`, `image/png`, `.png`)
pub fn accept_matches(accept: &str, content_type: Option<&str>, file_name: &str) -> bool {
    let file_name = file_name.to_lowercase();
    let content_type = content_type.map(str::to_lowercase);

    accept
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .any(|pattern| {
            if pattern.starts_with('.') {
                file_name.ends_with(&pattern)
            } else if let Some(major) = pattern.strip_suffix("/*") {
                content_type
                    .as_deref()
                    .and_then(|ct| ct.split('/').next())
                    .map_or(false, |ct_major| ct_major == major)
            } else {
                content_type.as_deref() == Some(pattern.as_str())
            }
        })
}

/// Content type from a file extension, for the formats tokens are made from
pub fn guess_content_type(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => return None,
    };
    Some(mime)
}
