//! Honeytoken categories and token records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of decoy asset a token stands for
///
/// The category selects the field schema used by the creation wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCategory {
    Image,
    Aws,
    Financial,
    Healthcare,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown token category: {0}")]
pub struct UnknownCategory(pub String);

impl TokenCategory {
    pub const ALL: [TokenCategory; 4] = [
        TokenCategory::Image,
        TokenCategory::Aws,
        TokenCategory::Financial,
        TokenCategory::Healthcare,
    ];

    /// Wire name sent to the token service
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenCategory::Image => "image",
            TokenCategory::Aws => "aws",
            TokenCategory::Financial => "financial",
            TokenCategory::Healthcare => "healthcare",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TokenCategory::Image => "Image Token",
            TokenCategory::Aws => "AWS Token",
            TokenCategory::Financial => "Financial Token",
            TokenCategory::Healthcare => "Healthcare Token",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TokenCategory::Image => "Secure tokens for image-based assets",
            TokenCategory::Aws => "Tokens for AWS service authentication",
            TokenCategory::Financial => "Secure financial transaction tokens",
            TokenCategory::Healthcare => "HIPAA-compliant healthcare tokens",
        }
    }
}

impl fmt::Display for TokenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" => Ok(TokenCategory::Image),
            "aws" => Ok(TokenCategory::Aws),
            "financial" => Ok(TokenCategory::Financial),
            "healthcare" => Ok(TokenCategory::Healthcare),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// A token issued by the token service for one successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque identifier
    pub token: String,
    pub category: TokenCategory,
    /// Location of the trackable artifact, when the category produces one
    pub image_url: Option<String>,
}

/// A token as listed by the token service for tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    #[serde(rename = "tokenName", default)]
    pub token_name: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "imageurl", alias = "imageUrl")]
    pub image_url: Option<String>,
}

/// Column a token listing is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSortField {
    Token,
    Category,
    TokenName,
    IsActive,
    CreatedAt,
}

impl FromStr for TokenSortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token" => Ok(TokenSortField::Token),
            "category" => Ok(TokenSortField::Category),
            "tokenName" | "token_name" | "name" => Ok(TokenSortField::TokenName),
            "is_active" | "active" | "status" => Ok(TokenSortField::IsActive),
            "created_at" | "created" => Ok(TokenSortField::CreatedAt),
            other => Err(format!("Unknown sort field: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Search, category filter and sort order for a token listing
#[derive(Debug, Clone)]
pub struct TokenQuery {
    pub search: String,
    /// `None` means all categories
    pub category: Option<TokenCategory>,
    pub sort_field: TokenSortField,
    pub direction: SortDirection,
}

impl Default for TokenQuery {
    fn default() -> Self {
        TokenQuery {
            search: String::new(),
            category: None,
            sort_field: TokenSortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl TokenQuery {
    /// Select a sort column; selecting the current column flips the direction
    pub fn toggle_sort(&mut self, field: TokenSortField) {
        if self.sort_field == field {
            self.direction = match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            };
        } else {
            self.sort_field = field;
            self.direction = SortDirection::Asc;
        }
    }

    pub fn matches(&self, record: &TokenRecord) -> bool {
        let needle = self.search.to_lowercase();
        let matches_search = needle.is_empty()
            || record.token.to_lowercase().contains(&needle)
            || record.token_name.to_lowercase().contains(&needle);
        let matches_category = match self.category {
            None => true,
            Some(category) => record.category == category.as_str(),
        };
        matches_search && matches_category
    }

    /// Filter and sort a listing, borrowing from the input
    pub fn apply<'a>(&self, records: &'a [TokenRecord]) -> Vec<&'a TokenRecord> {
        let mut selected: Vec<&TokenRecord> =
            records.iter().filter(|r| self.matches(r)).collect();

        selected.sort_by(|a, b| {
            let ordering = match self.sort_field {
                TokenSortField::Token => a.token.cmp(&b.token),
                TokenSortField::Category => a.category.cmp(&b.category),
                TokenSortField::TokenName => a.token_name.cmp(&b.token_name),
                TokenSortField::IsActive => a.is_active.cmp(&b.is_active),
                TokenSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            match self.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        selected
    }
}
