//! Boundary parsing of backend payloads into typed records.
//!
//! Every response body goes through one of these functions before the rest of
//! the crate sees it. Anything that does not fit the record shape, or breaks a
//! lead invariant, is a [`SchemaError`].

use serde::de::DeserializeOwned;
use serde_json::error::Category;
use shared::{
    domain::{ConversionStatus, LeadStatus},
    error::ApiError,
    protocol::{AnalyticsSummary, Client, Lead, LoginResponse, Page, Task, UserSummary},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{entity} payload is not valid JSON: {detail}")]
    Syntax { entity: &'static str, detail: String },
    #[error("{entity} payload has the wrong shape: {detail}")]
    Shape { entity: &'static str, detail: String },
    #[error("{entity} field `{field}` is inconsistent: {detail}")]
    Field {
        entity: &'static str,
        field: &'static str,
        detail: String,
    },
}

/// A record that can arrive from the backend.
pub trait Record: DeserializeOwned {
    const ENTITY: &'static str;

    fn validate(&self) -> Result<(), SchemaError> {
        Ok(())
    }
}

impl Record for Lead {
    const ENTITY: &'static str = "lead";

    fn validate(&self) -> Result<(), SchemaError> {
        let field = |field, detail: &str| SchemaError::Field {
            entity: Self::ENTITY,
            field,
            detail: format!("lead {}: {detail}", self.id),
        };
        if self.status == LeadStatus::Converted
            && self.conversion_status != Some(ConversionStatus::Converted)
        {
            return Err(field(
                "conversionStatus",
                "converted lead without an approved conversion",
            ));
        }
        if self.conversion_message.is_some()
            && !matches!(
                self.conversion_status,
                Some(ConversionStatus::Converted | ConversionStatus::Denied)
            )
        {
            return Err(field(
                "conversionMessage",
                "message present without a decision",
            ));
        }
        Ok(())
    }
}

impl Record for Client {
    const ENTITY: &'static str = "client";
}

impl Record for Task {
    const ENTITY: &'static str = "task";
}

impl Record for UserSummary {
    const ENTITY: &'static str = "user";
}

impl Record for AnalyticsSummary {
    const ENTITY: &'static str = "analytics";
}

impl Record for LoginResponse {
    const ENTITY: &'static str = "login";
}

impl Record for ApiError {
    const ENTITY: &'static str = "error";
}

impl<T: Record> Record for Page<T> {
    const ENTITY: &'static str = "page";

    fn validate(&self) -> Result<(), SchemaError> {
        self.items.iter().try_for_each(Record::validate)
    }
}

pub fn parse<T: Record>(body: &[u8]) -> Result<T, SchemaError> {
    let value: T = serde_json::from_slice(body).map_err(|err| match err.classify() {
        Category::Data => SchemaError::Shape {
            entity: T::ENTITY,
            detail: err.to_string(),
        },
        Category::Io | Category::Syntax | Category::Eof => SchemaError::Syntax {
            entity: T::ENTITY,
            detail: err.to_string(),
        },
    })?;
    value.validate()?;
    Ok(value)
}

pub fn parse_page<T: Record>(body: &[u8]) -> Result<Page<T>, SchemaError> {
    parse(body)
}

#[cfg(test)]
#[path = "tests/schema_tests.rs"]
mod tests;
