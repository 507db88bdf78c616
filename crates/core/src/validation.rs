//! Credential validation
//!
//! Two stages: a structural completeness check on the raw credential bag
//! (no I/O, closed per-provider field list), then delegation to the
//! provider's live check with the parsed candidate. The two failure modes
//! carry different codes so callers can render different guidance.

use serde_json::Value;

use crate::credentials::{ProviderKind, StorageCredentials};
use crate::error::{Error, Result, ValidationCode};
use crate::traits::{StorageProvider, ValidationResult};

#[derive(Debug, Default)]
pub struct ValidationService;

impl ValidationService {
    pub fn new() -> Self {
        Self
    }

    /// Names of required fields the bag leaves absent or empty.
    ///
    /// Purely structural; never touches the network.
    pub fn missing_fields(&self, kind: ProviderKind, bag: &Value) -> Vec<&'static str> {
        kind.required_fields()
            .iter()
            .copied()
            .filter(|field| match bag.get(*field) {
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(Value::Null) | None => true,
                Some(_) => false,
            })
            .collect()
    }

    /// Parse a raw bag into the typed credential set for `kind`
    pub fn parse_candidate(&self, kind: ProviderKind, bag: &Value) -> Result<StorageCredentials> {
        let mut object = bag
            .as_object()
            .cloned()
            .ok_or_else(|| Error::Configuration("credential bag must be a JSON object".into()))?;
        object.insert("provider".into(), Value::String(kind.as_str().into()));
        serde_json::from_value(Value::Object(object))
            .map_err(|e| Error::Configuration(format!("invalid credential bag: {e}")))
    }

    /// Validate a candidate credential bag for `kind`.
    ///
    /// Only a structurally complete bag reaches the provider's live check;
    /// incomplete bags come back as `MISSING_FIELDS` without any network
    /// call.
    pub async fn validate(
        &self,
        provider: &dyn StorageProvider,
        kind: ProviderKind,
        bag: &Value,
    ) -> Result<ValidationResult> {
        let missing = self.missing_fields(kind, bag);
        if !missing.is_empty() {
            tracing::debug!(%kind, ?missing, "credential bag structurally incomplete");
            return Ok(ValidationResult::failure(
                ValidationCode::MissingFields,
                format!("missing required fields for {kind}: {}", missing.join(", ")),
            )
            .with_suggestions(
                missing
                    .iter()
                    .map(|field| format!("provide a value for `{field}`"))
                    .collect(),
            ));
        }

        let candidate = self.parse_candidate(kind, bag)?;
        provider.validate_credentials(&candidate).await
    }
}
