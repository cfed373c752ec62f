use std::collections::BTreeMap;

use crate::config::DobPolicy;

use super::domain::{DateOfBirth, IntakeForm, DOB_FIELD};

/// Normalizes raw submitted fields into the document that gets persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormDocumentBuilder {
    dob_policy: DobPolicy,
}

/// Raised by [`FormDocumentBuilder::validate`] under the strict date-of-birth policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dob '{raw}' is not a valid calendar date")]
pub struct InvalidDateOfBirth {
    pub raw: String,
}

impl FormDocumentBuilder {
    pub fn new(dob_policy: DobPolicy) -> Self {
        Self { dob_policy }
    }

    pub fn dob_policy(&self) -> DobPolicy {
        self.dob_policy
    }

    /// Checks the raw fields before any side effect happens. Lenient mode accepts everything.
    pub fn validate(&self, raw_fields: &BTreeMap<String, String>) -> Result<(), InvalidDateOfBirth> {
        if self.dob_policy == DobPolicy::Lenient {
            return Ok(());
        }

        let raw = raw_fields.get(DOB_FIELD).map(String::as_str).unwrap_or("");
        match DateOfBirth::parse(raw) {
            DateOfBirth::Parsed(_) => Ok(()),
            DateOfBirth::Invalid { raw } => Err(InvalidDateOfBirth { raw }),
        }
    }

    pub fn build(
        &self,
        raw_fields: &BTreeMap<String, String>,
        photo_id_url: &str,
        meds_list_url: &str,
    ) -> IntakeForm {
        let dob = DateOfBirth::parse(raw_fields.get(DOB_FIELD).map(String::as_str).unwrap_or(""));
        let fields = raw_fields
            .iter()
            .filter(|(key, _)| !IntakeForm::is_derived_field(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        IntakeForm {
            fields,
            dob,
            photo_id_url: photo_id_url.to_string(),
            meds_list_url: meds_list_url.to_string(),
        }
    }
}
