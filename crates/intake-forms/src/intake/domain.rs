use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub const DOB_FIELD: &str = "dob";
pub const PHOTO_ID_URL_FIELD: &str = "photoIdUrl";
pub const MEDS_LIST_URL_FIELD: &str = "medsListUrl";

/// The two attachments every intake form must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSlot {
    PhotoId,
    MedsList,
}

impl AttachmentSlot {
    pub const fn ordered() -> [Self; 2] {
        [Self::PhotoId, Self::MedsList]
    }

    /// Multipart part name the attachment arrives under.
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::PhotoId => "photoId",
            Self::MedsList => "medsList",
        }
    }

    /// Document field that receives the public URL.
    pub const fn url_field(self) -> &'static str {
        match self {
            Self::PhotoId => PHOTO_ID_URL_FIELD,
            Self::MedsList => MEDS_LIST_URL_FIELD,
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|slot| slot.field_name() == name)
    }
}

/// File part spooled to local disk by the multipart parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub local_path: PathBuf,
    /// Object key the file is stored under; the client supplied filename.
    pub original_name: String,
    pub size: u64,
}

/// Parsed multipart request as handed to the submission service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSubmission {
    pub fields: BTreeMap<String, String>,
    pub photo_id: Option<StagedFile>,
    pub meds_list: Option<StagedFile>,
}

impl FormSubmission {
    pub fn attachment(&self, slot: AttachmentSlot) -> Option<&StagedFile> {
        match slot {
            AttachmentSlot::PhotoId => self.photo_id.as_ref(),
            AttachmentSlot::MedsList => self.meds_list.as_ref(),
        }
    }

    pub fn set_attachment(&mut self, slot: AttachmentSlot, file: StagedFile) {
        match slot {
            AttachmentSlot::PhotoId => self.photo_id = Some(file),
            AttachmentSlot::MedsList => self.meds_list = Some(file),
        }
    }

    pub fn staged_files(&self) -> impl Iterator<Item = &StagedFile> {
        self.photo_id.iter().chain(self.meds_list.iter())
    }

    /// Owned spool paths, for cleanup that outlives the borrow of the submission.
    pub fn staged_paths(&self) -> Vec<PathBuf> {
        self.staged_files()
            .map(|file| file.local_path.clone())
            .collect()
    }
}

/// Date of birth as submitted. Unparseable input is kept as a marker rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateOfBirth {
    Parsed(NaiveDate),
    Invalid { raw: String },
}

impl DateOfBirth {
    /// Accepts `YYYY-MM-DD`, `MM/DD/YYYY`, or an RFC 3339 timestamp.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(trimmed)
                    .ok()
                    .map(|timestamp| timestamp.with_timezone(&Utc).date_naive())
            });

        match parsed {
            Some(date) => Self::Parsed(date),
            None => Self::Invalid {
                raw: raw.to_string(),
            },
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Parsed(date) => Some(*date),
            Self::Invalid { .. } => None,
        }
    }

    /// Midnight UTC on the parsed date, the instant the store keeps.
    pub fn to_utc_midnight(&self) -> Option<DateTime<Utc>> {
        self.date()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    /// Serialized form: `1990-01-01T00:00:00.000Z`, or `None` for the invalid marker.
    pub fn to_timestamp_string(&self) -> Option<String> {
        self.to_utc_midnight()
            .map(|instant| instant.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Composite document persisted once per successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeForm {
    /// Client fields passed through verbatim, minus the derived keys.
    pub fields: BTreeMap<String, String>,
    pub dob: DateOfBirth,
    pub photo_id_url: String,
    pub meds_list_url: String,
}

impl IntakeForm {
    pub fn is_derived_field(key: &str) -> bool {
        matches!(key, DOB_FIELD | PHOTO_ID_URL_FIELD | MEDS_LIST_URL_FIELD)
    }
}

impl Serialize for IntakeForm {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 3))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(DOB_FIELD, &self.dob.to_timestamp_string())?;
        map.serialize_entry(PHOTO_ID_URL_FIELD, &self.photo_id_url)?;
        map.serialize_entry(MEDS_LIST_URL_FIELD, &self.meds_list_url)?;
        map.end()
    }
}

/// Acknowledgement returned by the store for a single insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertConfirmation {
    pub acknowledged: bool,
    pub inserted_id: String,
}

/// A stored document as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredForm(pub Map<String, Value>);

impl StoredForm {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}
