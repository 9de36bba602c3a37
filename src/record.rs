use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Enrollment lifecycle as reported by the record store. Unknown or
/// absent values deserialize to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    Enrolled,
    Completed,
    Dropped,
    #[default]
    #[serde(other)]
    Pending,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "Pending",
            EnrollmentStatus::Enrolled => "Enrolled",
            EnrollmentStatus::Completed => "Completed",
            EnrollmentStatus::Dropped => "Dropped",
        }
    }
}

/// One student row as delivered by the record store. Read-only to this
/// crate; `id` is the stable identity, `registration_no` the
/// human-readable one used for filenames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: i64,
    pub registration_no: String,
    pub full_name: String,
    pub nic_id: String,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub center_name: Option<String>,
    pub district: String,
    #[serde(default)]
    pub enrollment_status: EnrollmentStatus,
    #[serde(default)]
    pub enrollment_date: Option<NaiveDate>,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
}

impl StudentRecord {
    const NOT_ASSIGNED: &'static str = "Not assigned";

    pub fn course_label(&self) -> &str {
        match self.course_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => Self::NOT_ASSIGNED,
        }
    }

    pub fn center_label(&self) -> &str {
        match self.center_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => Self::NOT_ASSIGNED,
        }
    }

    pub fn enrollment_date_label(&self) -> String {
        match self.enrollment_date {
            Some(date) => date.format("%d/%m/%Y").to_string(),
            None => "Not specified".to_string(),
        }
    }

    /// Archive entry stem: registration number when present, numeric id
    /// otherwise.
    pub fn file_stem(&self) -> String {
        if self.registration_no.trim().is_empty() {
            self.id.to_string()
        } else {
            self.registration_no.clone()
        }
    }
}
