use crate::error::CardPressError;
use crate::record::StudentRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};

/// Canonical verification record embedded in a card's QR code.
///
/// Every field except `timestamp` round-trips byte-for-byte from the
/// source record; `timestamp` is the encoding time, so two encodings of
/// the same record differ only there. Optional source fields are
/// substituted with printable defaults, never nulls, so verifying
/// scanners always see strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationPayload {
    pub student_id: i64,
    pub registration_no: String,
    pub full_name: String,
    pub nic_id: String,
    pub course_name: String,
    pub center_name: String,
    pub enrollment_status: String,
    pub timestamp: String,
}

impl VerificationPayload {
    pub fn from_record(record: &StudentRecord, now: DateTime<Utc>) -> Self {
        Self {
            student_id: record.id,
            registration_no: record.registration_no.clone(),
            full_name: record.full_name.clone(),
            nic_id: record.nic_id.clone(),
            course_name: record.course_label().to_string(),
            center_name: record.center_label().to_string(),
            enrollment_status: record.enrollment_status.as_str().to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn to_json(&self) -> Result<String, CardPressError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Square QR module grid. `true` modules are dark.
#[derive(Debug, Clone)]
pub struct QrMatrix {
    width: usize,
    modules: Vec<bool>,
}

impl QrMatrix {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.modules
            .get(y * self.width + x)
            .copied()
            .unwrap_or(false)
    }
}

/// Encode arbitrary text at error-correction level H. The highest
/// redundancy level tolerates print degradation and partial occlusion
/// of the printed code.
pub fn encode_qr(data: &str) -> Result<QrMatrix, CardPressError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
        .map_err(|err| CardPressError::Encode(format!("qr encode failed: {err}")))?;
    let width = code.width();
    let modules = code
        .to_colors()
        .into_iter()
        .map(|color| color == qrcode::Color::Dark)
        .collect();
    Ok(QrMatrix { width, modules })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;
    use chrono::TimeZone;

    #[test]
    fn payload_round_trips_every_field_except_timestamp() {
        let record = sample_record(7);
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 1).unwrap();

        let a = VerificationPayload::from_record(&record, t0);
        let json = a.to_json().unwrap();
        let decoded: VerificationPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, a);

        let b = VerificationPayload::from_record(&record, t1);
        assert_ne!(a.timestamp, b.timestamp);
        assert_eq!(a.student_id, b.student_id);
        assert_eq!(a.registration_no, b.registration_no);
        assert_eq!(a.full_name, b.full_name);
        assert_eq!(a.nic_id, b.nic_id);
        assert_eq!(a.course_name, b.course_name);
        assert_eq!(a.center_name, b.center_name);
        assert_eq!(a.enrollment_status, b.enrollment_status);
    }

    #[test]
    fn missing_optionals_become_printable_defaults() {
        let mut record = sample_record(2);
        record.course_name = None;
        record.center_name = None;
        record.enrollment_status = Default::default();
        let payload =
            VerificationPayload::from_record(&record, Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(payload.course_name, "Not assigned");
        assert_eq!(payload.center_name, "Not assigned");
        assert_eq!(payload.enrollment_status, "Pending");
    }

    #[test]
    fn qr_matrix_is_square_and_has_finder_pattern() {
        let matrix = encode_qr("{\"student_id\":1}").unwrap();
        assert!(matrix.width() >= 21);
        // Top-left finder pattern corner module is always dark.
        assert!(matrix.is_dark(0, 0));
        // Out-of-range lookups are light rather than a panic.
        assert!(!matrix.is_dark(matrix.width() + 3, 0));
    }
}
