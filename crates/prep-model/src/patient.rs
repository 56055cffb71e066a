use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::Gender;
use crate::ids::{ConditionId, PatientId, TenantId};

/// A patient owned by one organization.
///
/// Age is never stored; it is derived from `date_of_birth` on the
/// evaluation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub mrn: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Raw gender as recorded; see [`Gender::normalize`].
    #[serde(default)]
    pub gender: Option<String>,
    /// Next scheduled visit, used for dormancy bookkeeping.
    #[serde(default)]
    pub next_appointment: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Age in whole years on `on`, or `None` without a usable birth date.
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        if dob > on {
            return None;
        }
        let mut years = on.year() - dob.year();
        if (on.month(), on.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    pub fn normalized_gender(&self) -> Gender {
        Gender::normalize(self.gender.as_deref())
    }
}

/// A diagnosis recorded for a patient.
///
/// Conditions are never deleted; they are marked inactive instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientCondition {
    pub id: ConditionId,
    pub tenant_id: TenantId,
    pub patient_id: PatientId,
    pub condition_name: String,
    pub is_active: bool,
    #[serde(default)]
    pub diagnosis_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(dob: Option<NaiveDate>) -> Patient {
        Patient {
            id: PatientId::new(1),
            tenant_id: TenantId::new(1),
            mrn: None,
            date_of_birth: dob,
            gender: Some("F".to_string()),
            next_appointment: None,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn age_counts_whole_years() {
        let p = patient(NaiveDate::from_ymd_opt(1970, 6, 15));
        let before_birthday = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        let on_birthday = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(p.age_on(before_birthday), Some(54));
        assert_eq!(p.age_on(on_birthday), Some(55));
    }

    #[test]
    fn age_missing_without_birth_date() {
        let p = patient(None);
        assert_eq!(p.age_on(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()), None);
    }

    #[test]
    fn age_missing_for_future_birth_date() {
        let p = patient(NaiveDate::from_ymd_opt(2030, 1, 1));
        assert_eq!(p.age_on(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()), None);
    }
}
