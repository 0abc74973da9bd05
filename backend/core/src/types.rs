use chrono::{DateTime, Local, NaiveTime, TimeZone, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CatchUpError;

/// How often a person should be contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    /// Uniform-random interval of 3–14 days between contacts.
    Random,
    /// Catch-all for unrecognized persisted values. The calculator treats
    /// this as Weekly and logs it; it is never constructed by the app itself.
    #[serde(other)]
    Unknown,
}

impl Frequency {
    pub fn is_daily(self) -> bool {
        matches!(self, Frequency::Daily)
    }
}

/// Named time-of-day window for randomly drawn reminder times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Morning,
    Afternoon,
    Evening,
}

impl TimeWindow {
    /// Inclusive start hour and exclusive end hour for random draws.
    pub fn hour_bounds(self) -> (u32, u32) {
        match self {
            TimeWindow::Morning => (7, 11),
            TimeWindow::Afternoon => (13, 17),
            TimeWindow::Evening => (18, 22),
        }
    }
}

/// How the time-of-day for a reminder is chosen.
///
/// Exactly one variant is populated per person, which makes the
/// "fixed fields XOR window" invariant structural rather than validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeSelection {
    Fixed {
        time: NaiveTime,
        /// Anchor weekday, only meaningful for weekly/biweekly frequencies.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weekday: Option<Weekday>,
        /// Anchor day of month (1–31), only meaningful for monthly frequency.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        day_of_month: Option<u32>,
    },
    RandomWindow { window: TimeWindow },
}

/// Preferred contact channel. Display metadata only — scheduling never
/// consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactMethod {
    Call,
    Text,
    Dm,
    Other,
}

impl ContactMethod {
    /// Verb used in notification bodies ("Don't forget to {verb} {name}").
    pub fn verb(self) -> &'static str {
        match self {
            ContactMethod::Call => "call",
            ContactMethod::Text => "text",
            ContactMethod::Dm => "message",
            ContactMethod::Other => "reach out to",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ContactMethod::Call => "📞",
            ContactMethod::Text => "💬",
            ContactMethod::Dm => "📱",
            ContactMethod::Other => "✨",
        }
    }
}

/// A person the user wants to keep in touch with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub frequency: Frequency,
    pub time: TimeSelection,
    pub method: ContactMethod,
}

impl Person {
    /// Check cross-field consistency before the person is persisted.
    ///
    /// A fixed weekday anchor only makes sense for weekly/biweekly
    /// frequencies, a day-of-month anchor only for monthly.
    pub fn validate(&self) -> Result<(), CatchUpError> {
        if self.name.trim().is_empty() {
            return Err(CatchUpError::InvalidPerson("name is empty".into()));
        }
        if let TimeSelection::Fixed {
            weekday,
            day_of_month,
            ..
        } = &self.time
        {
            if weekday.is_some()
                && !matches!(self.frequency, Frequency::Weekly | Frequency::Biweekly)
            {
                return Err(CatchUpError::InvalidPerson(
                    "fixed weekday requires weekly or biweekly frequency".into(),
                ));
            }
            if let Some(dom) = day_of_month {
                if !matches!(self.frequency, Frequency::Monthly) {
                    return Err(CatchUpError::InvalidPerson(
                        "fixed day of month requires monthly frequency".into(),
                    ));
                }
                if !(1..=31).contains(dom) {
                    return Err(CatchUpError::InvalidPerson(format!(
                        "day of month {dom} out of range"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One computed, timestamped reminder instance for a person.
///
/// Name, method, and frequency are denormalized: display consumers and the
/// density constraint never need to join back to the person list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOccurrence {
    pub person_id: Uuid,
    pub person_name: String,
    pub method: ContactMethod,
    pub frequency: Frequency,
    /// Absolute fire time, epoch milliseconds on the local clock.
    pub fire_at_ms: i64,
    /// Local UTC-offset label captured when the occurrence was computed.
    pub timezone: String,
    pub fired: bool,
}

impl ScheduledOccurrence {
    pub fn new(person: &Person, fire_at: DateTime<Local>) -> Self {
        Self {
            person_id: person.id,
            person_name: person.name.clone(),
            method: person.method,
            frequency: person.frequency,
            fire_at_ms: fire_at.timestamp_millis(),
            timezone: fire_at.offset().to_string(),
            fired: false,
        }
    }

    pub fn fire_at(&self) -> DateTime<Local> {
        Local
            .timestamp_millis_opt(self.fire_at_ms)
            .single()
            .unwrap_or_else(Local::now)
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        !self.fired && self.fire_at_ms <= now.timestamp_millis()
    }

    pub fn alert_title(&self) -> String {
        format!("Time to catch up with {}!", self.person_name)
    }

    pub fn alert_body(&self) -> String {
        format!(
            "{} Don't forget to {} {}",
            self.method.emoji(),
            self.method.verb(),
            self.person_name
        )
    }
}

/// Notification permission as reported by the platform capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Default,
    Granted,
    Denied,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn fixed_person(frequency: Frequency, weekday: Option<Weekday>, dom: Option<u32>) -> Person {
        Person {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            frequency,
            time: TimeSelection::Fixed {
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                weekday,
                day_of_month: dom,
            },
            method: ContactMethod::Call,
        }
    }

    #[test]
    fn test_unknown_frequency_captured_on_parse() {
        let freq: Frequency = serde_json::from_str("\"fortnightly\"").unwrap();
        assert_eq!(freq, Frequency::Unknown);
    }

    #[test]
    fn test_person_roundtrip() {
        let person = fixed_person(Frequency::Weekly, Some(Weekday::Mon), None);
        let json = serde_json::to_string(&person).unwrap();
        let back: Person = serde_json::from_str(&json).unwrap();
        assert_eq!(person, back);
    }

    #[test]
    fn test_random_window_roundtrip() {
        let person = Person {
            id: Uuid::new_v4(),
            name: "Bob".to_string(),
            frequency: Frequency::Random,
            time: TimeSelection::RandomWindow {
                window: TimeWindow::Evening,
            },
            method: ContactMethod::Dm,
        };
        let json = serde_json::to_string(&person).unwrap();
        let back: Person = serde_json::from_str(&json).unwrap();
        assert_eq!(person, back);
    }

    #[test]
    fn test_validate_weekday_requires_weekly() {
        let person = fixed_person(Frequency::Monthly, Some(Weekday::Tue), None);
        assert!(person.validate().is_err());
        let person = fixed_person(Frequency::Biweekly, Some(Weekday::Tue), None);
        assert!(person.validate().is_ok());
    }

    #[test]
    fn test_validate_day_of_month_requires_monthly() {
        let person = fixed_person(Frequency::Weekly, None, Some(15));
        assert!(person.validate().is_err());
        let person = fixed_person(Frequency::Monthly, None, Some(31));
        assert!(person.validate().is_ok());
        let person = fixed_person(Frequency::Monthly, None, Some(32));
        assert!(person.validate().is_err());
    }

    #[test]
    fn test_occurrence_due_only_when_unfired() {
        let person = fixed_person(Frequency::Daily, None, None);
        let now = Local::now();
        let mut occ = ScheduledOccurrence::new(&person, now - chrono::Duration::minutes(1));
        assert!(occ.is_due(now));
        occ.fired = true;
        assert!(!occ.is_due(now));
    }
}
