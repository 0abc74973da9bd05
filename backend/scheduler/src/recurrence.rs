//! Pure recurrence computation: person rule + reference time + existing
//! schedule → next fire time.
//!
//! Step order is fixed: base advance, fixed-day override, time assignment,
//! density constraint, past-time guard. The density loop runs before the
//! guard, and a guard advance does not re-enter the density loop.

use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Weekday,
};
use rand::Rng;
use tracing::{debug, warn};

use catchup_core::{Frequency, Person, ScheduledOccurrence, TimeSelection};

/// Maximum other non-daily occurrences allowed on one calendar day.
pub const DENSITY_CAP: usize = 3;

/// Upper bound on density-displacement attempts; after this the last
/// candidate is accepted regardless, guaranteeing termination.
pub const MAX_DENSITY_ATTEMPTS: usize = 30;

/// Bounds (inclusive) for the "random" frequency interval, in days.
pub const RANDOM_INTERVAL_DAYS: (i64, i64) = (3, 14);

/// Compute the next occurrence for `person` strictly after `reference`.
///
/// Deterministic for every frequency and time mode except the explicit
/// random draws (`Frequency::Random` and `TimeSelection::RandomWindow`),
/// which go through the injected `rng`.
pub fn compute_next<R: Rng>(
    person: &Person,
    reference: DateTime<Local>,
    existing: &[ScheduledOccurrence],
    rng: &mut R,
) -> DateTime<Local> {
    let frequency = effective_frequency(person);

    // Steps 1–2: pick the candidate date.
    let mut date = match &person.time {
        TimeSelection::Fixed {
            time,
            weekday: Some(weekday),
            ..
        } if matches!(frequency, Frequency::Weekly | Frequency::Biweekly) => {
            next_weekday_date(reference, *weekday, *time, period_days(frequency))
        }
        TimeSelection::Fixed {
            time,
            day_of_month: Some(dom),
            ..
        } if matches!(frequency, Frequency::Monthly) => {
            next_day_of_month(reference, *dom, *time)
        }
        _ => advance_date(reference.date_naive(), frequency, rng),
    };

    // Step 3: time of day.
    let time = match &person.time {
        TimeSelection::Fixed { time, .. } => *time,
        TimeSelection::RandomWindow { window } => {
            let (start, end) = window.hour_bounds();
            let hour = rng.random_range(start..end);
            let minute = rng.random_range(0..60u32);
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
        }
    };

    // Step 4: spread non-daily reminders across calendar days.
    if !frequency.is_daily() {
        for attempt in 0..MAX_DENSITY_ATTEMPTS {
            if !date_is_saturated(date, person, existing) {
                break;
            }
            debug!(
                person = %person.name,
                date = %date,
                attempt,
                "Candidate day already holds {DENSITY_CAP}+ reminders, advancing"
            );
            date = advance_date(date, frequency, rng);
        }
    }

    // Step 5: never return a timestamp at or before the reference.
    past_time_guard(localize(date.and_time(time)), reference, frequency, rng)
}

/// Unknown frequencies are a data-integrity defect, not a crash: fall back
/// to weekly and log for diagnosis.
fn effective_frequency(person: &Person) -> Frequency {
    if person.frequency == Frequency::Unknown {
        warn!(
            person = %person.name,
            "Unknown frequency in persisted state, falling back to weekly"
        );
        Frequency::Weekly
    } else {
        person.frequency
    }
}

fn period_days(frequency: Frequency) -> i64 {
    match frequency {
        Frequency::Biweekly => 14,
        _ => 7,
    }
}

/// One periodic step forward from `date`, per the person's frequency.
fn advance_date<R: Rng>(date: NaiveDate, frequency: Frequency, rng: &mut R) -> NaiveDate {
    match frequency {
        Frequency::Daily => date + Duration::days(1),
        Frequency::Weekly | Frequency::Unknown => date + Duration::days(7),
        Frequency::Biweekly => date + Duration::days(14),
        // Day-of-month clamps to the shorter month (Jan 31 + 1 → Feb 28/29).
        Frequency::Monthly => date
            .checked_add_months(Months::new(1))
            .unwrap_or(date + Duration::days(30)),
        Frequency::Random => {
            let (lo, hi) = RANDOM_INTERVAL_DAYS;
            date + Duration::days(rng.random_range(lo..=hi))
        }
    }
}

/// Next calendar date falling on `weekday`, strictly after `reference`
/// except that today qualifies while the fixed clock time is still ahead.
fn next_weekday_date(
    reference: DateTime<Local>,
    weekday: Weekday,
    time: NaiveTime,
    period: i64,
) -> NaiveDate {
    let today = reference.date_naive();
    let ahead = (weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    if ahead == 0 {
        if time > reference.time() {
            today
        } else {
            today + Duration::days(period)
        }
    } else {
        today + Duration::days(ahead)
    }
}

/// Next calendar date on `day_of_month` (clamped to the month's length),
/// this month if still ahead of `reference`, otherwise next month.
fn next_day_of_month(reference: DateTime<Local>, day_of_month: u32, time: NaiveTime) -> NaiveDate {
    let today = reference.date_naive();
    let this_month = clamp_to_month(today.year(), today.month(), day_of_month);
    if this_month > today || (this_month == today && time > reference.time()) {
        this_month
    } else {
        let next = this_month
            .checked_add_months(Months::new(1))
            .unwrap_or(this_month + Duration::days(30));
        // Re-clamp against the target month rather than carrying this
        // month's clamp forward (Feb 28 + 1 month must yield Mar 28 → 31
        // when the anchor is 31).
        clamp_to_month(next.year(), next.month(), day_of_month)
    }
}

fn clamp_to_month(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| last_day_of_month(year, month))
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN));
    first
        .checked_add_months(Months::new(1))
        .map(|next| next - Duration::days(1))
        .unwrap_or(first)
}

/// True when `date` already holds `DENSITY_CAP` or more non-daily
/// occurrences belonging to *other* persons. Daily persons never count and
/// the person being scheduled never counts against itself.
fn date_is_saturated(date: NaiveDate, person: &Person, existing: &[ScheduledOccurrence]) -> bool {
    let count = existing
        .iter()
        .filter(|occ| occ.person_id != person.id)
        .filter(|occ| !occ.frequency.is_daily())
        .filter(|occ| occ.fire_at().date_naive() == date)
        .count();
    count >= DENSITY_CAP
}

/// Advance one more recurrence step when the candidate is not strictly in
/// the future (clock skew, slow execution, a stale reference).
pub(crate) fn past_time_guard<R: Rng>(
    candidate: DateTime<Local>,
    now: DateTime<Local>,
    frequency: Frequency,
    rng: &mut R,
) -> DateTime<Local> {
    if candidate > now {
        return candidate;
    }
    let advanced = advance_date(candidate.date_naive(), frequency, rng);
    localize(advanced.and_time(candidate.time()))
}

/// Resolve a naive local datetime, biasing toward the earlier instant on
/// DST ambiguity and skipping forward an hour across a DST gap.
fn localize(ndt: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&ndt) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => Local
            .from_local_datetime(&(ndt + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(Local::now),
    }
}
