use chrono::{DateTime, Utc};

/// Abstracts wall-clock reads so the composer's clock block and the crystallization layer's timestamps are testable without
/// sleeping real time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A short, human phrase for the composer's clock block. Purely cosmetic.
pub fn time_of_day_note(hour: u32) -> &'static str {
    match hour {
        5..=7 => "early morning",
        8..=11 => "morning",
        12..=13 => "midday",
        14..=17 => "afternoon",
        18..=20 => "evening",
        21..=23 => "late evening",
        _ => "the small hours",
    }
}
