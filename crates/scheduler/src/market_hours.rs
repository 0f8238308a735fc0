use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::US::Eastern;

fn is_weekday(et: DateTime<chrono_tz::Tz>) -> bool {
    !matches!(et.weekday(), Weekday::Sat | Weekday::Sun)
}

fn minutes_since_midnight(et: DateTime<chrono_tz::Tz>) -> u32 {
    et.hour() * 60 + et.minute()
}

/// 09:30-16:00 America/New_York, Monday-Friday. DST-aware via chrono-tz's
/// Eastern zone, which carries the US daylight-saving transition rules.
pub fn is_regular_session(now: DateTime<Utc>) -> bool {
    let et = now.with_timezone(&Eastern);
    is_weekday(et) && (9 * 60 + 30..16 * 60).contains(&minutes_since_midnight(et))
}

/// 04:00-09:30 and 16:00-20:00 America/New_York, Monday-Friday.
pub fn is_extended_session(now: DateTime<Utc>) -> bool {
    let et = now.with_timezone(&Eastern);
    if !is_weekday(et) {
        return false;
    }
    let m = minutes_since_midnight(et);
    (4 * 60..9 * 60 + 30).contains(&m) || (16 * 60..20 * 60).contains(&m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn regular_session_open_at_10am_et_weekday() {
        // 2024-03-04 is a Monday; 15:00 UTC = 10:00 ET (EST offset -5 in March before DST switch on the 10th)
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        assert!(is_regular_session(now));
    }

    #[test]
    fn regular_session_closed_on_saturday() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap();
        assert!(!is_regular_session(now));
    }

    #[test]
    fn extended_session_covers_premarket() {
        // 12:00 UTC = 07:00 EST
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        assert!(is_extended_session(now));
        assert!(!is_regular_session(now));
    }
}
