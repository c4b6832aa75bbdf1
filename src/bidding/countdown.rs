use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// 경매 종료까지 남은 시간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum TimeRemaining {
    Ended,
    Running {
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
    },
}

pub fn time_remaining(end_time: DateTime<Utc>) -> TimeRemaining {
    time_remaining_at(end_time, Utc::now())
}

/// 남은 시간 계산. 0 이하이면 종료.
pub fn time_remaining_at(end_time: DateTime<Utc>, now: DateTime<Utc>) -> TimeRemaining {
    let total = (end_time - now).num_seconds();
    if total <= 0 {
        return TimeRemaining::Ended;
    }
    TimeRemaining::Running {
        days: total / 86_400,
        hours: total % 86_400 / 3_600,
        minutes: total % 3_600 / 60,
        seconds: total % 60,
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TimeRemaining::Ended => write!(f, "경매 종료"),
            TimeRemaining::Running { days, hours, .. } if days > 0 => {
                write!(f, "{}일 {}시간", days, hours)
            }
            TimeRemaining::Running { hours, minutes, .. } if hours > 0 => {
                write!(f, "{}시간 {}분", hours, minutes)
            }
            TimeRemaining::Running {
                minutes, seconds, ..
            } => write!(f, "{}분 {}초", minutes, seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn clamps_to_ended_at_and_after_end_time() {
        let now = Utc::now();
        assert_eq!(time_remaining_at(now, now), TimeRemaining::Ended);
        assert_eq!(
            time_remaining_at(now - Duration::minutes(3), now),
            TimeRemaining::Ended
        );
        assert_eq!(TimeRemaining::Ended.to_string(), "경매 종료");
    }

    #[test]
    fn formats_the_two_largest_units() {
        let now = Utc::now();
        let remaining = time_remaining_at(
            now + Duration::days(2) + Duration::hours(3) + Duration::minutes(15),
            now,
        );
        assert_eq!(
            remaining,
            TimeRemaining::Running {
                days: 2,
                hours: 3,
                minutes: 15,
                seconds: 0
            }
        );
        assert_eq!(remaining.to_string(), "2일 3시간");

        let remaining = time_remaining_at(now + Duration::hours(3) + Duration::minutes(5), now);
        assert_eq!(remaining.to_string(), "3시간 5분");

        let remaining = time_remaining_at(now + Duration::seconds(250), now);
        assert_eq!(remaining.to_string(), "4분 10초");
    }
}
