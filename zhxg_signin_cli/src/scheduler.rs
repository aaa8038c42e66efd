//! 定时签到
//!
//! 支持 5 段 cron 表达式（分 时 日 月 周），每段可写 `*`、单值、`a-b`、`*/n`、`a-b/n`
//! 以及逗号分隔的列表。周字段 0 和 7 都表示周日；日和周同时受限时任一匹配即可。

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::time::Duration;

/// 最多向后查找的天数
const MAX_LOOKAHEAD_DAYS: i64 = 366;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("cron expression must have 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid cron field '{0}'")]
    InvalidField(String),

    #[error("cron field '{field}' out of range ({min}-{max})")]
    OutOfRange { field: String, min: u32, max: u32 },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("no matching time within 366 days")]
    NoUpcomingRun,
}

/// 单个字段允许的取值（位图）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    /// 字段不以 `*` 开头
    restricted: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1 << value) != 0
    }
}

/// 解析后的 cron 计划
#[derive(Debug, Clone)]
pub struct CronSchedule {
    raw: String,
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
    timezone: Tz,
}

impl CronSchedule {
    pub fn parse(expr: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ScheduleError::FieldCount(parts.len()));
        }

        let timezone: Tz = timezone
            .trim()
            .parse()
            .map_err(|_| ScheduleError::UnknownTimezone(timezone.to_string()))?;

        let mut day_of_week = parse_cron_field(parts[4], 0, 7)?;
        if day_of_week.contains(7) {
            day_of_week.bits |= 1;
        }

        Ok(Self {
            raw: parts.join(" "),
            minute: parse_cron_field(parts[0], 0, 59)?,
            hour: parse_cron_field(parts[1], 0, 23)?,
            day_of_month: parse_cron_field(parts[2], 1, 31)?,
            month: parse_cron_field(parts[3], 1, 12)?,
            day_of_week,
            timezone,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// `now` 之后（不含当前分钟）的下一次触发时间
    pub fn next_after(&self, now: DateTime<Utc>) -> Result<DateTime<Tz>, ScheduleError> {
        let start = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let max_minutes = MAX_LOOKAHEAD_DAYS * 24 * 60;
        for offset in 1..=max_minutes {
            let candidate = (start + ChronoDuration::minutes(offset)).with_timezone(&self.timezone);
            if self.matches(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ScheduleError::NoUpcomingRun)
    }

    /// 距离 `next` 还需等待的时间，已过去则为零
    pub fn delay_until(&self, next: &DateTime<Tz>, now: DateTime<Utc>) -> Duration {
        (next.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn matches(&self, candidate: &DateTime<Tz>) -> bool {
        if !self.minute.contains(candidate.minute())
            || !self.hour.contains(candidate.hour())
            || !self.month.contains(candidate.month())
        {
            return false;
        }

        let dom = self.day_of_month.contains(candidate.day());
        let dow = self
            .day_of_week
            .contains(candidate.weekday().num_days_from_sunday());

        if self.day_of_month.restricted && self.day_of_week.restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.raw, self.timezone)
    }
}

fn parse_cron_field(raw: &str, min: u32, max: u32) -> Result<FieldSet, ScheduleError> {
    let invalid = || ScheduleError::InvalidField(raw.to_string());
    let number = |s: &str| s.parse::<u32>().map_err(|_| invalid());

    let mut bits = 0u64;
    for part in raw.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(number(step)?)),
            None => (part, None),
        };
        if step == Some(0) {
            return Err(invalid());
        }

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (number(a)?, number(b)?)
        } else {
            let value = number(range)?;
            // `5/15` 等价于 `5-max/15`
            (value, if step.is_some() { max } else { value })
        };

        if lo < min || hi > max {
            return Err(ScheduleError::OutOfRange {
                field: raw.to_string(),
                min,
                max,
            });
        }
        if lo > hi {
            return Err(invalid());
        }

        for value in (lo..=hi).step_by(step.unwrap_or(1) as usize) {
            bits |= 1 << value;
        }
    }

    Ok(FieldSet {
        bits,
        restricted: !raw.starts_with('*'),
    })
}
