use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const TIME_LEN: usize = 25;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// 定宽的文本时间（UTC），形如 `Thu Jan  1 00:00:00 1970`，以 `\0` 结尾
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Timestamp([u8; TIME_LEN]);

impl Timestamp {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::from_unix(secs)
    }

    pub fn from_unix(secs: u64) -> Self {
        let days = (secs / 86400) as i64;
        let rem = secs % 86400;
        let (year, month, day) = civil_from_days(days);
        // 1970-01-01 是星期四
        let weekday = (days + 4).rem_euclid(7) as usize;

        let text = format!(
            "{} {} {:>2} {:02}:{:02}:{:02} {}",
            WEEKDAYS[weekday],
            MONTHS[month - 1],
            day,
            rem / 3600,
            rem % 3600 / 60,
            rem % 60,
            year
        );

        let mut raw = [0; TIME_LEN];
        let len = text.len().min(TIME_LEN - 1);
        raw[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self(raw)
    }

    /// 从未写入过的时间为空串
    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&c| c == 0).unwrap_or(TIME_LEN);
        core::str::from_utf8(&self.0[..len]).unwrap_or_default()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self([0; TIME_LEN])
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// 自 1970-01-01 起的天数换算为 (年, 月, 日)
fn civil_from_days(days: i64) -> (i64, usize, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as usize;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
