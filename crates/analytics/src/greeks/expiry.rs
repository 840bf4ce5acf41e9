//! Trading-day time to expiry
//!
//! Options on Indian venues decay over trading days, not calendar days.
//! Time to expiry counts NSE trading days (weekends and exchange holidays
//! excluded) plus the remaining fraction of the current session, over a
//! 252-day year. Cash session close is 15:30 IST.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};

/// Trading days per year used to annualize.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Floor on time to expiry, keeps expiry-day maths finite.
pub const MIN_TIME_TO_EXPIRY: f64 = 1e-4;

const IST_OFFSET_SECS: i32 = 5 * 3600 + 1800;

/// Exchange holiday calendar for the current year. Refreshed annually from
/// the NSE circular.
const HOLIDAYS_2026: [(u32, u32); 9] = [
    (1, 26),  // Republic Day
    (3, 4),   // Holi
    (4, 3),   // Good Friday
    (4, 14),  // Ambedkar Jayanti
    (5, 1),   // Maharashtra Day
    (8, 15),  // Independence Day
    (10, 2),  // Gandhi Jayanti
    (11, 9),  // Diwali Balipratipada
    (12, 25), // Christmas
];

fn ist() -> FixedOffset {
    // Constant offset, always in range.
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset")
}

fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).expect("session close time")
}

/// True once the expiry session has closed: any later date, or past
/// 15:30 IST on the expiry day itself. Dead contracts must not price.
pub fn has_expired(now: DateTime<Utc>, expiry: NaiveDate) -> bool {
    let now_ist = now.with_timezone(&ist());
    let today = now_ist.date_naive();
    expiry < today || (expiry == today && now_ist.time() > session_close())
}

pub fn is_holiday(date: NaiveDate) -> bool {
    date.year() == 2026 && HOLIDAYS_2026.contains(&(date.month(), date.day()))
}

pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(date)
}

/// Trading days in `[from, to]`, both inclusive.
fn trading_days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let mut days = 0;
    let mut d = from;
    while d <= to {
        if is_trading_day(d) {
            days += 1;
        }
        d += Duration::days(1);
    }
    days
}

/// Years to expiry in trading time.
///
/// Counts whole trading days left after today, and adds the fraction of
/// today's session remaining until 15:30 IST. Never returns less than
/// `MIN_TIME_TO_EXPIRY`, so an option on expiry afternoon still prices.
pub fn time_to_expiry(now: DateTime<Utc>, expiry: NaiveDate) -> f64 {
    let now_ist = now.with_timezone(&ist());
    let today = now_ist.date_naive();
    if expiry < today {
        return MIN_TIME_TO_EXPIRY;
    }

    let mut trading_days = trading_days_between(today, expiry);
    if trading_days > 0 {
        // Today is counted in full above; replace it with the live fraction.
        trading_days -= 1;
    }

    let secs_to_close = (session_close() - now_ist.time()).num_seconds().max(0) as f64;
    let intraday_fraction = secs_to_close / 86_400.0;

    ((trading_days as f64 + intraday_fraction) / TRADING_DAYS_PER_YEAR).max(MIN_TIME_TO_EXPIRY)
}
