use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Which days count as trading days when laying out forecast dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCalendar {
    /// Monday through Friday.
    #[default]
    WeekdaysOnly,
    /// Weekdays minus NYSE full-day holidays.
    UsMarket,
}

impl MarketCalendar {
    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        if is_weekend(date) {
            return false;
        }
        match self {
            MarketCalendar::WeekdaysOnly => true,
            MarketCalendar::UsMarket => us_market_holiday(date).is_none(),
        }
    }

    /// The next `count` business days strictly after `after`, ascending.
    pub fn next_business_days(&self, after: NaiveDate, count: usize) -> Vec<NaiveDate> {
        let mut dates = Vec::with_capacity(count);
        let mut current = after;
        while dates.len() < count {
            current = match current.succ_opt() {
                Some(d) => d,
                None => break,
            };
            if self.is_business_day(current) {
                dates.push(current);
            }
        }
        dates
    }

    pub fn next_business_day(&self, after: NaiveDate) -> Option<NaiveDate> {
        self.next_business_days(after, 1).into_iter().next()
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsHoliday {
    NewYearsDay,
    MartinLutherKingDay,
    PresidentsDay,
    GoodFriday,
    MemorialDay,
    Juneteenth,
    IndependenceDay,
    LaborDay,
    Thanksgiving,
    Christmas,
}

impl UsHoliday {
    pub fn name(&self) -> &'static str {
        match self {
            UsHoliday::NewYearsDay => "New Year's Day",
            UsHoliday::MartinLutherKingDay => "Martin Luther King Jr. Day",
            UsHoliday::PresidentsDay => "Washington's Birthday",
            UsHoliday::GoodFriday => "Good Friday",
            UsHoliday::MemorialDay => "Memorial Day",
            UsHoliday::Juneteenth => "Juneteenth",
            UsHoliday::IndependenceDay => "Independence Day",
            UsHoliday::LaborDay => "Labor Day",
            UsHoliday::Thanksgiving => "Thanksgiving Day",
            UsHoliday::Christmas => "Christmas Day",
        }
    }
}

/// Observed market holidays for `year`, in date order.
pub fn us_market_holidays(year: i32) -> Vec<(NaiveDate, UsHoliday)> {
    let fixed = |month: u32, day: u32| NaiveDate::from_ymd_opt(year, month, day);
    let nth = |month: u32, weekday: Weekday, n: u8| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n);

    let mut holidays: Vec<(Option<NaiveDate>, UsHoliday)> = vec![
        // A Saturday New Year's Day is not moved back into December.
        (
            fixed(1, 1).and_then(|d| match d.weekday() {
                Weekday::Sat => None,
                _ => observed(d),
            }),
            UsHoliday::NewYearsDay,
        ),
        (nth(1, Weekday::Mon, 3), UsHoliday::MartinLutherKingDay),
        (nth(2, Weekday::Mon, 3), UsHoliday::PresidentsDay),
        (easter_sunday(year).map(|d| d - Duration::days(2)), UsHoliday::GoodFriday),
        (last_weekday_of_month(year, 5, Weekday::Mon), UsHoliday::MemorialDay),
        (fixed(7, 4).and_then(observed), UsHoliday::IndependenceDay),
        (nth(9, Weekday::Mon, 1), UsHoliday::LaborDay),
        (nth(11, Weekday::Thu, 4), UsHoliday::Thanksgiving),
        (fixed(12, 25).and_then(observed), UsHoliday::Christmas),
    ];
    if year >= 2022 {
        holidays.push((fixed(6, 19).and_then(observed), UsHoliday::Juneteenth));
    }

    let mut out: Vec<(NaiveDate, UsHoliday)> = holidays
        .into_iter()
        .filter_map(|(date, h)| date.map(|d| (d, h)))
        .collect();
    out.sort_by_key(|(d, _)| *d);
    out
}

pub fn us_market_holiday(date: NaiveDate) -> Option<UsHoliday> {
    us_market_holidays(date.year())
        .into_iter()
        .find(|(d, _)| *d == date)
        .map(|(_, h)| h)
}

fn observed(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => date.pred_opt(),
        Weekday::Sun => date.succ_opt(),
        _ => Some(date),
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let mut date = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    while date.weekday() != weekday {
        date = date.pred_opt()?;
    }
    Some(date)
}

/// Gregorian Easter Sunday (anonymous algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
