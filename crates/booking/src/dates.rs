use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};

/// Pulls a concrete date and time out of free-form message text.
///
/// Recognized dates: `today`, `tonight`, `tomorrow`, full weekday names,
/// and numeric `month/day` or `month/day/year`. Recognized times: `3pm`,
/// `3:30pm`, `15:00`, `3 pm`, `noon`, `midnight`. A date without a time
/// lands at 9am (6pm for `tonight`); a time without a date lands on today.
pub fn extract_datetime(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    let tokens = tokenize(text);

    let mut date: Option<NaiveDate> = None;
    let mut time: Option<NaiveTime> = None;
    let mut evening_hint = false;

    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index].as_str();
        if date.is_none() {
            let found = match token {
                "today" => Some(today),
                "tonight" => {
                    evening_hint = true;
                    Some(today)
                }
                "tomorrow" => Some(today + Duration::days(1)),
                _ => weekday_date(token, today).or_else(|| numeric_date(token, today)),
            };
            if let Some(found) = found {
                date = Some(found);
                index += 1;
                continue;
            }
        }
        if time.is_none() {
            if let Some((found, consumed)) =
                clock_time(token, tokens.get(index + 1).map(String::as_str))
            {
                time = Some(found);
                index += consumed;
                continue;
            }
        }
        index += 1;
    }

    match (date, time) {
        (None, None) => None,
        (Some(date), Some(time)) => Some(date.and_time(time).and_utc()),
        (Some(date), None) => {
            let hour = if evening_hint { 18 } else { 9 };
            NaiveTime::from_hms_opt(hour, 0, 0).map(|time| date.and_time(time).and_utc())
        }
        (None, Some(time)) => Some(today.and_time(time).and_utc()),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| raw.trim_matches(|ch: char| !ch.is_ascii_alphanumeric()).to_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Next occurrence of the named weekday; the same weekday means today.
fn weekday_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let target = match token {
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        _ => return None,
    };
    let ahead = (i64::from(target.num_days_from_monday())
        - i64::from(today.weekday().num_days_from_monday()))
    .rem_euclid(7);
    Some(today + Duration::days(ahead))
}

/// `month/day` or `month/day/year`, with `-` accepted as the separator.
/// Without a year, a date already behind us rolls into next year; an
/// explicit year is kept as written.
fn numeric_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = token.split(['/', '-']).collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    let month: u32 = parts[0].parse().ok()?;
    let day: u32 = parts[1].parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    if let Some(year_part) = parts.get(2) {
        let mut year: i32 = year_part.parse().ok()?;
        if year < 100 {
            year += 2000;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if candidate < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

fn clock_time(token: &str, next: Option<&str>) -> Option<(NaiveTime, usize)> {
    match token {
        "noon" => return NaiveTime::from_hms_opt(12, 0, 0).map(|time| (time, 1)),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0).map(|time| (time, 1)),
        _ => {}
    }

    if let Some(rest) = token.strip_suffix("am").or_else(|| token.strip_suffix("pm")) {
        let pm = token.ends_with("pm");
        return meridiem_time(rest, pm).map(|time| (time, 1));
    }

    if let Some((hours, minutes)) = token.split_once(':') {
        let hour: u32 = hours.parse().ok()?;
        let minute: u32 = minutes.parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0).map(|time| (time, 1));
    }

    // "3 pm" split across two tokens.
    if token.parse::<u32>().is_ok() {
        if let Some(meridiem @ ("am" | "pm")) = next {
            return meridiem_time(token, meridiem == "pm").map(|time| (time, 2));
        }
    }

    None
}

fn meridiem_time(clock: &str, pm: bool) -> Option<NaiveTime> {
    let (hour_part, minute) = match clock.split_once(':') {
        Some((hours, minutes)) => (hours, minutes.parse().ok()?),
        None => (clock, 0),
    };
    let hour: u32 = hour_part.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (hour, true) => hour + 12,
        (hour, false) => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone, Utc, Weekday};

    use super::extract_datetime;

    fn monday_afternoon() -> chrono::DateTime<Utc> {
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 16, 0, 0).unwrap();
        assert_eq!(now.weekday(), Weekday::Mon);
        now
    }

    fn expect(text: &str, y: i32, mo: u32, d: u32, h: u32, mi: u32) {
        let now = monday_afternoon();
        let extracted = extract_datetime(text, now);
        assert_eq!(
            extracted,
            Some(Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()),
            "text: {text:?}"
        );
    }

    #[test]
    fn tomorrow_with_a_time() {
        expect("Can I book tomorrow at 3pm?", 2026, 2, 10, 15, 0);
    }

    #[test]
    fn weekday_names_roll_forward_defaulting_to_morning() {
        expect("do you have anything Friday", 2026, 2, 13, 9, 0);
    }

    #[test]
    fn the_current_weekday_means_today() {
        expect("book me for monday", 2026, 2, 9, 9, 0);
    }

    #[test]
    fn numeric_dates_without_a_year_stay_in_the_future() {
        expect("3/15 works for me", 2026, 3, 15, 9, 0);
        // January 5th has already passed relative to February 9th.
        expect("how about 1/5?", 2027, 1, 5, 9, 0);
    }

    #[test]
    fn explicit_years_are_kept_as_written() {
        expect("12/31/25 please", 2025, 12, 31, 9, 0);
        expect("12/31/2026 please", 2026, 12, 31, 9, 0);
    }

    #[test]
    fn clock_time_variants_land_on_today() {
        expect("see you at 3:30pm", 2026, 2, 9, 15, 30);
        expect("15:00 if possible", 2026, 2, 9, 15, 0);
        expect("noon would be great", 2026, 2, 9, 12, 0);
        expect("maybe 3 pm", 2026, 2, 9, 15, 0);
    }

    #[test]
    fn twelve_oclock_edges() {
        expect("12pm lunch slot", 2026, 2, 9, 12, 0);
        expect("12am if you are open", 2026, 2, 9, 0, 0);
    }

    #[test]
    fn tonight_defaults_to_the_evening() {
        expect("any chance tonight?", 2026, 2, 9, 18, 0);
    }

    #[test]
    fn date_and_time_combine() {
        expect("friday at 3pm", 2026, 2, 13, 15, 0);
    }

    #[test]
    fn text_without_a_date_or_time_yields_none() {
        let now = monday_afternoon();
        assert_eq!(extract_datetime("thanks so much!", now), None);
        assert_eq!(extract_datetime("I moved here in 1985", now), None);
        assert_eq!(extract_datetime("", now), None);
    }
}
