use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::config::{DOMESTIC_CUP_LEAGUE_IDS, EURO_LEAGUE_IDS};

// Provider stage type ids.
pub const STAGE_TYPE_GROUP: i64 = 223;
pub const STAGE_TYPE_KNOCKOUT: i64 = 224;
pub const STAGE_TYPE_QUALIFYING: i64 = 225;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Upcoming,
    Live,
    Past,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Upcoming => "upcoming",
            Status::Live => "live",
            Status::Past => "past",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Competition {
    League,
    DomesticCup,
    Europe,
}

impl Competition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Competition::League => "league",
            Competition::DomesticCup => "domestic_cup",
            Competition::Europe => "europe",
        }
    }
}

/// Reduce a provider state code to the fixture lifecycle status. Total:
/// unknown codes are treated as finished, absent codes as not yet started.
pub fn classify_state(code: Option<&str>) -> Status {
    let code = code.unwrap_or("").trim().to_ascii_uppercase();
    if code.is_empty() {
        return Status::Upcoming;
    }
    if code.starts_with("INPLAY") || code == "HT" || code == "BREAK" {
        return Status::Live;
    }
    if code == "NS" || code == "TBA" || code.starts_with("POSTP") || code.starts_with("DELA") {
        return Status::Upcoming;
    }
    Status::Past
}

pub fn classify_competition(sub_type: Option<&str>) -> Competition {
    match sub_type.unwrap_or("").trim().to_ascii_lowercase().as_str() {
        "domestic_cup" => Competition::DomesticCup,
        "cup_international" => Competition::Europe,
        _ => Competition::League,
    }
}

/// Sub-type when present, otherwise a static id-set fallback.
pub fn classify_competition_for_league(league_id: i64, sub_type: Option<&str>) -> Competition {
    match sub_type {
        Some(st) if !st.trim().is_empty() => classify_competition(Some(st)),
        _ => {
            if EURO_LEAGUE_IDS.contains(&league_id) {
                Competition::Europe
            } else if DOMESTIC_CUP_LEAGUE_IDS.contains(&league_id) {
                Competition::DomesticCup
            } else {
                Competition::League
            }
        }
    }
}

/// Parse a provider timestamp to a naive wall-clock datetime. Accepts
/// ISO-8601 with `Z`, an explicit offset, or none; the offset is dropped,
/// not applied. A truncation pass catches the remaining malformed shapes.
pub fn normalize_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let iso = s.replace(' ', "T");
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&iso) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&iso, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    let mut t = s.replace('T', " ");
    if let Some(stripped) = t.strip_suffix('Z') {
        t = stripped.to_string();
    }
    if let Some(idx) = t.find('+') {
        t.truncate(idx);
    } else if t.len() >= 6 && t.is_ascii() {
        let bytes = t.as_bytes();
        if (bytes[t.len() - 6] == b'-') && bytes[t.len() - 3] == b':' {
            t.truncate(t.len() - 6);
        }
    }
    let t = t.trim();
    let t = if t.len() > 19 { &t[..19] } else { t };
    NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S").ok()
}

pub fn normalize_datetime_str(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_datetime)
        .map(|dt| format_datetime(&dt))
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Participant location metadata first; per-side fill-in from the score
/// breakdown tags. Either side may stay unresolved.
pub fn resolve_home_away(participants: &[Value], scores: &[Value]) -> (Option<i64>, Option<i64>) {
    let mut home = None;
    let mut away = None;
    for p in participants {
        let loc = p
            .get("meta")
            .and_then(|m| m.get("location"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match loc.as_str() {
            "home" => home = p.get("id").and_then(as_i64_any),
            "away" => away = p.get("id").and_then(as_i64_any),
            _ => {}
        }
    }
    if home.is_none() || away.is_none() {
        for s in scores {
            let side = s
                .get("score")
                .and_then(|sc| sc.get("participant"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_ascii_lowercase();
            let pid = s
                .get("participant_id")
                .or_else(|| s.get("team_id"))
                .or_else(|| s.get("participant"))
                .and_then(|v| v.as_i64());
            match side.as_str() {
                "home" => home = home.or(pid),
                "away" => away = away.or(pid),
                _ => {}
            }
        }
    }
    (home, away)
}

/// round.name -> stage.name -> group.name -> fixture name -> "Round {id}"
/// -> "Unknown". First non-blank wins.
pub fn round_name(fx: &Value) -> String {
    for key in ["round", "stage", "group"] {
        if let Some(name) = nested_name(fx.get(key)) {
            return name;
        }
    }
    if let Some(name) = fx.get("name").and_then(|v| v.as_str()) {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if let Some(rid) = fx.get("round_id").and_then(|v| v.as_i64()) {
        return format!("Round {rid}");
    }
    "Unknown".to_string()
}

fn nested_name(v: Option<&Value>) -> Option<String> {
    let obj = v?;
    if !obj.is_object() {
        return None;
    }
    let name = obj
        .get("name")
        .and_then(|n| n.as_str())
        .or_else(|| obj.get("data").and_then(|d| d.get("name")).and_then(|n| n.as_str()))?;
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Bare integer or "N/M" (first leg count wins).
pub fn parse_leg(v: Option<&Value>) -> Option<i64> {
    let v = v?;
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    let s = v.as_str()?.trim();
    let first = s.split('/').next()?.trim();
    if !first.is_empty() && first.chars().all(|c| c.is_ascii_digit()) {
        return first.parse().ok();
    }
    None
}

/// Prefer per-side entries described CURRENT, else the last seen value.
pub fn extract_scores(scores: &[Value]) -> (Option<i64>, Option<i64>) {
    let mut cur_home = None;
    let mut cur_away = None;
    let mut last_home = None;
    let mut last_away = None;
    for s in scores {
        let score = s.get("score").unwrap_or(&Value::Null);
        let Some(goals) = score.get("goals").and_then(|g| g.as_i64()) else {
            continue;
        };
        let side = score
            .get("participant")
            .and_then(|p| p.as_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let desc = s
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("")
            .to_ascii_uppercase();
        match side.as_str() {
            "home" => {
                last_home = Some(goals);
                if desc == "CURRENT" {
                    cur_home = Some(goals);
                }
            }
            "away" => {
                last_away = Some(goals);
                if desc == "CURRENT" {
                    cur_away = Some(goals);
                }
            }
            _ => {}
        }
    }
    if cur_home.is_some() && cur_away.is_some() {
        (cur_home, cur_away)
    } else {
        (last_home, last_away)
    }
}

/// Shootout totals from entries whose description carries a penalty marker.
/// Per-side maximum, so duplicate partial entries cannot undercount.
pub fn extract_penalty_scores(scores: &[Value]) -> (Option<i64>, Option<i64>) {
    let mut pen_home: Option<i64> = None;
    let mut pen_away: Option<i64> = None;
    for s in scores {
        let desc = s
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("")
            .to_ascii_uppercase();
        if !desc.contains("PEN") {
            continue;
        }
        let score = s.get("score").unwrap_or(&Value::Null);
        let Some(goals) = score.get("goals").and_then(|g| g.as_i64()) else {
            continue;
        };
        let side = score
            .get("participant")
            .and_then(|p| p.as_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match side.as_str() {
            "home" => pen_home = Some(pen_home.map_or(goals, |prev| prev.max(goals))),
            "away" => pen_away = Some(pen_away.map_or(goals, |prev| prev.max(goals))),
            _ => {}
        }
    }
    (pen_home, pen_away)
}

/// "2017/18", "2017-2018", "2017–18" and friends.
pub fn parse_season_start_year(name: &str) -> Option<i32> {
    let chars: Vec<char> = name.chars().collect();
    let mut i = 0;
    while i + 4 <= chars.len() {
        if chars[i..i + 4].iter().all(|c| c.is_ascii_digit())
            && (i + 4 == chars.len() || !chars[i + 4].is_ascii_digit())
            && (i == 0 || !chars[i - 1].is_ascii_digit())
        {
            let mut j = i + 4;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            if j < chars.len() && matches!(chars[j], '/' | '-' | '–') {
                let mut k = j + 1;
                while k < chars.len() && chars[k] == ' ' {
                    k += 1;
                }
                let digits = chars[k..].iter().take_while(|c| c.is_ascii_digit()).count();
                if (2..=4).contains(&digits) {
                    let year: String = chars[i..i + 4].iter().collect();
                    return year.parse().ok();
                }
            }
        }
        i += 1;
    }
    None
}

/// Start year of a season payload: the name form first, then the first four
/// digits of `starting_at`.
pub fn season_start_year(season: &Value) -> Option<i32> {
    if let Some(year) = season
        .get("name")
        .and_then(|n| n.as_str())
        .and_then(parse_season_start_year)
    {
        return Some(year);
    }
    let starting = season
        .get("starting_at")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if starting.len() >= 4 && starting[..4].chars().all(|c| c.is_ascii_digit()) {
        return starting[..4].parse().ok();
    }
    None
}

/// Lists arrive either bare or wrapped in a `data` envelope.
pub fn as_list(v: Option<&Value>) -> &[Value] {
    match v {
        Some(Value::Array(items)) => items,
        Some(Value::Object(_)) => v
            .and_then(|x| x.get("data"))
            .and_then(|d| d.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]),
        _ => &[],
    }
}

pub fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}
