//! Anchor rules
//!
//! Each rule is a compiled pattern plus a validator. Route rules are
//! interpreted by `AnchorExtractor` in priority order; the scalar detectors
//! (mode, duration, depart time) are plain functions over one message.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

use super::clean::place_from_capture;
use crate::domain::MAX_TRIP_DAYS;

/// A place capture: a letter followed by letters, spaces, dots, apostrophes or hyphens.
/// Clause punctuation and digits end it.
const PLACE: &str = r"[\p{L}][\p{L} .'\-]*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStrength {
    /// Route phrasing (`to X`, `from X`)
    Strong,
    /// Only consulted when no strong rule fired and no destination is known
    Weak,
}

/// Places a route rule recovered from one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub origin: Option<String>,
    pub destination: Option<String>,
}

impl RouteMatch {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.destination.is_none()
    }
}

/// Ordered pattern → validator rule for route phrases
pub struct RouteRule {
    pub name: &'static str,
    pub strength: RuleStrength,
    /// Finds every position a match may start at
    keyword: Regex,
    /// Full pattern with `origin` and/or `destination` groups
    pattern: Regex,
}

impl RouteRule {
    fn new(name: &'static str, strength: RuleStrength, keyword: &str, pattern: &str) -> Self {
        Self {
            name,
            strength,
            keyword: Regex::new(&format!(r"(?i)\b(?:{})\b", keyword)).expect("valid regex"),
            pattern: Regex::new(&format!("(?i){}", pattern)).expect("valid regex"),
        }
    }

    fn wants_origin(&self) -> bool {
        self.pattern.capture_names().flatten().any(|n| n == "origin")
    }

    fn wants_destination(&self) -> bool {
        self.pattern.capture_names().flatten().any(|n| n == "destination")
    }

    /// Apply the rule to one message
    ///
    /// Every keyword position is tried in order. The first position where
    /// every captured place validates wins; failing that, the first position
    /// yielding at least one valid place. `None` means the rule did not fire.
    pub fn apply(&self, text: &str) -> Option<RouteMatch> {
        let mut partial: Option<RouteMatch> = None;

        for keyword in self.keyword.find_iter(text) {
            let Some(caps) = self.pattern.captures_at(text, keyword.start()) else {
                continue;
            };
            if caps.get(0).map(|m| m.start()) != Some(keyword.start()) {
                continue;
            }

            let found = RouteMatch {
                origin: valid_group(&caps, "origin"),
                destination: valid_group(&caps, "destination"),
            };
            let complete =
                found.origin.is_some() == self.wants_origin() && found.destination.is_some() == self.wants_destination();
            if complete {
                debug!(rule = self.name, ?found, "RouteRule::apply: fired");
                return Some(found);
            }
            if partial.is_none() && !found.is_empty() {
                partial = Some(found);
            }
        }

        if partial.is_some() {
            debug!(rule = self.name, ?partial, "RouteRule::apply: fired partially");
        }
        partial
    }
}

fn valid_group(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name).and_then(|m| place_from_capture(m.as_str()))
}

static ROUTE_RULES: LazyLock<Vec<RouteRule>> = LazyLock::new(|| {
    vec![
        RouteRule::new(
            "to_from",
            RuleStrength::Strong,
            "to",
            &format!(r"\bto\s+(?P<destination>{PLACE}?)\s+from\s+(?P<origin>{PLACE})"),
        ),
        RouteRule::new(
            "from_to",
            RuleStrength::Strong,
            "from",
            &format!(r"\bfrom\s+(?P<origin>{PLACE}?)\s+to\s+(?P<destination>{PLACE})"),
        ),
        RouteRule::new(
            "from",
            RuleStrength::Strong,
            "from",
            &format!(r"\bfrom\s+(?P<origin>{PLACE})"),
        ),
        RouteRule::new("to", RuleStrength::Strong, "to", &format!(r"\bto\s+(?P<destination>{PLACE})")),
        RouteRule::new("in", RuleStrength::Weak, "in", &format!(r"\bin\s+(?P<destination>{PLACE})")),
        RouteRule::new("for", RuleStrength::Weak, "for", &format!(r"\bfor\s+(?P<destination>{PLACE})")),
        RouteRule::new(
            "visit",
            RuleStrength::Weak,
            "visit|visiting",
            &format!(r"\bvisit(?:ing)?\s+(?P<destination>{PLACE})"),
        ),
    ]
});

/// Route rules in priority order: strong rules first, then weak
pub fn route_rules() -> &'static [RouteRule] {
    &ROUTE_RULES
}

static MODE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(?:drive|drives|driving|road[\s-]?trip)\b", "CAR"),
        (r"(?i)\b(?:fly|flying|flight|flights)\b", "FLIGHT"),
        (r"(?i)\b(?:train|trains|amtrak)\b", "TRAIN"),
        (r"(?i)\b(?:bus|buses|greyhound)\b", "BUS"),
    ]
    .into_iter()
    .map(|(pattern, mode)| (Regex::new(pattern).expect("valid regex"), mode))
    .collect()
});

/// Travel mode mentioned last in the message
pub fn detect_mode(text: &str) -> Option<&'static str> {
    MODE_RULES
        .iter()
        .filter_map(|(re, mode)| re.find_iter(text).last().map(|m| (m.start(), *mode)))
        .max_by_key(|(start, _)| *start)
        .map(|(_, mode)| mode)
}

const NUMBER_WORDS: &[&str] = &[
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven", "twelve", "thirteen",
    "fourteen",
];

fn parse_count(raw: &str) -> Option<u32> {
    let lower = raw.to_ascii_lowercase();
    let n = match NUMBER_WORDS.iter().position(|w| *w == lower) {
        Some(idx) => idx as u32 + 1,
        None => lower.parse().ok()?,
    };
    (1..=MAX_TRIP_DAYS).contains(&n).then_some(n)
}

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<n>\d{{1,2}}|{})[\s-]*(?:full\s+)?days?\b",
        NUMBER_WORDS.join("|")
    ))
    .expect("valid regex")
});

static DAY_TRIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:(?P<n>\d{{1,2}}|{})[\s-]+)?day[\s-]?trips?\b",
        NUMBER_WORDS.join("|")
    ))
    .expect("valid regex")
});

static SAME_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bsame[\s-]day\b|\bback\s+(?:the\s+)?same\s+(?:day|evening|night)\b").expect("valid regex")
});

/// A trip-length mention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationMention {
    /// Same-day or day-trip phrasing
    SameDay,
    /// Explicit count of days
    Days(u32),
}

/// Trip length stated in the message
///
/// Same-day phrasing wins over a count in the same message; `3 day trip` is
/// a three-day count, not a day trip.
pub fn detect_duration(text: &str) -> Option<DurationMention> {
    let day_trip = DAY_TRIP_RE.captures_iter(text).any(|caps| {
        caps.name("n")
            .map(|n| parse_count(n.as_str()).is_none_or(|count| count == 1))
            .unwrap_or(true)
    });
    if day_trip || SAME_DAY_RE.is_match(text) {
        return Some(DurationMention::SameDay);
    }

    COUNT_RE
        .captures_iter(text)
        .filter_map(|caps| caps.name("n").and_then(|n| parse_count(n.as_str())))
        .last()
        .map(DurationMention::Days)
}

static DEPART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:leave|leaving|depart|departing|head(?:ing)?\s+out|set(?:ting)?\s+off|start(?:ing)?\s+out)\s+(?:at|around|by|@)?\s*(?P<h>\d{1,2})(?::(?P<m>\d{2}))?\s*(?P<ampm>a\.m\.|p\.m\.|am|pm)?(?:[^\w:]|$)",
    )
    .expect("valid regex")
});

/// Departure time as `HH:MM`, the last valid mention in the message
pub fn detect_depart_time(text: &str) -> Option<String> {
    DEPART_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let hour: u32 = caps.name("h")?.as_str().parse().ok()?;
            let minute: u32 = caps.name("m").map_or(Some(0), |m| m.as_str().parse().ok())?;
            let meridiem = caps.name("ampm").map(|m| m.as_str().to_ascii_lowercase());
            to_hhmm(hour, minute, meridiem.as_deref())
        })
        .last()
}

fn to_hhmm(hour: u32, minute: u32, meridiem: Option<&str>) -> Option<String> {
    if minute > 59 {
        return None;
    }
    let hour = match meridiem.map(|m| m.starts_with('p')) {
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            }
        }
        None if hour <= 23 => hour,
        None => return None,
    };
    Some(format!("{:02}:{:02}", hour, minute))
}
