//! Place-name cleaning and validation
//!
//! A captured candidate passes through three stages:
//! 1. `truncate` stops it at trip-phrase noise (`one day`, `leave`, connectives, sentence ends)
//! 2. `clean` trims punctuation, strips trailing junk, applies the typo table and title-cases
//! 3. `is_valid_place` rejects anything that still does not look like a place

/// Longest accepted place name, in tokens
pub const MAX_PLACE_TOKENS: usize = 6;

/// Tokens that end a captured place name
const NOISE_TOKENS: &[&str] = &[
    // connectives and prepositions
    "and", "or", "but", "then", "so", "because", "with", "without", "via", "on", "at", "by", "for", "in", "from",
    "to", "into", "near", "around", "after", "before", "while", "if", "using", "where", "which", "that",
    // trip-phrase noise
    "only", "just", "leave", "leaving", "depart", "departing", "return", "returning", "back", "day", "days",
    "night", "nights", "trip", "trips", "weekend", "week", "weeks", "tomorrow", "today", "tonight", "next", "this",
    "morning", "afternoon", "evening", "early", "late", "am", "pm",
    // number words
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven", "twelve", "thirteen",
    "fourteen", "half", "couple", "few",
    // people
    "i", "we", "me", "us", "my", "our", "you", "your", "he", "she", "they", "them", "it", "please",
];

/// Junk stripped from the end of a name
const TRAILING_JUNK: &[&str] = &[
    "please", "pls", "plz", "asap", "now", "too", "though", "etc", "thanks", "thx", "instead", "again", "maybe",
    "ok", "okay", "lol",
];

/// Words that are never a place on their own or as the first token
const STOP_WORDS: &[&str] = &[
    // verbs
    "go", "going", "drive", "driving", "fly", "flying", "visit", "visiting", "see", "get", "head", "heading",
    "come", "coming", "plan", "planning", "make", "take", "stay", "staying", "be", "have", "want", "like",
    "love", "do", "explore", "travel", "traveling", "camp", "camping", "hike", "hiking", "eat", "spend", "leave",
    "return", "book", "find", "need", "know", "try", "start", "ride", "walk", "bring", "bike",
    // pronouns and placeholders
    "there", "here", "it", "me", "us", "them", "you", "home", "work", "somewhere", "anywhere", "everywhere",
    "place", "places", "trip", "a", "an", "the", "some", "any", "all", "my", "our", "their", "your", "what",
    "where", "when", "how", "why", "who", "which",
    // time words
    "january", "february", "march", "april", "may", "june", "july", "august", "september", "october",
    "november", "december", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "summer", "winter", "spring", "fall", "autumn", "time", "advance", "total", "general", "mind", "budget",
    "style", "person", "cash", "fun", "order", "case", "detail", "details", "kids", "family", "dogs", "dog",
];

/// Abbreviations whose trailing period does not end the name
const ABBREVIATIONS: &[&str] = &["st", "mt", "ft", "pt", "sta", "snt"];

/// Fixed misspelling corrections, matched case-insensitively on the whole name
const TYPOS: &[(&str, &str)] = &[
    ("san fransisco", "San Francisco"),
    ("san fransico", "San Francisco"),
    ("san francsico", "San Francisco"),
    ("san fran", "San Francisco"),
    ("sf", "San Francisco"),
    ("yosimite", "Yosemite"),
    ("yosemitie", "Yosemite"),
    ("yosemity", "Yosemite"),
    ("truckie", "Truckee"),
    ("truckey", "Truckee"),
    ("big sure", "Big Sur"),
    ("monteray", "Monterey"),
    ("sacremento", "Sacramento"),
    ("sandiego", "San Diego"),
    ("san deigo", "San Diego"),
    ("joshua three", "Joshua Tree"),
    ("napa vally", "Napa Valley"),
    ("sonoma vally", "Sonoma Valley"),
    ("lake taho", "Lake Tahoe"),
    ("tahoe lake", "Lake Tahoe"),
    ("los angelas", "Los Angeles"),
    ("los angles", "Los Angeles"),
    ("santa barbra", "Santa Barbara"),
    ("pismo", "Pismo Beach"),
];

fn is_noise(token: &str) -> bool {
    NOISE_TOKENS.contains(&token)
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

fn bare(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Cut a raw capture at the first noise token, digit or sentence end
pub fn truncate(raw: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for token in raw.split_whitespace() {
        let lower = bare(token);
        if lower.is_empty() {
            continue;
        }
        if token.chars().any(|c| c.is_ascii_digit()) || is_noise(&lower) {
            break;
        }
        kept.push(token);
        let ends_sentence = token.ends_with(['.', '!', '?', ',', ';', ':']);
        if ends_sentence && !ABBREVIATIONS.contains(&lower.as_str()) {
            break;
        }
    }
    kept.join(" ")
}

/// Normalize a candidate name
pub fn clean(raw: &str) -> String {
    let mut tokens: Vec<String> = raw
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '\'' && c != '-').to_string())
        .filter(|t| !t.is_empty())
        .collect();

    while tokens.len() > 1 && tokens[0].eq_ignore_ascii_case("the") {
        tokens.remove(0);
    }
    while let Some(last) = tokens.last_mut() {
        while last.ends_with(['.', '\'', '-']) {
            last.pop();
        }
        if last.is_empty() || TRAILING_JUNK.contains(&bare(last).as_str()) {
            tokens.pop();
        } else {
            break;
        }
    }

    let name = tokens.join(" ");

    if let Some((_, fixed)) = TYPOS.iter().find(|(typo, _)| typo.eq_ignore_ascii_case(&name)) {
        return fixed.to_string();
    }

    if name.chars().any(char::is_alphabetic) && !name.chars().any(char::is_uppercase) {
        return title_case(&name);
    }
    name
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a cleaned name can populate an anchor
pub fn is_valid_place(name: &str) -> bool {
    let tokens: Vec<String> = name.split_whitespace().map(bare).collect();
    if tokens.is_empty() || tokens.len() > MAX_PLACE_TOKENS {
        return false;
    }
    if !name.chars().any(char::is_alphabetic) || name.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if tokens.iter().any(|t| t.is_empty() || is_noise(t)) {
        return false;
    }
    if is_stop_word(&tokens[0]) {
        return false;
    }
    !(tokens.len() == 1 && tokens[0].chars().count() < 2)
}

/// Truncate, clean and validate in one step
pub fn place_from_capture(raw: &str) -> Option<String> {
    let name = clean(&truncate(raw));
    is_valid_place(&name).then_some(name)
}
