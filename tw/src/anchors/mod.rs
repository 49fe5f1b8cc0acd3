//! Travel anchor extraction from free-text chat
//!
//! Messages are scanned oldest first and each message's findings overwrite
//! what earlier messages said, so the latest mention of any anchor wins.

pub mod clean;
pub mod rules;

use tracing::debug;

use crate::domain::{AnchorSet, ChatRole, ChatTurn};
use rules::{DurationMention, RouteMatch, RuleStrength};

/// Deterministic rule interpreter over a window of messages
#[derive(Debug, Default, Clone, Copy)]
pub struct AnchorExtractor;

impl AnchorExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract anchors from messages ordered oldest first
    pub fn extract<S: AsRef<str>>(&self, messages: &[S]) -> AnchorSet {
        debug!(count = messages.len(), "extract: called");
        let mut anchors = AnchorSet::default();
        for message in messages {
            self.apply_message(message.as_ref(), &mut anchors);
        }

        if let (Some(origin), Some(destination)) = (&anchors.origin_name, &anchors.destination_name)
            && origin.eq_ignore_ascii_case(destination)
        {
            debug!(%origin, "extract: destination equals origin, dropping destination");
            anchors.destination_name = None;
        }
        anchors
    }

    /// Extract anchors from the user turns of a chat window
    pub fn extract_from_turns(&self, turns: &[ChatTurn]) -> AnchorSet {
        let texts: Vec<&str> = turns
            .iter()
            .filter(|t| t.role == ChatRole::User)
            .map(|t| t.content.as_str())
            .collect();
        self.extract(&texts)
    }

    fn apply_message(&self, text: &str, anchors: &mut AnchorSet) {
        if text.trim().is_empty() {
            return;
        }

        let route = self.route(text, anchors.destination_name.is_some());
        if let Some(origin) = route.origin {
            anchors.origin_name = Some(origin);
        }
        if let Some(destination) = route.destination {
            anchors.destination_name = Some(destination);
        }

        match rules::detect_duration(text) {
            Some(DurationMention::SameDay) => {
                anchors.duration_days = Some(1);
                anchors.return_same_day = true;
            }
            Some(DurationMention::Days(days)) => {
                anchors.duration_days = Some(days);
                anchors.return_same_day = days == 1 && anchors.return_same_day;
            }
            None => {}
        }

        if let Some(depart) = rules::detect_depart_time(text) {
            anchors.depart_time_hhmm = Some(depart);
        }
        if let Some(mode) = rules::detect_mode(text) {
            anchors.travel_mode = Some(mode.to_string());
        }
    }

    /// Run route rules in priority order, each filling only unfilled slots
    fn route(&self, text: &str, destination_known: bool) -> RouteMatch {
        let mut found = RouteMatch::default();
        let mut strong_fired = false;

        for rule in rules::route_rules() {
            if rule.strength == RuleStrength::Weak && (strong_fired || destination_known) {
                break;
            }
            if found.origin.is_some() && found.destination.is_some() {
                break;
            }
            let Some(hit) = rule.apply(text) else {
                continue;
            };
            if rule.strength == RuleStrength::Strong {
                strong_fired = true;
            }
            if found.origin.is_none() {
                found.origin = hit.origin;
            }
            if found.destination.is_none() {
                found.destination = hit.destination;
            }
        }
        found
    }
}
