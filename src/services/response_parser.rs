use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

use crate::models::{MedicineAnalysis, PromptVersion, Section};

/// Something the parser could not recover from the model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseIssue {
    MissingSection(Section),
    UnparsableRating,
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseIssue::MissingSection(section) => write!(f, "missing section '{}'", section),
            ParseIssue::UnparsableRating => write!(f, "safety rating is not a number"),
        }
    }
}

/// Best-effort parse result. Always carries an analysis; `issues` lists
/// what had to be defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub analysis: MedicineAnalysis,
    pub issues: Vec<ParseIssue>,
}

impl ParsedAnalysis {
    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }
}

const BULLET_OR_NUMBER: &str = r"(?:[-*•+]\s+)?(?:\d{1,2}\s*[.)]\s*)?";
const BOLD: &str = r"(?:\*\*|__)?";
const SEPARATOR: &str = r"(?::|-|–|—)";

// Heading line: optional markdown heading, bullet, numbering ("1." / "1)")
// and bold, then the section name with an optional parenthetical, then end
// of line or a separator with inline content. One-word aliases are only
// accepted without bullet or numbering.
static SECTION_MARKERS: Lazy<Vec<(Section, Regex)>> = Lazy::new(|| {
    let alternation = |names: &[&str]| {
        names
            .iter()
            .map(|name| regex::escape(name).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|")
    };

    Section::ALL
        .iter()
        .map(|section| {
            let mut full = vec![section.title()];
            full.extend_from_slice(section.aliases());
            let mut name = format!(r"{BULLET_OR_NUMBER}{BOLD}\s*(?:{})", alternation(&full));

            let short = section.short_aliases();
            if !short.is_empty() {
                name = format!("(?:{}|{BOLD}(?:{}))", name, alternation(short));
            }

            let heading = format!(
                r"(?i)^\s*(?:#{{1,6}}\s*)?{name}\s*{BOLD}\s*(?:\([^)]*\)\s*)?{BOLD}\s*"
            );
            let pattern = format!(r"{heading}(?:{SEPARATOR}\s*{BOLD}(?P<rest>.*))?$");
            (*section, Regex::new(&pattern).unwrap())
        })
        .collect()
});

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(?:[.,]\d+)?").unwrap());

// "2.5% of patients" is an item, not item 2
static LIST_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•+]\s*|\d{1,2}[.)](?:\s+|$))").unwrap());

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*(?P<body>\{.*\})\s*```$").unwrap());

/// Turns the model's free-text reply into a `MedicineAnalysis`.
#[derive(Debug, Clone, Copy)]
pub struct ResponseParser {
    version: PromptVersion,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(PromptVersion::CURRENT)
    }
}

impl ResponseParser {
    pub fn new(version: PromptVersion) -> Self {
        Self { version }
    }

    pub fn parse(&self, text: &str) -> ParsedAnalysis {
        let parsed = match self.version {
            PromptVersion::V1 => match parse_structured(text) {
                Some(parsed) => parsed,
                None => parse_sections_v1(text),
            },
        };

        if parsed.is_degraded() {
            let issues: Vec<String> = parsed.issues.iter().map(|i| i.to_string()).collect();
            log::warn!("⚠️ Degraded analysis: {}", issues.join(", "));
        } else {
            log::debug!("✅ All sections parsed for '{}'", parsed.analysis.name);
        }

        parsed
    }
}

/// Splits the reply into section bodies keyed by section. Text before the
/// first heading is dropped; a repeated heading is treated as body text.
fn split_sections(text: &str) -> HashMap<Section, String> {
    let mut bodies: HashMap<Section, String> = HashMap::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        let marker = SECTION_MARKERS
            .iter()
            .filter(|(section, _)| !bodies.contains_key(section))
            .find_map(|(section, re)| re.captures(line).map(|caps| (*section, caps)));

        match marker {
            Some((section, caps)) => {
                let rest = caps.name("rest").map(|m| m.as_str().trim()).unwrap_or("");
                let mut body = String::new();
                if !rest.is_empty() {
                    body.push_str(rest);
                    body.push('\n');
                }
                bodies.insert(section, body);
                current = Some(section);
            }
            None => {
                if let Some(body) = current.and_then(|s| bodies.get_mut(&s)) {
                    body.push_str(line);
                    body.push('\n');
                }
            }
        }
    }

    bodies
}

fn parse_sections_v1(text: &str) -> ParsedAnalysis {
    let bodies = split_sections(text);
    let mut issues = Vec::new();

    for section in Section::ALL {
        if !bodies.contains_key(&section) {
            issues.push(ParseIssue::MissingSection(section));
        }
    }

    let scalar = |section: Section| {
        bodies
            .get(&section)
            .map(|b| clean_scalar(b))
            .unwrap_or_default()
    };
    let list = |section: Section| {
        bodies
            .get(&section)
            .map(|b| split_list(b))
            .unwrap_or_default()
    };

    let rating = match bodies.get(&Section::SafetyRating) {
        Some(body) => extract_rating(body).unwrap_or_else(|| {
            issues.push(ParseIssue::UnparsableRating);
            0.0
        }),
        None => 0.0,
    };

    let analysis = MedicineAnalysis {
        name: scalar(Section::MedicineName),
        rating: MedicineAnalysis::clamp_rating(rating),
        side_effects: list(Section::SideEffects),
        recommendations: scalar(Section::Recommendations),
        studies: list(Section::RecentStudies),
        user_stories: list(Section::UserStories),
        alternatives: list(Section::Alternatives),
        price_range: scalar(Section::PriceRange),
        availability: scalar(Section::Availability),
    };

    ParsedAnalysis { analysis, issues }
}

/// First numeric token, comma or dot as decimal separator.
fn extract_rating(body: &str) -> Option<f64> {
    NUMBER
        .find(body)
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
}

fn clean_scalar(body: &str) -> String {
    body.trim()
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .to_string()
}

fn is_placeholder(item: &str) -> bool {
    matches!(
        item.trim_end_matches('.').to_lowercase().as_str(),
        "unknown" | "n/a" | "none" | "-"
    )
}

fn split_list(body: &str) -> Vec<String> {
    let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    // "a; b; c" on a single line
    let raw: Vec<&str> = if lines.len() == 1 && lines[0].contains(';') {
        lines[0].split(';').collect()
    } else {
        lines
    };

    raw.into_iter()
        .map(|item| clean_scalar(&LIST_PREFIX.replace(item.trim(), "")))
        .filter(|item| !item.is_empty() && !is_placeholder(item))
        .collect()
}

/// JSON reply shape, for providers running in a structured output mode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredReply {
    #[serde(alias = "medicineName", alias = "medicine_name")]
    name: Option<String>,
    #[serde(alias = "safetyRating", alias = "safety_rating")]
    rating: Option<serde_json::Value>,
    #[serde(alias = "side_effects")]
    side_effects: Option<Vec<String>>,
    recommendations: Option<String>,
    #[serde(alias = "recentStudies", alias = "recent_studies")]
    studies: Option<Vec<String>>,
    #[serde(alias = "user_stories")]
    user_stories: Option<Vec<String>>,
    alternatives: Option<Vec<String>>,
    #[serde(alias = "price_range")]
    price_range: Option<String>,
    availability: Option<String>,
}

fn parse_structured(text: &str) -> Option<ParsedAnalysis> {
    let trimmed = text.trim();
    let json = match JSON_FENCE.captures(trimmed) {
        Some(caps) => caps.name("body")?.as_str(),
        None if trimmed.starts_with('{') && trimmed.ends_with('}') => trimmed,
        None => return None,
    };

    let reply: StructuredReply = match serde_json::from_str(json) {
        Ok(reply) => reply,
        Err(e) => {
            log::debug!("Reply looks like JSON but did not decode ({}), using section parser", e);
            return None;
        }
    };

    let mut issues = Vec::new();
    let mut missing = |section: Section, present: bool| {
        if !present {
            issues.push(ParseIssue::MissingSection(section));
        }
    };
    missing(Section::MedicineName, reply.name.is_some());
    missing(Section::SafetyRating, reply.rating.is_some());
    missing(Section::SideEffects, reply.side_effects.is_some());
    missing(Section::RecentStudies, reply.studies.is_some());
    missing(Section::Recommendations, reply.recommendations.is_some());
    missing(Section::UserStories, reply.user_stories.is_some());
    missing(Section::Alternatives, reply.alternatives.is_some());
    missing(Section::PriceRange, reply.price_range.is_some());
    missing(Section::Availability, reply.availability.is_some());

    let rating = match &reply.rating {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => extract_rating(s),
        Some(_) => None,
        None => Some(0.0),
    };
    let rating = rating.unwrap_or_else(|| {
        issues.push(ParseIssue::UnparsableRating);
        0.0
    });

    let list = |items: Option<Vec<String>>| {
        items
            .unwrap_or_default()
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty() && !is_placeholder(i))
            .collect::<Vec<_>>()
    };
    let scalar = |s: Option<String>| s.map(|s| s.trim().to_string()).unwrap_or_default();

    Some(ParsedAnalysis {
        analysis: MedicineAnalysis {
            name: scalar(reply.name),
            rating: MedicineAnalysis::clamp_rating(rating),
            side_effects: list(reply.side_effects),
            recommendations: scalar(reply.recommendations),
            studies: list(reply.studies),
            user_stories: list(reply.user_stories),
            alternatives: list(reply.alternatives),
            price_range: scalar(reply.price_range),
            availability: scalar(reply.availability),
        },
        issues,
    })
}
