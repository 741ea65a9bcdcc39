//! Field extraction: one voter block → raw `(field, value)` mapping.
//!
//! Each [`Field`] has one rule: a label pattern tolerant of OCR spelling
//! variants, plus a description of where the value sits relative to the
//! label. Rules are independent of each other and scan the block line by
//! line; the first label occurrence decides the field. A later occurrence
//! is ignored, never concatenated.
//!
//! Hindi labels nest inside each other (`नाम` in `पिता का नाम`, `उपनाम` in
//! `निर्वाचक का उपनाम`). A label pattern may therefore carry a named group
//! `skip`: matches where that group took part belong to a longer label and
//! are passed over. Labels must also sit on word boundaries, so `आयु` does
//! not fire inside the name `आयुष`.
//!
//! Paired fields (section, polling station) come from a single rule that
//! must capture both halves from the same region; anything less yields
//! neither half.

use crate::pipeline::segment::{PageHeader, VoterBlock, TAG_ANCHOR_PATTERN};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Label fragments ──────────────────────────────────────────────────────────

/// House-number label; also the `House` anchor.
pub(crate) const HOUSE_LABEL: &str = r"मकान\s*(?:संख्या?|नंबर|नम्बर|सं\.?|नं\.?)";

/// `निर्वाचक` and the reph-less or short-vowel readings OCR produces.
const ELECTOR: &str = r"नि(?:र्)?वाचि?क";

/// Possessive `का` / `के` with surrounding space.
const OF: &str = r"\s*क[ाे]\s*";

const RELATION: &str = r"(?:पिता|पति|माता|पत्नी|अभिभावक)";

/// `एवं` / `व` / `और` / `तथा` joining "number and name" labels.
const AND: &str = r"(?:एवं|व|और|तथा)";

const SEPARATORS: &[char] = &[':', '：', 'ः', ';', '=', '-', '–', '—', '.', '|'];

// ── Field names ──────────────────────────────────────────────────────────────

/// Every attribute the extractor can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Age,
    HouseNumber,
    SpouseOrParentName,
    Gender,
    TagNumber,
    VoterSurname,
    Surname,
    SectionNumber,
    SectionName,
    PollingStationNumber,
    PollingStationName,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Age => "age",
            Field::HouseNumber => "house_number",
            Field::SpouseOrParentName => "spouse_or_parent_name",
            Field::Gender => "gender",
            Field::TagNumber => "tag_number",
            Field::VoterSurname => "voter_surname",
            Field::Surname => "surname",
            Field::SectionNumber => "section_number",
            Field::SectionName => "section_name",
            Field::PollingStationNumber => "polling_station_number",
            Field::PollingStationName => "polling_station_name",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw values found in one block, keyed by field.
pub type FieldMap = BTreeMap<Field, String>;

// ── Rules ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// Rest of the line up to the next label.
    Text,
    /// First whitespace-delimited token.
    Token,
    /// Leading run of digit-like glyphs.
    Digits,
    /// The label pattern's own `value` group, preceded by its `serial`
    /// group when that took part.
    Group,
}

struct FieldRule {
    field: Field,
    label: Regex,
    capture: Capture,
    /// Look at the following line when the label line holds no value.
    next_line: bool,
}

impl FieldRule {
    fn new(field: Field, label: &str, capture: Capture, next_line: bool) -> Self {
        Self {
            field,
            label: Regex::new(label).unwrap(),
            capture,
            next_line,
        }
    }

    fn apply(&self, lines: &[String]) -> Option<String> {
        let bounded = self.capture != Capture::Group;
        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = find_label(&self.label, line, bounded) else {
                continue;
            };
            if self.capture == Capture::Group {
                return group_value(&caps);
            }
            let end = caps.get(0).map_or(line.len(), |m| m.end());
            let region = value_region(&line[end..]);
            if !region.is_empty() {
                return self.capture_value(region);
            }
            if self.next_line {
                return lines
                    .get(i + 1)
                    .and_then(|next| self.capture_value(value_region(next)));
            }
            return None;
        }
        None
    }

    fn capture_value(&self, region: &str) -> Option<String> {
        let value = match self.capture {
            Capture::Text => region.trim_end_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c)),
            Capture::Token => first_token(region)?,
            Capture::Digits => match AGE_DIGITS.find(region) {
                Some(m) if m.as_str().chars().any(is_true_digit) => m.as_str().trim_matches('|'),
                // Keep non-numeric text so validation can report it.
                _ => first_token(region)?,
            },
            Capture::Group => region,
        };
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// Rule producing a number + name pair from one `<label> : <number>-<name>`
/// region.
struct PairedRule {
    number: Field,
    name: Field,
    label: Regex,
}

impl PairedRule {
    fn new(number: Field, name: Field, label: &str) -> Self {
        Self {
            number,
            name,
            label: Regex::new(label).unwrap(),
        }
    }

    fn apply(&self, lines: &[String]) -> Option<(String, String)> {
        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = find_label(&self.label, line, true) else {
                continue;
            };
            let end = caps.get(0).map_or(line.len(), |m| m.end());
            let rest = strip_separators(&line[end..]);
            let region = if rest.is_empty() {
                lines.get(i + 1).map(String::as_str).unwrap_or_default()
            } else {
                rest
            };
            return parse_pair(region);
        }
        None
    }

    fn insert_into(&self, fields: &mut FieldMap, (number, name): (String, String)) {
        fields.insert(self.number, number);
        fields.insert(self.name, name);
    }
}

static FIELD_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    vec![
        FieldRule::new(
            Field::Name,
            &format!(r"(?P<skip>{RELATION}{OF}|{AND}\s*)?(?:{ELECTOR}{OF})?नाम"),
            Capture::Text,
            true,
        ),
        FieldRule::new(Field::Age, r"उम्र|उम्न|उग्र|आयु", Capture::Digits, false),
        FieldRule::new(Field::HouseNumber, HOUSE_LABEL, Capture::Token, false),
        FieldRule::new(
            Field::SpouseOrParentName,
            &format!(r"{RELATION}{OF}नाम"),
            Capture::Text,
            true,
        ),
        FieldRule::new(Field::Gender, r"लिंग|लिग", Capture::Token, false),
        FieldRule::new(Field::TagNumber, TAG_ANCHOR_PATTERN, Capture::Group, false),
        FieldRule::new(
            Field::VoterSurname,
            &format!(r"{ELECTOR}{OF}उपनाम"),
            Capture::Text,
            true,
        ),
        FieldRule::new(
            Field::Surname,
            &format!(r"(?P<skip>{ELECTOR}{OF})?(?:उपनाम|कुलनाम)"),
            Capture::Text,
            true,
        ),
    ]
});

static PAIRED_RULES: Lazy<Vec<PairedRule>> = Lazy::new(|| {
    vec![
        PairedRule::new(
            Field::SectionNumber,
            Field::SectionName,
            &format!(r"अनुभाग\s*(?:की\s*)?(?:संख्या?|सं\.?)\s*{AND}\s*नाम"),
        ),
        PairedRule::new(
            Field::PollingStationNumber,
            Field::PollingStationName,
            &format!(
                r"(?:नि(?:र्)?वा?चन\s*क्षेत्र|मतदान\s*(?:केन्द्र|केंद्र|स्थल))\s*(?:की|का|के)?\s*(?:संख्या?|सं\.?)\s*{AND}\s*नाम"
            ),
        ),
    ]
});

/// Any label that ends a free-text value running along the same line.
static STOP_LABELS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{ELECTOR}{OF}(?:उप)?नाम|{RELATION}{OF}नाम|(?:उप|कुल)नाम|नाम\s*[:：ः;=]|उम्र|उम्न|उग्र|आयु|लिंग|लिग|{HOUSE_LABEL}|अनुभाग|मतदान\s*(?:केन्द्र|केंद्र|स्थल)|नि(?:र्)?वा?चन\s*क्षेत्र"
    ))
    .unwrap()
});

static AGE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9०-९OoIlZSB|]+").unwrap());

static PAIR_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<number>[0-9०-९OoIl]{1,4})\s*[-–—.]\s*(?P<name>\S.*)$").unwrap()
});

// ── Extraction ───────────────────────────────────────────────────────────────

/// Apply every rule to `lines` and collect what they find.
pub fn extract_fields(lines: &[String]) -> FieldMap {
    let mut fields = FieldMap::new();
    for rule in FIELD_RULES.iter() {
        if let Some(value) = rule.apply(lines) {
            fields.insert(rule.field, value);
        }
    }
    for rule in PAIRED_RULES.iter() {
        if let Some(pair) = rule.apply(lines) {
            rule.insert_into(&mut fields, pair);
        }
    }
    fields
}

/// Extract a block, filling missing pairs from its page header.
///
/// A pair is taken from the header only as a whole and only when the block
/// itself has no complete pair of that kind.
pub fn extract_block(block: &VoterBlock, header: Option<&PageHeader>) -> FieldMap {
    let mut fields = extract_fields(&block.lines);
    let Some(header) = header else {
        return fields;
    };
    for rule in PAIRED_RULES.iter() {
        if fields.contains_key(&rule.number) {
            continue;
        }
        if let Some(pair) = rule.apply(&header.lines) {
            rule.insert_into(&mut fields, pair);
        }
    }
    fields
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn find_label<'t>(label: &Regex, line: &'t str, bounded: bool) -> Option<Captures<'t>> {
    label.captures_iter(line).find(|caps| {
        caps.name("skip").is_none()
            && (!bounded
                || caps
                    .get(0)
                    .map_or(false, |m| on_word_boundary(line, m.start(), m.end())))
    })
}

/// Letters, vowel signs, nukta and virama all continue a Devanagari word.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '\u{093C}' | '\u{094D}')
}

fn is_true_digit(c: char) -> bool {
    c.is_ascii_digit() || ('०'..='९').contains(&c)
}

fn on_word_boundary(line: &str, start: usize, end: usize) -> bool {
    let before = line[..start].chars().next_back();
    let last = line[start..end].chars().next_back();
    let after = line[end..].chars().next();
    let starts_clean = before.map_or(true, |c| !is_word_char(c));
    let ends_clean = !last.map_or(false, is_word_char) || after.map_or(true, |c| !is_word_char(c));
    starts_clean && ends_clean
}

fn strip_separators(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c))
        .trim_end()
}

fn cut_at_stop(s: &str) -> &str {
    let stop = STOP_LABELS
        .find_iter(s)
        .find(|m| on_word_boundary(s, m.start(), m.end()))
        .map_or(s.len(), |m| m.start());
    s[..stop].trim()
}

/// Value text following a label: separators stripped, cut at the next label.
fn value_region(s: &str) -> &str {
    cut_at_stop(strip_separators(s))
}

fn group_value(caps: &Captures<'_>) -> Option<String> {
    let value = caps.name("value")?.as_str();
    Some(match caps.name("serial") {
        Some(serial) => format!("{} {}", serial.as_str(), value),
        None => value.to_string(),
    })
}

fn first_token(region: &str) -> Option<&str> {
    region
        .split_whitespace()
        .next()
        .map(|t| t.trim_matches(|c: char| c == ',' || SEPARATORS.contains(&c)))
        .filter(|t| !t.is_empty())
}

fn parse_pair(region: &str) -> Option<(String, String)> {
    let caps = PAIR_VALUE.captures(region.trim())?;
    let number = caps.name("number")?.as_str();
    let name = cut_at_stop(caps.name("name")?.as_str())
        .trim_end_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c));
    if name.is_empty() {
        return None;
    }
    Some((number.to_string(), name.to_string()))
}
