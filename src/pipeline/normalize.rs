//! Normalisation and validation: raw field mapping → [`VoterRecord`].
//!
//! Text values are trimmed and whitespace-collapsed. The age goes through
//! digit-glyph repair before it is parsed, and must land in
//! [`MIN_AGE`]`..=`[`MAX_AGE`]. A wrong age silently accepted is worse than
//! a dropped entry, so anything outside that range rejects the block.
//! Optional fields pass through when present; nothing is ever defaulted.

use crate::error::RejectReason;
use crate::output::VoterRecord;
use crate::pipeline::fields::{Field, FieldMap};

/// Youngest age on an electoral roll.
pub const MIN_AGE: u32 = 18;
/// Oldest plausible age; larger values are OCR noise.
pub const MAX_AGE: u32 = 120;

const MALE: &str = "पुरुष";
const FEMALE: &str = "महिला";
const OTHER: &str = "अन्य";

const TRIM_CHARS: &[char] = &['|', ':', '：', ';', ',', '.', '-', '–', '—', '।'];

/// Turn one block's fields into a record, or say why not.
pub fn normalize(fields: &FieldMap) -> Result<VoterRecord, RejectReason> {
    let text = |field: Field| fields.get(&field).and_then(|v| clean_text(v));

    let name = text(Field::Name).ok_or(RejectReason::MissingName)?;
    let raw_age = text(Field::Age).ok_or(RejectReason::MissingAge)?;
    let age = parse_age(&raw_age)?;

    let mut record = VoterRecord::new(name, age);
    record.house_number = text(Field::HouseNumber);
    record.spouse_or_parent_name = text(Field::SpouseOrParentName);
    record.gender = fields.get(&Field::Gender).and_then(|v| canonical_gender(v));
    record.tag_number = fields.get(&Field::TagNumber).and_then(|v| normalize_tag_number(v));
    record.voter_surname = text(Field::VoterSurname);
    record.surname = text(Field::Surname);
    (record.section_number, record.section_name) =
        pair(text(Field::SectionNumber), text(Field::SectionName));
    (record.polling_station_number, record.polling_station_name) = pair(
        text(Field::PollingStationNumber),
        text(Field::PollingStationName),
    );
    Ok(record)
}

/// Both halves or neither; the number half must repair to plain digits.
fn pair(number: Option<String>, name: Option<String>) -> (Option<String>, Option<String>) {
    match (number.map(|n| repair_digits(&n)), name) {
        (Some(n), Some(name)) if n.chars().all(|c| c.is_ascii_digit()) => (Some(n), Some(name)),
        _ => (None, None),
    }
}

/// Collapse whitespace, drop stray column rules, trim edge punctuation.
pub fn clean_text(raw: &str) -> Option<String> {
    let collapsed = raw
        .split_whitespace()
        .filter(|token| !token.chars().all(|c| c == '|'))
        .collect::<Vec<_>>()
        .join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c.is_whitespace() || TRIM_CHARS.contains(&c));
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Map Devanagari digits and the Latin look-alikes OCR confuses with
/// digits onto ASCII digits. Other characters pass through unchanged.
pub fn repair_digits(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '०'..='९' => char::from_digit(c as u32 - '०' as u32, 10).unwrap_or(c),
            'O' | 'o' => '0',
            'I' | 'l' | '|' => '1',
            'Z' => '2',
            'S' => '5',
            'B' => '8',
            other => other,
        })
        .collect()
}

/// Inverse of [`repair_digits`] for positions that must hold letters.
fn repair_letters(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '0' => 'O',
            '1' => 'I',
            '2' => 'Z',
            '5' => 'S',
            '6' => 'G',
            '8' => 'B',
            other => other,
        })
        .collect()
}

/// Parse an age string after glyph repair and range-check it.
pub fn parse_age(raw: &str) -> Result<u32, RejectReason> {
    let digits = repair_digits(raw.trim());
    if digits.is_empty() {
        return Err(RejectReason::MissingAge);
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(RejectReason::UnparsableAge { raw: raw.to_string() });
    }
    let age: u32 = digits
        .parse()
        .map_err(|_| RejectReason::UnparsableAge { raw: raw.to_string() })?;
    if !(MIN_AGE..=MAX_AGE).contains(&age) {
        return Err(RejectReason::AgeOutOfRange { age });
    }
    Ok(age)
}

/// Canonical gender label, or `None` for text that names no gender.
pub fn canonical_gender(raw: &str) -> Option<String> {
    let cleaned = clean_text(raw)?;
    let canonical = match cleaned.to_lowercase().as_str() {
        "पुरुष" | "पुरूष" | "m" | "male" => MALE,
        "महिला" | "स्त्री" | "f" | "female" => FEMALE,
        "अन्य" | "तृतीय" | "तृतीय लिंग" | "other" => OTHER,
        _ => return None,
    };
    Some(canonical.to_string())
}

/// Repair a `[serial] ID` tag: the serial becomes plain digits, the ID is
/// uppercased and repaired position by position.
///
/// Standard IDs are three letters and seven digits; other shapes split at
/// the trailing run of digit-like glyphs. State-issued `AA/00/000/000000`
/// IDs keep their letter segment and repair the numeric ones.
pub fn normalize_tag_number(raw: &str) -> Option<String> {
    let tokens: Vec<&str> = raw
        .split(|c: char| c.is_whitespace() || c == '|')
        .filter(|t| !t.is_empty())
        .collect();
    match tokens.as_slice() {
        [] => None,
        [serial, id @ ..] if !id.is_empty() && is_serial(serial) => {
            let id = normalize_id(&id.concat())?;
            Some(format!("{} {}", repair_digits(serial), id))
        }
        _ => normalize_id(&tokens.concat()),
    }
}

/// A short token that repairs to plain digits.
fn is_serial(token: &str) -> bool {
    token.chars().count() <= 4 && repair_digits(token).chars().all(|c| c.is_ascii_digit())
}

fn normalize_id(compact: &str) -> Option<String> {
    if compact.is_empty() {
        return None;
    }

    if compact.contains('/') {
        let mut segments = compact.split('/');
        let head = repair_letters(segments.next()?).to_uppercase();
        let tail: Vec<String> = segments.map(repair_digits).collect();
        return Some(std::iter::once(head).chain(tail).collect::<Vec<_>>().join("/"));
    }

    let split = if compact.len() == 10 && compact.is_ascii() {
        3
    } else {
        numeric_tail_start(compact)
    };
    let (prefix, tail) = compact.split_at(split);
    Some(format!(
        "{}{}",
        repair_letters(prefix).to_uppercase(),
        repair_digits(tail).to_uppercase()
    ))
}

/// Byte offset where the trailing run of digit-like glyphs begins.
fn numeric_tail_start(s: &str) -> usize {
    let mut start = s.len();
    for (i, c) in s.char_indices().rev() {
        if c.is_ascii_digit() || ('०'..='९').contains(&c) || "OoIlSBZ".contains(c) {
            start = i;
        } else {
            break;
        }
    }
    start
}
