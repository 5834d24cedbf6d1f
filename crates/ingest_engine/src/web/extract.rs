use async_trait::async_trait;
use chrono::NaiveDate;
use ingest_core::{FieldMap, FieldValue};
use pipeline_logging::pipeline_debug;
use scraper::{ElementRef, Html, Selector};

use crate::{CapabilityError, Extractor, FailureKind, FieldKind, FieldSpec, ItemContext, QuerySchema};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Extracts fields from the item's HTML with the CSS selectors of the schema.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectorExtractor;

#[async_trait]
impl Extractor for SelectorExtractor {
    async fn extract(
        &self,
        context: &ItemContext,
        schema: &QuerySchema,
    ) -> Result<Option<FieldMap>, CapabilityError> {
        let fields = extract_fields(context.document(), schema)?;
        Ok(if fields.is_empty() { None } else { Some(fields) })
    }
}

fn extract_fields(html: &str, schema: &QuerySchema) -> Result<FieldMap, CapabilityError> {
    let doc = Html::parse_document(html);
    let mut fields = FieldMap::new();
    for spec in &schema.fields {
        let selector = Selector::parse(&spec.selector).map_err(|err| {
            CapabilityError::new(
                FailureKind::MissingStructure,
                format!("bad selector for {}: {err}", spec.name),
            )
        })?;
        let value = doc
            .select(&selector)
            .next()
            .and_then(|node| raw_value(node, spec))
            .and_then(|raw| {
                let parsed = parse_value(&raw, spec.kind);
                if parsed.is_none() {
                    pipeline_debug!("Field {} has unparseable value {:?}", spec.name, raw);
                }
                parsed
            });
        match value {
            Some(value) => {
                fields.insert(spec.name.clone(), value);
            }
            None if spec.required => {
                return Err(CapabilityError::new(
                    FailureKind::MissingStructure,
                    format!("required field {} not found", spec.name),
                ));
            }
            None => {}
        }
    }
    Ok(fields)
}

fn raw_value(node: ElementRef<'_>, spec: &FieldSpec) -> Option<String> {
    let raw = match &spec.attribute {
        Some(attr) => node.value().attr(attr)?.to_string(),
        None => node.text().collect::<Vec<_>>().join(" "),
    };
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

pub(crate) fn parse_value(raw: &str, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => Some(FieldValue::Text(raw.to_string())),
        FieldKind::Integer => parse_integer(raw).map(FieldValue::Integer),
        FieldKind::Float => parse_float(raw).map(FieldValue::Float),
        FieldKind::Date => parse_date(raw).map(FieldValue::Date),
        FieldKind::Categories => {
            let items = parse_categories(raw);
            if items.is_empty() {
                None
            } else {
                Some(FieldValue::Categories(items))
            }
        }
    }
}

/// First run of digits and separators in the text, with grouping spaces
/// dropped. A space only joins two groups when exactly three digits follow
/// it, so "12 months" stays 12 while "2 850" becomes 2850.
fn first_number(raw: &str) -> Option<String> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let chars: Vec<char> = raw[start..].chars().collect();
    let mut number = String::new();
    for (idx, &c) in chars.iter().enumerate() {
        if c.is_ascii_digit() || c == ',' || c == '.' {
            number.push(c);
        } else if is_group_space(c)
            && number.ends_with(|last: char| last.is_ascii_digit())
            && starts_digit_group(&chars[idx + 1..])
        {
            continue;
        } else {
            break;
        }
    }
    Some(number.trim_end_matches([',', '.']).to_string())
}

fn is_group_space(c: char) -> bool {
    matches!(c, ' ' | '\u{a0}' | '\u{202f}')
}

fn starts_digit_group(rest: &[char]) -> bool {
    rest.len() >= 3
        && rest[..3].iter().all(char::is_ascii_digit)
        && !rest.get(3).is_some_and(char::is_ascii_digit)
}

/// Rewrite a localized number with `.` as the only separator, kept for the
/// decimal mark.
fn normalize_number(number: &str) -> String {
    let commas = number.matches(',').count();
    let dots = number.matches('.').count();
    let decimal = match (commas, dots) {
        // Both present: the later one is the decimal mark.
        (c, d) if c > 0 && d > 0 => {
            if number.rfind(',') > number.rfind('.') {
                Some(',')
            } else {
                Some('.')
            }
        }
        (1, 0) => single_mark(number, ','),
        (0, 1) => single_mark(number, '.'),
        // Repeated marks of one kind only ever group thousands.
        _ => None,
    };
    number
        .chars()
        .filter_map(|c| match c {
            ',' | '.' if Some(c) == decimal => Some('.'),
            ',' | '.' => None,
            other => Some(other),
        })
        .collect()
}

/// A lone mark is decimal unless it groups exactly three digits.
fn single_mark(number: &str, mark: char) -> Option<char> {
    let idx = number.find(mark)?;
    (number.len() - idx - 1 != 3).then_some(mark)
}

fn parse_integer(raw: &str) -> Option<i64> {
    let normalized = normalize_number(&first_number(raw)?);
    normalized.split('.').next()?.parse().ok()
}

fn parse_float(raw: &str) -> Option<f64> {
    normalize_number(&first_number(raw)?).parse().ok()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

fn parse_categories(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(|item| item.trim().to_uppercase())
        .filter(|item| !item.is_empty())
        .collect()
}
