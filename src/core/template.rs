//! Sprintf-style templates (`test-logs-%{+YYYY.MM.dd}`)
//!
//! A template is a mix of literal text, date references (`%{+FORMAT}`,
//! resolved against the event timestamp in UTC) and field references
//! (`%{field}` or `%{[outer][inner]}`). Date formats use Joda-style pattern
//! letters, which are translated to chrono format strings at parse time so
//! that a bad pattern is rejected when the configuration is loaded rather
//! than when the first event arrives.

use crate::core::event::Event;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while parsing a template
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated reference in template '{0}'")]
    Unterminated(String),

    #[error("empty reference in template '{0}'")]
    EmptyReference(String),

    #[error("unsupported date pattern '{pattern}' in template '{template}'")]
    UnsupportedPattern { pattern: String, template: String },
}

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Date { chrono_format: String },
    Field { path: Vec<String>, raw: String },
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%\{([^}]*)\}").expect("valid reference regex"))
}

impl Template {
    /// Parse a template string
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut last = 0;

        for captures in reference_regex().captures_iter(source) {
            let whole = captures.get(0).expect("group 0 always matches");
            let inner = captures.get(1).map(|m| m.as_str()).unwrap_or("").trim();

            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            last = whole.end();

            if inner.is_empty() {
                return Err(TemplateError::EmptyReference(source.to_string()));
            }

            if let Some(pattern) = inner.strip_prefix('+') {
                let chrono_format = joda_to_chrono(pattern).map_err(|pattern| {
                    TemplateError::UnsupportedPattern {
                        pattern,
                        template: source.to_string(),
                    }
                })?;
                segments.push(Segment::Date { chrono_format });
            } else {
                segments.push(Segment::Field {
                    path: parse_field_path(inner),
                    raw: whole.as_str().to_string(),
                });
            }
        }

        let rest = &source[last..];
        if rest.contains("%{") {
            return Err(TemplateError::Unterminated(source.to_string()));
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original template text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the template contains any reference at all
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Resolve the template for an event
    ///
    /// Missing field references are left in place verbatim.
    pub fn resolve(&self, event: &Event) -> String {
        let mut out = String::with_capacity(self.source.len() + 8);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Date { chrono_format } => {
                    out.push_str(&event.timestamp.format(chrono_format).to_string())
                }
                Segment::Field { path, raw } => match event.get_path(path) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Null) | None => out.push_str(raw),
                    Some(other) => out.push_str(&other.to_string()),
                },
            }
        }
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// `[a][b]` -> ["a", "b"]; `a` -> ["a"]
fn parse_field_path(reference: &str) -> Vec<String> {
    if reference.starts_with('[') {
        reference
            .split(']')
            .map(|part| part.trim_start_matches('['))
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        vec![reference.to_string()]
    }
}

/// Translate a Joda-style date pattern to a chrono format string.
///
/// Returns the offending token on failure.
fn joda_to_chrono(pattern: &str) -> Result<String, String> {
    if pattern.is_empty() {
        return Err(pattern.to_string());
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // Quoted literal text; '' is an escaped quote
            let mut j = i + 1;
            if j < chars.len() && chars[j] == '\'' {
                out.push('\'');
                i = j + 1;
                continue;
            }
            while j < chars.len() && chars[j] != '\'' {
                push_literal(&mut out, chars[j]);
                j += 1;
            }
            if j >= chars.len() {
                return Err(pattern.to_string());
            }
            i = j + 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        let token: String = chars[i..i + run].iter().collect();

        let spec = match (c, run) {
            ('Y' | 'y', 4) => "%Y",
            ('Y' | 'y', 2) => "%y",
            ('x', 4) => "%G",
            ('x', 2) => "%g",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', 4) => "%B",
            ('w', 1) => "%-V",
            ('w', 2) => "%V",
            ('d', 1) => "%-d",
            ('d', 2) => "%d",
            ('D', 3) => "%j",
            ('H', 1) => "%-H",
            ('H', 2) => "%H",
            ('m', 2) => "%M",
            ('s', 2) => "%S",
            ('S', 3) => "%3f",
            _ => return Err(token),
        };
        out.push_str(spec);
        i += run;
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn event_at(ts: chrono::DateTime<Utc>, fields: Value) -> Event {
        Event::from_json_object_at(fields.as_object().cloned().unwrap(), ts)
    }

    #[test]
    fn test_daily_index() {
        let template = Template::parse("test-logs-%{+YYYY.MM.dd}").unwrap();
        let event = event_at(Utc.with_ymd_and_hms(2024, 2, 9, 17, 4, 0).unwrap(), json!({}));
        assert_eq!(template.resolve(&event), "test-logs-2024.02.09");
    }

    #[test]
    fn test_same_day_same_index() {
        let template = Template::parse("test-logs-%{+YYYY.MM.dd}").unwrap();
        let early = event_at(Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap(), json!({}));
        let late = event_at(Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(), json!({}));
        let next = event_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), json!({}));

        assert_eq!(template.resolve(&early), template.resolve(&late));
        assert_ne!(template.resolve(&late), template.resolve(&next));
        assert_eq!(template.resolve(&next), "test-logs-2025.01.01");
    }

    #[test]
    fn test_resolution_uses_utc() {
        let template = Template::parse("logs-%{+YYYY.MM.dd}").unwrap();
        // 23:30 at UTC-05:00 is already the next day in UTC
        let event = Event::from_json_object(
            json!({"@timestamp": "2024-07-04T23:30:00-05:00"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(template.resolve(&event), "logs-2024.07.05");
    }

    #[test]
    fn test_field_references() {
        let template = Template::parse("%{[service][name]}-%{env}-%{missing}").unwrap();
        let event = event_at(
            Utc::now(),
            json!({"service": {"name": "api"}, "env": "prod"}),
        );
        assert_eq!(template.resolve(&event), "api-prod-%{missing}");
    }

    #[test]
    fn test_non_string_field_is_rendered() {
        let template = Template::parse("shard-%{n}").unwrap();
        let event = event_at(Utc::now(), json!({"n": 7}));
        assert_eq!(template.resolve(&event), "shard-7");
    }

    #[test]
    fn test_other_date_tokens() {
        let template = Template::parse("%{+xxxx.ww}/%{+HH:mm:ss.SSS}/%{+'day'D}").unwrap_err();
        assert!(matches!(template, TemplateError::UnsupportedPattern { .. }));

        let template = Template::parse("%{+xxxx.ww}/%{+HH:mm:ss.SSS}").unwrap();
        let ts = Utc.with_ymd_and_hms(2021, 1, 3, 7, 8, 9).unwrap() + chrono::Duration::milliseconds(42);
        let event = event_at(ts, json!({}));
        // 2021-01-03 belongs to ISO week 53 of 2020
        assert_eq!(template.resolve(&event), "2020.53/07:08:09.042");
    }

    #[test]
    fn test_quoted_literals() {
        let template = Template::parse("%{+YYYY'w'ww}").unwrap();
        let event = event_at(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(), json!({}));
        assert_eq!(template.resolve(&event), "2024w02");
    }

    #[test]
    fn test_invalid_templates() {
        assert!(matches!(
            Template::parse("logs-%{+YYYY.QQ}"),
            Err(TemplateError::UnsupportedPattern { .. })
        ));
        assert!(matches!(
            Template::parse("logs-%{}"),
            Err(TemplateError::EmptyReference(_))
        ));
        assert!(matches!(
            Template::parse("logs-%{+YYYY"),
            Err(TemplateError::Unterminated(_))
        ));
    }

    #[test]
    fn test_static_template() {
        let template = Template::parse("plain-index").unwrap();
        assert!(template.is_static());
        assert_eq!(template.resolve(&event_at(Utc::now(), json!({}))), "plain-index");
        assert!(!Template::parse("a-%{+YYYY}").unwrap().is_static());
    }
}
