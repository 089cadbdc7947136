//! Naming engine
//!
//! Renders filesystem names from user templates with typed field
//! substitution. Templates contain `{Field}` or `{Field:spec}` tokens;
//! specs support strftime-style date expansion and zero-padding. The
//! engine is pure and total: malformed templates, unknown fields, and
//! bad format specs all degrade to best-effort text, because the
//! filesystem operations downstream must always receive a name.

use crate::core::sanitize::{sanitize_filename, sanitize_folder};
use crate::db::models::{Issue, MediaSettings, Volume};
use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref TEMPLATE_TOKEN: Regex = Regex::new(r"\{([^{}:]+?)(?::([^{}]+?))?\}").unwrap();
    static ref LEADING_ARTICLE: Regex = Regex::new(r"(?i)^(The|An|A)\s+(.+)$").unwrap();
    static ref WIDTH_PRECISION_SPEC: Regex = Regex::new(r"^(\d+)\.(\d+)$").unwrap();
}

/// One rendered field: the default text plus optional typed views of it
///
/// Built fresh per render call, never persisted.
#[derive(Debug, Clone, Default)]
pub struct FormatValue {
    default: String,
    numeric: Option<f64>,
    raw: Option<String>,
    date_value: Option<NaiveDateTime>,
}

impl FormatValue {
    /// A plain text field with no numeric or date interpretation
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            default: value.into(),
            ..Self::default()
        }
    }

    /// A field that renders as "" with or without a format spec
    pub fn empty() -> Self {
        Self::default()
    }

    /// A numeric field; `raw` keeps the original string for padding fallback
    pub fn number(raw: &str) -> Self {
        let numeric = raw.trim().parse::<f64>().ok();
        Self {
            default: format_issue_number(raw),
            numeric,
            raw: Some(raw.to_string()),
            date_value: None,
        }
    }

    /// An integer field (years, counts)
    pub fn integer(value: i64) -> Self {
        Self {
            default: value.to_string(),
            numeric: Some(value as f64),
            raw: Some(value.to_string()),
            date_value: None,
        }
    }

    /// A date field; the default text is what renders without a spec
    pub fn date(value: NaiveDateTime, default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            numeric: None,
            raw: None,
            date_value: Some(value),
        }
    }

    /// Render this field under an optional format spec
    ///
    /// Resolution order: strftime spec against a parsed date, all-digit
    /// zero-padding, generic width.precision numeric formatting. Every
    /// branch falls through to the default string rather than erroring.
    pub fn format(&self, spec: Option<&str>) -> String {
        let spec = match spec {
            Some(s) if !s.is_empty() => s,
            _ => return self.default.clone(),
        };

        if spec.starts_with('%') {
            if let Some(date) = self.date_value {
                return format_date(date, spec).unwrap_or_else(|| self.default.clone());
            }
        }

        if spec.chars().all(|c| c.is_ascii_digit()) {
            return self.zero_pad(spec.len());
        }

        self.format_numeric_spec(spec)
            .unwrap_or_else(|| self.default.clone())
    }

    /// Zero-pad to `width`, applying the width to the integer part only
    fn zero_pad(&self, width: usize) -> String {
        if let Some(n) = self.numeric {
            if n.fract() == 0.0 {
                return format!("{:0width$}", n as i64, width = width);
            }
            // Keep up to two decimals, stripping trailing zeros and a bare point
            let rendered = format!("{:.2}", n);
            let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
            return match rendered.split_once('.') {
                Some((int_part, frac)) => {
                    let int_value: i64 = int_part.parse().unwrap_or(0);
                    format!("{:0width$}.{}", int_value, frac, width = width)
                }
                None => {
                    let int_value: i64 = rendered.parse().unwrap_or(0);
                    format!("{:0width$}", int_value, width = width)
                }
            };
        }

        // No parsed numeric: pad the raw digit string if it is one
        if let Some(raw) = &self.raw {
            let digits: String = raw.chars().filter(|c| *c != '.').collect();
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return format!("{:0>width$}", digits, width = width);
            }
        }

        self.default.clone()
    }

    /// Generic `<width>.<precision>` numeric spec, e.g. "07.2"
    fn format_numeric_spec(&self, spec: &str) -> Option<String> {
        let caps = WIDTH_PRECISION_SPEC.captures(spec)?;
        let n = self.numeric?;
        let width: usize = caps[1].parse().ok()?;
        let precision: usize = caps[2].parse().ok()?;
        Some(format!(
            "{:0width$.precision$}",
            n,
            width = width,
            precision = precision
        ))
    }
}

/// Expand a strftime spec; None if the spec has invalid items
fn format_date(date: NaiveDateTime, spec: &str) -> Option<String> {
    let items: Vec<Item> = StrftimeItems::new(spec).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(date.format_with_items(items.into_iter()).to_string())
}

/// Render a template against a field context
///
/// Unknown fields render as empty string; text outside tokens passes
/// through untouched.
pub fn render_template(template: &str, context: &HashMap<String, FormatValue>) -> String {
    TEMPLATE_TOKEN
        .replace_all(template, |caps: &regex::Captures| {
            let field = &caps[1];
            let spec = caps.get(2).map(|m| m.as_str());
            match context.get(field) {
                Some(value) => value.format(spec),
                None => String::new(),
            }
        })
        .to_string()
}

/// Move a leading article to the end: "The Walking Dead" -> "Walking Dead, The"
pub fn clean_title(title: &str) -> String {
    match LEADING_ARTICLE.captures(title.trim()) {
        Some(caps) => format!("{}, {}", &caps[2], &caps[1]),
        None => title.trim().to_string(),
    }
}

/// Format an issue number for display
///
/// Whole numbers drop their decimals, fractional numbers keep them, and
/// anything unparsable ("Annual") passes through untouched.
pub fn format_issue_number(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(n) if n.fract() == 0.0 => format!("{}", n as i64),
        Ok(n) => n.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Parse a release date through the accepted format cascade
///
/// ISO-8601 with or without a trailing Z, then `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DD`, `YYYY-MM` (day defaults to 1), and `YYYY` (month and
/// day default to 1). First successful parse wins.
pub fn parse_release_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    let normalized = trimmed.strip_suffix('Z').unwrap_or(trimmed);

    let attempts: [fn(&str) -> Option<NaiveDateTime>; 5] = [
        |s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok(),
        |s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok(),
        |s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        },
        |s| {
            let (year, month) = s.split_once('-')?;
            if year.len() != 4 || month.len() != 2 {
                return None;
            }
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)?
                .and_hms_opt(0, 0, 0)
        },
        |s| {
            if s.len() != 4 || !s.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            NaiveDate::from_ymd_opt(s.parse().ok()?, 1, 1)?.and_hms_opt(0, 0, 0)
        },
    ];

    attempts.iter().find_map(|parse| parse(normalized))
}

/// Build the template context for one issue of a volume
///
/// `extra` carries caller-supplied fields ("Publisher" overrides, service
/// names); entries there shadow the built-in aliases.
pub fn build_issue_context(
    volume: &Volume,
    issue: &Issue,
    extension: &str,
    extra: &HashMap<String, FormatValue>,
) -> HashMap<String, FormatValue> {
    let mut context = HashMap::new();

    context.insert(
        "Series Title".to_string(),
        FormatValue::text(clean_title(&volume.title)),
    );

    match volume.volume_number {
        Some(number) => {
            context.insert("Volume Number".to_string(), FormatValue::integer(number as i64));
        }
        None => {
            context.insert("Volume Number".to_string(), FormatValue::empty());
        }
    }

    context.insert(
        "Publisher".to_string(),
        volume
            .publisher
            .as_deref()
            .map(FormatValue::text)
            .unwrap_or_else(FormatValue::empty),
    );

    context.insert(
        "Special Version".to_string(),
        volume
            .special_version
            .as_deref()
            .map(FormatValue::text)
            .unwrap_or_else(FormatValue::empty),
    );

    let release_date = issue
        .release_date
        .as_deref()
        .and_then(parse_release_datetime);

    // Volume year wins; a parsed release date is the fallback
    let year = volume
        .year
        .map(|y| y as i64)
        .or_else(|| release_date.map(|d| d.year() as i64));
    context.insert(
        "Year".to_string(),
        year.map(FormatValue::integer).unwrap_or_else(FormatValue::empty),
    );

    context.insert(
        "Issue".to_string(),
        issue
            .issue_number
            .as_deref()
            .map(FormatValue::number)
            .unwrap_or_else(FormatValue::empty),
    );

    context.insert(
        "Issue Title".to_string(),
        issue
            .title
            .as_deref()
            .map(FormatValue::text)
            .unwrap_or_else(FormatValue::empty),
    );

    context.insert(
        "Release Date".to_string(),
        match (release_date, issue.release_date.as_deref()) {
            (Some(date), Some(text)) => FormatValue::date(date, text),
            _ => FormatValue::empty(),
        },
    );

    context.insert("ext".to_string(), FormatValue::text(extension));

    for (key, value) in extra {
        context.insert(key.clone(), value.clone());
    }

    context
}

/// Pick the filename template for this issue and render it, sanitized
pub fn generate_issue_filename(
    settings: &MediaSettings,
    volume: &Volume,
    issue: &Issue,
    extension: &str,
    extra: &HashMap<String, FormatValue>,
) -> String {
    let template = if volume.special_version.is_some() {
        &settings.file_naming_special_version
    } else if issue.issue_number.is_none() {
        &settings.file_naming_empty
    } else {
        &settings.file_naming
    };

    let context = build_issue_context(volume, issue, extension, extra);
    sanitize_filename(&render_template(template, &context))
}

/// Render the volume folder template, sanitized per segment
pub fn generate_volume_folder(
    settings: &MediaSettings,
    volume: &Volume,
    issue: &Issue,
    extra: &HashMap<String, FormatValue>,
) -> String {
    let context = build_issue_context(volume, issue, "", extra);
    sanitize_folder(&render_template(&settings.volume_folder_naming, &context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Issue, MediaSettings, Volume};

    fn context_with(field: &str, value: FormatValue) -> HashMap<String, FormatValue> {
        let mut ctx = HashMap::new();
        ctx.insert(field.to_string(), value);
        ctx
    }

    fn test_volume() -> Volume {
        Volume {
            id: "vol-1".to_string(),
            library_id: "lib-1".to_string(),
            title: "The Walking Dead".to_string(),
            volume_number: Some(1),
            year: Some(2003),
            publisher: Some("Image".to_string()),
            special_version: None,
            folder: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn test_issue(number: Option<&str>) -> Issue {
        Issue {
            id: "iss-1".to_string(),
            volume_id: "vol-1".to_string(),
            issue_number: number.map(|s| s.to_string()),
            title: Some("Days Gone Bye".to_string()),
            release_date: Some("2003-10-08".to_string()),
            file_path: None,
            status: "downloaded".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_clean_title_moves_article() {
        assert_eq!(
            clean_title("The Amazing Spider-Man"),
            "Amazing Spider-Man, The"
        );
        assert_eq!(clean_title("A Study in Emerald"), "Study in Emerald, A");
        assert_eq!(clean_title("an Unkindness"), "Unkindness, an");
        assert_eq!(clean_title("Batman"), "Batman");
        // "Theory" must not lose its prefix
        assert_eq!(clean_title("Theory of Magic"), "Theory of Magic");
    }

    #[test]
    fn test_format_issue_number() {
        assert_eq!(format_issue_number("7"), "7");
        assert_eq!(format_issue_number("7.0"), "7");
        assert_eq!(format_issue_number("1.5"), "1.5");
        assert_eq!(format_issue_number("Annual"), "Annual");
    }

    #[test]
    fn test_zero_padding_integer() {
        let ctx = context_with("Issue", FormatValue::number("7"));
        assert_eq!(render_template("{Issue:000}", &ctx), "007");
    }

    #[test]
    fn test_zero_padding_fractional_keeps_decimals() {
        let ctx = context_with("Issue", FormatValue::number("1.5"));
        assert_eq!(render_template("{Issue:000}", &ctx), "001.5");
    }

    #[test]
    fn test_zero_padding_missing_field_renders_empty() {
        let ctx = HashMap::new();
        assert_eq!(render_template("{Issue:000}", &ctx), "");
    }

    #[test]
    fn test_zero_padding_raw_fallback() {
        // No parseable numeric, but the raw digits (dots stripped) still pad
        let value = FormatValue {
            default: "1.2.3".to_string(),
            numeric: None,
            raw: Some("1.2.3".to_string()),
            date_value: None,
        };
        let ctx = context_with("Issue", value);
        assert_eq!(render_template("{Issue:00000}", &ctx), "00123");
    }

    #[test]
    fn test_zero_padding_non_numeric_raw_falls_back_to_default() {
        let ctx = context_with("Issue", FormatValue::number("Annual"));
        assert_eq!(render_template("{Issue:000}", &ctx), "Annual");
    }

    #[test]
    fn test_strftime_spec() {
        let date = parse_release_datetime("2024-05-01T00:00:00Z").unwrap();
        let ctx = context_with("Release Date", FormatValue::date(date, "2024-05-01"));
        assert_eq!(render_template("{Release Date:%Y-%m}", &ctx), "2024-05");
        assert_eq!(render_template("{Release Date:%B %Y}", &ctx), "May 2024");
    }

    #[test]
    fn test_strftime_invalid_spec_falls_back() {
        let date = parse_release_datetime("2024-05-01").unwrap();
        let ctx = context_with("Release Date", FormatValue::date(date, "2024-05-01"));
        assert_eq!(render_template("{Release Date:%Q}", &ctx), "2024-05-01");
    }

    #[test]
    fn test_unknown_token_renders_empty() {
        let ctx = HashMap::new();
        assert_eq!(render_template("a {Nope} b", &ctx), "a  b");
    }

    #[test]
    fn test_malformed_template_passes_through() {
        let ctx = context_with("Issue", FormatValue::number("4"));
        assert_eq!(render_template("{Issue", &ctx), "{Issue");
        assert_eq!(render_template("Issue}", &ctx), "Issue}");
    }

    #[test]
    fn test_date_cascade() {
        for input in ["2024-05-01T00:00:00Z", "2024-05-01T00:00:00", "2024-05", "2024"] {
            let parsed = parse_release_datetime(input)
                .unwrap_or_else(|| panic!("failed to parse {}", input));
            assert_eq!(parsed.year(), 2024);
        }
        assert_eq!(
            parse_release_datetime("2024-05").unwrap().day(),
            1
        );
        assert_eq!(parse_release_datetime("2024").unwrap().month(), 1);
        assert!(parse_release_datetime("not-a-date").is_none());
        assert!(parse_release_datetime("").is_none());
    }

    #[test]
    fn test_generate_issue_filename() {
        let settings = MediaSettings::default();
        let volume = test_volume();
        let issue = test_issue(Some("3"));
        let name = generate_issue_filename(&settings, &volume, &issue, "cbz", &HashMap::new());
        assert_eq!(name, "Walking Dead, The (2003) Issue 3");
    }

    #[test]
    fn test_generate_issue_filename_empty_volume_variant() {
        let settings = MediaSettings::default();
        let volume = test_volume();
        let issue = test_issue(None);
        let name = generate_issue_filename(&settings, &volume, &issue, "cbz", &HashMap::new());
        assert_eq!(name, "Walking Dead, The (2003)");
    }

    #[test]
    fn test_generate_issue_filename_special_version() {
        let settings = MediaSettings::default();
        let mut volume = test_volume();
        volume.special_version = Some("TPB".to_string());
        let issue = test_issue(Some("1"));
        let name = generate_issue_filename(&settings, &volume, &issue, "cbz", &HashMap::new());
        assert_eq!(name, "Walking Dead, The (2003) TPB");
    }

    #[test]
    fn test_generate_volume_folder() {
        let settings = MediaSettings::default();
        let volume = test_volume();
        let issue = test_issue(Some("3"));
        let folder = generate_volume_folder(&settings, &volume, &issue, &HashMap::new());
        // The folder whitelist drops the comma the article move introduces
        assert_eq!(folder, "Walking Dead The/Volume 1 (2003)");
    }

    #[test]
    fn test_year_falls_back_to_release_date() {
        let mut volume = test_volume();
        volume.year = None;
        let issue = test_issue(Some("3"));
        let ctx = build_issue_context(&volume, &issue, "cbz", &HashMap::new());
        assert_eq!(render_template("{Year}", &ctx), "2003");
    }

    #[test]
    fn test_year_empty_when_nothing_known() {
        let mut volume = test_volume();
        volume.year = None;
        let mut issue = test_issue(Some("3"));
        issue.release_date = None;
        let ctx = build_issue_context(&volume, &issue, "cbz", &HashMap::new());
        assert_eq!(render_template("{Year}", &ctx), "");
    }

    use proptest::prelude::*;

    proptest! {
        // Rendering is total: arbitrary template text never panics, and a
        // rendered-then-sanitized filename is already sanitizer-stable
        #[test]
        fn prop_render_never_panics(template in ".{0,60}") {
            let volume = test_volume();
            let issue = test_issue(Some("1.5"));
            let ctx = build_issue_context(&volume, &issue, "cbz", &HashMap::new());
            let _ = render_template(&template, &ctx);

            let mut settings = MediaSettings::default();
            settings.file_naming = template;
            let name = generate_issue_filename(&settings, &volume, &issue, "cbz", &HashMap::new());
            prop_assert_eq!(crate::core::sanitize::sanitize_filename(&name), name);
        }
    }

    #[test]
    fn test_extra_fields_shadow_builtins() {
        let volume = test_volume();
        let issue = test_issue(Some("3"));
        let mut extra = HashMap::new();
        extra.insert("Publisher".to_string(), FormatValue::text("Skybound"));
        let ctx = build_issue_context(&volume, &issue, "cbz", &extra);
        assert_eq!(render_template("{Publisher}", &ctx), "Skybound");
    }
}
