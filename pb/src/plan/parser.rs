//! Overview response parser
//!
//! The model's answer is free-form markdown, not a schema. Each line is
//! classified into a small set of shapes and a forgiving state machine walks
//! those, so headings in a slightly different style still yield sections and
//! anything unrecognizable is skipped with a warning instead of failing the run.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::{DEFAULT_SCOPE, OverviewPlan, PlanError, SectionRecord, SectionStatus, SlugAllocator};

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").expect("valid regex"));

static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[-*+]\s+)?[*_]*(scope classification|scope|status|summary)[*_]*\s*:\s*[*_]*\s*(.*?)\s*$")
        .expect("valid regex")
});

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+[.)]|[-*+])\s+(.+)$").expect("valid regex"));

static KEYED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:section\s+)?([a-z]?\d+(?:\.\d+)*)\s*[:.)\-\u{2013}\u{2014}]\s*(.+)$").expect("valid regex")
});

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:section\s+)?([a-z]?\d+(?:\.\d+)*)\s*[:.)\-\u{2013}\u{2014}]?$").expect("valid regex")
});

/// Level-2 headings whose body is the plan overview prose
const OVERVIEW_HEADINGS: &[&str] = &["overview", "summary", "project overview", "executive summary"];

/// Level-2 headings that only group the section list
const CONTAINER_HEADINGS: &[&str] = &[
    "sections",
    "plan",
    "work sections",
    "implementation plan",
    "implementation sections",
    "work items",
];

/// Level-2 headings whose body is the scope classification
const SCOPE_HEADINGS: &[&str] = &["scope", "scope classification"];

/// Tunables for overview parsing
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Fewer usable sections than this is an `EmptyPlan` error (never below 1)
    pub min_sections: usize,
    /// Title used when the response has no level-1 heading
    pub fallback_title: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            min_sections: 1,
            fallback_title: "Project Plan".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKey {
    Scope,
    Status,
    Summary,
}

/// Shape of one response line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line<'a> {
    Title(String),
    Heading { level: usize, text: String },
    Field { key: FieldKey, value: String },
    ListItem(&'a str),
    Blank,
    Body(&'a str),
}

fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }

    if let Some(caps) = HEADING.captures(line) {
        let level = caps[1].len();
        let text = strip_emphasis(&caps[2]);
        return if level == 1 {
            Line::Title(text)
        } else {
            Line::Heading { level, text }
        };
    }

    if let Some(caps) = FIELD.captures(line) {
        let key = match caps[1].to_lowercase().as_str() {
            "status" => FieldKey::Status,
            "summary" => FieldKey::Summary,
            _ => FieldKey::Scope,
        };
        return Line::Field {
            key,
            value: strip_emphasis(&caps[2]),
        };
    }

    if let Some(caps) = LIST_ITEM.captures(line) {
        return Line::ListItem(caps.get(1).map_or("", |m| m.as_str()));
    }

    Line::Body(line)
}

fn strip_emphasis(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| c == '*' || c == '_' || c == '`')
        .trim()
        .to_string()
}

fn normalize_heading(text: &str) -> String {
    text.trim_end_matches(':').trim().to_lowercase()
}

/// Split "S1: Name" / "1. Name" / "Section 2 - Name" into (key, name)
fn split_key(text: &str) -> (Option<String>, String) {
    let text = strip_emphasis(text);
    if let Some(caps) = KEYED_NAME.captures(&text) {
        return (Some(normalize_key(&caps[1])), strip_emphasis(&caps[2]));
    }
    if let Some(caps) = BARE_KEY.captures(&text) {
        return (Some(normalize_key(&caps[1])), String::new());
    }
    (None, text)
}

fn normalize_key(raw: &str) -> String {
    let key = raw.to_uppercase();
    if key.starts_with(|c: char| c.is_ascii_digit()) {
        format!("S{}", key)
    } else {
        key
    }
}

/// A section heading seen in the response, not yet validated
#[derive(Debug, Default)]
struct Candidate {
    heading: String,
    status: Option<SectionStatus>,
    summary: Option<String>,
    body: Vec<String>,
}

/// A validated section before ids are assigned
#[derive(Debug)]
struct Parsed {
    key: Option<String>,
    name: String,
    summary: String,
    status: SectionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Preamble,
    Overview,
    Scope,
    Container,
    Section,
}

struct State<'a> {
    title: Option<String>,
    scope: Option<String>,
    overview: Vec<String>,
    region: Region,
    current: Option<Candidate>,
    sections: Vec<Parsed>,
    list_items: Vec<&'a str>,
    skipped: usize,
}

impl<'a> State<'a> {
    fn new() -> Self {
        Self {
            title: None,
            scope: None,
            overview: Vec::new(),
            region: Region::Preamble,
            current: None,
            sections: Vec::new(),
            list_items: Vec::new(),
            skipped: 0,
        }
    }

    fn finish_candidate(&mut self) {
        let Some(candidate) = self.current.take() else {
            return;
        };

        let (key, name) = split_key(&candidate.heading);
        let summary = candidate
            .summary
            .filter(|s| !s.is_empty())
            .or_else(|| candidate.body.into_iter().find(|l| !l.is_empty()))
            .map(|s| strip_emphasis(&s))
            .unwrap_or_default();

        if name.is_empty() || summary.is_empty() {
            warn!(
                heading = %candidate.heading,
                has_name = !name.is_empty(),
                has_summary = !summary.is_empty(),
                "Skipping malformed overview section"
            );
            self.skipped += 1;
            return;
        }

        self.sections.push(Parsed {
            key,
            name,
            summary,
            status: candidate.status.unwrap_or_default(),
        });
    }

    fn heading(&mut self, level: usize, text: String) {
        if level >= 4 {
            // Sub-headings inside a section are body text
            return;
        }

        self.finish_candidate();
        let normalized = normalize_heading(&text);

        if level == 2 && OVERVIEW_HEADINGS.contains(&normalized.as_str()) {
            self.region = Region::Overview;
        } else if level == 2 && CONTAINER_HEADINGS.contains(&normalized.as_str()) {
            self.region = Region::Container;
        } else if SCOPE_HEADINGS.contains(&normalized.as_str()) {
            self.region = Region::Scope;
        } else {
            self.region = Region::Section;
            self.current = Some(Candidate {
                heading: text,
                ..Default::default()
            });
        }
    }

    fn field(&mut self, key: FieldKey, value: String) {
        match (key, self.current.as_mut()) {
            (FieldKey::Status, Some(candidate)) => {
                let status = SectionStatus::parse(&value);
                if status.is_none() {
                    debug!(%value, "State::field: unknown status, defaulting to not started");
                }
                candidate.status = status;
            }
            (FieldKey::Summary, Some(candidate)) => candidate.summary = Some(value),
            (FieldKey::Scope, _) if self.scope.is_none() && !value.is_empty() => self.scope = Some(value),
            (FieldKey::Summary, None) if self.region == Region::Overview => self.overview.push(value),
            _ => debug!(?key, %value, "State::field: ignored"),
        }
    }

    fn text(&mut self, line: &'a str, is_list_item: bool) {
        match self.region {
            Region::Section => {
                if let Some(candidate) = self.current.as_mut() {
                    candidate.body.push(line.to_string());
                }
            }
            Region::Overview => self.overview.push(line.to_string()),
            Region::Scope => {
                if self.scope.is_none() {
                    self.scope = Some(strip_emphasis(line));
                }
            }
            Region::Preamble | Region::Container => {
                if is_list_item {
                    self.list_items.push(line);
                }
            }
        }
    }

    fn blank(&mut self) {
        if self.region == Region::Overview && self.overview.last().is_some_and(|l| !l.is_empty()) {
            self.overview.push(String::new());
        }
    }
}

/// Parse a "name: summary" style list item, used only when no headings matched
fn parse_list_item(item: &str) -> Option<Parsed> {
    let (key, rest) = split_key(item);
    let rest = rest.replace("**", "");
    let (name, summary) = [": ", " - ", " \u{2013} ", " \u{2014} "]
        .iter()
        .find_map(|sep| rest.split_once(sep))?;

    let name = strip_emphasis(name);
    let summary = strip_emphasis(summary);
    if name.is_empty() || summary.is_empty() {
        return None;
    }

    Some(Parsed {
        key,
        name,
        summary,
        status: SectionStatus::NotStarted,
    })
}

/// Parse the overview model response into an `OverviewPlan`
///
/// Section order follows the response. Sections missing a name or a summary
/// are skipped; if fewer than `min_sections` remain the result is
/// `PlanError::EmptyPlan`.
pub fn parse_overview(response: &str, options: &ParseOptions) -> Result<OverviewPlan, PlanError> {
    debug!(len = response.len(), ?options, "parse_overview: called");
    let mut state = State::new();

    for raw in response.lines() {
        match classify(raw) {
            Line::Title(text) => {
                if state.title.is_none() && !text.is_empty() {
                    state.title = Some(text);
                }
            }
            Line::Heading { level, text } => state.heading(level, text),
            Line::Field { key, value } => state.field(key, value),
            Line::ListItem(item) => state.text(item, true),
            Line::Body(text) => state.text(text, false),
            Line::Blank => state.blank(),
        }
    }
    state.finish_candidate();

    let mut parsed = std::mem::take(&mut state.sections);
    if parsed.iter().any(|p| p.key.is_some()) {
        // Keyed headings define the plan; stray headings such as "Open Questions" are not sections
        parsed.retain(|p| {
            if p.key.is_none() {
                warn!(heading = %p.name, "Skipping overview heading without a section key");
                state.skipped += 1;
            }
            p.key.is_some()
        });
    }
    if parsed.is_empty() && !state.list_items.is_empty() {
        debug!(count = state.list_items.len(), "parse_overview: falling back to list items");
        for item in &state.list_items {
            match parse_list_item(item) {
                Some(p) => parsed.push(p),
                None => {
                    warn!(%item, "Skipping unparseable overview list item");
                    state.skipped += 1;
                }
            }
        }
    }

    let required = options.min_sections.max(1);
    if parsed.len() < required {
        warn!(found = parsed.len(), required, skipped = state.skipped, "Overview has too few sections");
        return Err(PlanError::EmptyPlan {
            found: parsed.len(),
            required,
            skipped: state.skipped,
        });
    }

    let mut ids = SlugAllocator::new();
    let sections = parsed
        .into_iter()
        .enumerate()
        .map(|(idx, p)| {
            let key = p.key.unwrap_or_else(|| format!("S{}", idx + 1));
            let id = ids.allocate(&format!("{} {}", key, p.name));
            SectionRecord {
                id,
                key,
                name: p.name,
                summary: p.summary,
                status: p.status,
            }
        })
        .collect();

    let scope_classification = state.scope.filter(|s| !s.is_empty()).unwrap_or_else(|| {
        debug!("parse_overview: no scope found, using default");
        DEFAULT_SCOPE.to_string()
    });

    Ok(OverviewPlan {
        title: state.title.unwrap_or_else(|| options.fallback_title.clone()),
        scope_classification,
        overview: state.overview.join("\n").trim().to_string(),
        sections,
    })
}
