//! Structural extraction of review notification regions.
//!
//! Notifications are laid out as one outer table whose rows each wrap a
//! nested table. Regions are found by position, not by content:
//!
//! | layout row | region    | required |
//! |------------|-----------|----------|
//! | 0          | title     | yes      |
//! | 1          | action    | yes      |
//! | 2          | comment   | no       |
//! | 3          | reviewers | no       |
//! | 4          | commits   | no       |
//!
//! Pure HTML traversal. No network or mailbox access.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::mail::types::{CommitRecord, PullRequestRef, Reviewer};

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Leading run of capitalised words.
static PERSON_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\p{Lu}[\p{L}'.\-]*(?:\s+\p{Lu}[\p{L}'.\-]*)*)").unwrap()
});

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").unwrap());

/// Separator between the author and the timestamp in a commit metadata line.
static COMMIT_META_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:committed(?:\s+on)?|[·•|,\-])\s*").unwrap());

/// Positional column names for the reviewers table.
pub const REVIEWER_COLUMNS: &[&str] = &["user", "icon", "status", "type"];

/// The five regions of a notification. Optional regions may be `None`.
#[derive(Debug, Default)]
pub struct Regions<'a> {
    pub title: Option<ElementRef<'a>>,
    pub action: Option<ElementRef<'a>>,
    pub comment: Option<ElementRef<'a>>,
    pub reviewers: Option<ElementRef<'a>>,
    pub commits: Option<ElementRef<'a>>,
}

/// Locate all regions by walking the layout table.
pub fn locate_regions(doc: &Html) -> Regions<'_> {
    let Some(layout) = doc.select(&TABLE).next() else {
        return Regions::default();
    };

    let mut slots = table_rows(layout).into_iter().map(|row| {
        row_cells(row)
            .into_iter()
            .next()
            .and_then(|cell| cell.select(&TABLE).next())
    });

    Regions {
        title: slots.next().flatten(),
        action: slots.next().flatten(),
        comment: slots.next().flatten(),
        reviewers: slots.next().flatten(),
        commits: slots.next().flatten(),
    }
}

// ── Table helpers ───────────────────────────────────────────────────

/// Direct rows of `table`, looking through `thead`/`tbody`/`tfoot` but never
/// into nested tables.
pub fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| el.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

/// Direct `td`/`th` cells of a row.
pub fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .collect()
}

fn is_data_row(row: ElementRef<'_>) -> bool {
    row_cells(row).iter().any(|c| c.value().name() == "td")
}

/// Whitespace-normalised text content.
pub fn normalized_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Non-empty trimmed text nodes, in document order.
fn text_lines(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect()
}

/// One data row with its cells bound to positional column names.
#[derive(Debug)]
pub struct TableRecord<'a> {
    cells: Vec<(&'static str, ElementRef<'a>)>,
}

impl<'a> TableRecord<'a> {
    pub fn get(&self, column: &str) -> Option<ElementRef<'a>> {
        self.cells
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, cell)| *cell)
    }

    /// Normalised text of a column, empty if the row is short.
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(normalized_text).unwrap_or_default()
    }
}

/// Map every data row of `table` to a record, assigning `columns` by position.
/// Header rows (no `td`) are skipped; extra cells are ignored.
pub fn table_records<'a>(table: ElementRef<'a>, columns: &[&'static str]) -> Vec<TableRecord<'a>> {
    table_rows(table)
        .into_iter()
        .filter(|row| is_data_row(*row))
        .map(|row| TableRecord {
            cells: columns.iter().copied().zip(row_cells(row)).collect(),
        })
        .collect()
}

// ── Region readers ──────────────────────────────────────────────────

/// Read the pull request reference from the last row of the title region.
///
/// Returns `None` if the row has no text (title not located). A missing or
/// non-numeric link yields `id: None` rather than failing.
pub fn pull_request_ref(title_region: ElementRef<'_>) -> Option<PullRequestRef> {
    let last_row = table_rows(title_region).into_iter().last()?;
    let title = normalized_text(last_row);
    if title.is_empty() {
        return None;
    }

    let href = last_row
        .select(&LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .unwrap_or_default()
        .to_string();

    Some(PullRequestRef {
        id: last_path_segment(&href).and_then(|seg| seg.parse().ok()),
        title,
        url: href,
    })
}

fn last_path_segment(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|seg| !seg.is_empty())
}

/// Action phrase, or `None` when the region holds no text.
pub fn action_phrase(action_region: ElementRef<'_>) -> Option<String> {
    let text = normalized_text(action_region);
    (!text.is_empty()).then_some(text)
}

/// Comment body, one line per row. Empty when the region is blank.
pub fn comment_text(comment_region: ElementRef<'_>) -> String {
    table_rows(comment_region)
        .into_iter()
        .map(normalized_text)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the reviewers table, approved reviewers first.
pub fn reviewers(reviewers_region: ElementRef<'_>) -> Vec<Reviewer> {
    let parsed = table_records(reviewers_region, REVIEWER_COLUMNS)
        .into_iter()
        .filter_map(|record| {
            let user = record.text("user");
            if user.is_empty() {
                return None;
            }
            Some(Reviewer {
                user,
                approved: record.text("status") == "Approved",
                is_required: record.text("type").eq_ignore_ascii_case("Required"),
            })
        })
        .collect();
    approved_first(parsed)
}

/// Stable partition: every approved reviewer precedes every other, each group
/// keeping its original relative order.
pub fn approved_first(reviewers: Vec<Reviewer>) -> Vec<Reviewer> {
    let (mut approved, pending): (Vec<_>, Vec<_>) =
        reviewers.into_iter().partition(|r| r.approved);
    approved.extend(pending);
    approved
}

/// Parse the commits table. Rows without a commit id are skipped.
pub fn commits(commits_region: ElementRef<'_>) -> Vec<CommitRecord> {
    table_records(commits_region, &["commit", "details"])
        .into_iter()
        .filter_map(|record| {
            let commit_cell = record.get("commit")?;
            let id = normalized_text(commit_cell);
            if id.is_empty() {
                return None;
            }
            let url = commit_cell
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default()
                .to_string();

            let lines = record.get("details").map(text_lines).unwrap_or_default();
            let title = lines.first().cloned().unwrap_or_default();
            let metadata = if lines.len() > 1 {
                lines.last().cloned().unwrap_or_default()
            } else {
                String::new()
            };
            let (author, created_at) = split_commit_metadata(&metadata);

            Some(CommitRecord {
                id,
                title,
                author,
                created_at,
                url,
            })
        })
        .collect()
}

/// Split "Jane Doe committed 2024-03-01 10:00" into author and timestamp text.
pub fn split_commit_metadata(line: &str) -> (String, String) {
    let author = extract_person_name(line);
    let rest = line.trim_start().strip_prefix(author.as_str()).unwrap_or(line);
    let timestamp = COMMIT_META_SEPARATOR.replace(rest, "").trim().to_string();
    (author, timestamp)
}

/// Verbs that end a name even when capitalised ("Jane Doe Approved ...").
const ACTION_WORDS: &[&str] = &[
    "completed",
    "commented",
    "replied",
    "approved",
    "pushed",
    "abandoned",
    "created",
    "set",
    "committed",
];

/// Leading person name of a line, or empty if it starts lowercase/non-letter.
///
/// The name is the run of capitalised words up to the first lowercase word
/// or, after the first word, the first action verb in any case. Lowercase
/// particles end the name too, so "Ana de Souza" yields "Ana".
pub fn extract_person_name(line: &str) -> String {
    let Some(run) = PERSON_NAME.captures(line).and_then(|c| c.get(1)) else {
        return String::new();
    };
    let run = run.as_str();

    let mut end = 0;
    for (i, word) in WORD.find_iter(run).enumerate() {
        if i > 0 && ACTION_WORDS.contains(&word.as_str().to_lowercase().as_str()) {
            break;
        }
        end = word.end();
    }
    run[..end].to_string()
}
