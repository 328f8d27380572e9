//! View models and their HTML/text renderings.
//!
//! Every interpolated value goes through [`escape_html`]; the only markup that
//! is not built here is a [`TrustedEmbed`], which is rebuilt from a vetted URL.

use crate::filter::ViewOptions;
use crate::models::{ScoreRecord, ScoreStats};
use crate::review::{Preview, TrustedEmbed};
use crate::theme::Theme;
use std::fmt::Write as _;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Tooltips show remarks on one line.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn star(is_favorite: bool) -> &'static str {
    if is_favorite { "★" } else { "☆" }
}

pub fn heart(has_review: bool) -> &'static str {
    if has_review { "❤️" } else { "🩶" }
}

pub fn completion_label(completion: Option<u8>) -> String {
    completion.map_or_else(|| "-".to_string(), |value| format!("{value}%"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub score_code: String,
    pub completion: Option<u8>,
    pub is_favorite: bool,
    pub remark: String,
    pub has_review: bool,
}

impl From<&ScoreRecord> for RowView {
    fn from(record: &ScoreRecord) -> Self {
        Self {
            score_code: record.score_code.clone(),
            completion: record.completion,
            is_favorite: record.is_favorite,
            remark: record.remark.clone(),
            has_review: record.has_review,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableState {
    Loading,
    Failed,
    Rows(Vec<RowView>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub state: TableState,
    pub view: ViewOptions,
}

impl TableView {
    pub fn count(&self) -> usize {
        match &self.state {
            TableState::Rows(rows) => rows.len(),
            _ => 0,
        }
    }
}

fn message_row(class: &str, colspan: usize, text: &str) -> String {
    format!(
        r#"<tr><td colspan="{colspan}" class="{class}">{}</td></tr>"#,
        escape_html(text)
    )
}

pub fn render_row(row: &RowView, view: &ViewOptions) -> String {
    let mut html = String::from("<tr>");
    let _ = write!(html, "<td>{}</td>", escape_html(&row.score_code));

    if !view.hide_completion {
        let _ = write!(html, "<td>{}</td>", completion_label(row.completion));
    }

    let has_remark = !row.remark.trim().is_empty();
    if !view.hide_favorite {
        let code = escape_html(&row.score_code);
        let remark_title = if has_remark {
            escape_html(&collapse_whitespace(&row.remark))
        } else {
            "Add remark".to_string()
        };
        let _ = write!(
            html,
            concat!(
                r#"<td><div class="table-action-wrap">"#,
                r#"<span class="favorite-indicator" title="{fav_title}">{star}</span>"#,
                r#"<button class="remark-btn table-remark-btn{remark_class}" data-code="{code}" title="{remark_title}">📝</button>"#,
                r#"<button class="heart-btn" data-code="{code}" title="{heart_title}">{heart}</button>"#,
                "</div></td>"
            ),
            fav_title = if row.is_favorite { "Favorited" } else { "Not favorited" },
            star = star(row.is_favorite),
            remark_class = if has_remark { " has-remark" } else { "" },
            code = code,
            remark_title = remark_title,
            heart_title = if row.has_review { "View review" } else { "Add review" },
            heart = heart(row.has_review),
        );
    }
    html.push_str("</tr>");

    if view.show_all_remarks && has_remark {
        let _ = write!(
            html,
            concat!(
                r#"<tr class="remark-row"><td colspan="{}" class="remark-cell">"#,
                r#"<div class="remark-cell-wrap"><span class="remark-cell-label">Remark: </span>"#,
                r#"<span class="remark-cell-content">{}</span></div></td></tr>"#
            ),
            view.column_count(),
            escape_html(&row.remark)
        );
    }
    html
}

pub fn render_table_body(table: &TableView) -> String {
    let colspan = table.view.column_count();
    match &table.state {
        TableState::Loading => message_row("loading", colspan, "Loading..."),
        TableState::Failed => message_row("error", colspan, "Failed to load, please retry"),
        TableState::Rows(rows) if rows.is_empty() => {
            message_row("no-results", colspan, "No matching records")
        }
        TableState::Rows(rows) => rows.iter().map(|row| render_row(row, &table.view)).collect(),
    }
}

pub fn render_count(count: usize) -> String {
    format!("({count} total)")
}

pub fn render_random_card(record: &ScoreRecord, theme: Theme) -> String {
    let completion = record
        .completion
        .map_or_else(|| "Not completed".to_string(), |value| format!("{value}%"));
    let remark = if record.has_remark() {
        escape_html(&record.remark)
    } else {
        "No remark yet".to_string()
    };
    format!(
        concat!(
            r#"<div class="random-info-card" data-theme="{theme}">"#,
            r#"<div class="score-code-row"><span class="score-code">{code}</span>"#,
            r#"<span class="favorite-icon">{star}</span></div>"#,
            r#"<div class="completion-row">Completion: <span class="completion-badge">{completion}</span></div>"#,
            r#"<div class="actions-row"><button class="like-btn">{heart}</button>"#,
            r#"<button class="remark-btn random-remark-btn{remark_class}">Remark</button></div>"#,
            r#"<div class="remark-text">{remark}</div></div>"#
        ),
        theme = theme.as_str(),
        code = escape_html(&record.score_code),
        star = star(record.is_favorite),
        completion = completion,
        heart = heart(record.has_review),
        remark_class = if record.has_remark() { " has-remark" } else { "" },
        remark = remark,
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItemView {
    pub score_code: String,
    pub completion: Option<u8>,
    pub is_favorite: bool,
    pub has_remark: bool,
    pub timestamp: Option<String>,
}

impl From<&ScoreRecord> for HistoryItemView {
    fn from(record: &ScoreRecord) -> Self {
        Self {
            score_code: record.score_code.clone(),
            completion: record.completion,
            is_favorite: record.is_favorite,
            has_remark: record.has_remark(),
            timestamp: record.created_at_local(),
        }
    }
}

pub fn render_history_item(item: &HistoryItemView, codes_only: bool) -> String {
    let code = escape_html(&item.score_code);
    let mut html = format!(
        r#"<div class="history-item" id="history-{code}"><div class="history-content"><div>Score code: <span class="score-code">{code}</span></div>"#
    );
    if !codes_only {
        let _ = write!(
            html,
            r#"<div>Completion: <span class="completion">{}</span></div>"#,
            completion_label(item.completion)
        );
        if let Some(ts) = &item.timestamp {
            let _ = write!(html, r#"<div class="timestamp">{}</div>"#, escape_html(ts));
        }
    }
    let _ = write!(
        html,
        r#"</div><span class="favorite-btn">{}</span></div>"#,
        star(item.is_favorite)
    );
    html
}

pub fn render_load_all(hidden: usize) -> String {
    format!(r#"<button class="load-all-btn">Load all ({hidden} more)</button>"#)
}

pub fn render_stats(stats: &ScoreStats) -> String {
    format!(
        concat!(
            r#"<div class="stats-content"><span>Records: {}</span>"#,
            r#"<span>Distinct songs: {}</span><span>Favorite songs: {}</span></div>"#
        ),
        stats.total_records, stats.unique_songs, stats.favorite_songs
    )
}

pub fn render_toast(text: &str, theme: Theme) -> String {
    format!(
        r#"<div class="toast show" data-theme="{}">{}</div>"#,
        theme.as_str(),
        escape_html(text)
    )
}

pub fn render_preview(preview: &Preview) -> String {
    match preview {
        Preview::None => String::new(),
        Preview::Video(src) => format!(
            r#"<video class="review-video-preview" controls src="{}"></video>"#,
            escape_html(src)
        ),
        Preview::Embed(embed) => render_embed(embed),
    }
}

fn render_embed(embed: &TrustedEmbed) -> String {
    format!(
        concat!(
            r#"<div class="review-embed-preview"><iframe src="{}" "#,
            r#"sandbox="allow-scripts allow-same-origin allow-presentation" "#,
            r#"referrerpolicy="no-referrer" allowfullscreen></iframe></div>"#
        ),
        escape_html(embed.src())
    )
}

/// Plain-text table for terminals.
pub fn text_table(rows: &[RowView], view: &ViewOptions) -> String {
    if rows.is_empty() {
        return "No matching records\n".to_string();
    }
    let mut out = String::new();
    for row in rows {
        let _ = write!(out, "{:<12}", row.score_code);
        if !view.hide_completion {
            let _ = write!(out, " {:>5}", completion_label(row.completion));
        }
        if !view.hide_favorite {
            let _ = write!(out, " {} {}", star(row.is_favorite), heart(row.has_review));
        }
        out.push('\n');
        if view.show_all_remarks && !row.remark.trim().is_empty() {
            let _ = writeln!(out, "    remark: {}", collapse_whitespace(&row.remark));
        }
    }
    let _ = writeln!(out, "{}", render_count(rows.len()));
    out
}

pub fn text_history_item(item: &HistoryItemView, codes_only: bool) -> String {
    if codes_only {
        return format!("{} {}", item.score_code, star(item.is_favorite));
    }
    format!(
        "{} {:>5} {} {}",
        item.score_code,
        completion_label(item.completion),
        star(item.is_favorite),
        item.timestamp.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string()
}
