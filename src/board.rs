// Departure board view model and HTML rendering.

use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;
use html_escape::encode_text;
use serde::Serialize;

use crate::departures::{Departure, Extraction};
use crate::error::Result;

const PAGE_TEMPLATE: &str = include_str!("../templates/index.html");

/// Stations shown on the main page, as (title, MBTA stop id).
pub const STATIONS: [(&str, &str); 2] = [
    ("North Station Information", "place-north"),
    ("South Station Information", "place-sstat"),
];

#[derive(Debug, Clone, Serialize)]
pub struct DepartureBoard {
    pub title: String,
    pub departures: Vec<Departure>,
    /// The fetch failed outright; there are no rows.
    pub error: Option<String>,
    /// Some rows could not be parsed; the rows are still shown.
    pub warning: Option<String>,
}

impl DepartureBoard {
    pub fn from_result(title: &str, result: Result<Extraction>) -> Self {
        match result {
            Ok(extraction) => DepartureBoard {
                title: title.to_string(),
                departures: extraction.departures,
                error: None,
                warning: extraction.parse_errors.map(|e| e.to_string()),
            },
            Err(e) => DepartureBoard {
                title: title.to_string(),
                departures: Vec::new(),
                error: Some(e.to_string()),
                warning: None,
            },
        }
    }
}

pub fn format_updated_at(now: DateTime<Utc>) -> String {
    now.with_timezone(&New_York)
        .format("%A %-m/%-d/%Y %-I:%M%p")
        .to_string()
}

pub fn render_page(boards: &[DepartureBoard], updated_at: &str) -> String {
    let rendered: String = boards.iter().map(render_board).collect();

    PAGE_TEMPLATE
        .replace("{{updated_at}}", &encode_text(updated_at))
        .replace("{{boards}}", &rendered)
}

fn render_board(board: &DepartureBoard) -> String {
    let mut html = String::new();
    html.push_str("<section class=\"board\">\n");
    html.push_str(&format!("  <h2>{}</h2>\n", encode_text(&board.title)));

    if let Some(error) = &board.error {
        html.push_str(&format!(
            "  <p class=\"board-error\">{}</p>\n",
            encode_text(error)
        ));
        html.push_str("</section>\n");
        return html;
    }

    html.push_str("  <table>\n");
    html.push_str(
        "    <thead><tr><th>Time</th><th>Destination</th><th>Track</th><th>Status</th></tr></thead>\n",
    );
    html.push_str("    <tbody>\n");
    if board.departures.is_empty() {
        html.push_str("      <tr><td colspan=\"4\" class=\"empty\">No upcoming departures</td></tr>\n");
    }
    for departure in &board.departures {
        html.push_str(&format!(
            "      <tr><td>{}</td><td>{}</td><td>{}</td><td class=\"status\">{}</td></tr>\n",
            encode_text(&departure.time_label),
            encode_text(&departure.destination),
            encode_text(&departure.track),
            encode_text(&departure.status),
        ));
    }
    html.push_str("    </tbody>\n");
    html.push_str("  </table>\n");

    if let Some(warning) = &board.warning {
        html.push_str(&format!(
            "  <p class=\"board-warning\">{}</p>\n",
            encode_text(warning)
        ));
    }

    html.push_str("</section>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::departures::{ParseErrors, RowParseError};
    use crate::error::ServiceError;
    use crate::mbta_api_models::{ApiErrorEntry, ApiErrors};
    use chrono::TimeZone;

    fn row(time: &str, destination: &str) -> Departure {
        Departure {
            time_label: time.to_string(),
            destination: destination.to_string(),
            track: "TBD".to_string(),
            status: "On time".to_string(),
        }
    }

    #[test]
    fn upstream_failure_leaves_board_empty() {
        let err = ServiceError::Upstream(ApiErrors(vec![ApiErrorEntry {
            detail: "You have exceeded your allowed usage rate.".to_string(),
            ..ApiErrorEntry::default()
        }]));
        let board = DepartureBoard::from_result("North Station Information", Err(err));

        assert!(board.departures.is_empty());
        assert_eq!(
            board.error.as_deref(),
            Some("MBTA API error: You have exceeded your allowed usage rate.")
        );

        let html = render_page(&[board], "now");
        assert!(html.contains("board-error"));
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn parse_errors_are_shown_next_to_rows() {
        let extraction = Extraction {
            departures: vec![row("(Parse Error) soon", "Lowell"), row("4:30PM", "Newburyport")],
            parse_errors: Some(ParseErrors(vec![RowParseError {
                raw: "soon".to_string(),
            }])),
        };
        let board = DepartureBoard::from_result("North Station Information", Ok(extraction));

        assert_eq!(board.departures.len(), 2);
        assert_eq!(board.warning.as_deref(), Some("Parse error: (Parse Error) soon"));

        let html = render_page(&[board], "now");
        assert!(html.contains("<td>Newburyport</td>"));
        assert!(html.contains("board-warning"));
    }

    #[test]
    fn escapes_untrusted_text() {
        let board = DepartureBoard {
            title: "Back Bay & Ruggles".to_string(),
            departures: vec![row("4:30PM", "<script>alert(1)</script>")],
            error: None,
            warning: None,
        };

        let html = render_page(&[board], "now");
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("<h2>Back Bay &amp; Ruggles</h2>"));
    }

    #[test]
    fn updated_at_uses_boston_time() {
        let now = Utc.with_ymd_and_hms(2023, 1, 1, 21, 30, 0).unwrap();
        assert_eq!(format_updated_at(now), "Sunday 1/1/2023 4:30PM");
    }
}
