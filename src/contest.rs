//! Contest task-list scraping, used when the metadata mirror has not picked
//! up a contest yet. Backs `GET /api/atcoder?contest=<id>`.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LiveError, Result};
use crate::http::get_text;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedProblem {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// The first task with its statement attached. Both fragments are empty
/// when the task page could not be fetched or parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstProblem {
    #[serde(flatten)]
    pub problem: ScrapedProblem,
    pub statement: String,
    pub constraints: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestPayload {
    pub contest_id: String,
    pub problems: Vec<ScrapedProblem>,
    pub first_problem: Option<FirstProblem>,
}

/// Rows of the task table whose second cell links into this contest.
pub fn parse_task_list(html: &str, contest_id: &str, atcoder_base: &str) -> Vec<ScrapedProblem> {
    let document = Html::parse_document(html);
    let rows = Selector::parse("table tbody tr").expect("static selector");
    let link = Selector::parse("td:nth-child(2) a").expect("static selector");
    let needle = format!("/contests/{contest_id}/tasks/");
    let base = atcoder_base.trim_end_matches('/');

    document
        .select(&rows)
        .filter_map(|row| row.select(&link).next())
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            if !href.contains(&needle) {
                return None;
            }
            let id = href.rsplit('/').next().unwrap_or_default().to_string();
            Some(ScrapedProblem {
                id,
                title: a.text().collect::<String>().trim().to_string(),
                url: format!("{base}{href}"),
            })
        })
        .collect()
}

/// Statement and constraints of a task page as the contest payload carries
/// them. The statement is the Japanese section, else the English one, with
/// no raw fallback. The constraints are the items of the list directly after
/// a `制約` (else `Constraints`) heading. Missing parts are empty.
pub fn extract_task_summary(html: &str) -> (String, String) {
    let document = Html::parse_document(html);
    let Some(container) = document
        .select(&Selector::parse("#task-statement").expect("static selector"))
        .next()
    else {
        return (String::new(), String::new());
    };

    let statement = [".lang-ja", ".lang-en"]
        .iter()
        .filter_map(|css| {
            let section = Selector::parse(css).expect("static selector");
            container.select(&section).next().map(|el| el.inner_html())
        })
        .find(|html| !html.is_empty())
        .unwrap_or_default();

    let h3 = Selector::parse("h3").expect("static selector");
    let constraints = ["制約", "Constraints"]
        .iter()
        .filter_map(|wanted| {
            container
                .select(&h3)
                .filter(|h| h.text().collect::<String>().contains(wanted))
                .find_map(|h| {
                    h.next_siblings()
                        .find_map(ElementRef::wrap)
                        .filter(|el| el.value().name() == "ul")
                })
                .map(|ul| ul.inner_html())
        })
        .find(|html| !html.is_empty())
        .unwrap_or_default();

    (statement, constraints)
}

pub struct ContestClient {
    client: reqwest::Client,
    atcoder_base: String,
}

impl ContestClient {
    pub fn new(client: reqwest::Client, atcoder_base: &str) -> Self {
        Self {
            client,
            atcoder_base: atcoder_base.trim_end_matches('/').to_string(),
        }
    }

    /// Scrape the task list of `contest_id` and the first task's statement.
    ///
    /// # Errors
    /// - [`LiveError::MissingContest`] for an empty id.
    /// - [`LiveError::NoProblems`] when the list has no task rows.
    /// - Fetch errors of the list page itself.
    pub async fn fetch_contest(&self, contest_id: &str) -> Result<ContestPayload> {
        let contest_id = contest_id.trim();
        if contest_id.is_empty() {
            return Err(LiveError::MissingContest);
        }

        let list_url = format!("{}/contests/{contest_id}/tasks", self.atcoder_base);
        let html = get_text(&self.client, &list_url, &[]).await?;
        let problems = parse_task_list(&html, contest_id, &self.atcoder_base);
        if problems.is_empty() {
            return Err(LiveError::NoProblems {
                contest: contest_id.to_string(),
            });
        }
        info!(contest = contest_id, count = problems.len(), "task list scraped");

        let first = &problems[0];
        let (statement, constraints) = match get_text(&self.client, &first.url, &[]).await {
            Ok(page) => {
                let summary = extract_task_summary(&page);
                if summary.0.is_empty() {
                    warn!(url = %first.url, "first task has no statement");
                }
                summary
            }
            Err(e) => {
                warn!(url = %first.url, error = %e, "first task page unavailable");
                (String::new(), String::new())
            }
        };

        Ok(ContestPayload {
            contest_id: contest_id.to_string(),
            first_problem: Some(FirstProblem {
                problem: first.clone(),
                statement,
                constraints,
            }),
            problems,
        })
    }
}
