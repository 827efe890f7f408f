//! AtCoder-Problems metadata: the problem list, merged details and
//! difficulty models, joined into the driver's working set.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::http::get_json;

// ---------------------------------------------------------------------------
// Wire types (field names follow the mirror's JSON)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub contest_id: String,
    pub problem_index: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedProblem {
    pub id: String,
    pub contest_id: String,
    pub problem_index: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub solver_count: Option<u64>,
    #[serde(default)]
    pub point: Option<f64>,
    #[serde(default)]
    pub shortest_submission_id: Option<u64>,
    #[serde(default)]
    pub fastest_submission_id: Option<u64>,
    #[serde(default)]
    pub first_submission_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemModel {
    #[serde(default)]
    pub difficulty: Option<f64>,
    #[serde(default)]
    pub slope: Option<f64>,
    #[serde(default)]
    pub intercept: Option<f64>,
    #[serde(default)]
    pub variance: Option<f64>,
    #[serde(default)]
    pub discrimination: Option<f64>,
    #[serde(default)]
    pub is_experimental: Option<bool>,
}

pub type ProblemModels = HashMap<String, ProblemModel>;

/// A problem that passed every filter, with its joined metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkingProblem {
    #[serde(flatten)]
    pub problem: Problem,
    pub detail: Option<DetailedProblem>,
    pub difficulty: f64,
}

impl WorkingProblem {
    pub fn id(&self) -> &str {
        &self.problem.id
    }

    /// Official task page on `atcoder_base`.
    pub fn url(&self, atcoder_base: &str) -> String {
        format!(
            "{}/contests/{}/tasks/{}",
            atcoder_base.trim_end_matches('/'),
            self.problem.contest_id,
            self.problem.id
        )
    }

    /// Label for the selector, e.g. `ABC300 A - Takahashi`.
    pub fn label(&self) -> String {
        format!(
            "{} {} - {}",
            self.problem.contest_id.to_uppercase(),
            self.problem.problem_index.to_uppercase(),
            self.problem.name
        )
    }
}

// ---------------------------------------------------------------------------
// Join / filter / sort
// ---------------------------------------------------------------------------

/// Which contests count as part of the working set.
#[derive(Debug, Clone, PartialEq)]
pub struct ContestFilter {
    pub prefix: String,
    pub threshold: u32,
}

impl ContestFilter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefix: config.contest_prefix.clone(),
            threshold: config.contest_threshold,
        }
    }

    /// `abc123` passes with prefix `abc` and threshold `<= 123`.
    pub fn accepts(&self, contest_id: &str) -> bool {
        contest_id
            .strip_prefix(self.prefix.as_str())
            .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|suffix| suffix.parse::<u32>().ok())
            .is_some_and(|n| n >= self.threshold)
    }
}

/// Join the three resources into the sorted working set.
///
/// A problem is kept iff its model has a difficulty and its contest passes
/// `filter`. Duplicate ids keep their first occurrence. Order: contest id
/// descending, then problem index ascending.
pub fn build_working_set(
    problems: &[Problem],
    merged: &[DetailedProblem],
    models: &ProblemModels,
    filter: &ContestFilter,
) -> Vec<WorkingProblem> {
    let details: HashMap<&str, &DetailedProblem> =
        merged.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut seen = HashSet::new();

    let mut set: Vec<WorkingProblem> = problems
        .iter()
        .filter(|p| filter.accepts(&p.contest_id))
        .filter_map(|p| {
            let difficulty = models.get(&p.id)?.difficulty?;
            if !seen.insert(p.id.as_str()) {
                return None;
            }
            Some(WorkingProblem {
                problem: p.clone(),
                detail: details.get(p.id.as_str()).map(|d| (*d).clone()),
                difficulty,
            })
        })
        .collect();

    set.sort_by(|a, b| {
        b.problem
            .contest_id
            .cmp(&a.problem.contest_id)
            .then_with(|| a.problem.problem_index.cmp(&b.problem.problem_index))
    });
    set
}

/// The problem selected when the driver page opens.
pub fn default_problem(set: &[WorkingProblem]) -> Option<&WorkingProblem> {
    set.first()
}

/// AtCoder rating colour band for a difficulty estimate.
pub fn difficulty_color(difficulty: f64) -> &'static str {
    match difficulty {
        d if d < 400.0 => "grey",
        d if d < 800.0 => "brown",
        d if d < 1200.0 => "green",
        d if d < 1600.0 => "cyan",
        d if d < 2000.0 => "blue",
        d if d < 2400.0 => "yellow",
        d if d < 2800.0 => "orange",
        _ => "red",
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ProblemsClient {
    client: reqwest::Client,
    base_url: String,
    filter: ContestFilter,
}

impl ProblemsClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.problems_base_url.trim_end_matches('/').to_string(),
            filter: ContestFilter::from_config(config),
        }
    }

    fn resource(&self, name: &str) -> String {
        format!("{}/{name}.json", self.base_url)
    }

    /// Fetch all three resources concurrently. Any single failure fails
    /// the whole aggregation.
    pub async fn fetch_all(
        &self,
    ) -> Result<(Vec<Problem>, Vec<DetailedProblem>, ProblemModels)> {
        let problems_url = self.resource("problems");
        let merged_url = self.resource("merged-problems");
        let models_url = self.resource("problem-models");
        tokio::try_join!(
            get_json::<Vec<Problem>>(&self.client, &problems_url),
            get_json::<Vec<DetailedProblem>>(&self.client, &merged_url),
            get_json::<ProblemModels>(&self.client, &models_url),
        )
    }

    pub async fn load_working_set(&self) -> Result<Vec<WorkingProblem>> {
        let (problems, merged, models) = self.fetch_all().await?;
        let set = build_working_set(&problems, &merged, &models, &self.filter);
        info!(
            total = problems.len(),
            kept = set.len(),
            "problem working set built"
        );
        Ok(set)
    }
}
