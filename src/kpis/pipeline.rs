// Pipeline KPIs - credit states per month, approvals, year to date

use super::{percent, PeriodDelta};
use crate::config::DashboardConfig;
use crate::domain::{Domain, Period};
use crate::error::DashboardError;
use crate::normalizer::strip_accents;
use crate::table::Table;
use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const CREADO: &str = "CREADO";
pub const APROBADO: &str = "APROBADO";
pub const RECHAZADO: &str = "RECHAZADO";
pub const PIPELINE_STATES: [&str; 3] = [CREADO, APROBADO, RECHAZADO];

/// "  En   análisis " → "EN ANALISIS"
pub fn normalize_state(raw: &str) -> String {
    strip_accents(raw)
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Legalized credits count as approved
pub fn group_state(normalized: &str) -> &str {
    match normalized {
        "LEGALIZADO" => APROBADO,
        other => other,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ============================================================================
// STATE SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCount {
    pub state: String,
    pub count: usize,
    /// Share of all records, one decimal
    pub pct: f64,
}

/// CREADO is every record of the period; the other states are counted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub total: usize,
    pub states: Vec<StateCount>,
}

impl StateSummary {
    pub fn count(&self, state: &str) -> usize {
        self.states
            .iter()
            .find(|s| s.state == state)
            .map(|s| s.count)
            .unwrap_or(0)
    }
}

pub fn summarize_states<'a, I>(states: I) -> StateSummary
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut total = 0;
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for state in states {
        total += 1;
        if let Some(s) = state {
            *counts.entry(s).or_insert(0) += 1;
        }
    }

    let states = PIPELINE_STATES
        .iter()
        .map(|&state| {
            let count = if state == CREADO {
                total
            } else {
                counts.get(state).copied().unwrap_or(0)
            };
            StateCount {
                state: state.to_string(),
                count,
                pct: round1(percent(count as f64, total as f64)),
            }
        })
        .collect();

    StateSummary { total, states }
}

// ============================================================================
// KPIS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthComparison {
    pub period: Period,
    pub summary: StateSummary,
    pub total: PeriodDelta,
    pub approved: PeriodDelta,
}

/// January..cut month of the selected year vs the same months a year earlier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YtdComparison {
    pub year: i32,
    pub through_month: u32,
    pub created: PeriodDelta,
    pub approved: PeriodDelta,
    pub approval_rate: f64,
    pub approval_rate_previous: f64,
    /// Percentage points
    pub approval_rate_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    pub period: Period,
    pub created: usize,
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineKpis {
    /// Records left after removing excluded states
    pub records: usize,
    pub excluded: usize,
    /// Records without a parseable FECHA; only in the all-records view
    pub undated: usize,
    /// Month analysed; None when no record has a date
    pub period: Option<Period>,
    pub summary: StateSummary,
    pub approved: usize,
    /// Approved over created, percent
    pub approval_rate: f64,
    pub comparison: Option<MonthComparison>,
    pub ytd: Option<YtdComparison>,
    pub monthly: Vec<MonthlyPoint>,
}

struct Credit {
    month: Option<Period>,
    state: Option<String>,
}

impl Credit {
    fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    fn is(&self, state: &str) -> bool {
        self.state() == Some(state)
    }
}

fn summarize_month(credits: &[Credit], period: Period) -> StateSummary {
    summarize_states(
        credits
            .iter()
            .filter(|c| c.month == Some(period))
            .map(Credit::state),
    )
}

fn ytd(credits: &[Credit], year: i32, month: u32) -> YtdComparison {
    let within = |c: &&Credit, y: i32| {
        matches!(c.month, Some(Period { year: cy, month: Some(m) }) if cy == y && m <= month)
    };
    let current: Vec<&Credit> = credits.iter().filter(|c| within(c, year)).collect();
    let previous: Vec<&Credit> = credits.iter().filter(|c| within(c, year - 1)).collect();

    let approved_now = current.iter().filter(|c| c.is(APROBADO)).count();
    let approved_before = previous.iter().filter(|c| c.is(APROBADO)).count();
    let approval_rate = percent(approved_now as f64, current.len() as f64);
    let approval_rate_previous = percent(approved_before as f64, previous.len() as f64);

    YtdComparison {
        year,
        through_month: month,
        created: PeriodDelta::counts(current.len(), previous.len()),
        approved: PeriodDelta::counts(approved_now, approved_before),
        approval_rate,
        approval_rate_previous,
        approval_rate_delta: approval_rate - approval_rate_previous,
    }
}

fn monthly(credits: &[Credit]) -> Vec<MonthlyPoint> {
    let mut points: BTreeMap<Period, MonthlyPoint> = BTreeMap::new();
    for c in credits {
        let Some(period) = c.month else { continue };
        let point = points.entry(period).or_insert(MonthlyPoint {
            period,
            created: 0,
            approved: 0,
            rejected: 0,
        });
        point.created += 1;
        if c.is(APROBADO) {
            point.approved += 1;
        } else if c.is(RECHAZADO) {
            point.rejected += 1;
        }
    }
    points.into_values().collect()
}

/// Requested month if it has records, else the newest month with records
fn select_month(available: &BTreeSet<Period>, requested: Option<Period>) -> Option<Period> {
    let latest = available.iter().next_back().copied();
    match requested {
        Some(p) if available.contains(&p) => Some(p),
        Some(p) => {
            if let Some(l) = latest {
                warn!("⚠️  pipeline: no records for {}, showing {}", p, l);
            }
            latest
        }
        None => latest,
    }
}

pub fn compute(table: &Table, config: &DashboardConfig, period: Option<Period>) -> Result<PipelineKpis> {
    let states = table.column("ESTADO").ok_or_else(|| DashboardError::Schema {
        domain: Domain::Pipeline,
        columns: vec!["ESTADO".to_string()],
    })?;
    let dates = table.dates("FECHA");

    let mut excluded = 0;
    let mut credits = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let state = states.values.display(row).map(|s| normalize_state(&s));
        if let Some(s) = &state {
            if config.is_excluded_state(s) {
                excluded += 1;
                continue;
            }
        }
        credits.push(Credit {
            month: dates.and_then(|d| d[row]).map(Period::of_date),
            state: state.map(|s| group_state(&s).to_string()),
        });
    }

    let available: BTreeSet<Period> = credits.iter().filter_map(|c| c.month).collect();
    let selected = select_month(&available, period);
    let undated = credits.iter().filter(|c| c.month.is_none()).count();

    let summary = match selected {
        Some(p) => summarize_month(&credits, p),
        None => summarize_states(credits.iter().map(Credit::state)),
    };
    let approved = summary.count(APROBADO);
    let approval_rate = percent(approved as f64, summary.total as f64);

    let comparison = selected
        .and_then(|p| p.previous_month())
        .filter(|prev| available.contains(prev))
        .map(|prev| {
            let before = summarize_month(&credits, prev);
            MonthComparison {
                period: prev,
                total: PeriodDelta::counts(summary.total, before.total),
                approved: PeriodDelta::counts(approved, before.count(APROBADO)),
                summary: before,
            }
        });

    let ytd = selected.and_then(|p| p.month.map(|m| ytd(&credits, p.year, m)));

    Ok(PipelineKpis {
        records: credits.len(),
        excluded,
        undated,
        period: selected,
        summary,
        approved,
        approval_rate,
        comparison,
        ytd,
        monthly: monthly(&credits),
    })
}
