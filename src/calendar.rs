// 📅 Year Shift - move the time axis (and every series on it) to another year
//
// same leap status     → only the year changes
// leap → common year   → Feb 29 rows are dropped
// common → leap year   → Feb 29 rows are copied from Feb 28

use crate::error::{ReductionError, Result};
use crate::model::Network;
use crate::series::series_component;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::info;

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

fn is_month_day(date: &NaiveDateTime, month: u32, day: u32) -> bool {
    date.month() == month && date.day() == day
}

/// (source row, new timestamp) for every output row, in time order.
///
/// Dates are moved to `target_year` whatever year they carry; `base_year`
/// only decides how Feb 29 is handled.
pub fn year_shift_plan(
    dates: &[NaiveDateTime],
    base_year: i32,
    target_year: i32,
) -> Result<Vec<(usize, NaiveDateTime)>> {
    let base_leap = is_leap_year(base_year);
    let target_leap = is_leap_year(target_year);

    let mut plan = Vec::with_capacity(dates.len());
    for (row, date) in dates.iter().enumerate() {
        if base_leap && !target_leap && is_month_day(date, 2, 29) {
            continue;
        }
        let shifted = date.with_year(target_year).ok_or_else(|| ReductionError::Degenerate {
            what: "year shift".to_string(),
            detail: format!("{} has no counterpart in {}", date, target_year),
        })?;
        plan.push((row, shifted));

        if !base_leap && target_leap && is_month_day(date, 2, 28) {
            if let Some(copy) = shifted.with_day(29) {
                plan.push((row, copy));
            }
        }
    }
    // Stable: copied Feb 29 rows keep their Feb 28 order
    plan.sort_by_key(|(_, date)| *date);
    Ok(plan)
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearShift {
    pub base_year: i32,
    pub target_year: i32,
    pub dropped: usize,
    pub added: usize,
}

/// Move the network time axis from `base_year` to `target_year`.
///
/// Weightings and every time-indexed table follow the same row plan. Series
/// lengths are checked before anything is written. `None` when the years match.
pub fn shift_year(network: &mut Network, base_year: i32, target_year: i32) -> Result<Option<YearShift>> {
    if base_year == target_year {
        return Ok(None);
    }

    let len = network.snapshots().len();
    let plan = year_shift_plan(network.snapshots(), base_year, target_year)?;

    let keys = network.series_keys();
    for (table, attribute) in &keys {
        if let Some(series) = network.series(table, attribute) {
            if series.len() != len {
                return Err(ReductionError::SeriesLength {
                    entity: format!("{}.{}", series_component(table), attribute),
                    expected: len,
                    found: series.len(),
                });
            }
        }
    }

    for (table, attribute) in &keys {
        let Some(series) = network.series_mut(table, attribute) else {
            continue;
        };
        let columns: BTreeMap<String, Vec<Option<f64>>> = series
            .columns()
            .map(|(entity, values)| {
                (entity.to_string(), plan.iter().map(|(row, _)| values[*row]).collect())
            })
            .collect();
        series.replace_all(plan.len(), columns);
    }

    let weightings = network.weightings();
    let new_weightings: Vec<f64> = plan.iter().map(|(row, _)| weightings[*row]).collect();
    let new_snapshots: Vec<NaiveDateTime> = plan.iter().map(|(_, date)| *date).collect();
    network.set_snapshots(new_snapshots, new_weightings)?;

    let shift = YearShift {
        base_year,
        target_year,
        dropped: len.saturating_sub(plan.len()),
        added: plan.len().saturating_sub(len),
    };
    info!(
        "Shifted time axis {} → {}: {} → {} snapshots",
        base_year,
        target_year,
        len,
        plan.len()
    );
    Ok(Some(shift))
}

// ============================================================================
// TESTS
// ============================================================================
