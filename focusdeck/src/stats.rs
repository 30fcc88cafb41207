//! Read-side projections over the task collection. Nothing here is stored;
//! every figure is recomputed from the tasks handed in.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use focusdeck_ipc::{PeriodStats, Quadrant, StatsReport, Task, TaskStatus};
use std::collections::BTreeSet;

/// Eight hours of focused work.
pub const DEFAULT_DAILY_GOAL_SECONDS: u64 = 28_800;

fn done_with_completion(tasks: &[Task]) -> impl Iterator<Item = (&Task, DateTime<Utc>)> {
    tasks
        .iter()
        .filter(|t| t.is_done())
        .filter_map(|t| t.completed_at.map(|at| (t, at)))
}

fn aggregate<'a>(tasks: impl Iterator<Item = &'a Task>) -> PeriodStats {
    tasks.fold(PeriodStats::default(), |acc, t| PeriodStats {
        count: acc.count + 1,
        duration_seconds: acc.duration_seconds + t.duration_seconds,
    })
}

/// Done tasks completed on `day` as seen in `tz`.
pub fn completions_on<'a, Tz: TimeZone>(tasks: &'a [Task], day: NaiveDate, tz: &Tz) -> Vec<&'a Task> {
    done_with_completion(tasks)
        .filter(|(_, at)| at.with_timezone(tz).date_naive() == day)
        .map(|(t, _)| t)
        .collect()
}

pub fn daily_stats<Tz: TimeZone>(tasks: &[Task], day: NaiveDate, tz: &Tz) -> PeriodStats {
    aggregate(completions_on(tasks, day, tz).into_iter())
}

/// Local midnight opening the week that contains `now`.
pub fn start_of_week<Tz: TimeZone>(now: &DateTime<Tz>, week_start: Weekday) -> DateTime<Utc> {
    let today = now.date_naive();
    let back = (7 + today.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
    let first_day = today - Duration::days(i64::from(back));
    let midnight = first_day.and_time(NaiveTime::MIN);
    let tz = now.timezone();
    match tz.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Midnight skipped by a DST jump.
        None => tz.from_utc_datetime(&midnight).with_timezone(&Utc),
    }
}

pub fn weekly_stats<Tz: TimeZone>(tasks: &[Task], now: &DateTime<Tz>, week_start: Weekday) -> PeriodStats {
    let since = start_of_week(now, week_start);
    aggregate(
        done_with_completion(tasks)
            .filter(|(_, at)| *at >= since)
            .map(|(t, _)| t),
    )
}

/// Most recently completed first.
pub fn recent_completions(tasks: &[Task], limit: usize) -> Vec<&Task> {
    let mut done: Vec<_> = done_with_completion(tasks).collect();
    done.sort_by(|a, b| b.1.cmp(&a.1));
    done.into_iter().take(limit).map(|(t, _)| t).collect()
}

pub fn daily_progress_ratio(daily_seconds: u64, goal_seconds: u64) -> f64 {
    if goal_seconds == 0 {
        return 1.0;
    }
    (daily_seconds as f64 / goal_seconds as f64).min(1.0)
}

/// Days of `year`/`month` with at least one completion, ascending.
pub fn active_days<Tz: TimeZone>(tasks: &[Task], year: i32, month: u32, tz: &Tz) -> Vec<NaiveDate> {
    done_with_completion(tasks)
        .map(|(_, at)| at.with_timezone(tz).date_naive())
        .filter(|d| d.year() == year && d.month() == month)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Tasks still waiting in a quadrant. Focused and done tasks are excluded.
pub fn by_quadrant(tasks: &[Task], quadrant: Quadrant) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|t| t.quadrant == quadrant && t.status == TaskStatus::Todo)
        .collect()
}

pub fn report<Tz: TimeZone>(
    tasks: &[Task],
    now: &DateTime<Tz>,
    week_start: Weekday,
    daily_goal_seconds: u64,
) -> StatsReport {
    let today = daily_stats(tasks, now.date_naive(), &now.timezone());
    StatsReport {
        today,
        week: weekly_stats(tasks, now, week_start),
        daily_progress: daily_progress_ratio(today.duration_seconds, daily_goal_seconds),
        daily_goal_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use focusdeck_ipc::DEFAULT_RECENT_LIMIT;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn done(id: i64, seconds: u64, completed_at: DateTime<Utc>) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            description: None,
            tags: None,
            quadrant: Quadrant::Important,
            status: TaskStatus::Done,
            created_at: completed_at - Duration::hours(1),
            start_time: None,
            completed_at: Some(completed_at),
            duration_seconds: seconds,
        }
    }

    fn todo(id: i64, quadrant: Quadrant) -> Task {
        Task {
            status: TaskStatus::Todo,
            completed_at: None,
            quadrant,
            ..done(id, 0, at(2024, 3, 1, 9))
        }
    }

    #[test]
    fn daily_totals_for_today() {
        // Friday 2024-03-15
        let tasks = vec![
            done(1, 600, at(2024, 3, 15, 8)),
            done(2, 1200, at(2024, 3, 15, 12)),
            done(3, 1800, at(2024, 3, 15, 17)),
            done(4, 999, at(2024, 3, 14, 23)),
            todo(5, Quadrant::Urgent),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let stats = daily_stats(&tasks, day, &Utc);
        assert_eq!(stats, PeriodStats { count: 3, duration_seconds: 3600 });
        assert_eq!(daily_progress_ratio(stats.duration_seconds, DEFAULT_DAILY_GOAL_SECONDS), 0.125);
    }

    #[test]
    fn calendar_day_follows_time_zone() {
        let tasks = vec![done(1, 60, at(2024, 3, 15, 23))];
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();
        assert_eq!(daily_stats(&tasks, day, &plus_two).count, 1);
        assert_eq!(daily_stats(&tasks, day, &Utc).count, 0);
    }

    #[test]
    fn progress_ratio_is_capped() {
        assert_eq!(daily_progress_ratio(0, 28_800), 0.0);
        assert_eq!(daily_progress_ratio(40_000, 28_800), 1.0);
        assert_eq!(daily_progress_ratio(10, 0), 1.0);
    }

    #[test]
    fn week_starts_on_configured_day() {
        let friday = at(2024, 3, 15, 10);
        assert_eq!(start_of_week(&friday, Weekday::Sun), at(2024, 3, 10, 0));
        assert_eq!(start_of_week(&friday, Weekday::Mon), at(2024, 3, 11, 0));
        let sunday = at(2024, 3, 10, 10);
        assert_eq!(start_of_week(&sunday, Weekday::Sun), at(2024, 3, 10, 0));
    }

    #[test]
    fn weekly_totals_include_week_start_boundary() {
        let tasks = vec![
            done(1, 100, at(2024, 3, 10, 0)),
            done(2, 200, at(2024, 3, 13, 9)),
            done(3, 400, at(2024, 3, 9, 23)),
        ];
        let stats = weekly_stats(&tasks, &at(2024, 3, 15, 10), Weekday::Sun);
        assert_eq!(stats, PeriodStats { count: 2, duration_seconds: 300 });
    }

    #[test]
    fn recent_completions_newest_first_truncated() {
        let tasks: Vec<_> = (1..=7).map(|i| done(i, 60, at(2024, 3, i as u32, 9))).collect();
        let recent = recent_completions(&tasks, DEFAULT_RECENT_LIMIT);
        let ids: Vec<_> = recent.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![7, 6, 5, 4, 3]);
    }

    #[test]
    fn active_days_are_unique_and_sorted() {
        let tasks = vec![
            done(1, 1, at(2024, 3, 20, 9)),
            done(2, 1, at(2024, 3, 2, 9)),
            done(3, 1, at(2024, 3, 20, 15)),
            done(4, 1, at(2024, 4, 1, 9)),
        ];
        let days = active_days(&tasks, 2024, 3, &Utc);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            ]
        );
    }

    #[test]
    fn quadrant_lists_only_waiting_tasks() {
        let mut focused = todo(3, Quadrant::Urgent);
        focused.status = TaskStatus::Focused;
        let tasks = vec![
            todo(1, Quadrant::Urgent),
            todo(2, Quadrant::Neither),
            focused,
            Task { quadrant: Quadrant::Urgent, ..done(4, 1, at(2024, 3, 1, 9)) },
        ];
        let ids: Vec<_> = by_quadrant(&tasks, Quadrant::Urgent).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn report_bundles_day_and_week() {
        let tasks = vec![done(1, 14_400, at(2024, 3, 15, 8)), done(2, 600, at(2024, 3, 12, 8))];
        let report = report(&tasks, &at(2024, 3, 15, 10), Weekday::Sun, DEFAULT_DAILY_GOAL_SECONDS);
        assert_eq!(report.today.count, 1);
        assert_eq!(report.week, PeriodStats { count: 2, duration_seconds: 15_000 });
        assert_eq!(report.daily_progress, 0.5);
    }
}
