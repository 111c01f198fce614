use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::window::{monday_of, week_start, Clock, MonthWindow};
use crate::api::{ApiError, Envelope, LogDraft, LogEntry, WeekLogs, WorkLogApi};

const DAYS_PER_WEEK: usize = 7;

/// Whose logs are on screen; `None` in the store means the logged-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewingUser {
    pub user_id: i64,
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkStats {
    /// Entries with non-blank content
    pub work_days: usize,
    pub total_logs: usize,
    /// Days of the loaded window without any entry
    pub empty_days: usize,
}

#[derive(Debug)]
struct LogState {
    week: Vec<LogEntry>,
    week_start: Option<NaiveDate>,
    week_end: Option<NaiveDate>,
    week_offset: i64,
    month: Vec<LogEntry>,
    month_window: MonthWindow,
    viewing: Option<ViewingUser>,
    // Latest ticket handed out per view; older responses are dropped
    week_seq: u64,
    month_seq: u64,
}

/// Week and month collections for the current viewing context.
///
/// Responses are applied only if no newer request for the same view, and no
/// viewing-context change, happened while they were in flight.
#[derive(Debug)]
pub struct LogStore {
    api: Arc<WorkLogApi>,
    clock: Arc<dyn Clock>,
    state: RwLock<LogState>,
    in_flight: AtomicUsize,
}

struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LogStore {
    pub fn new(api: Arc<WorkLogApi>, clock: Arc<dyn Clock>) -> Self {
        let month_window = MonthWindow::containing(clock.today());
        Self {
            api,
            clock,
            state: RwLock::new(LogState {
                week: Vec::new(),
                week_start: None,
                week_end: None,
                week_offset: 0,
                month: Vec::new(),
                month_window,
                viewing: None,
                week_seq: 0,
                month_seq: 0,
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    pub async fn fetch_week_logs(&self, start: NaiveDate) -> Result<WeekLogs, ApiError> {
        let (ticket, viewing) = {
            let mut state = self.state.write();
            state.week_seq += 1;
            (state.week_seq, state.viewing.clone())
        };
        let _loading = LoadingGuard::enter(&self.in_flight);

        let result = match &viewing {
            Some(user) => self.api.user_week_logs(user.user_id, start).await,
            None => self.api.week_logs(start).await,
        };

        let week = match result {
            Ok(week) => week,
            Err(err) => {
                error!(error = %err, %start, "Failed to fetch week logs");
                return Err(err);
            }
        };

        let mut state = self.state.write();
        if state.week_seq == ticket {
            state.week = week.entries.clone();
            state.week_start = Some(week.week_start.unwrap_or(start));
            state.week_end = Some(week.week_end.unwrap_or(start));
        } else {
            debug!(%start, ticket, latest = state.week_seq, "Discarding stale week response");
        }
        drop(state);

        Ok(week)
    }

    pub async fn fetch_month_logs(&self, year: i32, month: u32) -> Result<Vec<LogEntry>, ApiError> {
        let window = MonthWindow::new(year, month)
            .ok_or_else(|| ApiError::decode(format!("invalid month: {}", month)))?;
        let (ticket, viewing) = {
            let mut state = self.state.write();
            state.month_seq += 1;
            (state.month_seq, state.viewing.clone())
        };
        let _loading = LoadingGuard::enter(&self.in_flight);

        let result = match &viewing {
            Some(user) => self.api.user_month_logs(user.user_id, year, month).await,
            None => self.api.month_logs(year, month).await,
        };

        let entries = match result {
            Ok(entries) => entries,
            Err(err) => {
                error!(error = %err, %window, "Failed to fetch month logs");
                return Err(err);
            }
        };

        let mut state = self.state.write();
        if state.month_seq == ticket {
            state.month = entries.clone();
            state.month_window = window;
        } else {
            debug!(%window, ticket, latest = state.month_seq, "Discarding stale month response");
        }
        drop(state);

        Ok(entries)
    }

    // ------------------------------------------------------------------
    // Week navigation
    // ------------------------------------------------------------------

    pub async fn previous_week(&self) -> Result<WeekLogs, ApiError> {
        let start = self.shift_offset(-1)?;
        self.fetch_week_logs(start).await
    }

    pub async fn next_week(&self) -> Result<WeekLogs, ApiError> {
        let start = self.shift_offset(1)?;
        self.fetch_week_logs(start).await
    }

    pub async fn back_to_this_week(&self) -> Result<WeekLogs, ApiError> {
        self.state.write().week_offset = 0;
        let start = monday_of(self.clock.today());
        self.fetch_week_logs(start).await
    }

    /// Jump straight to a given offset from the current week.
    ///
    /// An offset whose Monday is outside the calendar is rejected and leaves
    /// the current offset alone.
    pub async fn go_to_week(&self, offset: i64) -> Result<WeekLogs, ApiError> {
        let start = self.start_for(offset)?;
        self.state.write().week_offset = offset;
        self.fetch_week_logs(start).await
    }

    /// Re-fetch the week currently selected by the offset
    pub async fn refresh_week(&self) -> Result<WeekLogs, ApiError> {
        let offset = self.state.read().week_offset;
        let start = self.start_for(offset)?;
        self.fetch_week_logs(start).await
    }

    fn shift_offset(&self, delta: i64) -> Result<NaiveDate, ApiError> {
        let mut state = self.state.write();
        let offset = state
            .week_offset
            .checked_add(delta)
            .ok_or_else(|| ApiError::decode("week offset out of range"))?;
        let start = self.start_for(offset)?;
        state.week_offset = offset;
        Ok(start)
    }

    fn start_for(&self, offset: i64) -> Result<NaiveDate, ApiError> {
        week_start(self.clock.today(), offset)
            .ok_or_else(|| ApiError::decode("week offset out of range"))
    }

    // ------------------------------------------------------------------
    // Viewing context
    // ------------------------------------------------------------------

    pub fn set_viewing_user(&self, user_id: i64, user_name: impl Into<String>) {
        let user = ViewingUser {
            user_id,
            user_name: user_name.into(),
        };
        info!(user_id, user_name = %user.user_name, "Viewing another user's logs");

        let mut state = self.state.write();
        state.viewing = Some(user);
        Self::invalidate(&mut state);
    }

    pub fn clear_viewing_user(&self) {
        let mut state = self.state.write();
        state.viewing = None;
        state.week_offset = 0;
        Self::invalidate(&mut state);
    }

    fn invalidate(state: &mut LogState) {
        state.week.clear();
        state.month.clear();
        state.week_seq += 1;
        state.month_seq += 1;
    }

    // ------------------------------------------------------------------
    // Single-entry operations
    // ------------------------------------------------------------------

    pub async fn detail(&self, log_id: i64) -> Result<LogEntry, ApiError> {
        self.api.log_detail(log_id).await.inspect_err(|err| {
            error!(error = %err, log_id, "Failed to fetch log entry");
        })
    }

    /// Create or update depending on whether the draft carries an id
    pub async fn save(&self, draft: &LogDraft) -> Result<Envelope, ApiError> {
        let result = if draft.id.is_some() {
            self.api.update_log(draft).await
        } else {
            self.api.add_log(draft).await
        };
        result.inspect_err(|err| {
            error!(error = %err, date = %draft.log_date, "Failed to save log entry");
        })
    }

    pub async fn delete(&self, log_id: i64) -> Result<Envelope, ApiError> {
        self.api.delete_log(log_id).await.inspect_err(|err| {
            error!(error = %err, log_id, "Failed to delete log entry");
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn week_logs(&self) -> Vec<LogEntry> {
        self.state.read().week.clone()
    }

    pub fn week_bounds(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let state = self.state.read();
        (state.week_start, state.week_end)
    }

    pub fn week_offset(&self) -> i64 {
        self.state.read().week_offset
    }

    pub fn month_logs(&self) -> Vec<LogEntry> {
        self.state.read().month.clone()
    }

    pub fn month_window(&self) -> MonthWindow {
        self.state.read().month_window
    }

    pub fn viewing_user(&self) -> Option<ViewingUser> {
        self.state.read().viewing.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn week_log_dates(&self) -> BTreeSet<NaiveDate> {
        self.state.read().week.iter().map(|e| e.log_date).collect()
    }

    pub fn month_log_dates(&self) -> BTreeSet<NaiveDate> {
        self.state.read().month.iter().map(|e| e.log_date).collect()
    }

    pub fn work_stats(&self) -> WorkStats {
        let state = self.state.read();
        let work_days = state.week.iter().filter(|e| e.has_content()).count();
        let total_logs = state.week.len();
        let window = window_days(state.week_start, state.week_end);

        WorkStats {
            work_days,
            total_logs,
            empty_days: window.saturating_sub(total_logs),
        }
    }
}

/// Length of the loaded window; a full week when the bounds are missing or
/// collapsed onto the requested start date.
fn window_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> usize {
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            usize::try_from((end - start).num_days() + 1).unwrap_or(DAYS_PER_WEEK)
        }
        _ => DAYS_PER_WEEK,
    }
}
