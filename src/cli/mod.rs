//! CLI module for the worklog command-line interface.
//!
//! Each subcommand stands in for one view of the app:
//! - `login` / `logout` / `whoami` - session management
//! - `week` - the weekly log list with statistics
//! - `month` - the calendar view
//! - `log show|add|edit|delete` - the log detail view
//! - `users list|show` - the user directory
//! - `open <path>` - resolve a view path through the navigation guard

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Datelike, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::api::{LogDraft, LogEntry, UserQuery, LOGIN_VIEW};
use crate::config::Config;
use crate::logs::MonthWindow;
use crate::router::Navigation;
use crate::AppContext;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "worklog")]
#[command(author, version, about = "Keep a daily work log from the terminal", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "worklog.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Backend URL (overrides [api].base_url)
    #[arg(long, env = "WORKLOG_API_URL")]
    pub api_url: Option<String>,

    /// Where the session token is kept (overrides [session].token_file)
    #[arg(long, env = "WORKLOG_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Apply flag and environment overrides on top of the file config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.api_url {
            config.api.base_url = url.clone();
        }
        if let Some(path) = &self.token_file {
            config.session.token_file = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a login captcha and save its image
    Captcha {
        /// Where to write the image
        #[arg(short, long, default_value = "captcha.jpg")]
        out: PathBuf,
    },

    /// Log in and remember the session token
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
        /// Captcha answer
        #[arg(long)]
        code: Option<String>,
        /// Captcha id printed by `worklog captcha`
        #[arg(long)]
        uuid: Option<String>,
    },

    /// End the session and forget the token
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Show one week of logs
    Week {
        /// Weeks relative to the current one (-1 is last week)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i64,
        #[command(flatten)]
        viewing: ViewingArgs,
    },

    /// Show a month calendar marking days with logs
    Month {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
        #[command(flatten)]
        viewing: ViewingArgs,
    },

    /// Single log entry commands
    #[command(subcommand)]
    Log(LogCommands),

    /// User directory commands
    #[command(subcommand)]
    Users(UsersCommands),

    /// Upload a file
    Upload { file: PathBuf },

    /// Resolve a view path through the navigation guard
    Open { path: String },
}

/// Look at somebody else's logs
#[derive(Args, Debug, Default, Clone)]
pub struct ViewingArgs {
    /// User ID to view
    #[arg(long, requires = "user_name")]
    pub user: Option<i64>,
    /// Display name of that user
    #[arg(long)]
    pub user_name: Option<String>,
}

/// Log subcommands
#[derive(Subcommand, Debug)]
pub enum LogCommands {
    Show {
        id: i64,
    },
    Add {
        /// Day of the entry (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "")]
        summary: String,
        #[arg(long, default_value = "")]
        remark: String,
    },
    /// Change fields of an existing entry; omitted fields are kept
    Edit {
        id: i64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        remark: Option<String>,
    },
    Delete {
        id: i64,
    },
}

/// Users subcommands
#[derive(Subcommand, Debug)]
pub enum UsersCommands {
    List {
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "20")]
        size: u32,
        /// Filter by login name
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// "0" active, "1" disabled
        #[arg(long)]
        status: Option<String>,
    },
    Show {
        id: i64,
    },
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

/// Run a CLI command
pub async fn run_command(cli: &Cli, ctx: &AppContext) -> Result<()> {
    match &cli.command {
        Commands::Captcha { out } => cmd_captcha(ctx, out).await,
        Commands::Login {
            username,
            password,
            code,
            uuid,
        } => cmd_login(ctx, username, password, code.as_deref(), uuid.as_deref()).await,
        Commands::Logout => cmd_logout(ctx).await,
        Commands::Whoami => cmd_whoami(ctx).await,
        Commands::Week { offset, viewing } => cmd_week(ctx, *offset, viewing).await,
        Commands::Month {
            year,
            month,
            viewing,
        } => cmd_month(ctx, *year, *month, viewing).await,
        Commands::Log(LogCommands::Show { id }) => cmd_log_show(ctx, *id).await,
        Commands::Log(LogCommands::Add {
            date,
            content,
            summary,
            remark,
        }) => {
            let mut draft = LogDraft::new(*date, content.clone());
            draft.summary = summary.clone();
            draft.remark = remark.clone();
            cmd_log_add(ctx, draft).await
        }
        Commands::Log(LogCommands::Edit {
            id,
            date,
            content,
            summary,
            remark,
        }) => {
            let changes = LogChanges {
                date: *date,
                content: content.clone(),
                summary: summary.clone(),
                remark: remark.clone(),
            };
            cmd_log_edit(ctx, *id, changes).await
        }
        Commands::Log(LogCommands::Delete { id }) => cmd_log_delete(ctx, *id).await,
        Commands::Users(UsersCommands::List {
            page,
            size,
            name,
            phone,
            status,
        }) => {
            let query = UserQuery {
                page_num: Some(*page),
                page_size: Some(*size),
                user_name: name.clone(),
                phonenumber: phone.clone(),
                status: status.clone(),
            };
            cmd_users_list(ctx, &query).await
        }
        Commands::Users(UsersCommands::Show { id }) => cmd_users_show(ctx, *id).await,
        Commands::Upload { file } => cmd_upload(ctx, file).await,
        Commands::Open { path } => cmd_open(ctx, path).await,
    }
}

/// Navigate to a view and make sure the profile is loaded behind it
async fn enter_view(ctx: &AppContext, path: &str) -> Result<Navigation> {
    let navigation = ctx.router.navigate(path);
    if navigation.location.path == LOGIN_VIEW {
        anyhow::bail!("Not logged in. Run 'worklog login' first.");
    }
    if ctx.session.profile().is_none() {
        ctx.session
            .restore()
            .await
            .context("Failed to load user profile")?;
    }
    Ok(navigation)
}

fn apply_viewing(ctx: &AppContext, viewing: &ViewingArgs) -> Result<()> {
    match (viewing.user, viewing.user_name.as_deref()) {
        (Some(user_id), Some(user_name)) => {
            if !ctx.session.can_view_others() {
                anyhow::bail!("You are not allowed to view other users' logs");
            }
            ctx.logs.set_viewing_user(user_id, user_name);
        }
        _ => ctx.logs.clear_viewing_user(),
    }
    Ok(())
}

async fn cmd_captcha(ctx: &AppContext, out: &Path) -> Result<()> {
    let captcha = ctx.api.captcha().await.context("Failed to fetch captcha")?;

    if !captcha.captcha_enabled {
        println!("Captcha is disabled; log in without --code.");
        return Ok(());
    }

    let encoded = captcha
        .img
        .split_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(&captcha.img);
    let image = STANDARD
        .decode(encoded.trim())
        .context("Captcha image is not valid base64")?;
    tokio::fs::write(out, &image)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("Captcha saved to {}", out.display());
    println!();
    println!("Log in with: worklog login -u <name> -p <password> --code <answer> --uuid {}", captcha.uuid);
    Ok(())
}

async fn cmd_login(
    ctx: &AppContext,
    username: &str,
    password: &str,
    code: Option<&str>,
    uuid: Option<&str>,
) -> Result<()> {
    ctx.router.navigate(LOGIN_VIEW);
    let target = ctx.router.post_login_target();

    let result = ctx.session.login(username, password, code, uuid).await;
    if let Err(e) = result {
        if !ctx.session.is_logged_in() {
            return Err(e).context("Login failed");
        }
        eprintln!("Logged in, but the profile could not be loaded: {}", e);
    }

    let navigation = ctx.router.replace(&target);
    println!("[OK] Logged in as {}", display_user(ctx, username));
    println!("Landing view: {}", navigation.location);
    Ok(())
}

async fn cmd_logout(ctx: &AppContext) -> Result<()> {
    if !ctx.session.is_logged_in() {
        println!("Not logged in.");
        return Ok(());
    }
    ctx.session.logout().await;
    ctx.router.replace(LOGIN_VIEW);
    println!("Logged out.");
    Ok(())
}

async fn cmd_whoami(ctx: &AppContext) -> Result<()> {
    enter_view(ctx, "/profile").await?;
    let profile = ctx
        .session
        .profile()
        .context("Server returned no user profile")?;

    println!();
    println!("=== {} ===", profile.display_name());
    println!();
    println!("User ID:      {}", optional(profile.user_id));
    println!("User name:    {}", profile.user_name);
    println!("Nickname:     {}", or_dash(&profile.nick_name));
    println!("Avatar:       {}", or_dash(&profile.avatar));
    println!("Admin:        {}", yes_no(ctx.session.is_admin()));
    println!("View others:  {}", yes_no(ctx.session.can_view_others()));

    let roles: Vec<&str> = profile
        .roles
        .iter()
        .filter_map(|r| r.role_name.as_deref().or(r.role_key.as_deref()))
        .collect();
    println!(
        "Roles:        {}",
        if roles.is_empty() {
            "-".to_string()
        } else {
            roles.join(", ")
        }
    );
    if let Some(permissions) = ctx.session.permissions() {
        println!("Permissions:  {}", permissions.len());
    }
    println!();
    Ok(())
}

async fn cmd_week(ctx: &AppContext, offset: i64, viewing: &ViewingArgs) -> Result<()> {
    enter_view(ctx, "/home").await?;
    apply_viewing(ctx, viewing)?;

    let week = ctx
        .logs
        .go_to_week(offset)
        .await
        .context("Failed to load week")?;

    let (start, end) = ctx.logs.week_bounds();
    let title = format!("Week of {} to {}", optional(start), optional(end));
    println!();
    match ctx.logs.viewing_user() {
        Some(user) => println!("=== {} ({}) ===", title, user.user_name),
        None => println!("=== {} ===", title),
    }
    println!();
    print_week(&week.entries, start, end);

    let stats = ctx.logs.work_stats();
    println!();
    println!(
        "Work days: {}   Logs: {}   Empty days: {}",
        stats.work_days, stats.total_logs, stats.empty_days
    );
    println!();
    Ok(())
}

fn print_week(entries: &[LogEntry], start: Option<NaiveDate>, end: Option<NaiveDate>) {
    println!("{:<8}  {:<10}  {:<4}  {:<60}", "ID", "DATE", "DAY", "CONTENT");
    println!("{}", "-".repeat(88));

    for day in days_between(start, end) {
        let on_day: Vec<&LogEntry> = entries.iter().filter(|e| e.log_date == day).collect();
        if on_day.is_empty() {
            println!("{:<8}  {:<10}  {:<4}  {:<60}", "-", day, day.format("%a"), "-");
        }
        for entry in on_day {
            println!(
                "{:<8}  {:<10}  {:<4}  {:<60}",
                optional(entry.id),
                day,
                day.format("%a"),
                truncate(first_line(&entry.content), 60)
            );
        }
    }

    // Entries the server returned outside its own bounds
    let days: BTreeSet<NaiveDate> = days_between(start, end).collect();
    for entry in entries.iter().filter(|e| !days.contains(&e.log_date)) {
        println!(
            "{:<8}  {:<10}  {:<4}  {:<60}",
            optional(entry.id),
            entry.log_date,
            entry.log_date.format("%a"),
            truncate(first_line(&entry.content), 60)
        );
    }
}

fn days_between(start: Option<NaiveDate>, end: Option<NaiveDate>) -> impl Iterator<Item = NaiveDate> {
    let (first, last) = match (start, end) {
        (Some(s), Some(e)) if e >= s => (Some(s), e),
        (Some(s), _) => (Some(s), s),
        _ => (None, NaiveDate::MIN),
    };
    std::iter::successors(first, move |d| d.succ_opt().filter(|n| *n <= last))
}

async fn cmd_month(
    ctx: &AppContext,
    year: Option<i32>,
    month: Option<u32>,
    viewing: &ViewingArgs,
) -> Result<()> {
    enter_view(ctx, "/calendar").await?;
    apply_viewing(ctx, viewing)?;

    let current = ctx.logs.month_window();
    let year = year.unwrap_or(current.year);
    let month = month.unwrap_or(current.month);
    let window = MonthWindow::new(year, month).context("Month must be between 1 and 12")?;

    let entries = ctx
        .logs
        .fetch_month_logs(window.year, window.month)
        .await
        .context("Failed to load month")?;

    println!();
    match ctx.logs.viewing_user() {
        Some(user) => println!("=== {} ({}) ===", window, user.user_name),
        None => println!("=== {} ===", window),
    }
    println!();
    print!("{}", render_month(window, &ctx.logs.month_log_dates()));
    println!();
    println!("{} entries, {} days logged", entries.len(), ctx.logs.month_log_dates().len());
    println!();
    Ok(())
}

/// Monday-first month grid; logged days are marked with `*`
fn render_month(window: MonthWindow, logged: &BTreeSet<NaiveDate>) -> String {
    let mut out = String::from(" Mo  Tu  We  Th  Fr  Sa  Su\n");
    let Some(first) = window.first_day() else {
        return out;
    };

    let lead = first.weekday().num_days_from_monday() as usize;
    out.push_str(&"    ".repeat(lead));

    let mut column = lead;
    let mut day = first;
    while day.month() == window.month {
        let mark = if logged.contains(&day) { '*' } else { ' ' };
        out.push_str(&format!("{:>3}{}", day.day(), mark));
        column += 1;
        if column == 7 {
            out.push('\n');
            column = 0;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    if column != 0 {
        out.push('\n');
    }
    out
}

async fn cmd_log_show(ctx: &AppContext, id: i64) -> Result<()> {
    enter_view(ctx, &format!("/log/{}", id)).await?;
    let entry = ctx
        .logs
        .detail(id)
        .await
        .with_context(|| format!("Failed to load log {}", id))?;

    println!();
    println!("=== Log: {} ===", entry.log_date);
    println!();
    println!("ID:       {}", optional(entry.id));
    println!("Date:     {} ({})", entry.log_date, entry.log_date.format("%A"));
    if let Some(user) = &entry.user_name {
        println!("User:     {}", user);
    }
    println!("Summary:  {}", or_dash(&entry.summary));
    println!("Remark:   {}", or_dash(&entry.remark));
    if let Some(updated) = entry.update_time.as_deref().or(entry.create_time.as_deref()) {
        println!("Updated:  {}", updated);
    }
    println!();
    println!("{}", if entry.has_content() { &entry.content } else { "(empty)" });
    println!();
    Ok(())
}

async fn cmd_log_add(ctx: &AppContext, draft: LogDraft) -> Result<()> {
    enter_view(ctx, "/log").await?;
    ctx.logs.save(&draft).await.context("Failed to add log")?;
    println!("[OK] Log for {} saved", draft.log_date);
    Ok(())
}

/// Field overrides for `log edit`
#[derive(Debug, Default)]
struct LogChanges {
    date: Option<NaiveDate>,
    content: Option<String>,
    summary: Option<String>,
    remark: Option<String>,
}

impl LogChanges {
    fn apply(self, draft: &mut LogDraft) {
        if let Some(date) = self.date {
            draft.log_date = date;
        }
        if let Some(content) = self.content {
            draft.content = content;
        }
        if let Some(summary) = self.summary {
            draft.summary = summary;
        }
        if let Some(remark) = self.remark {
            draft.remark = remark;
        }
    }
}

async fn cmd_log_edit(ctx: &AppContext, id: i64, changes: LogChanges) -> Result<()> {
    enter_view(ctx, &format!("/log/{}", id)).await?;
    let entry = ctx
        .logs
        .detail(id)
        .await
        .with_context(|| format!("Failed to load log {}", id))?;

    let mut draft = LogDraft::from_entry(&entry);
    draft.id = Some(id);
    changes.apply(&mut draft);

    ctx.logs.save(&draft).await.context("Failed to update log")?;
    println!("[OK] Log {} updated", id);
    Ok(())
}

async fn cmd_log_delete(ctx: &AppContext, id: i64) -> Result<()> {
    enter_view(ctx, &format!("/log/{}", id)).await?;
    ctx.logs
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete log {}", id))?;
    println!("[OK] Log {} deleted", id);
    Ok(())
}

async fn cmd_users_list(ctx: &AppContext, query: &UserQuery) -> Result<()> {
    enter_view(ctx, "/users").await?;
    let page = ctx
        .api
        .user_list(query)
        .await
        .context("Failed to list users")?;

    if page.rows.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!();
    println!(
        "{:<8}  {:<16}  {:<20}  {:<16}  {:<14}  {:<8}",
        "ID", "USERNAME", "NAME", "DEPT", "PHONE", "STATUS"
    );
    println!("{}", "-".repeat(92));

    for user in &page.rows {
        println!(
            "{:<8}  {:<16}  {:<20}  {:<16}  {:<14}  {:<8}",
            user.user_id,
            truncate(&user.user_name, 16),
            truncate(user.display_name(), 20),
            truncate(user.dept_name().unwrap_or("-"), 16),
            user.phonenumber.as_deref().unwrap_or("-"),
            status_label(user.status.as_deref())
        );
    }

    println!();
    println!(
        "Page {} - {} of {} users",
        query.page_num.unwrap_or(1),
        page.rows.len(),
        page.total
    );
    println!();
    Ok(())
}

async fn cmd_users_show(ctx: &AppContext, id: i64) -> Result<()> {
    enter_view(ctx, "/users").await?;
    let user = ctx
        .api
        .user_detail(id)
        .await
        .with_context(|| format!("Failed to load user {}", id))?;

    println!();
    println!("=== User: {} ===", user.display_name());
    println!();
    println!("ID:         {}", user.user_id);
    println!("Username:   {}", user.user_name);
    println!("Nickname:   {}", or_dash(&user.nick_name));
    println!("Dept:       {}", user.dept_name().unwrap_or("-"));
    println!("Email:      {}", user.email.as_deref().unwrap_or("-"));
    println!("Phone:      {}", user.phonenumber.as_deref().unwrap_or("-"));
    println!("Status:     {}", status_label(user.status.as_deref()));
    if let Some(created) = &user.create_time {
        println!("Created:    {}", created);
    }
    println!();
    println!(
        "Use 'worklog week --user {} --user-name {}' to read their logs.",
        user.user_id,
        user.display_name()
    );
    println!();
    Ok(())
}

async fn cmd_upload(ctx: &AppContext, file: &Path) -> Result<()> {
    if !ctx.session.is_logged_in() {
        anyhow::bail!("Not logged in. Run 'worklog login' first.");
    }
    let uploaded = ctx
        .api
        .upload_file(file)
        .await
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    println!("[OK] Uploaded {}", file.display());
    println!("URL:   {}", uploaded.url);
    println!("Name:  {}", or_dash(&uploaded.file_name));
    Ok(())
}

async fn cmd_open(ctx: &AppContext, path: &str) -> Result<()> {
    let navigation = ctx.router.navigate(path);

    println!("Location:   {}", navigation.location);
    println!(
        "View:       {}",
        navigation.route.and_then(|r| r.name).unwrap_or("-")
    );
    println!(
        "Title:      {}",
        ctx.router.title().unwrap_or_else(|| "-".to_string())
    );
    for (name, value) in &navigation.params {
        println!("Param:      {} = {}", name, value);
    }
    println!("Redirected: {}", yes_no(navigation.redirected));
    Ok(())
}

// ============================================================================
// Formatting helpers
// ============================================================================

fn display_user(ctx: &AppContext, fallback: &str) -> String {
    let nick = ctx.session.nick_name();
    if nick.is_empty() {
        fallback.to_string()
    } else {
        nick
    }
}

fn status_label(status: Option<&str>) -> &'static str {
    match status {
        Some("0") => "Active",
        Some("1") => "Disabled",
        _ => "-",
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() {
        "-"
    } else {
        s
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn first_line(s: &str) -> &str {
    s.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

/// Truncate a string to max length with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
