//! View routing with an authentication guard.
//!
//! Every navigation is resolved against [`ROUTES`], follows static redirects,
//! and is then passed through [`guard`]. A logged-out user asking for a
//! protected view lands on the login view with the original destination in
//! the `redirect` query parameter.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::LOGIN_VIEW;
use crate::session::SessionStore;

pub const HOME_VIEW: &str = "/home";
pub const REDIRECT_PARAM: &str = "redirect";

const MAX_REDIRECTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMeta {
    pub title: Option<&'static str>,
    pub requires_auth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// `/segment`, `/:param` or a trailing optional `/:param?`
    pub path: &'static str,
    pub name: Option<&'static str>,
    pub redirect: Option<&'static str>,
    pub meta: RouteMeta,
}

const fn view(path: &'static str, name: &'static str, title: &'static str, requires_auth: bool) -> Route {
    Route {
        path,
        name: Some(name),
        redirect: None,
        meta: RouteMeta {
            title: Some(title),
            requires_auth,
        },
    }
}

pub static ROUTES: &[Route] = &[
    Route {
        path: "/",
        name: None,
        redirect: Some(HOME_VIEW),
        meta: RouteMeta {
            title: None,
            requires_auth: false,
        },
    },
    view("/login", "Login", "Login", false),
    view("/home", "Home", "Logs", true),
    view("/calendar", "Calendar", "Calendar", true),
    view("/log/:id?", "LogDetail", "Log detail", true),
    view("/users", "UserList", "Users", true),
    view("/profile", "Profile", "Me", true),
];

/// A path plus decoded query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Location {
    pub fn parse(target: &str) -> Self {
        let target = target.split('#').next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(key), decode(value))
            })
            .collect();

        Self {
            path: normalize_path(path),
            query,
        }
    }

    pub fn with_query(path: &str, key: &str, value: impl Into<String>) -> Self {
        Self {
            path: normalize_path(path),
            query: vec![(key.to_string(), value.into())],
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path with the query re-encoded
    pub fn full_path(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}?{}", self.path, query.join("&"))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Match `path` against a route pattern, returning the captured params.
fn match_pattern(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
    let pattern: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut params = Vec::new();

    for (i, part) in pattern.iter().enumerate() {
        let segment = segments.get(i);
        match part.strip_prefix(':') {
            Some(name) => {
                let (name, optional) = match name.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (name, false),
                };
                match segment {
                    Some(value) => params.push((name.to_string(), decode(value))),
                    None if optional => {}
                    None => return None,
                }
            }
            None => {
                if segment != Some(part) {
                    return None;
                }
            }
        }
    }

    if segments.len() > pattern.len() {
        return None;
    }
    Some(params)
}

pub fn match_route(path: &str) -> Option<(&'static Route, Vec<(String, String)>)> {
    ROUTES
        .iter()
        .find_map(|route| match_pattern(route.path, path).map(|params| (route, params)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(Location),
}

/// Decide whether navigation to `to` may proceed.
pub fn guard(to: &Location, meta: Option<&RouteMeta>, logged_in: bool) -> GuardDecision {
    let requires_auth = meta.is_some_and(|m| m.requires_auth);

    if requires_auth {
        if logged_in {
            GuardDecision::Allow
        } else {
            GuardDecision::Redirect(Location::with_query(
                LOGIN_VIEW,
                REDIRECT_PARAM,
                to.full_path(),
            ))
        }
    } else if to.path == LOGIN_VIEW && logged_in {
        GuardDecision::Redirect(Location::parse(HOME_VIEW))
    } else {
        GuardDecision::Allow
    }
}

/// Outcome of a navigation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub location: Location,
    pub route: Option<&'static Route>,
    pub params: Vec<(String, String)>,
    /// True when the final location differs from the one requested
    pub redirected: bool,
}

impl Navigation {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct RouterState {
    current: Location,
    title: Option<String>,
    history: Vec<Location>,
}

#[derive(Debug)]
pub struct Router {
    session: Arc<SessionStore>,
    state: RwLock<RouterState>,
}

impl Router {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            state: RwLock::new(RouterState {
                current: Location::parse("/"),
                ..Default::default()
            }),
        }
    }

    /// Navigate and push the result onto the history
    pub fn navigate(&self, target: &str) -> Navigation {
        let (navigation, title) = self.resolve(target);
        let mut state = self.state.write();
        let previous = std::mem::replace(&mut state.current, navigation.location.clone());
        state.history.push(previous);
        if title.is_some() {
            state.title = title;
        }
        navigation
    }

    /// Navigate without growing the history
    pub fn replace(&self, target: &str) -> Navigation {
        let (navigation, title) = self.resolve(target);
        let mut state = self.state.write();
        state.current = navigation.location.clone();
        if title.is_some() {
            state.title = title;
        }
        navigation
    }

    /// Go back one entry; the guard runs again on the way.
    pub fn back(&self) -> Option<Navigation> {
        let previous = self.state.write().history.pop()?;
        Some(self.replace(&previous.full_path()))
    }

    pub fn current(&self) -> Location {
        self.state.read().current.clone()
    }

    pub fn title(&self) -> Option<String> {
        self.state.read().title.clone()
    }

    /// Where to go after a successful login: the recorded destination if it
    /// is a local path, the home view otherwise.
    pub fn post_login_target(&self) -> String {
        self.state
            .read()
            .current
            .query_value(REDIRECT_PARAM)
            .filter(|target| target.starts_with('/') && !target.starts_with("//"))
            .unwrap_or(HOME_VIEW)
            .to_string()
    }

    fn resolve(&self, target: &str) -> (Navigation, Option<String>) {
        let requested = Location::parse(target);
        let mut location = requested.clone();
        let mut title = None;

        for _ in 0..MAX_REDIRECTS {
            let matched = match_route(&location.path);

            if let Some((route, _)) = &matched {
                if let Some(to) = route.redirect {
                    debug!(from = %location, to, "Following static redirect");
                    location = Location::parse(to);
                    continue;
                }
                if let Some(t) = route.meta.title {
                    title = Some(t.to_string());
                }
            }

            let meta = matched.as_ref().map(|(route, _)| &route.meta);
            match guard(&location, meta, self.session.is_logged_in()) {
                GuardDecision::Allow => {
                    let (route, params) = match matched {
                        Some((route, params)) => (Some(route), params),
                        None => (None, Vec::new()),
                    };
                    let redirected = location != requested;
                    return (
                        Navigation {
                            location,
                            route,
                            params,
                            redirected,
                        },
                        title,
                    );
                }
                GuardDecision::Redirect(next) => {
                    info!(from = %location, to = %next, "Navigation redirected by guard");
                    location = next;
                }
            }
        }

        warn!(requested = %target, "Too many redirects, staying on last location");
        (
            Navigation {
                redirected: location != requested,
                location,
                route: None,
                params: Vec::new(),
            },
            title,
        )
    }
}
