//! Repository events and trigger evaluation

use crate::core::config::TriggerConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of repository event delivered by the CI provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Direct push to a branch
    Push,
    /// Pull request (branch is the PR's target branch)
    PullRequest,
    /// Tag push
    Tag,
    /// Scheduled run
    Schedule,
    /// Manually dispatched run
    Manual,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Tag => "tag",
            EventKind::Schedule => "schedule",
            EventKind::Manual => "manual",
        };
        f.write_str(name)
    }
}

impl EventKind {
    /// Parse the `Display` form
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "push" => Some(EventKind::Push),
            "pull_request" => Some(EventKind::PullRequest),
            "tag" => Some(EventKind::Tag),
            "schedule" => Some(EventKind::Schedule),
            "manual" => Some(EventKind::Manual),
            _ => None,
        }
    }
}

/// Errors reading an event from the provider environment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("environment variable {0} is not set")]
    MissingVariable(&'static str),

    #[error("unsupported event name '{0}'")]
    UnknownEvent(String),
}

/// Event metadata used for trigger evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEvent {
    /// Event type
    pub kind: EventKind,

    /// Pushed branch, or target branch for pull requests
    pub branch: String,
}

impl RepositoryEvent {
    pub fn new(kind: EventKind, branch: impl Into<String>) -> Self {
        Self {
            kind,
            branch: normalize_branch(&branch.into()),
        }
    }

    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(EventKind::Push, branch)
    }

    pub fn pull_request(target_branch: impl Into<String>) -> Self {
        Self::new(EventKind::PullRequest, target_branch)
    }

    /// Build an event from GitHub-style provider variables
    ///
    /// Reads `GITHUB_EVENT_NAME`; pull requests take their branch from
    /// `GITHUB_BASE_REF`, everything else from `GITHUB_REF_NAME` or `GITHUB_REF`.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, TriggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup("GITHUB_EVENT_NAME")
            .ok_or(TriggerError::MissingVariable("GITHUB_EVENT_NAME"))?;

        let kind = match name.as_str() {
            "push" => EventKind::Push,
            "pull_request" | "pull_request_target" => EventKind::PullRequest,
            "schedule" => EventKind::Schedule,
            "workflow_dispatch" | "repository_dispatch" => EventKind::Manual,
            "create" | "release" => EventKind::Tag,
            other => return Err(TriggerError::UnknownEvent(other.to_string())),
        };

        let branch = if kind == EventKind::PullRequest {
            lookup("GITHUB_BASE_REF").ok_or(TriggerError::MissingVariable("GITHUB_BASE_REF"))?
        } else {
            lookup("GITHUB_REF_NAME")
                .or_else(|| lookup("GITHUB_REF"))
                .ok_or(TriggerError::MissingVariable("GITHUB_REF"))?
        };

        // Tag refs on a push event are tag events
        let kind = if kind == EventKind::Push && branch.starts_with("refs/tags/") {
            EventKind::Tag
        } else {
            kind
        };

        Ok(Self::new(kind, branch))
    }

    /// Build an event from the process environment
    pub fn from_env() -> Result<Self, TriggerError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }
}

fn normalize_branch(branch: &str) -> String {
    branch
        .strip_prefix("refs/heads/")
        .or_else(|| branch.strip_prefix("refs/tags/"))
        .unwrap_or(branch)
        .to_string()
}

/// A branch filter: exact name or glob
#[derive(Debug, Clone)]
pub enum BranchFilter {
    Exact(String),
    Glob(Regex),
}

impl BranchFilter {
    /// Parse a filter; `*` matches inside one path segment, `**` across segments
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        if !pattern.contains(['*', '?']) {
            return Ok(BranchFilter::Exact(pattern.to_string()));
        }

        let mut source = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    source.push_str(".*");
                }
                '*' => source.push_str("[^/]*"),
                '?' => source.push_str("[^/]"),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        Ok(BranchFilter::Glob(Regex::new(&source)?))
    }

    pub fn matches(&self, branch: &str) -> bool {
        match self {
            BranchFilter::Exact(name) => name == branch,
            BranchFilter::Glob(regex) => regex.is_match(branch),
        }
    }
}

/// Trigger conditions of a pipeline
///
/// An event kind without filters never triggers the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    pub push: Option<Vec<BranchFilter>>,
    pub pull_request: Option<Vec<BranchFilter>>,
}

impl Trigger {
    /// Pushes to `branch` and pull requests targeting `branch`
    pub fn on_branch(branch: &str) -> Self {
        Self {
            push: Some(vec![BranchFilter::Exact(branch.to_string())]),
            pull_request: Some(vec![BranchFilter::Exact(branch.to_string())]),
        }
    }

    /// Build from config; a filter that fails to compile falls back to an exact match
    pub fn from_config(config: &TriggerConfig) -> Self {
        let compile = |branches: &Vec<String>| -> Vec<BranchFilter> {
            branches
                .iter()
                .map(|b| BranchFilter::parse(b).unwrap_or_else(|_| BranchFilter::Exact(b.clone())))
                .collect()
        };

        Self {
            push: config.push.as_ref().map(|p| compile(&p.branches)),
            pull_request: config.pull_request.as_ref().map(|p| compile(&p.branches)),
        }
    }

    /// Decide whether an event runs the pipeline
    pub fn should_run(&self, event: &RepositoryEvent) -> bool {
        let filters = match event.kind {
            EventKind::Push => self.push.as_ref(),
            EventKind::PullRequest => self.pull_request.as_ref(),
            EventKind::Tag | EventKind::Schedule | EventKind::Manual => None,
        };

        filters.is_some_and(|filters| filters.iter().any(|f| f.matches(&event.branch)))
    }
}
