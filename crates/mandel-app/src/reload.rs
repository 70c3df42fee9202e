// SPDX-License-Identifier: CEPL-1.0

//! Polls a fragment program file for changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct ShaderWatch {
    path: PathBuf,
    seen: Option<SystemTime>,
    next_poll: Instant,
}

impl ShaderWatch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ShaderWatch {
            path: path.into(),
            seen: None,
            next_poll: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_poll(&self) -> Instant {
        self.next_poll
    }

    /// Source text if the file changed since the last successful read.
    /// The first call always reads.
    pub fn poll(&mut self) -> Result<Option<String>> {
        self.next_poll = Instant::now() + POLL_INTERVAL;
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .with_context(|| format!("stat {}", self.path.display()))?;
        if self.seen == Some(modified) {
            return Ok(None);
        }
        let source = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        self.seen = Some(modified);
        Ok(Some(source))
    }

    /// Forces the next `poll` to re-read.
    pub fn invalidate(&mut self) {
        self.seen = None;
        self.next_poll = Instant::now();
    }
}
