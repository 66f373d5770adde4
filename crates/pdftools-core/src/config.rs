//! Engine configuration
//!
//! Size limits are per operation. The two deployment contexts ship with
//! different defaults: the network server accepts larger uploads than an
//! embedding host that keeps everything in memory.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::budget::JobBudget;
use crate::split::DEFAULT_MAX_PARTITIONS;

const MIB: u64 = 1024 * 1024;
pub const SERVER_SIZE_LIMIT: u64 = 50 * MIB;
pub const EMBEDDED_SIZE_LIMIT: u64 = 10 * MIB;
pub const DEFAULT_MAX_JOB_PAGES: usize = 5000;
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Merge,
    Split,
    Compress,
    Info,
    Validate,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Merge => "merge",
            Operation::Split => "split",
            Operation::Compress => "compress",
            Operation::Info => "info",
            Operation::Validate => "validate",
        }
    }
}

/// Maximum accepted upload size in bytes, per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeLimits {
    pub merge: u64,
    pub split: u64,
    pub compress: u64,
    pub info: u64,
    pub validate: u64,
}

impl SizeLimits {
    pub fn uniform(limit: u64) -> Self {
        Self {
            merge: limit,
            split: limit,
            compress: limit,
            info: limit,
            validate: limit,
        }
    }

    pub fn for_operation(&self, operation: Operation) -> u64 {
        match operation {
            Operation::Merge => self.merge,
            Operation::Split => self.split,
            Operation::Compress => self.compress,
            Operation::Info => self.info,
            Operation::Validate => self.validate,
        }
    }
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self::uniform(SERVER_SIZE_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: SizeLimits,
    pub max_partitions: usize,
    /// Page ceiling per job; 0 disables it.
    pub max_job_pages: usize,
    /// Wall-clock limit per job; 0 disables it.
    pub job_timeout_ms: u64,
}

impl EngineConfig {
    /// Defaults for the standalone network server.
    pub fn server() -> Self {
        Self::default()
    }

    /// Defaults for hosts embedding the engine in-process.
    pub fn embedded() -> Self {
        Self {
            limits: SizeLimits::uniform(EMBEDDED_SIZE_LIMIT),
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, limits: SizeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_ms > 0).then(|| Duration::from_millis(self.job_timeout_ms))
    }

    /// A fresh budget for one job.
    pub fn budget(&self) -> JobBudget {
        let max_pages = (self.max_job_pages > 0).then_some(self.max_job_pages);
        JobBudget::new(self.job_timeout(), max_pages)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: SizeLimits::default(),
            max_partitions: DEFAULT_MAX_PARTITIONS,
            max_job_pages: DEFAULT_MAX_JOB_PAGES,
            job_timeout_ms: DEFAULT_JOB_TIMEOUT_MS,
        }
    }
}
