//! Latency classifier
//!
//! Infers whether a refresh-token call was answered from a cache or went all
//! the way to the auth service, purely from its latency. The cut-offs belong
//! to a [`CacheProfile`] so each gateway variant can carry its own.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A latency limit, either exclusive or inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    Below(Duration),
    AtMost(Duration),
}

impl Cutoff {
    pub fn admits(&self, latency: Duration) -> bool {
        match *self {
            Cutoff::Below(limit) => latency < limit,
            Cutoff::AtMost(limit) => latency <= limit,
        }
    }
}

/// Latency cut-offs for one gateway variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheProfile {
    /// Calls within this limit are treated as cache hits
    pub cache_hit: Option<Cutoff>,
    /// Calls faster than this (but not hits) are healthy auth calls
    pub healthy_below: Duration,
    /// Whether the hit-rate metric is fed
    pub tracks_hit_rate: bool,
    /// Hit cut-off for the repeat calls of the same refresh token
    pub repeat_hit_below: Option<Duration>,
    /// Whether the repeat sequence gets a cache-effect grade
    pub grades_cache_effect: bool,
}

impl CacheProfile {
    /// Gateway backed by its own session cache
    ///
    /// Anything up to 500 ms counts as a hit; only slower calls reached the
    /// auth service.
    pub fn complex() -> Self {
        Self {
            cache_hit: Some(Cutoff::AtMost(Duration::from_millis(500))),
            healthy_below: Duration::from_millis(500),
            tracks_hit_rate: true,
            repeat_hit_below: None,
            grades_cache_effect: false,
        }
    }

    /// Gateway with a Redis token cache
    pub fn redis() -> Self {
        Self {
            cache_hit: Some(Cutoff::Below(Duration::from_millis(100))),
            healthy_below: Duration::from_millis(200),
            tracks_hit_rate: true,
            repeat_hit_below: Some(Duration::from_millis(100)),
            grades_cache_effect: true,
        }
    }

    /// Gateway without any cache
    pub fn simple() -> Self {
        Self {
            cache_hit: None,
            healthy_below: Duration::from_millis(200),
            tracks_hit_rate: false,
            repeat_hit_below: None,
            grades_cache_effect: false,
        }
    }

    /// Classifies a single refresh-token call
    pub fn classify(&self, latency: Duration) -> Classification {
        let class = match self.cache_hit {
            Some(cutoff) if cutoff.admits(latency) => LatencyClass::CacheHit,
            _ if latency < self.healthy_below => LatencyClass::AuthCall,
            _ => LatencyClass::Slow,
        };
        self.classification(class)
    }

    /// Classifies call `index` (0-based) of a same-token repeat sequence
    ///
    /// The first call always misses; later calls hit only under
    /// `repeat_hit_below`.
    pub fn classify_repeat(&self, index: usize, latency: Duration) -> Classification {
        let class = match self.repeat_hit_below {
            Some(limit) if index > 0 && latency < limit => LatencyClass::CacheHit,
            _ if latency < self.healthy_below => LatencyClass::AuthCall,
            _ => LatencyClass::Slow,
        };
        self.classification(class)
    }

    fn classification(&self, class: LatencyClass) -> Classification {
        let hit = class == LatencyClass::CacheHit;
        Classification {
            class,
            auth_call: !hit,
            cache_hit: self.tracks_hit_rate.then_some(hit),
        }
    }

    /// Compares the repeat calls against the first one
    pub fn cache_effect(&self, latencies: [Duration; 3]) -> CacheEffect {
        let [first, second, third] = latencies.map(|d| d.as_secs_f64() * 1000.0);

        let improvement = |later: f64| {
            if first > 0.0 {
                (first - later) / first * 100.0
            } else {
                0.0
            }
        };

        let grade = self.grades_cache_effect.then(|| {
            if second < first * 0.5 && third < first * 0.5 {
                CacheGrade::Strong
            } else if second < first * 0.8 && third < first * 0.8 {
                CacheGrade::Moderate
            } else {
                CacheGrade::Negligible
            }
        });

        CacheEffect {
            second_improvement_pct: improvement(second),
            third_improvement_pct: improvement(third),
            grade,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LatencyClass {
    CacheHit,
    AuthCall,
    Slow,
}

impl fmt::Display for LatencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyClass::CacheHit => f.write_str("cache hit"),
            LatencyClass::AuthCall => f.write_str("auth service call"),
            LatencyClass::Slow => f.write_str("slow"),
        }
    }
}

/// What a call's latency says about it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: LatencyClass,
    /// Counted against `auth_service_calls`
    pub auth_call: bool,
    /// Sample for the hit-rate metric, when the profile tracks one
    pub cache_hit: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheGrade {
    Strong,
    Moderate,
    Negligible,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEffect {
    pub second_improvement_pct: f64,
    pub third_improvement_pct: f64,
    pub grade: Option<CacheGrade>,
}
