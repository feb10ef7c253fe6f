//! Rate limiting
//!
//! Token buckets gate incoming tool calls: one global bucket plus one per
//! tool name. Exhaustion yields `RateLimited` with a retry-after duration.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::error::{CoreError, Result};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    burst: f64,
    rps: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rps: f64, burst: f64) -> Self {
        Self {
            tokens: burst,
            burst,
            rps,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self, now: Instant) -> std::result::Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rps).min(self.burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.rps.max(f64::MIN_POSITIVE)))
        }
    }
}

pub struct RateLimiter {
    enabled: bool,
    global: Mutex<Bucket>,
    tools: Mutex<HashMap<String, Bucket>>,
    tool_configs: HashMap<String, (f64, f64)>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let tool_configs = config
            .tools
            .iter()
            .map(|t| (t.name.clone(), (t.rps, t.burst)))
            .collect();
        Self {
            enabled: config.enabled,
            global: Mutex::new(Bucket::new(config.global.rps, config.global.burst)),
            tools: Mutex::new(HashMap::new()),
            tool_configs,
        }
    }

    /// A limiter that admits everything
    pub fn disabled() -> Self {
        Self::new(&RateLimitConfig::default())
    }

    /// Take one token from the global bucket and, when configured, the
    /// per-tool bucket. The global bucket is checked first so a flooded tool
    /// cannot mask global exhaustion.
    pub fn check(&self, tool: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let now = Instant::now();

        {
            let mut global = self
                .global
                .lock()
                .map_err(|_| CoreError::Internal("rate limiter lock poisoned".to_string()))?;
            if let Err(retry_after) = global.try_acquire(now) {
                return Err(CoreError::RateLimited {
                    limit_type: "global".to_string(),
                    retry_after_ms: retry_after.as_millis() as u64,
                });
            }
        }

        if let Some((rps, burst)) = self.tool_configs.get(tool) {
            let mut tools = self
                .tools
                .lock()
                .map_err(|_| CoreError::Internal("rate limiter lock poisoned".to_string()))?;
            let bucket = tools
                .entry(tool.to_string())
                .or_insert_with(|| Bucket::new(*rps, *burst));
            if let Err(retry_after) = bucket.try_acquire(now) {
                return Err(CoreError::RateLimited {
                    limit_type: format!("tool:{tool}"),
                    retry_after_ms: retry_after.as_millis() as u64,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BucketConfig, ToolBucketConfig};

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let limiter = RateLimiter::disabled();
        for _ in 0..10_000 {
            assert!(limiter.check("anything").is_ok());
        }
    }

    #[test]
    fn test_global_bucket_exhausts() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            global: BucketConfig {
                rps: 1.0,
                burst: 3.0,
            },
            tools: vec![],
        });
        assert!(limiter.check("x").is_ok());
        assert!(limiter.check("x").is_ok());
        assert!(limiter.check("x").is_ok());
        let err = limiter.check("x").unwrap_err();
        match err {
            CoreError::RateLimited {
                limit_type,
                retry_after_ms,
            } => {
                assert_eq!(limit_type, "global");
                assert!(retry_after_ms > 0);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_bucket_is_independent() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            global: BucketConfig {
                rps: 1000.0,
                burst: 1000.0,
            },
            tools: vec![ToolBucketConfig {
                name: "search".to_string(),
                rps: 1.0,
                burst: 1.0,
            }],
        });
        assert!(limiter.check("search").is_ok());
        let err = limiter.check("search").unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { ref limit_type, .. } if limit_type == "tool:search"));
        // Other tools only pay the global bucket
        assert!(limiter.check("stats").is_ok());
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let mut bucket = Bucket::new(10.0, 1.0);
        let start = Instant::now();
        assert!(bucket.try_acquire(start).is_ok());
        assert!(bucket.try_acquire(start).is_err());
        // 200ms at 10 rps refills 2 tokens, capped at burst 1
        assert!(bucket.try_acquire(start + Duration::from_millis(200)).is_ok());
    }
}
