// ==============================================================================
// state.rs - Application State Management
// ==============================================================================
// Description: Shared state for the gateway: status database, Redis client
//              and the order submission rate limiter
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use cg_core::config::resolve_database_url;
use cg_core::store::Store;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use redis::Client as RedisClient;
use sqlx::postgres::PgPoolOptions;
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_ORDERS_PER_MINUTE: u32 = 30;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Store,

    /// Redis client for the upload queue and progress channels
    redis_client: RedisClient,

    /// Shared by every caller of order submission
    order_limiter: DefaultDirectRateLimiter,
}

/// Limiter allowing `per_minute` submissions, all of which may burst
pub fn order_limiter(per_minute: u32) -> DefaultDirectRateLimiter {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_minute(per_minute))
}

impl AppState {
    /// Create new application state from environment
    pub async fn new() -> Result<Self> {
        let database_url = resolve_database_url(std::env::var("DATABASE_URL").ok())
            .context("DATABASE_URL must be set")?;

        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let redis_client = RedisClient::open(redis_url).context("Failed to create Redis client")?;

        let mut conn = redis_client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis PING failed")?;

        let per_minute = match std::env::var("ORDER_RATE_PER_MINUTE") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("ORDER_RATE_PER_MINUTE must be a number, got {:?}", raw))?,
            Err(_) => DEFAULT_ORDERS_PER_MINUTE,
        };

        Ok(Self::from_parts(Store::from_pool(db_pool), redis_client, per_minute))
    }

    pub fn from_parts(store: Store, redis_client: RedisClient, orders_per_minute: u32) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                redis_client,
                order_limiter: order_limiter(orders_per_minute),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn redis_client(&self) -> &RedisClient {
        &self.inner.redis_client
    }

    /// False when the order submission quota is used up
    pub fn allow_order(&self) -> bool {
        self.inner.order_limiter.check().is_ok()
    }

    /// State whose database and Redis connections are opened on first use
    #[cfg(test)]
    pub fn lazy(orders_per_minute: u32) -> Self {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://cg@localhost/cg")
            .expect("lazy pool");
        let redis_client = RedisClient::open("redis://127.0.0.1:6379").expect("redis url");
        Self::from_parts(Store::from_pool(pool), redis_client, orders_per_minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_limiter_exhausts_quota() {
        let limiter = order_limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_zero_rate_still_allows_one() {
        let limiter = order_limiter(0);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[tokio::test]
    async fn test_state_shares_limiter_between_clones() {
        let state = AppState::lazy(1);
        let clone = state.clone();
        assert!(state.allow_order());
        assert!(!clone.allow_order());
    }
}
