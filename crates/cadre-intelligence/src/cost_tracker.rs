//! Daily spend tracking against the `spending_limit` / `cost_alert` policies.

use cadre_core::store::Store;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetCheck {
    Ok,
    Denied { threshold_usd: f64, spent_usd: f64 },
}

/// Reads today's total spend (from midnight UTC) and compares it against a
/// configured daily limit. Does not hold state itself — every call reads
/// through to `model_usage`, keeping this safe to share across processes.
pub struct SpendTracker<'a> {
    store: &'a Store,
}

impl<'a> SpendTracker<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub async fn spend_today(&self) -> Result<f64, cadre_core::CoreError> {
        let midnight = start_of_day(Utc::now());
        self.store.spend_since(midnight).await
    }

    pub async fn check_daily_limit(
        &self,
        daily_limit_usd: f64,
    ) -> Result<BudgetCheck, cadre_core::CoreError> {
        let spent = self.spend_today().await?;
        if spent >= daily_limit_usd {
            Ok(BudgetCheck::Denied {
                threshold_usd: daily_limit_usd,
                spent_usd: spent,
            })
        } else {
            Ok(BudgetCheck::Ok)
        }
    }

    /// Today's spend broken down by tier — the `!costs` bridge command.
    pub async fn tier_breakdown_today(&self) -> Result<Vec<(String, f64)>, cadre_core::CoreError> {
        let midnight = start_of_day(Utc::now());
        self.store.spend_by_tier_since(midnight).await
    }

    /// Returns true once spend crosses `alert_threshold_pct` of the daily
    /// limit — used by the scheduler's cost-alert job (§4.10).
    pub async fn crossed_alert_threshold(
        &self,
        daily_limit_usd: f64,
        alert_threshold_pct: f64,
    ) -> Result<bool, cadre_core::CoreError> {
        let spent = self.spend_today().await?;
        Ok(spent >= daily_limit_usd * alert_threshold_pct)
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::types::{ModelTier, ModelUsage};
    use uuid::Uuid;

    #[tokio::test]
    async fn check_daily_limit_flags_overspend() {
        let store = Store::new_in_memory().await.unwrap();
        store
            .record_model_usage(&ModelUsage {
                id: Uuid::new_v4(),
                agent_id: None,
                step_id: None,
                model_name: "t1".into(),
                tier: ModelTier::T1,
                input_tokens: 1000,
                output_tokens: 1000,
                estimated_cost: 60.0,
                latency_ms: 100,
                success: true,
                error: None,
                metadata: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let tracker = SpendTracker::new(&store);
        let check = tracker.check_daily_limit(50.0).await.unwrap();
        assert_eq!(
            check,
            BudgetCheck::Denied {
                threshold_usd: 50.0,
                spent_usd: 60.0
            }
        );
    }

    #[tokio::test]
    async fn crossed_alert_threshold_respects_percentage() {
        let store = Store::new_in_memory().await.unwrap();
        store
            .record_model_usage(&ModelUsage {
                id: Uuid::new_v4(),
                agent_id: None,
                step_id: None,
                model_name: "t1".into(),
                tier: ModelTier::T1,
                input_tokens: 0,
                output_tokens: 0,
                estimated_cost: 41.0,
                latency_ms: 10,
                success: true,
                error: None,
                metadata: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let tracker = SpendTracker::new(&store);
        assert!(tracker.crossed_alert_threshold(50.0, 0.8).await.unwrap());
        assert!(!tracker.crossed_alert_threshold(100.0, 0.8).await.unwrap());
    }
}
