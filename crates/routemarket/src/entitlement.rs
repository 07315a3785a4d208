// Entitlement evaluation: may this caller obtain this route's content?
//
// Pure read. Subscription state comes from the subscription table, not the
// status cached on the user row.

use serde::Serialize;

use routemarket_core::db::models::AccessType;
use routemarket_core::error::{ErrorCode, MarketError, Result};

use crate::accounts::UserRef;
use crate::store::MarketStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantReason {
    Purchased,
    Subscribed,
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Entitlement {
    /// Free route; content is unlocked through email capture.
    FreeGate,
    Granted(GrantReason),
    Denied,
}

impl Entitlement {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Decide access for `user` (anonymous when `None`) to `route_id`.
pub async fn evaluate(store: &MarketStore, user: Option<&UserRef>, route_id: &str) -> Result<Entitlement> {
    let repo = store.repo();
    let route = repo
        .find_route(route_id)
        .await?
        .filter(|r| r.is_published)
        .ok_or(MarketError::NotFound(ErrorCode::RouteNotFound))?;

    if route.access_type == AccessType::Free {
        return Ok(Entitlement::FreeGate);
    }

    let Some(user) = user else {
        return Ok(Entitlement::Denied);
    };

    if repo.find_purchase(&user.id, &route.id).await?.is_some() {
        return Ok(Entitlement::Granted(GrantReason::Purchased));
    }

    if route.access_type == AccessType::Premium {
        if repo.latest_active_subscription_for_user(&user.id).await?.is_some() {
            return Ok(Entitlement::Granted(GrantReason::Subscribed));
        }
    }

    Ok(Entitlement::Denied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        assert_eq!(
            serde_json::to_value(Entitlement::Granted(GrantReason::Purchased)).unwrap(),
            serde_json::json!({"decision": "GRANTED", "reason": "PURCHASED"})
        );
        assert_eq!(
            serde_json::to_value(Entitlement::FreeGate).unwrap(),
            serde_json::json!({"decision": "FREE_GATE"})
        );
    }
}
