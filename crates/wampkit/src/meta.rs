//! Router meta API: introspection of the realm's subscriptions and
//! registrations through the `wamp.subscription.*` and
//! `wamp.registration.*` procedures.
//!
//! Id listings are capped at [`MAX_META_COLLECTION_SIZE`] entries. A
//! longer listing is truncated, logged at warn level and flagged through
//! [`Listing::truncated`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wampkit_protocol::{RegistrationId, SessionId, SubscriptionId};

use crate::{Client, WampError};

/// Upper bound on the number of ids kept from one meta listing.
pub const MAX_META_COLLECTION_SIZE: usize = 100;

/// A capped list of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    /// `true` if the router returned more than
    /// [`MAX_META_COLLECTION_SIZE`] items and the rest were dropped.
    pub truncated: bool,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            truncated: false,
        }
    }
}

impl<T> Listing<T> {
    fn capped(procedure: &str, mut items: Vec<T>) -> Self {
        let truncated = items.len() > MAX_META_COLLECTION_SIZE;
        if truncated {
            tracing::warn!(
                %procedure,
                total = items.len(),
                kept = MAX_META_COLLECTION_SIZE,
                "meta listing truncated"
            );
            items.truncate(MAX_META_COLLECTION_SIZE);
        }
        Self { items, truncated }
    }
}

/// Ids grouped by match policy, as returned by `wamp.*.list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchListing<T> {
    pub exact: Listing<T>,
    pub prefix: Listing<T>,
    pub wildcard: Listing<T>,
}

#[derive(Deserialize)]
struct RawMatchListing<T> {
    #[serde(default = "Vec::new")]
    exact: Vec<T>,
    #[serde(default = "Vec::new")]
    prefix: Vec<T>,
    #[serde(default = "Vec::new")]
    wildcard: Vec<T>,
}

/// Details of one subscription or registration (`wamp.*.get`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingInfo {
    pub id: u64,
    #[serde(default)]
    pub created: Option<String>,
    pub uri: String,
    #[serde(rename = "match", default)]
    pub match_policy: Option<String>,
    /// Registrations only.
    #[serde(default)]
    pub invoke: Option<String>,
}

impl Client {
    async fn meta_call<T: DeserializeOwned>(
        &self,
        procedure: &str,
        args: Vec<Value>,
    ) -> Result<T, WampError> {
        let result = self.call(procedure).args(args).send().await?;
        serde_json::from_value(result.into_value()).map_err(|e| {
            WampError::UnexpectedResult {
                procedure: procedure.to_string(),
                detail: e.to_string(),
            }
        })
    }

    async fn meta_listing<T: DeserializeOwned>(
        &self,
        procedure: &str,
        args: Vec<Value>,
    ) -> Result<Listing<T>, WampError> {
        let items: Option<Vec<T>> = self.meta_call(procedure, args).await?;
        Ok(Listing::capped(procedure, items.unwrap_or_default()))
    }

    async fn meta_match_listing<T: DeserializeOwned>(
        &self,
        procedure: &str,
    ) -> Result<MatchListing<T>, WampError> {
        let raw: RawMatchListing<T> = self.meta_call(procedure, Vec::new()).await?;
        Ok(MatchListing {
            exact: Listing::capped(procedure, raw.exact),
            prefix: Listing::capped(procedure, raw.prefix),
            wildcard: Listing::capped(procedure, raw.wildcard),
        })
    }

    // -- Subscriptions ------------------------------------------------------

    /// `wamp.subscription.get`
    pub async fn get_subscription_info(
        &self,
        subscription: SubscriptionId,
    ) -> Result<BindingInfo, WampError> {
        self.meta_call("wamp.subscription.get", vec![subscription.0.into()])
            .await
    }

    /// `wamp.subscription.list`
    pub async fn get_subscription_list(
        &self,
    ) -> Result<MatchListing<SubscriptionId>, WampError> {
        self.meta_match_listing("wamp.subscription.list").await
    }

    /// `wamp.subscription.lookup`: the subscription for exactly `topic`.
    pub async fn get_subscription_lookup(
        &self,
        topic: &str,
    ) -> Result<Option<SubscriptionId>, WampError> {
        self.meta_call("wamp.subscription.lookup", vec![topic.into()])
            .await
    }

    /// `wamp.subscription.match`: every subscription that would receive an
    /// event published to `topic`.
    pub async fn get_subscription_match(
        &self,
        topic: &str,
    ) -> Result<Listing<SubscriptionId>, WampError> {
        self.meta_listing("wamp.subscription.match", vec![topic.into()])
            .await
    }

    /// `wamp.subscription.list_subscribers`
    pub async fn list_subscribers(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Listing<SessionId>, WampError> {
        self.meta_listing(
            "wamp.subscription.list_subscribers",
            vec![subscription.0.into()],
        )
        .await
    }

    /// `wamp.subscription.count_subscribers`
    pub async fn count_subscribers(
        &self,
        subscription: SubscriptionId,
    ) -> Result<u64, WampError> {
        self.meta_call(
            "wamp.subscription.count_subscribers",
            vec![subscription.0.into()],
        )
        .await
    }

    // -- Registrations ------------------------------------------------------

    /// `wamp.registration.list`
    pub async fn get_registration_list(
        &self,
    ) -> Result<MatchListing<RegistrationId>, WampError> {
        self.meta_match_listing("wamp.registration.list").await
    }

    /// `wamp.registration.lookup`
    pub async fn get_registration_lookup(
        &self,
        procedure: &str,
    ) -> Result<Option<RegistrationId>, WampError> {
        self.meta_call("wamp.registration.lookup", vec![procedure.into()])
            .await
    }

    /// `wamp.registration.match`: the registration a call to `procedure`
    /// would be routed to.
    pub async fn get_registration_match(
        &self,
        procedure: &str,
    ) -> Result<Option<RegistrationId>, WampError> {
        self.meta_call("wamp.registration.match", vec![procedure.into()])
            .await
    }

    /// `wamp.registration.get`
    pub async fn get_registration(
        &self,
        registration: RegistrationId,
    ) -> Result<BindingInfo, WampError> {
        self.meta_call("wamp.registration.get", vec![registration.0.into()])
            .await
    }

    /// `wamp.registration.list_callees`
    pub async fn list_callees(
        &self,
        registration: RegistrationId,
    ) -> Result<Listing<SessionId>, WampError> {
        self.meta_listing(
            "wamp.registration.list_callees",
            vec![registration.0.into()],
        )
        .await
    }

    /// `wamp.registration.count_callees`
    pub async fn count_callees(
        &self,
        registration: RegistrationId,
    ) -> Result<u64, WampError> {
        self.meta_call(
            "wamp.registration.count_callees",
            vec![registration.0.into()],
        )
        .await
    }
}
