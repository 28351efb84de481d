//! Registry: local binding names ↔ router-assigned ids.
//!
//! The id maps hold each record with its handler and answer "which
//! handler runs for INVOCATION on registration 7?"; the name maps answer
//! "what did the router give us for `add`?". Both directions are updated
//! together.

use std::collections::{BTreeMap, HashMap};

use wampkit_protocol::{InvocationPolicy, RegistrationId, SubscriptionId};

use crate::binding::{ProcedureHandler, TopicHandler};
use crate::SessionError;

/// A live registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub procedure: String,
    pub registration_id: RegistrationId,
    pub policy: InvocationPolicy,
}

/// A live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub handler_name: String,
    pub subscription_id: SubscriptionId,
    pub topic: String,
}

/// What [`Registry::remove`] took out, so the caller knows which
/// UNREGISTER or UNSUBSCRIBE to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removed {
    Registration(RegistrationRecord),
    /// `last` is false while another handler name still uses the same
    /// subscription id; no UNSUBSCRIBE should be sent in that case.
    Subscription { record: SubscriptionRecord, last: bool },
}

struct Procedure {
    record: RegistrationRecord,
    handler: ProcedureHandler,
}

struct Subscriber {
    record: SubscriptionRecord,
    handler: TopicHandler,
}

/// The id maps own the records and their handlers; the name maps index
/// into them.
#[derive(Default)]
pub struct Registry {
    procedures: HashMap<RegistrationId, Procedure>,
    registration_names: HashMap<String, RegistrationId>,
    topics: HashMap<SubscriptionId, Vec<Subscriber>>,
    subscription_names: HashMap<String, SubscriptionId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_procedure(
        &mut self,
        name: impl Into<String>,
        policy: InvocationPolicy,
        registration_id: RegistrationId,
        handler: ProcedureHandler,
    ) {
        let name = name.into();
        self.registration_names.insert(name.clone(), registration_id);
        self.procedures.insert(
            registration_id,
            Procedure {
                record: RegistrationRecord {
                    procedure: name,
                    registration_id,
                    policy,
                },
                handler,
            },
        );
    }

    pub fn add_topic(
        &mut self,
        name: impl Into<String>,
        topic: impl Into<String>,
        subscription_id: SubscriptionId,
        handler: TopicHandler,
    ) {
        let name = name.into();
        self.subscription_names.insert(name.clone(), subscription_id);
        self.topics.entry(subscription_id).or_default().push(Subscriber {
            record: SubscriptionRecord {
                handler_name: name,
                subscription_id,
                topic: topic.into(),
            },
            handler,
        });
    }

    /// The handler for an INVOCATION.
    ///
    /// # Errors
    /// `UnknownRegistration` if this client never registered `id`.
    pub fn resolve_registration_id(
        &self,
        id: RegistrationId,
    ) -> Result<ProcedureHandler, SessionError> {
        self.procedures
            .get(&id)
            .map(|p| p.handler.clone())
            .ok_or(SessionError::UnknownRegistration(id))
    }

    /// The handlers for an EVENT. Several handler names subscribed to
    /// the same topic share one subscription id.
    ///
    /// # Errors
    /// `UnknownSubscription` if this client never subscribed `id`.
    pub fn resolve_subscription_id(
        &self,
        id: SubscriptionId,
    ) -> Result<Vec<TopicHandler>, SessionError> {
        self.topics
            .get(&id)
            .map(|subs| subs.iter().map(|s| s.handler.clone()).collect())
            .ok_or(SessionError::UnknownSubscription(id))
    }

    pub fn registration(&self, id: RegistrationId) -> Option<&RegistrationRecord> {
        self.procedures.get(&id).map(|p| &p.record)
    }

    /// Every record sharing subscription `id`, in subscription order.
    pub fn subscription(&self, id: SubscriptionId) -> Vec<&SubscriptionRecord> {
        self.topics
            .get(&id)
            .map(|subs| subs.iter().map(|s| &s.record).collect())
            .unwrap_or_default()
    }

    /// Removes the registration or subscription named `name`, both
    /// directions at once.
    pub fn remove(&mut self, name: &str) -> Option<Removed> {
        if let Some(id) = self.registration_names.remove(name) {
            return self
                .procedures
                .remove(&id)
                .map(|p| Removed::Registration(p.record));
        }
        let id = self.subscription_names.remove(name)?;
        let subs = self.topics.get_mut(&id)?;
        let index = subs.iter().position(|s| s.record.handler_name == name)?;
        let record = subs.remove(index).record;
        let last = subs.is_empty();
        if last {
            self.topics.remove(&id);
        }
        Some(Removed::Subscription { record, last })
    }

    /// `procedure → registration id` snapshot.
    pub fn registration_map(&self) -> BTreeMap<String, RegistrationId> {
        self.registration_names
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }

    /// `handler name → (subscription id, topic)` snapshot.
    pub fn subscription_map(
        &self,
    ) -> BTreeMap<String, (SubscriptionId, String)> {
        self.subscriptions()
            .map(|s| (s.handler_name.clone(), (s.subscription_id, s.topic.clone())))
            .collect()
    }

    pub fn registrations(&self) -> impl Iterator<Item = &RegistrationRecord> {
        self.procedures.values().map(|p| &p.record)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &SubscriptionRecord> {
        self.topics.values().flatten().map(|s| &s.record)
    }

    /// Names of every live record.
    pub fn names(&self) -> Vec<String> {
        self.registration_names
            .keys()
            .chain(self.subscription_names.keys())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registration_names.len() + self.subscription_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.procedures.clear();
        self.registration_names.clear();
        self.topics.clear();
        self.subscription_names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, HandlerError, Invocation};
    use futures_util::FutureExt;
    use std::sync::Arc;
    use wampkit_protocol::Payload;

    fn procedure() -> ProcedureHandler {
        Arc::new(|_: Invocation| {
            async { Ok::<_, HandlerError>(Payload::default()) }.boxed()
        })
    }

    fn topic() -> TopicHandler {
        Arc::new(|_: Event| async {}.boxed())
    }

    #[test]
    fn test_add_and_resolve() {
        let mut registry = Registry::new();
        registry.add_procedure(
            "add",
            InvocationPolicy::Single,
            RegistrationId(7),
            procedure(),
        );
        registry.add_topic("on_news", "news", SubscriptionId(9), topic());

        assert!(registry.resolve_registration_id(RegistrationId(7)).is_ok());
        assert!(registry.resolve_subscription_id(SubscriptionId(9)).is_ok());
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.registration_map().get("add"),
            Some(&RegistrationId(7))
        );
        assert_eq!(
            registry.subscription_map().get("on_news"),
            Some(&(SubscriptionId(9), "news".to_string()))
        );
    }

    #[test]
    fn test_unknown_ids_fail() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve_registration_id(RegistrationId(1)),
            Err(SessionError::UnknownRegistration(RegistrationId(1)))
        ));
        assert!(matches!(
            registry.resolve_subscription_id(SubscriptionId(2)),
            Err(SessionError::UnknownSubscription(SubscriptionId(2)))
        ));
    }

    #[test]
    fn test_remove_clears_both_directions() {
        let mut registry = Registry::new();
        registry.add_procedure(
            "add",
            InvocationPolicy::RoundRobin,
            RegistrationId(7),
            procedure(),
        );

        let removed = registry.remove("add");
        assert!(matches!(
            removed,
            Some(Removed::Registration(RegistrationRecord {
                registration_id: RegistrationId(7),
                policy: InvocationPolicy::RoundRobin,
                ..
            }))
        ));
        assert!(registry.resolve_registration_id(RegistrationId(7)).is_err());
        assert!(registry.registration_map().is_empty());
        assert!(registry.remove("add").is_none());
    }

    #[test]
    fn test_shared_subscription_keeps_handler_until_last_name() {
        let mut registry = Registry::new();
        registry.add_topic("first", "news", SubscriptionId(3), topic());
        registry.add_topic("second", "news", SubscriptionId(3), topic());

        assert_eq!(
            registry.resolve_subscription_id(SubscriptionId(3)).unwrap().len(),
            2
        );

        let removed = registry.remove("first");
        assert!(matches!(removed, Some(Removed::Subscription { last: false, .. })));
        assert_eq!(
            registry.resolve_subscription_id(SubscriptionId(3)).unwrap().len(),
            1
        );

        let removed = registry.remove("second");
        assert!(matches!(removed, Some(Removed::Subscription { last: true, .. })));
        assert!(registry.resolve_subscription_id(SubscriptionId(3)).is_err());
    }

    #[test]
    fn test_records_reachable_by_id() {
        let mut registry = Registry::new();
        registry.add_procedure(
            "add",
            InvocationPolicy::RoundRobin,
            RegistrationId(7),
            procedure(),
        );
        registry.add_topic("first", "news", SubscriptionId(3), topic());
        registry.add_topic("second", "news", SubscriptionId(3), topic());

        let record = registry.registration(RegistrationId(7)).unwrap();
        assert_eq!(record.procedure, "add");
        assert_eq!(record.policy, InvocationPolicy::RoundRobin);
        assert!(registry.registration(RegistrationId(8)).is_none());

        let names: Vec<_> = registry
            .subscription(SubscriptionId(3))
            .iter()
            .map(|r| r.handler_name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(registry
            .subscription(SubscriptionId(3))
            .iter()
            .all(|r| r.topic == "news"));
        assert!(registry.subscription(SubscriptionId(4)).is_empty());
    }
}
