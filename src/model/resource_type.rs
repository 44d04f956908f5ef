use crate::resources;
use reconcile_framework::{ResourceKind, Schema};
use std::fmt::{self, Display};

/// Every resource kind the provider manages.
///
/// Each variant maps to a static [`Schema`] in [`crate::resources`] and to a payload
/// codec in [`crate::clients`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceType {
    Environment,
    Network,
    PrivateLinkAccess,
    KafkaCluster,
    ServiceAccount,
    ApiKey,
    RoleBinding,
    KafkaTopic,
    AccessPoint,
}

impl ResourceType {
    pub const ALL: [ResourceType; 9] = [
        ResourceType::Environment,
        ResourceType::Network,
        ResourceType::PrivateLinkAccess,
        ResourceType::KafkaCluster,
        ResourceType::ServiceAccount,
        ResourceType::ApiKey,
        ResourceType::RoleBinding,
        ResourceType::KafkaTopic,
        ResourceType::AccessPoint,
    ];
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ResourceKind for ResourceType {
    fn name(&self) -> &'static str {
        match self {
            ResourceType::Environment => "environment",
            ResourceType::Network => "network",
            ResourceType::PrivateLinkAccess => "private_link_access",
            ResourceType::KafkaCluster => "kafka_cluster",
            ResourceType::ServiceAccount => "service_account",
            ResourceType::ApiKey => "api_key",
            ResourceType::RoleBinding => "role_binding",
            ResourceType::KafkaTopic => "kafka_topic",
            ResourceType::AccessPoint => "access_point",
        }
    }

    fn schema(&self) -> &'static Schema {
        match self {
            ResourceType::Environment => &resources::org::ENVIRONMENT,
            ResourceType::Network => &resources::networking::NETWORK,
            ResourceType::PrivateLinkAccess => &resources::networking::PRIVATE_LINK_ACCESS,
            ResourceType::KafkaCluster => &resources::kafka::KAFKA_CLUSTER,
            ResourceType::ServiceAccount => &resources::iam::SERVICE_ACCOUNT,
            ResourceType::ApiKey => &resources::iam::API_KEY,
            ResourceType::RoleBinding => &resources::iam::ROLE_BINDING,
            ResourceType::KafkaTopic => &resources::kafka::KAFKA_TOPIC,
            ResourceType::AccessPoint => &resources::networking::ACCESS_POINT,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        ResourceType::ALL.into_iter().find(|kind| kind.name() == name)
    }
}
