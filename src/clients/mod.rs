//! Remote client adapters: payload codecs, the HTTP client and its provider context.

pub mod access_point_codec;
pub mod codec;
pub mod error;
pub mod http;
pub mod provider;
pub mod topic_codec;

pub use access_point_codec::*;
pub use codec::*;
pub use error::*;
pub use http::*;
pub use provider::*;
pub use topic_codec::*;

use crate::model::ResourceType;
use crate::resources;
use reconcile_framework::Adapters;
use std::sync::Arc;

/// The codec that speaks `kind`'s API.
pub fn codec_for(kind: ResourceType) -> Arc<dyn PayloadCodec> {
    use Envelope::{Flat, Spec};
    let name = reconcile_framework::ResourceKind::name(&kind);
    match kind {
        ResourceType::Environment => Arc::new(GenericCodec::new(
            name,
            "/org/v2/environments",
            Spec,
            &resources::org::ENVIRONMENT,
        )),
        ResourceType::Network => Arc::new(
            GenericCodec::new(
                name,
                "/networking/v1/networks",
                Spec,
                &resources::networking::NETWORK,
            )
            .with_scope(&["environment"]),
        ),
        ResourceType::PrivateLinkAccess => Arc::new(
            GenericCodec::new(
                name,
                "/networking/v1/private-link-accesses",
                Spec,
                &resources::networking::PRIVATE_LINK_ACCESS,
            )
            .with_scope(&["environment"]),
        ),
        ResourceType::KafkaCluster => Arc::new(
            GenericCodec::new(
                name,
                "/cmk/v2/clusters",
                Spec,
                &resources::kafka::KAFKA_CLUSTER,
            )
            .with_scope(&["environment"]),
        ),
        ResourceType::ServiceAccount => Arc::new(GenericCodec::new(
            name,
            "/iam/v2/service-accounts",
            Flat,
            &resources::iam::SERVICE_ACCOUNT,
        )),
        ResourceType::ApiKey => Arc::new(GenericCodec::new(
            name,
            "/iam/v2/api-keys",
            Spec,
            &resources::iam::API_KEY,
        )),
        ResourceType::RoleBinding => Arc::new(GenericCodec::new(
            name,
            "/iam/v2/role-bindings",
            Flat,
            &resources::iam::ROLE_BINDING,
        )),
        ResourceType::KafkaTopic => Arc::new(KafkaTopicCodec),
        ResourceType::AccessPoint => Arc::new(AccessPointCodec),
    }
}

/// One HTTP client per kind, all sharing `context`.
pub fn http_adapters(context: &ProviderContext) -> Adapters<ResourceType> {
    ResourceType::ALL
        .into_iter()
        .fold(Adapters::new(), |adapters, kind| {
            adapters.register(
                kind,
                Arc::new(HttpResourceClient::new(context.clone(), codec_for(kind))),
            )
        })
}
