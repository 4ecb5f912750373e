use serde::{Deserialize, Serialize};

/// Common view of a remote gateway, used by the dispatcher for logging.
pub trait Gateway {
    fn url(&self) -> &str;
    fn home_community_id(&self) -> &str;
}

/// Patient-discovery gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct XcpdGateway {
    pub url: String,
    pub oid: String,
    /// Connection id assigned by the caller's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Gateway for XcpdGateway {
    fn url(&self) -> &str {
        &self.url
    }

    fn home_community_id(&self) -> &str {
        &self.oid
    }
}

/// Document query and retrieval gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XcaGateway {
    pub url: String,
    pub home_community_id: String,
}

impl Gateway for XcaGateway {
    fn url(&self) -> &str {
        &self.url
    }

    fn home_community_id(&self) -> &str {
        &self.home_community_id
    }
}
