//! Content descriptors recorded alongside a layer.
//!
//! The JSON encoding follows the distribution content-descriptor conventions: `mediaType`,
//! `digest` and `size`, with `urls` and `annotations` only present when set.  Layers created
//! before descriptors were recorded have no `descriptor.json`; reading those yields
//! [`Descriptor::default()`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Describes the distributable (usually compressed) blob a layer was pulled from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,

    /// Digest of the blob, in `<algorithm>:<hex>` form.  Empty for the zero value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: i64,

    /// Alternate locations the blob may be fetched from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn is_zero(size: &i64) -> bool {
    *size == 0
}

impl Descriptor {
    /// True for the zero value returned when no descriptor was recorded.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&oci_spec::image::Descriptor> for Descriptor {
    fn from(descriptor: &oci_spec::image::Descriptor) -> Self {
        Self {
            media_type: descriptor.media_type().to_string(),
            digest: descriptor.digest().to_string(),
            size: i64::try_from(descriptor.size()).unwrap_or(i64::MAX),
            urls: descriptor.urls().clone().unwrap_or_default(),
            annotations: descriptor
                .annotations()
                .iter()
                .flatten()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
