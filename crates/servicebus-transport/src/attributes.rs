//! Attribute codec.
//!
//! Maps the two-tier [`MessageAttributes`] record onto the broker's flat
//! property bag and back. Every encoded key is prefixed with its tier name
//! (`attributes-` or `stickyAttributes-`), so the same key may appear in both
//! tiers without colliding.
//!
//! Decoding is prefix driven. Keys carrying neither prefix come from foreign
//! senders and are placed in the `attributes` tier verbatim. When a prefixed
//! and an unprefixed key decode to the same name, the prefixed one wins.

use crate::host::{AttributeMap, AttributeValue, MessageAttributes};
use crate::message::{ApplicationProperties, PropertyValue};
use chrono::SecondsFormat;
use std::fmt;

/// Key that is carried in its own wire field and never in the property bag
pub const CORRELATION_ID_KEY: &str = "correlationId";

/// The two attribute tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeTier {
    Attributes,
    StickyAttributes,
}

impl AttributeTier {
    /// Tier name as used on the wire
    pub fn name(self) -> &'static str {
        match self {
            Self::Attributes => "attributes",
            Self::StickyAttributes => "stickyAttributes",
        }
    }

    /// Key prefix for this tier, including the trailing hyphen
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Attributes => "attributes-",
            Self::StickyAttributes => "stickyAttributes-",
        }
    }

    /// Flat key for an attribute in this tier
    pub fn wire_key(self, key: &str) -> String {
        format!("{}{}", self.prefix(), key)
    }
}

impl fmt::Display for AttributeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode both tiers into one property bag
pub fn encode(attributes: &MessageAttributes) -> ApplicationProperties {
    let mut properties = ApplicationProperties::new();
    encode_tier(AttributeTier::Attributes, &attributes.attributes, &mut properties);
    encode_tier(
        AttributeTier::StickyAttributes,
        &attributes.sticky_attributes,
        &mut properties,
    );
    properties
}

/// Encode one tier into `properties`, skipping the correlation ID and writing
/// absent values as the null marker
pub fn encode_tier(tier: AttributeTier, map: &AttributeMap, properties: &mut ApplicationProperties) {
    for (key, value) in map.iter() {
        if key == CORRELATION_ID_KEY {
            continue;
        }

        let wire_value = match value {
            Some(value) => to_property_value(value),
            None => PropertyValue::Null,
        };
        properties.insert(tier.wire_key(key), wire_value);
    }
}

fn to_property_value(value: &AttributeValue) -> PropertyValue {
    match value {
        AttributeValue::String(s) => PropertyValue::String(s.clone()),
        AttributeValue::Integer(i) => PropertyValue::Int(*i),
        AttributeValue::Float(f) => PropertyValue::Double(*f),
        AttributeValue::Boolean(b) => PropertyValue::Bool(*b),
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a received property bag into an attribute record.
///
/// Messages without a bag decode to empty tiers.
pub fn decode(
    properties: Option<&ApplicationProperties>,
    correlation_id: Option<String>,
) -> MessageAttributes {
    let (attributes, sticky_attributes) = match properties {
        Some(properties) => (
            decode_tier(AttributeTier::Attributes, properties),
            decode_tier(AttributeTier::StickyAttributes, properties),
        ),
        None => (AttributeMap::new(), AttributeMap::new()),
    };

    MessageAttributes {
        correlation_id,
        attributes,
        sticky_attributes,
    }
}

/// Decode the entries of one tier from a property bag.
///
/// Precedence, per key:
/// 1. keys starting with this tier's prefix, prefix stripped;
/// 2. for [`AttributeTier::Attributes`] only, keys not starting with the
///    sticky prefix, taken verbatim.
///
/// Prefix matching is case sensitive.
pub fn decode_tier(tier: AttributeTier, properties: &ApplicationProperties) -> AttributeMap {
    let mut prefixed = AttributeMap::new();
    let mut defaulted = AttributeMap::new();

    for (key, value) in properties {
        let decoded = from_property_value(value);

        if let Some(stripped) = key.strip_prefix(tier.prefix()) {
            if stripped != CORRELATION_ID_KEY {
                prefixed.set(stripped, decoded);
            }
        } else if tier == AttributeTier::Attributes
            && !key.starts_with(AttributeTier::StickyAttributes.prefix())
            && key != CORRELATION_ID_KEY
        {
            defaulted.set(key.as_str(), decoded);
        }
    }

    for (key, value) in prefixed {
        defaulted.set(key, value);
    }
    defaulted
}

fn from_property_value(value: &PropertyValue) -> Option<AttributeValue> {
    match value {
        PropertyValue::Null => None,
        PropertyValue::String(s) => Some(AttributeValue::String(s.clone())),
        PropertyValue::Int(i) => Some(AttributeValue::Integer(*i)),
        PropertyValue::Double(f) => Some(AttributeValue::Float(*f)),
        PropertyValue::Bool(b) => Some(AttributeValue::Boolean(*b)),
        PropertyValue::Timestamp(at) => Some(AttributeValue::String(
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )),
    }
}

#[cfg(test)]
#[path = "attributes_tests.rs"]
mod tests;
