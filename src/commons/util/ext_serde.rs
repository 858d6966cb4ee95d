//! Defines helper methods for Serializing and Deserializing external types.
use std::{collections::BTreeMap, str::FromStr};

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use log::LevelFilter;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use url::Url;

//------------ Bytes ---------------------------------------------------------

/// Serializes a map of named byte values with base64 encoded values.
pub fn ser_bytes_map<S>(
    map: &BTreeMap<String, Bytes>,
    s: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    map.iter()
        .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
        .collect::<BTreeMap<&str, String>>()
        .serialize(s)
}

pub fn de_bytes_map<'de, D>(d: D) -> Result<BTreeMap<String, Bytes>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = BTreeMap::<String, String>::deserialize(d)?;
    encoded
        .into_iter()
        .map(|(k, v)| {
            STANDARD
                .decode(v.as_bytes())
                .map(|dec| (k, Bytes::from(dec)))
                .map_err(de::Error::custom)
        })
        .collect()
}

//------------ LevelFilter ---------------------------------------------------

pub fn de_level_filter<'de, D>(d: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(d)?;
    LevelFilter::from_str(&string).map_err(de::Error::custom)
}

//------------ Storage Uri ---------------------------------------------------

/// Deserializes a storage location.
///
/// Accepts a full URI, or a plain path which is taken as a `local://` URI.
pub fn de_storage_uri<'de, D>(d: D) -> Result<Url, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(d)?;
    match Url::parse(&string) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("local://{}", string)).map_err(de::Error::custom)
        }
        Err(e) => Err(de::Error::custom(e)),
    }
}

//------------ Tests ---------------------------------------------------------
