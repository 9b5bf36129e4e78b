use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Serialization format used on a connection.
///
/// # Example
///
/// ```
/// use rpcprims_codec::Codec;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Hi {
///     user_name: String,
///     say_msg: String,
/// }
///
/// let hi = Hi { user_name: "ada".into(), say_msg: "hello".into() };
/// for codec in [Codec::Json, Codec::Bincode] {
///     let bytes = codec.serialize(&hi).unwrap();
///     let back: Hi = codec.deserialize(&bytes).unwrap();
///     assert_eq!(back, hi);
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// JSON via `serde_json`. Self-describing, easy to inspect on the wire.
    #[default]
    Json,
    /// Compact binary via `bincode`. Not self-describing: both ends must
    /// use identical types.
    Bincode,
}

impl Codec {
    /// All supported codecs.
    pub const ALL: [Codec; 2] = [Codec::Json, Codec::Bincode];

    /// Stable codec name, as used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Bincode => "bincode",
        }
    }

    /// Serialize `value` to bytes.
    pub fn serialize<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        let encoded = match self {
            Codec::Json => serde_json::to_vec(value).map_err(|err| err.to_string()),
            Codec::Bincode => bincode::serialize(value).map_err(|err| err.to_string()),
        };
        encoded.map_err(|message| CodecError::Serialization {
            codec: self.name(),
            message,
        })
    }

    /// Deserialize bytes into a new instance of `T`.
    pub fn deserialize<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        let decoded = match self {
            Codec::Json => serde_json::from_slice(bytes).map_err(|err| err.to_string()),
            Codec::Bincode => bincode::deserialize(bytes).map_err(|err| err.to_string()),
        };
        decoded.map_err(|message| CodecError::Deserialization {
            codec: self.name(),
            target: std::any::type_name::<T>(),
            message,
        })
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "bincode" => Ok(Codec::Bincode),
            other => Err(format!("unknown codec '{other}' (expected json or bincode)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Address {
        street: String,
        number: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: u8,
        score: f64,
        active: bool,
        nickname: Option<String>,
        tags: Vec<String>,
        address: Address,
        delta: i64,
    }

    fn sample() -> Person {
        Person {
            name: "Ada".to_string(),
            age: 36,
            score: 99.5,
            active: true,
            nickname: None,
            tags: vec!["math".to_string(), "engines".to_string()],
            address: Address {
                street: "St James's Square".to_string(),
                number: 12,
            },
            delta: -42,
        }
    }

    #[test]
    fn nested_struct_roundtrip_all_codecs() {
        for codec in Codec::ALL {
            let bytes = codec.serialize(&sample()).unwrap();
            let back: Person = codec.deserialize(&bytes).unwrap();
            assert_eq!(back, sample(), "codec {codec}");
        }
    }

    #[test]
    fn scalars_and_strings_roundtrip() {
        for codec in Codec::ALL {
            let text = codec.serialize("hi").unwrap();
            assert_eq!(codec.deserialize::<String>(&text).unwrap(), "hi");

            let unit = codec.serialize(&()).unwrap();
            codec.deserialize::<()>(&unit).unwrap();

            let num = codec.serialize(&u64::MAX).unwrap();
            assert_eq!(codec.deserialize::<u64>(&num).unwrap(), u64::MAX);
        }
    }

    #[test]
    fn json_rejects_non_string_map_keys() {
        let mut map = HashMap::new();
        map.insert((1u8, 2u8), "pair");

        let err = Codec::Json.serialize(&map).unwrap_err();
        assert!(matches!(err, CodecError::Serialization { codec: "json", .. }));
    }

    #[test]
    fn deserialization_reports_target_type() {
        let bytes = Codec::Json.serialize(&"not a person").unwrap();
        let err = Codec::Json.deserialize::<Person>(&bytes).unwrap_err();

        match err {
            CodecError::Deserialization { codec, target, .. } => {
                assert_eq!(codec, "json");
                assert!(target.ends_with("Person"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bincode_rejects_truncated_input() {
        let bytes = Codec::Bincode.serialize(&sample()).unwrap();
        let err = Codec::Bincode
            .deserialize::<Person>(&bytes[..bytes.len() / 2])
            .unwrap_err();
        assert!(matches!(err, CodecError::Deserialization { codec: "bincode", .. }));
    }

    #[test]
    fn codec_parses_from_str_and_config() {
        assert_eq!("json".parse::<Codec>().unwrap(), Codec::Json);
        assert_eq!(" BINCODE ".parse::<Codec>().unwrap(), Codec::Bincode);
        assert!("xml".parse::<Codec>().is_err());

        let codec: Codec = serde_json::from_str("\"bincode\"").unwrap();
        assert_eq!(codec, Codec::Bincode);
        assert_eq!(Codec::default(), Codec::Json);
    }

    fn person_strategy() -> impl Strategy<Value = Person> {
        (
            ".*",
            any::<u8>(),
            (-1_000_000i32..1_000_000).prop_map(|quarters| f64::from(quarters) / 4.0),
            any::<bool>(),
            proptest::option::of("[a-z]{0,8}"),
            prop::collection::vec("[a-z]{0,6}", 0..4),
            ("[ -~]{0,16}", any::<u32>()),
            any::<i64>(),
        )
            .prop_map(
                |(name, age, score, active, nickname, tags, (street, number), delta)| Person {
                    name,
                    age,
                    score,
                    active,
                    nickname,
                    tags,
                    address: Address { street, number },
                    delta,
                },
            )
    }

    proptest! {
        #[test]
        fn roundtrip_preserves_every_field(person in person_strategy()) {
            for codec in Codec::ALL {
                let bytes = codec.serialize(&person).unwrap();
                let back: Person = codec.deserialize(&bytes).unwrap();
                prop_assert_eq!(&back, &person);
            }
        }
    }
}
