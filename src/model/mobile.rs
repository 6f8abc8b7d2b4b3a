use std::fmt::Display;
use std::str::FromStr;

use mongodb::bson::{to_bson, Bson};
use phonenumber::PhoneNumber;
use serde::{Deserialize, Serialize};

/// A user's mobile number. Only numbers that parse as real phone numbers
/// are representable; they serialize in E.164 form, which is also the
/// stored (and uniquely indexed) format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mobile {
    #[serde(with = "phone_number")]
    inner: PhoneNumber,
}

mod phone_number {
    use phonenumber::PhoneNumber;
    use serde::{de::Visitor, Deserializer, Serializer};

    pub fn serialize<S>(phone_number: &PhoneNumber, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&phone_number.to_string())
    }

    struct StrVisitor;

    impl Visitor<'_> for StrVisitor {
        type Value = PhoneNumber;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "a valid phone number string")
        }

        fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            s.parse::<PhoneNumber>().map_err(E::custom)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PhoneNumber, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(StrVisitor)
    }
}

impl Display for Mobile {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        self.inner.fmt(formatter)
    }
}

impl FromStr for Mobile {
    type Err = <PhoneNumber as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            inner: s.parse::<PhoneNumber>()?,
        })
    }
}

impl From<Mobile> for Bson {
    fn from(mobile: Mobile) -> Self {
        to_bson(&mobile).unwrap() // Valid because `PhoneNumber` serialization doesn't fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e164_numbers_parse() {
        let mobile = "+447700900123".parse::<Mobile>().unwrap();
        assert_eq!("+447700900123", mobile.to_string());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("not a number".parse::<Mobile>().is_err());
    }

    #[test]
    fn json_round_trip() {
        let mobile = "+14155552671".parse::<Mobile>().unwrap();
        let json = rocket::serde::json::serde_json::to_string(&mobile).unwrap();
        let back: Mobile = rocket::serde::json::serde_json::from_str(&json).unwrap();
        assert_eq!(mobile, back);
    }
}
