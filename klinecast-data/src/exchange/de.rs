use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

/// Deserialize a [`Decimal`] from either a JSON string or a JSON number.
///
/// Kline feeds are inconsistent even within one venue: spot endpoints tend to quote prices
/// as strings, futures endpoints as raw numbers.
pub fn flexible_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(value) => Ok(Decimal::from(value)),
        Raw::Float(value) => Decimal::from_f64_retain(value)
            .ok_or_else(|| serde::de::Error::custom(format!("non-finite decimal: {value}"))),
        Raw::Str(value) => Decimal::from_str(value.trim()).map_err(serde::de::Error::custom),
    }
}

/// Deserialize an `i64` from either a JSON string or a JSON number.
pub fn flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(value) => Ok(value),
        Raw::Str(value) => value.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "flexible_decimal")]
        price: Decimal,
        #[serde(deserialize_with = "flexible_i64")]
        time: i64,
    }

    #[test]
    fn test_flexible_fields() {
        struct TestCase {
            input: &'static str,
            expected: (Decimal, i64),
        }

        let tests = vec![
            TestCase {
                // TC0: both as strings
                input: r#"{"price": "16578.50", "time": "1672304486"}"#,
                expected: (dec!(16578.50), 1672304486),
            },
            TestCase {
                // TC1: both as numbers
                input: r#"{"price": 6894.5, "time": 1587442800}"#,
                expected: (dec!(6894.5), 1587442800),
            },
            TestCase {
                // TC2: integer volume as number
                input: r#"{"price": 27890337, "time": 0}"#,
                expected: (dec!(27890337), 0),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual: Probe = serde_json::from_str(test.input)
                .unwrap_or_else(|err| panic!("TC{index} failed to parse: {err}"));
            assert_eq!((actual.price, actual.time), test.expected, "TC{index} failed");
        }
    }
}
