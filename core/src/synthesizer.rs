#![deny(missing_docs)]

//! # Value Synthesis
//!
//! Leaf values for primitive schemas and sizing of generated arrays. The
//! generator only talks to the [`ValueSynthesizer`] trait; randomness is the
//! implementation's business.
//!
//! [`DefaultSynthesizer`] is reproducible: the same seed yields the same
//! values in the same order.

use crate::cache::CacheItem;
use crate::model::{ArrayDefinition, PrimitiveDefinition};
use derive_more::Display;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::Word;
use fake::Fake;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::error::Error;
use std::rc::Rc;

/// Largest array the generator builds. A larger `minItems` is reported and
/// capped.
pub const MAX_GENERATED_ITEMS: u64 = 1024;

/// Largest `minLength` the default synthesizer honors.
pub const MAX_GENERATED_LENGTH: u64 = 4096;

/// Attempts at drawing a number strictly inside its bounds before falling
/// back to the midpoint.
const NUMBER_DRAWS: usize = 8;

/// The schema cannot be turned into a value.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{_0}")]
pub struct SynthesisError(pub String);

impl Error for SynthesisError {}

/// Produces leaf values and array contents.
pub trait ValueSynthesizer {
    /// A value for `schema`, used for the property or parameter `name`.
    /// `seed` is an existing value for the slot, if any.
    fn synthesize(
        &mut self,
        schema: &PrimitiveDefinition,
        name: &str,
        seed: Option<&Value>,
    ) -> Result<Value, SynthesisError>;

    /// Expands one generated item into the final array contents.
    ///
    /// The default repeats the template `max(minItems, 1)` times, capped by
    /// `maxItems` and by [`MAX_GENERATED_ITEMS`].
    fn fill_array(&mut self, array: &ArrayDefinition, template: Rc<CacheItem>) -> Vec<Rc<CacheItem>> {
        let mut count = array.min_items.unwrap_or(0).max(1).min(MAX_GENERATED_ITEMS);
        if let Some(max) = array.max_items {
            count = count.min(max);
        }
        (0..count).map(|_| Rc::clone(&template)).collect()
    }

    /// A fresh key for an additional property of the object `owner`.
    fn property_key(&mut self, owner: &str) -> String;
}

/// Seeded synthesizer backed by `rand` and `fake`.
#[derive(Debug, Clone)]
pub struct DefaultSynthesizer {
    rng: StdRng,
}

impl DefaultSynthesizer {
    /// Creates a synthesizer whose output is fixed by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn word(&mut self) -> String {
        Word().fake_with_rng(&mut self.rng)
    }

    fn alphanumeric(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn formatted(&mut self, format: &str) -> Option<Value> {
        let rng = &mut self.rng;
        let value = match format {
            "date" => format!(
                "{:04}-{:02}-{:02}",
                rng.gen_range(2020..=2025),
                rng.gen_range(1..=12),
                rng.gen_range(1..=28)
            ),
            "date-time" => format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
                rng.gen_range(2020..=2025),
                rng.gen_range(1..=12),
                rng.gen_range(1..=28),
                rng.gen_range(0..24),
                rng.gen_range(0..60),
                rng.gen_range(0..60)
            ),
            "uuid" => {
                let raw: u128 = rng.gen();
                let hex = format!("{:032x}", raw);
                format!(
                    "{}-{}-{}-{}-{}",
                    &hex[0..8],
                    &hex[8..12],
                    &hex[12..16],
                    &hex[16..20],
                    &hex[20..32]
                )
            }
            "uri" | "url" => format!("https://example.com/{}", self.word()),
            "email" => SafeEmail().fake_with_rng(&mut self.rng),
            "byte" => self.alphanumeric(8),
            "duration" => format!("PT{}M", rng.gen_range(1..60)),
            _ => return None,
        };
        Some(Value::String(value))
    }

    fn string(&mut self, schema: &PrimitiveDefinition) -> Result<String, SynthesisError> {
        let min = schema.constraint_u64("minLength").unwrap_or(0);
        if min > MAX_GENERATED_LENGTH {
            return Err(SynthesisError(format!(
                "minLength {} exceeds the generation limit of {}",
                min, MAX_GENERATED_LENGTH
            )));
        }
        let min = min as usize;
        let mut value = self.word();
        if value.chars().count() < min {
            let pad = min - value.chars().count();
            value.push_str(&self.alphanumeric(pad));
        }
        if let Some(max) = schema.constraint_u64("maxLength") {
            value = value.chars().take(max.min(MAX_GENERATED_LENGTH) as usize).collect();
        }
        Ok(value)
    }

    fn integer(&mut self, schema: &PrimitiveDefinition) -> Result<Value, SynthesisError> {
        let low = match schema.constraint_f64("minimum") {
            Some(m) if is_exclusive(schema, "exclusiveMinimum") && m.ceil() == m => Some(
                (m as i64).checked_add(1).ok_or_else(|| {
                    SynthesisError(format!("no integer above exclusive minimum {}", m))
                })?,
            ),
            Some(m) => Some(m.ceil() as i64),
            None => None,
        };
        let high = match schema.constraint_f64("maximum") {
            Some(m) if is_exclusive(schema, "exclusiveMaximum") && m.floor() == m => Some(
                (m as i64).checked_sub(1).ok_or_else(|| {
                    SynthesisError(format!("no integer below exclusive maximum {}", m))
                })?,
            ),
            Some(m) => Some(m.floor() as i64),
            None => None,
        };
        let (low, high) = match (low, high) {
            (Some(l), Some(h)) => (l, h),
            (Some(l), None) => (l, l.saturating_add(100)),
            (None, Some(h)) => (h.saturating_sub(100), h),
            (None, None) => (0, 100),
        };
        if low > high {
            return Err(SynthesisError(format!("empty integer range {}..={}", low, high)));
        }
        Ok(json!(self.rng.gen_range(low..=high)))
    }

    fn number(&mut self, schema: &PrimitiveDefinition) -> Result<Value, SynthesisError> {
        let exclusive_low = is_exclusive(schema, "exclusiveMinimum");
        let exclusive_high = is_exclusive(schema, "exclusiveMaximum");
        let (low, high) = match (schema.constraint_f64("minimum"), schema.constraint_f64("maximum")) {
            (Some(l), Some(h)) => (l, h),
            (Some(l), None) => (l, (l + 100.0).min(f64::MAX)),
            (None, Some(h)) => ((h - 100.0).max(f64::MIN), h),
            (None, None) => (0.0, 100.0),
        };
        let empty = || SynthesisError(format!("empty number range {}..{}", low, high));
        if low.is_nan() || high.is_nan() || low > high {
            return Err(empty());
        }
        if low == high {
            return if exclusive_low || exclusive_high {
                Err(empty())
            } else {
                Ok(json!(low))
            };
        }

        let inside = |v: f64| {
            v.is_finite()
                && (if exclusive_low { v > low } else { v >= low })
                && (if exclusive_high { v < high } else { v <= high })
        };
        // `high - low` overflows on extreme bounds; interpolate instead.
        for _ in 0..NUMBER_DRAWS {
            let t: f64 = self.rng.gen();
            let raw = low * (1.0 - t) + high * t;
            let rounded = (raw * 100.0).round() / 100.0;
            if inside(rounded) {
                return Ok(json!(rounded));
            }
            if inside(raw) {
                return Ok(json!(raw));
            }
        }
        let middle = low / 2.0 + high / 2.0;
        if inside(middle) {
            Ok(json!(middle))
        } else {
            Err(empty())
        }
    }
}

/// Swagger 2 spells exclusive bounds as booleans beside `minimum`/`maximum`.
fn is_exclusive(schema: &PrimitiveDefinition, key: &str) -> bool {
    schema.constraints.get(key).and_then(Value::as_bool) == Some(true)
}

impl ValueSynthesizer for DefaultSynthesizer {
    fn synthesize(
        &mut self,
        schema: &PrimitiveDefinition,
        _name: &str,
        seed: Option<&Value>,
    ) -> Result<Value, SynthesisError> {
        if let Some(seed) = seed {
            return Ok(seed.clone());
        }
        if let Some(first) = schema.enumeration.first() {
            return Ok(first.clone());
        }
        if let Some(example) = schema.example.as_ref().or(schema.default.as_ref()) {
            return Ok(example.clone());
        }

        let schema_type = schema.schema_type.as_deref();
        if matches!(schema_type, None | Some("string")) {
            if let Some(value) = schema.format.as_deref().and_then(|f| self.formatted(f)) {
                return Ok(value);
            }
        }
        match schema_type {
            Some("string") => self.string(schema).map(Value::String),
            Some("integer") => self.integer(schema),
            Some("number") => self.number(schema),
            Some("boolean") => Ok(Value::Bool(self.rng.gen_bool(0.5))),
            Some("file") => Ok(Value::String(self.alphanumeric(16))),
            Some("null") => Ok(Value::Null),
            None => Ok(Value::Object(Map::new())),
            Some(other) => Err(SynthesisError(format!("unknown type '{}'", other))),
        }
    }

    fn property_key(&mut self, _owner: &str) -> String {
        self.word()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheMeta;
    use crate::model::DefinitionTag;
    use indexmap::IndexSet;

    fn prim(yaml: &str) -> PrimitiveDefinition {
        let node: Value = serde_yaml::from_str(yaml).unwrap();
        let mut out = PrimitiveDefinition {
            schema_type: node.get("type").and_then(Value::as_str).map(String::from),
            format: node.get("format").and_then(Value::as_str).map(String::from),
            enumeration: node
                .get("enum")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            default: node.get("default").cloned(),
            example: node.get("example").cloned(),
            ..Default::default()
        };
        for key in [
            "minimum",
            "maximum",
            "minLength",
            "maxLength",
            "exclusiveMinimum",
            "exclusiveMaximum",
        ] {
            if let Some(v) = node.get(key) {
                out.constraints.insert(key.to_string(), v.clone());
            }
        }
        out
    }

    #[test]
    fn test_same_seed_same_values() {
        let schema = prim("{type: string}");
        let mut a = DefaultSynthesizer::new(7);
        let mut b = DefaultSynthesizer::new(7);
        for _ in 0..5 {
            assert_eq!(
                a.synthesize(&schema, "x", None).unwrap(),
                b.synthesize(&schema, "x", None).unwrap()
            );
        }
    }

    #[test]
    fn test_precedence_seed_enum_example() {
        let mut s = DefaultSynthesizer::new(1);
        let schema = prim("{type: string, enum: [a, b], example: z}");
        assert_eq!(s.synthesize(&schema, "x", Some(&json!("s"))).unwrap(), json!("s"));
        assert_eq!(s.synthesize(&schema, "x", None).unwrap(), json!("a"));
        let schema = prim("{type: integer, default: 3}");
        assert_eq!(s.synthesize(&schema, "x", None).unwrap(), json!(3));
    }

    #[test]
    fn test_numeric_bounds() {
        let mut s = DefaultSynthesizer::new(3);
        let schema = prim("{type: integer, minimum: 5, maximum: 6, exclusiveMinimum: true}");
        for _ in 0..10 {
            assert_eq!(s.synthesize(&schema, "n", None).unwrap(), json!(6));
        }
        let schema = prim("{type: number, minimum: 1.5, maximum: 2.5}");
        let v = s.synthesize(&schema, "n", None).unwrap().as_f64().unwrap();
        assert!((1.5..=2.5).contains(&v));
    }

    #[test]
    fn test_integer_exclusive_bound_at_type_limit_is_an_error() {
        let mut s = DefaultSynthesizer::new(3);
        let schema = prim("{type: integer, minimum: 9223372036854775807, exclusiveMinimum: true}");
        let err = s.synthesize(&schema, "n", None).unwrap_err();
        assert!(err.to_string().contains("exclusive minimum"));
        let schema = prim("{type: integer, maximum: -9223372036854775808, exclusiveMaximum: true}");
        assert!(s.synthesize(&schema, "n", None).is_err());
        let schema = prim("{type: integer, minimum: 4, maximum: 5, exclusiveMinimum: true, exclusiveMaximum: true}");
        assert!(s.synthesize(&schema, "n", None).is_err());
    }

    #[test]
    fn test_integer_fractional_exclusive_bounds() {
        let mut s = DefaultSynthesizer::new(3);
        let schema = prim("{type: integer, minimum: 4.5, maximum: 5.5, exclusiveMinimum: true, exclusiveMaximum: true}");
        assert_eq!(s.synthesize(&schema, "n", None).unwrap(), json!(5));
    }

    #[test]
    fn test_number_exclusive_bounds_stay_strict() {
        let mut s = DefaultSynthesizer::new(11);
        let schema = prim("{type: number, minimum: 0, maximum: 0.004, exclusiveMinimum: true}");
        for _ in 0..50 {
            let v = s.synthesize(&schema, "n", None).unwrap().as_f64().unwrap();
            assert!(v > 0.0 && v <= 0.004, "{v}");
        }
        let schema = prim("{type: number, minimum: 1, maximum: 2, exclusiveMaximum: true}");
        for _ in 0..50 {
            let v = s.synthesize(&schema, "n", None).unwrap().as_f64().unwrap();
            assert!((1.0..2.0).contains(&v), "{v}");
        }
    }

    #[test]
    fn test_number_equal_bounds() {
        let mut s = DefaultSynthesizer::new(0);
        let schema = prim("{type: number, minimum: 2, maximum: 2}");
        assert_eq!(s.synthesize(&schema, "n", None).unwrap(), json!(2.0));
        let schema = prim("{type: number, minimum: 2, maximum: 2, exclusiveMaximum: true}");
        assert!(s.synthesize(&schema, "n", None).is_err());
        let schema = prim("{type: number, minimum: 3, maximum: 2}");
        assert!(s.synthesize(&schema, "n", None).is_err());
    }

    #[test]
    fn test_number_extreme_range_is_finite() {
        let mut s = DefaultSynthesizer::new(5);
        let schema = prim("{type: number, minimum: -1e308, maximum: 1e308}");
        for _ in 0..20 {
            let v = s.synthesize(&schema, "n", None).unwrap().as_f64().unwrap();
            assert!(v.is_finite() && (-1e308..=1e308).contains(&v));
        }
        let schema = prim("{type: number, minimum: 1.7e308}");
        let v = s.synthesize(&schema, "n", None).unwrap().as_f64().unwrap();
        assert!(v.is_finite() && v >= 1.7e308);
    }

    #[test]
    fn test_oversized_min_length_is_an_error() {
        let mut s = DefaultSynthesizer::new(0);
        let schema = prim("{type: string, minLength: 4000000000}");
        let err = s.synthesize(&schema, "n", None).unwrap_err();
        assert!(err.to_string().contains("minLength"));
    }

    #[test]
    fn test_string_length_bounds() {
        let mut s = DefaultSynthesizer::new(3);
        let schema = prim("{type: string, minLength: 20, maxLength: 24}");
        let v = s.synthesize(&schema, "n", None).unwrap();
        let len = v.as_str().unwrap().chars().count();
        assert!((20..=24).contains(&len));
        let schema = prim("{type: string, maxLength: 1}");
        let v = s.synthesize(&schema, "n", None).unwrap();
        assert!(v.as_str().unwrap().chars().count() <= 1);
    }

    #[test]
    fn test_formats() {
        let mut s = DefaultSynthesizer::new(9);
        let uuid = s.synthesize(&prim("{type: string, format: uuid}"), "id", None).unwrap();
        assert_eq!(uuid.as_str().unwrap().len(), 36);
        let dt = s
            .synthesize(&prim("{type: string, format: date-time}"), "at", None)
            .unwrap();
        assert!(dt.as_str().unwrap().ends_with('Z'));
        let email = s.synthesize(&prim("{format: email}"), "mail", None).unwrap();
        assert!(email.as_str().unwrap().contains('@'));
        let bytes = s.synthesize(&prim("{type: string, format: byte}"), "b", None).unwrap();
        assert_eq!(bytes.as_str().unwrap().len(), 8);
    }

    #[test]
    fn test_untyped_and_unknown() {
        let mut s = DefaultSynthesizer::new(0);
        assert_eq!(s.synthesize(&prim("{}"), "x", None).unwrap(), json!({}));
        let err = s.synthesize(&prim("{type: tuple}"), "x", None).unwrap_err();
        assert!(err.to_string().contains("tuple"));
    }

    #[test]
    fn test_fill_array_sizes() {
        let mut s = DefaultSynthesizer::new(0);
        let template = Rc::new(CacheItem::leaf(
            json!(1),
            CacheMeta {
                is_mocked: true,
                required: IndexSet::new(),
                tag: DefinitionTag::Primitive,
            },
        ));
        let arr = ArrayDefinition {
            items: None,
            min_items: Some(3),
            max_items: Some(2),
        };
        assert_eq!(s.fill_array(&arr, template.clone()).len(), 2);
        assert_eq!(s.fill_array(&ArrayDefinition::default(), template.clone()).len(), 1);
        let huge = ArrayDefinition {
            items: None,
            min_items: Some(4_000_000_000),
            max_items: None,
        };
        assert_eq!(s.fill_array(&huge, template).len() as u64, MAX_GENERATED_ITEMS);
    }
}
