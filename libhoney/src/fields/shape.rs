//! Field extraction from arbitrary serializable data.
//!
//! `add` accepts anything implementing [`Serialize`], but only two shapes make sense as a set of fields: a record (a
//! struct with named members) and a mapping. This module drives the value's `Serialize` implementation through a
//! serializer that only accepts those two shapes at the top level, and validates each member independently so that
//! one unserializable member does not poison the rest.
//!
//! Member visibility and naming follow the type's serde attributes: `#[serde(skip)]` members are never seen, and
//! `#[serde(rename = "...")]` members are extracted under their wire name.

use serde::ser::{Impossible, Serialize, SerializeMap, SerializeStruct, Serializer};
use serde_json::Value;

use super::validate;
use crate::error::FieldError;

/// Fields extracted from a supported shape, in the order they were serialized.
#[derive(Debug)]
pub(crate) enum Extracted {
    /// Named members of a struct.
    Record(Vec<(String, Value)>),

    /// Entries of a map, with keys turned into strings.
    Mapping(Vec<(String, Value)>),
}

impl Extracted {
    pub(crate) fn into_fields(self) -> Vec<(String, Value)> {
        match self {
            Extracted::Record(fields) | Extracted::Mapping(fields) => fields,
        }
    }
}

/// Extracts the fields of `data`, which must be a struct, a map, or an option/newtype wrapping one.
pub(crate) fn extract<T>(data: &T) -> Result<Extracted, FieldError>
where
    T: ?Sized + Serialize,
{
    data.serialize(ShapeSerializer)
}

macro_rules! reject {
    ($variant:ident { $($method:ident($($arg:ty),*) => $kind:literal;)* }) => {
        $(
            fn $method(self, $(_: $arg),*) -> Result<Self::Ok, Self::Error> {
                Err(FieldError::$variant { kind: $kind })
            }
        )*
    };
}

macro_rules! key_to_string {
    ($($method:ident($ty:ty);)*) => {
        $(
            fn $method(self, v: $ty) -> Result<Self::Ok, Self::Error> {
                Ok(v.to_string())
            }
        )*
    };
}

struct ShapeSerializer;

impl Serializer for ShapeSerializer {
    type Ok = Extracted;
    type Error = FieldError;
    type SerializeSeq = Impossible<Extracted, FieldError>;
    type SerializeTuple = Impossible<Extracted, FieldError>;
    type SerializeTupleStruct = Impossible<Extracted, FieldError>;
    type SerializeTupleVariant = Impossible<Extracted, FieldError>;
    type SerializeMap = MapExtractor;
    type SerializeStruct = RecordExtractor;
    type SerializeStructVariant = Impossible<Extracted, FieldError>;

    reject!(UnsupportedShape {
        serialize_bool(bool) => "bool";
        serialize_i8(i8) => "integer";
        serialize_i16(i16) => "integer";
        serialize_i32(i32) => "integer";
        serialize_i64(i64) => "integer";
        serialize_u8(u8) => "integer";
        serialize_u16(u16) => "integer";
        serialize_u32(u32) => "integer";
        serialize_u64(u64) => "integer";
        serialize_f32(f32) => "float";
        serialize_f64(f64) => "float";
        serialize_char(char) => "char";
        serialize_str(&str) => "string";
        serialize_bytes(&[u8]) => "bytes";
        serialize_none() => "null";
        serialize_unit() => "unit";
        serialize_unit_struct(&'static str) => "unit struct";
        serialize_unit_variant(&'static str, u32, &'static str) => "enum variant";
    });

    fn serialize_some<T>(self, value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Err(FieldError::UnsupportedShape { kind: "enum variant" })
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(FieldError::UnsupportedShape { kind: "sequence" })
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(FieldError::UnsupportedShape { kind: "tuple" })
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(FieldError::UnsupportedShape { kind: "tuple struct" })
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(FieldError::UnsupportedShape { kind: "enum variant" })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(MapExtractor { fields: Vec::with_capacity(len.unwrap_or(0)), next_key: None })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(RecordExtractor { fields: Vec::with_capacity(len) })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(FieldError::UnsupportedShape { kind: "enum variant" })
    }
}

struct RecordExtractor {
    fields: Vec<(String, Value)>,
}

impl SerializeStruct for RecordExtractor {
    type Ok = Extracted;
    type Error = FieldError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        if let Some(value) = validate(value) {
            self.fields.push((key.to_owned(), value));
        }
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(Extracted::Record(self.fields))
    }
}

struct MapExtractor {
    fields: Vec<(String, Value)>,
    next_key: Option<String>,
}

impl SerializeMap for MapExtractor {
    type Ok = Extracted;
    type Error = FieldError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        self.next_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| FieldError::Custom("map value serialized before its key".to_owned()))?;
        if let Some(value) = validate(value) {
            self.fields.push((key, value));
        }
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(Extracted::Mapping(self.fields))
    }
}

/// Turns string and numeric map keys into field names.
struct KeySerializer;

impl Serializer for KeySerializer {
    type Ok = String;
    type Error = FieldError;
    type SerializeSeq = Impossible<String, FieldError>;
    type SerializeTuple = Impossible<String, FieldError>;
    type SerializeTupleStruct = Impossible<String, FieldError>;
    type SerializeTupleVariant = Impossible<String, FieldError>;
    type SerializeMap = Impossible<String, FieldError>;
    type SerializeStruct = Impossible<String, FieldError>;
    type SerializeStructVariant = Impossible<String, FieldError>;

    key_to_string! {
        serialize_i8(i8);
        serialize_i16(i16);
        serialize_i32(i32);
        serialize_i64(i64);
        serialize_i128(i128);
        serialize_u8(u8);
        serialize_u16(u16);
        serialize_u32(u32);
        serialize_u64(u64);
        serialize_u128(u128);
        serialize_f32(f32);
        serialize_f64(f64);
        serialize_char(char);
    }

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        Ok(v.to_owned())
    }

    reject!(UnsupportedKey {
        serialize_bool(bool) => "bool";
        serialize_bytes(&[u8]) => "bytes";
        serialize_none() => "null";
        serialize_unit() => "unit";
        serialize_unit_struct(&'static str) => "unit struct";
        serialize_unit_variant(&'static str, u32, &'static str) => "enum variant";
    });

    fn serialize_some<T>(self, _value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Err(FieldError::UnsupportedKey { kind: "option" })
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Err(FieldError::UnsupportedKey { kind: "enum variant" })
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(FieldError::UnsupportedKey { kind: "sequence" })
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(FieldError::UnsupportedKey { kind: "tuple" })
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(FieldError::UnsupportedKey { kind: "tuple struct" })
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(FieldError::UnsupportedKey { kind: "enum variant" })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(FieldError::UnsupportedKey { kind: "map" })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct, Self::Error> {
        Err(FieldError::UnsupportedKey { kind: "struct" })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(FieldError::UnsupportedKey { kind: "enum variant" })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use serde::Serialize;
    use serde_json::json;

    use super::{extract, Extracted};
    use crate::error::FieldError;

    #[derive(Serialize)]
    struct Request {
        #[serde(rename = "x")]
        renamed: u32,
        #[serde(skip)]
        #[allow(dead_code)]
        secret: String,
        path: &'static str,
        user: Option<u64>,
    }

    fn sorted(extracted: Extracted) -> Vec<(String, serde_json::Value)> {
        let mut fields = extracted.into_fields();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        fields
    }

    #[test]
    fn record_members_follow_serde_attributes() {
        let request =
            Request { renamed: 5, secret: "hunter2".to_owned(), path: "/", user: None };

        let extracted = extract(&request).unwrap();
        assert!(matches!(extracted, Extracted::Record(_)));
        assert_eq!(
            sorted(extracted),
            vec![("path".to_owned(), json!("/")), ("x".to_owned(), json!(5))]
        );
    }

    #[test]
    fn unserializable_members_are_dropped_individually() {
        #[derive(Serialize)]
        struct Mixed {
            good: bool,
            // JSON maps need string keys, so this member cannot be represented on its own.
            bad: HashMap<(u8, u8), u8>,
        }

        let mut bad = HashMap::new();
        bad.insert((1, 2), 3);

        let fields = sorted(extract(&Mixed { good: true, bad }).unwrap());
        assert_eq!(fields, vec![("good".to_owned(), json!(true))]);
    }

    #[test]
    fn numeric_map_keys_are_stringified() {
        let mut data = BTreeMap::new();
        data.insert(1_i64, "one");
        data.insert(-2, "minus two");

        let extracted = extract(&data).unwrap();
        assert!(matches!(extracted, Extracted::Mapping(_)));
        assert_eq!(
            sorted(extracted),
            vec![("-2".to_owned(), json!("minus two")), ("1".to_owned(), json!("one"))]
        );

        let mut floats = BTreeMap::new();
        floats.insert("1.5".to_owned(), 1.5);
        let fields = sorted(extract(&floats).unwrap());
        assert_eq!(fields, vec![("1.5".to_owned(), json!(1.5))]);
    }

    #[test]
    fn null_map_values_are_dropped() {
        let mut data = HashMap::new();
        data.insert("present", Some(1));
        data.insert("absent", None);

        let fields = sorted(extract(&data).unwrap());
        assert_eq!(fields, vec![("present".to_owned(), json!(1))]);
    }

    #[test]
    fn unsupported_key_kinds_are_named() {
        let mut data = HashMap::new();
        data.insert(true, 1);

        match extract(&data) {
            Err(FieldError::UnsupportedKey { kind }) => assert_eq!(kind, "bool"),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut tuples = HashMap::new();
        tuples.insert((1, 2), 1);
        match extract(&tuples) {
            Err(FieldError::UnsupportedKey { kind }) => assert_eq!(kind, "tuple"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn wrappers_are_dereferenced() {
        #[derive(Serialize)]
        struct Wrapper(Request);

        let request = Request { renamed: 1, secret: String::new(), path: "/a", user: Some(7) };
        let fields = sorted(extract(&Some(&request)).unwrap());
        assert_eq!(fields.len(), 3);

        let fields = sorted(extract(&Wrapper(request)).unwrap());
        assert_eq!(fields[2], ("x".to_owned(), json!(1)));
    }

    #[test]
    fn other_shapes_are_rejected() {
        let cases: Vec<(Result<Extracted, FieldError>, &str)> = vec![
            (extract(&42), "integer"),
            (extract("text"), "string"),
            (extract(&vec![1, 2, 3]), "sequence"),
            (extract(&[1, 2]), "tuple"),
            (extract(&None::<Request>), "null"),
            (extract(&()), "unit"),
        ];

        for (result, expected) in cases {
            match result {
                Err(FieldError::UnsupportedShape { kind }) => assert_eq!(kind, expected),
                other => panic!("expected {expected} to be rejected, got {other:?}"),
            }
        }
    }
}
