//! `#[repr(C)]` shapes exchanged with the foreign plugin, and their decoding into
//! the owned Rust model.
//!
//! Everything passed *into* the bridge is borrowed for the duration of one call.
//! Decoding copies it, so nothing decoded here keeps a pointer into foreign memory.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use thiserror::Error;

use crate::modifiers::Modifiers;
use crate::tags::TagSet;
use crate::timestamp::{Timestamp, TimestampError};
use crate::value::{MetricValue, ValueKind};

/// Called with a context id for Collect, Load and Unload.
pub type TaskCallback = unsafe extern "C" fn(ctx_id: *mut c_char);

/// Called once, before any context exists, to register definitions.
pub type DefineCallback = unsafe extern "C" fn();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawDecodeError {
    #[error("{0} must not be null")]
    NullPointer(&'static str),
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error("invalid value type {0}")]
    InvalidValueType(i32),
    #[error("map length {0} is negative")]
    NegativeLength(i32),
    #[error(transparent)]
    InvalidTimestamp(#[from] TimestampError),
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union RawValueUnion {
    pub v_int64: i64,
    pub v_uint64: u64,
    pub v_double: f64,
    pub v_bool: c_int,
}

/// A metric value as it crosses the boundary. `vtype` selects the union member.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawValue {
    pub value: RawValueUnion,
    pub vtype: c_int,
}

impl From<MetricValue> for RawValue {
    fn from(value: MetricValue) -> Self {
        let raw = match value {
            MetricValue::Int64(v) => RawValueUnion { v_int64: v },
            MetricValue::Uint64(v) => RawValueUnion { v_uint64: v },
            MetricValue::Double(v) => RawValueUnion { v_double: v },
            MetricValue::Bool(v) => RawValueUnion { v_bool: v as c_int },
        };
        RawValue { value: raw, vtype: value.kind().as_raw() }
    }
}

impl RawValue {
    /// Reads the member selected by `vtype`.
    ///
    /// # Safety
    /// The union member named by `vtype` must be the one that was written.
    pub unsafe fn decode(&self) -> Result<MetricValue, RawDecodeError> {
        let kind = ValueKind::from_raw(self.vtype).ok_or(RawDecodeError::InvalidValueType(self.vtype))?;
        Ok(match kind {
            ValueKind::Int64 => MetricValue::Int64(self.value.v_int64),
            ValueKind::Uint64 => MetricValue::Uint64(self.value.v_uint64),
            ValueKind::Double => MetricValue::Double(self.value.v_double),
            ValueKind::Bool => MetricValue::Bool(self.value.v_bool != 0),
        })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawMapElement {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawMap {
    pub elements: *mut RawMapElement,
    pub length: c_int,
}

/// Error handed to the foreign side. Released with `dealloc_error`.
#[repr(C)]
#[derive(Debug)]
pub struct RawError {
    pub msg: *mut c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawTimestamp {
    pub sec: i64,
    pub nsec: c_int,
}

/// Every field is nullable; null means "not supplied".
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawModifiers {
    pub tags_to_add: *const RawMap,
    pub tags_to_remove: *const RawMap,
    pub timestamp: *const RawTimestamp,
    pub description: *const c_char,
    pub unit: *const c_char,
}

impl Default for RawModifiers {
    fn default() -> Self {
        RawModifiers {
            tags_to_add: ptr::null(),
            tags_to_remove: ptr::null(),
            timestamp: ptr::null(),
            description: ptr::null(),
            unit: ptr::null(),
        }
    }
}

/// Builds a `CString`, dropping interior NUL bytes instead of failing.
pub fn to_c_string(s: &str) -> CString {
    if s.as_bytes().contains(&0) {
        CString::new(s.replace('\0', "")).unwrap_or_default()
    } else {
        CString::new(s).unwrap_or_default()
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for `'a`.
pub unsafe fn read_str<'a>(ptr: *const c_char, what: &'static str) -> Result<&'a str, RawDecodeError> {
    if ptr.is_null() {
        return Err(RawDecodeError::NullPointer(what));
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| RawDecodeError::InvalidUtf8(what))
}

/// Like [`read_str`] but null yields `None`.
///
/// # Safety
/// Same as [`read_str`].
pub unsafe fn read_opt_string(ptr: *const c_char, what: &'static str) -> Result<Option<String>, RawDecodeError> {
    if ptr.is_null() {
        return Ok(None);
    }
    read_str(ptr, what).map(|s| Some(s.to_string()))
}

/// # Safety
/// `map` must be null or point to a `RawMap` whose `elements` holds `length`
/// entries, each with NUL-terminated key and value.
pub unsafe fn decode_map(map: *const RawMap) -> Result<Option<TagSet>, RawDecodeError> {
    if map.is_null() {
        return Ok(None);
    }
    let map = &*map;
    if map.length < 0 {
        return Err(RawDecodeError::NegativeLength(map.length));
    }
    if map.length == 0 {
        return Ok(Some(TagSet::new()));
    }
    if map.elements.is_null() {
        return Err(RawDecodeError::NullPointer("map elements"));
    }

    let elements = std::slice::from_raw_parts(map.elements, map.length as usize);
    let mut tags = TagSet::new();
    for element in elements {
        let key = read_str(element.key, "map key")?;
        let value = read_str(element.value, "map value")?;
        tags.insert(key, value);
    }
    Ok(Some(tags))
}

/// # Safety
/// `ts` must be null or point to a valid `RawTimestamp`.
pub unsafe fn decode_timestamp(ts: *const RawTimestamp) -> Result<Option<Timestamp>, RawDecodeError> {
    if ts.is_null() {
        return Ok(None);
    }
    let ts = &*ts;
    Ok(Some(Timestamp::new(ts.sec, i64::from(ts.nsec))?))
}

/// # Safety
/// `modifiers` must be null or point to a `RawModifiers` whose non-null fields
/// satisfy the contracts of [`decode_map`], [`decode_timestamp`] and [`read_str`].
pub unsafe fn decode_modifiers(modifiers: *const RawModifiers) -> Result<Option<Modifiers>, RawDecodeError> {
    if modifiers.is_null() {
        return Ok(None);
    }
    let raw = &*modifiers;

    let tags_to_remove = decode_map(raw.tags_to_remove)?
        .map(|tags| tags.keys().map(str::to_string).collect());

    Ok(Some(Modifiers {
        tags_to_add: decode_map(raw.tags_to_add)?,
        tags_to_remove,
        timestamp: decode_timestamp(raw.timestamp)?,
        description: read_opt_string(raw.description, "description")?,
        unit: read_opt_string(raw.unit, "unit")?,
    }))
}

/// A `RawMap` backed by owned storage, for callers building boundary input from Rust.
pub struct OwnedRawMap {
    _strings: Vec<CString>,
    elements: Vec<RawMapElement>,
    map: RawMap,
}

impl OwnedRawMap {
    pub fn new<K: AsRef<str>, V: AsRef<str>>(entries: &[(K, V)]) -> Self {
        let mut strings = Vec::with_capacity(entries.len() * 2);
        let mut elements = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            let key = to_c_string(k.as_ref());
            let value = to_c_string(v.as_ref());
            // CString's heap buffer doesn't move when the CString itself is moved
            elements.push(RawMapElement {
                key: key.as_ptr() as *mut c_char,
                value: value.as_ptr() as *mut c_char,
            });
            strings.push(key);
            strings.push(value);
        }
        let map = RawMap { elements: elements.as_mut_ptr(), length: elements.len() as c_int };
        OwnedRawMap { _strings: strings, elements, map }
    }

    pub fn as_ptr(&self) -> *const RawMap {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Owned counterpart of [`RawModifiers`]; the raw view stays valid while this lives.
#[derive(Default)]
pub struct OwnedRawModifiers {
    tags_to_add: Option<Box<OwnedRawMap>>,
    tags_to_remove: Option<Box<OwnedRawMap>>,
    timestamp: Option<Box<RawTimestamp>>,
    description: Option<CString>,
    unit: Option<CString>,
}

impl OwnedRawModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags_to_add<K: AsRef<str>, V: AsRef<str>>(mut self, tags: &[(K, V)]) -> Self {
        self.tags_to_add = Some(Box::new(OwnedRawMap::new(tags)));
        self
    }

    pub fn tags_to_remove<K: AsRef<str>>(mut self, keys: &[K]) -> Self {
        let entries: Vec<(&str, &str)> = keys.iter().map(|k| (k.as_ref(), "")).collect();
        self.tags_to_remove = Some(Box::new(OwnedRawMap::new(&entries)));
        self
    }

    pub fn timestamp(mut self, sec: i64, nsec: c_int) -> Self {
        self.timestamp = Some(Box::new(RawTimestamp { sec, nsec }));
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(to_c_string(description));
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(to_c_string(unit));
        self
    }

    /// Raw view borrowing this value's storage.
    pub fn as_raw(&self) -> RawModifiers {
        RawModifiers {
            tags_to_add: self.tags_to_add.as_ref().map_or(ptr::null(), |m| m.as_ptr()),
            tags_to_remove: self.tags_to_remove.as_ref().map_or(ptr::null(), |m| m.as_ptr()),
            timestamp: self.timestamp.as_deref().map_or(ptr::null(), |t| t as *const RawTimestamp),
            description: self.description.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            unit: self.unit.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(value: MetricValue) -> MetricValue {
        let raw = RawValue::from(value);
        unsafe { raw.decode() }.unwrap()
    }

    proptest! {
        #[test]
        fn int64_survives_the_boundary(v in any::<i64>()) {
            prop_assert_eq!(round_trip(MetricValue::Int64(v)), MetricValue::Int64(v));
        }

        #[test]
        fn uint64_survives_the_boundary(v in any::<u64>()) {
            prop_assert_eq!(round_trip(MetricValue::Uint64(v)), MetricValue::Uint64(v));
        }

        #[test]
        fn double_bits_survive_the_boundary(bits in any::<u64>()) {
            let v = f64::from_bits(bits);
            match round_trip(MetricValue::Double(v)) {
                MetricValue::Double(out) => prop_assert_eq!(out.to_bits(), bits),
                other => prop_assert!(false, "kind changed: {:?}", other),
            }
        }
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let raw = RawValue { value: RawValueUnion { v_int64: 7 }, vtype: 0 };
        assert_eq!(unsafe { raw.decode() }, Err(RawDecodeError::InvalidValueType(0)));

        let raw = RawValue { value: RawValueUnion { v_int64: 7 }, vtype: 9 };
        assert_eq!(unsafe { raw.decode() }, Err(RawDecodeError::InvalidValueType(9)));
    }

    #[test]
    fn any_nonzero_bool_is_true() {
        let raw = RawValue { value: RawValueUnion { v_bool: 42 }, vtype: ValueKind::Bool.as_raw() };
        assert_eq!(unsafe { raw.decode() }, Ok(MetricValue::Bool(true)));
        assert_eq!(round_trip(MetricValue::Bool(false)), MetricValue::Bool(false));
    }

    #[test]
    fn null_and_empty_maps_differ() {
        assert_eq!(unsafe { decode_map(ptr::null()) }, Ok(None));

        let empty = OwnedRawMap::new::<&str, &str>(&[]);
        assert_eq!(unsafe { decode_map(empty.as_ptr()) }, Ok(Some(TagSet::new())));

        let map = OwnedRawMap::new(&[("a", "1"), ("b", "2")]);
        let tags = unsafe { decode_map(map.as_ptr()) }.unwrap().unwrap();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn modifiers_decode_into_owned_values() {
        let owned = OwnedRawModifiers::new()
            .tags_to_add(&[("zone", "eu")])
            .tags_to_remove(&["host"])
            .timestamp(10, 5)
            .unit("ms");
        let raw = owned.as_raw();
        let decoded = unsafe { decode_modifiers(&raw) }.unwrap().unwrap();
        drop(owned);

        assert_eq!(decoded.tags_to_add.unwrap().get("zone"), Some("eu"));
        assert!(decoded.tags_to_remove.unwrap().contains("host"));
        assert_eq!(decoded.timestamp, Some(Timestamp::new(10, 5).unwrap()));
        assert_eq!(decoded.unit.as_deref(), Some("ms"));
        assert_eq!(decoded.description, None);
        assert_eq!(unsafe { decode_modifiers(ptr::null()) }, Ok(None));
    }

    #[test]
    fn out_of_range_timestamp_is_rejected() {
        let owned = OwnedRawModifiers::new().timestamp(1, 1_000_000_000);
        let raw = owned.as_raw();
        assert!(matches!(
            unsafe { decode_modifiers(&raw) },
            Err(RawDecodeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn interior_nul_is_stripped() {
        assert_eq!(to_c_string("a\0b").as_bytes(), b"ab");
    }
}
