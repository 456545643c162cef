//! Ordered key/value field model carried by v2 frames.
//!
//! Keys are `[A-Za-z0-9_]{1,23}` and unique within one list. Values are
//! printable ASCII up to 95 bytes and may not contain the delimiters
//! `,` `*` `=` or line terminators. Insertion order is kept for
//! serialization; lookups are by key.

use core::fmt::Write;
use heapless::{String, Vec};

/// Maximum key length in bytes
pub const MAX_KEY_LEN: usize = 23;

/// Maximum value length in bytes
pub const MAX_VALUE_LEN: usize = 95;

/// Maximum number of fields in one frame
pub const MAX_FIELDS: usize = 40;

/// Errors raised while building or reading a field list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldError {
    /// Key is empty
    EmptyKey,
    /// Key is too long or contains characters outside `[A-Za-z0-9_]`
    InvalidKey,
    /// Value is too long or contains a delimiter / non-printable byte
    InvalidValue,
    /// Key already present in this list
    DuplicateKey,
    /// List already holds `MAX_FIELDS` entries
    TooManyFields,
}

/// A single `key=value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Field {
    key: String<MAX_KEY_LEN>,
    value: String<MAX_VALUE_LEN>,
}

impl Field {
    /// Create a validated field
    pub fn new(key: &str, value: &str) -> Result<Self, FieldError> {
        validate_key(key)?;
        validate_value(value)?;

        let mut k = String::new();
        k.push_str(key).map_err(|_| FieldError::InvalidKey)?;
        let mut v = String::new();
        v.push_str(value).map_err(|_| FieldError::InvalidValue)?;

        Ok(Self { key: k, value: v })
    }

    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    pub fn value(&self) -> &str {
        self.value.as_str()
    }
}

/// Check a key against `[A-Za-z0-9_]{1,23}`
pub fn validate_key(key: &str) -> Result<(), FieldError> {
    if key.is_empty() {
        return Err(FieldError::EmptyKey);
    }
    if key.len() > MAX_KEY_LEN
        || !key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(FieldError::InvalidKey);
    }
    Ok(())
}

/// Check a value: printable ASCII, no delimiters, at most 95 bytes
pub fn validate_value(value: &str) -> Result<(), FieldError> {
    if value.len() > MAX_VALUE_LEN {
        return Err(FieldError::InvalidValue);
    }
    let clean = value
        .bytes()
        .all(|b| (0x20..0x7F).contains(&b) && !matches!(b, b',' | b'*' | b'='));
    if !clean {
        return Err(FieldError::InvalidValue);
    }
    Ok(())
}

/// Ordered, key-unique list of fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FieldList {
    fields: Vec<Field, MAX_FIELDS>,
}

impl FieldList {
    /// Create an empty list
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Append a field, rejecting duplicates and overflow
    pub fn push(&mut self, key: &str, value: &str) -> Result<(), FieldError> {
        let field = Field::new(key, value)?;
        self.push_field(field)
    }

    /// Append an already validated field
    pub fn push_field(&mut self, field: Field) -> Result<(), FieldError> {
        if self.contains(field.key()) {
            return Err(FieldError::DuplicateKey);
        }
        self.fields
            .push(field)
            .map_err(|_| FieldError::TooManyFields)
    }

    /// Append an unsigned decimal value
    pub fn push_u32(&mut self, key: &str, value: u32) -> Result<(), FieldError> {
        let mut buf: String<12> = String::new();
        write!(buf, "{}", value).map_err(|_| FieldError::InvalidValue)?;
        self.push(key, &buf)
    }

    /// Append a signed decimal value
    pub fn push_i32(&mut self, key: &str, value: i32) -> Result<(), FieldError> {
        let mut buf: String<12> = String::new();
        write!(buf, "{}", value).map_err(|_| FieldError::InvalidValue)?;
        self.push(key, &buf)
    }

    /// Append a boolean as `0` / `1`
    pub fn push_bool(&mut self, key: &str, value: bool) -> Result<(), FieldError> {
        self.push(key, if value { "1" } else { "0" })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Look up a raw value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key() == key)
            .map(|f| f.value())
    }

    /// Look up and parse an unsigned value
    ///
    /// Returns `None` when the key is absent, `Some(Err)` when it is present
    /// but not a valid number.
    pub fn get_u32(&self, key: &str) -> Option<Result<u32, FieldError>> {
        self.get(key)
            .map(|v| v.parse::<u32>().map_err(|_| FieldError::InvalidValue))
    }

    /// Look up and parse a signed value
    pub fn get_i32(&self, key: &str) -> Option<Result<i32, FieldError>> {
        self.get(key)
            .map(|v| v.parse::<i32>().map_err(|_| FieldError::InvalidValue))
    }

    /// Look up a `0` / `1` flag
    pub fn get_bool(&self, key: &str) -> Option<Result<bool, FieldError>> {
        self.get(key).map(|v| match v {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(FieldError::InvalidValue),
        })
    }

    /// Same keys with the same values, in any order
    pub fn same_set(&self, other: &FieldList) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|f| other.get(f.key()) == Some(f.value()))
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}
