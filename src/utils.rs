// ABOUTME: Small shared helpers for request deserialization
// ABOUTME: double_option keeps "key absent" and "key: null" distinguishable in patches
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use serde::{Deserialize, Deserializer};

/// Deserializer for patch fields that must distinguish "absent" from "null".
///
/// Plain `Option<Option<T>>` collapses both to `None` because serde never
/// sees missing keys. With `#[serde(default, deserialize_with =
/// "double_option")]` the function only runs when the key is present, so a
/// missing key stays `None` while `null` becomes `Some(None)`.
///
/// # Errors
///
/// Propagates the inner type's deserialization error.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
