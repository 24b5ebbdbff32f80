use crate::error::CacheError;

use std::any::{self, Any};
use std::sync::Arc;

/// A type-erased, shareable cached value.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

#[inline]
pub(crate) fn erase<V: Any + Send + Sync>(value: V) -> Value {
  Arc::new(value)
}

/// Reads a `V` out of an erased value.
///
/// A stored `Option<V>` holding `Some` also satisfies a request for `V`.
/// Anything else is a `TypeMismatch`.
pub(crate) fn downcast<V: Any + Clone>(value: &Value) -> Result<V, CacheError> {
  let any: &(dyn Any + Send + Sync) = &**value;

  if let Some(v) = any.downcast_ref::<V>() {
    return Ok(v.clone());
  }
  if let Some(Some(v)) = any.downcast_ref::<Option<V>>() {
    return Ok(v.clone());
  }

  Err(CacheError::TypeMismatch {
    requested: any::type_name::<V>(),
  })
}
