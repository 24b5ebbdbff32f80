//! Background work for the cache: the throttled expiration sweeper.

pub(crate) mod sweeper;
