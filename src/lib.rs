//! Workspace root crate. Carries no runtime code of its own — it exists so
//! the integration tests under `tests/` can depend on every service and
//! library crate by path, the way `rusty-timer`'s root crate does for this
//! corpus.
