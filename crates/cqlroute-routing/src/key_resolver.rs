//! Determining the lookup key for the current operation
//!
//! The router asks a [`LookupKeyResolver`] for the current key exactly once
//! per session request. Any `Fn() -> Option<K>` closure is a resolver; the
//! [`ContextLookupKeyResolver`] reads a key scoped to the current Tokio task
//! (see [`with_lookup_key`]) or, outside any task scope, to the current thread
//! (see [`set_thread_lookup_key`]).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::str::FromStr;

/// Supplies the lookup key for the current operation
pub trait LookupKeyResolver<K>: Send + Sync {
    /// `None` means no key is set for the current operation
    fn determine_current_lookup_key(&self) -> Option<K>;
}

impl<K, F> LookupKeyResolver<K> for F
where
    F: Fn() -> Option<K> + Send + Sync,
{
    fn determine_current_lookup_key(&self) -> Option<K> {
        self()
    }
}

tokio::task_local! {
    static CURRENT_LOOKUP_KEY: Option<String>;
}

thread_local! {
    /// Keys set by live guards, innermost last
    static THREAD_LOOKUP_KEYS: RefCell<Vec<(u64, String)>> = const { RefCell::new(Vec::new()) };
    static NEXT_GUARD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Run `future` with `key` as the lookup key of the current task
pub async fn with_lookup_key<F: Future>(key: impl Into<String>, future: F) -> F::Output {
    CURRENT_LOOKUP_KEY.scope(Some(key.into()), future).await
}

/// Run `future` with no lookup key, hiding any thread-level key
pub async fn without_lookup_key<F: Future>(future: F) -> F::Output {
    CURRENT_LOOKUP_KEY.scope(None, future).await
}

/// The raw lookup key in scope for the caller.
///
/// A task scope takes precedence over the thread-level key, even when the
/// task scope holds no key.
pub fn current_lookup_key() -> Option<String> {
    match CURRENT_LOOKUP_KEY.try_with(Clone::clone) {
        Ok(scoped) => scoped,
        Err(_) => THREAD_LOOKUP_KEYS.with(|keys| keys.borrow().last().map(|(_, key)| key.clone())),
    }
}

/// Set the thread-level lookup key until the returned guard is dropped.
///
/// Guards nest: the most recently created live guard supplies the key.
/// Dropping a guard only withdraws its own key, so guards may be dropped in
/// any order.
pub fn set_thread_lookup_key(key: impl Into<String>) -> LookupKeyGuard {
    let id = NEXT_GUARD_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    THREAD_LOOKUP_KEYS.with(|keys| keys.borrow_mut().push((id, key.into())));
    LookupKeyGuard {
        id,
        _not_send: PhantomData,
    }
}

/// Withdraws its thread-level lookup key on drop
#[must_use = "the lookup key is cleared as soon as the guard is dropped"]
pub struct LookupKeyGuard {
    id: u64,
    _not_send: PhantomData<*const ()>,
}

impl Drop for LookupKeyGuard {
    fn drop(&mut self) {
        THREAD_LOOKUP_KEYS.with(|keys| {
            let mut keys = keys.borrow_mut();
            if let Some(position) = keys.iter().rposition(|(id, _)| *id == self.id) {
                keys.remove(position);
            }
        });
    }
}

impl fmt::Debug for LookupKeyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupKeyGuard").field("id", &self.id).finish()
    }
}

/// Resolver that parses the task- or thread-scoped key into `K`.
///
/// Keys that fail to parse are treated as absent.
pub struct ContextLookupKeyResolver<K> {
    _key: PhantomData<fn() -> K>,
}

impl<K> ContextLookupKeyResolver<K> {
    pub fn new() -> Self {
        Self { _key: PhantomData }
    }
}

impl<K> Default for ContextLookupKeyResolver<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for ContextLookupKeyResolver<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContextLookupKeyResolver")
    }
}

impl<K> LookupKeyResolver<K> for ContextLookupKeyResolver<K>
where
    K: FromStr,
    K::Err: fmt::Display,
{
    fn determine_current_lookup_key(&self) -> Option<K> {
        let raw = current_lookup_key()?;
        match raw.parse() {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(key = %raw, error = %e, "Ignoring unparsable lookup key");
                None
            }
        }
    }
}
