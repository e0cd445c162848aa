//! Reactive projection primitive.
//!
//! State lives in [`Source`] cells; every write stamps the cell with a fresh
//! version drawn from a process-wide monotonic clock.  A [`Memo`] caches a
//! derived value together with the versions of the sources it was computed
//! from, and recomputes lazily on read once any of them has moved.
//!
//! ```text
//! Source<total> ─┐
//!                ├─► Memo<bool>       (full_load)
//! Source<ids>  ──┤
//!                └─► Memo<Vec<R>>     (current_items) ◄── Source<db>, Source<query>
//! ```
//!
//! Dependencies are declared positionally at the read site; a memo must
//! always be read with the same dependency list.

use std::sync::atomic::{AtomicU64, Ordering};

pub type Version = u64;

static CLOCK: AtomicU64 = AtomicU64::new(1);

fn next_version() -> Version {
    CLOCK.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A versioned state cell.
#[derive(Debug, Clone)]
pub struct Source<T> {
    value: T,
    version: Version,
}

impl<T> Source<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            version: next_version(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.version = next_version();
    }

    /// Mutate in place.  Always counts as a change.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(&mut self.value);
        self.version = next_version();
        out
    }
}

impl<T: Default> Default for Source<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// ---------------------------------------------------------------------------
// Memo
// ---------------------------------------------------------------------------

/// A derived value memoised against its dependencies' versions.
#[derive(Debug)]
pub struct Memo<T> {
    cached: Option<(Vec<Version>, T)>,
    computations: u64,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self {
            cached: None,
            computations: 0,
        }
    }
}

impl<T: Clone> Memo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fresh(&self, deps: &[Version]) -> bool {
        matches!(&self.cached, Some((stamp, _)) if stamp.as_slice() == deps)
    }

    /// Read the value, recomputing if stale.
    pub fn read(&mut self, deps: &[Version], compute: impl FnOnce() -> T) -> T {
        match self.try_read::<std::convert::Infallible>(deps, || Ok(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Read a fallible projection.  Errors are returned, not cached.
    pub fn try_read<E>(
        &mut self,
        deps: &[Version],
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some((stamp, value)) = &self.cached {
            if stamp.as_slice() == deps {
                return Ok(value.clone());
            }
        }
        self.computations += 1;
        let value = compute()?;
        self.cached = Some((deps.to_vec(), value.clone()));
        Ok(value)
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// How many times the projection has been (re)computed.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_advance_version() {
        let mut s = Source::new(1);
        let v0 = s.version();
        s.set(2);
        assert!(s.version() > v0);
        let v1 = s.version();
        s.update(|x| *x += 1);
        assert!(s.version() > v1);
        assert_eq!(*s.get(), 3);
    }

    #[test]
    fn memo_recomputes_only_on_change() {
        let mut a = Source::new(2);
        let b = Source::new(3);
        let mut memo = Memo::new();

        let product = |a: &Source<i32>, b: &Source<i32>, memo: &mut Memo<i32>| {
            memo.read(&[a.version(), b.version()], || a.get() * b.get())
        };

        assert_eq!(product(&a, &b, &mut memo), 6);
        assert_eq!(product(&a, &b, &mut memo), 6);
        assert_eq!(memo.computations(), 1);

        a.set(4);
        assert!(!memo.is_fresh(&[a.version(), b.version()]));
        assert_eq!(product(&a, &b, &mut memo), 12);
        assert_eq!(memo.computations(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let s = Source::new(0);
        let mut memo: Memo<i32> = Memo::new();
        let r: Result<i32, &str> = memo.try_read(&[s.version()], || Err("boom"));
        assert!(r.is_err());
        let r: Result<i32, &str> = memo.try_read(&[s.version()], || Ok(1));
        assert_eq!(r, Ok(1));
        assert_eq!(memo.computations(), 2);
    }

    #[test]
    fn fresh_sources_never_collide_with_old_stamps() {
        let mut memo = Memo::new();
        let old = Source::new("old");
        memo.read(&[old.version()], || *old.get());
        let new = Source::new("new");
        assert_eq!(memo.read(&[new.version()], || *new.get()), "new");
    }
}
