//! Key policies: how the table hashes and compares keys.
//!
//! A [`HashTable`] never calls [`Hash`] or [`Eq`] directly. Every hash and
//! every key comparison goes through a [`KeyPolicy`] value stored in the
//! table, so keys that cannot (or should not) implement the standard traits
//! can still be used by supplying a custom policy.
//!
//! [`HashTable`]: crate::HashTable

use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::hash::Hasher;

/// Multiplier of the scalar mixing hash.
const MIX_U32: u32 = 0x0100_8041;

/// djb2 seed.
const DJB2_SEED: u32 = 5381;

/// Hash and equality capability consumed by the table.
///
/// Implementations must keep `key_eq` an equivalence relation consistent with
/// `hash_key`: `key_eq(a, b)` implies `hash_key(a) == hash_key(b)`. Hash
/// quality only affects performance. An inconsistent policy makes lookups
/// miss but never causes undefined behavior; a hash that changes between
/// calls trips a debug assertion when the table rehashes in debug builds.
pub trait KeyPolicy<K: ?Sized> {
    /// Hashes `key`.
    fn hash_key(&self, key: &K) -> u64;

    /// Returns `true` when `a` and `b` denote the same key.
    fn key_eq(&self, a: &K, b: &K) -> bool;
}

/// Multiplicative mixing hash for values of at most 32 bits.
///
/// ```rust
/// use probe_hash::key_policy::hash_u32;
///
/// assert_eq!(hash_u32(0), 0);
/// assert_eq!(hash_u32(1), 0x0100_8041);
/// ```
#[inline(always)]
pub const fn hash_u32(x: u32) -> u64 {
    MIX_U32.wrapping_mul(x) as u64
}

/// Folds the two halves of `x` together and mixes them with [`hash_u32`].
#[inline(always)]
pub const fn hash_u64(x: u64) -> u64 {
    hash_u32((x as u32) ^ ((x >> 32) as u32))
}

/// djb2 over a byte slice (`h = h * 33 + b`, seeded with 5381).
///
/// ```rust
/// use probe_hash::key_policy::hash_bytes;
///
/// assert_eq!(hash_bytes(b""), 5381);
/// assert_eq!(hash_bytes(b"a"), 5381 * 33 + 97);
/// ```
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hash = DJB2_SEED;
    for &b in bytes {
        hash = (hash << 5).wrapping_add(hash).wrapping_add(b as u32);
    }
    hash as u64
}

/// A [`Hasher`] built on the scalar and byte mixing primitives.
///
/// This is the default hasher when neither the `foldhash` nor the `std`
/// feature is enabled. It is deterministic and unkeyed, so it offers no
/// protection against adversarial keys.
#[derive(Debug, Clone, Copy)]
pub struct MixHasher {
    state: u64,
}

impl Default for MixHasher {
    fn default() -> Self {
        Self {
            state: DJB2_SEED as u64,
        }
    }
}

impl Hasher for MixHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state = self.state.wrapping_mul(33).wrapping_add(b as u64);
        }
    }

    #[inline]
    fn write_u32(&mut self, n: u32) {
        self.write_u64(n as u64);
    }

    #[inline]
    fn write_u64(&mut self, n: u64) {
        self.state = self.state.rotate_left(5) ^ hash_u64(n) ^ n;
    }

    #[inline]
    fn write_usize(&mut self, n: usize) {
        self.write_u64(n as u64);
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used by [`HashPolicy`] when none is given.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used by [`HashPolicy`] when none is given.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// The hasher builder used by [`HashPolicy`] when none is given.
        pub type DefaultHashBuilder = core::hash::BuildHasherDefault<MixHasher>;
    }
}

/// Policy for keys implementing [`Hash`] and [`Eq`], hashed with a
/// [`BuildHasher`].
///
/// This is the default policy of [`HashTable`].
///
/// # Examples
///
/// ```rust
/// use probe_hash::HashTable;
/// use probe_hash::key_policy::HashPolicy;
///
/// let mut table = HashTable::with_policy(HashPolicy::new());
/// table.insert("alpha".to_string(), 1);
/// assert_eq!(table.lookup(&"alpha".to_string()), Some(&1));
/// ```
///
/// [`HashTable`]: crate::HashTable
#[derive(Clone, Default)]
pub struct HashPolicy<S = DefaultHashBuilder> {
    hash_builder: S,
}

impl<S> Debug for HashPolicy<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashPolicy").finish_non_exhaustive()
    }
}

impl HashPolicy {
    /// Creates a policy with a fresh [`DefaultHashBuilder`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> HashPolicy<S> {
    /// Creates a policy hashing with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self { hash_builder }
    }

    /// The wrapped hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }
}

impl<K, S> KeyPolicy<K> for HashPolicy<S>
where
    K: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    #[inline]
    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Trivially comparable keys: copied by value and compared with `==`.
pub trait ScalarKey: Copy + PartialEq {
    /// Mixes the key's bits into a hash.
    fn scalar_hash(self) -> u64;
}

macro_rules! impl_scalar_key {
    ($($t:ty),* $(,)?) => {
        $(
            impl ScalarKey for $t {
                #[inline(always)]
                fn scalar_hash(self) -> u64 {
                    if core::mem::size_of::<$t>() <= 4 {
                        hash_u32(self as u32)
                    } else {
                        hash_u64(self as u64)
                    }
                }
            }
        )*
    };
}

impl_scalar_key!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl ScalarKey for char {
    #[inline(always)]
    fn scalar_hash(self) -> u64 {
        hash_u32(self as u32)
    }
}

impl ScalarKey for bool {
    #[inline(always)]
    fn scalar_hash(self) -> u64 {
        hash_u32(self as u32)
    }
}

impl<T: ?Sized> ScalarKey for *const T {
    #[inline(always)]
    fn scalar_hash(self) -> u64 {
        (self.cast::<()>() as usize).scalar_hash()
    }
}

impl<T: ?Sized> ScalarKey for *mut T {
    #[inline(always)]
    fn scalar_hash(self) -> u64 {
        (self.cast::<()>() as usize).scalar_hash()
    }
}

/// Policy for [`ScalarKey`]s: integer mixing hash and `==`.
///
/// # Examples
///
/// ```rust
/// use probe_hash::HashTable;
/// use probe_hash::key_policy::ScalarPolicy;
///
/// let mut table = HashTable::with_policy(ScalarPolicy);
/// assert!(table.insert(7u32, "seven"));
/// assert!(table.contains(&7));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarPolicy;

impl<K: ScalarKey> KeyPolicy<K> for ScalarPolicy {
    #[inline(always)]
    fn hash_key(&self, key: &K) -> u64 {
        key.scalar_hash()
    }

    #[inline(always)]
    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Policy for byte-blob keys: djb2 over the bytes and byte-wise equality.
///
/// Fixed-length blobs such as `[u8; N]` carry their own length; any key
/// viewable as `&[u8]` works.
///
/// # Examples
///
/// ```rust
/// use probe_hash::HashTable;
/// use probe_hash::key_policy::BytesPolicy;
///
/// let mut table = HashTable::with_policy(BytesPolicy);
/// table.insert(*b"abcd", 1);
/// assert_eq!(table.lookup(b"abcd"), Some(&1));
/// assert_eq!(table.lookup(b"abce"), None);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesPolicy;

impl<K: AsRef<[u8]> + ?Sized> KeyPolicy<K> for BytesPolicy {
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        hash_bytes(key.as_ref())
    }

    #[inline]
    fn key_eq(&self, a: &K, b: &K) -> bool {
        a.as_ref() == b.as_ref()
    }
}

/// Policy assembled from a hash closure and an equality closure, for
/// composite keys.
///
/// # Examples
///
/// ```rust
/// use probe_hash::HashTable;
/// use probe_hash::key_policy::FnPolicy;
/// use probe_hash::key_policy::hash_u32;
///
/// #[derive(Clone, Copy)]
/// struct Pair {
///     a: i32,
///     b: i32,
/// }
///
/// let policy = FnPolicy::new(
///     |k: &Pair| hash_u32(k.a as u32) ^ hash_u32(k.b as u32),
///     |x: &Pair, y: &Pair| x.a == y.a && x.b == y.b,
/// );
/// let mut table = HashTable::with_policy(policy);
/// table.insert(Pair { a: 1, b: 2 }, "one-two");
/// assert_eq!(table.lookup(&Pair { a: 1, b: 2 }), Some(&"one-two"));
/// ```
#[derive(Clone, Copy)]
pub struct FnPolicy<H, E> {
    hash: H,
    eq: E,
}

impl<H, E> Debug for FnPolicy<H, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnPolicy").finish_non_exhaustive()
    }
}

impl<H, E> FnPolicy<H, E> {
    /// Creates a policy from `hash` and `eq`.
    pub const fn new(hash: H, eq: E) -> Self {
        Self { hash, eq }
    }
}

impl<K, H, E> KeyPolicy<K> for FnPolicy<H, E>
where
    K: ?Sized,
    H: Fn(&K) -> u64,
    E: Fn(&K, &K) -> bool,
{
    #[inline(always)]
    fn hash_key(&self, key: &K) -> u64 {
        (self.hash)(key)
    }

    #[inline(always)]
    fn key_eq(&self, a: &K, b: &K) -> bool {
        (self.eq)(a, b)
    }
}

#[cfg(test)]
mod tests {
    use core::hash::BuildHasherDefault;

    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone, Copy, Default)]
    struct SipHashBuilder;

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(0x0123_4567, 0x89ab_cdef)
        }
    }

    #[test]
    fn scalar_hash_uses_width() {
        assert_eq!(5u8.scalar_hash(), hash_u32(5));
        assert_eq!((-1i32).scalar_hash(), hash_u32(u32::MAX));
        assert_eq!(5u64.scalar_hash(), hash_u64(5));
        assert_eq!(((1u64 << 32) | 3).scalar_hash(), hash_u32(1 ^ 3));
        assert_eq!('a'.scalar_hash(), hash_u32(97));
        assert_eq!(true.scalar_hash(), hash_u32(1));
    }

    #[test]
    fn scalar_hash_spreads_sequential_keys() {
        let mask = 255;
        let mut seen = [false; 256];
        for k in 0..256u32 {
            let slot = k.scalar_hash() as usize & mask;
            assert!(!seen[slot], "sequential key {k} collided at slot {slot}");
            seen[slot] = true;
        }
    }

    #[test]
    fn pointer_keys_hash_by_address() {
        let values = [1u8, 2u8];
        let a: *const u8 = &values[0];
        let b: *const u8 = &values[1];
        assert!(ScalarPolicy.key_eq(&a, &a));
        assert!(!ScalarPolicy.key_eq(&a, &b));
        assert_eq!(ScalarPolicy.hash_key(&a), (a as usize).scalar_hash());
    }

    #[test]
    fn bytes_policy_compares_contents() {
        let a = *b"key-0001";
        let b = *b"key-0001";
        let c = *b"key-0002";
        assert!(BytesPolicy.key_eq(&a, &b));
        assert!(!BytesPolicy.key_eq(&a, &c));
        assert_eq!(BytesPolicy.hash_key(&a), BytesPolicy.hash_key(&b));
        assert_eq!(BytesPolicy.hash_key("abc"), hash_bytes(b"abc"));
    }

    #[test]
    fn hash_policy_is_consistent() {
        let policy = HashPolicy::with_hasher(SipHashBuilder);
        let a = alloc::string::String::from("hello");
        let b = alloc::string::String::from("hello");
        assert!(policy.key_eq(&a, &b));
        assert_eq!(policy.hash_key(&a), policy.hash_key(&b));
        assert_eq!(policy.hash_key(&a), SipHashBuilder.hash_one(&a));
    }

    #[test]
    fn mix_hasher_distinguishes_inputs() {
        let builder = BuildHasherDefault::<MixHasher>::default();
        assert_eq!(builder.hash_one(42u64), builder.hash_one(42u64));
        assert_ne!(builder.hash_one(42u64), builder.hash_one(43u64));
        assert_ne!(builder.hash_one("ab"), builder.hash_one("ba"));
    }

    #[test]
    fn fn_policy_forwards() {
        let policy = FnPolicy::new(
            |k: &(i32, i32)| k.0 as u64,
            |a: &(i32, i32), b: &(i32, i32)| a == b,
        );
        assert_eq!(policy.hash_key(&(9, 1)), 9);
        assert!(policy.key_eq(&(1, 2), &(1, 2)));
        assert!(!policy.key_eq(&(1, 2), &(2, 1)));
    }
}
