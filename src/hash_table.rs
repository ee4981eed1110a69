//! The linear-probing table engine.
//!
//! A [`HashTable`] owns one allocation split into three regions of
//! `capacity` slots each: a control byte per slot, the keys, and the values.
//! The control byte is [`EMPTY`], [`GRAVE`], or a 7-bit tag taken from the
//! key's hash. Probing only reads control bytes and keys; values are touched
//! once the key matches.

use alloc::alloc::handle_alloc_error;
use alloc::boxed::Box;
use alloc::string::String;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::config::TableConfig;
use crate::error::ConfigError;
use crate::key_policy::HashPolicy;
use crate::key_policy::KeyPolicy;

/// Control byte of a slot that has never held an entry since the last
/// rehash. Probing stops here.
///
/// Occupied tags never have the high bit set, so `tag & 0x80 == 0` tells
/// live slots apart from both markers.
const EMPTY: u8 = 0x80;

/// Control byte of a removed entry. Probing steps over it.
const GRAVE: u8 = 0xFE;

#[inline(always)]
fn hashtag(hash: u64) -> u8 {
    (hash.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 57) as u8
}

#[inline(always)]
fn is_live(tag: u8) -> bool {
    tag & 0x80 == 0
}

#[inline(always)]
fn slot_char(tag: u8) -> char {
    match tag {
        EMPTY => '.',
        GRAVE => '+',
        _ => '#',
    }
}

#[derive(Debug)]
struct DataLayout {
    layout: Layout,
    keys_offset: usize,
    values_offset: usize,
}

impl DataLayout {
    fn new<K, V>(capacity: usize) -> Self {
        let tags_layout = Layout::array::<u8>(capacity).expect("allocation size overflow");
        let keys_layout =
            Layout::array::<MaybeUninit<K>>(capacity).expect("allocation size overflow");
        let values_layout =
            Layout::array::<MaybeUninit<V>>(capacity).expect("allocation size overflow");

        let (layout, keys_offset) = tags_layout
            .extend(keys_layout)
            .expect("allocation size overflow");
        let (layout, values_offset) = layout
            .extend(values_layout)
            .expect("allocation size overflow");

        DataLayout {
            layout: layout.pad_to_align(),
            keys_offset,
            values_offset,
        }
    }
}

/// Allocates a block for `capacity` slots with every control byte `EMPTY`.
fn allocate(layout: &DataLayout, capacity: usize) -> NonNull<u8> {
    debug_assert!(capacity > 0);
    // SAFETY: The layout holds at least `capacity` control bytes, so it is
    // never zero-sized. Allocation failure is routed to `handle_alloc_error`.
    unsafe {
        let raw_alloc = alloc::alloc::alloc(layout.layout);
        if raw_alloc.is_null() {
            handle_alloc_error(layout.layout);
        }
        core::ptr::write_bytes(raw_alloc, EMPTY, capacity);
        NonNull::new_unchecked(raw_alloc)
    }
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

/// Statistics about the current table layout.
///
/// Available under the `stats` feature (and always in tests).
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries
    pub len: usize,
    /// Number of slots
    pub capacity: usize,
    /// Number of graves
    pub graves: usize,
    /// Number of empty slots
    pub empty: usize,
    /// Live entries per slot
    pub load_factor: f64,
    /// Graves per slot
    pub grave_ratio: f64,
    /// Longest distance between a live entry and its home slot
    pub max_probe: usize,
    /// Mean distance between live entries and their home slots
    pub mean_probe: f64,
    /// Bytes held by the table's allocation
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.len,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Graves: {} ({:.2}% of slots), empty: {}",
            self.graves,
            self.grave_ratio * 100.0,
            self.empty
        );
        println!(
            "Probe distance: max {}, mean {:.3}",
            self.max_probe, self.mean_probe
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
    }
}

/// An open-addressing hash table with linear probing and tombstone deletion.
///
/// `HashTable<K, V, P>` maps keys of type `K` to values of type `V`. Hashing
/// and key comparison go through the [`KeyPolicy`] `P`, which defaults to
/// [`HashPolicy`] (`K: Hash + Eq` with the crate's default hasher).
///
/// The table starts with 8 slots. It doubles before an insertion would push
/// the live entries over the density threshold, and rehashes in place once
/// graves left by removals exceed the grave threshold (see [`TableConfig`]).
///
/// References returned by lookups borrow the table, so any mutation (which
/// may move every entry during a rehash) ends them.
///
/// ## Example
///
/// ```rust
/// use probe_hash::HashTable;
///
/// let mut table: HashTable<u64, String> = HashTable::new();
/// for i in 0..100 {
///     assert!(table.insert(i, i.to_string()));
/// }
/// assert_eq!(table.len(), 100);
/// assert_eq!(table.capacity(), 256);
/// assert_eq!(table.lookup(&42).map(String::as_str), Some("42"));
/// ```
pub struct HashTable<K, V, P = HashPolicy> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    capacity: usize,
    populated: usize,
    graves: usize,

    config: TableConfig,
    policy: P,

    _phantom: PhantomData<(K, V)>,
}

// SAFETY: The table exclusively owns its keys and values; the raw allocation
// is never shared outside of borrows tied to the table.
unsafe impl<K: Send, V: Send, P: Send> Send for HashTable<K, V, P> {}

// SAFETY: Shared access only hands out shared references to keys and values.
unsafe impl<K: Sync, V: Sync, P: Sync> Sync for HashTable<K, V, P> {}

impl<K, V, P> Debug for HashTable<K, V, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.populated)
            .field("capacity", &self.capacity)
            .field("graves", &self.graves)
            .field("slots", &self.slot_map())
            .finish()
    }
}

impl<K, V, P> Clone for HashTable<K, V, P>
where
    K: Clone,
    V: Clone,
    P: Clone,
{
    fn clone(&self) -> Self {
        let mut table = Self::from_parts(self.config, self.policy.clone(), self.capacity);

        for index in 0..self.capacity {
            // SAFETY: `index` is below both tables' capacity, and a live tag
            // guarantees the key and value at `index` are initialized. The
            // clone's tag is only set after its slot is written, so a panic
            // while cloning leaves it droppable.
            unsafe {
                let tag = self.tag(index);
                if is_live(tag) {
                    let key = self.key(index).clone();
                    let value = self.value(index).clone();
                    table.key_ptr(index).write(key);
                    table.value_ptr(index).write(value);
                    table.set_tag(index, tag);
                    table.populated += 1;
                } else if tag == GRAVE {
                    table.set_tag(index, GRAVE);
                    table.graves += 1;
                }
            }
        }

        debug_assert_eq!(table.populated, self.populated);
        table
    }
}

impl<K, V, P> Drop for HashTable<K, V, P> {
    fn drop(&mut self) {
        self.drop_live();
        // SAFETY: `alloc` was allocated with `layout` and is released once.
        unsafe {
            alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
        }
    }
}

impl<K, V, P: Default> Default for HashTable<K, V, P> {
    fn default() -> Self {
        Self::with_policy(P::default())
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an empty table with 8 slots and the default policy.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let table: HashTable<i32, i32> = HashTable::new();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 8);
    /// ```
    pub fn new() -> Self {
        Self::with_policy(HashPolicy::default())
    }

    /// Creates an empty table from `config` with the default policy.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    /// use probe_hash::TableConfig;
    ///
    /// let config = TableConfig::new().with_initial_capacity(50);
    /// let table: HashTable<i32, i32> = HashTable::with_config(config).unwrap();
    /// assert_eq!(table.capacity(), 64);
    ///
    /// let bad = TableConfig::new().with_grave_threshold(0.0);
    /// assert!(HashTable::<i32, i32>::with_config(bad).is_err());
    /// ```
    pub fn with_config(config: TableConfig) -> Result<Self, ConfigError> {
        Self::with_config_and_policy(config, HashPolicy::default())
    }

    /// Creates a heap-allocated empty table with the default policy.
    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }
}

impl<K, V, P> HashTable<K, V, P> {
    /// Creates an empty table with 8 slots hashing through `policy`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    /// use probe_hash::key_policy::ScalarPolicy;
    ///
    /// let mut table = HashTable::with_policy(ScalarPolicy);
    /// table.insert(3u64, 'c');
    /// assert_eq!(table.lookup(&3), Some(&'c'));
    /// ```
    pub fn with_policy(policy: P) -> Self {
        let config = TableConfig::new();
        Self::from_parts(config, policy, config.initial_slots())
    }

    /// Creates an empty table from a validated `config` hashing through
    /// `policy`.
    pub fn with_config_and_policy(config: TableConfig, policy: P) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(config, policy, config.initial_slots()))
    }

    /// Creates a heap-allocated empty table hashing through `policy`.
    pub fn boxed_with_policy(policy: P) -> Box<Self> {
        Box::new(Self::with_policy(policy))
    }

    fn from_parts(config: TableConfig, policy: P, capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let layout = DataLayout::new::<K, V>(capacity);
        let alloc = allocate(&layout, capacity);

        Self {
            layout,
            alloc,
            capacity,
            populated: 0,
            graves: 0,
            config,
            policy,
            _phantom: PhantomData,
        }
    }

    #[inline(always)]
    fn tags_ptr(&self) -> *mut u8 {
        self.alloc.as_ptr()
    }

    #[inline(always)]
    fn keys_ptr(&self) -> *mut K {
        // SAFETY: `keys_offset` lies within the allocation described by
        // `layout`.
        unsafe { self.alloc.as_ptr().add(self.layout.keys_offset).cast() }
    }

    #[inline(always)]
    fn values_ptr(&self) -> *mut V {
        // SAFETY: `values_offset` lies within the allocation described by
        // `layout`.
        unsafe { self.alloc.as_ptr().add(self.layout.values_offset).cast() }
    }

    /// Control byte at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index < self.capacity`.
    #[inline(always)]
    unsafe fn tag(&self, index: usize) -> u8 {
        // SAFETY: Caller ensures `index` is within the control bytes.
        unsafe { *self.tags_ptr().add(index) }
    }

    /// Set the control byte at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index < self.capacity`.
    #[inline(always)]
    unsafe fn set_tag(&mut self, index: usize, tag: u8) {
        // SAFETY: Caller ensures `index` is within the control bytes.
        unsafe { *self.tags_ptr().add(index) = tag }
    }

    /// # Safety
    ///
    /// The caller must ensure `index < self.capacity`.
    #[inline(always)]
    unsafe fn key_ptr(&self, index: usize) -> *mut K {
        // SAFETY: Caller ensures `index` is within the keys region.
        unsafe { self.keys_ptr().add(index) }
    }

    /// # Safety
    ///
    /// The caller must ensure `index < self.capacity`.
    #[inline(always)]
    unsafe fn value_ptr(&self, index: usize) -> *mut V {
        // SAFETY: Caller ensures `index` is within the values region.
        unsafe { self.values_ptr().add(index) }
    }

    /// # Safety
    ///
    /// The caller must ensure `index < self.capacity` and that the slot is
    /// live.
    #[inline(always)]
    unsafe fn key(&self, index: usize) -> &K {
        // SAFETY: Caller ensures the slot is in bounds and initialized.
        unsafe { &*self.key_ptr(index) }
    }

    /// # Safety
    ///
    /// The caller must ensure `index < self.capacity` and that the slot is
    /// live.
    #[inline(always)]
    unsafe fn value(&self, index: usize) -> &V {
        // SAFETY: Caller ensures the slot is in bounds and initialized.
        unsafe { &*self.value_ptr(index) }
    }

    /// Moves the entry at `index` out and leaves a grave behind.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index < self.capacity` and that the slot is
    /// live.
    unsafe fn take(&mut self, index: usize) -> (K, V) {
        // SAFETY: Caller ensures the slot is in bounds and initialized; the
        // grave tag makes sure it is not read again.
        unsafe {
            debug_assert!(is_live(self.tag(index)));
            let key = self.key_ptr(index).read();
            let value = self.value_ptr(index).read();
            self.set_tag(index, GRAVE);
            self.populated -= 1;
            self.graves += 1;
            (key, value)
        }
    }

    fn drop_live(&mut self) {
        if !(core::mem::needs_drop::<K>() || core::mem::needs_drop::<V>()) || self.populated == 0
        {
            return;
        }

        for index in 0..self.capacity {
            // SAFETY: `index` is in bounds and a live tag guarantees both the
            // key and value are initialized.
            unsafe {
                if is_live(self.tag(index)) {
                    self.key_ptr(index).drop_in_place();
                    self.value_ptr(index).drop_in_place();
                }
            }
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of slots, always a power of two.
    ///
    /// Unlike `std` collections this is the slot count, not the number of
    /// entries the table can hold before growing; that is
    /// `capacity * density_threshold`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of graves (slots of removed entries).
    pub fn graves(&self) -> usize {
        self.graves
    }

    /// The table's configuration.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// The table's key policy.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Removes every entry and grave, keeping the current capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32, i32> = (0..20).map(|i| (i, i)).collect();
    /// table.remove(&3);
    /// let capacity = table.capacity();
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.graves(), 0);
    /// assert_eq!(table.capacity(), capacity);
    /// ```
    pub fn clear(&mut self) {
        self.drop_live();
        // SAFETY: The control bytes occupy the first `capacity` bytes of the
        // allocation.
        unsafe {
            core::ptr::write_bytes(self.tags_ptr(), EMPTY, self.capacity);
        }
        self.populated = 0;
        self.graves = 0;
    }

    /// Returns an iterator over `(&K, &V)` in slot order.
    ///
    /// The order is unspecified and changes whenever the table rehashes.
    pub fn iter(&self) -> Iter<'_, K, V, P> {
        Iter {
            table: self,
            index: 0,
            remaining: self.populated,
        }
    }

    /// Returns an iterator over `(&K, &mut V)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<&str, i32> = HashTable::new();
    /// table.insert("a", 1);
    /// table.insert("b", 2);
    /// for (_, value) in table.iter_mut() {
    ///     *value *= 10;
    /// }
    /// assert_eq!(table.lookup(&"b"), Some(&20));
    /// ```
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            tags: self.tags_ptr(),
            keys: self.keys_ptr(),
            values: self.values_ptr(),
            capacity: self.capacity,
            index: 0,
            remaining: self.populated,
            _marker: PhantomData,
        }
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<'_, K, V, P> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values.
    pub fn values(&self) -> Values<'_, K, V, P> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator that removes and yields every entry.
    ///
    /// Once the iterator is dropped the table is empty, graves included,
    /// and keeps its capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32, i32> = (0..10).map(|i| (i, i * i)).collect();
    /// let mut drained: Vec<(i32, i32)> = table.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained[3], (3, 9));
    /// assert!(table.is_empty());
    /// assert_eq!(table.graves(), 0);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V, P> {
        Drain {
            table: self,
            index: 0,
        }
    }

    fn slot_map(&self) -> String {
        (0..self.capacity)
            // SAFETY: `index` is below `capacity`.
            .map(|index| slot_char(unsafe { self.tag(index) }))
            .collect()
    }

    /// Renders the table header and one character per slot: `#` for a live
    /// entry, `+` for a grave and `.` for an empty slot.
    ///
    /// The format is meant for debugging and may change.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    /// use probe_hash::key_policy::FnPolicy;
    ///
    /// let policy = FnPolicy::new(|k: &u64| *k, |a: &u64, b: &u64| a == b);
    /// let mut table = HashTable::with_policy(policy);
    /// table.insert(1, ());
    /// table.insert(2, ());
    /// table.remove(&1);
    /// assert_eq!(table.dump(), "len 1, cap 8, graves 1\n.+#.....");
    /// ```
    pub fn dump(&self) -> String {
        alloc::format!(
            "len {}, cap {}, graves {}\n{}",
            self.populated,
            self.capacity,
            self.graves,
            self.slot_map()
        )
    }

    /// Prints [`dump`](Self::dump) to stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("{}", self.dump());
    }
}

impl<K, V, P> HashTable<K, V, P>
where
    P: KeyPolicy<K>,
{
    /// Walks the probe sequence of `key`: graves are skipped, an empty slot
    /// ends the search.
    #[inline]
    fn probe(&self, hash: u64, key: &K) -> Probe {
        let tag = hashtag(hash);
        let mask = self.capacity - 1;
        let mut index = hash as usize & mask;

        for _ in 0..self.capacity {
            // SAFETY: `index` is masked to the capacity, and a matching tag
            // marks a live slot.
            unsafe {
                let slot = self.tag(index);
                if slot == EMPTY {
                    return Probe::Vacant(index);
                }
                if slot == tag && self.policy.key_eq(self.key(index), key) {
                    return Probe::Found(index);
                }
            }
            index = (index + 1) & mask;
        }

        unreachable!("probe sequence without an empty slot")
    }

    /// First empty slot on the probe sequence of `hash`.
    fn vacant_slot(&self, hash: u64) -> usize {
        let mask = self.capacity - 1;
        let mut index = hash as usize & mask;
        // SAFETY: `index` is masked to the capacity.
        while unsafe { self.tag(index) } != EMPTY {
            index = (index + 1) & mask;
        }
        index
    }

    #[inline]
    fn find_index(&self, key: &K) -> Option<usize> {
        let hash = self.policy.hash_key(key);
        match self.probe(hash, key) {
            Probe::Found(index) => Some(index),
            Probe::Vacant(_) => None,
        }
    }

    /// Moves every live entry into a fresh allocation of `capacity` slots,
    /// dropping all graves.
    ///
    /// Entries are copied bitwise; the old allocation stays authoritative
    /// until all of them are placed, so a panicking policy leaks the new
    /// allocation instead of dropping anything twice.
    fn rehash_to(&mut self, capacity: usize) {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(self.populated < capacity);

        let layout = DataLayout::new::<K, V>(capacity);
        let alloc = allocate(&layout, capacity);
        let mask = capacity - 1;

        // SAFETY: Every old index is below the old capacity and only live
        // slots are read. New indices are masked to the new capacity, and
        // the new allocation has room for every live entry because
        // `populated < capacity`.
        unsafe {
            let new_tags = alloc.as_ptr();
            let new_keys = alloc.as_ptr().add(layout.keys_offset).cast::<K>();
            let new_values = alloc.as_ptr().add(layout.values_offset).cast::<V>();

            for old in 0..self.capacity {
                let tag = self.tag(old);
                if !is_live(tag) {
                    continue;
                }

                let hash = self.policy.hash_key(self.key(old));
                debug_assert_eq!(tag, hashtag(hash));
                let mut index = hash as usize & mask;
                while *new_tags.add(index) != EMPTY {
                    index = (index + 1) & mask;
                }

                *new_tags.add(index) = tag;
                core::ptr::copy_nonoverlapping(self.key_ptr(old), new_keys.add(index), 1);
                core::ptr::copy_nonoverlapping(self.value_ptr(old), new_values.add(index), 1);
            }

            alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
        }

        log_trace!(
            "rehashed {} entries from {} to {} slots, dropped {} graves",
            self.populated,
            self.capacity,
            capacity,
            self.graves
        );

        self.alloc = alloc;
        self.layout = layout;
        self.capacity = capacity;
        self.graves = 0;
    }

    /// Grows or compacts ahead of writing one new entry. Returns `true` if
    /// the table was rehashed.
    ///
    /// Growth wins when both thresholds are crossed; it drops graves too.
    /// `remove` keeps graves under the threshold, so the compaction branch
    /// only fires after graves piled up elsewhere, e.g. a leaked [`Drain`].
    fn make_room(&mut self) -> bool {
        if self.config.exceeds_density(self.populated + 1, self.capacity) {
            let floor = self.capacity.checked_mul(2).expect("capacity overflow");
            let capacity = self.config.capacity_for(self.populated + 1, floor);
            log_debug!(
                "growing from {} to {} slots at {} live entries",
                self.capacity,
                capacity,
                self.populated
            );
            self.rehash_to(capacity);
            true
        } else if self.config.exceeds_graves(self.graves, self.capacity) {
            log_debug!(
                "compacting {} graves at {} slots before insert",
                self.graves,
                self.capacity
            );
            self.rehash_to(self.capacity);
            true
        } else {
            false
        }
    }

    fn maybe_compact(&mut self) {
        if self.config.exceeds_graves(self.graves, self.capacity) {
            log_debug!(
                "compacting {} graves at {} slots",
                self.graves,
                self.capacity
            );
            self.rehash_to(self.capacity);
        }
    }

    /// Returns a reference to the value stored for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32, &str> = HashTable::new();
    /// table.insert(1, "a");
    /// assert_eq!(table.lookup(&1), Some(&"a"));
    /// assert_eq!(table.lookup(&2), None);
    /// ```
    #[inline]
    pub fn lookup(&self, key: &K) -> Option<&V> {
        // SAFETY: `find_index` only returns in-bounds live slots.
        self.find_index(key)
            .map(|index| unsafe { self.value(index) })
    }

    /// Returns a mutable reference to the value stored for `key`.
    #[inline]
    pub fn lookup_mut(&mut self, key: &K) -> Option<&mut V> {
        // SAFETY: `find_index` only returns in-bounds live slots, and the
        // returned borrow is tied to `&mut self`.
        self.find_index(key)
            .map(|index| unsafe { &mut *self.value_ptr(index) })
    }

    /// Returns the stored key and value for `key`.
    #[inline]
    pub fn lookup_key_value(&self, key: &K) -> Option<(&K, &V)> {
        // SAFETY: `find_index` only returns in-bounds live slots.
        self.find_index(key)
            .map(|index| unsafe { (self.key(index), self.value(index)) })
    }

    /// Returns `true` if the table holds `key`.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.find_index(key).is_some()
    }

    /// Inserts `key` with `value` if the key is absent.
    ///
    /// Returns `false`, leaving the table untouched and dropping `key` and
    /// `value`, when the key is already present. Use
    /// [`update`](Self::update) to overwrite.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32, &str> = HashTable::new();
    /// assert!(table.insert(37, "a"));
    /// assert!(!table.insert(37, "b"));
    /// assert_eq!(table.lookup(&37), Some(&"a"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> bool {
        match self.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Stores `value` for `key`, overwriting any previous value.
    ///
    /// Returns `true` if the key was new.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32, &str> = HashTable::new();
    /// assert!(table.update(37, "a"));
    /// assert!(!table.update(37, "b"));
    /// assert_eq!(table.lookup(&37), Some(&"b"));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn update(&mut self, key: K, value: V) -> bool {
        match self.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(value);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Removes `key`, returning its value if it was present.
    ///
    /// The slot becomes a grave. If graves now exceed the grave threshold
    /// the table is rehashed at its current capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32, &str> = HashTable::new();
    /// table.insert(1, "a");
    /// assert_eq!(table.remove(&1), Some("a"));
    /// assert_eq!(table.remove(&1), None);
    /// assert_eq!(table.graves(), 1);
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes `key`, returning the stored key and value if it was present.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let index = self.find_index(key)?;
        Some(OccupiedEntry { table: self, index }.remove_entry())
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// When the key is absent and inserting it would cross the density
    /// threshold, the table grows here, before the vacant entry is handed
    /// out. The growth sticks even if the vacant entry is then dropped or
    /// turned back into its key with [`VacantEntry::into_key`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut counts: HashTable<&str, u32> = HashTable::new();
    /// for word in ["a", "b", "a"] {
    ///     *counts.entry(word).or_insert(0) += 1;
    /// }
    /// assert_eq!(counts.lookup(&"a"), Some(&2));
    /// assert_eq!(counts.lookup(&"b"), Some(&1));
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, P> {
        let hash = self.policy.hash_key(&key);
        match self.probe(hash, &key) {
            Probe::Found(index) => Entry::Occupied(OccupiedEntry { table: self, index }),
            Probe::Vacant(mut index) => {
                if self.make_room() {
                    index = self.vacant_slot(hash);
                }
                Entry::Vacant(VacantEntry {
                    table: self,
                    key,
                    tag: hashtag(hash),
                    index,
                })
            }
        }
    }

    /// Rebuilds the table with at least `capacity` slots, dropping all
    /// graves.
    ///
    /// `capacity` is rounded up to a power of two and never below what the
    /// density threshold requires for the current entries, so this can
    /// shrink a sparse table but never overfill it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32, i32> = (0..100).map(|i| (i, i)).collect();
    /// for i in (1..100).step_by(2) {
    ///     table.remove(&i);
    /// }
    /// assert!(table.graves() > 0);
    ///
    /// table.rehash(table.capacity());
    /// assert_eq!(table.graves(), 0);
    /// assert_eq!(table.len(), 50);
    ///
    /// table.rehash(1);
    /// assert_eq!(table.capacity(), 128);
    /// ```
    pub fn rehash(&mut self, capacity: usize) {
        let capacity = self.config.capacity_for(self.populated, capacity);
        log_debug!(
            "explicit rehash from {} to {} slots",
            self.capacity,
            capacity
        );
        self.rehash_to(capacity);
    }

    /// Grows the table so that `additional` more entries fit without
    /// crossing the density threshold.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32, i32> = HashTable::new();
    /// table.reserve(100);
    /// assert_eq!(table.capacity(), 256);
    /// for i in 0..100 {
    ///     table.insert(i, i);
    /// }
    /// assert_eq!(table.capacity(), 256);
    /// ```
    pub fn reserve(&mut self, additional: usize) {
        let required = self
            .populated
            .checked_add(additional)
            .expect("capacity overflow");
        if self.config.exceeds_density(required, self.capacity) {
            let capacity = self.config.capacity_for(required, self.capacity);
            log_debug!(
                "reserving {} entries: {} to {} slots",
                additional,
                self.capacity,
                capacity
            );
            self.rehash_to(capacity);
        }
    }

    /// Counts live entries by their distance from their home slot.
    ///
    /// Index `d` of the result is the number of entries found `d` steps
    /// past `hash(key) mod capacity`. Graves crossed count as steps.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> alloc::vec::Vec<usize> {
        let mut hist = alloc::vec::Vec::new();
        let mask = self.capacity - 1;

        for index in 0..self.capacity {
            // SAFETY: `index` is in bounds and only live keys are read.
            unsafe {
                if !is_live(self.tag(index)) {
                    continue;
                }
                let home = self.policy.hash_key(self.key(index)) as usize & mask;
                let distance = index.wrapping_sub(home) & mask;
                if hist.len() <= distance {
                    hist.resize(distance + 1, 0);
                }
                hist[distance] += 1;
            }
        }

        hist
    }

    /// Returns occupancy and probe-distance statistics.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let hist = self.probe_histogram();
        let total_distance: usize = hist.iter().enumerate().map(|(d, n)| d * n).sum();

        DebugStats {
            len: self.populated,
            capacity: self.capacity,
            graves: self.graves,
            empty: self.capacity - self.populated - self.graves,
            load_factor: self.populated as f64 / self.capacity as f64,
            grave_ratio: self.graves as f64 / self.capacity as f64,
            max_probe: hist.len().saturating_sub(1),
            mean_probe: if self.populated == 0 {
                0.0
            } else {
                total_distance as f64 / self.populated as f64
            },
            total_bytes: self.layout.layout.size(),
        }
    }
}

impl<K, V, P> Extend<(K, V)> for HashTable<K, V, P>
where
    P: KeyPolicy<K>,
{
    /// Updates the table with every pair; later pairs win.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.update(key, value);
        }
    }
}

impl<K, V, P> FromIterator<(K, V)> for HashTable<K, V, P>
where
    P: KeyPolicy<K> + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::with_policy(P::default());
        table.extend(iter);
        table
    }
}

impl<'a, K, V, P> IntoIterator for &'a HashTable<K, V, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A view into a single entry of a [`HashTable`], which may be vacant or
/// occupied.
///
/// Constructed by [`HashTable::entry`].
///
/// # Examples
///
/// ```rust
/// use probe_hash::Entry;
/// use probe_hash::HashTable;
///
/// let mut table: HashTable<&str, i32> = HashTable::new();
/// match table.entry("key") {
///     Entry::Vacant(entry) => {
///         entry.insert(1);
///     }
///     Entry::Occupied(_) => unreachable!(),
/// }
/// match table.entry("key") {
///     Entry::Occupied(mut entry) => {
///         assert_eq!(entry.insert(2), 1);
///     }
///     Entry::Vacant(_) => unreachable!(),
/// }
/// assert_eq!(table.lookup(&"key"), Some(&2));
/// ```
pub enum Entry<'a, K, V, P> {
    /// The key is present.
    Occupied(OccupiedEntry<'a, K, V, P>),
    /// The key is absent.
    Vacant(VacantEntry<'a, K, V, P>),
}

impl<'a, K, V, P> Entry<'a, K, V, P>
where
    P: KeyPolicy<K>,
{
    /// Inserts `default` if vacant and returns a mutable reference to the
    /// value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Inserts `V::default()` if vacant and returns a mutable reference to
    /// the value.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(V::default)
    }

    /// Runs `f` on the value if occupied.
    pub fn and_modify(mut self, f: impl FnOnce(&mut V)) -> Self {
        if let Entry::Occupied(entry) = &mut self {
            f(entry.get_mut());
        }
        self
    }

    /// The entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

/// A vacant entry: the key is absent and a slot has been reserved for it.
pub struct VacantEntry<'a, K, V, P> {
    table: &'a mut HashTable<K, V, P>,
    key: K,
    tag: u8,
    index: usize,
}

impl<'a, K, V, P> VacantEntry<'a, K, V, P> {
    /// The key that would be inserted.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Gives the key back without inserting.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Writes the entry and returns a mutable reference to its value.
    pub fn insert(self, value: V) -> &'a mut V {
        let table = self.table;
        // SAFETY: `index` is an empty in-bounds slot found after any growth,
        // so writing initializes it without overwriting a live entry.
        unsafe {
            debug_assert_eq!(table.tag(self.index), EMPTY);
            table.key_ptr(self.index).write(self.key);
            table.value_ptr(self.index).write(value);
            table.set_tag(self.index, self.tag);
            table.populated += 1;
            &mut *table.value_ptr(self.index)
        }
    }
}

/// An occupied entry: the key is present.
pub struct OccupiedEntry<'a, K, V, P> {
    table: &'a mut HashTable<K, V, P>,
    index: usize,
}

impl<'a, K, V, P> OccupiedEntry<'a, K, V, P> {
    /// The stored key.
    pub fn key(&self) -> &K {
        // SAFETY: An occupied entry always points at a live slot.
        unsafe { self.table.key(self.index) }
    }

    /// The stored value.
    pub fn get(&self) -> &V {
        // SAFETY: An occupied entry always points at a live slot.
        unsafe { self.table.value(self.index) }
    }

    /// A mutable reference to the stored value.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: An occupied entry always points at a live slot.
        unsafe { &mut *self.table.value_ptr(self.index) }
    }

    /// Converts the entry into a mutable reference bound to the table.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: An occupied entry always points at a live slot.
        unsafe { &mut *self.table.value_ptr(self.index) }
    }

    /// Replaces the value, returning the old one. The key is unchanged.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }
}

impl<'a, K, V, P> OccupiedEntry<'a, K, V, P>
where
    P: KeyPolicy<K>,
{
    /// Removes the entry and returns its value.
    pub fn remove(self) -> V {
        self.remove_entry().1
    }

    /// Removes the entry and returns the stored key and value.
    pub fn remove_entry(self) -> (K, V) {
        let table = self.table;
        // SAFETY: An occupied entry always points at a live slot.
        let entry = unsafe { table.take(self.index) };
        table.maybe_compact();
        entry
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// Created by [`HashTable::iter`].
pub struct Iter<'a, K, V, P> {
    table: &'a HashTable<K, V, P>,
    index: usize,
    remaining: usize,
}

impl<'a, K, V, P> Iterator for Iter<'a, K, V, P> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 && self.index < self.table.capacity {
            let index = self.index;
            self.index += 1;
            // SAFETY: `index` is in bounds and a live tag guarantees the slot
            // is initialized.
            unsafe {
                if is_live(self.table.tag(index)) {
                    self.remaining -= 1;
                    return Some((self.table.key(index), self.table.value(index)));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, P> ExactSizeIterator for Iter<'_, K, V, P> {}

impl<K, V, P> FusedIterator for Iter<'_, K, V, P> {}

/// A mutable iterator over the entries of a [`HashTable`].
///
/// Created by [`HashTable::iter_mut`].
pub struct IterMut<'a, K, V> {
    tags: *const u8,
    keys: *const K,
    values: *mut V,
    capacity: usize,
    index: usize,
    remaining: usize,
    _marker: PhantomData<(&'a K, &'a mut V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 && self.index < self.capacity {
            let index = self.index;
            self.index += 1;
            // SAFETY: `index` is in bounds, a live tag guarantees the slot is
            // initialized, and every index is yielded at most once so the
            // mutable references never alias.
            unsafe {
                if is_live(*self.tags.add(index)) {
                    self.remaining -= 1;
                    return Some((&*self.keys.add(index), &mut *self.values.add(index)));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a [`HashTable`].
pub struct Keys<'a, K, V, P> {
    inner: Iter<'a, K, V, P>,
}

impl<'a, K, V, P> Iterator for Keys<'a, K, V, P> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, P> ExactSizeIterator for Keys<'_, K, V, P> {}

impl<K, V, P> FusedIterator for Keys<'_, K, V, P> {}

/// An iterator over the values of a [`HashTable`].
pub struct Values<'a, K, V, P> {
    inner: Iter<'a, K, V, P>,
}

impl<'a, K, V, P> Iterator for Values<'a, K, V, P> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, P> ExactSizeIterator for Values<'_, K, V, P> {}

impl<K, V, P> FusedIterator for Values<'_, K, V, P> {}

/// A draining iterator over the entries of a [`HashTable`].
///
/// Created by [`HashTable::drain`]. Each yielded slot turns into a grave, so
/// a leaked `Drain` leaves a consistent table; dropping it resets every slot
/// to empty.
pub struct Drain<'a, K, V, P> {
    table: &'a mut HashTable<K, V, P>,
    index: usize,
}

impl<K, V, P> Iterator for Drain<'_, K, V, P> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.table.populated > 0 && self.index < self.table.capacity {
            let index = self.index;
            self.index += 1;
            // SAFETY: `index` is in bounds and `take` is only called on live
            // slots.
            unsafe {
                if is_live(self.table.tag(index)) {
                    return Some(self.table.take(index));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.populated, Some(self.table.populated))
    }
}

impl<K, V, P> Drop for Drain<'_, K, V, P> {
    fn drop(&mut self) {
        for _ in &mut *self {}

        // SAFETY: Every live slot was taken above; only markers remain in the
        // control bytes.
        unsafe {
            core::ptr::write_bytes(self.table.tags_ptr(), EMPTY, self.table.capacity);
        }
        self.table.graves = 0;
    }
}
