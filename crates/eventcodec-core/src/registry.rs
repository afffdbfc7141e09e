//! Format registry (spec §4.D): name -> codec bindings, alias resolution,
//! capability/performance-based selection, and TTL/LRU eviction.
//!
//! Modeled on `gauss_engine::topic::TopicRegistry`: a `RwLock<HashMap<...>>`
//! recovered from poisoning rather than panicking, plus a background sweep
//! task signaled to stop via `tokio::sync::watch`. Capacity eviction happens
//! synchronously on insert (never deferred to the sweep), so `list_formats()`
//! never observes more than `max_entries` live formats.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{codes, RegistryError};
use crate::interfaces::Codec;

/// The seven independent capability flags a registered format advertises
/// (spec §3 / §6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatCapabilities {
    pub streaming: bool,
    pub compression: bool,
    pub schema_validation: bool,
    pub binary_efficient: bool,
    pub human_readable: bool,
    pub self_describing: bool,
    pub versionable: bool,
}

impl FormatCapabilities {
    /// `self` satisfies every flag set in `required`.
    pub fn satisfies(&self, required: FormatCapabilities) -> bool {
        (!required.streaming || self.streaming)
            && (!required.compression || self.compression)
            && (!required.schema_validation || self.schema_validation)
            && (!required.binary_efficient || self.binary_efficient)
            && (!required.human_readable || self.human_readable)
            && (!required.self_describing || self.self_describing)
            && (!required.versionable || self.versionable)
    }
}

/// Relative, registrant-supplied performance characteristics used to break
/// priority ties during `SelectFormat` (spec §4.D). Each field is a 0-100
/// relative score; higher is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceProfile {
    pub encode_speed: u8,
    pub decode_speed: u8,
    pub size_efficiency: u8,
}

impl PerformanceProfile {
    pub fn composite(&self) -> u32 {
        self.encode_speed as u32 + self.decode_speed as u32 + self.size_efficiency as u32
    }
}

/// Everything the registry and `SelectFormat` need to know about a format
/// besides how to construct its codec (spec §3 `FormatInfo`, §6).
#[derive(Debug, Clone)]
pub struct FormatInfo {
    /// Canonical, normalized MIME type. Also the primary registry key.
    pub mime_type: String,
    pub name: String,
    pub description: String,
    /// Additional names that resolve to this format.
    pub aliases: Vec<String>,
    /// Lower ranks higher (spec §3: "lower = higher rank").
    pub priority: i32,
    pub capabilities: FormatCapabilities,
    pub performance: PerformanceProfile,
}

impl FormatInfo {
    pub fn new(mime_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            name: name.into(),
            description: String::new(),
            aliases: Vec::new(),
            priority: 0,
            capabilities: FormatCapabilities::default(),
            performance: PerformanceProfile::default(),
        }
    }
}

struct Entry {
    codec: Arc<dyn Codec>,
    info: FormatInfo,
    inserted_at: Instant,
    last_access: Instant,
    access_count: u64,
}

fn normalize(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

struct Inner {
    entries: HashMap<String, Entry>,
    aliases: HashMap<String, String>,
    default: Option<String>,
}

impl Inner {
    fn new() -> Self {
        Self { entries: HashMap::new(), aliases: HashMap::new(), default: None }
    }

    /// Resolves a normalized name to its canonical primary key: alias, then
    /// exact primary match, then a registered `type/*` wildcard (spec §4.D
    /// normalization pipeline).
    fn resolve(&self, name: &str) -> Option<String> {
        let key = normalize(name);
        if let Some(target) = self.aliases.get(&key) {
            return Some(target.clone());
        }
        if self.entries.contains_key(&key) {
            return Some(key);
        }
        let (major, _) = key.split_once('/')?;
        let wildcard = format!("{major}/*");
        self.entries.contains_key(&wildcard).then_some(wildcard)
    }
}

/// Registry configuration (spec §4.D / SPEC_FULL.md "Configuration").
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// 0 disables TTL eviction. Measured from insertion time, not access time.
    pub ttl: Duration,
    /// 0 disables capacity-based eviction entirely.
    pub max_entries: usize,
    pub cleanup_interval: Duration,
    /// When the registry is at `max_entries` and a new format is registered,
    /// evict the least-recently-accessed non-default entry. When false,
    /// registering at capacity fails instead of evicting.
    pub enable_lru: bool,
    pub enable_background_cleanup: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::ZERO,
            max_entries: 0,
            cleanup_interval: Duration::from_secs(60),
            enable_lru: true,
            enable_background_cleanup: true,
        }
    }
}

pub struct FormatRegistry {
    inner: RwLock<Inner>,
    config: RegistryConfig,
    shutdown: watch::Sender<bool>,
}

impl FormatRegistry {
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self { inner: RwLock::new(Inner::new()), config, shutdown })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("format registry lock poisoned on read, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("format registry lock poisoned on write, recovering");
            poisoned.into_inner()
        })
    }

    /// Removes a primary entry and every alias pointing at it, keeping the
    /// alias-index invariant ("every alias resolves to a present primary")
    /// intact across eviction.
    fn remove_entry_locked(inner: &mut Inner, name: &str) {
        inner.entries.remove(name);
        inner.aliases.retain(|_, target| target != name);
    }

    /// Enforces capacity *before* an insert that would introduce a new key
    /// (spec §4.D: eviction happens on insert, synchronously).
    fn evict_for_insert(&self, inner: &mut Inner) -> Result<(), RegistryError> {
        if self.config.max_entries == 0 || inner.entries.len() < self.config.max_entries {
            return Ok(());
        }
        if !self.config.enable_lru {
            return Err(RegistryError::new("register", "", "registry at capacity and LRU eviction is disabled", codes::LRU_DISABLED_AT_CAPACITY));
        }
        let default = inner.default.clone();
        let victim = inner
            .entries
            .iter()
            .filter(|(name, _)| Some(*name) != default.as_ref())
            .min_by_key(|(_, e)| e.last_access)
            .map(|(name, _)| name.clone());
        match victim {
            Some(name) => {
                Self::remove_entry_locked(inner, &name);
                Ok(())
            }
            None => Err(RegistryError::new("register", "", "registry at capacity and the only entry is the default", codes::LRU_DISABLED_AT_CAPACITY)),
        }
    }

    /// Registers `codec` under `info.mime_type`, binding every alias in
    /// `info.aliases` atomically. Re-registering the same normalized name
    /// replaces the codec and info but keeps existing alias bindings pointed
    /// at it (spec §4.D "overwrite preserves alias bindings").
    pub fn register(&self, info: FormatInfo, codec: Arc<dyn Codec>) -> Result<(), RegistryError> {
        if info.mime_type.trim().is_empty() {
            return Err(RegistryError::new("register", info.mime_type.clone(), "content type must not be empty", codes::EMPTY_MIME_TYPE));
        }
        let key = normalize(&info.mime_type);
        let mut inner = self.write();

        for alias in &info.aliases {
            let alias_key = normalize(alias);
            if alias_key == key {
                continue;
            }
            if inner.entries.contains_key(&alias_key) {
                return Err(RegistryError::new("register", alias.clone(), "alias conflicts with a registered primary name", codes::ALIAS_CONFLICT));
            }
            if let Some(existing) = inner.aliases.get(&alias_key) {
                if existing != &key {
                    return Err(RegistryError::new("register", alias.clone(), "alias already bound to a different target", codes::ALIAS_CONFLICT));
                }
            }
        }

        if !inner.entries.contains_key(&key) {
            self.evict_for_insert(&mut inner)?;
        }

        let now = Instant::now();
        inner.entries.insert(key.clone(), Entry { codec, info: info.clone(), inserted_at: now, last_access: now, access_count: 0 });
        for alias in &info.aliases {
            let alias_key = normalize(alias);
            if alias_key != key {
                inner.aliases.insert(alias_key, key.clone());
            }
        }
        Ok(())
    }

    /// Binds `alias` to an already-registered `content_type`, independent of
    /// the aliases carried in its `FormatInfo` at registration time.
    pub fn register_alias(&self, alias: &str, content_type: &str) -> Result<(), RegistryError> {
        let alias_key = normalize(alias);
        let target = normalize(content_type);
        let mut inner = self.write();
        if !inner.entries.contains_key(&target) {
            return Err(RegistryError::new("register_alias", content_type, "target content type not registered", codes::NOT_REGISTERED));
        }
        if inner.entries.contains_key(&alias_key) {
            return Err(RegistryError::new("register_alias", alias, "alias conflicts with a registered primary name", codes::ALIAS_CONFLICT));
        }
        if let Some(existing) = inner.aliases.get(&alias_key) {
            if existing != &target {
                return Err(RegistryError::new("register_alias", alias, "alias already bound to a different target", codes::ALIAS_CONFLICT));
            }
        }
        inner.aliases.insert(alias_key, target);
        Ok(())
    }

    pub fn set_default(&self, content_type: &str) -> Result<(), RegistryError> {
        let mut inner = self.write();
        let key = inner.resolve(content_type).ok_or_else(|| RegistryError::new("set_default", content_type, "content type not registered", codes::NOT_REGISTERED))?;
        inner.default = Some(key);
        Ok(())
    }

    /// Looks up `content_type` (normalized, alias- and wildcard-resolved)
    /// and touches its access bookkeeping.
    pub fn get(&self, content_type: &str) -> Result<Arc<dyn Codec>, RegistryError> {
        let key = self
            .read()
            .resolve(content_type)
            .ok_or_else(|| RegistryError::new("get", content_type, "content type not registered", codes::NOT_REGISTERED))?;
        let mut inner = self.write();
        match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.last_access = Instant::now();
                entry.access_count += 1;
                Ok(entry.codec.clone())
            }
            None => Err(RegistryError::new("get", content_type, "content type not registered", codes::NOT_REGISTERED)),
        }
    }

    pub fn get_default(&self) -> Result<Arc<dyn Codec>, RegistryError> {
        let key = self.default_key()?;
        self.get(&key)
    }

    fn default_key(&self) -> Result<String, RegistryError> {
        self.read().default.clone().ok_or_else(|| RegistryError::new("get_default", "", "no default format registered", codes::DEFAULT_NOT_REGISTERED))
    }

    /// `FormatInfo` for every registered primary entry, ordered by priority
    /// ascending (lower ranks higher) then by MIME type for determinism
    /// (spec §8 "priority order" property).
    pub fn list_formats(&self) -> Vec<FormatInfo> {
        let inner = self.read();
        let mut infos: Vec<FormatInfo> = inner.entries.values().map(|e| e.info.clone()).collect();
        infos.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.mime_type.cmp(&b.mime_type)));
        infos
    }

    /// `SelectFormat(accepted_list, required_capabilities)` (spec §4.D):
    /// resolves each accepted name, filters by capability, and orders
    /// surviving candidates by (priority ascending, performance composite
    /// descending, MIME ascending). Falls back to the default format when
    /// `accepted_list` is empty.
    pub fn select(&self, accepted_list: &[String], required: FormatCapabilities) -> Result<String, RegistryError> {
        if accepted_list.is_empty() {
            return self.default_key();
        }
        let inner = self.read();
        let mut candidates: Vec<(&FormatInfo, String)> = Vec::new();
        for accepted in accepted_list {
            if let Some(key) = inner.resolve(accepted) {
                if let Some(entry) = inner.entries.get(&key) {
                    if entry.info.capabilities.satisfies(required) {
                        candidates.push((&entry.info, key));
                    }
                }
            }
        }
        candidates.sort_by(|(a, _), (b, _)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.performance.composite().cmp(&a.performance.composite()))
                .then_with(|| a.mime_type.cmp(&b.mime_type))
        });
        candidates
            .into_iter()
            .next()
            .map(|(_, key)| key)
            .ok_or_else(|| RegistryError::new("select", "", "no accepted format satisfies the required capabilities", codes::NO_FORMAT_SATISFIES_CAPABILITIES))
    }

    /// `CleanupExpired()`: evicts entries whose *insertion* time exceeds the
    /// configured TTL (spec §4.D — TTL is `inserted_at + ttl`, distinct from
    /// LRU idle eviction). The default entry is never evicted.
    pub fn cleanup_expired(&self) {
        if self.config.ttl.is_zero() {
            return;
        }
        let mut inner = self.write();
        let ttl = self.config.ttl;
        let default = inner.default.clone();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(name, e)| Some(*name) != default.as_ref() && e.inserted_at.elapsed() >= ttl)
            .map(|(name, _)| name.clone())
            .collect();
        for name in expired {
            Self::remove_entry_locked(&mut inner, &name);
        }
    }

    /// `CleanupByAccessTime(maxIdle)`: evicts entries not looked up within
    /// `max_idle`, independent of TTL. The default entry is never evicted.
    pub fn cleanup_by_access_time(&self, max_idle: Duration) {
        let mut inner = self.write();
        let default = inner.default.clone();
        let idle: Vec<String> = inner
            .entries
            .iter()
            .filter(|(name, e)| Some(*name) != default.as_ref() && e.last_access.elapsed() >= max_idle)
            .map(|(name, _)| name.clone())
            .collect();
        for name in idle {
            Self::remove_entry_locked(&mut inner, &name);
        }
    }

    /// Spawns the background TTL sweep (spec §4.D). A no-op task when
    /// `enable_background_cleanup` is false. Dropping the returned handle
    /// does not stop the task; call `shutdown` first.
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut stop = self.shutdown.subscribe();
        let interval = self.config.cleanup_interval;
        let enabled = self.config.enable_background_cleanup;
        tokio::spawn(async move {
            if !enabled {
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => registry.cleanup_expired(),
                    _ = stop.changed() => break,
                }
            }
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodingError, EncodingError};
    use crate::event::Event;
    use crate::interfaces::{ContentTypeProvider, Ctx, Decoder, Encoder, StreamingCapabilityProvider};
    use crate::options::{DecodingOptions, EncodingOptions};

    struct Stub(&'static str);
    impl Encoder for Stub {
        fn encode(&self, _ctx: &Ctx, _e: &Event, _o: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
            Ok(vec![])
        }
        fn encode_multiple(&self, _ctx: &Ctx, _e: &[Event], _o: &EncodingOptions) -> Result<Vec<u8>, EncodingError> {
            Ok(vec![])
        }
    }
    impl Decoder for Stub {
        fn decode(&self, _ctx: &Ctx, _d: &[u8], _o: &DecodingOptions) -> Result<Event, DecodingError> {
            Err(DecodingError::new(self.0, "", "stub"))
        }
        fn decode_multiple(&self, _ctx: &Ctx, _d: &[u8], _o: &DecodingOptions) -> Result<Vec<Event>, DecodingError> {
            Ok(vec![])
        }
    }
    impl ContentTypeProvider for Stub {
        fn content_type(&self) -> &str {
            self.0
        }
    }
    impl StreamingCapabilityProvider for Stub {
        fn supports_streaming(&self) -> bool {
            false
        }
    }

    fn info(mime: &str, priority: i32, caps: FormatCapabilities) -> FormatInfo {
        FormatInfo { priority, capabilities: caps, ..FormatInfo::new(mime, mime) }
    }

    #[test]
    fn alias_resolves_case_and_parameter_insensitively() {
        let registry = FormatRegistry::new(RegistryConfig::default());
        let mut json_info = info("application/json", 0, FormatCapabilities::default());
        json_info.aliases = vec!["text/json".into()];
        registry.register(json_info, Arc::new(Stub("application/json"))).unwrap();
        assert!(registry.get("Text/JSON").is_ok());
        assert!(registry.get("APPLICATION/JSON; charset=utf-8").is_ok());
    }

    #[test]
    fn alias_conflicting_with_primary_is_rejected() {
        let registry = FormatRegistry::new(RegistryConfig::default());
        registry.register(info("application/json", 0, FormatCapabilities::default()), Arc::new(Stub("a"))).unwrap();
        registry.register(info("application/cbor", 0, FormatCapabilities::default()), Arc::new(Stub("b"))).unwrap();
        let err = registry.register_alias("application/cbor", "application/json").unwrap_err();
        assert_eq!(err.code, codes::ALIAS_CONFLICT);
    }

    #[test]
    fn wildcard_entry_matches_any_subtype() {
        let registry = FormatRegistry::new(RegistryConfig::default());
        registry.register(info("text/*", 0, FormatCapabilities::default()), Arc::new(Stub("text/*"))).unwrap();
        assert!(registry.get("text/x-whatever").is_ok());
    }

    #[test]
    fn select_orders_by_priority_then_performance_then_mime() {
        let registry = FormatRegistry::new(RegistryConfig::default());
        let streaming = FormatCapabilities { streaming: true, ..Default::default() };
        let mut a = info("format/a", 1, streaming);
        a.performance = PerformanceProfile { encode_speed: 10, decode_speed: 10, size_efficiency: 10 };
        let mut b = info("format/b", 1, streaming);
        b.performance = PerformanceProfile { encode_speed: 90, decode_speed: 90, size_efficiency: 90 };
        registry.register(a, Arc::new(Stub("a"))).unwrap();
        registry.register(b, Arc::new(Stub("b"))).unwrap();
        // Same priority: higher performance composite wins.
        let chosen = registry.select(&["format/a".into(), "format/b".into()], streaming).unwrap();
        assert_eq!(chosen, "format/b");
    }

    #[test]
    fn select_prefers_lower_priority_number_over_performance() {
        let registry = FormatRegistry::new(RegistryConfig::default());
        let streaming = FormatCapabilities { streaming: true, ..Default::default() };
        let mut high_rank = info("format/a", 0, streaming);
        high_rank.performance = PerformanceProfile { encode_speed: 1, decode_speed: 1, size_efficiency: 1 };
        let mut low_rank = info("format/b", 5, streaming);
        low_rank.performance = PerformanceProfile { encode_speed: 99, decode_speed: 99, size_efficiency: 99 };
        registry.register(high_rank, Arc::new(Stub("a"))).unwrap();
        registry.register(low_rank, Arc::new(Stub("b"))).unwrap();
        let chosen = registry.select(&["format/a".into(), "format/b".into()], streaming).unwrap();
        assert_eq!(chosen, "format/a");
    }

    #[test]
    fn select_falls_back_to_default_when_accepted_list_empty() {
        let registry = FormatRegistry::new(RegistryConfig::default());
        registry.register(info("format/a", 0, FormatCapabilities::default()), Arc::new(Stub("a"))).unwrap();
        registry.set_default("format/a").unwrap();
        assert_eq!(registry.select(&[], FormatCapabilities::default()).unwrap(), "format/a");
    }

    #[test]
    fn capacity_eviction_is_synchronous_on_insert_and_never_removes_default() {
        let registry = FormatRegistry::new(RegistryConfig { max_entries: 1, ..RegistryConfig::default() });
        registry.register(info("format/a", 0, FormatCapabilities::default()), Arc::new(Stub("a"))).unwrap();
        registry.set_default("format/a").unwrap();
        registry.register(info("format/b", 0, FormatCapabilities::default()), Arc::new(Stub("b"))).unwrap();
        assert_eq!(registry.list_formats().len(), 1);
        assert!(registry.get("format/a").is_ok());
    }

    #[test]
    fn capacity_reached_without_lru_rejects_new_registration() {
        let registry = FormatRegistry::new(RegistryConfig { max_entries: 1, enable_lru: false, ..RegistryConfig::default() });
        registry.register(info("format/a", 0, FormatCapabilities::default()), Arc::new(Stub("a"))).unwrap();
        let err = registry.register(info("format/b", 0, FormatCapabilities::default()), Arc::new(Stub("b"))).unwrap_err();
        assert_eq!(err.code, codes::LRU_DISABLED_AT_CAPACITY);
    }

    #[test]
    fn eviction_removes_dangling_aliases() {
        let registry = FormatRegistry::new(RegistryConfig { max_entries: 1, ..RegistryConfig::default() });
        let mut a = info("format/a", 0, FormatCapabilities::default());
        a.aliases = vec!["format/a-alias".into()];
        registry.register(a, Arc::new(Stub("a"))).unwrap();
        registry.register(info("format/b", 0, FormatCapabilities::default()), Arc::new(Stub("b"))).unwrap();
        // format/a was evicted to make room for format/b; its alias must not dangle.
        assert!(registry.get("format/a-alias").is_err());
        assert!(registry.register(info("format/a-alias", 0, FormatCapabilities::default()), Arc::new(Stub("c"))).is_ok());
    }

    #[test]
    fn cleanup_expired_uses_insertion_time_not_access_time() {
        let registry = FormatRegistry::new(RegistryConfig { ttl: Duration::from_millis(10), ..RegistryConfig::default() });
        registry.register(info("format/a", 0, FormatCapabilities::default()), Arc::new(Stub("a"))).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        // Access doesn't reset the insertion-time clock.
        let _ = registry.get("format/a");
        registry.cleanup_expired();
        assert!(registry.get("format/a").is_err());
    }
}
