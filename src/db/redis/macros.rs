/// Read-through caching of catalog responses.
///
/// Returns the cached value for `$key` when present. Otherwise awaits
/// `$block`, hands the result to the background writer with `$ttl` seconds to
/// live, and returns it.
///
/// # Arguments
/// * `$cache`: a [`Cache`](crate::db::Cache) (anything with `get_from_cache`
///   and `set_in_background`).
/// * `$key`: the [`CacheKey`](crate::db::CacheKey) to read and write.
/// * `$ttl`: time-to-live in seconds.
/// * `$block`: future producing `AppResult<T>` on a miss.
///
/// # Example
/// ```rust,ignore
/// cached!(self.cache, CacheKey::RelatedArtists(id.clone()), RELATED_TTL, async move {
///     self.fetch_related(id).await
/// })
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
