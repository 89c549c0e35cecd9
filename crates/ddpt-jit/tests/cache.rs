use std::convert::Infallible;
use std::sync::Arc;

use ddpt_jit::{parse_cache_flag, parse_opt_level, sha1_hex, EngineCache};

#[test]
fn sha1_matches_the_known_vector() {
    assert_eq!(sha1_hex("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
}

#[test]
fn identical_text_shares_a_key_and_any_difference_splits_it() {
    let module = "module @ddpt {\n  func @jit_main() -> () {\n  return\n}\n}\n";
    assert_eq!(sha1_hex(module), sha1_hex(module));
    let touched = module.replace("jit_main", "jit_mainX");
    assert_ne!(sha1_hex(module), sha1_hex(&touched));
}

#[test]
fn cache_reuses_engines_for_identical_modules() {
    let cache: EngineCache<u32> = EngineCache::new();
    let key = sha1_hex("some module text");

    let (first, hit) = cache
        .get_or_try_insert_with::<Infallible, _>(&key, || Ok(7))
        .expect("build");
    assert!(!hit);
    assert_eq!(cache.builds(), 1);

    // Identical post-build text: the engine is reused, nothing is rebuilt.
    let (second, hit) = cache
        .get_or_try_insert_with::<Infallible, _>(&key, || Ok(8))
        .expect("lookup");
    assert!(hit);
    assert_eq!(cache.builds(), 1);
    assert!(Arc::ptr_eq(&first, &second));

    let other = sha1_hex("a different module text");
    let (third, hit) = cache
        .get_or_try_insert_with::<Infallible, _>(&other, || Ok(9))
        .expect("build");
    assert!(!hit);
    assert_eq!(cache.builds(), 2);
    assert_eq!(*third, 9);
    assert_eq!(cache.len(), 2);
}

#[test]
fn build_failures_are_not_cached() {
    let cache: EngineCache<u32> = EngineCache::new();
    let result = cache.get_or_try_insert_with::<&str, _>("key", || Err("boom"));
    assert!(result.is_err());
    assert_eq!(cache.builds(), 0);
    let (value, hit) = cache
        .get_or_try_insert_with::<&str, _>("key", || Ok(1))
        .expect("retry");
    assert!(!hit);
    assert_eq!(*value, 1);
}

#[test]
fn opt_level_parses_the_valid_range_only() {
    for (text, level) in [("0", 0u8), ("1", 1), ("2", 2), ("3", 3), (" 2 ", 2)] {
        assert_eq!(parse_opt_level(text).expect("valid"), level);
    }
    for text in ["4", "-1", "fast", ""] {
        assert!(parse_opt_level(text).is_err(), "`{text}` must be rejected");
    }
}

#[test]
fn cache_flag_accepts_the_documented_values_only() {
    for text in ["1", "y", "Y", "on", "ON"] {
        assert!(parse_cache_flag(text), "`{text}` must enable the cache");
    }
    for text in ["0", "n", "off", "yes", "true", ""] {
        assert!(!parse_cache_flag(text), "`{text}` must disable the cache");
    }
}
