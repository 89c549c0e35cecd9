use std::env;
use std::sync::OnceLock;

static DDPT_VERBOSE: OnceLock<u8> = OnceLock::new();

fn parse_level(value: &str) -> Option<u8> {
    value.trim().parse::<u8>().ok()
}

/// Verbosity level from `DDPT_VERBOSE`; unset or unparsable means silent.
pub(crate) fn verbose_level() -> u8 {
    *DDPT_VERBOSE.get_or_init(|| {
        env::var("DDPT_VERBOSE")
            .ok()
            .and_then(|v| parse_level(&v))
            .unwrap_or(0)
    })
}
