use std::fmt::Display;
use std::time::Instant;

use console::Style;

const ANSI_BLUE: Style = Style::new().blue();

/// Short content hash used for revisioned filenames, 8 hex chars.
pub(crate) fn short_hash(buffer: impl AsRef<[u8]>) -> String {
    let hash = blake3::Hasher::new()
        .update(buffer.as_ref())
        .finalize()
        .to_hex();

    hash[..8].to_string()
}

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

#[cfg(feature = "logging")]
pub(crate) fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub(crate) fn init_logging() {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_short_hash_is_stable() {
        let a = short_hash(b"body { color: red }");
        let b = short_hash(b"body { color: red }");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_short_hash_differs_per_content() {
        assert_ne!(short_hash(b"a"), short_hash(b"b"));
    }
}
